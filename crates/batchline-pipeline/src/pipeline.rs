//! The task pipeline: priority queues, worker pool, dependency release,
//! and the retry/timeout state machine.
//!
//! One mutex guards the queues, records, dependency graph, in-flight set,
//! and completed map; it is never held across an await point. A semaphore
//! caps concurrent execution. Completion is signalled through a per-task
//! watch channel registered at submit time, so awaiters never poll.

use crate::config::{PipelineConfig, TaskBudget};
use crate::error::{AwaitError, SubmitError, TaskFailure};
use crate::events::TaskEvent;
use crate::graph::DependencyGraph;
use crate::metrics::{Counters, PipelineMetrics, QueueDepths};
use crate::task::{
    CompletionFn, Priority, Task, TaskId, TaskOutcome, TaskPhase, TaskTimestamps, WorkFn,
};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::{watch, Notify, Semaphore};
use tokio::task::{AbortHandle, JoinHandle};

#[cfg(feature = "metrics")]
use metrics::{counter, gauge};

/// How long `stop` waits for each worker before aborting it.
const JOIN_GRACE: Duration = Duration::from_secs(2);

/// Poll fallback for idle workers; guards against a lost wakeup between
/// the queue check and `Notify::notified`.
const IDLE_POLL: Duration = Duration::from_millis(50);

struct TaskRecord<T> {
    priority: Priority,
    work: WorkFn<T>,
    budget: TaskBudget,
    callback: Option<CompletionFn<T>>,
    phase: TaskPhase,
    retries: u32,
    timestamps: TaskTimestamps,
    done: watch::Sender<bool>,
}

struct State<T> {
    records: HashMap<TaskId, TaskRecord<T>>,
    queues: [VecDeque<TaskId>; 4],
    in_flight: HashSet<TaskId>,
    graph: DependencyGraph,
    outcomes: HashMap<TaskId, TaskOutcome<T>>,
    aborts: HashMap<TaskId, AbortHandle>,
    cancel_requested: HashSet<TaskId>,
}

impl<T> State<T> {
    fn new() -> Self {
        Self {
            records: HashMap::new(),
            queues: [
                VecDeque::new(),
                VecDeque::new(),
                VecDeque::new(),
                VecDeque::new(),
            ],
            in_flight: HashSet::new(),
            graph: DependencyGraph::new(),
            outcomes: HashMap::new(),
            aborts: HashMap::new(),
            cancel_requested: HashSet::new(),
        }
    }

    fn is_idle(&self) -> bool {
        self.in_flight.is_empty()
            && self.graph.pending_count() == 0
            && self.queues.iter().all(VecDeque::is_empty)
    }

    fn queue_depths(&self) -> QueueDepths {
        QueueDepths {
            critical: self.queues[0].len(),
            high: self.queues[1].len(),
            normal: self.queues[2].len(),
            low: self.queues[3].len(),
        }
    }
}

struct Shared<T> {
    config: PipelineConfig,
    state: Mutex<State<T>>,
    counters: Counters,
    work_available: Notify,
    idle: Notify,
    semaphore: Arc<Semaphore>,
    running: AtomicBool,
    handles: Mutex<Vec<JoinHandle<()>>>,
    ticker: Mutex<Option<JoinHandle<()>>>,
}

/// A priority-scheduled, dependency-aware task executor.
///
/// Generic over the result type `T`; heterogeneous callers keep results as
/// opaque byte buffers and decode at the edge.
pub struct Pipeline<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for Pipeline<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

/// What a worker does with a finished attempt.
enum Verdict<T> {
    Success(T),
    Failure(TaskFailure),
    Cancelled,
}

/// Terminal bookkeeping collected under the lock, delivered after it.
struct Settled<T> {
    outcome: TaskOutcome<T>,
    callback: Option<CompletionFn<T>>,
    done: watch::Sender<bool>,
}

impl<T: Clone + Send + 'static> Pipeline<T> {
    /// Creates a pipeline from the given configuration. Call
    /// [`start`](Pipeline::start) before submitting.
    pub fn new(config: PipelineConfig) -> Self {
        let semaphore = Arc::new(Semaphore::new(config.max_concurrent));
        Self {
            shared: Arc::new(Shared {
                config,
                state: Mutex::new(State::new()),
                counters: Counters::new(),
                work_available: Notify::new(),
                idle: Notify::new(),
                semaphore,
                running: AtomicBool::new(false),
                handles: Mutex::new(Vec::new()),
                ticker: Mutex::new(None),
            }),
        }
    }

    /// Spawns the worker pool and the metrics ticker. Idempotent.
    pub async fn start(&self) {
        if self.shared.running.swap(true, Ordering::SeqCst) {
            return;
        }
        tracing::info!(
            pipeline = %self.shared.config.name,
            workers = self.shared.config.max_workers,
            max_concurrent = self.shared.config.max_concurrent,
            "starting pipeline"
        );
        let mut handles = self.shared.handles.lock().unwrap();
        for _ in 0..self.shared.config.max_workers {
            let shared = Arc::clone(&self.shared);
            handles.push(tokio::spawn(worker_loop(shared)));
        }
        let shared = Arc::clone(&self.shared);
        *self.shared.ticker.lock().unwrap() = Some(tokio::spawn(metrics_loop(shared)));
    }

    /// Stops the pipeline: cancels in-flight work, wakes idle workers, and
    /// joins them with a bounded wait. Queued tasks stay queued and resume
    /// if the pipeline is started again. Idempotent.
    pub async fn stop(&self) {
        if !self.shared.running.swap(false, Ordering::SeqCst) {
            return;
        }
        tracing::info!(pipeline = %self.shared.config.name, "stopping pipeline");

        {
            let state = self.shared.state.lock().unwrap();
            for abort in state.aborts.values() {
                abort.abort();
            }
        }
        self.shared.work_available.notify_waiters();

        if let Some(ticker) = self.shared.ticker.lock().unwrap().take() {
            ticker.abort();
        }
        let handles: Vec<JoinHandle<()>> =
            std::mem::take(&mut *self.shared.handles.lock().unwrap());
        for mut handle in handles {
            if tokio::time::timeout(JOIN_GRACE, &mut handle).await.is_err() {
                handle.abort();
            }
        }
        tracing::info!(pipeline = %self.shared.config.name, "pipeline stopped");
    }

    /// Returns true if the pipeline is accepting work.
    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    /// Accepts a fully-formed task. Returns immediately: the task is
    /// either queued for its priority class or parked until its
    /// dependencies complete.
    pub fn submit(&self, task: Task<T>) -> Result<(), SubmitError> {
        if !self.is_running() {
            return Err(SubmitError::NotRunning);
        }
        let shared = &self.shared;
        let budget = shared.config.budget_for(&task);
        let now = shared.config.clock.now();
        let Task {
            id,
            priority,
            work,
            dependencies,
            callback,
            ..
        } = task;

        let mut settled: Option<Settled<T>> = None;
        let queued_now;
        {
            let mut state = shared.state.lock().unwrap();
            if state.records.contains_key(&id) || state.outcomes.contains_key(&id) {
                return Err(SubmitError::DuplicateId(id));
            }
            if state.graph.would_cycle(&id, &dependencies) {
                return Err(SubmitError::CyclicDependency(id));
            }

            let mut unresolved: HashSet<TaskId> = HashSet::new();
            let mut failed_dep: Option<TaskId> = None;
            for dep in dependencies {
                match state.outcomes.get(&dep) {
                    Some(outcome) if outcome.is_success() => {}
                    Some(_) => {
                        failed_dep = Some(dep);
                        break;
                    }
                    None => {
                        unresolved.insert(dep);
                    }
                }
            }

            let (done, _) = watch::channel(false);
            let mut record = TaskRecord {
                priority,
                work,
                budget,
                callback,
                phase: TaskPhase::PendingDeps,
                retries: 0,
                timestamps: TaskTimestamps {
                    created: Some(now),
                    ..Default::default()
                },
                done,
            };
            self.shared.counters.submitted.fetch_add(1, Ordering::Relaxed);

            if let Some(dep) = failed_dep {
                // A dependency already reached FAILED or CANCELLED.
                state.records.insert(id.clone(), record);
                settled = Some(settle_locked(
                    shared,
                    &mut state,
                    &id,
                    Err(TaskFailure::DependencyFailed { dep }),
                    now,
                    Duration::ZERO,
                ));
                queued_now = false;
            } else if unresolved.is_empty() {
                record.phase = TaskPhase::Queued;
                state.queues[priority.index()].push_back(id.clone());
                state.records.insert(id.clone(), record);
                queued_now = true;
            } else {
                state.graph.insert(&id, unresolved);
                state.records.insert(id.clone(), record);
                queued_now = false;
            }
        }

        shared.config.event_listeners.emit(&TaskEvent::Submitted {
            source: shared.config.name.clone(),
            timestamp: now,
            id: id.clone(),
            priority,
        });
        #[cfg(feature = "metrics")]
        counter!("batchline_tasks_submitted_total", "pipeline" => shared.config.name.clone())
            .increment(1);

        if let Some(settled) = settled {
            deliver(shared, settled);
        } else if queued_now {
            shared.work_available.notify_one();
        }
        Ok(())
    }

    /// Blocks until the task reaches a terminal state or the timeout
    /// elapses. Safe to call from multiple callers for the same id; each
    /// receives a clone of the outcome.
    pub async fn await_task(
        &self,
        id: &str,
        timeout: Option<Duration>,
    ) -> Result<TaskOutcome<T>, AwaitError> {
        let mut done = {
            let state = self.shared.state.lock().unwrap();
            if let Some(outcome) = state.outcomes.get(id) {
                return Ok(outcome.clone());
            }
            match state.records.get(id) {
                Some(record) => record.done.subscribe(),
                None => return Err(AwaitError::UnknownTask(id.to_string())),
            }
        };

        let wait = async {
            loop {
                if *done.borrow_and_update() {
                    break;
                }
                if done.changed().await.is_err() {
                    break;
                }
            }
        };
        match timeout {
            Some(limit) => tokio::time::timeout(limit, wait)
                .await
                .map_err(|_| AwaitError::Timeout)?,
            None => wait.await,
        }

        let state = self.shared.state.lock().unwrap();
        state
            .outcomes
            .get(id)
            .cloned()
            .ok_or_else(|| AwaitError::UnknownTask(id.to_string()))
    }

    /// Blocks until the pending-deps set, every queue, and the in-flight
    /// set are all empty. Not atomic with concurrent submits; intended for
    /// drain-before-shutdown.
    pub async fn await_idle(&self, timeout: Option<Duration>) -> Result<(), AwaitError> {
        let wait = async {
            loop {
                let notified = self.shared.idle.notified();
                if self.shared.state.lock().unwrap().is_idle() {
                    return;
                }
                tokio::select! {
                    _ = notified => {}
                    _ = tokio::time::sleep(IDLE_POLL) => {}
                }
            }
        };
        match timeout {
            Some(limit) => tokio::time::timeout(limit, wait)
                .await
                .map_err(|_| AwaitError::Timeout),
            None => {
                wait.await;
                Ok(())
            }
        }
    }

    /// Cancels a task. Pending and queued tasks are recorded CANCELLED
    /// synchronously; a running task is signalled and recorded CANCELLED
    /// when its work returns. Idempotent: cancelling a terminal or unknown
    /// task is a no-op. Returns true if this call took effect.
    pub fn cancel(&self, id: &str) -> bool {
        let shared = &self.shared;
        let now = shared.config.clock.now();
        let mut delivered: Vec<Settled<T>> = Vec::new();
        let took_effect;
        {
            let mut state = shared.state.lock().unwrap();
            if state.outcomes.contains_key(id) {
                return false;
            }
            let (phase, priority) = match state.records.get(id) {
                Some(record) => (record.phase, record.priority),
                None => return false,
            };
            match phase {
                TaskPhase::PendingDeps => {
                    state.graph.remove(id);
                    delivered.push(settle_locked(
                        shared,
                        &mut state,
                        id,
                        Err(TaskFailure::Cancelled),
                        now,
                        Duration::ZERO,
                    ));
                    delivered.extend(fail_dependents_locked(shared, &mut state, id, now));
                    took_effect = true;
                }
                TaskPhase::Queued => {
                    state.queues[priority.index()].retain(|queued| queued != id);
                    delivered.push(settle_locked(
                        shared,
                        &mut state,
                        id,
                        Err(TaskFailure::Cancelled),
                        now,
                        Duration::ZERO,
                    ));
                    delivered.extend(fail_dependents_locked(shared, &mut state, id, now));
                    took_effect = true;
                }
                TaskPhase::Running => {
                    state.cancel_requested.insert(id.to_string());
                    if let Some(abort) = state.aborts.get(id) {
                        abort.abort();
                    }
                    took_effect = true;
                }
                _ => {
                    took_effect = false;
                }
            }
        }
        for settled in delivered {
            deliver(shared, settled);
        }
        took_effect
    }

    /// Returns the task's current phase, or `None` for an unknown id.
    pub fn task_status(&self, id: &str) -> Option<TaskPhase> {
        let state = self.shared.state.lock().unwrap();
        if let Some(record) = state.records.get(id) {
            return Some(record.phase);
        }
        state.outcomes.get(id).map(TaskOutcome::phase)
    }

    /// Drops recorded outcomes to free memory. Ids cleared here may be
    /// resubmitted afterwards.
    pub fn clear_completed(&self) {
        let mut state = self.shared.state.lock().unwrap();
        let cleared = state.outcomes.len();
        state.outcomes.clear();
        tracing::debug!(
            pipeline = %self.shared.config.name,
            cleared,
            "cleared completed task outcomes"
        );
    }

    /// Point-in-time metrics snapshot.
    pub fn metrics(&self) -> PipelineMetrics {
        let now = self.shared.config.clock.now();
        let counters = &self.shared.counters;
        let state = self.shared.state.lock().unwrap();
        let State {
            graph,
            records,
            outcomes,
            in_flight,
            ..
        } = &*state;
        let orphans = graph.orphans(|dep| records.contains_key(dep) || outcomes.contains_key(dep));
        PipelineMetrics {
            submitted: counters.submitted.load(Ordering::Relaxed),
            completed: counters.completed.load(Ordering::Relaxed),
            failed: counters.failed.load(Ordering::Relaxed),
            cancelled: counters.cancelled.load(Ordering::Relaxed),
            retries: counters.retries.load(Ordering::Relaxed),
            callback_panics: counters.callback_panics.load(Ordering::Relaxed),
            queue_depths: state.queue_depths(),
            in_flight: in_flight.len(),
            pending_deps: graph.pending_count(),
            pending_deps_orphans: orphans,
            peak_in_flight: counters.peak_in_flight.load(Ordering::Relaxed),
            worker_utilization: in_flight.len() as f64 / self.shared.config.max_workers as f64,
            throughput_per_sec: counters.completions.rate_per_second(now),
            avg_execution_ms: counters.exec_times.mean(),
        }
    }
}

/// Moves a task to a terminal state. Must be called with the state lock
/// held; the returned [`Settled`] is delivered after the lock is dropped.
fn settle_locked<T: Clone>(
    shared: &Shared<T>,
    state: &mut State<T>,
    id: &str,
    result: Result<T, TaskFailure>,
    now: Instant,
    duration: Duration,
) -> Settled<T> {
    let mut record = state
        .records
        .remove(id)
        .expect("settling a task requires a live record");
    record.timestamps.completed = Some(now);
    record.phase = match &result {
        Ok(_) => TaskPhase::Completed,
        Err(TaskFailure::Cancelled) => TaskPhase::Cancelled,
        Err(_) => TaskPhase::Failed,
    };
    match record.phase {
        TaskPhase::Completed => {
            shared.counters.completed.fetch_add(1, Ordering::Relaxed);
            shared.counters.exec_times.record(now, duration.as_secs_f64() * 1000.0);
            shared.counters.completions.record(now, 1.0);
        }
        TaskPhase::Cancelled => {
            shared.counters.cancelled.fetch_add(1, Ordering::Relaxed);
        }
        _ => {
            shared.counters.failed.fetch_add(1, Ordering::Relaxed);
        }
    }
    let outcome = TaskOutcome {
        id: id.to_string(),
        result,
        retries: record.retries,
        duration,
        timestamps: record.timestamps,
    };
    state.outcomes.insert(id.to_string(), outcome.clone());
    state.cancel_requested.remove(id);
    Settled {
        outcome,
        callback: record.callback.take(),
        done: record.done,
    }
}

/// Transitively fails every dependent of a task that just reached FAILED
/// or CANCELLED. Lock must be held.
fn fail_dependents_locked<T: Clone>(
    shared: &Shared<T>,
    state: &mut State<T>,
    failed: &str,
    now: Instant,
) -> Vec<Settled<T>> {
    let doomed = state.graph.fail_closure(failed);
    let mut settled = Vec::with_capacity(doomed.len());
    for (dependent, cause) in doomed {
        settled.push(settle_locked(
            shared,
            state,
            &dependent,
            Err(TaskFailure::DependencyFailed { dep: cause }),
            now,
            Duration::ZERO,
        ));
    }
    settled
}

/// Post-lock delivery: completion signal, per-task callback, events, and
/// exported counters.
fn deliver<T>(shared: &Shared<T>, settled: Settled<T>) {
    let Settled {
        outcome,
        callback,
        done,
    } = settled;

    // Callback first: it happens-before any await_task return for this id.
    if let Some(callback) = callback {
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            callback(&outcome);
        }));
        if result.is_err() {
            shared
                .counters
                .callback_panics
                .fetch_add(1, Ordering::Relaxed);
            tracing::warn!(
                pipeline = %shared.config.name,
                task = %outcome.id,
                "completion callback panicked"
            );
        }
    }

    done.send_replace(true);

    let now = outcome
        .timestamps
        .completed
        .unwrap_or_else(|| shared.config.clock.now());
    let event = match &outcome.result {
        Ok(_) => TaskEvent::Completed {
            source: shared.config.name.clone(),
            timestamp: now,
            id: outcome.id.clone(),
            duration: outcome.duration,
        },
        Err(TaskFailure::Cancelled) => TaskEvent::Cancelled {
            source: shared.config.name.clone(),
            timestamp: now,
            id: outcome.id.clone(),
        },
        Err(failure) => TaskEvent::Failed {
            source: shared.config.name.clone(),
            timestamp: now,
            id: outcome.id.clone(),
            kind: failure.kind(),
        },
    };
    shared.config.event_listeners.emit(&event);

    #[cfg(feature = "metrics")]
    match &outcome.result {
        Ok(_) => {
            counter!("batchline_tasks_completed_total", "pipeline" => shared.config.name.clone())
                .increment(1);
        }
        Err(failure) => {
            counter!(
                "batchline_tasks_failed_total",
                "pipeline" => shared.config.name.clone(),
                "kind" => failure.kind()
            )
            .increment(1);
        }
    }

    if shared.state.lock().unwrap().is_idle() {
        shared.idle.notify_waiters();
    }
}

/// A popped, ready-to-run task.
struct Exec<T> {
    id: TaskId,
    work: WorkFn<T>,
    budget: TaskBudget,
    attempt: u32,
}

fn pop_ready<T>(shared: &Shared<T>, state: &mut State<T>) -> Option<Exec<T>> {
    let now = shared.config.clock.now();
    for queue in state.queues.iter_mut() {
        while let Some(id) = queue.pop_front() {
            let Some(record) = state.records.get_mut(&id) else {
                continue;
            };
            record.phase = TaskPhase::Running;
            record.timestamps.first_started.get_or_insert(now);
            record.timestamps.last_started = Some(now);
            state.in_flight.insert(id.clone());
            shared.counters.observe_in_flight(state.in_flight.len());
            return Some(Exec {
                id,
                work: Arc::clone(&record.work),
                budget: record.budget,
                attempt: record.retries + 1,
            });
        }
    }
    None
}

async fn worker_loop<T: Clone + Send + 'static>(shared: Arc<Shared<T>>) {
    loop {
        if !shared.running.load(Ordering::SeqCst) {
            break;
        }
        let permit = match Arc::clone(&shared.semaphore).acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => break,
        };
        // Re-check after a potentially long semaphore wait.
        if !shared.running.load(Ordering::SeqCst) {
            break;
        }
        let next = {
            let mut state = shared.state.lock().unwrap();
            pop_ready(&shared, &mut state)
        };
        match next {
            Some(exec) => {
                execute(&shared, exec).await;
                drop(permit);
            }
            None => {
                drop(permit);
                let notified = shared.work_available.notified();
                tokio::select! {
                    _ = notified => {}
                    _ = tokio::time::sleep(IDLE_POLL) => {}
                }
            }
        }
    }
}

async fn execute<T: Clone + Send + 'static>(shared: &Arc<Shared<T>>, exec: Exec<T>) {
    let Exec {
        id,
        work,
        budget,
        attempt,
    } = exec;

    shared.config.event_listeners.emit(&TaskEvent::Started {
        source: shared.config.name.clone(),
        timestamp: shared.config.clock.now(),
        id: id.clone(),
        attempt,
    });

    let started = shared.config.clock.now();
    let handle = tokio::spawn((work)());
    {
        let mut state = shared.state.lock().unwrap();
        state.aborts.insert(id.clone(), handle.abort_handle());
        if state.cancel_requested.contains(&id) {
            handle.abort();
        }
    }

    let verdict = match tokio::time::timeout(budget.timeout, handle).await {
        Ok(Ok(Ok(value))) => Verdict::Success(value),
        Ok(Ok(Err(err))) => Verdict::Failure(TaskFailure::work(err)),
        Ok(Err(join_err)) if join_err.is_cancelled() => Verdict::Cancelled,
        Ok(Err(join_err)) => {
            Verdict::Failure(TaskFailure::work(format!("task panicked: {join_err}").into()))
        }
        Err(_) => {
            // The spawned work is still running; reclaim the worker and
            // request cooperative cancellation through the abort handle.
            let state = shared.state.lock().unwrap();
            if let Some(abort) = state.aborts.get(&id) {
                abort.abort();
            }
            Verdict::Failure(TaskFailure::Timeout {
                timeout: budget.timeout,
            })
        }
    };
    let duration = shared.config.clock.now().saturating_duration_since(started);

    finalize(shared, &id, verdict, duration);
}

fn finalize<T: Clone + Send + 'static>(
    shared: &Arc<Shared<T>>,
    id: &str,
    verdict: Verdict<T>,
    duration: Duration,
) {
    let now = shared.config.clock.now();
    let mut delivered: Vec<Settled<T>> = Vec::new();
    let mut released: Vec<TaskId> = Vec::new();
    let mut retried_attempt: Option<u32> = None;

    {
        let mut guard = shared.state.lock().unwrap();
        let state = &mut *guard;
        state.in_flight.remove(id);
        state.aborts.remove(id);
        let cancel_requested = state.cancel_requested.remove(id);

        match verdict {
            Verdict::Success(value) => {
                delivered.push(settle_locked(shared, state, id, Ok(value), now, duration));
                for ready in state.graph.resolve(id) {
                    if let Some(record) = state.records.get_mut(&ready) {
                        record.phase = TaskPhase::Queued;
                        let index = record.priority.index();
                        state.queues[index].push_back(ready.clone());
                        released.push(ready);
                    }
                }
            }
            Verdict::Cancelled => {
                delivered.push(settle_locked(
                    shared,
                    state,
                    id,
                    Err(TaskFailure::Cancelled),
                    now,
                    duration,
                ));
                delivered.extend(fail_dependents_locked(shared, state, id, now));
            }
            Verdict::Failure(failure) => {
                // A cancellation that raced work completion still counts
                // as a cancel.
                let failure = if cancel_requested {
                    TaskFailure::Cancelled
                } else {
                    failure
                };
                let record = state
                    .records
                    .get_mut(id)
                    .expect("finalizing a task requires a live record");
                if failure.retryable() && record.retries < record.budget.max_retries {
                    record.retries += 1;
                    record.phase = TaskPhase::Queued;
                    let index = record.priority.index();
                    let attempt = record.retries;
                    state.queues[index].push_back(id.to_string());
                    shared.counters.retries.fetch_add(1, Ordering::Relaxed);
                    retried_attempt = Some(attempt);
                } else {
                    // Terminal failures report the retry count at the
                    // attempt that exhausted the budget.
                    if failure.retryable() {
                        record.retries += 1;
                    }
                    delivered.push(settle_locked(shared, state, id, Err(failure), now, duration));
                    delivered.extend(fail_dependents_locked(shared, state, id, now));
                }
            }
        }
    }

    if let Some(attempt) = retried_attempt {
        shared.config.event_listeners.emit(&TaskEvent::Retried {
            source: shared.config.name.clone(),
            timestamp: now,
            id: id.to_string(),
            attempt,
        });
        #[cfg(feature = "metrics")]
        counter!("batchline_task_retries_total", "pipeline" => shared.config.name.clone())
            .increment(1);
        shared.work_available.notify_one();
    }
    for settled in delivered {
        deliver(shared, settled);
    }
    for _ in &released {
        shared.work_available.notify_one();
    }
}

async fn metrics_loop<T: Clone + Send + 'static>(shared: Arc<Shared<T>>) {
    let mut interval = tokio::time::interval(shared.config.metrics_interval);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    loop {
        interval.tick().await;
        if !shared.running.load(Ordering::SeqCst) {
            break;
        }
        let pipeline = Pipeline {
            shared: Arc::clone(&shared),
        };
        let snapshot = pipeline.metrics();
        tracing::debug!(
            pipeline = %shared.config.name,
            completed = snapshot.completed,
            failed = snapshot.failed,
            in_flight = snapshot.in_flight,
            queued = snapshot.queue_depths.total(),
            throughput = snapshot.throughput_per_sec,
            "pipeline metrics tick"
        );
        #[cfg(feature = "metrics")]
        {
            let name = shared.config.name.clone();
            gauge!("batchline_pipeline_in_flight", "pipeline" => name.clone())
                .set(snapshot.in_flight as f64);
            gauge!("batchline_pipeline_queue_depth", "pipeline" => name.clone())
                .set(snapshot.queue_depths.total() as f64);
            gauge!("batchline_pipeline_worker_utilization", "pipeline" => name.clone())
                .set(snapshot.worker_utilization);
            gauge!("batchline_pipeline_throughput_per_sec", "pipeline" => name.clone())
                .set(snapshot.throughput_per_sec);
            gauge!("batchline_pipeline_pending_deps_orphans", "pipeline" => name)
                .set(snapshot.pending_deps_orphans as f64);
        }
    }
}
