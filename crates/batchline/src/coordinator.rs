//! The coordinator: routes work through the cache, submits misses to the
//! pipeline, writes results back, and runs the background optimiser.

use crate::config::CoordinatorConfig;
use crate::report::{
    improvement_factor, recommendations, Baseline, PerformanceReport, PerformanceSnapshot,
};
use batchline_cache::{Cache, CacheError, CacheLevel, SetOptions};
use batchline_core::BoxError;
use batchline_pipeline::{
    AwaitError, Pipeline, Priority, SubmitError, Task, TaskFailure, WorkFn,
};
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;

/// Errors surfaced by [`Coordinator::process`] and
/// [`Coordinator::process_batch`].
#[derive(Debug, Error)]
pub enum ProcessError {
    /// The pipeline refused the task.
    #[error(transparent)]
    Submit(#[from] SubmitError),

    /// Waiting on the task failed.
    #[error(transparent)]
    Await(#[from] AwaitError),

    /// The task reached a terminal failure.
    #[error(transparent)]
    Task(#[from] TaskFailure),
}

/// Per-request options for [`Coordinator::process`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessOptions {
    /// Priority class for the pipeline task on a miss.
    pub priority: Priority,
    /// Cache TTL for the produced value; `None` applies the configured
    /// default.
    pub ttl: Option<Duration>,
    /// Per-task timeout; `None` applies the configured default.
    pub timeout: Option<Duration>,
    /// Per-task retry budget; `None` applies the configured default.
    pub max_retries: Option<u32>,
}

/// Callback receiving each periodic metrics snapshot.
pub type OptimizerFn = Arc<dyn Fn(&PerformanceSnapshot) + Send + Sync>;

/// Binds the cache and the pipeline into one submit/await surface.
pub struct Coordinator {
    config: CoordinatorConfig,
    pipeline: Pipeline<Vec<u8>>,
    cache: Cache,
    baseline: Mutex<Option<Baseline>>,
    optimizers: Arc<Mutex<Vec<OptimizerFn>>>,
    running: AtomicBool,
    ticker: Mutex<Option<JoinHandle<()>>>,
    seq: AtomicU64,
}

impl Coordinator {
    /// Creates a coordinator and its engines from one configuration.
    /// Call [`start`](Coordinator::start) before processing.
    pub fn new(config: CoordinatorConfig) -> Self {
        let pipeline = Pipeline::new(config.pipeline_config());
        let cache = Cache::new(config.cache_config());
        Self {
            config,
            pipeline,
            cache,
            baseline: Mutex::new(None),
            optimizers: Arc::new(Mutex::new(Vec::new())),
            running: AtomicBool::new(false),
            ticker: Mutex::new(None),
            seq: AtomicU64::new(0),
        }
    }

    /// Starts the pipeline, the cache, and the optimiser ticker.
    /// Idempotent; fails if the disk tier cannot be opened.
    pub async fn start(&self) -> Result<(), CacheError> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        tracing::info!(coordinator = %self.config.name, "starting coordinator");
        if let Err(e) = self.cache.start().await {
            self.running.store(false, Ordering::SeqCst);
            return Err(e);
        }
        self.pipeline.start().await;

        let pipeline = self.pipeline.clone();
        let cache = self.cache.clone();
        let optimizers = Arc::clone(&self.optimizers);
        let interval = self.config.metrics_interval;
        *self.ticker.lock().unwrap() = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let snapshot = PerformanceSnapshot {
                    pipeline: pipeline.metrics(),
                    cache: cache.stats(),
                };
                let callbacks: Vec<OptimizerFn> = optimizers.lock().unwrap().clone();
                for callback in callbacks {
                    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                        callback(&snapshot);
                    }));
                    if result.is_err() {
                        tracing::warn!("optimizer callback panicked");
                    }
                }
            }
        }));
        Ok(())
    }

    /// Stops the optimiser ticker and both engines. Idempotent.
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        tracing::info!(coordinator = %self.config.name, "stopping coordinator");
        if let Some(ticker) = self.ticker.lock().unwrap().take() {
            ticker.abort();
        }
        self.pipeline.stop().await;
        self.cache.stop().await;
    }

    /// Returns true when started.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// The underlying cache, for direct access and prefetch registration.
    pub fn cache(&self) -> &Cache {
        &self.cache
    }

    /// The underlying pipeline, for direct task submission.
    pub fn pipeline(&self) -> &Pipeline<Vec<u8>> {
        &self.pipeline
    }

    /// The headline operation: probe the cache, and on a miss run `work`
    /// through the pipeline, store the result under `key`, and return it.
    pub async fn process<F, Fut>(
        &self,
        key: &str,
        work: F,
        opts: ProcessOptions,
    ) -> Result<Vec<u8>, ProcessError>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Vec<u8>, BoxError>> + Send + 'static,
    {
        if let Some(hit) = self.cache.get(key).await {
            return Ok((*hit).clone());
        }

        let task_id = self.next_task_id(key);
        let mut builder = Task::builder(task_id.as_str())
            .priority(opts.priority)
            .work(work);
        if let Some(timeout) = opts.timeout {
            builder = builder.timeout(timeout);
        }
        if let Some(retries) = opts.max_retries {
            builder = builder.max_retries(retries);
        }
        self.pipeline.submit(builder.build())?;

        let outcome = self.pipeline.await_task(&task_id, None).await?;
        let value = outcome.result?;
        self.store(key, value.clone(), opts.ttl).await;
        Ok(value)
    }

    /// Submits every miss in one pass and returns values in input order.
    pub async fn process_batch<F>(
        &self,
        keys: &[String],
        make_work: F,
        opts: ProcessOptions,
    ) -> Vec<Result<Vec<u8>, ProcessError>>
    where
        F: Fn(&str) -> WorkFn<Vec<u8>>,
    {
        enum Slot {
            Hit(Vec<u8>),
            Submitted(String),
            Refused(ProcessError),
        }

        let mut slots = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some(hit) = self.cache.get(key).await {
                slots.push(Slot::Hit((*hit).clone()));
                continue;
            }
            let task_id = self.next_task_id(key);
            let mut builder = Task::builder(task_id.as_str())
                .priority(opts.priority)
                .work_fn(make_work(key));
            if let Some(timeout) = opts.timeout {
                builder = builder.timeout(timeout);
            }
            if let Some(retries) = opts.max_retries {
                builder = builder.max_retries(retries);
            }
            match self.pipeline.submit(builder.build()) {
                Ok(()) => slots.push(Slot::Submitted(task_id)),
                Err(e) => slots.push(Slot::Refused(e.into())),
            }
        }

        let mut results = Vec::with_capacity(keys.len());
        for (key, slot) in keys.iter().zip(slots) {
            match slot {
                Slot::Hit(value) => results.push(Ok(value)),
                Slot::Refused(e) => results.push(Err(e)),
                Slot::Submitted(task_id) => {
                    let result = match self.pipeline.await_task(&task_id, None).await {
                        Ok(outcome) => match outcome.result {
                            Ok(value) => {
                                self.store(key, value.clone(), opts.ttl).await;
                                Ok(value)
                            }
                            Err(failure) => Err(failure.into()),
                        },
                        Err(e) => Err(e.into()),
                    };
                    results.push(result);
                }
            }
        }
        results
    }

    /// Registers an optimiser callback invoked with each periodic metrics
    /// snapshot. Panics in the callback are swallowed.
    pub fn register_optimizer<F>(&self, callback: F)
    where
        F: Fn(&PerformanceSnapshot) + Send + Sync + 'static,
    {
        self.optimizers.lock().unwrap().push(Arc::new(callback));
    }

    /// Captures the current metrics as the reference for future reports.
    pub fn set_baseline(&self) {
        let snapshot = self.snapshot();
        *self.baseline.lock().unwrap() = Some(Baseline {
            throughput_per_sec: snapshot.pipeline.throughput_per_sec,
            hit_rate: snapshot.cache.hit_rate,
        });
        tracing::info!(coordinator = %self.config.name, "performance baseline captured");
    }

    /// Combined metrics snapshot of both engines.
    pub fn snapshot(&self) -> PerformanceSnapshot {
        PerformanceSnapshot {
            pipeline: self.pipeline.metrics(),
            cache: self.cache.stats(),
        }
    }

    /// Builds a structured report with the improvement factor against the
    /// captured baseline and fixed-threshold recommendations.
    pub fn report(&self) -> PerformanceReport {
        let snapshot = self.snapshot();
        let baseline = *self.baseline.lock().unwrap();
        PerformanceReport {
            generated_at_ms: self.config.clock.system_time_ms(),
            improvement_factor: improvement_factor(&snapshot, baseline),
            recommendations: recommendations(&snapshot, baseline),
            pipeline: snapshot.pipeline,
            cache: snapshot.cache,
        }
    }

    async fn store(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) {
        let opts = SetOptions {
            ttl,
            level: CacheLevel::Memory,
        };
        if let Err(e) = self.cache.set(key, value, opts).await {
            tracing::warn!(coordinator = %self.config.name, key, error = %e, "failed to cache result");
        }
    }

    fn next_task_id(&self, key: &str) -> String {
        let n = self.seq.fetch_add(1, Ordering::Relaxed);
        format!("{key}#{n}")
    }
}
