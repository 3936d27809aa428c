//! Cancellation, await semantics, and lifecycle edges.

use batchline_pipeline::{
    AwaitError, Pipeline, PipelineConfig, Task, TaskFailure, TaskPhase,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

fn pipeline(workers: usize) -> Pipeline<u32> {
    Pipeline::new(
        PipelineConfig::builder()
            .name("cancel-tests")
            .max_workers(workers)
            .max_concurrent(workers)
            .metrics_interval(Duration::from_secs(3600))
            .build(),
    )
}

fn gated_task(id: &str, gate: &Arc<Semaphore>) -> Task<u32> {
    let gate = Arc::clone(gate);
    Task::builder(id)
        .work(move || {
            let gate = Arc::clone(&gate);
            async move {
                let _permit = gate.acquire().await;
                Ok(0)
            }
        })
        .build()
}

#[tokio::test]
async fn cancelling_a_queued_task_is_synchronous() {
    let pipeline = pipeline(1);
    pipeline.start().await;

    let gate = Arc::new(Semaphore::new(0));
    pipeline.submit(gated_task("blocker", &gate)).unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    pipeline
        .submit(Task::builder("queued").work(|| async { Ok(1) }).build())
        .unwrap();
    assert!(pipeline.cancel("queued"));
    assert_eq!(pipeline.task_status("queued"), Some(TaskPhase::Cancelled));

    let outcome = pipeline
        .await_task("queued", Some(Duration::from_secs(5)))
        .await
        .unwrap();
    assert!(matches!(outcome.result, Err(TaskFailure::Cancelled)));

    gate.add_permits(1);
    pipeline.stop().await;
}

#[tokio::test]
async fn cancel_is_idempotent() {
    let pipeline = pipeline(1);
    pipeline.start().await;

    let gate = Arc::new(Semaphore::new(0));
    pipeline.submit(gated_task("blocker", &gate)).unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    pipeline
        .submit(Task::builder("victim").work(|| async { Ok(1) }).build())
        .unwrap();

    assert!(pipeline.cancel("victim"));
    // Second call is a no-op.
    assert!(!pipeline.cancel("victim"));
    // Unknown ids are no-ops too.
    assert!(!pipeline.cancel("ghost"));

    gate.add_permits(1);
    pipeline.stop().await;
}

#[tokio::test]
async fn cancelling_running_work_records_cancelled() {
    let pipeline = pipeline(2);
    pipeline.start().await;

    let gate = Arc::new(Semaphore::new(0));
    pipeline.submit(gated_task("running", &gate)).unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(pipeline.task_status("running"), Some(TaskPhase::Running));

    assert!(pipeline.cancel("running"));
    let outcome = pipeline
        .await_task("running", Some(Duration::from_secs(5)))
        .await
        .unwrap();
    assert!(matches!(outcome.result, Err(TaskFailure::Cancelled)));
    assert_eq!(pipeline.metrics().cancelled, 1);
    pipeline.stop().await;
}

#[tokio::test]
async fn cancelling_a_pending_task_fails_its_dependents() {
    let pipeline = pipeline(2);
    pipeline.start().await;

    let gate = Arc::new(Semaphore::new(0));
    pipeline.submit(gated_task("parent", &gate)).unwrap();
    pipeline
        .submit(
            Task::builder("child")
                .depends_on(["parent"])
                .work(|| async { Ok(1) })
                .build(),
        )
        .unwrap();
    pipeline
        .submit(
            Task::builder("grandchild")
                .depends_on(["child"])
                .work(|| async { Ok(2) })
                .build(),
        )
        .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(pipeline.cancel("child"));
    let outcome = pipeline
        .await_task("grandchild", Some(Duration::from_secs(5)))
        .await
        .unwrap();
    assert!(matches!(
        outcome.result,
        Err(TaskFailure::DependencyFailed { .. })
    ));

    gate.add_permits(1);
    pipeline.stop().await;
}

#[tokio::test]
async fn await_timeout_leaves_the_task_untouched() {
    let pipeline = pipeline(1);
    pipeline.start().await;

    let gate = Arc::new(Semaphore::new(0));
    pipeline.submit(gated_task("slow", &gate)).unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let err = pipeline
        .await_task("slow", Some(Duration::from_millis(100)))
        .await
        .unwrap_err();
    assert_eq!(err, AwaitError::Timeout);
    assert_eq!(pipeline.task_status("slow"), Some(TaskPhase::Running));

    gate.add_permits(1);
    let outcome = pipeline
        .await_task("slow", Some(Duration::from_secs(5)))
        .await
        .unwrap();
    assert!(outcome.is_success());
    pipeline.stop().await;
}

#[tokio::test]
async fn multiple_awaiters_all_receive_the_outcome() {
    let pipeline = pipeline(2);
    pipeline.start().await;

    let gate = Arc::new(Semaphore::new(0));
    pipeline.submit(gated_task("shared", &gate)).unwrap();

    let mut waiters = Vec::new();
    for _ in 0..4 {
        let pipeline = pipeline.clone();
        waiters.push(tokio::spawn(async move {
            pipeline
                .await_task("shared", Some(Duration::from_secs(10)))
                .await
        }));
    }
    tokio::time::sleep(Duration::from_millis(50)).await;
    gate.add_permits(1);

    for waiter in waiters {
        let outcome = waiter.await.unwrap().unwrap();
        assert!(outcome.is_success());
    }
    pipeline.stop().await;
}

#[tokio::test]
async fn await_idle_drains_everything() {
    let pipeline = pipeline(4);
    pipeline.start().await;

    for i in 0..20 {
        pipeline
            .submit(
                Task::builder(format!("t{i}"))
                    .work(|| async {
                        tokio::time::sleep(Duration::from_millis(5)).await;
                        Ok(0)
                    })
                    .build(),
            )
            .unwrap();
    }
    pipeline.await_idle(Some(Duration::from_secs(10))).await.unwrap();

    let metrics = pipeline.metrics();
    assert_eq!(metrics.completed, 20);
    assert_eq!(metrics.in_flight, 0);
    assert_eq!(metrics.queue_depths.total(), 0);
    pipeline.stop().await;
}

#[tokio::test]
async fn stop_cancels_in_flight_work() {
    let pipeline = pipeline(1);
    pipeline.start().await;

    let gate = Arc::new(Semaphore::new(0));
    pipeline.submit(gated_task("doomed", &gate)).unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    pipeline.stop().await;
    assert_eq!(pipeline.task_status("doomed"), Some(TaskPhase::Cancelled));
}

#[tokio::test]
async fn clear_completed_allows_resubmission() {
    let pipeline = pipeline(2);
    pipeline.start().await;

    pipeline
        .submit(Task::builder("again").work(|| async { Ok(1) }).build())
        .unwrap();
    pipeline
        .await_task("again", Some(Duration::from_secs(5)))
        .await
        .unwrap();

    pipeline.clear_completed();
    pipeline
        .submit(Task::builder("again").work(|| async { Ok(2) }).build())
        .unwrap();
    let outcome = pipeline
        .await_task("again", Some(Duration::from_secs(5)))
        .await
        .unwrap();
    assert_eq!(outcome.result.unwrap(), 2);
    pipeline.stop().await;
}
