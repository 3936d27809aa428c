//! Retry budgets and timeout reclaim.

use batchline_pipeline::{Pipeline, PipelineConfig, Task, TaskFailure};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

fn pipeline(workers: usize) -> Pipeline<u32> {
    Pipeline::new(
        PipelineConfig::builder()
            .name("retry-tests")
            .max_workers(workers)
            .metrics_interval(Duration::from_secs(3600))
            .build(),
    )
}

#[tokio::test]
async fn deterministic_failure_exhausts_retry_budget() {
    let pipeline = pipeline(2);
    pipeline.start().await;

    let attempts = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&attempts);
    pipeline
        .submit(
            Task::builder("always-fails")
                .max_retries(2)
                .work(move || {
                    let counter = Arc::clone(&counter);
                    async move {
                        counter.fetch_add(1, Ordering::SeqCst);
                        Err("broken analyser".into())
                    }
                })
                .build(),
        )
        .unwrap();

    let outcome = pipeline
        .await_task("always-fails", Some(Duration::from_secs(10)))
        .await
        .unwrap();

    // Initial attempt plus two retries.
    assert_eq!(attempts.load(Ordering::SeqCst), 3);
    assert_eq!(outcome.retries, 3);
    match outcome.result {
        Err(TaskFailure::Work { source }) => {
            assert!(source.to_string().contains("broken analyser"));
        }
        other => panic!("expected work failure, got {other:?}"),
    }
    assert_eq!(pipeline.metrics().retries, 2);
    pipeline.stop().await;
}

#[tokio::test]
async fn transient_failure_recovers_within_budget() {
    let pipeline = pipeline(2);
    pipeline.start().await;

    let attempts = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&attempts);
    pipeline
        .submit(
            Task::builder("flaky")
                .max_retries(3)
                .work(move || {
                    let counter = Arc::clone(&counter);
                    async move {
                        if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                            Err("transient".into())
                        } else {
                            Ok(99)
                        }
                    }
                })
                .build(),
        )
        .unwrap();

    let outcome = pipeline
        .await_task("flaky", Some(Duration::from_secs(10)))
        .await
        .unwrap();
    assert_eq!(outcome.result.unwrap(), 99);
    assert_eq!(outcome.retries, 2);
    assert_eq!(attempts.load(Ordering::SeqCst), 3);
    pipeline.stop().await;
}

#[tokio::test]
async fn timeout_frees_the_worker_promptly() {
    let pipeline = pipeline(1);
    pipeline.start().await;

    let submitted = Instant::now();
    pipeline
        .submit(
            Task::builder("sleeper")
                .timeout(Duration::from_millis(100))
                .max_retries(0)
                .work(|| async {
                    tokio::time::sleep(Duration::from_secs(10)).await;
                    Ok(0)
                })
                .build(),
        )
        .unwrap();

    let outcome = pipeline
        .await_task("sleeper", Some(Duration::from_secs(5)))
        .await
        .unwrap();
    assert!(matches!(outcome.result, Err(TaskFailure::Timeout { .. })));
    assert!(
        submitted.elapsed() < Duration::from_millis(2000),
        "timeout took {:?}",
        submitted.elapsed()
    );

    // The only worker is free again: a quick task completes.
    pipeline
        .submit(Task::builder("quick").work(|| async { Ok(1) }).build())
        .unwrap();
    let outcome = pipeline
        .await_task("quick", Some(Duration::from_secs(5)))
        .await
        .unwrap();
    assert_eq!(outcome.result.unwrap(), 1);
    pipeline.stop().await;
}

#[tokio::test]
async fn timeout_participates_in_retry() {
    let pipeline = pipeline(1);
    pipeline.start().await;

    let attempts = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&attempts);
    pipeline
        .submit(
            Task::builder("slow-then-fast")
                .timeout(Duration::from_millis(100))
                .max_retries(1)
                .work(move || {
                    let counter = Arc::clone(&counter);
                    async move {
                        if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                            tokio::time::sleep(Duration::from_secs(5)).await;
                        }
                        Ok(7)
                    }
                })
                .build(),
        )
        .unwrap();

    let outcome = pipeline
        .await_task("slow-then-fast", Some(Duration::from_secs(10)))
        .await
        .unwrap();
    assert_eq!(outcome.result.unwrap(), 7);
    assert_eq!(outcome.retries, 1);
    pipeline.stop().await;
}

#[tokio::test]
async fn panicking_work_is_a_work_error() {
    let pipeline = pipeline(2);
    pipeline.start().await;

    pipeline
        .submit(
            Task::builder("panics")
                .max_retries(0)
                .work(|| async { panic!("analyser blew up") })
                .build(),
        )
        .unwrap();

    let outcome = pipeline
        .await_task("panics", Some(Duration::from_secs(10)))
        .await
        .unwrap();
    assert!(matches!(outcome.result, Err(TaskFailure::Work { .. })));
    pipeline.stop().await;
}

#[tokio::test]
async fn completion_callback_fires_once_with_the_outcome() {
    let pipeline = pipeline(2);
    pipeline.start().await;

    let calls = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&calls);
    pipeline
        .submit(
            Task::builder("with-callback")
                .work(|| async { Ok(5) })
                .on_complete(move |outcome| {
                    assert_eq!(outcome.id, "with-callback");
                    assert!(outcome.is_success());
                    counter.fetch_add(1, Ordering::SeqCst);
                })
                .build(),
        )
        .unwrap();

    pipeline
        .await_task("with-callback", Some(Duration::from_secs(10)))
        .await
        .unwrap();
    // The callback happens-before the await returns.
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    pipeline.stop().await;
}

#[tokio::test]
async fn panicking_callback_does_not_change_the_outcome() {
    let pipeline = pipeline(2);
    pipeline.start().await;

    pipeline
        .submit(
            Task::builder("cb-panics")
                .work(|| async { Ok(11) })
                .on_complete(|_| panic!("listener bug"))
                .build(),
        )
        .unwrap();

    let outcome = pipeline
        .await_task("cb-panics", Some(Duration::from_secs(10)))
        .await
        .unwrap();
    assert_eq!(outcome.result.unwrap(), 11);
    assert_eq!(pipeline.metrics().callback_panics, 1);
    pipeline.stop().await;
}
