//! Cache-then-pipeline routing.

use batchline::{Coordinator, CoordinatorConfig, ProcessError, ProcessOptions, TaskFailure};
use batchline_pipeline::WorkFn;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn coordinator() -> Coordinator {
    Coordinator::new(
        CoordinatorConfig::builder()
            .name("proc-tests")
            .max_workers(4)
            .disk_enabled(false)
            .prefetch_enabled(false)
            .metrics_interval(Duration::from_secs(3600))
            .build(),
    )
}

#[tokio::test]
async fn repeated_keys_run_the_work_once() {
    let coordinator = coordinator();
    coordinator.start().await.unwrap();

    let runs = Arc::new(AtomicUsize::new(0));
    for _ in 0..5 {
        let runs = Arc::clone(&runs);
        let value = coordinator
            .process(
                "analysis:lib.rs",
                move || {
                    let runs = Arc::clone(&runs);
                    async move {
                        runs.fetch_add(1, Ordering::SeqCst);
                        Ok(b"report".to_vec())
                    }
                },
                ProcessOptions::default(),
            )
            .await
            .unwrap();
        assert_eq!(value, b"report");
    }

    assert_eq!(runs.load(Ordering::SeqCst), 1);
    assert_eq!(coordinator.cache().stats().hits, 4);
    coordinator.stop().await;
}

#[tokio::test]
async fn distinct_keys_run_distinct_work() {
    let coordinator = coordinator();
    coordinator.start().await.unwrap();

    let a = coordinator
        .process("file:a", || async { Ok(b"a-result".to_vec()) }, ProcessOptions::default())
        .await
        .unwrap();
    let b = coordinator
        .process("file:b", || async { Ok(b"b-result".to_vec()) }, ProcessOptions::default())
        .await
        .unwrap();
    assert_eq!(a, b"a-result");
    assert_eq!(b, b"b-result");
    coordinator.stop().await;
}

#[tokio::test]
async fn batch_preserves_input_order() {
    let coordinator = coordinator();
    coordinator.start().await.unwrap();

    // Warm one key so the batch mixes hits and misses.
    coordinator
        .process("file:1", || async { Ok(b"cached:file:1".to_vec()) }, ProcessOptions::default())
        .await
        .unwrap();

    let keys: Vec<String> = (0..6).map(|i| format!("file:{i}")).collect();
    let make_work = |key: &str| -> WorkFn<Vec<u8>> {
        let key = key.to_string();
        Arc::new(move || {
            let key = key.clone();
            Box::pin(async move { Ok(format!("computed:{key}").into_bytes()) })
        })
    };

    let results = coordinator
        .process_batch(&keys, make_work, ProcessOptions::default())
        .await;

    assert_eq!(results.len(), keys.len());
    for (i, result) in results.iter().enumerate() {
        let value = result.as_ref().unwrap();
        let text = String::from_utf8(value.clone()).unwrap();
        if i == 1 {
            assert_eq!(text, "cached:file:1");
        } else {
            assert_eq!(text, format!("computed:file:{i}"));
        }
    }
    coordinator.stop().await;
}

#[tokio::test]
async fn batch_failures_stay_in_position() {
    let coordinator = coordinator();
    coordinator.start().await.unwrap();

    let keys: Vec<String> = vec!["ok:1".into(), "bad:2".into(), "ok:3".into()];
    let make_work = |key: &str| -> WorkFn<Vec<u8>> {
        let key = key.to_string();
        Arc::new(move || {
            let key = key.clone();
            Box::pin(async move {
                if key.starts_with("bad:") {
                    Err("analysis failed".into())
                } else {
                    Ok(key.into_bytes())
                }
            })
        })
    };

    let results = coordinator
        .process_batch(
            &keys,
            make_work,
            ProcessOptions {
                max_retries: Some(0),
                ..Default::default()
            },
        )
        .await;

    assert!(results[0].is_ok());
    assert!(matches!(
        results[1],
        Err(ProcessError::Task(TaskFailure::Work { .. }))
    ));
    assert!(results[2].is_ok());
    coordinator.stop().await;
}

#[tokio::test]
async fn failed_work_is_not_cached() {
    let coordinator = coordinator();
    coordinator.start().await.unwrap();

    let attempts = Arc::new(AtomicUsize::new(0));

    let counter = Arc::clone(&attempts);
    let err = coordinator
        .process(
            "fragile",
            move || {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err("first run breaks".into())
                }
            },
            ProcessOptions {
                max_retries: Some(0),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ProcessError::Task(_)));

    // A later call with working logic runs fresh rather than seeing a
    // poisoned cache entry.
    let value = coordinator
        .process(
            "fragile",
            || async { Ok(b"recovered".to_vec()) },
            ProcessOptions::default(),
        )
        .await
        .unwrap();
    assert_eq!(value, b"recovered");
    assert_eq!(attempts.load(Ordering::SeqCst), 1);
    coordinator.stop().await;
}

#[tokio::test]
async fn per_request_timeout_applies() {
    let coordinator = coordinator();
    coordinator.start().await.unwrap();

    let err = coordinator
        .process(
            "slow",
            || async {
                tokio::time::sleep(Duration::from_secs(10)).await;
                Ok(Vec::new())
            },
            ProcessOptions {
                timeout: Some(Duration::from_millis(100)),
                max_retries: Some(0),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ProcessError::Task(TaskFailure::Timeout { .. })
    ));
    coordinator.stop().await;
}
