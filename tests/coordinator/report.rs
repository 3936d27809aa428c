//! Snapshots, baselines, recommendations, and optimiser callbacks.

use batchline::{Coordinator, CoordinatorConfig, ProcessOptions};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn coordinator(metrics_interval: Duration) -> Coordinator {
    Coordinator::new(
        CoordinatorConfig::builder()
            .name("report-tests")
            .max_workers(4)
            .disk_enabled(false)
            .prefetch_enabled(false)
            .metrics_interval(metrics_interval)
            .build(),
    )
}

#[tokio::test]
async fn report_reflects_both_engines() {
    let coordinator = coordinator(Duration::from_secs(3600));
    coordinator.start().await.unwrap();

    for i in 0..4 {
        coordinator
            .process(
                &format!("work:{i}"),
                || async { Ok(b"x".to_vec()) },
                ProcessOptions::default(),
            )
            .await
            .unwrap();
    }
    // Re-reads are hits.
    for i in 0..4 {
        coordinator
            .process(
                &format!("work:{i}"),
                || async { Ok(b"x".to_vec()) },
                ProcessOptions::default(),
            )
            .await
            .unwrap();
    }

    let report = coordinator.report();
    assert_eq!(report.pipeline.completed, 4);
    assert_eq!(report.cache.hits, 4);
    assert_eq!(report.cache.misses, 4);
    assert!((report.cache.hit_rate - 0.5).abs() < f64::EPSILON);
    assert!(report.generated_at_ms > 0);
    coordinator.stop().await;
}

#[tokio::test]
async fn report_serialises_to_json() {
    let coordinator = coordinator(Duration::from_secs(3600));
    coordinator.start().await.unwrap();

    let json = serde_json::to_string(&coordinator.report()).unwrap();
    assert!(json.contains("improvement_factor"));
    assert!(json.contains("recommendations"));
    assert!(json.contains("throughput_per_sec"));
    coordinator.stop().await;
}

#[tokio::test]
async fn baseline_enables_regression_verdicts() {
    let coordinator = coordinator(Duration::from_secs(3600));
    coordinator.start().await.unwrap();

    // No baseline: the factor is the neutral 1.0 and no verdict appears.
    let before = coordinator.report();
    assert_eq!(before.improvement_factor, 1.0);
    assert!(!before
        .recommendations
        .iter()
        .any(|r| r.contains("regression") || r.contains("improved")));

    coordinator.set_baseline();
    let after = coordinator.report();
    assert!(after
        .recommendations
        .iter()
        .any(|r| r.contains("regression") || r.contains("improved")));
    coordinator.stop().await;
}

#[tokio::test]
async fn optimizers_receive_periodic_snapshots() {
    let coordinator = coordinator(Duration::from_millis(50));
    coordinator.start().await.unwrap();

    let ticks = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&ticks);
    coordinator.register_optimizer(move |_snapshot| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    tokio::time::sleep(Duration::from_millis(400)).await;
    assert!(ticks.load(Ordering::SeqCst) >= 2, "optimiser never ticked");
    coordinator.stop().await;
}

#[tokio::test]
async fn panicking_optimizer_does_not_kill_the_ticker() {
    let coordinator = coordinator(Duration::from_millis(50));
    coordinator.start().await.unwrap();

    coordinator.register_optimizer(|_| panic!("bad autotuner"));
    let ticks = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&ticks);
    coordinator.register_optimizer(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    tokio::time::sleep(Duration::from_millis(400)).await;
    assert!(
        ticks.load(Ordering::SeqCst) >= 2,
        "ticker died after an optimiser panic"
    );
    coordinator.stop().await;
}

#[tokio::test]
async fn low_hit_rate_recommends_cache_growth() {
    let coordinator = coordinator(Duration::from_secs(3600));
    coordinator.start().await.unwrap();

    // All misses.
    for i in 0..4 {
        coordinator
            .process(
                &format!("cold:{i}"),
                || async { Ok(Vec::new()) },
                ProcessOptions::default(),
            )
            .await
            .unwrap();
    }

    let report = coordinator.report();
    assert!(report
        .recommendations
        .iter()
        .any(|r| r.contains("cache size")));
    coordinator.stop().await;
}
