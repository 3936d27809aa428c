//! Dependency graph behaviour: release on completion, transitive failure,
//! cycle rejection, and parked tasks waiting on unknown parents.

use batchline_pipeline::{
    Pipeline, PipelineConfig, SubmitError, Task, TaskFailure, TaskPhase,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn pipeline() -> Pipeline<u32> {
    Pipeline::new(
        PipelineConfig::builder()
            .name("dep-tests")
            .max_workers(4)
            .metrics_interval(Duration::from_secs(3600))
            .build(),
    )
}

fn ok_task(id: &str, deps: &[&str], order: &Arc<Mutex<Vec<String>>>) -> Task<u32> {
    let order = Arc::clone(order);
    let label = id.to_string();
    Task::builder(id)
        .depends_on(deps.iter().copied())
        .work(move || {
            let order = Arc::clone(&order);
            let label = label.clone();
            async move {
                order.lock().unwrap().push(label);
                Ok(0)
            }
        })
        .build()
}

fn failing_task(id: &str) -> Task<u32> {
    Task::builder(id)
        .max_retries(0)
        .work(|| async { Err("deliberate failure".into()) })
        .build()
}

#[tokio::test]
async fn chain_completes_in_dependency_order() {
    let pipeline = pipeline();
    pipeline.start().await;

    let order = Arc::new(Mutex::new(Vec::new()));
    pipeline.submit(ok_task("a", &[], &order)).unwrap();
    pipeline.submit(ok_task("b", &["a"], &order)).unwrap();
    pipeline.submit(ok_task("c", &["b"], &order)).unwrap();

    let outcome = pipeline.await_task("c", Some(Duration::from_secs(10))).await.unwrap();
    assert!(outcome.is_success());
    assert_eq!(*order.lock().unwrap(), vec!["a", "b", "c"]);
    pipeline.stop().await;
}

#[tokio::test]
async fn child_submitted_before_parent_still_runs() {
    let pipeline = pipeline();
    pipeline.start().await;

    let order = Arc::new(Mutex::new(Vec::new()));
    // Child first; the parent id is unknown at this point.
    pipeline.submit(ok_task("child", &["parent"], &order)).unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(pipeline.task_status("child"), Some(TaskPhase::PendingDeps));
    assert_eq!(pipeline.metrics().pending_deps_orphans, 1);

    pipeline.submit(ok_task("parent", &[], &order)).unwrap();
    let outcome = pipeline
        .await_task("child", Some(Duration::from_secs(10)))
        .await
        .unwrap();
    assert!(outcome.is_success());
    assert_eq!(*order.lock().unwrap(), vec!["parent", "child"]);
    assert_eq!(pipeline.metrics().pending_deps_orphans, 0);
    pipeline.stop().await;
}

#[tokio::test]
async fn failed_dependency_fails_dependents_transitively() {
    let pipeline = pipeline();
    pipeline.start().await;

    let order = Arc::new(Mutex::new(Vec::new()));
    pipeline.submit(failing_task("root")).unwrap();
    pipeline.submit(ok_task("mid", &["root"], &order)).unwrap();
    pipeline.submit(ok_task("leaf", &["mid"], &order)).unwrap();

    let mid = pipeline.await_task("mid", Some(Duration::from_secs(10))).await.unwrap();
    match mid.result {
        Err(TaskFailure::DependencyFailed { dep }) => assert_eq!(dep, "root"),
        other => panic!("expected DependencyFailed, got {other:?}"),
    }

    let leaf = pipeline.await_task("leaf", Some(Duration::from_secs(10))).await.unwrap();
    match leaf.result {
        Err(TaskFailure::DependencyFailed { dep }) => assert_eq!(dep, "mid"),
        other => panic!("expected DependencyFailed, got {other:?}"),
    }

    // Neither dependent ever ran.
    assert!(order.lock().unwrap().is_empty());
    pipeline.stop().await;
}

#[tokio::test]
async fn dependency_already_failed_at_submit_fails_immediately() {
    let pipeline = pipeline();
    pipeline.start().await;

    pipeline.submit(failing_task("dead")).unwrap();
    let dead = pipeline.await_task("dead", Some(Duration::from_secs(10))).await.unwrap();
    assert!(!dead.is_success());

    let order = Arc::new(Mutex::new(Vec::new()));
    pipeline.submit(ok_task("late", &["dead"], &order)).unwrap();
    let late = pipeline.await_task("late", Some(Duration::from_secs(10))).await.unwrap();
    assert!(matches!(
        late.result,
        Err(TaskFailure::DependencyFailed { .. })
    ));
    pipeline.stop().await;
}

#[tokio::test]
async fn dependency_on_completed_task_is_already_satisfied() {
    let pipeline = pipeline();
    pipeline.start().await;

    let order = Arc::new(Mutex::new(Vec::new()));
    pipeline.submit(ok_task("done", &[], &order)).unwrap();
    pipeline
        .await_task("done", Some(Duration::from_secs(10)))
        .await
        .unwrap();

    pipeline.submit(ok_task("after", &["done"], &order)).unwrap();
    let outcome = pipeline
        .await_task("after", Some(Duration::from_secs(10)))
        .await
        .unwrap();
    assert!(outcome.is_success());
    pipeline.stop().await;
}

#[tokio::test]
async fn two_task_cycle_is_rejected_at_submit() {
    let pipeline = pipeline();
    pipeline.start().await;

    let order = Arc::new(Mutex::new(Vec::new()));
    // "first" waits on the not-yet-submitted "second".
    pipeline.submit(ok_task("first", &["second"], &order)).unwrap();
    // Submitting "second" depending on "first" would close the cycle.
    let err = pipeline
        .submit(ok_task("second", &["first"], &order))
        .unwrap_err();
    assert_eq!(err, SubmitError::CyclicDependency("second".into()));
    pipeline.stop().await;
}

#[tokio::test]
async fn diamond_dependencies_release_once_all_parents_finish() {
    let pipeline = pipeline();
    pipeline.start().await;

    let order = Arc::new(Mutex::new(Vec::new()));
    pipeline.submit(ok_task("top", &[], &order)).unwrap();
    pipeline.submit(ok_task("left", &["top"], &order)).unwrap();
    pipeline.submit(ok_task("right", &["top"], &order)).unwrap();
    pipeline
        .submit(ok_task("bottom", &["left", "right"], &order))
        .unwrap();

    let outcome = pipeline
        .await_task("bottom", Some(Duration::from_secs(10)))
        .await
        .unwrap();
    assert!(outcome.is_success());

    let seen = order.lock().unwrap().clone();
    assert_eq!(seen[0], "top");
    assert_eq!(seen[3], "bottom");
    pipeline.stop().await;
}
