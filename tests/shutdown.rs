// tests/shutdown.rs

use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use jobgraph::dag::{TaskGraph, TaskGuard};
use jobgraph::engine::JobEngine;
use jobgraph::errors::JobGraphError;
use jobgraph::persist::MemoryRecordStore;
use jobgraph::types::{JobStatus, TaskStatus};
use jobgraph_test_utils::builders::{engine_config, memory_engine};
use jobgraph_test_utils::tasks::SleepTask;
use jobgraph_test_utils::{init_tracing, with_timeout};

type TestResult = Result<(), Box<dyn Error>>;

fn sleepy(ms: u64) -> Result<TaskGraph, Box<dyn Error>> {
    let mut g = TaskGraph::new();
    g.add_task(
        SleepTask::new("sleep", Duration::from_millis(ms)),
        TaskGuard::default(),
        &[],
    )?;
    Ok(g)
}

#[tokio::test]
async fn shutdown_drains_active_jobs() -> TestResult {
    init_tracing();
    let (engine, _store) = memory_engine(2, 2);

    let job = engine.submit("draining", sleepy(50)?, false).await?;
    assert!(engine.is_active());

    with_timeout(engine.shutdown()).await?;

    assert!(!engine.is_active());
    assert_eq!(engine.active_job_count(), 0);
    assert!(job.is_finished());
    assert_eq!(job.status(), JobStatus::Passed);
    Ok(())
}

#[tokio::test]
async fn submissions_are_rejected_after_shutdown() -> TestResult {
    init_tracing();
    let (engine, _store) = memory_engine(1, 1);
    with_timeout(engine.shutdown()).await?;

    let err = engine.submit("too-late", sleepy(1)?, false).await.unwrap_err();
    assert!(matches!(err, JobGraphError::EngineShutdown(_)));
    Ok(())
}

#[tokio::test]
async fn shutdown_times_out_on_long_jobs() -> TestResult {
    init_tracing();
    let engine = JobEngine::new(
        engine_config(1, 1).with_shutdown_timeout(Duration::from_millis(50)),
        Arc::new(MemoryRecordStore::new()),
    );

    let job = engine.submit("stuck", sleepy(10_000)?, false).await?;
    let err = with_timeout(engine.shutdown()).await.unwrap_err();
    assert!(matches!(err, JobGraphError::DrainTimeout(1)));

    // The running job is still tracked; aborting it ends it.
    assert!(job.abort("test over"));
    with_timeout(job.wait_for_completion()).await;
    assert_eq!(engine.active_job_count(), 0);
    Ok(())
}

#[tokio::test]
async fn forced_shutdown_aborts_everything() -> TestResult {
    init_tracing();
    let (engine, _store) = memory_engine(1, 1);

    let running = engine.submit("running", sleepy(10_000)?, false).await?;
    let queued = engine.submit("queued", sleepy(10_000)?, false).await?;

    with_timeout(engine.shutdown_for_test()).await;

    for job in [&running, &queued] {
        assert!(job.is_finished());
        assert!(job.is_aborted());
        assert_eq!(job.status(), JobStatus::Failed);
    }
    let sleep_status = running.task_status_by_name("sleep");
    assert!(matches!(
        sleep_status,
        Some(TaskStatus::Failed) | Some(TaskStatus::Skipped)
    ));
    assert_eq!(engine.active_job_count(), 0);
    Ok(())
}

#[tokio::test]
async fn aborting_a_running_job_cancels_its_tasks() -> TestResult {
    init_tracing();
    let (engine, _store) = memory_engine(2, 1);

    let mut g = TaskGraph::new();
    let first = g.add_task(
        SleepTask::new("first", Duration::from_secs(10)),
        TaskGuard::default(),
        &[],
    )?;
    let second = g.add_task(
        SleepTask::new("second", Duration::from_millis(1)),
        TaskGuard::AllPredecessorsCompleted,
        &[first],
    )?;
    let job = engine.submit("abortable", g, false).await?;

    // Wait until the first task is actually running.
    let running = jobgraph_test_utils::eventually(Duration::from_secs(2), || {
        job.task_status(first) == Some(TaskStatus::Running)
    })
    .await;
    assert!(running);

    assert!(engine.abort_job(job.id(), "operator request"));
    let status = with_timeout(job.wait_for_completion()).await;

    assert_eq!(status, JobStatus::Failed);
    assert_eq!(job.failure_reason().as_deref(), Some("operator request"));
    assert_eq!(job.task_status(first), Some(TaskStatus::Failed));
    assert_eq!(job.task_status(second), Some(TaskStatus::Skipped));
    // A second abort is a no-op.
    assert!(!job.abort("again"));
    Ok(())
}
