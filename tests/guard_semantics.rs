// tests/guard_semantics.rs

use std::error::Error;
use std::time::Duration;

use jobgraph::dag::{TaskGraph, TaskGuard};
use jobgraph::types::{JobStatus, TaskStatus};
use jobgraph_test_utils::builders::memory_engine;
use jobgraph_test_utils::tasks::{EventLog, RecordingTask};
use jobgraph_test_utils::{init_tracing, with_timeout};

type TestResult = Result<(), Box<dyn Error>>;

/// ```text
///   A (fails) ──┐
///               ├─> D (succeeded) ──> E (succeeded)
///   B ──────────┤         │
///   │           │         v
///   └─> C ──────┴──> F (completed) ──> G (ancestors succeeded)
/// ```
#[tokio::test]
async fn mixed_guards_settle_every_node() -> TestResult {
    init_tracing();
    let (engine, _store) = memory_engine(4, 2);
    let log = EventLog::new();

    let mut g = TaskGraph::new();
    let succeeded = TaskGuard::AllPredecessorsSucceeded;
    let a = g.add_task(RecordingTask::new("A", &log).failing(), succeeded, &[])?;
    let b = g.add_task(RecordingTask::new("B", &log), succeeded, &[])?;
    let c = g.add_task(RecordingTask::new("C", &log), succeeded, &[b])?;
    let d = g.add_task(RecordingTask::new("D", &log), succeeded, &[a, b])?;
    let e = g.add_task(RecordingTask::new("E", &log), succeeded, &[d])?;
    let f = g.add_task(
        RecordingTask::new("F", &log),
        TaskGuard::AllPredecessorsCompleted,
        &[c, d],
    )?;
    let gg = g.add_task(
        RecordingTask::new("G", &log),
        TaskGuard::AllAncestorsSucceeded,
        &[f],
    )?;

    let job = with_timeout(engine.submit("guards", g, true)).await?;

    assert_eq!(job.status(), JobStatus::Failed);
    assert_eq!(job.task_status(a), Some(TaskStatus::Failed));
    assert_eq!(job.task_status(b), Some(TaskStatus::Passed));
    assert_eq!(job.task_status(c), Some(TaskStatus::Passed));
    assert_eq!(job.task_status(d), Some(TaskStatus::Skipped));
    assert_eq!(job.task_status(e), Some(TaskStatus::Skipped));
    assert_eq!(job.task_status(f), Some(TaskStatus::Passed));
    assert_eq!(job.task_status(gg), Some(TaskStatus::Skipped));

    // Skipped tasks never run.
    assert!(!log.ran("D"));
    assert!(!log.ran("E"));
    assert!(!log.ran("G"));
    assert!(log.finished_before("C", "F"));

    let reason = job.failure_reason().unwrap_or_default();
    assert!(reason.contains("task 'A' failed"), "reason was {reason}");
    Ok(())
}

#[tokio::test]
async fn all_passing_chain_passes_in_order() -> TestResult {
    init_tracing();
    let (engine, _store) = memory_engine(4, 2);
    let log = EventLog::new();

    let mut g = TaskGraph::new();
    let guard = TaskGuard::default();
    let a = g.add_task(RecordingTask::new("A", &log), guard, &[])?;
    let b = g.add_task(RecordingTask::new("B", &log), guard, &[a])?;
    g.add_task(RecordingTask::new("C", &log), guard, &[b])?;

    let job = with_timeout(engine.submit("chain", g, true)).await?;

    assert_eq!(job.status(), JobStatus::Passed);
    assert_eq!(log.started(), vec!["A", "B", "C"]);
    assert!(log.finished_before("A", "B"));
    assert!(log.finished_before("B", "C"));
    assert!(job.failure_reason().is_none());
    Ok(())
}

#[tokio::test]
async fn completed_guard_runs_after_failure() -> TestResult {
    init_tracing();
    let (engine, _store) = memory_engine(2, 1);
    let log = EventLog::new();

    let mut g = TaskGraph::new();
    let setup = g.add_task(
        RecordingTask::new("setup", &log).failing(),
        TaskGuard::default(),
        &[],
    )?;
    let cleanup = g.add_task(
        RecordingTask::new("cleanup", &log),
        TaskGuard::AllPredecessorsCompleted,
        &[setup],
    )?;

    let job = with_timeout(engine.submit("cleanup", g, true)).await?;

    assert_eq!(job.task_status(cleanup), Some(TaskStatus::Passed));
    assert!(log.finished_before("setup", "cleanup"));
    // One failed node fails the job even when a later node passed.
    assert_eq!(job.status(), JobStatus::Failed);
    Ok(())
}

#[tokio::test]
async fn empty_graph_passes_immediately() -> TestResult {
    init_tracing();
    let (engine, _store) = memory_engine(1, 1);

    let job = with_timeout(engine.submit("empty", TaskGraph::new(), true)).await?;

    assert_eq!(job.status(), JobStatus::Passed);
    assert!(job.started_at().is_some());
    assert!(job.completed_at().is_some());
    Ok(())
}

/// A fast failure must not let cleanup overtake a slow sibling.
///
/// ```text
///   A (fails fast) ──┐
///                    ├─> D (succeeded) ──> cleanup (completed)
///   B (slow) ────────┘
/// ```
#[tokio::test]
async fn skip_waits_for_slow_sibling_before_cascading() -> TestResult {
    init_tracing();
    let (engine, _store) = memory_engine(4, 1);
    let log = EventLog::new();

    let mut g = TaskGraph::new();
    let a = g.add_task(RecordingTask::new("A", &log).failing(), TaskGuard::default(), &[])?;
    let b = g.add_task(
        RecordingTask::new("B", &log).with_delay(Duration::from_millis(300)),
        TaskGuard::default(),
        &[],
    )?;
    let d = g.add_task(RecordingTask::new("D", &log), TaskGuard::AllPredecessorsSucceeded, &[a, b])?;
    let cleanup = g.add_task(
        RecordingTask::new("cleanup", &log),
        TaskGuard::AllPredecessorsCompleted,
        &[d],
    )?;

    let job = with_timeout(engine.submit("slow-sibling", g, true)).await?;

    assert_eq!(job.task_status(d), Some(TaskStatus::Skipped));
    assert_eq!(job.task_status(cleanup), Some(TaskStatus::Passed));
    assert!(
        log.finished_before("B", "cleanup"),
        "cleanup started while B was still running: {:?}",
        log.events()
    );
    Ok(())
}
