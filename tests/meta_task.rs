// tests/meta_task.rs

use std::error::Error;

use jobgraph::dag::{TaskGraph, TaskGuard};
use jobgraph::types::{JobStatus, TaskStatus};
use jobgraph_test_utils::builders::memory_engine;
use jobgraph_test_utils::tasks::{EventLog, FanOutMetaTask, RecordingTask};
use jobgraph_test_utils::{init_tracing, with_timeout};

type TestResult = Result<(), Box<dyn Error>>;

#[tokio::test]
async fn meta_tasks_expand_in_place() -> TestResult {
    init_tracing();
    let (engine, _store) = memory_engine(8, 1);
    let log = EventLog::new();

    // root -> {C (meta), D (meta)} -> last
    let mut g = TaskGraph::new();
    let guard = TaskGuard::default();
    let root = g.add_task(RecordingTask::new("root", &log), guard, &[])?;
    let c = g.add_meta_task(FanOutMetaTask::new("C", &log), guard, &[root])?;
    let d = g.add_meta_task(FanOutMetaTask::new("D", &log), guard, &[root])?;
    g.add_task(RecordingTask::new("last", &log), guard, &[c, d])?;

    let job = with_timeout(engine.submit("meta", g, true)).await?;

    assert_eq!(job.status(), JobStatus::Passed);
    assert_eq!(job.with_graph(|g| g.task_count()), 4 + 2 * 5);
    job.with_graph(|g| g.validate())?;

    for meta in ["C", "D"] {
        for inner in ["A", "B", "C", "D", "E"] {
            let name = format!("{meta}.{inner}");
            assert_eq!(
                job.task_status_by_name(&name),
                Some(TaskStatus::Passed),
                "{name} did not pass"
            );
            assert!(log.finished_before(meta, &name));
            assert!(log.finished_before(&name, "last"));
        }
        assert!(log.finished_before(&format!("{meta}.A"), &format!("{meta}.B")));
        assert!(log.finished_before(&format!("{meta}.B"), &format!("{meta}.D")));
        assert!(log.finished_before(&format!("{meta}.C"), &format!("{meta}.D")));
    }

    // Every generated node remembers which meta task produced it.
    let producers_ok = job.with_graph(|g| {
        g.nodes()
            .filter(|n| n.name().starts_with("C."))
            .all(|n| n.producer() == Some(c))
    });
    assert!(producers_ok);
    Ok(())
}

#[tokio::test]
async fn failure_inside_expansion_skips_downstream() -> TestResult {
    init_tracing();
    let (engine, _store) = memory_engine(4, 1);
    let log = EventLog::new();

    let mut g = TaskGraph::new();
    let guard = TaskGuard::default();
    let meta = g.add_meta_task(FanOutMetaTask::new("M", &log).failing_inner("B"), guard, &[])?;
    let after = g.add_task(RecordingTask::new("after", &log), guard, &[meta])?;

    let job = with_timeout(engine.submit("meta-fail", g, true)).await?;

    assert_eq!(job.status(), JobStatus::Failed);
    assert_eq!(job.task_status(meta), Some(TaskStatus::Passed));
    assert_eq!(job.task_status_by_name("M.B"), Some(TaskStatus::Failed));
    assert_eq!(job.task_status_by_name("M.C"), Some(TaskStatus::Passed));
    assert_eq!(job.task_status_by_name("M.D"), Some(TaskStatus::Skipped));
    assert_eq!(job.task_status_by_name("M.E"), Some(TaskStatus::Passed));
    assert_eq!(job.task_status(after), Some(TaskStatus::Skipped));
    assert!(!log.ran("after"));
    Ok(())
}
