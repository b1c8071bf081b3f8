// tests/job_queuer.rs

use std::error::Error;
use std::time::Duration;

use jobgraph::dag::{TaskGraph, TaskGuard};
use jobgraph::engine::{JobQueuer, JobRequest};
use jobgraph::errors::JobGraphError;
use jobgraph::types::JobStatus;
use jobgraph_test_utils::builders::memory_engine;
use jobgraph_test_utils::tasks::{EventLog, RecordingTask};
use jobgraph_test_utils::{init_tracing, with_timeout};

type TestResult = Result<(), Box<dyn Error>>;

fn request(log: &EventLog, name: &str, delay_ms: u64) -> Result<JobRequest, Box<dyn Error>> {
    let mut g = TaskGraph::new();
    g.add_task(
        RecordingTask::new(name, log).with_delay(Duration::from_millis(delay_ms)),
        TaskGuard::default(),
        &[],
    )?;
    Ok(JobRequest::new(name, g))
}

#[tokio::test]
async fn queued_jobs_run_strictly_in_order() -> TestResult {
    init_tracing();
    // Plenty of job slots: any ordering comes from the queue itself.
    let (engine, _store) = memory_engine(8, 8);
    let queuer = JobQueuer::new(engine.clone());
    let log = EventLog::new();

    // Decreasing delays would reorder completions if jobs overlapped.
    let mut receivers = Vec::new();
    for (i, delay) in [30u64, 20, 10, 0].into_iter().enumerate() {
        receivers.push(queuer.put_job(request(&log, &format!("q{i}"), delay)?)?);
    }

    let mut jobs = Vec::new();
    for rx in receivers {
        jobs.push(with_timeout(rx).await??);
    }
    for job in &jobs {
        assert_eq!(with_timeout(job.wait_for_completion()).await, JobStatus::Passed);
    }

    assert_eq!(log.started(), vec!["q0", "q1", "q2", "q3"]);
    assert_eq!(log.max_concurrency(), 1);

    with_timeout(queuer.close()).await;
    Ok(())
}

#[tokio::test]
async fn submission_errors_reach_the_caller() -> TestResult {
    init_tracing();
    let (engine, _store) = memory_engine(2, 2);
    let queuer = JobQueuer::new(engine.clone());
    let log = EventLog::new();

    engine.shutdown().await?;
    let rx = queuer.put_job(request(&log, "late", 0)?)?;
    let result = with_timeout(rx).await?;

    assert!(matches!(result, Err(JobGraphError::EngineShutdown(ref name)) if name == "late"));
    assert!(!log.ran("late"));

    with_timeout(queuer.close()).await;
    Ok(())
}
