// tests/config_driven.rs

#![cfg(unix)]

use std::error::Error;
use std::fs;

use jobgraph::config::load_and_validate;
use jobgraph::dag::TaskGuard;
use jobgraph::engine::JobEngine;
use jobgraph::exec::graph_from_config;
use jobgraph::types::{JobStatus, TaskStatus};
use jobgraph_test_utils::builders::{ConfigFileBuilder, TaskConfigBuilder};
use jobgraph_test_utils::{init_tracing, with_timeout};

type TestResult = Result<(), Box<dyn Error>>;

#[tokio::test]
async fn shell_tasks_run_in_dependency_order() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let out = dir.path().join("order.txt");
    let out_str = out.display().to_string();

    let cfg = ConfigFileBuilder::new()
        .with_pools(2, 1)
        .with_job_name("shell")
        .with_task(
            "build",
            TaskConfigBuilder::new(&format!("echo build >> {out_str}")).build(),
        )
        .with_task(
            "test",
            TaskConfigBuilder::new(&format!("echo test >> {out_str}"))
                .after("build")
                .build(),
        )
        .with_task(
            "package",
            TaskConfigBuilder::new(&format!("echo package >> {out_str}"))
                .after("test")
                .build(),
        )
        .build();

    let engine = JobEngine::from_config(&cfg);
    let job = with_timeout(engine.submit(cfg.job.name.clone(), graph_from_config(&cfg)?, true)).await?;

    assert_eq!(job.status(), JobStatus::Passed);
    assert_eq!(fs::read_to_string(&out)?, "build\ntest\npackage\n");
    Ok(())
}

#[tokio::test]
async fn failing_command_skips_dependents_but_not_cleanup() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let config_path = dir.path().join("Jobgraph.toml");
    fs::write(
        &config_path,
        r#"
        [engine]
        task_thread_pool_size = 2
        job_thread_pool_size = 1
        shutdown_timeout = "5s"

        [job]
        name = "pipeline"

        [task.compile]
        cmd = "exit 2"

        [task.deploy]
        cmd = "true"
        after = ["compile"]

        [task.cleanup]
        cmd = "true"
        after = ["compile"]
        guard = "all_predecessors_completed"
        "#,
    )?;

    let cfg = load_and_validate(&config_path)?;
    assert_eq!(cfg.task["cleanup"].guard, TaskGuard::AllPredecessorsCompleted);

    let engine = JobEngine::from_config(&cfg);
    let job = with_timeout(engine.submit("pipeline", graph_from_config(&cfg)?, true)).await?;

    assert_eq!(job.status(), JobStatus::Failed);
    assert_eq!(job.task_status_by_name("compile"), Some(TaskStatus::Failed));
    assert_eq!(job.task_status_by_name("deploy"), Some(TaskStatus::Skipped));
    assert_eq!(job.task_status_by_name("cleanup"), Some(TaskStatus::Passed));

    let reason = job.failure_reason().unwrap_or_default();
    assert!(reason.contains("exited with status 2"), "reason was {reason}");
    Ok(())
}
