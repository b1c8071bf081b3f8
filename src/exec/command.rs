// src/exec/command.rs

//! Shell-command tasks and building a [`TaskGraph`] from `[task.*]` config.

use std::collections::HashMap;
use std::process::Stdio;

use anyhow::{Context, bail};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, info};

use crate::config::{ConfigFile, task_order};
use crate::dag::{Task, TaskContext, TaskFuture, TaskGraph};
use crate::errors::{JobGraphError, Result};
use crate::types::TaskId;

/// A task that runs `cmd` through the platform shell and fails on a non-zero
/// exit status.
#[derive(Debug, Clone)]
pub struct CommandTask {
    name: String,
    cmd: String,
}

impl CommandTask {
    pub fn new(name: impl Into<String>, cmd: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            cmd: cmd.into(),
        }
    }

    pub fn cmd(&self) -> &str {
        &self.cmd
    }

    async fn run(&self, ctx: &TaskContext) -> anyhow::Result<()> {
        info!(
            job = %ctx.job_id(),
            task = %self.name,
            cmd = %self.cmd,
            "starting task process"
        );

        let mut cmd = if cfg!(windows) {
            let mut c = Command::new("cmd");
            c.arg("/C").arg(&self.cmd);
            c
        } else {
            let mut c = Command::new("sh");
            c.arg("-c").arg(&self.cmd);
            c
        };

        cmd.env("JOBGRAPH_JOB_ID", ctx.job_id().to_string())
            .env("JOBGRAPH_JOB_NAME", ctx.job_name())
            .env("JOBGRAPH_TASK_ID", ctx.task_id().to_string())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .with_context(|| format!("spawning process for task '{}'", self.name))?;

        let stdout_pump = child.stdout.take().map(|stdout| {
            let task_name = self.name.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stdout).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    info!(task = %task_name, "stdout: {}", line);
                }
            })
        });

        // Always consume stderr so buffers don't fill; log at debug.
        let stderr_pump = child.stderr.take().map(|stderr| {
            let task_name = self.name.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(task = %task_name, "stderr: {}", line);
                }
            })
        });

        let status = child
            .wait()
            .await
            .with_context(|| format!("waiting for process of task '{}'", self.name))?;

        for pump in [stdout_pump, stderr_pump].into_iter().flatten() {
            if let Err(err) = pump.await {
                debug!(task = %self.name, error = %err, "output pump ended abnormally");
            }
        }

        let code = status.code().unwrap_or(-1);
        info!(
            task = %self.name,
            exit_code = code,
            success = status.success(),
            "task process exited"
        );

        if !status.success() {
            bail!("command `{}` exited with status {}", self.cmd, code);
        }
        Ok(())
    }
}

impl Task for CommandTask {
    fn name(&self) -> &str {
        &self.name
    }

    fn execute<'a>(&'a self, ctx: &'a mut TaskContext) -> TaskFuture<'a> {
        Box::pin(self.run(ctx))
    }
}

/// Build one graph from every `[task.<name>]` entry, wiring `after` lists as
/// edges and carrying each task's guard.
pub fn graph_from_config(cfg: &ConfigFile) -> Result<TaskGraph> {
    let mut graph = TaskGraph::new();
    let mut ids: HashMap<&str, TaskId> = HashMap::new();

    for name in task_order(&cfg.task)? {
        let Some(task) = cfg.task.get(name) else {
            return Err(JobGraphError::InvalidGraph(format!(
                "task '{name}' is referenced in `after` but never defined"
            )));
        };
        let preds = task
            .after
            .iter()
            .map(|dep| {
                ids.get(dep.as_str()).copied().ok_or_else(|| {
                    JobGraphError::InvalidGraph(format!("task '{name}' runs after unknown task '{dep}'"))
                })
            })
            .collect::<Result<Vec<TaskId>>>()?;
        let id = graph.add_task(CommandTask::new(name, &task.cmd), task.guard, &preds)?;
        ids.insert(name, id);
    }

    Ok(graph)
}
