// src/exec/task_runner.rs

//! Runs a single queued node on the task pool.
//!
//! The body runs in its own tokio task so a panic only fails that node. A
//! meta task's sub-graph is spliced in before the node is marked passed, so
//! its successors always see the expanded graph.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Context;
use tracing::{debug, error, info, warn};

use crate::dag::{SlotValue, TaskContext, TaskGraph, TaskKind};
use crate::engine::core::EngineCore;
use crate::engine::job::Job;
use crate::engine::scheduler::{self, NodeOutcome};
use crate::types::{TaskId, TaskStatus};

struct Prepared {
    kind: TaskKind,
    name: String,
    inputs: Vec<(String, SlotValue)>,
}

pub(crate) async fn run_node(core: Arc<EngineCore>, job: Arc<Job>, id: TaskId) {
    let permit = match Arc::clone(&core.task_permits).acquire_owned().await {
        Ok(permit) => permit,
        Err(_) => {
            let act = scheduler::finish_queued(
                &mut job.state.lock(),
                id,
                "task pool closed before the task could run",
            );
            if let Some(act) = act {
                core.persist_tasks(&job, &[id]);
                core.apply(&job, act);
            }
            return;
        }
    };

    let Some(prepared) = prepare(&job, id) else {
        return;
    };
    job.fire_task_changes();
    let Prepared { kind, name, inputs } = prepared;

    info!(job = %job.id(), task = %name, id = %id, "task started");

    let mut ctx = TaskContext::new(job.id(), job.name(), id)
        .with_unit_of_work(core.unit_of_work.clone());
    for (input, value) in inputs {
        ctx = ctx.with_input(input, value);
    }

    let body = tokio::spawn(async move {
        let result = kind.execute(&mut ctx).await;
        let expansion = match (&result, &kind) {
            (Ok(()), TaskKind::Meta(meta)) => Some(meta.task_graph()),
            _ => None,
        };
        (result, expansion, ctx, kind)
    });

    {
        let mut state = job.state.lock();
        if state.aborted {
            body.abort();
        } else {
            state.running.insert(id, body.abort_handle());
        }
    }

    let joined = body.await;
    drop(permit);

    let outcome = match joined {
        Ok((Ok(()), expansion, ctx, kind)) => match expansion {
            None => NodeOutcome::Passed(declared_outputs(ctx, &kind, &name)),
            Some(Err(err)) => NodeOutcome::Failed(format!("building task graph failed: {err:#}")),
            Some(Ok(sub)) => match expand(&core, &job, id, sub) {
                Ok(()) => NodeOutcome::Passed(declared_outputs(ctx, &kind, &name)),
                Err(err) => NodeOutcome::Failed(format!("{err:#}")),
            },
        },
        Ok((Err(err), ..)) => NodeOutcome::Failed(format!("{err:#}")),
        Err(err) if err.is_panic() => {
            NodeOutcome::Failed(format!("task panicked: {}", panic_message(err.into_panic())))
        }
        Err(_) => {
            debug!(job = %job.id(), task = %name, "task cancelled");
            return;
        }
    };

    match &outcome {
        NodeOutcome::Passed(_) => info!(job = %job.id(), task = %name, "task passed"),
        NodeOutcome::Failed(reason) => {
            error!(job = %job.id(), task = %name, reason = %reason, "task failed")
        }
    }

    let act = scheduler::finish(&mut job.state.lock(), id, outcome);
    let Some(act) = act else {
        debug!(job = %job.id(), task = %name, "task outcome ignored; node already terminal");
        return;
    };
    core.persist_tasks(&job, &[id]);
    core.apply(&job, act);
}

/// Move the node to `Running` and resolve its inputs from the nearest
/// ancestors publishing them.
fn prepare(job: &Job, id: TaskId) -> Option<Prepared> {
    let mut state = job.state.lock();
    let idx = state.graph.index_of(id)?;

    let node = state.graph.node_at_mut(idx);
    if node.status() != TaskStatus::Queued || !node.transition(TaskStatus::Running) {
        return None;
    }
    let kind = node.task()?.clone();
    let name = node.name().to_string();
    state.record_change(idx);

    let ancestors = state.graph.ancestor_indices(idx);
    let mut inputs = Vec::new();
    for input in kind.inputs() {
        let found = ancestors
            .iter()
            .find_map(|&a| state.graph.node_at(a).output_value(input).cloned());
        match found {
            Some(value) => inputs.push((input.to_string(), value)),
            None => debug!(job = %job.id(), task = %name, input, "no ancestor publishes input"),
        }
    }

    Some(Prepared { kind, name, inputs })
}

/// Keep only the outputs the task declared.
fn declared_outputs(ctx: TaskContext, kind: &TaskKind, task: &str) -> HashMap<String, SlotValue> {
    let declared = kind.outputs();
    ctx.into_outputs()
        .into_iter()
        .filter(|(slot, _)| {
            let keep = declared.iter().any(|d| *d == slot.as_str());
            if !keep {
                warn!(task = %task, slot = %slot, "dropping undeclared task output");
            }
            keep
        })
        .collect()
}

/// Splice a meta task's graph right after it.
fn expand(core: &EngineCore, job: &Job, meta: TaskId, sub: TaskGraph) -> anyhow::Result<()> {
    sub.validate().context("meta task produced an invalid graph")?;

    let unheld: Vec<String> = sub
        .nodes()
        .filter_map(|n| n.task())
        .flat_map(|t| t.lock_objects())
        .filter(|r| !job.lock_objects().contains(r))
        .map(|r| r.to_string())
        .collect();
    if !unheld.is_empty() {
        warn!(
            job = %job.id(),
            objects = ?unheld,
            "expanded tasks declare objects the job does not hold; they stay unlocked"
        );
    }

    let added = {
        let mut state = job.state.lock();
        if state.aborted {
            anyhow::bail!("job was aborted before the task graph could be inserted");
        }
        let ids = state.graph.insert_task_graph(sub, meta)?;
        for nid in &ids {
            if let Some(node) = state.graph.node_mut(*nid) {
                node.set_producer(meta);
            }
        }
        state.remaining += ids.len();
        ids.len()
    };

    info!(job = %job.id(), meta = %meta, added, "meta task expanded");
    core.persist_job(job);
    Ok(())
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
