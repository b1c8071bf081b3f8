// src/engine/scheduler.rs

//! Event-driven activation.
//!
//! There is no scheduling loop. Whenever a node becomes terminal its
//! successors are re-evaluated against their guards, all while the job's
//! state lock is held. A node only leaves `Pending` under that lock, so
//! predecessors finishing at the same time cannot activate a successor twice.

use std::collections::{HashMap, VecDeque};

use chrono::Utc;
use petgraph::stable_graph::NodeIndex;
use tracing::{debug, trace};

use crate::dag::{GuardOutcome, GuardScope, SlotValue};
use crate::engine::job::JobState;
use crate::types::{JobStatus, TaskId, TaskStatus};

/// What changed as the result of one state transition.
#[derive(Debug, Default)]
pub(crate) struct Activation {
    /// Nodes moved to `Queued` that must now be handed to the task pool.
    pub ready: Vec<TaskId>,
    /// Work nodes that became terminal without running (skips).
    pub settled: Vec<TaskId>,
    /// Set when this transition completed the job.
    pub completed: Option<JobStatus>,
}

/// How a task body ended.
pub(crate) enum NodeOutcome {
    Passed(HashMap<String, SlotValue>),
    Failed(String),
}

/// Start a queued job: pass the start sentinel and queue whatever is ready.
pub(crate) fn start(state: &mut JobState) -> Activation {
    let mut act = Activation::default();
    if state.status != JobStatus::Queued {
        return act;
    }

    state.status = JobStatus::Running;
    state.started_at = Some(Utc::now());

    let start = state.graph.start_index();
    if state.graph.node_at_mut(start).pass_through() {
        state.remaining -= 1;
        propagate(state, start, &mut act);
    }
    act.completed = state.complete_if_done();
    act
}

/// Record the outcome of a running node and activate what follows it.
///
/// Returns `None` when the node was no longer running (e.g. its job was
/// aborted in the meantime).
pub(crate) fn finish(state: &mut JobState, id: TaskId, outcome: NodeOutcome) -> Option<Activation> {
    let idx = state.graph.index_of(id)?;
    state.running.remove(&id);

    let node = state.graph.node_at_mut(idx);
    let changed = match outcome {
        NodeOutcome::Passed(outputs) => {
            let ok = node.transition(TaskStatus::Passed);
            if ok {
                node.set_outputs(outputs);
            }
            ok
        }
        NodeOutcome::Failed(reason) => node.fail(reason),
    };
    if !changed {
        return None;
    }

    state.record_change(idx);
    state.remaining -= 1;
    let mut act = Activation::default();
    propagate(state, idx, &mut act);
    act.completed = state.complete_if_done();
    Some(act)
}

/// Fail a node that was queued but never got to run.
pub(crate) fn finish_queued(state: &mut JobState, id: TaskId, reason: &str) -> Option<Activation> {
    let idx = state.graph.index_of(id)?;
    if !state.graph.node_at_mut(idx).transition(TaskStatus::Running) {
        return None;
    }
    state.record_change(idx);
    finish(state, id, NodeOutcome::Failed(reason.to_string()))
}

/// Re-evaluate everything downstream of `from`, cascading skips and
/// sentinel pass-through synchronously.
fn propagate(state: &mut JobState, from: NodeIndex, act: &mut Activation) {
    let mut work: VecDeque<NodeIndex> = state.graph.succ_indices(from).into();

    while let Some(idx) = work.pop_front() {
        let node = state.graph.node_at(idx);
        if node.status() != TaskStatus::Pending {
            continue;
        }

        let guard = node.guard();
        let relevant = match guard.scope() {
            GuardScope::DirectPredecessors => state.graph.pred_indices(idx),
            GuardScope::AllAncestors => state.graph.ancestor_indices(idx),
        };
        let statuses: Vec<TaskStatus> = relevant
            .iter()
            .map(|&i| state.graph.node_at(i).status())
            .collect();

        let outcome = guard.evaluate(&statuses);
        trace!(task = %node.name(), ?outcome, "guard evaluated");

        match outcome {
            GuardOutcome::Wait => {}
            GuardOutcome::Ready if state.graph.is_sentinel(idx) => {
                if state.graph.node_at_mut(idx).pass_through() {
                    state.remaining -= 1;
                    work.extend(state.graph.succ_indices(idx));
                }
            }
            GuardOutcome::Ready => {
                let node = state.graph.node_at_mut(idx);
                if node.transition(TaskStatus::Queued) {
                    act.ready.push(node.id());
                    state.record_change(idx);
                }
            }
            GuardOutcome::Skip => {
                let node = state.graph.node_at_mut(idx);
                if node.transition(TaskStatus::Skipped) {
                    debug!(task = %node.name(), "task skipped by guard");
                    act.settled.push(node.id());
                    state.record_change(idx);
                    state.remaining -= 1;
                    work.extend(state.graph.succ_indices(idx));
                }
            }
        }
    }
}
