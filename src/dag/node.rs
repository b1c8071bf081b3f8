// src/dag/node.rs

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tracing::warn;

use crate::dag::guard::TaskGuard;
use crate::dag::task::{SlotValue, TaskKind};
use crate::types::{TaskId, TaskStatus};

/// What a graph node stands for.
#[derive(Debug, Clone)]
pub enum NodeKind {
    /// Synthetic single entry of a graph.
    Start,
    /// Synthetic single exit of a graph.
    End,
    Work(TaskKind),
}

/// Execution state of one node in a [`crate::dag::TaskGraph`].
///
/// Edges live in the graph; a node only knows its own lifecycle.
#[derive(Clone)]
pub struct TaskNode {
    id: TaskId,
    kind: NodeKind,
    status: TaskStatus,
    guard: TaskGuard,
    queued_at: Option<DateTime<Utc>>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    fail_reason: Option<String>,
    outputs: HashMap<String, SlotValue>,
    producer: Option<TaskId>,
}

impl TaskNode {
    pub fn new(kind: TaskKind, guard: TaskGuard) -> Self {
        Self::with_kind(NodeKind::Work(kind), guard)
    }

    pub(crate) fn start() -> Self {
        Self::with_kind(NodeKind::Start, TaskGuard::AllPredecessorsCompleted)
    }

    pub(crate) fn end() -> Self {
        Self::with_kind(NodeKind::End, TaskGuard::AllPredecessorsCompleted)
    }

    fn with_kind(kind: NodeKind, guard: TaskGuard) -> Self {
        Self {
            id: TaskId::new(),
            kind,
            status: TaskStatus::Pending,
            guard,
            queued_at: None,
            started_at: None,
            completed_at: None,
            fail_reason: None,
            outputs: HashMap::new(),
            producer: None,
        }
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn name(&self) -> &str {
        match &self.kind {
            NodeKind::Start => "start",
            NodeKind::End => "end",
            NodeKind::Work(task) => task.name(),
        }
    }

    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    pub fn task(&self) -> Option<&TaskKind> {
        match &self.kind {
            NodeKind::Work(task) => Some(task),
            _ => None,
        }
    }

    pub fn is_sentinel(&self) -> bool {
        !matches!(self.kind, NodeKind::Work(_))
    }

    pub fn is_meta(&self) -> bool {
        self.task().is_some_and(|t| t.is_meta())
    }

    pub fn status(&self) -> TaskStatus {
        self.status
    }

    pub fn guard(&self) -> TaskGuard {
        self.guard
    }

    pub(crate) fn set_guard(&mut self, guard: TaskGuard) {
        self.guard = guard;
    }

    pub fn queued_at(&self) -> Option<DateTime<Utc>> {
        self.queued_at
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    pub fn fail_reason(&self) -> Option<&str> {
        self.fail_reason.as_deref()
    }

    pub fn outputs(&self) -> &HashMap<String, SlotValue> {
        &self.outputs
    }

    pub fn output_value(&self, name: &str) -> Option<&SlotValue> {
        self.outputs.get(name)
    }

    /// Meta task node whose expansion created this node, if any.
    pub fn producer(&self) -> Option<TaskId> {
        self.producer
    }

    pub(crate) fn set_producer(&mut self, producer: TaskId) {
        self.producer = Some(producer);
    }

    pub(crate) fn set_outputs(&mut self, outputs: HashMap<String, SlotValue>) {
        self.outputs = outputs;
    }

    /// Move to `next`, stamping the matching timestamp.
    ///
    /// Returns `false` and leaves the node untouched when the step is not a
    /// legal lifecycle transition (in particular, out of a terminal status).
    pub fn transition(&mut self, next: TaskStatus) -> bool {
        if !self.status.can_transition_to(next) {
            warn!(
                task = %self.name(),
                id = %self.id,
                from = %self.status,
                to = %next,
                "ignoring illegal task status transition"
            );
            return false;
        }

        let now = Utc::now();
        match next {
            TaskStatus::Queued => self.queued_at = Some(now),
            TaskStatus::Running => self.started_at = Some(now),
            s if s.is_terminal() => self.completed_at = Some(now),
            _ => {}
        }
        self.status = next;
        true
    }

    /// Mark the node failed with `reason`.
    pub fn fail(&mut self, reason: impl Into<String>) -> bool {
        if !self.transition(TaskStatus::Failed) {
            return false;
        }
        self.fail_reason = Some(reason.into());
        true
    }

    /// Sentinels never execute; they pass as soon as their guard allows.
    pub(crate) fn pass_through(&mut self) -> bool {
        self.transition(TaskStatus::Queued)
            && self.transition(TaskStatus::Running)
            && self.transition(TaskStatus::Passed)
    }

    /// Terminate a node that is not terminal yet because its job was aborted.
    pub(crate) fn abort(&mut self, reason: &str) -> bool {
        match self.status {
            TaskStatus::Running => self.fail(reason),
            TaskStatus::Pending | TaskStatus::Queued => {
                self.fail_reason = Some(reason.to_string());
                self.transition(TaskStatus::Skipped)
            }
            _ => false,
        }
    }
}

impl std::fmt::Debug for TaskNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskNode")
            .field("id", &self.id)
            .field("name", &self.name())
            .field("status", &self.status)
            .field("guard", &self.guard)
            .field("fail_reason", &self.fail_reason)
            .finish()
    }
}
