// src/dag/task.rs

//! The work-unit contract.
//!
//! A [`Task`] is an async body plus declared input/output slot names. The
//! engine fills a [`TaskContext`] with values published by ancestors under the
//! same names before calling `execute`, and keeps whatever the task publishes
//! under its declared output names afterwards.
//!
//! A [`MetaTask`] additionally yields a nested [`TaskGraph`] once its body
//! has run; the engine splices that graph in right after the meta node.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::dag::graph::TaskGraph;
use crate::lock::LockObjectReference;
use crate::types::{JobId, TaskId};

/// A value passed along graph edges between tasks.
pub type SlotValue = Arc<dyn Any + Send + Sync>;

/// Future returned by [`Task::execute`].
pub type TaskFuture<'a> = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + 'a>>;

pub trait Task: Send + Sync {
    fn name(&self) -> &str;

    fn execute<'a>(&'a self, ctx: &'a mut TaskContext) -> TaskFuture<'a>;

    /// Names of values this task reads from its ancestors.
    fn inputs(&self) -> &[&'static str] {
        &[]
    }

    /// Names of values this task publishes for its descendants.
    fn outputs(&self) -> &[&'static str] {
        &[]
    }

    /// Domain objects the owning job must lock before it starts.
    fn lock_objects(&self) -> Vec<LockObjectReference> {
        Vec::new()
    }
}

pub trait MetaTask: Task {
    /// Graph to run after this task. Called once, after `execute` succeeded.
    fn task_graph(&self) -> anyhow::Result<TaskGraph>;
}

/// What a work node runs.
#[derive(Clone)]
pub enum TaskKind {
    Simple(Arc<dyn Task>),
    Meta(Arc<dyn MetaTask>),
}

impl TaskKind {
    pub fn name(&self) -> &str {
        match self {
            TaskKind::Simple(t) => t.name(),
            TaskKind::Meta(m) => m.name(),
        }
    }

    pub fn execute<'a>(&'a self, ctx: &'a mut TaskContext) -> TaskFuture<'a> {
        match self {
            TaskKind::Simple(t) => t.execute(ctx),
            TaskKind::Meta(m) => m.execute(ctx),
        }
    }

    pub fn inputs(&self) -> &[&'static str] {
        match self {
            TaskKind::Simple(t) => t.inputs(),
            TaskKind::Meta(m) => m.inputs(),
        }
    }

    pub fn outputs(&self) -> &[&'static str] {
        match self {
            TaskKind::Simple(t) => t.outputs(),
            TaskKind::Meta(m) => m.outputs(),
        }
    }

    pub fn lock_objects(&self) -> Vec<LockObjectReference> {
        match self {
            TaskKind::Simple(t) => t.lock_objects(),
            TaskKind::Meta(m) => m.lock_objects(),
        }
    }

    pub fn is_meta(&self) -> bool {
        matches!(self, TaskKind::Meta(_))
    }
}

impl fmt::Debug for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskKind::Simple(t) => f.debug_tuple("Simple").field(&t.name()).finish(),
            TaskKind::Meta(m) => f.debug_tuple("Meta").field(&m.name()).finish(),
        }
    }
}

/// Everything a running task can see: its identity, resolved inputs, the
/// outputs it publishes and the engine's shared unit of work.
pub struct TaskContext {
    job_id: JobId,
    job_name: String,
    task_id: TaskId,
    inputs: HashMap<String, SlotValue>,
    outputs: HashMap<String, SlotValue>,
    unit_of_work: Option<SlotValue>,
}

impl TaskContext {
    pub fn new(job_id: JobId, job_name: impl Into<String>, task_id: TaskId) -> Self {
        Self {
            job_id,
            job_name: job_name.into(),
            task_id,
            inputs: HashMap::new(),
            outputs: HashMap::new(),
            unit_of_work: None,
        }
    }

    pub fn with_input(mut self, name: impl Into<String>, value: SlotValue) -> Self {
        self.inputs.insert(name.into(), value);
        self
    }

    pub fn with_unit_of_work(mut self, uow: Option<SlotValue>) -> Self {
        self.unit_of_work = uow;
        self
    }

    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    pub fn job_name(&self) -> &str {
        &self.job_name
    }

    pub fn task_id(&self) -> TaskId {
        self.task_id
    }

    /// Typed copy of an input value, if present and of type `T`.
    pub fn input<T: Clone + 'static>(&self, name: &str) -> Option<T> {
        self.inputs
            .get(name)
            .and_then(|v| v.downcast_ref::<T>())
            .cloned()
    }

    pub fn input_value(&self, name: &str) -> Option<&SlotValue> {
        self.inputs.get(name)
    }

    pub fn set_output<T: Send + Sync + 'static>(&mut self, name: impl Into<String>, value: T) {
        self.outputs.insert(name.into(), Arc::new(value));
    }

    pub fn output<T: Clone + 'static>(&self, name: &str) -> Option<T> {
        self.outputs
            .get(name)
            .and_then(|v| v.downcast_ref::<T>())
            .cloned()
    }

    /// The caller-supplied unit of work, if it is a `T`.
    pub fn unit_of_work<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.unit_of_work.as_ref().and_then(|u| u.downcast_ref::<T>())
    }

    pub(crate) fn into_outputs(self) -> HashMap<String, SlotValue> {
        self.outputs
    }
}
