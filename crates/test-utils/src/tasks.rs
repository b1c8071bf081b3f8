#![allow(dead_code)]

//! Ready-made tasks for exercising the engine without spawning processes.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail};
use parking_lot::Mutex;

use jobgraph::dag::{MetaTask, Task, TaskContext, TaskFuture, TaskGraph, TaskGuard};
use jobgraph::lock::LockObjectReference;

fn fail(name: &str) -> anyhow::Result<()> {
    bail!("{name} failed on purpose")
}

fn explode(name: &str) -> anyhow::Result<()> {
    panic!("{name} blew up")
}

/// Does nothing and passes.
pub struct EmptyTask {
    name: String,
}

impl EmptyTask {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }
}

impl Task for EmptyTask {
    fn name(&self) -> &str {
        &self.name
    }

    fn execute<'a>(&'a self, _ctx: &'a mut TaskContext) -> TaskFuture<'a> {
        Box::pin(async { Ok(()) })
    }
}

/// Always returns an error mentioning its own name.
pub struct FailingTask {
    name: String,
}

impl FailingTask {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }
}

impl Task for FailingTask {
    fn name(&self) -> &str {
        &self.name
    }

    fn execute<'a>(&'a self, _ctx: &'a mut TaskContext) -> TaskFuture<'a> {
        Box::pin(async move { fail(&self.name) })
    }
}

/// Panics inside its body.
pub struct PanickingTask {
    name: String,
}

impl PanickingTask {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }
}

impl Task for PanickingTask {
    fn name(&self) -> &str {
        &self.name
    }

    fn execute<'a>(&'a self, _ctx: &'a mut TaskContext) -> TaskFuture<'a> {
        Box::pin(async move { explode(&self.name) })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Started,
    Finished,
}

/// Shared, ordered log of task start/finish events.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Arc<Mutex<Vec<(String, EventKind)>>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, task: &str, kind: EventKind) {
        self.events.lock().push((task.to_string(), kind));
    }

    pub fn events(&self) -> Vec<(String, EventKind)> {
        self.events.lock().clone()
    }

    /// Names of tasks in the order they started.
    pub fn started(&self) -> Vec<String> {
        self.events
            .lock()
            .iter()
            .filter(|(_, k)| *k == EventKind::Started)
            .map(|(n, _)| n.clone())
            .collect()
    }

    pub fn position(&self, task: &str, kind: EventKind) -> Option<usize> {
        self.events
            .lock()
            .iter()
            .position(|(n, k)| n == task && *k == kind)
    }

    pub fn ran(&self, task: &str) -> bool {
        self.position(task, EventKind::Started).is_some()
    }

    /// Whether `first` finished before `second` started.
    pub fn finished_before(&self, first: &str, second: &str) -> bool {
        match (
            self.position(first, EventKind::Finished),
            self.position(second, EventKind::Started),
        ) {
            (Some(a), Some(b)) => a < b,
            _ => false,
        }
    }

    /// Largest number of tasks observed running at the same time.
    pub fn max_concurrency(&self) -> usize {
        let mut running = 0usize;
        let mut max = 0usize;
        for (_, kind) in self.events.lock().iter() {
            match kind {
                EventKind::Started => {
                    running += 1;
                    max = max.max(running);
                }
                EventKind::Finished => running = running.saturating_sub(1),
            }
        }
        max
    }
}

/// Logs start and finish to an [`EventLog`], optionally sleeping, failing or
/// declaring lock objects in between.
pub struct RecordingTask {
    name: String,
    log: EventLog,
    delay: Duration,
    fail: bool,
    locks: Vec<LockObjectReference>,
}

impl RecordingTask {
    pub fn new(name: &str, log: &EventLog) -> Self {
        Self {
            name: name.to_string(),
            log: log.clone(),
            delay: Duration::ZERO,
            fail: false,
            locks: Vec::new(),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    pub fn with_locks(mut self, locks: Vec<LockObjectReference>) -> Self {
        self.locks = locks;
        self
    }
}

impl Task for RecordingTask {
    fn name(&self) -> &str {
        &self.name
    }

    fn execute<'a>(&'a self, _ctx: &'a mut TaskContext) -> TaskFuture<'a> {
        Box::pin(async move {
            self.log.record(&self.name, EventKind::Started);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.log.record(&self.name, EventKind::Finished);
            if self.fail {
                return fail(&self.name);
            }
            Ok(())
        })
    }

    fn lock_objects(&self) -> Vec<LockObjectReference> {
        self.locks.clone()
    }
}

/// Sleeps for a fixed time, then passes.
pub struct SleepTask {
    name: String,
    delay: Duration,
}

impl SleepTask {
    pub fn new(name: &str, delay: Duration) -> Self {
        Self {
            name: name.to_string(),
            delay,
        }
    }
}

impl Task for SleepTask {
    fn name(&self) -> &str {
        &self.name
    }

    fn execute<'a>(&'a self, _ctx: &'a mut TaskContext) -> TaskFuture<'a> {
        Box::pin(async move {
            tokio::time::sleep(self.delay).await;
            Ok(())
        })
    }
}

/// Publishes a `String` under one output slot.
pub struct OutputTask {
    name: String,
    outputs: Vec<&'static str>,
    value: String,
}

impl OutputTask {
    pub fn new(name: &str, slot: &'static str, value: &str) -> Self {
        Self {
            name: name.to_string(),
            outputs: vec![slot],
            value: value.to_string(),
        }
    }
}

impl Task for OutputTask {
    fn name(&self) -> &str {
        &self.name
    }

    fn outputs(&self) -> &[&'static str] {
        &self.outputs
    }

    fn execute<'a>(&'a self, ctx: &'a mut TaskContext) -> TaskFuture<'a> {
        Box::pin(async move {
            ctx.set_output(self.outputs[0], self.value.clone());
            Ok(())
        })
    }
}

/// Reads a `String` input, remembers it, and republishes it with a suffix.
///
/// Fails when the input is missing. Publishing is skipped when no output slot
/// is configured.
pub struct PassThroughTask {
    name: String,
    inputs: Vec<&'static str>,
    outputs: Vec<&'static str>,
    seen: Arc<Mutex<Option<String>>>,
}

impl PassThroughTask {
    pub fn new(name: &str, input: &'static str) -> Self {
        Self {
            name: name.to_string(),
            inputs: vec![input],
            outputs: Vec::new(),
            seen: Arc::new(Mutex::new(None)),
        }
    }

    pub fn publishing(mut self, output: &'static str) -> Self {
        self.outputs = vec![output];
        self
    }

    /// Handle to the value this task observed once it has run.
    pub fn seen(&self) -> Arc<Mutex<Option<String>>> {
        Arc::clone(&self.seen)
    }
}

impl Task for PassThroughTask {
    fn name(&self) -> &str {
        &self.name
    }

    fn inputs(&self) -> &[&'static str] {
        &self.inputs
    }

    fn outputs(&self) -> &[&'static str] {
        &self.outputs
    }

    fn execute<'a>(&'a self, ctx: &'a mut TaskContext) -> TaskFuture<'a> {
        Box::pin(async move {
            let slot = self.inputs[0];
            let value = ctx
                .input::<String>(slot)
                .ok_or_else(|| anyhow!("{}: input '{}' missing", self.name, slot))?;
            *self.seen.lock() = Some(value.clone());
            if let Some(out) = self.outputs.first() {
                ctx.set_output(*out, format!("{value}+{}", self.name));
            }
            Ok(())
        })
    }
}

/// Meta task whose body logs like a [`RecordingTask`] and which then expands
/// into the five-node graph `A -> {B, C} -> D`, `A -> E`.
///
/// Generated task names are prefixed with the meta task's name, e.g.
/// `"meta.A"`.
pub struct FanOutMetaTask {
    name: String,
    log: EventLog,
    fail_inner: Option<&'static str>,
}

impl FanOutMetaTask {
    pub fn new(name: &str, log: &EventLog) -> Self {
        Self {
            name: name.to_string(),
            log: log.clone(),
            fail_inner: None,
        }
    }

    /// Make the generated task with this suffix (e.g. `"B"`) fail.
    pub fn failing_inner(mut self, suffix: &'static str) -> Self {
        self.fail_inner = Some(suffix);
        self
    }

    fn inner(&self, suffix: &str) -> RecordingTask {
        let task = RecordingTask::new(&format!("{}.{}", self.name, suffix), &self.log);
        if self.fail_inner == Some(suffix) {
            task.failing()
        } else {
            task
        }
    }
}

impl Task for FanOutMetaTask {
    fn name(&self) -> &str {
        &self.name
    }

    fn execute<'a>(&'a self, _ctx: &'a mut TaskContext) -> TaskFuture<'a> {
        Box::pin(async move {
            self.log.record(&self.name, EventKind::Started);
            self.log.record(&self.name, EventKind::Finished);
            Ok(())
        })
    }
}

impl MetaTask for FanOutMetaTask {
    fn task_graph(&self) -> anyhow::Result<TaskGraph> {
        let guard = TaskGuard::AllPredecessorsSucceeded;
        let mut graph = TaskGraph::new();
        let a = graph.add_task(self.inner("A"), guard, &[])?;
        let b = graph.add_task(self.inner("B"), guard, &[a])?;
        let c = graph.add_task(self.inner("C"), guard, &[a])?;
        graph.add_task(self.inner("D"), guard, &[b, c])?;
        graph.add_task(self.inner("E"), guard, &[a])?;
        Ok(graph)
    }
}
