// src/engine/job.rs

//! The externally visible unit of submission.
//!
//! A [`Job`] owns one [`TaskGraph`] behind a single mutex. The engine is the
//! only writer; callers observe status, wait for completion and register
//! completion listeners. An optional [`TaskChangeListener`] sees every work
//! node status change, outside the job lock.

use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::{Condvar, Mutex, ReentrantMutex};
use petgraph::stable_graph::NodeIndex;
use tokio::sync::watch;
use tokio::task::AbortHandle;
use tracing::{error, info, warn};

use crate::dag::{TaskGraph, TaskNode};
use crate::lock::{LockObjectReference, merge_references};
use crate::persist::bridge;
use crate::persist::records::{JobRecord, TaskRecord};
use crate::types::{JobId, JobStatus, TaskId, TaskStatus};

/// Called once when a job reaches a terminal status.
pub trait JobCompletionListener: Send + Sync {
    fn completed(&self, job: &Job);
}

impl<F> JobCompletionListener for F
where
    F: Fn(&Job) + Send + Sync,
{
    fn completed(&self, job: &Job) {
        self(job)
    }
}

/// Called after every status change of a work node, with a snapshot of the
/// node as it was right after the change. Sentinels are not reported.
///
/// Calls arrive in the order the changes happened. Do not block inside it.
pub trait TaskChangeListener: Send + Sync {
    fn task_changed(&self, job: &Job, node: &TaskNode);
}

impl<F> TaskChangeListener for F
where
    F: Fn(&Job, &TaskNode) + Send + Sync,
{
    fn task_changed(&self, job: &Job, node: &TaskNode) {
        self(job, node)
    }
}

/// Everything needed to submit a job.
pub struct JobRequest {
    pub name: String,
    pub graph: TaskGraph,
    /// Objects to lock in addition to those declared by the tasks.
    pub objects: Vec<LockObjectReference>,
    pub listener: Option<Arc<dyn JobCompletionListener>>,
    pub task_listener: Option<Arc<dyn TaskChangeListener>>,
    pub run_synchronously: bool,
    /// Whether records are mirrored to the record store.
    pub persistent: bool,
}

impl JobRequest {
    pub fn new(name: impl Into<String>, graph: TaskGraph) -> Self {
        Self {
            name: name.into(),
            graph,
            objects: Vec::new(),
            listener: None,
            task_listener: None,
            run_synchronously: false,
            persistent: true,
        }
    }

    pub fn with_objects(mut self, objects: Vec<LockObjectReference>) -> Self {
        self.objects = objects;
        self
    }

    pub fn with_listener(mut self, listener: Arc<dyn JobCompletionListener>) -> Self {
        self.listener = Some(listener);
        self
    }

    pub fn with_task_listener(mut self, listener: Arc<dyn TaskChangeListener>) -> Self {
        self.task_listener = Some(listener);
        self
    }

    pub fn synchronous(mut self, run_synchronously: bool) -> Self {
        self.run_synchronously = run_synchronously;
        self
    }

    pub fn persistent(mut self, persistent: bool) -> Self {
        self.persistent = persistent;
        self
    }
}

impl std::fmt::Debug for JobRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobRequest")
            .field("name", &self.name)
            .field("tasks", &self.graph.task_count())
            .field("objects", &self.objects)
            .field("run_synchronously", &self.run_synchronously)
            .finish()
    }
}

/// Mutable part of a job, guarded by `Job::state`.
pub(crate) struct JobState {
    pub graph: TaskGraph,
    pub status: JobStatus,
    /// Nodes (sentinels included) that are not terminal yet.
    pub remaining: usize,
    pub queued_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub failure_reason: Option<String>,
    pub aborted: bool,
    pub running: HashMap<TaskId, AbortHandle>,
    /// Node snapshots not yet handed to the task-change listener.
    pub changes: Vec<TaskNode>,
    pub track_changes: bool,
}

impl JobState {
    /// Queue a snapshot of the node at `idx` for the task-change listener.
    pub fn record_change(&mut self, idx: NodeIndex) {
        if self.track_changes && !self.graph.is_sentinel(idx) {
            self.changes.push(self.graph.node_at(idx).clone());
        }
    }

    /// Settle the aggregate status once every node is terminal.
    pub fn complete_if_done(&mut self) -> Option<JobStatus> {
        if self.remaining > 0 || self.status.is_terminal() {
            return None;
        }

        let failed = self
            .graph
            .nodes()
            .find(|n| n.status() == TaskStatus::Failed)
            .map(|n| {
                format!(
                    "task '{}' failed: {}",
                    n.name(),
                    n.fail_reason().unwrap_or("unknown error")
                )
            });

        self.status = if failed.is_some() {
            JobStatus::Failed
        } else {
            JobStatus::Passed
        };
        if self.failure_reason.is_none() {
            self.failure_reason = failed;
        }
        self.completed_at = Some(Utc::now());
        Some(self.status)
    }
}

struct Listeners {
    fired: bool,
    pending: Vec<Arc<dyn JobCompletionListener>>,
}

pub struct Job {
    id: JobId,
    name: String,
    persistent: bool,
    objects: Vec<LockObjectReference>,
    pub(crate) state: Mutex<JobState>,
    // Held from capturing a record until the store has it, so writes land in
    // capture order.
    pub(crate) persist_gate: Mutex<()>,
    listeners: Mutex<Listeners>,
    task_listener: Option<Arc<dyn TaskChangeListener>>,
    // Keeps deliveries from different threads from interleaving.
    change_gate: ReentrantMutex<()>,
    status_tx: watch::Sender<JobStatus>,
    finished_tx: watch::Sender<bool>,
    finished: Mutex<bool>,
    finished_cv: Condvar,
}

impl Job {
    pub(crate) fn new(request: JobRequest) -> Self {
        let JobRequest {
            name,
            graph,
            objects,
            listener,
            task_listener,
            persistent,
            ..
        } = request;

        let declared = graph
            .nodes()
            .filter_map(|n| n.task())
            .flat_map(|t| t.lock_objects())
            .collect::<Vec<_>>();
        let objects = merge_references(objects.into_iter().chain(declared));

        let remaining = graph.task_count() + 2;
        let (status_tx, _) = watch::channel(JobStatus::Queued);
        let (finished_tx, _) = watch::channel(false);

        Self {
            id: JobId::new(),
            name,
            persistent,
            objects,
            state: Mutex::new(JobState {
                graph,
                status: JobStatus::Queued,
                remaining,
                queued_at: Utc::now(),
                started_at: None,
                completed_at: None,
                failure_reason: None,
                aborted: false,
                running: HashMap::new(),
                changes: Vec::new(),
                track_changes: task_listener.is_some(),
            }),
            persist_gate: Mutex::new(()),
            listeners: Mutex::new(Listeners {
                fired: false,
                pending: listener.into_iter().collect(),
            }),
            task_listener,
            change_gate: ReentrantMutex::new(()),
            status_tx,
            finished_tx,
            finished: Mutex::new(false),
            finished_cv: Condvar::new(),
        }
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_persistent(&self) -> bool {
        self.persistent
    }

    /// Objects locked for the duration of the job, one entry per object.
    pub fn lock_objects(&self) -> &[LockObjectReference] {
        &self.objects
    }

    pub fn status(&self) -> JobStatus {
        self.state.lock().status
    }

    pub fn failure_reason(&self) -> Option<String> {
        self.state.lock().failure_reason.clone()
    }

    pub fn is_aborted(&self) -> bool {
        self.state.lock().aborted
    }

    pub fn queued_at(&self) -> DateTime<Utc> {
        self.state.lock().queued_at
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.state.lock().started_at
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.state.lock().completed_at
    }

    pub fn task_status(&self, id: TaskId) -> Option<TaskStatus> {
        self.state.lock().graph.status(id)
    }

    /// Status of the first task called `name`.
    pub fn task_status_by_name(&self, name: &str) -> Option<TaskStatus> {
        self.state
            .lock()
            .graph
            .node_by_name(name)
            .map(|n| n.status())
    }

    /// Inspect the graph. Do not block inside `f`; the job is locked.
    pub fn with_graph<R>(&self, f: impl FnOnce(&TaskGraph) -> R) -> R {
        f(&self.state.lock().graph)
    }

    /// Current state as a persistable record.
    pub fn snapshot(&self) -> JobRecord {
        let state = self.state.lock();
        JobRecord {
            id: self.id,
            name: self.name.clone(),
            status: state.status,
            aborted: state.aborted,
            failure_reason: state.failure_reason.clone(),
            queued_at: state.queued_at,
            started_at: state.started_at,
            completed_at: state.completed_at,
            objects: self.objects.clone(),
            tasks: bridge::task_records(&state.graph),
        }
    }

    pub(crate) fn task_records(&self, ids: &[TaskId]) -> Vec<TaskRecord> {
        let state = self.state.lock();
        let order = bridge::dependency_order(&state.graph);
        ids.iter()
            .filter_map(|id| state.graph.node(*id))
            .map(|n| bridge::task_record(&state.graph, n, order.get(&n.id()).copied().unwrap_or(0)))
            .collect()
    }

    /// Register a listener. A job that has already finished calls it right
    /// away.
    pub fn add_listener(&self, listener: Arc<dyn JobCompletionListener>) {
        let mut listeners = self.listeners.lock();
        if listeners.fired {
            drop(listeners);
            self.notify(listener.as_ref());
        } else {
            listeners.pending.push(listener);
        }
    }

    /// Wait until the job is terminal and its listeners have run.
    pub async fn wait_for_completion(&self) -> JobStatus {
        let mut rx = self.finished_tx.subscribe();
        if rx.wait_for(|done| *done).await.is_err() {
            warn!(job = %self.id, "completion channel closed while waiting");
        }
        self.status()
    }

    /// Blocking variant of [`Job::wait_for_completion`].
    ///
    /// Must not be called from an async worker thread.
    pub fn wait_for_completion_blocking(&self) -> JobStatus {
        let mut finished = self.finished.lock();
        while !*finished {
            self.finished_cv.wait(&mut finished);
        }
        drop(finished);
        self.status()
    }

    pub fn is_finished(&self) -> bool {
        *self.finished.lock()
    }

    /// Stop the job: running tasks fail, everything else is skipped and the
    /// job ends up `Failed`. Returns `false` if it was already terminal.
    pub fn abort(&self, reason: &str) -> bool {
        let handles = {
            let mut state = self.state.lock();
            if state.status.is_terminal() {
                return false;
            }
            for idx in state.graph.all_indices() {
                if state.graph.node_at_mut(idx).abort(reason) {
                    state.record_change(idx);
                }
            }
            state.remaining = 0;
            state.aborted = true;
            state.failure_reason = Some(reason.to_string());
            state.status = JobStatus::Failed;
            state.completed_at = Some(Utc::now());
            state.running.drain().map(|(_, h)| h).collect::<Vec<_>>()
        };
        for handle in handles {
            handle.abort();
        }
        warn!(job = %self.id, name = %self.name, reason, "job aborted");
        self.fire_task_changes();
        self.publish_status(JobStatus::Failed);
        true
    }

    /// Publish `status` to the driver. A terminal value is never replaced.
    pub(crate) fn publish_status(&self, status: JobStatus) {
        self.status_tx.send_if_modified(|current| {
            if current.is_terminal() {
                return false;
            }
            *current = status;
            true
        });
    }

    /// Resolve once the aggregate status is terminal.
    pub(crate) async fn terminal(&self) {
        let mut rx = self.status_tx.subscribe();
        let _ = rx.wait_for(|s| s.is_terminal()).await;
    }

    /// Hand queued node snapshots to the task-change listener.
    pub(crate) fn fire_task_changes(&self) {
        let Some(listener) = &self.task_listener else {
            return;
        };
        let _gate = self.change_gate.lock();
        let changes = std::mem::take(&mut self.state.lock().changes);
        for node in &changes {
            if catch_unwind(AssertUnwindSafe(|| listener.task_changed(self, node))).is_err() {
                error!(
                    job = %self.id,
                    task = %node.name(),
                    status = %node.status(),
                    "task change listener panicked"
                );
            }
        }
    }

    /// Run pending listeners exactly once.
    pub(crate) fn fire_listeners(&self) {
        let pending = {
            let mut listeners = self.listeners.lock();
            listeners.fired = true;
            std::mem::take(&mut listeners.pending)
        };
        for listener in pending {
            self.notify(listener.as_ref());
        }
    }

    fn notify(&self, listener: &dyn JobCompletionListener) {
        if catch_unwind(AssertUnwindSafe(|| listener.completed(self))).is_err() {
            error!(job = %self.id, name = %self.name, "job completion listener panicked");
        }
    }

    /// Wake everything waiting on completion.
    pub(crate) fn mark_finished(&self) {
        {
            let mut finished = self.finished.lock();
            *finished = true;
        }
        self.finished_cv.notify_all();
        self.finished_tx.send_replace(true);
        info!(
            job = %self.id,
            name = %self.name,
            status = %self.status(),
            "job finished"
        );
    }
}

impl std::fmt::Debug for Job {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Job")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("status", &self.status())
            .finish()
    }
}
