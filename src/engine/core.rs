// src/engine/core.rs

//! Shared engine state and the per-job driver.
//!
//! A job goes through: object locks, a job-pool permit, start, event-driven
//! execution on the task pool, and finally `finalize` (persist, release
//! locks, leave the active set, listeners, wake waiters).

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{Semaphore, watch};
use tracing::{debug, info};

use crate::config::EngineConfig;
use crate::dag::SlotValue;
use crate::engine::job::{Job, JobCompletionListener};
use crate::engine::scheduler::{self, Activation};
use crate::exec::task_runner;
use crate::lock::LockManager;
use crate::persist::RecordStore;
use crate::persist::bridge;
use crate::types::{JobId, JobStatus, TaskId};

pub struct EngineCore {
    pub(crate) config: EngineConfig,
    pub(crate) task_permits: Arc<Semaphore>,
    pub(crate) job_permits: Arc<Semaphore>,
    pub(crate) locks: LockManager,
    pub(crate) store: Arc<dyn RecordStore>,
    pub(crate) listeners: Mutex<Vec<Arc<dyn JobCompletionListener>>>,
    pub(crate) unit_of_work: Option<SlotValue>,
    active: Mutex<HashMap<JobId, Arc<Job>>>,
    active_tx: watch::Sender<usize>,
    accepting: AtomicBool,
}

impl EngineCore {
    pub(crate) fn new(
        config: EngineConfig,
        store: Arc<dyn RecordStore>,
        unit_of_work: Option<SlotValue>,
        listeners: Vec<Arc<dyn JobCompletionListener>>,
    ) -> Self {
        let (active_tx, _) = watch::channel(0);
        Self {
            task_permits: Arc::new(Semaphore::new(config.task_thread_pool_size)),
            job_permits: Arc::new(Semaphore::new(config.job_thread_pool_size)),
            config,
            locks: LockManager::new(),
            store,
            listeners: Mutex::new(listeners),
            unit_of_work,
            active: Mutex::new(HashMap::new()),
            active_tx,
            accepting: AtomicBool::new(true),
        }
    }

    pub(crate) fn is_accepting(&self) -> bool {
        self.accepting.load(Ordering::SeqCst)
    }

    pub(crate) fn stop_accepting(&self) {
        self.accepting.store(false, Ordering::SeqCst);
    }

    pub(crate) fn close_pools(&self) {
        self.task_permits.close();
        self.job_permits.close();
    }

    pub(crate) fn register(&self, job: &Arc<Job>) {
        let mut active = self.active.lock();
        active.insert(job.id(), Arc::clone(job));
        self.active_tx.send_replace(active.len());
    }

    fn deregister(&self, id: JobId) {
        let mut active = self.active.lock();
        active.remove(&id);
        self.active_tx.send_replace(active.len());
    }

    pub(crate) fn active_count(&self) -> usize {
        self.active.lock().len()
    }

    pub(crate) fn active_jobs(&self) -> Vec<Arc<Job>> {
        self.active.lock().values().cloned().collect()
    }

    pub(crate) fn job(&self, id: JobId) -> Option<Arc<Job>> {
        self.active.lock().get(&id).cloned()
    }

    /// Wait until no job is active. Returns `false` on timeout.
    pub(crate) async fn wait_idle(&self, timeout: Duration) -> bool {
        let mut rx = self.active_tx.subscribe();
        matches!(
            tokio::time::timeout(timeout, rx.wait_for(|n| *n == 0)).await,
            Ok(Ok(_))
        )
    }

    pub(crate) fn persist_job(&self, job: &Job) {
        if job.is_persistent() {
            let _gate = job.persist_gate.lock();
            bridge::store_job(self.store.as_ref(), &job.snapshot());
        }
    }

    pub(crate) fn persist_tasks(&self, job: &Job, ids: &[TaskId]) {
        if job.is_persistent() && !ids.is_empty() {
            let _gate = job.persist_gate.lock();
            bridge::store_tasks(self.store.as_ref(), job.id(), &job.task_records(ids));
        }
    }

    /// Drive one job from lock acquisition to finalization.
    pub(crate) async fn drive(self: Arc<Self>, job: Arc<Job>) {
        tokio::select! {
            _ = self.locks.acquire_all(job.id(), job.lock_objects()) => {}
            _ = job.terminal() => {}
        }

        let permit = if job.status().is_terminal() {
            None
        } else {
            tokio::select! {
                permit = Arc::clone(&self.job_permits).acquire_owned() => match permit {
                    Ok(permit) => Some(permit),
                    Err(_) => {
                        job.abort("job pool closed before the job could start");
                        None
                    }
                },
                _ = job.terminal() => None,
            }
        };

        if permit.is_some() {
            let act = scheduler::start(&mut job.state.lock());
            info!(
                job = %job.id(),
                name = %job.name(),
                ready = act.ready.len(),
                "job started"
            );
            job.publish_status(JobStatus::Running);
            self.persist_job(&job);
            self.apply(&job, act);
        }

        job.terminal().await;
        self.finalize(&job);
        drop(permit);
    }

    /// Report and persist what an activation changed, then hand its ready
    /// nodes to the task pool.
    pub(crate) fn apply(self: &Arc<Self>, job: &Arc<Job>, act: Activation) {
        job.fire_task_changes();
        self.persist_tasks(job, &act.settled);
        self.dispatch(job, act.ready);
        if let Some(status) = act.completed {
            job.publish_status(status);
        }
    }

    pub(crate) fn dispatch(self: &Arc<Self>, job: &Arc<Job>, ready: Vec<TaskId>) {
        for id in ready {
            debug!(job = %job.id(), task = %id, "dispatching task");
            tokio::spawn(task_runner::run_node(Arc::clone(self), Arc::clone(job), id));
        }
    }

    fn finalize(&self, job: &Arc<Job>) {
        self.persist_job(job);
        self.locks.release_all(job.id());
        self.deregister(job.id());
        job.fire_task_changes();
        job.fire_listeners();
        job.mark_finished();
    }
}
