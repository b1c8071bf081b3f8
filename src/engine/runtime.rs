// src/engine/runtime.rs

//! Public face of the scheduler.
//!
//! A [`JobEngine`] is an explicit value owned by the composition root; tests
//! build their own isolated engines. Cloning it is cheap and yields a handle
//! to the same engine.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, error, info, warn};

use crate::config::{ConfigFile, EngineConfig};
use crate::dag::{SlotValue, TaskGraph};
use crate::engine::core::EngineCore;
use crate::engine::job::{Job, JobCompletionListener, JobRequest};
use crate::errors::{JobGraphError, Result};
use crate::lock::LockManager;
use crate::persist::{JobRecord, RecordStore, store_from_config};
use crate::types::{JobId, JobStatus};

/// Failure reason stamped on jobs found unfinished at startup.
pub const RECOVERY_REASON: &str = "aborted: engine restarted while job was running";

const FORCED_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[derive(Clone)]
pub struct JobEngine {
    core: Arc<EngineCore>,
}

/// Builder for [`JobEngine`].
pub struct JobEngineBuilder {
    config: EngineConfig,
    store: Option<Arc<dyn RecordStore>>,
    unit_of_work: Option<SlotValue>,
    listeners: Vec<Arc<dyn JobCompletionListener>>,
}

impl JobEngineBuilder {
    pub fn store(mut self, store: Arc<dyn RecordStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Context handed to every task through `TaskContext::unit_of_work`.
    pub fn unit_of_work(mut self, uow: SlotValue) -> Self {
        self.unit_of_work = Some(uow);
        self
    }

    pub fn listener(mut self, listener: Arc<dyn JobCompletionListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    pub fn build(self) -> JobEngine {
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(crate::persist::MemoryRecordStore::new()));
        info!(
            task_pool = self.config.task_thread_pool_size,
            job_pool = self.config.job_thread_pool_size,
            "job engine initialised"
        );
        JobEngine {
            core: Arc::new(EngineCore::new(
                self.config,
                store,
                self.unit_of_work,
                self.listeners,
            )),
        }
    }
}

impl JobEngine {
    pub fn new(config: EngineConfig, store: Arc<dyn RecordStore>) -> Self {
        Self::builder(config).store(store).build()
    }

    pub fn builder(config: EngineConfig) -> JobEngineBuilder {
        JobEngineBuilder {
            config,
            store: None,
            unit_of_work: None,
            listeners: Vec::new(),
        }
    }

    /// Engine with pools and record store taken from a validated config.
    pub fn from_config(cfg: &ConfigFile) -> Self {
        Self::new(cfg.engine.clone(), store_from_config(&cfg.persistence))
    }

    pub fn config(&self) -> &EngineConfig {
        &self.core.config
    }

    pub fn store(&self) -> Arc<dyn RecordStore> {
        Arc::clone(&self.core.store)
    }

    pub fn lock_manager(&self) -> &LockManager {
        &self.core.locks
    }

    /// Submit `graph` as a job named `name`.
    ///
    /// With `run_synchronously` the call returns once the job has finished;
    /// otherwise it returns right after submission. Lock contention never
    /// blocks the caller in the asynchronous case.
    pub async fn submit(
        &self,
        name: impl Into<String>,
        graph: TaskGraph,
        run_synchronously: bool,
    ) -> Result<Arc<Job>> {
        self.submit_request(JobRequest::new(name, graph).synchronous(run_synchronously))
            .await
    }

    pub async fn submit_with_listener(
        &self,
        name: impl Into<String>,
        graph: TaskGraph,
        listener: Arc<dyn JobCompletionListener>,
        run_synchronously: bool,
    ) -> Result<Arc<Job>> {
        self.submit_request(
            JobRequest::new(name, graph)
                .with_listener(listener)
                .synchronous(run_synchronously),
        )
        .await
    }

    pub async fn submit_request(&self, request: JobRequest) -> Result<Arc<Job>> {
        if !self.core.is_accepting() {
            return Err(JobGraphError::EngineShutdown(request.name));
        }
        request.graph.validate()?;

        let run_synchronously = request.run_synchronously;
        let job = Arc::new(Job::new(request));
        for listener in self.core.listeners.lock().iter() {
            job.add_listener(Arc::clone(listener));
        }

        self.core.register(&job);
        self.core.persist_job(&job);
        info!(
            job = %job.id(),
            name = %job.name(),
            tasks = job.with_graph(|g| g.task_count()),
            objects = job.lock_objects().len(),
            "job submitted"
        );

        tokio::spawn(Arc::clone(&self.core).drive(Arc::clone(&job)));

        if run_synchronously {
            job.wait_for_completion().await;
        }
        Ok(job)
    }

    /// Listener applied to every job submitted from now on.
    pub fn add_job_completion_listener(&self, listener: Arc<dyn JobCompletionListener>) {
        self.core.listeners.lock().push(listener);
    }

    pub fn active_job_count(&self) -> usize {
        self.core.active_count()
    }

    /// Whether the engine still accepts submissions.
    pub fn is_active(&self) -> bool {
        self.core.is_accepting()
    }

    pub fn job(&self, id: JobId) -> Option<Arc<Job>> {
        self.core.job(id)
    }

    pub fn active_jobs(&self) -> Vec<Arc<Job>> {
        self.core.active_jobs()
    }

    /// Abort an active job. Returns `false` if it is unknown or already done.
    pub fn abort_job(&self, id: JobId, reason: &str) -> bool {
        self.core.job(id).is_some_and(|job| job.abort(reason))
    }

    /// Mark every persisted job that never finished as failed.
    ///
    /// In-memory graphs cannot be rebuilt after a crash, so such jobs are
    /// surfaced as aborted failures instead of being resumed. Returns the
    /// rewritten records.
    pub fn recover(&self) -> Result<Vec<JobRecord>> {
        let records = self
            .core
            .store
            .load_jobs()
            .map_err(|e| JobGraphError::Persistence(format!("{e:#}")))?;

        let now = Utc::now();
        let mut recovered = Vec::new();
        for mut record in records {
            if record.status.is_terminal() || self.core.job(record.id).is_some() {
                continue;
            }

            record.status = JobStatus::Failed;
            record.aborted = true;
            record.failure_reason = Some(RECOVERY_REASON.to_string());
            record.completed_at = Some(now);
            for task in record.tasks.iter_mut().filter(|t| !t.status.is_terminal()) {
                task.status = crate::types::TaskStatus::Failed;
                task.fail_reason = Some(RECOVERY_REASON.to_string());
                task.completed_at = Some(now);
            }

            if let Err(err) = self.core.store.save_job(&record) {
                error!(job = %record.id, error = %err, "failed to persist recovered job");
            }
            warn!(job = %record.id, name = %record.name, "unfinished job marked aborted");
            recovered.push(record);
        }
        Ok(recovered)
    }

    /// Stop accepting jobs, let active ones drain, then close both pools.
    ///
    /// Returns [`JobGraphError::DrainTimeout`] when jobs are still active
    /// after the configured shutdown timeout.
    pub async fn shutdown(&self) -> Result<()> {
        self.core.stop_accepting();
        info!(active = self.active_job_count(), "job engine shutting down");

        let drained = self.core.wait_idle(self.core.config.shutdown_timeout).await;
        self.core.close_pools();

        if drained {
            info!("job engine shut down");
            Ok(())
        } else {
            let remaining = self.active_job_count();
            warn!(remaining, "job engine shutdown timed out");
            Err(JobGraphError::DrainTimeout(remaining))
        }
    }

    /// Hard shutdown: abort every active job and close the pools.
    pub async fn shutdown_for_test(&self) {
        self.core.stop_accepting();
        for job in self.core.active_jobs() {
            job.abort("job engine shut down");
        }
        self.core.close_pools();
        if !self.core.wait_idle(FORCED_SHUTDOWN_GRACE).await {
            warn!(remaining = self.active_job_count(), "jobs still active after forced shutdown");
        }
    }

    pub fn log_status(&self) {
        debug!(
            active_jobs = self.active_job_count(),
            free_task_slots = self.core.task_permits.available_permits(),
            free_job_slots = self.core.job_permits.available_permits(),
            accepting = self.core.is_accepting(),
            "job engine status"
        );
    }
}
