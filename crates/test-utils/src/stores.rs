//! Record stores that misbehave on purpose.

use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::{Result, bail};

use jobgraph::persist::{JobRecord, RecordStore, TaskRecord};
use jobgraph::types::JobId;

/// Rejects every write and counts the attempts. Reads find nothing.
#[derive(Debug, Default)]
pub struct UnwritableStore {
    job_writes: AtomicUsize,
    task_writes: AtomicUsize,
}

impl UnwritableStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn job_writes(&self) -> usize {
        self.job_writes.load(Ordering::SeqCst)
    }

    pub fn task_writes(&self) -> usize {
        self.task_writes.load(Ordering::SeqCst)
    }
}

impl RecordStore for UnwritableStore {
    fn save_job(&self, record: &JobRecord) -> Result<()> {
        self.job_writes.fetch_add(1, Ordering::SeqCst);
        bail!("disk full while writing job {}", record.id)
    }

    fn save_task(&self, job: JobId, record: &TaskRecord) -> Result<()> {
        self.task_writes.fetch_add(1, Ordering::SeqCst);
        bail!("disk full while writing task {} of job {job}", record.name)
    }

    fn load_job(&self, _job: JobId) -> Result<Option<JobRecord>> {
        Ok(None)
    }

    fn load_jobs(&self) -> Result<Vec<JobRecord>> {
        Ok(Vec::new())
    }
}
