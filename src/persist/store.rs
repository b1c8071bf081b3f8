// src/persist/store.rs

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::persist::records::{JobRecord, TaskRecord};
use crate::types::JobId;

/// Relative path (from the persistence directory) to the job records.
///
/// Each job lives in `<dir>/jobs/<job-id>.json`.
pub const JOBS_DIR: &str = "jobs";

/// Abstract storage for job and task records.
pub trait RecordStore: Send + Sync {
    /// Insert or replace a whole job record, tasks included.
    fn save_job(&self, record: &JobRecord) -> Result<()>;
    /// Insert or replace one task record of an already saved job.
    fn save_task(&self, job: JobId, record: &TaskRecord) -> Result<()>;
    fn load_job(&self, job: JobId) -> Result<Option<JobRecord>>;
    fn load_jobs(&self) -> Result<Vec<JobRecord>>;
}

/// Stores records as JSON files under a directory.
pub struct FileRecordStore {
    root: PathBuf,
    // Serializes read-modify-write cycles on the same file.
    write_lock: Mutex<()>,
}

impl FileRecordStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn jobs_dir(&self) -> PathBuf {
        self.root.join(JOBS_DIR)
    }

    fn job_path(&self, job: JobId) -> PathBuf {
        self.jobs_dir().join(format!("{job}.json"))
    }

    fn write_record(&self, record: &JobRecord) -> Result<()> {
        let dir = self.jobs_dir();
        fs::create_dir_all(&dir)
            .with_context(|| format!("creating record directory {:?}", dir))?;

        let path = self.job_path(record.id);
        let tmp = path.with_extension("json.tmp");
        {
            let file = File::create(&tmp)
                .with_context(|| format!("creating record file {:?}", tmp))?;
            let mut writer = BufWriter::new(file);
            serde_json::to_writer_pretty(&mut writer, record)
                .with_context(|| format!("serializing job record {}", record.id))?;
            writer.flush()?;
        }
        fs::rename(&tmp, &path).with_context(|| format!("replacing record file {:?}", path))?;
        debug!(job = %record.id, path = ?path, "stored job record (file)");
        Ok(())
    }
}

fn read_record(path: &Path) -> Result<JobRecord> {
    let file = File::open(path).with_context(|| format!("opening record file {:?}", path))?;
    let record = serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("parsing record file {:?}", path))?;
    Ok(record)
}

impl RecordStore for FileRecordStore {
    fn save_job(&self, record: &JobRecord) -> Result<()> {
        let _guard = self.write_lock.lock();
        self.write_record(record)
    }

    fn save_task(&self, job: JobId, record: &TaskRecord) -> Result<()> {
        let _guard = self.write_lock.lock();
        let path = self.job_path(job);
        if !path.exists() {
            anyhow::bail!("no record for job {job} at {:?}", path);
        }
        let mut job_record = read_record(&path)?;
        job_record.upsert_task(record.clone());
        self.write_record(&job_record)
    }

    fn load_job(&self, job: JobId) -> Result<Option<JobRecord>> {
        let path = self.job_path(job);
        if !path.exists() {
            return Ok(None);
        }
        read_record(&path).map(Some)
    }

    fn load_jobs(&self) -> Result<Vec<JobRecord>> {
        let dir = self.jobs_dir();
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut records = Vec::new();
        for entry in fs::read_dir(&dir).with_context(|| format!("listing {:?}", dir))? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match read_record(&path) {
                Ok(record) => records.push(record),
                Err(err) => warn!(path = ?path, error = %err, "skipping unreadable job record"),
            }
        }
        records.sort_by_key(|r| r.queued_at);
        Ok(records)
    }
}

/// Stores records in memory only.
#[derive(Default)]
pub struct MemoryRecordStore {
    jobs: Mutex<HashMap<JobId, JobRecord>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RecordStore for MemoryRecordStore {
    fn save_job(&self, record: &JobRecord) -> Result<()> {
        self.jobs.lock().insert(record.id, record.clone());
        debug!(job = %record.id, "stored job record (memory)");
        Ok(())
    }

    fn save_task(&self, job: JobId, record: &TaskRecord) -> Result<()> {
        let mut jobs = self.jobs.lock();
        let job_record = jobs
            .get_mut(&job)
            .with_context(|| format!("no record for job {job}"))?;
        job_record.upsert_task(record.clone());
        Ok(())
    }

    fn load_job(&self, job: JobId) -> Result<Option<JobRecord>> {
        Ok(self.jobs.lock().get(&job).cloned())
    }

    fn load_jobs(&self) -> Result<Vec<JobRecord>> {
        let mut records: Vec<JobRecord> = self.jobs.lock().values().cloned().collect();
        records.sort_by_key(|r| r.queued_at);
        Ok(records)
    }
}
