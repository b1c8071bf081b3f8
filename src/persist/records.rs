// src/persist/records.rs

//! Durable shapes of jobs and tasks, as read by audit tooling.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::dag::TaskGuard;
use crate::lock::LockObjectReference;
use crate::types::{JobId, JobStatus, TaskId, TaskStatus};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: JobId,
    pub name: String,
    pub status: JobStatus,
    #[serde(default)]
    pub aborted: bool,
    #[serde(default)]
    pub failure_reason: Option<String>,
    pub queued_at: DateTime<Utc>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub objects: Vec<LockObjectReference>,
    #[serde(default)]
    pub tasks: Vec<TaskRecord>,
}

impl JobRecord {
    pub fn task(&self, id: TaskId) -> Option<&TaskRecord> {
        self.tasks.iter().find(|t| t.id == id)
    }

    pub fn task_by_name(&self, name: &str) -> Option<&TaskRecord> {
        self.tasks.iter().find(|t| t.name == name)
    }

    /// Insert or replace the record for `task.id`.
    pub fn upsert_task(&mut self, task: TaskRecord) {
        match self.tasks.iter_mut().find(|t| t.id == task.id) {
            Some(existing) => *existing = task,
            None => self.tasks.push(task),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: TaskId,
    pub name: String,
    pub status: TaskStatus,
    pub guard: TaskGuard,
    #[serde(default)]
    pub fail_reason: Option<String>,
    #[serde(default)]
    pub queued_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    /// Position in the graph's dependency order.
    pub dependency_order: usize,
    #[serde(default)]
    pub predecessor_ids: Vec<TaskId>,
    #[serde(default)]
    pub successor_ids: Vec<TaskId>,
    /// Meta task that generated this task.
    #[serde(default)]
    pub producer_id: Option<TaskId>,
}
