// src/config/model.rs

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::dag::TaskGuard;
use crate::types::PersistenceMode;

/// Top-level configuration as read from a TOML file.
///
/// ```toml
/// [engine]
/// task_thread_pool_size = 40
/// job_thread_pool_size = 10
/// shutdown_timeout = "60s"
///
/// [persistence]
/// mode = "file"
/// dir = ".jobgraph"
///
/// [job]
/// name = "conformance"
///
/// [task.A]
/// cmd = "echo A"
///
/// [task.B]
/// cmd = "echo B"
/// after = ["A"]
/// guard = "all_predecessors_completed"
/// ```
///
/// All sections are optional and have reasonable defaults.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub engine: EngineConfig,
    pub persistence: PersistenceConfig,
    pub job: JobSection,
    pub task: BTreeMap<String, TaskConfig>,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(
        engine: EngineConfig,
        persistence: PersistenceConfig,
        job: JobSection,
        task: BTreeMap<String, TaskConfig>,
    ) -> Self {
        Self {
            engine,
            persistence,
            job,
            task,
        }
    }
}

/// Unvalidated file contents. Convert with `ConfigFile::try_from`.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawConfigFile {
    #[serde(default)]
    pub engine: EngineSection,

    #[serde(default)]
    pub persistence: PersistenceConfig,

    #[serde(default)]
    pub job: JobSection,

    /// All tasks from `[task.<name>]`, keyed by task name.
    #[serde(default)]
    pub task: BTreeMap<String, TaskConfig>,
}

/// `[engine]` section as written in the file.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineSection {
    /// Tasks allowed to run at the same time, across all jobs.
    #[serde(default = "default_task_thread_pool_size")]
    pub task_thread_pool_size: usize,

    /// Jobs allowed to be started and tracked at the same time.
    #[serde(default = "default_job_thread_pool_size")]
    pub job_thread_pool_size: usize,

    /// How long `shutdown` waits for active jobs (e.g. `"60s"`, `"500ms"`).
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout: String,
}

fn default_task_thread_pool_size() -> usize {
    40
}

fn default_job_thread_pool_size() -> usize {
    10
}

fn default_shutdown_timeout() -> String {
    "60s".to_string()
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            task_thread_pool_size: default_task_thread_pool_size(),
            job_thread_pool_size: default_job_thread_pool_size(),
            shutdown_timeout: default_shutdown_timeout(),
        }
    }
}

/// Validated engine settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub task_thread_pool_size: usize,
    pub job_thread_pool_size: usize,
    pub shutdown_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            task_thread_pool_size: default_task_thread_pool_size(),
            job_thread_pool_size: default_job_thread_pool_size(),
            shutdown_timeout: Duration::from_secs(60),
        }
    }
}

impl EngineConfig {
    pub fn with_pool_sizes(task_thread_pool_size: usize, job_thread_pool_size: usize) -> Self {
        Self {
            task_thread_pool_size,
            job_thread_pool_size,
            ..Self::default()
        }
    }

    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }
}

/// `[persistence]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct PersistenceConfig {
    #[serde(default)]
    pub mode: PersistenceMode,

    /// Directory for file records; `<dir>/jobs/<job-id>.json`.
    #[serde(default = "default_persistence_dir")]
    pub dir: PathBuf,
}

fn default_persistence_dir() -> PathBuf {
    PathBuf::from(".jobgraph")
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            mode: PersistenceMode::default(),
            dir: default_persistence_dir(),
        }
    }
}

/// `[job]` section, used when running the configured tasks as one job.
#[derive(Debug, Clone, Deserialize)]
pub struct JobSection {
    #[serde(default = "default_job_name")]
    pub name: String,
}

fn default_job_name() -> String {
    "jobgraph".to_string()
}

impl Default for JobSection {
    fn default() -> Self {
        Self {
            name: default_job_name(),
        }
    }
}

/// `[task.<name>]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct TaskConfig {
    /// The shell command to execute.
    pub cmd: String,

    /// Tasks that must settle before this one, per `guard`.
    #[serde(default)]
    pub after: Vec<String>,

    #[serde(default)]
    pub guard: TaskGuard,
}
