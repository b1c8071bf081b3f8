#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use jobgraph::config::{
    ConfigFile, EngineConfig, EngineSection, PersistenceConfig, RawConfigFile, TaskConfig,
};
use jobgraph::dag::TaskGuard;
use jobgraph::engine::JobEngine;
use jobgraph::persist::{MemoryRecordStore, RecordStore};

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile::default(),
        }
    }

    pub fn with_task(mut self, name: &str, task: TaskConfig) -> Self {
        self.config.task.insert(name.to_string(), task);
        self
    }

    pub fn with_pools(mut self, task_pool: usize, job_pool: usize) -> Self {
        self.config.engine = EngineSection {
            task_thread_pool_size: task_pool,
            job_thread_pool_size: job_pool,
            ..self.config.engine
        };
        self
    }

    pub fn with_shutdown_timeout(mut self, timeout: &str) -> Self {
        self.config.engine.shutdown_timeout = timeout.to_string();
        self
    }

    pub fn with_persistence(mut self, persistence: PersistenceConfig) -> Self {
        self.config.persistence = persistence;
        self
    }

    pub fn with_job_name(mut self, name: &str) -> Self {
        self.config.job.name = name.to_string();
        self
    }

    pub fn raw(self) -> RawConfigFile {
        self.config
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `TaskConfig`.
pub struct TaskConfigBuilder {
    task: TaskConfig,
}

impl TaskConfigBuilder {
    pub fn new(cmd: &str) -> Self {
        Self {
            task: TaskConfig {
                cmd: cmd.to_string(),
                after: vec![],
                guard: TaskGuard::default(),
            },
        }
    }

    pub fn after(mut self, dep: &str) -> Self {
        self.task.after.push(dep.to_string());
        self
    }

    pub fn guard(mut self, guard: TaskGuard) -> Self {
        self.task.guard = guard;
        self
    }

    pub fn build(self) -> TaskConfig {
        self.task
    }
}

/// Engine settings sized for tests: small pools, short drain timeout.
pub fn engine_config(task_pool: usize, job_pool: usize) -> EngineConfig {
    EngineConfig::with_pool_sizes(task_pool, job_pool)
        .with_shutdown_timeout(Duration::from_secs(5))
}

/// An isolated engine backed by a fresh in-memory store.
pub fn memory_engine(task_pool: usize, job_pool: usize) -> (JobEngine, Arc<MemoryRecordStore>) {
    let store = Arc::new(MemoryRecordStore::new());
    let engine = JobEngine::new(
        engine_config(task_pool, job_pool),
        Arc::clone(&store) as Arc<dyn RecordStore>,
    );
    (engine, store)
}
