// src/persist/mod.rs

//! Durable mirror of job and task state.
//!
//! - `records.rs`: serializable job/task records.
//! - `store.rs`: the [`RecordStore`] trait with file and memory backends.
//! - `bridge.rs`: graph to record conversion and best-effort writes.

pub mod bridge;
pub mod records;
pub mod store;

use std::sync::Arc;

pub use records::{JobRecord, TaskRecord};
pub use store::{FileRecordStore, MemoryRecordStore, RecordStore};

use crate::config::PersistenceConfig;
use crate::types::PersistenceMode;

/// Build the store selected by the `[persistence]` section.
pub fn store_from_config(cfg: &PersistenceConfig) -> Arc<dyn RecordStore> {
    match cfg.mode {
        PersistenceMode::File => Arc::new(FileRecordStore::new(cfg.dir.clone())),
        PersistenceMode::Memory => Arc::new(MemoryRecordStore::new()),
    }
}
