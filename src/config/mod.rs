// src/config/mod.rs

//! Configuration loading and validation for jobgraph.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a config file from disk (`loader.rs`).
//! - Validate pool sizes, durations and the task DAG (`validate.rs`).

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{load_and_validate, load_from_path, load_from_str};
pub use model::{
    ConfigFile, EngineConfig, EngineSection, JobSection, PersistenceConfig, RawConfigFile,
    TaskConfig,
};
pub use validate::{parse_duration, task_order};
