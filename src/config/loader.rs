// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::Result;

/// Load a configuration file from a given path and return the raw `RawConfigFile`.
///
/// This only performs TOML deserialization; it does **not** perform semantic
/// validation. Use [`load_and_validate`] for that.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawConfigFile> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;
    load_from_str(&contents)
}

pub fn load_from_str(contents: &str) -> Result<RawConfigFile> {
    let config: RawConfigFile = toml::from_str(contents)?;
    Ok(config)
}

/// Load a configuration file from path and run validation.
///
/// - Reads TOML.
/// - Applies defaults (handled by `serde` + `Default` impls).
/// - Checks pool sizes, the shutdown timeout, unknown `after` references and
///   DAG cycles.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<ConfigFile> {
    let raw_config = load_from_path(&path)?;
    let config = ConfigFile::try_from(raw_config)?;
    Ok(config)
}

/// Default config location: `Jobgraph.toml` in the working directory.
pub fn default_config_path() -> PathBuf {
    PathBuf::from("Jobgraph.toml")
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::dag::TaskGuard;
    use crate::types::PersistenceMode;

    #[test]
    fn parses_full_document() {
        let raw = load_from_str(
            r#"
            [engine]
            task_thread_pool_size = 4
            job_thread_pool_size = 2
            shutdown_timeout = "250ms"

            [persistence]
            mode = "file"
            dir = "/tmp/records"

            [job]
            name = "sync"

            [task.A]
            cmd = "echo A"

            [task.B]
            cmd = "echo B"
            after = ["A"]
            guard = "all_predecessors_completed"
            "#,
        )
        .unwrap();
        let cfg = ConfigFile::try_from(raw).unwrap();

        assert_eq!(cfg.engine.task_thread_pool_size, 4);
        assert_eq!(cfg.engine.shutdown_timeout, Duration::from_millis(250));
        assert_eq!(cfg.persistence.mode, PersistenceMode::File);
        assert_eq!(cfg.job.name, "sync");
        assert_eq!(cfg.task["B"].guard, TaskGuard::AllPredecessorsCompleted);
        assert_eq!(cfg.task["A"].guard, TaskGuard::AllPredecessorsSucceeded);
    }

    #[test]
    fn unknown_guard_is_a_toml_error() {
        let err = load_from_str(
            r#"
            [task.A]
            cmd = "echo A"
            guard = "sometimes"
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, crate::errors::JobGraphError::TomlError(_)));
    }
}
