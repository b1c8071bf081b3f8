// src/config/validate.rs

use std::collections::BTreeMap;
use std::time::Duration;

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;

use crate::config::model::{ConfigFile, EngineConfig, RawConfigFile, TaskConfig};
use crate::errors::{JobGraphError, Result};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = crate::errors::JobGraphError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        let engine = validate_raw_config(&raw)?;
        Ok(ConfigFile::new_unchecked(
            engine,
            raw.persistence,
            raw.job,
            raw.task,
        ))
    }
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<EngineConfig> {
    let engine = validate_engine(cfg)?;
    validate_task_dependencies(cfg)?;
    validate_dag(cfg)?;
    Ok(engine)
}

fn validate_engine(cfg: &RawConfigFile) -> Result<EngineConfig> {
    let e = &cfg.engine;
    if e.task_thread_pool_size == 0 {
        return Err(JobGraphError::ConfigError(
            "[engine].task_thread_pool_size must be >= 1 (got 0)".to_string(),
        ));
    }
    if e.job_thread_pool_size == 0 {
        return Err(JobGraphError::ConfigError(
            "[engine].job_thread_pool_size must be >= 1 (got 0)".to_string(),
        ));
    }
    let shutdown_timeout = parse_duration(&e.shutdown_timeout)
        .map_err(|msg| JobGraphError::ConfigError(format!("[engine].shutdown_timeout: {msg}")))?;

    Ok(EngineConfig {
        task_thread_pool_size: e.task_thread_pool_size,
        job_thread_pool_size: e.job_thread_pool_size,
        shutdown_timeout,
    })
}

fn validate_task_dependencies(cfg: &RawConfigFile) -> Result<()> {
    for (name, task) in cfg.task.iter() {
        for dep in task.after.iter() {
            if !cfg.task.contains_key(dep) {
                return Err(JobGraphError::ConfigError(format!(
                    "task '{}' has unknown dependency '{}' in `after`",
                    name, dep
                )));
            }
            if dep == name {
                return Err(JobGraphError::ConfigError(format!(
                    "task '{}' cannot depend on itself in `after`",
                    name
                )));
            }
        }
    }
    Ok(())
}

fn validate_dag(cfg: &RawConfigFile) -> Result<()> {
    task_order(&cfg.task).map(|_| ())
}

/// Task names ordered so every task comes after everything in its `after`
/// list.
pub fn task_order(tasks: &BTreeMap<String, TaskConfig>) -> Result<Vec<&str>> {
    // Edge direction: dep -> task
    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();

    for name in tasks.keys() {
        graph.add_node(name.as_str());
    }

    for (name, task) in tasks.iter() {
        for dep in task.after.iter() {
            graph.add_edge(dep.as_str(), name.as_str(), ());
        }
    }

    match toposort(&graph, None) {
        Ok(order) => Ok(order),
        Err(cycle) => {
            let node = cycle.node_id();
            Err(JobGraphError::DagCycle(format!(
                "cycle detected in task DAG involving task '{}'",
                node
            )))
        }
    }
}

/// Parse a duration such as `"500ms"`, `"3s"`, `"2m"` or `"1h"`.
pub fn parse_duration(s: &str) -> std::result::Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty duration string".to_string());
    }

    let idx = s
        .chars()
        .position(|c| !c.is_ascii_digit())
        .ok_or_else(|| "duration missing unit suffix".to_string())?;

    let (num_part, unit_part) = s.split_at(idx);
    let value: u64 = num_part
        .parse()
        .map_err(|e| format!("invalid duration number '{}': {}", num_part, e))?;
    let unit = unit_part.trim().to_lowercase();

    match unit.as_str() {
        "ms" => Ok(Duration::from_millis(value)),
        "s" => Ok(Duration::from_secs(value)),
        "m" => Ok(Duration::from_secs(value * 60)),
        "h" => Ok(Duration::from_secs(value * 60 * 60)),
        _ => Err(format!(
            "unsupported duration unit '{}'; expected ms, s, m, or h",
            unit
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::model::TaskConfig;
    use crate::dag::TaskGuard;

    fn task(cmd: &str, after: &[&str]) -> TaskConfig {
        TaskConfig {
            cmd: cmd.to_string(),
            after: after.iter().map(|s| s.to_string()).collect(),
            guard: TaskGuard::default(),
        }
    }

    #[test]
    fn defaults_are_applied() {
        let cfg = ConfigFile::try_from(RawConfigFile::default()).unwrap();
        assert_eq!(cfg.engine, EngineConfig::default());
        assert_eq!(cfg.engine.task_thread_pool_size, 40);
        assert_eq!(cfg.engine.job_thread_pool_size, 10);
    }

    #[test]
    fn zero_pool_size_is_rejected() {
        let mut raw = RawConfigFile::default();
        raw.engine.job_thread_pool_size = 0;
        let err = ConfigFile::try_from(raw).unwrap_err();
        assert!(matches!(err, JobGraphError::ConfigError(_)));
    }

    #[test]
    fn unknown_dependency_is_rejected() {
        let mut raw = RawConfigFile::default();
        raw.task.insert("A".into(), task("echo A", &["missing"]));
        assert!(ConfigFile::try_from(raw).is_err());
    }

    #[test]
    fn cycles_are_rejected() {
        let mut raw = RawConfigFile::default();
        raw.task.insert("A".into(), task("echo A", &["B"]));
        raw.task.insert("B".into(), task("echo B", &["A"]));
        let err = ConfigFile::try_from(raw).unwrap_err();
        assert!(matches!(err, JobGraphError::DagCycle(_)));
    }

    #[test]
    fn task_order_puts_dependencies_first() {
        let mut raw = RawConfigFile::default();
        raw.task.insert("a".into(), task("echo a", &["b"]));
        raw.task.insert("b".into(), task("echo b", &["c"]));
        raw.task.insert("c".into(), task("echo c", &[]));
        let order = task_order(&raw.task).unwrap();
        assert_eq!(order, vec!["c", "b", "a"]);
    }

    #[test]
    fn durations_parse() {
        assert_eq!(parse_duration("500ms"), Ok(Duration::from_millis(500)));
        assert_eq!(parse_duration(" 2m "), Ok(Duration::from_secs(120)));
        assert!(parse_duration("10").is_err());
        assert!(parse_duration("5d").is_err());
    }
}
