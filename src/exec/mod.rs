// src/exec/mod.rs

//! Task execution layer.
//!
//! - [`task_runner`] runs a single graph node on the task pool and reports the
//!   outcome back to the job's scheduler.
//! - [`command`] provides [`CommandTask`], a shell-command task, and builds a
//!   graph from `[task.*]` config entries.

pub mod command;
pub(crate) mod task_runner;

pub use command::{CommandTask, graph_from_config};
