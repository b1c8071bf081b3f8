// src/engine/mod.rs

//! Job execution engine.
//!
//! This module ties together:
//! - [`job`]: the submitted unit, its status and completion listeners
//! - [`scheduler`]: guard-driven activation of nodes under the job lock
//! - [`core`]: shared pools, locks and the per-job driver
//! - [`runtime`]: the public [`JobEngine`] facade
//! - [`queue`]: the [`JobQueuer`] background FIFO

pub(crate) mod core;
pub mod job;
pub mod queue;
pub mod runtime;
pub(crate) mod scheduler;

pub use job::{Job, JobCompletionListener, JobRequest, TaskChangeListener};
pub use queue::JobQueuer;
pub use runtime::{JobEngine, JobEngineBuilder, RECOVERY_REASON};
