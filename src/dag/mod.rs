// src/dag/mod.rs

//! Task graph model: guards, nodes, tasks and the graph container.

pub mod graph;
pub mod guard;
pub mod node;
pub mod task;

pub use graph::TaskGraph;
pub use guard::{GuardOutcome, GuardScope, TaskGuard};
pub use node::{NodeKind, TaskNode};
pub use task::{MetaTask, SlotValue, Task, TaskContext, TaskFuture, TaskKind};
