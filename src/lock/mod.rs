// src/lock/mod.rs

//! Object locks that keep conflicting jobs from running at the same time.

pub mod manager;
pub mod record;
pub mod reference;

pub use manager::LockManager;
pub use record::ReadWriteLockRecord;
pub use reference::{LockObjectReference, ObjectKey, merge_references};
