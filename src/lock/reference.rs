// src/lock/reference.rs

use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::types::LockMode;

/// Identifies a domain object a job must hold a lock on while it runs.
///
/// Equality and hashing only look at `(object_type, id)`; the display name
/// and the requested mode are carried along but do not change identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockObjectReference {
    pub object_type: String,
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub mode: LockMode,
}

/// Identity part of a [`LockObjectReference`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectKey {
    pub object_type: String,
    pub id: u64,
}

impl LockObjectReference {
    pub fn new(object_type: impl Into<String>, id: u64, name: impl Into<String>) -> Self {
        Self {
            object_type: object_type.into(),
            id,
            name: name.into(),
            mode: LockMode::Write,
        }
    }

    pub fn write(object_type: impl Into<String>, id: u64, name: impl Into<String>) -> Self {
        Self::new(object_type, id, name)
    }

    pub fn read(object_type: impl Into<String>, id: u64, name: impl Into<String>) -> Self {
        Self {
            mode: LockMode::Read,
            ..Self::new(object_type, id, name)
        }
    }

    pub fn key(&self) -> ObjectKey {
        ObjectKey {
            object_type: self.object_type.clone(),
            id: self.id,
        }
    }
}

impl PartialEq for LockObjectReference {
    fn eq(&self, other: &Self) -> bool {
        self.object_type == other.object_type && self.id == other.id
    }
}

impl Eq for LockObjectReference {}

impl Hash for LockObjectReference {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.object_type.hash(state);
        self.id.hash(state);
    }
}

impl fmt::Display for LockObjectReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{} ({})", self.object_type, self.id, self.name)
    }
}

/// Collapse a list of references to one entry per object.
///
/// When the same object is requested both for reading and writing, the write
/// request wins. First-seen order is preserved.
pub fn merge_references<I>(refs: I) -> Vec<LockObjectReference>
where
    I: IntoIterator<Item = LockObjectReference>,
{
    let mut merged: Vec<LockObjectReference> = Vec::new();
    for r in refs {
        match merged.iter_mut().find(|m| **m == r) {
            Some(existing) => {
                if r.mode == LockMode::Write {
                    existing.mode = LockMode::Write;
                }
            }
            None => merged.push(r),
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_ignores_name_and_mode() {
        let a = LockObjectReference::read("VirtualSystem", 7, "vs-a");
        let b = LockObjectReference::write("VirtualSystem", 7, "renamed");
        assert_eq!(a, b);
        assert_ne!(a, LockObjectReference::read("Appliance", 7, "vs-a"));
    }

    #[test]
    fn merge_upgrades_to_write() {
        let merged = merge_references(vec![
            LockObjectReference::read("DA", 1, "da"),
            LockObjectReference::read("VC", 2, "vc"),
            LockObjectReference::write("DA", 1, "da"),
        ]);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].object_type, "DA");
        assert_eq!(merged[0].mode, LockMode::Write);
        assert_eq!(merged[1].mode, LockMode::Read);
    }
}
