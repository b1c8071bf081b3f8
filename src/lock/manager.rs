// src/lock/manager.rs

//! Object-scoped job serialization.
//!
//! Each domain object gets a [`ReadWriteLockRecord`] with a FIFO wait queue.
//! A job either takes all of its objects at once (`try_acquire_all`) or, when
//! any of them is contended, queues for them one by one in the order they were
//! declared.
//!
//! This is coarse mutual exclusion, not a deadlock-free multi-lock protocol:
//! two jobs that declare the same two objects in opposite orders can each end
//! up holding one object while queued on the other. Callers must declare lock
//! sets in a consistent order.

use std::collections::HashMap;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::{debug, trace, warn};

use crate::lock::record::{ReadWriteLockRecord, Waiter};
use crate::lock::reference::{LockObjectReference, ObjectKey};
use crate::types::{JobId, LockMode};

#[derive(Default)]
pub struct LockManager {
    records: Mutex<HashMap<ObjectKey, ReadWriteLockRecord>>,
}

impl LockManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take every lock in `refs` for `owner`, or none of them.
    ///
    /// Fails if any object is held in a conflicting mode or already has
    /// waiters queued on it.
    pub fn try_acquire_all(&self, owner: JobId, refs: &[LockObjectReference]) -> bool {
        let mut records = self.records.lock();

        let available = refs.iter().all(|r| {
            records
                .get(&r.key())
                .map(|rec| rec.is_available(r.mode))
                .unwrap_or(true)
        });
        if !available {
            return false;
        }

        for r in refs {
            records.entry(r.key()).or_default().grant(owner, r.mode);
        }
        trace!(job = %owner, count = refs.len(), "acquired all object locks");
        true
    }

    /// Wait until `owner` holds `reference` in the requested mode.
    pub async fn acquire(&self, owner: JobId, reference: &LockObjectReference) {
        let rx = {
            let mut records = self.records.lock();
            let rec = records.entry(reference.key()).or_default();
            if rec.is_available(reference.mode) {
                rec.grant(owner, reference.mode);
                return;
            }
            let (tx, rx) = oneshot::channel();
            rec.enqueue(Waiter {
                owner,
                mode: reference.mode,
                tx,
            });
            rx
        };

        debug!(job = %owner, object = %reference, "waiting for object lock");
        if rx.await.is_err() {
            warn!(job = %owner, object = %reference, "lock waiter dropped without a grant");
        }
    }

    /// Acquire every reference, queuing on contended objects in declaration
    /// order.
    pub async fn acquire_all(&self, owner: JobId, refs: &[LockObjectReference]) {
        if refs.is_empty() || self.try_acquire_all(owner, refs) {
            return;
        }
        for r in refs {
            self.acquire(owner, r).await;
        }
        debug!(job = %owner, count = refs.len(), "acquired contended object locks");
    }

    /// Release every lock held by `owner` and drop its queued requests.
    pub fn release_all(&self, owner: JobId) {
        let mut records = self.records.lock();
        let mut released = 0usize;
        for rec in records.values_mut() {
            rec.remove_waiters(owner);
            if rec.release(owner) {
                released += 1;
            }
            // A removed waiter may have been holding back the ones behind it.
            for next in rec.promote() {
                trace!(job = %next, "object lock handed over");
            }
        }
        records.retain(|_, rec| !rec.is_idle());
        trace!(job = %owner, released, "released object locks");
    }

    /// Release a single object. Releasing something not held is logged and
    /// ignored.
    pub fn release(&self, owner: JobId, reference: &LockObjectReference) {
        let mut records = self.records.lock();
        let key = reference.key();
        let Some(rec) = records.get_mut(&key) else {
            warn!(job = %owner, object = %reference, "release of unknown object lock ignored");
            return;
        };
        if !rec.release(owner) {
            warn!(job = %owner, object = %reference, "release of unheld object lock ignored");
            return;
        }
        rec.promote();
        if rec.is_idle() {
            records.remove(&key);
        }
    }

    pub fn holders(&self, reference: &LockObjectReference) -> Vec<JobId> {
        self.records
            .lock()
            .get(&reference.key())
            .map(|rec| rec.holders())
            .unwrap_or_default()
    }

    pub fn waiting(&self, reference: &LockObjectReference) -> usize {
        self.records
            .lock()
            .get(&reference.key())
            .map(|rec| rec.waiting())
            .unwrap_or(0)
    }

    pub fn is_locked(&self, reference: &LockObjectReference) -> bool {
        self.records
            .lock()
            .get(&reference.key())
            .map(|rec| rec.is_held())
            .unwrap_or(false)
    }

    /// Whether `mode` on `reference` could be taken right now.
    pub fn is_available(&self, reference: &LockObjectReference, mode: LockMode) -> bool {
        self.records
            .lock()
            .get(&reference.key())
            .map(|rec| rec.is_available(mode))
            .unwrap_or(true)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;

    fn vs(id: u64) -> LockObjectReference {
        LockObjectReference::write("VirtualSystem", id, format!("vs-{id}"))
    }

    #[test]
    fn try_acquire_all_is_all_or_nothing() {
        let mgr = LockManager::new();
        let a = JobId::new();
        let b = JobId::new();

        assert!(mgr.try_acquire_all(a, &[vs(1)]));
        assert!(!mgr.try_acquire_all(b, &[vs(2), vs(1)]));
        assert!(!mgr.is_locked(&vs(2)));

        mgr.release_all(a);
        assert!(mgr.try_acquire_all(b, &[vs(2), vs(1)]));
    }

    #[test]
    fn readers_share_an_object() {
        let mgr = LockManager::new();
        let r = LockObjectReference::read("Appliance", 3, "app");
        assert!(mgr.try_acquire_all(JobId::new(), &[r.clone()]));
        assert!(mgr.try_acquire_all(JobId::new(), &[r.clone()]));
        assert_eq!(mgr.holders(&r).len(), 2);
        assert!(!mgr.is_available(&r, LockMode::Write));
    }

    #[test]
    fn releasing_unheld_lock_is_ignored() {
        let mgr = LockManager::new();
        mgr.release(JobId::new(), &vs(9));
        assert!(!mgr.is_locked(&vs(9)));
    }

    #[tokio::test]
    async fn waiter_is_granted_on_release() {
        let mgr = Arc::new(LockManager::new());
        let first = JobId::new();
        let second = JobId::new();
        mgr.acquire_all(first, &[vs(1)]).await;

        let m = Arc::clone(&mgr);
        let waiter = tokio::spawn(async move { m.acquire_all(second, &[vs(1)]).await });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(mgr.waiting(&vs(1)), 1);
        assert!(!waiter.is_finished());

        mgr.release_all(first);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter not granted")
            .expect("waiter panicked");
        assert_eq!(mgr.holders(&vs(1)), vec![second]);
    }
}
