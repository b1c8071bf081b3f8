// src/lock/record.rs

//! Per-object read/write lock bookkeeping.
//!
//! A record tracks who currently holds the object and a strict FIFO queue of
//! waiting owners. It is plain data; [`crate::lock::LockManager`] guards it
//! with a mutex.

use std::collections::{HashSet, VecDeque};

use tokio::sync::oneshot;

use crate::types::{JobId, LockMode};

pub(crate) struct Waiter {
    pub owner: JobId,
    pub mode: LockMode,
    pub tx: oneshot::Sender<()>,
}

#[derive(Default)]
pub struct ReadWriteLockRecord {
    readers: HashSet<JobId>,
    writer: Option<JobId>,
    waiters: VecDeque<Waiter>,
}

impl ReadWriteLockRecord {
    /// Whether `mode` could be granted right now, ignoring queued waiters.
    pub fn can_grant(&self, mode: LockMode) -> bool {
        match mode {
            LockMode::Read => self.writer.is_none(),
            LockMode::Write => self.writer.is_none() && self.readers.is_empty(),
        }
    }

    /// Whether a newcomer may take the lock without jumping the queue.
    pub fn is_available(&self, mode: LockMode) -> bool {
        self.waiters.is_empty() && self.can_grant(mode)
    }

    pub fn grant(&mut self, owner: JobId, mode: LockMode) {
        match mode {
            LockMode::Read => {
                self.readers.insert(owner);
            }
            LockMode::Write => self.writer = Some(owner),
        }
    }

    /// Drop whatever `owner` holds. Returns `false` if it held nothing.
    pub fn release(&mut self, owner: JobId) -> bool {
        if self.writer == Some(owner) {
            self.writer = None;
            return true;
        }
        self.readers.remove(&owner)
    }

    pub(crate) fn enqueue(&mut self, waiter: Waiter) {
        self.waiters.push_back(waiter);
    }

    /// Forget queued requests from `owner` (used when a job gives up waiting).
    pub fn remove_waiters(&mut self, owner: JobId) {
        self.waiters.retain(|w| w.owner != owner);
    }

    /// Hand the lock to queued waiters in arrival order.
    ///
    /// Stops at the first waiter that cannot be granted, so a queued writer
    /// holds back every reader behind it. Returns the owners that were woken.
    pub fn promote(&mut self) -> Vec<JobId> {
        let mut woken = Vec::new();
        while let Some(head) = self.waiters.front() {
            if !self.can_grant(head.mode) {
                break;
            }
            let Some(waiter) = self.waiters.pop_front() else {
                break;
            };
            self.grant(waiter.owner, waiter.mode);
            if waiter.tx.send(()).is_err() {
                // Waiter went away; undo the grant and keep going.
                self.release(waiter.owner);
                continue;
            }
            woken.push(waiter.owner);
        }
        woken
    }

    pub fn holders(&self) -> Vec<JobId> {
        let mut out: Vec<JobId> = self.writer.iter().copied().collect();
        out.extend(self.readers.iter().copied());
        out
    }

    pub fn waiting(&self) -> usize {
        self.waiters.len()
    }

    pub fn is_held(&self) -> bool {
        self.writer.is_some() || !self.readers.is_empty()
    }

    pub fn is_idle(&self) -> bool {
        !self.is_held() && self.waiters.is_empty()
    }
}
