//! Generation session bookkeeping.
//!
//! At most one generation runs at a time. [`SessionSlot::try_begin`] claims
//! the slot under a lock, so the "is anything running" check and the claim
//! happen together; dropping the returned [`Session`] frees the slot on every
//! exit path, including a panicking task.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

/// Shared cancellation flag for one session.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug)]
struct Active {
    id: u64,
    cancel: CancelFlag,
}

/// Holder for the single active session.
#[derive(Debug, Clone, Default)]
pub struct SessionSlot {
    active: Arc<Mutex<Option<Active>>>,
    next_id: Arc<AtomicU64>,
}

impl SessionSlot {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Option<Active>> {
        self.active.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Claim the slot, or `None` if a session is already active.
    pub fn try_begin(&self) -> Option<Session> {
        let mut active = self.lock();
        if active.is_some() {
            return None;
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let cancel = CancelFlag::new();
        *active = Some(Active {
            id,
            cancel: cancel.clone(),
        });

        Some(Session {
            id,
            cancel,
            slot: self.clone(),
        })
    }

    pub fn is_active(&self) -> bool {
        self.lock().is_some()
    }

    /// Raise the cancellation flag of the active session, if any.
    pub fn cancel_active(&self) -> bool {
        match self.lock().as_ref() {
            Some(active) => {
                active.cancel.cancel();
                true
            }
            None => false,
        }
    }

    fn release(&self, id: u64) {
        let mut active = self.lock();
        if active.as_ref().map(|a| a.id) == Some(id) {
            *active = None;
        }
    }
}

/// One in-flight generation. Frees its slot when dropped.
#[derive(Debug)]
pub struct Session {
    id: u64,
    cancel: CancelFlag,
    slot: SessionSlot,
}

impl Session {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn cancel_flag(&self) -> &CancelFlag {
        &self.cancel
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.slot.release(self.id);
    }
}
