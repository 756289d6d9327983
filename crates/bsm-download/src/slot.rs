//! One-download-at-a-time guard shared by both engines.
//!
//! `try_acquire` mints a lease for the new download. The lease is released
//! when its [`SlotLease`] is dropped, and only if it is still the active one,
//! so a finished task can never clear a newer download's state.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bsm_core::{AcquireError, AcquireResult};
use tokio_util::sync::CancellationToken;

/// Lease ID for tracking the active download.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct LeaseId(u64);

struct Active<P> {
    lease: LeaseId,
    cancel: CancellationToken,
    /// Engine-specific handle of the running download (e.g. the process).
    payload: Option<P>,
}

/// Holds at most one active download.
pub(crate) struct DownloadSlot<P> {
    active: Arc<Mutex<Option<Active<P>>>>,
    lease_counter: AtomicU64,
}

impl<P: Clone> DownloadSlot<P> {
    pub(crate) fn new() -> Self {
        Self {
            active: Arc::new(Mutex::new(None)),
            lease_counter: AtomicU64::new(1),
        }
    }

    /// Claim the slot, failing fast when a download is already active.
    pub(crate) fn try_acquire(&self) -> AcquireResult<SlotLease<P>> {
        let mut active = lock(&self.active);
        if active.is_some() {
            return Err(AcquireError::AlreadyDownloading);
        }

        let lease = LeaseId(self.lease_counter.fetch_add(1, Ordering::Relaxed));
        let cancel = CancellationToken::new();
        *active = Some(Active {
            lease,
            cancel: cancel.clone(),
            payload: None,
        });

        Ok(SlotLease {
            lease,
            cancel,
            active: Arc::clone(&self.active),
        })
    }

    /// Cancel the active download, if any.
    pub(crate) fn cancel(&self) {
        if let Some(active) = lock(&self.active).as_ref() {
            active.cancel.cancel();
        }
    }

    pub(crate) fn is_active(&self) -> bool {
        lock(&self.active).is_some()
    }

    /// Payload of the active download.
    pub(crate) fn payload(&self) -> Option<P> {
        lock(&self.active).as_ref().and_then(|a| a.payload.clone())
    }
}

/// Ownership of the slot for one download; releases it on drop.
pub(crate) struct SlotLease<P> {
    lease: LeaseId,
    cancel: CancellationToken,
    active: Arc<Mutex<Option<Active<P>>>>,
}

impl<P> SlotLease<P> {
    pub(crate) const fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Attach the engine handle so `payload()` can reach it.
    pub(crate) fn attach(&self, payload: P) {
        if let Some(active) = lock(&self.active).as_mut()
            && active.lease == self.lease
        {
            active.payload = Some(payload);
        }
    }
}

impl<P> Drop for SlotLease<P> {
    fn drop(&mut self) {
        let mut active = lock(&self.active);
        if active.as_ref().is_some_and(|a| a.lease == self.lease) {
            *active = None;
        } else {
            tracing::debug!(lease = ?self.lease, "Ignoring stale release (lease mismatch)");
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
