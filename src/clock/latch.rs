//! Edge-latched timestamp capture.
//!
//! The capturing side (an interrupt handler, or the simulated bus) calls
//! [`EdgeLatch::trigger`] with the time of the edge. The node's main loop
//! blocks in [`EdgeLatch::wait_for_trigger`]. A single permit carries the
//! hand-off: a second edge that arrives before the first value has been
//! read is dropped and counted, so every latched value is read exactly
//! once and never overwritten while pending.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use tokio::sync::Semaphore;

use crate::types::Timestamp;

/// Single-slot timestamp latch.
#[derive(Debug)]
pub struct EdgeLatch {
    latched: AtomicU64,
    pending: AtomicBool,
    permit: Semaphore,
    overruns: AtomicU64,
}

impl EdgeLatch {
    /// Create an empty latch.
    #[must_use]
    pub fn new() -> Self {
        Self {
            latched: AtomicU64::new(0),
            pending: AtomicBool::new(false),
            permit: Semaphore::new(0),
            overruns: AtomicU64::new(0),
        }
    }

    /// Capture `at` and wake the waiter.
    ///
    /// Safe to call from any thread. Returns `false` if the previous
    /// capture has not been consumed yet; that edge is lost.
    pub fn trigger(&self, at: Timestamp) -> bool {
        if self
            .pending
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            self.overruns.fetch_add(1, Ordering::Relaxed);
            return false;
        }
        self.latched.store(at.ticks(), Ordering::Release);
        self.permit.add_permits(1);
        true
    }

    /// Block until the next edge and return its capture time.
    pub async fn wait_for_trigger(&self) -> Timestamp {
        // The semaphore is never closed, so acquire only fails in theory.
        if let Ok(permit) = self.permit.acquire().await {
            permit.forget();
        }
        self.take()
    }

    /// Consume a pending capture without blocking.
    pub fn try_take(&self) -> Option<Timestamp> {
        let permit = self.permit.try_acquire().ok()?;
        permit.forget();
        Some(self.take())
    }

    /// Whether a capture is waiting to be read.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.pending.load(Ordering::Acquire)
    }

    /// Edges dropped because the previous capture was still pending.
    #[must_use]
    pub fn overruns(&self) -> u64 {
        self.overruns.load(Ordering::Relaxed)
    }

    fn take(&self) -> Timestamp {
        let ts = Timestamp::new(self.latched.load(Ordering::Acquire));
        self.pending.store(false, Ordering::Release);
        ts
    }
}

impl Default for EdgeLatch {
    fn default() -> Self {
        Self::new()
    }
}
