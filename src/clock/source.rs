//! Raw clock sources.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::time::Instant;

use crate::types::{TimeUnit, Timestamp};

/// A node's raw, uncorrected clock.
pub trait Clock: Send + Sync {
    /// Current raw time. Never decreases.
    fn now(&self) -> Timestamp;

    /// Unit the timestamps are counted in.
    fn unit(&self) -> TimeUnit;
}

impl<C: Clock + ?Sized> Clock for Arc<C> {
    fn now(&self) -> Timestamp {
        (**self).now()
    }

    fn unit(&self) -> TimeUnit {
        (**self).unit()
    }
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now(&self) -> Timestamp {
        (**self).now()
    }

    fn unit(&self) -> TimeUnit {
        (**self).unit()
    }
}

/// Uptime-style clock backed by the runtime's monotonic [`Instant`].
///
/// Follows the runtime's paused time in tests.
#[derive(Debug, Clone)]
pub struct MonotonicClock {
    origin: Instant,
    base: u64,
    unit: TimeUnit,
}

impl MonotonicClock {
    /// Start a clock at zero now.
    #[must_use]
    pub fn new(unit: TimeUnit) -> Self {
        Self::starting_at(unit, Timestamp::ZERO)
    }

    /// Start a clock reading `base` now.
    #[must_use]
    pub fn starting_at(unit: TimeUnit, base: Timestamp) -> Self {
        Self {
            origin: Instant::now(),
            base: base.ticks(),
            unit,
        }
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> Timestamp {
        let elapsed = self.unit.ticks_from_duration(self.origin.elapsed());
        Timestamp::new(self.base.saturating_add(elapsed))
    }

    fn unit(&self) -> TimeUnit {
        self.unit
    }
}

/// Hand-driven clock for tests and simulations.
///
/// Clones share the same time.
#[derive(Debug, Clone)]
pub struct ManualClock {
    ticks: Arc<AtomicU64>,
    unit: TimeUnit,
}

impl ManualClock {
    /// Create a clock reading `start`.
    #[must_use]
    pub fn new(unit: TimeUnit, start: Timestamp) -> Self {
        Self {
            ticks: Arc::new(AtomicU64::new(start.ticks())),
            unit,
        }
    }

    /// Jump to `ts`. Ignored if it would move the clock backwards.
    pub fn set(&self, ts: Timestamp) {
        self.ticks.fetch_max(ts.ticks(), Ordering::SeqCst);
    }

    /// Move forward by `ticks`.
    pub fn advance(&self, ticks: u64) {
        let _ = self
            .ticks
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |t| {
                Some(t.saturating_add(ticks))
            });
    }

    /// Move forward by a duration, truncated to the clock's unit.
    pub fn advance_by(&self, d: Duration) {
        self.advance(self.unit.ticks_from_duration(d));
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        Timestamp::new(self.ticks.load(Ordering::SeqCst))
    }

    fn unit(&self) -> TimeUnit {
        self.unit
    }
}
