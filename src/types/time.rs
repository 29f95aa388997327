//! Timestamp, offset and time unit representation.
//!
//! Timestamps are plain unsigned counts since an arbitrary monotonic
//! epoch. The unit (milliseconds or microseconds) is fixed per session
//! and never encoded on the wire.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Signed clock offset, "reference minus local", in the session's time unit.
pub type Offset = i64;

/// Monotonic timestamp in the session's time unit.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Timestamp(u64);

impl Timestamp {
    /// Zero timestamp. Reserved on the wire for placeholder frames.
    pub const ZERO: Self = Self(0);

    /// Largest representable timestamp.
    pub const MAX: Self = Self(u64::MAX);

    /// Create a timestamp from a raw tick count.
    #[must_use]
    pub const fn new(ticks: u64) -> Self {
        Self(ticks)
    }

    /// Raw tick count.
    #[must_use]
    pub const fn ticks(self) -> u64 {
        self.0
    }

    /// Whether this is the reserved zero value.
    #[must_use]
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Signed difference `self - other`, saturating at the `i64` range.
    #[must_use]
    pub fn diff(self, other: Self) -> Offset {
        let wide = i128::from(self.0) - i128::from(other.0);
        Offset::try_from(wide).unwrap_or(if wide < 0 { Offset::MIN } else { Offset::MAX })
    }

    /// Shift by a signed offset, saturating at the `u64` range.
    #[must_use]
    pub const fn offset_by(self, offset: Offset) -> Self {
        Self(self.0.saturating_add_signed(offset))
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for Timestamp {
    fn from(ticks: u64) -> Self {
        Self(ticks)
    }
}

impl From<Timestamp> for u64 {
    fn from(ts: Timestamp) -> Self {
        ts.0
    }
}

impl std::ops::Sub for Timestamp {
    type Output = Offset;

    fn sub(self, rhs: Self) -> Self::Output {
        self.diff(rhs)
    }
}

/// Resolution of timestamps exchanged in a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    /// One tick per millisecond.
    #[default]
    Millisecond,
    /// One tick per microsecond.
    Microsecond,
}

impl TimeUnit {
    /// Ticks per second in this unit.
    #[must_use]
    pub const fn ticks_per_second(self) -> u64 {
        match self {
            Self::Millisecond => 1_000,
            Self::Microsecond => 1_000_000,
        }
    }

    /// Convert an elapsed duration to ticks, truncating and saturating.
    #[must_use]
    pub fn ticks_from_duration(self, d: Duration) -> u64 {
        let ticks = match self {
            Self::Millisecond => d.as_millis(),
            Self::Microsecond => d.as_micros(),
        };
        u64::try_from(ticks).unwrap_or(u64::MAX)
    }

    /// Convert a tick count to a duration.
    #[must_use]
    pub const fn duration_from_ticks(self, ticks: u64) -> Duration {
        match self {
            Self::Millisecond => Duration::from_millis(ticks),
            Self::Microsecond => Duration::from_micros(ticks),
        }
    }

    /// Default offset acceptance limit: ten seconds in this unit.
    #[must_use]
    pub const fn default_max_offset(self) -> u64 {
        10 * self.ticks_per_second()
    }
}

impl std::fmt::Display for TimeUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Millisecond => write!(f, "ms"),
            Self::Microsecond => write!(f, "us"),
        }
    }
}
