//! Offset estimation from raw samples.
//!
//! A sample is a pair of readings taken at (nominally) the same instant:
//! the reference clock and the local raw clock. Their difference is the
//! raw offset. The first sample always seeds the model; later samples
//! pass the jump filter and are then applied as a step or integrated.
//!
//! The raw offset includes the one-way bus latency; nothing here tries
//! to estimate or remove it.

use crate::error::SyncError;
use crate::types::{CorrectionMode, Offset, TimeUnit, Timestamp};

/// Tunables for a [`ClockModel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockModelConfig {
    /// Step or cumulative correction.
    pub mode: CorrectionMode,
    /// Largest accepted `|reference - local|` once seeded.
    pub max_acceptable_offset: u64,
    /// Whether the jump filter is active.
    pub validation_enabled: bool,
}

impl ClockModelConfig {
    /// Step correction with a ten second jump filter in `unit`.
    #[must_use]
    pub fn for_unit(unit: TimeUnit) -> Self {
        Self {
            mode: CorrectionMode::Step,
            max_acceptable_offset: unit.default_max_offset(),
            validation_enabled: true,
        }
    }

    /// Same settings with a different correction mode.
    #[must_use]
    pub fn with_mode(mut self, mode: CorrectionMode) -> Self {
        self.mode = mode;
        self
    }
}

impl Default for ClockModelConfig {
    fn default() -> Self {
        Self::for_unit(TimeUnit::Millisecond)
    }
}

/// What happened to a sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleVerdict {
    /// First sample; applied unconditionally.
    Seeded {
        /// New offset.
        offset: Offset,
    },
    /// Accepted and applied per the correction mode.
    Applied {
        /// New offset.
        offset: Offset,
        /// Sample's raw difference.
        raw_diff: Offset,
    },
    /// Discarded by the jump filter; the offset is unchanged.
    Rejected {
        /// Offset still in force.
        offset: Offset,
        /// Sample's raw difference.
        raw_diff: Offset,
    },
}

impl SampleVerdict {
    /// Offset in force after the sample was processed.
    #[must_use]
    pub fn offset(&self) -> Offset {
        match *self {
            Self::Seeded { offset }
            | Self::Applied { offset, .. }
            | Self::Rejected { offset, .. } => offset,
        }
    }

    /// Whether the jump filter discarded the sample.
    #[must_use]
    pub fn is_rejected(&self) -> bool {
        matches!(self, Self::Rejected { .. })
    }

    /// The offset in force, or the rejection as an error.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::ClockJumpRejected` carrying `limit` if the jump
    /// filter discarded the sample.
    pub fn into_result(self, limit: u64) -> Result<Offset, SyncError> {
        match self {
            Self::Rejected { raw_diff, .. } => {
                Err(SyncError::ClockJumpRejected { raw_diff, limit })
            }
            other => Ok(other.offset()),
        }
    }
}

/// Follower clock correction state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClockModel {
    current_offset: Offset,
    rounds_completed: u64,
    config: ClockModelConfig,
}

impl ClockModel {
    /// Create an unseeded model.
    #[must_use]
    pub fn new(config: ClockModelConfig) -> Self {
        Self {
            current_offset: 0,
            rounds_completed: 0,
            config,
        }
    }

    /// Fold one raw sample into the offset.
    ///
    /// Returns the verdict; its [`SampleVerdict::offset`] is the offset in
    /// force afterwards.
    pub fn apply_sample(&mut self, reference: Timestamp, local: Timestamp) -> SampleVerdict {
        let raw_diff = reference.diff(local);

        if self.rounds_completed == 0 {
            self.current_offset = raw_diff;
            self.rounds_completed = 1;
            tracing::debug!(offset = raw_diff, "clock model seeded");
            return SampleVerdict::Seeded { offset: raw_diff };
        }

        if self.config.validation_enabled
            && raw_diff.unsigned_abs() > self.config.max_acceptable_offset
        {
            tracing::warn!(
                raw_diff,
                limit = self.config.max_acceptable_offset,
                offset = self.current_offset,
                "rejecting implausible clock jump"
            );
            return SampleVerdict::Rejected {
                offset: self.current_offset,
                raw_diff,
            };
        }

        self.current_offset = match self.config.mode {
            CorrectionMode::Step => raw_diff,
            CorrectionMode::Cumulative => self.current_offset.saturating_add(raw_diff),
        };
        self.rounds_completed += 1;

        SampleVerdict::Applied {
            offset: self.current_offset,
            raw_diff,
        }
    }

    /// Take over an offset computed elsewhere, bypassing the jump filter.
    ///
    /// Used by the source to mirror offsets followers report about
    /// themselves; they have already been filtered at the follower.
    pub fn adopt_reported(&mut self, offset: Offset) {
        self.current_offset = offset;
        self.rounds_completed += 1;
    }

    /// Raw local time shifted onto the reference timeline.
    #[must_use]
    pub fn corrected_now(&self, raw_local: Timestamp) -> Timestamp {
        raw_local.offset_by(self.current_offset)
    }

    /// Forget all history; the next sample seeds again.
    pub fn reset(&mut self) {
        self.current_offset = 0;
        self.rounds_completed = 0;
    }

    /// Current offset estimate, reference minus local.
    #[must_use]
    pub fn current_offset(&self) -> Offset {
        self.current_offset
    }

    /// Number of applied samples.
    #[must_use]
    pub fn rounds_completed(&self) -> u64 {
        self.rounds_completed
    }

    /// Whether at least one sample has been applied.
    #[must_use]
    pub fn is_seeded(&self) -> bool {
        self.rounds_completed > 0
    }

    /// Correction mode.
    #[must_use]
    pub fn mode(&self) -> CorrectionMode {
        self.config.mode
    }

    /// Full configuration.
    #[must_use]
    pub fn config(&self) -> &ClockModelConfig {
        &self.config
    }
}

impl Default for ClockModel {
    fn default() -> Self {
        Self::new(ClockModelConfig::default())
    }
}
