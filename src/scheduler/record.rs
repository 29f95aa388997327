//! Per-follower bookkeeping kept by the source.

use crate::bus::FollowerAddress;
use crate::clock::{ClockModel, ClockModelConfig, SampleVerdict};
use crate::protocol::{Report, RoundOutcome};
use crate::types::{CorrectionMode, Offset};

/// What the source knows about one follower.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FollowerRecord {
    address: FollowerAddress,
    present: bool,
    estimate: ClockModel,
    rounds_completed: u64,
    last_report: Option<Report>,
    failures: u64,
    desyncs: u64,
}

impl FollowerRecord {
    /// Create a record for a follower not yet probed.
    #[must_use]
    pub fn new(address: FollowerAddress, model: ClockModelConfig) -> Self {
        Self {
            address,
            present: false,
            estimate: ClockModel::new(model),
            rounds_completed: 0,
            last_report: None,
            failures: 0,
            desyncs: 0,
        }
    }

    /// Select line of the follower.
    #[must_use]
    pub fn address(&self) -> FollowerAddress {
        self.address
    }

    /// Whether the follower answered a presence probe.
    #[must_use]
    pub fn is_present(&self) -> bool {
        self.present
    }

    /// Source-side view of the follower's offset.
    ///
    /// Full handshake rounds feed the source's own samples into this model;
    /// round-trip rounds adopt the offset the follower reports.
    #[must_use]
    pub fn estimate(&self) -> &ClockModel {
        &self.estimate
    }

    /// Shorthand for the estimate's current offset.
    #[must_use]
    pub fn current_offset(&self) -> Offset {
        self.estimate.current_offset()
    }

    /// Correction mode of the estimate.
    #[must_use]
    pub fn correction_mode(&self) -> CorrectionMode {
        self.estimate.mode()
    }

    /// Rounds that ran to the end, including rejected and desynced ones.
    #[must_use]
    pub fn rounds_completed(&self) -> u64 {
        self.rounds_completed
    }

    /// Most recent report read back from the follower.
    #[must_use]
    pub fn last_report(&self) -> Option<&Report> {
        self.last_report.as_ref()
    }

    /// Rounds abandoned on an error.
    #[must_use]
    pub fn failures(&self) -> u64 {
        self.failures
    }

    /// Rounds whose reply did not fit the protocol.
    #[must_use]
    pub fn desyncs(&self) -> u64 {
        self.desyncs
    }

    pub(crate) fn mark_present(&mut self, present: bool) {
        self.present = present;
    }

    pub(crate) fn record_failure(&mut self) {
        self.failures += 1;
    }

    /// Fold a finished round into the record.
    ///
    /// Returns the verdict when the round carried a sample for the estimate.
    pub(crate) fn commit(&mut self, outcome: &RoundOutcome) -> Option<SampleVerdict> {
        self.rounds_completed += 1;

        if outcome.desync.is_some() {
            self.desyncs += 1;
            return None;
        }

        if let Some(report) = outcome.report {
            self.estimate.adopt_reported(report.offset);
            self.last_report = Some(report);
            return None;
        }

        outcome
            .sample
            .map(|sample| self.estimate.apply_sample(sample.reference, sample.local))
    }
}
