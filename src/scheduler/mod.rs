//! Source-side round scheduling.
//!
//! The [`Scheduler`] owns the bus and one [`FollowerRecord`] per select
//! line. It probes every line for a follower, then visits the present
//! ones in address order, one round at a time, pausing after each so the
//! follower can re-arm. Absent lines are re-probed every few cycles; a
//! follower that was once present stays in rotation regardless of
//! individual round failures.

mod record;
#[cfg(test)]
mod tests;

pub use record::FollowerRecord;

use tokio::sync::watch;

use crate::bus::{BusTransport, FollowerAddress};
use crate::clock::{Clock, ClockModelConfig};
use crate::error::{Result, SyncError};
use crate::events::{EventBus, SyncEvent};
use crate::protocol::{RoundOutcome, SyncSession, is_zero_frame, probe_frame_len};
use crate::types::{SyncConfig, check_clock_unit, report_identifier};

/// Result of one pass over the present followers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Addresses visited, in order.
    pub visited: Vec<FollowerAddress>,
    /// Rounds that ran to the end.
    pub completed: usize,
    /// Rounds abandoned on an error.
    pub failed: usize,
}

/// Scheduler statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    /// Cycles run so far
    pub cycles: u64,
    /// Followers currently in rotation
    pub present: usize,
    /// Rounds completed across all followers
    pub rounds_completed: u64,
    /// Rounds abandoned across all followers
    pub failures: u64,
    /// Rounds flagged as out of step
    pub desyncs: u64,
}

/// Drives rounds against every follower on one bus.
pub struct Scheduler<T, C> {
    transport: T,
    clock: C,
    config: SyncConfig,
    records: Vec<FollowerRecord>,
    session: SyncSession,
    events: EventBus,
    cycles: u64,
}

impl<T: BusTransport, C: Clock> Scheduler<T, C> {
    /// Create a scheduler over `transport` using `clock` as the reference.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::Config` if the configuration does not validate
    /// or `clock` counts in a different unit than `config.time_unit`.
    pub fn new(transport: T, clock: C, config: SyncConfig) -> Result<Self> {
        config.validate()?;
        check_clock_unit(config.time_unit, clock.unit())?;

        let model = ClockModelConfig {
            mode: config.correction_mode,
            max_acceptable_offset: config.max_acceptable_offset(),
            validation_enabled: config.validation_enabled,
        };
        let records = (0..config.follower_count)
            .filter_map(|i| FollowerAddress::try_from(i).ok())
            .map(|address| FollowerRecord::new(address, model))
            .collect();
        let session = SyncSession::new(config.protocol_variant, config.inter_exchange_delay);

        Ok(Self {
            transport,
            clock,
            config,
            records,
            session,
            events: EventBus::new(),
            cycles: 0,
        })
    }

    /// Publish events on an existing bus instead of a private one.
    #[must_use]
    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = events;
        self
    }

    /// Event bus this scheduler publishes on.
    #[must_use]
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Configuration in force.
    #[must_use]
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// All follower records, in address order.
    #[must_use]
    pub fn records(&self) -> &[FollowerRecord] {
        &self.records
    }

    /// Record for one follower.
    #[must_use]
    pub fn record(&self, address: FollowerAddress) -> Option<&FollowerRecord> {
        self.records.get(usize::from(address))
    }

    /// The underlying transport.
    #[must_use]
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// The underlying transport, mutably.
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Give back the transport.
    pub fn into_transport(self) -> T {
        self.transport
    }

    /// Cycles run so far.
    #[must_use]
    pub fn cycles_completed(&self) -> u64 {
        self.cycles
    }

    /// Totals across all followers.
    #[must_use]
    pub fn stats(&self) -> SchedulerStats {
        self.records.iter().fold(
            SchedulerStats {
                cycles: self.cycles,
                ..SchedulerStats::default()
            },
            |mut stats, record| {
                stats.present += usize::from(record.is_present());
                stats.rounds_completed += record.rounds_completed();
                stats.failures += record.failures();
                stats.desyncs += record.desyncs();
                stats
            },
        )
    }

    /// Probe one line and record whether a follower answered.
    ///
    /// A placeholder frame is sent; any non-zero byte in the reply means a
    /// follower is there. A failed exchange counts as absent.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::InvalidAddress` if `address` is past the
    /// configured follower count.
    pub async fn probe(&mut self, address: FollowerAddress) -> Result<bool> {
        self.check_address(address)?;

        let len = probe_frame_len(self.config.protocol_variant);
        let tx = vec![0u8; len];
        let mut rx = vec![0u8; len];
        let present = match self.transport.exchange(address, &tx, &mut rx).await {
            Ok(()) => !is_zero_frame(&rx),
            Err(e) => {
                tracing::debug!(address, error = %e, "probe failed");
                false
            }
        };

        if let Some(record) = self.records.get_mut(usize::from(address)) {
            record.mark_present(present);
        }
        if present {
            tracing::info!(address, "follower present");
            self.events.emit(SyncEvent::FollowerDiscovered { address });
        } else {
            tracing::debug!(address, "follower absent");
            self.events.emit(SyncEvent::FollowerAbsent { address });
        }
        Ok(present)
    }

    /// Probe every line. Returns the addresses found present.
    pub async fn probe_all(&mut self) -> Vec<FollowerAddress> {
        let addresses: Vec<_> = self.records.iter().map(FollowerRecord::address).collect();
        self.probe_each(addresses).await
    }

    /// Probe only the lines currently marked absent.
    ///
    /// Returns the addresses that joined the rotation.
    pub async fn reprobe_absent(&mut self) -> Vec<FollowerAddress> {
        let absent: Vec<_> = self
            .records
            .iter()
            .filter(|r| !r.is_present())
            .map(FollowerRecord::address)
            .collect();
        if absent.is_empty() {
            return absent;
        }
        tracing::debug!(?absent, "re-probing absent followers");
        self.probe_each(absent).await
    }

    async fn probe_each(&mut self, addresses: Vec<FollowerAddress>) -> Vec<FollowerAddress> {
        let mut found = Vec::new();
        for address in addresses {
            if let Ok(true) = self.probe(address).await {
                found.push(address);
            }
            self.pause(self.config.inter_session_delay).await;
        }
        found
    }

    /// Run one round against `address`, whether or not it is in rotation.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::InvalidAddress` for an address past the follower
    /// count, or the round's error if it was abandoned.
    pub async fn sync_follower(&mut self, address: FollowerAddress) -> Result<RoundOutcome> {
        self.check_address(address)?;

        let result = self
            .session
            .run_round(
                &mut self.transport,
                address,
                report_identifier(address),
                &self.clock,
            )
            .await;

        let Some(record) = self.records.get_mut(usize::from(address)) else {
            return result;
        };

        let outcome = match result {
            Ok(outcome) => outcome,
            Err(e) => {
                record.record_failure();
                self.events.emit(SyncEvent::RoundAbandoned {
                    address,
                    error: e.to_string(),
                });
                return Err(e);
            }
        };

        let verdict = record.commit(&outcome);
        let offset = record.current_offset();
        let rounds_completed = record.rounds_completed();

        let limit = self.config.max_acceptable_offset();
        let rejected = verdict
            .map(|v| v.into_result(limit))
            .and_then(std::result::Result::err);

        if let Some(reason) = outcome.desync {
            tracing::warn!(address, error = %SyncError::from(reason), "round flagged");
            self.events
                .emit(SyncEvent::ProtocolDesync { address, reason });
        } else if let Some(SyncError::ClockJumpRejected { raw_diff, limit }) = rejected {
            self.events.emit(SyncEvent::ClockJumpRejected {
                address,
                raw_diff,
                limit,
                offset,
            });
        } else {
            tracing::debug!(
                address,
                variant = %self.config.protocol_variant,
                offset,
                rounds_completed,
                "round completed"
            );
            self.events.emit(SyncEvent::RoundCompleted {
                address,
                offset,
                rounds_completed,
            });
        }

        Ok(outcome)
    }

    /// Visit every present follower once, in address order.
    ///
    /// Failed rounds are logged and skipped; the cycle always reaches the
    /// end of the rotation.
    pub async fn run_cycle(&mut self) -> CycleReport {
        let rotation: Vec<_> = self
            .records
            .iter()
            .filter(|r| r.is_present())
            .map(FollowerRecord::address)
            .collect();

        let mut report = CycleReport::default();
        for address in rotation {
            report.visited.push(address);
            match self.sync_follower(address).await {
                Ok(_) => report.completed += 1,
                Err(SyncError::ReservedTimestamp) => {
                    tracing::debug!(address, "reference clock reads zero, round skipped");
                    report.failed += 1;
                }
                Err(e) => {
                    tracing::warn!(address, error = %e, "round abandoned");
                    report.failed += 1;
                    self.pause(self.config.retry_backoff).await;
                }
            }
            self.pause(self.config.inter_session_delay).await;
        }

        self.cycles += 1;
        tracing::debug!(
            cycle = self.cycles,
            completed = report.completed,
            failed = report.failed,
            "cycle completed"
        );
        self.events.emit(SyncEvent::CycleCompleted {
            cycle: self.cycles,
            completed: report.completed,
            failed: report.failed,
        });
        report
    }

    /// Run cycles until `shutdown` turns `true` or its sender goes away.
    ///
    /// Every select line is checked for readiness before the first probe.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::BusNotReady` if a readiness check fails. Round
    /// failures are never returned.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        for address in self.records.iter().map(FollowerRecord::address) {
            self.transport
                .ready(address)
                .await
                .map_err(SyncError::BusNotReady)?;
        }
        tracing::info!(
            followers = self.records.len(),
            variant = %self.config.protocol_variant,
            "bus ready, starting scheduler"
        );

        let present = self.probe_all().await;
        tracing::info!(?present, "initial probe finished");

        let reprobe_every = u64::from(self.config.reprobe_every_n_cycles.max(1));
        loop {
            if *shutdown.borrow() {
                break;
            }

            self.run_cycle().await;
            if self.cycles % reprobe_every == 0 {
                let joined = self.reprobe_absent().await;
                if !joined.is_empty() {
                    tracing::info!(?joined, "followers joined the rotation");
                }
            }

            tokio::select! {
                () = tokio::time::sleep(self.config.inter_cycle_delay) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        tracing::info!(cycles = self.cycles, "scheduler shutting down");
        Ok(())
    }

    fn check_address(&self, address: FollowerAddress) -> Result<()> {
        if usize::from(address) >= self.records.len() {
            return Err(SyncError::InvalidAddress {
                address,
                follower_count: self.config.follower_count,
            });
        }
        Ok(())
    }

    async fn pause(&self, delay: std::time::Duration) {
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}

impl<T, C> std::fmt::Debug for Scheduler<T, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("variant", &self.config.protocol_variant)
            .field("followers", &self.records.len())
            .field("cycles", &self.cycles)
            .finish_non_exhaustive()
    }
}
