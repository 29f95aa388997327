//! Per-round protocol state machine.
//!
//! One state enum drives both ends of the bus. The source walks it while
//! clocking exchanges ([`SyncSession`]); the follower walks the same
//! states while answering them ([`FollowerSession`]).
//!
//! ```text
//! Source                                  Follower
//!   |== ts1 ==============================>|  records local1 (or latched edge)
//!   |<= childTs ===========================|  childTs = raw clock when armed
//!   |   arrival = now                      |
//!   |== ts2 = arrival ====================>|
//!   |<= 0xAC ==============================|  round complete
//! ```
//!
//! Broadcast and round-trip rounds are the first exchange only; in
//! round-trip the follower's reply is its report about the previous round.

use std::time::Duration;

use super::codec::{
    ACK_FRAME_LEN, ACK_MARKER, FrameDump, REPORT_FRAME_LEN, Report, TIMESTAMP_FRAME_LEN,
    ZERO_FRAME, decode_timestamp, decode_timestamp_prefix, encode_padded, encode_timestamp,
    is_zero_frame,
};
use crate::bus::{BusTransport, FollowerAddress, FollowerPort};
use crate::clock::{Clock, ClockModel, EdgeLatch};
use crate::error::{DesyncReason, SyncError};
use crate::types::{ProtocolVariant, Timestamp};

/// Position within a round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SessionState {
    /// No round in progress.
    #[default]
    Idle,
    /// First exchange: the reference timestamp travels to the follower.
    AwaitInitialTimestamp,
    /// Second exchange: the follower's own timestamp travels back.
    RespondWithLocalTimestamp,
    /// Third exchange: the source's arrival time travels to the follower.
    AwaitFinalTimestamp,
    /// Fourth exchange: the follower acknowledges.
    SendAck,
}

impl SessionState {
    /// State after completing an exchange in this state.
    #[must_use]
    pub const fn next(self, variant: ProtocolVariant) -> Self {
        match (variant, self) {
            (_, Self::Idle) => Self::AwaitInitialTimestamp,
            (ProtocolVariant::FullHandshake, Self::AwaitInitialTimestamp) => {
                Self::RespondWithLocalTimestamp
            }
            (ProtocolVariant::FullHandshake, Self::RespondWithLocalTimestamp) => {
                Self::AwaitFinalTimestamp
            }
            (ProtocolVariant::FullHandshake, Self::AwaitFinalTimestamp) => Self::SendAck,
            _ => Self::Idle,
        }
    }

    /// Frame length of the exchange made in this state.
    #[must_use]
    pub const fn frame_len(self, variant: ProtocolVariant) -> usize {
        match (variant, self) {
            (ProtocolVariant::RoundTrip, _) => REPORT_FRAME_LEN,
            (ProtocolVariant::FullHandshake, Self::SendAck) => ACK_FRAME_LEN,
            _ => TIMESTAMP_FRAME_LEN,
        }
    }
}

/// Frame length used to probe a follower for presence.
#[must_use]
pub const fn probe_frame_len(variant: ProtocolVariant) -> usize {
    SessionState::AwaitInitialTimestamp.frame_len(variant)
}

/// One raw (reference, local) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncSample {
    /// Reference clock reading.
    pub reference: Timestamp,
    /// Local raw clock reading at the same instant.
    pub local: Timestamp,
    /// Round-trip bus delay measured alongside, if the variant allows it.
    ///
    /// Diagnostic only; it is not subtracted from the offset.
    pub round_trip: Option<u64>,
}

impl SyncSample {
    /// Reference minus local.
    #[must_use]
    pub fn raw_diff(&self) -> i64 {
        self.reference.diff(self.local)
    }
}

/// What the source learned from one completed round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundOutcome {
    /// Follower the round ran against.
    pub address: FollowerAddress,
    /// Variant that ran.
    pub variant: ProtocolVariant,
    /// Reference timestamp sent in the first exchange.
    pub reference_sent: Timestamp,
    /// Sample observable at the source (full handshake only).
    pub sample: Option<SyncSample>,
    /// Report read back (round-trip only).
    pub report: Option<Report>,
    /// Set when the reply did not match the protocol.
    pub desync: Option<DesyncReason>,
}

/// Source side of a round.
#[derive(Debug, Clone)]
pub struct SyncSession {
    variant: ProtocolVariant,
    inter_exchange_delay: Duration,
    state: SessionState,
}

impl SyncSession {
    /// Create an idle session.
    #[must_use]
    pub fn new(variant: ProtocolVariant, inter_exchange_delay: Duration) -> Self {
        Self {
            variant,
            inter_exchange_delay,
            state: SessionState::Idle,
        }
    }

    /// Variant this session runs.
    #[must_use]
    pub fn variant(&self) -> ProtocolVariant {
        self.variant
    }

    /// Current state; `Idle` between rounds.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Run one complete round against `address`.
    ///
    /// `expected_identifier` is checked against round-trip reports. On any
    /// error the round is abandoned and the session returns to `Idle`.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::Transport` if an exchange fails and
    /// `SyncError::ReservedTimestamp` if the reference clock reads zero.
    pub async fn run_round<T, C>(
        &mut self,
        transport: &mut T,
        address: FollowerAddress,
        expected_identifier: u32,
        clock: &C,
    ) -> Result<RoundOutcome, SyncError>
    where
        T: BusTransport + ?Sized,
        C: Clock + ?Sized,
    {
        let result = self
            .drive(transport, address, expected_identifier, clock)
            .await;
        if let Err(ref e) = result {
            tracing::debug!(
                address,
                state = ?self.state,
                error = %e,
                "round abandoned"
            );
        }
        self.state = SessionState::Idle;
        result
    }

    async fn drive<T, C>(
        &mut self,
        transport: &mut T,
        address: FollowerAddress,
        expected_identifier: u32,
        clock: &C,
    ) -> Result<RoundOutcome, SyncError>
    where
        T: BusTransport + ?Sized,
        C: Clock + ?Sized,
    {
        let reference = clock.now();
        if reference.is_zero() {
            return Err(SyncError::ReservedTimestamp);
        }

        let mut outcome = RoundOutcome {
            address,
            variant: self.variant,
            reference_sent: reference,
            sample: None,
            report: None,
            desync: None,
        };

        match self.variant {
            ProtocolVariant::Broadcast => {
                let mut rx = [0u8; TIMESTAMP_FRAME_LEN];
                self.exchange(transport, address, &encode_timestamp(reference), &mut rx)
                    .await?;
            }
            ProtocolVariant::RoundTrip => {
                let mut tx = [0u8; REPORT_FRAME_LEN];
                encode_padded(reference, &mut tx)?;
                let mut rx = [0u8; REPORT_FRAME_LEN];
                self.exchange(transport, address, &tx, &mut rx).await?;

                let report = Report::decode(&rx);
                if report.identifier != expected_identifier {
                    outcome.desync = Some(DesyncReason::ReportIdentifier {
                        expected: expected_identifier,
                        actual: report.identifier,
                    });
                }
                outcome.report = Some(report);
            }
            ProtocolVariant::FullHandshake => {
                let mut scratch = [0u8; TIMESTAMP_FRAME_LEN];
                self.exchange(transport, address, &encode_timestamp(reference), &mut scratch)
                    .await?;
                self.pause().await;

                let mut child = [0u8; TIMESTAMP_FRAME_LEN];
                self.exchange(transport, address, &ZERO_FRAME, &mut child)
                    .await?;
                let arrival = clock.now();
                self.pause().await;

                self.exchange(transport, address, &encode_timestamp(arrival), &mut scratch)
                    .await?;
                self.pause().await;

                let mut ack = [0u8; ACK_FRAME_LEN];
                self.exchange(transport, address, &[0u8; ACK_FRAME_LEN], &mut ack)
                    .await?;

                if ack[0] == ACK_MARKER {
                    outcome.sample = Some(SyncSample {
                        reference: arrival,
                        local: decode_timestamp(&child),
                        round_trip: None,
                    });
                } else {
                    outcome.desync = Some(DesyncReason::AckMismatch {
                        expected: ACK_MARKER,
                        actual: ack[0],
                    });
                }
            }
        }

        Ok(outcome)
    }

    async fn exchange<T>(
        &mut self,
        transport: &mut T,
        address: FollowerAddress,
        tx: &[u8],
        rx: &mut [u8],
    ) -> Result<(), SyncError>
    where
        T: BusTransport + ?Sized,
    {
        self.state = self.state.next(self.variant);
        tracing::trace!(address, state = ?self.state, len = tx.len(), "exchange");
        transport.exchange(address, tx, rx).await?;
        Ok(())
    }

    async fn pause(&self) {
        if !self.inter_exchange_delay.is_zero() {
            tokio::time::sleep(self.inter_exchange_delay).await;
        }
    }
}

/// Result of one follower-side exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowerStep {
    /// Placeholder frame (probe); nothing to do.
    Ignored,
    /// Mid-handshake exchange done.
    Advanced,
    /// Round finished with a sample to apply.
    Completed(SyncSample),
    /// The source's frame did not fit the current state; the round was dropped.
    Desync(DesyncReason),
    /// The source went quiet mid-round; the round was dropped.
    TimedOut,
}

/// Follower side of a round.
#[derive(Debug, Clone)]
pub struct FollowerSession {
    variant: ProtocolVariant,
    identifier: u32,
    state: SessionState,
    dump_frames: bool,
    round_timeout: Option<Duration>,
    initial: Option<(Timestamp, Timestamp)>,
    child: Option<Timestamp>,
    final_reference: Option<Timestamp>,
}

impl FollowerSession {
    /// Create an idle follower session.
    #[must_use]
    pub fn new(variant: ProtocolVariant, identifier: u32) -> Self {
        Self {
            variant,
            identifier,
            state: SessionState::Idle,
            dump_frames: false,
            round_timeout: None,
            initial: None,
            child: None,
            final_reference: None,
        }
    }

    /// Dump each received frame at trace level.
    #[must_use]
    pub fn with_frame_dump(mut self, enabled: bool) -> Self {
        self.dump_frames = enabled;
        self
    }

    /// Drop a half-finished round when the next exchange does not come
    /// within `timeout`. Zero disables the limit.
    #[must_use]
    pub fn with_round_timeout(mut self, timeout: Duration) -> Self {
        self.round_timeout = (!timeout.is_zero()).then_some(timeout);
        self
    }

    /// Variant this session answers.
    #[must_use]
    pub fn variant(&self) -> ProtocolVariant {
        self.variant
    }

    /// Identifier placed in reports.
    #[must_use]
    pub fn identifier(&self) -> u32 {
        self.identifier
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Arm the reply for the current state and wait for one exchange.
    ///
    /// `model` supplies the corrected clock and the report contents; it is
    /// not modified. If `latch` is given, the sample's local time is the
    /// latched edge instead of the time the exchange returned.
    ///
    /// A full-handshake round resynchronizes with the source on its own.
    /// A timestamp arriving where the placeholder was due means the source
    /// started over, so the round restarts from that frame. With a round
    /// timeout set, a source that goes quiet mid-round drops the round and
    /// the session waits for a fresh one ([`FollowerStep::TimedOut`]).
    ///
    /// # Errors
    ///
    /// Returns `SyncError::Transport` if the exchange fails; the round in
    /// progress is dropped.
    pub async fn step<P, C>(
        &mut self,
        port: &mut P,
        clock: &C,
        model: &ClockModel,
        latch: Option<&EdgeLatch>,
    ) -> Result<FollowerStep, SyncError>
    where
        P: FollowerPort + ?Sized,
        C: Clock + ?Sized,
    {
        if self.state == SessionState::Idle {
            self.state = SessionState::AwaitInitialTimestamp;
        }
        let len = self.state.frame_len(self.variant);
        let mut tx = [0u8; REPORT_FRAME_LEN];
        let mut rx = [0u8; REPORT_FRAME_LEN];
        self.prepare_reply(&mut tx[..len], clock, model);

        let exchange = port.transceive(&tx[..len], &mut rx[..len]);
        let result = match self.round_timeout {
            Some(limit) if self.is_mid_round() => {
                if let Ok(result) = tokio::time::timeout(limit, exchange).await {
                    result
                } else {
                    tracing::debug!(state = ?self.state, "source went quiet, round dropped");
                    drain(latch);
                    self.abandon();
                    return Ok(FollowerStep::TimedOut);
                }
            }
            _ => exchange.await,
        };
        if let Err(e) = result {
            drain(latch);
            self.abandon();
            return Err(e.into());
        }
        let arrival = clock.now();
        let rx = &rx[..len];
        if self.dump_frames {
            tracing::trace!(state = ?self.state, frame = %FrameDump(rx), "received frame");
        }

        match self.state {
            SessionState::Idle | SessionState::AwaitInitialTimestamp => {
                if is_zero_frame(rx) {
                    drain(latch);
                    return Ok(FollowerStep::Ignored);
                }
                self.accept_reference(rx, arrival, latch).await
            }
            SessionState::RespondWithLocalTimestamp => {
                // The source's second frame is always the placeholder.
                if !is_zero_frame(rx) {
                    tracing::debug!("timestamp where the placeholder was due, restarting round");
                    self.abandon();
                    return self.accept_reference(rx, arrival, latch).await;
                }
                drain(latch);
                self.state = SessionState::AwaitFinalTimestamp;
                Ok(FollowerStep::Advanced)
            }
            SessionState::AwaitFinalTimestamp => {
                drain(latch);
                if is_zero_frame(rx) {
                    self.abandon();
                    return Ok(FollowerStep::Desync(DesyncReason::UnexpectedPlaceholder));
                }
                self.final_reference = Some(decode_timestamp_prefix(rx)?);
                self.state = SessionState::SendAck;
                Ok(FollowerStep::Advanced)
            }
            SessionState::SendAck => {
                drain(latch);
                let completed = match (self.initial, self.child, self.final_reference) {
                    (Some((reference, local)), Some(child), Some(final_reference)) => {
                        // (ts2 - ts1) - (child - local1): time on the wire both ways.
                        let round_trip = final_reference
                            .diff(reference)
                            .saturating_sub(child.diff(local))
                            .max(0)
                            .unsigned_abs();
                        Some(SyncSample {
                            reference,
                            local,
                            round_trip: Some(round_trip),
                        })
                    }
                    _ => None,
                };
                self.abandon();
                Ok(completed.map_or(
                    FollowerStep::Desync(DesyncReason::UnexpectedPlaceholder),
                    FollowerStep::Completed,
                ))
            }
        }
    }

    /// Take `rx` as the round's first reference timestamp.
    async fn accept_reference(
        &mut self,
        rx: &[u8],
        arrival: Timestamp,
        latch: Option<&EdgeLatch>,
    ) -> Result<FollowerStep, SyncError> {
        let reference = decode_timestamp_prefix(rx)?;
        let local = match latch {
            Some(latch) => latch.wait_for_trigger().await,
            None => arrival,
        };
        if self.variant == ProtocolVariant::FullHandshake {
            self.initial = Some((reference, local));
            self.state = SessionState::RespondWithLocalTimestamp;
            Ok(FollowerStep::Advanced)
        } else {
            self.state = SessionState::Idle;
            Ok(FollowerStep::Completed(SyncSample {
                reference,
                local,
                round_trip: None,
            }))
        }
    }

    fn is_mid_round(&self) -> bool {
        matches!(
            self.state,
            SessionState::RespondWithLocalTimestamp
                | SessionState::AwaitFinalTimestamp
                | SessionState::SendAck
        )
    }

    fn prepare_reply<C>(&mut self, tx: &mut [u8], clock: &C, model: &ClockModel)
    where
        C: Clock + ?Sized,
    {
        match (self.variant, self.state) {
            (ProtocolVariant::RoundTrip, _) => {
                let report = Report::new(
                    self.identifier,
                    model.current_offset(),
                    model.corrected_now(clock.now()),
                );
                tx.copy_from_slice(&report.encode());
            }
            (ProtocolVariant::FullHandshake, SessionState::RespondWithLocalTimestamp) => {
                let child = clock.now();
                self.child = Some(child);
                tx.copy_from_slice(&encode_timestamp(child));
            }
            (ProtocolVariant::FullHandshake, SessionState::SendAck) => {
                tx[0] = ACK_MARKER;
            }
            _ => {
                tx.copy_from_slice(&encode_timestamp(model.corrected_now(clock.now())));
            }
        }
    }

    fn abandon(&mut self) {
        self.state = SessionState::Idle;
        self.initial = None;
        self.child = None;
        self.final_reference = None;
    }
}

/// Discard an edge captured for an exchange that carries no sample.
fn drain(latch: Option<&EdgeLatch>) {
    if let Some(latch) = latch {
        let _ = latch.try_take();
    }
}
