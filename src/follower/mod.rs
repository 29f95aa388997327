//! Follower node.
//!
//! A [`FollowerNode`] owns its port, its raw clock and its own
//! [`ClockModel`]. Each pass arms the next reply, waits for the source to
//! clock an exchange, and folds any completed sample into the model. The
//! node never talks first; everything it learns arrives in frames.

#[cfg(test)]
mod tests;

use std::sync::Arc;

use tokio::sync::watch;

use crate::bus::FollowerPort;
use crate::clock::{Clock, ClockModel, ClockModelConfig, EdgeLatch};
use crate::error::{Result, SyncError};
use crate::events::{EventBus, SyncEvent};
use crate::protocol::{FollowerSession, FollowerStep};
use crate::types::{FollowerConfig, Timestamp, check_clock_unit};

/// Follower end of the synchronization protocol.
pub struct FollowerNode<P, C> {
    port: P,
    clock: C,
    config: FollowerConfig,
    session: FollowerSession,
    model: ClockModel,
    latch: Option<Arc<EdgeLatch>>,
    events: EventBus,
}

impl<P: FollowerPort, C: Clock> FollowerNode<P, C> {
    /// Create a follower answering on `port`.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::Config` if the configuration does not validate
    /// or `clock` counts in a different unit than `config.time_unit`.
    pub fn new(port: P, clock: C, config: FollowerConfig) -> Result<Self> {
        config.validate()?;
        check_clock_unit(config.time_unit, clock.unit())?;

        let model = ClockModel::new(ClockModelConfig {
            mode: config.correction_mode,
            max_acceptable_offset: config.max_acceptable_offset(),
            validation_enabled: config.validation_enabled,
        });
        let session = FollowerSession::new(config.protocol_variant, config.identifier())
            .with_frame_dump(config.dump_frames)
            .with_round_timeout(config.round_timeout);

        Ok(Self {
            port,
            clock,
            config,
            session,
            model,
            latch: None,
            events: EventBus::new(),
        })
    }

    /// Take sample times from an edge latch instead of the exchange return.
    #[must_use]
    pub fn with_latch(mut self, latch: Arc<EdgeLatch>) -> Self {
        self.latch = Some(latch);
        self
    }

    /// Publish events on an existing bus instead of a private one.
    #[must_use]
    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = events;
        self
    }

    /// Event bus this node publishes on.
    #[must_use]
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Configuration in force.
    #[must_use]
    pub fn config(&self) -> &FollowerConfig {
        &self.config
    }

    /// The node's offset estimate.
    #[must_use]
    pub fn model(&self) -> &ClockModel {
        &self.model
    }

    /// Protocol state of the round in progress.
    #[must_use]
    pub fn session(&self) -> &FollowerSession {
        &self.session
    }

    /// The node's clock shifted onto the reference timeline.
    #[must_use]
    pub fn corrected_now(&self) -> Timestamp {
        self.model.corrected_now(self.clock.now())
    }

    /// Give back the port.
    pub fn into_port(self) -> P {
        self.port
    }

    /// Answer one exchange and apply whatever it completed.
    ///
    /// # Errors
    ///
    /// Returns the transport or codec error that ended the exchange; the
    /// round in progress is dropped and the model is untouched.
    pub async fn poll_once(&mut self) -> Result<FollowerStep> {
        let address = self.config.address;
        let step = self
            .session
            .step(
                &mut self.port,
                &self.clock,
                &self.model,
                self.latch.as_deref(),
            )
            .await?;

        match step {
            FollowerStep::Completed(sample) => {
                let limit = self.model.config().max_acceptable_offset;
                let verdict = self.model.apply_sample(sample.reference, sample.local);
                match verdict.into_result(limit) {
                    Err(e) => {
                        tracing::debug!(address, error = %e, "sample discarded");
                        self.events.emit(SyncEvent::ClockJumpRejected {
                            address,
                            raw_diff: sample.raw_diff(),
                            limit,
                            offset: verdict.offset(),
                        });
                    }
                    Ok(offset) => {
                        tracing::debug!(
                            address,
                            offset,
                            raw_diff = sample.raw_diff(),
                            round_trip = ?sample.round_trip,
                            rounds = self.model.rounds_completed(),
                            "offset updated"
                        );
                        self.events.emit(SyncEvent::RoundCompleted {
                            address,
                            offset,
                            rounds_completed: self.model.rounds_completed(),
                        });
                    }
                }
            }
            FollowerStep::Desync(reason) => {
                tracing::warn!(address, error = %SyncError::from(reason), "round dropped");
                self.events
                    .emit(SyncEvent::ProtocolDesync { address, reason });
            }
            FollowerStep::TimedOut => {
                self.events.emit(SyncEvent::RoundAbandoned {
                    address,
                    error: "source went quiet mid-round".to_string(),
                });
            }
            FollowerStep::Ignored | FollowerStep::Advanced => {}
        }

        Ok(step)
    }

    /// Answer exchanges until `shutdown` turns `true` or its sender goes away.
    ///
    /// A failed exchange is logged and retried after the back-off delay;
    /// after a finished round the node waits the re-arm delay before
    /// arming again.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(
            address = self.config.address,
            variant = %self.config.protocol_variant,
            identifier = self.session.identifier(),
            "follower started"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            let pause = tokio::select! {
                result = self.poll_once() => match result {
                    Ok(FollowerStep::Advanced | FollowerStep::TimedOut) => None,
                    Ok(_) => Some(self.config.rearm_delay),
                    Err(e) => {
                        tracing::warn!(address = self.config.address, error = %e, "exchange failed");
                        Some(self.config.backoff)
                    }
                },
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    None
                }
            };

            if let Some(delay) = pause.filter(|d| !d.is_zero()) {
                tokio::select! {
                    () = tokio::time::sleep(delay) => {}
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
        }

        tracing::info!(
            address = self.config.address,
            rounds = self.model.rounds_completed(),
            offset = self.model.current_offset(),
            "follower shutting down"
        );
    }
}

impl<P, C> std::fmt::Debug for FollowerNode<P, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FollowerNode")
            .field("address", &self.config.address)
            .field("session", &self.session)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}
