//! Event bus for synchronization events

use tokio::sync::broadcast;

use crate::bus::FollowerAddress;
use crate::error::DesyncReason;
use crate::types::Offset;

/// Synchronization events
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    // Presence events
    /// A follower answered a presence probe
    FollowerDiscovered {
        /// Select line of the follower
        address: FollowerAddress,
    },
    /// A follower read back all zeros during probing
    FollowerAbsent {
        /// Select line probed
        address: FollowerAddress,
    },

    // Round events
    /// A round finished and its result was recorded
    RoundCompleted {
        /// Follower the round ran against
        address: FollowerAddress,
        /// Offset in force afterwards
        offset: Offset,
        /// Rounds completed so far with this follower
        rounds_completed: u64,
    },
    /// A round failed part-way and was dropped
    RoundAbandoned {
        /// Follower the round ran against
        address: FollowerAddress,
        /// Error message
        error: String,
    },
    /// A sample was discarded by the jump filter
    ClockJumpRejected {
        /// Follower whose sample was discarded
        address: FollowerAddress,
        /// Rejected reference-minus-local difference
        raw_diff: Offset,
        /// Configured acceptance limit
        limit: u64,
        /// Offset still in force
        offset: Offset,
    },
    /// A reply did not fit the protocol state
    ProtocolDesync {
        /// Follower that answered out of step
        address: FollowerAddress,
        /// What did not match
        reason: DesyncReason,
    },

    // Scheduler events
    /// A pass over all present followers finished
    CycleCompleted {
        /// Cycle number, starting at 1
        cycle: u64,
        /// Rounds that completed
        completed: usize,
        /// Rounds that were abandoned
        failed: usize,
    },
}

impl SyncEvent {
    /// Follower the event concerns, if any
    #[must_use]
    pub fn address(&self) -> Option<FollowerAddress> {
        match *self {
            Self::FollowerDiscovered { address }
            | Self::FollowerAbsent { address }
            | Self::RoundCompleted { address, .. }
            | Self::RoundAbandoned { address, .. }
            | Self::ClockJumpRejected { address, .. }
            | Self::ProtocolDesync { address, .. } => Some(address),
            Self::CycleCompleted { .. } => None,
        }
    }
}

/// Event bus for distributing events
#[derive(Debug, Clone)]
pub struct EventBus {
    /// Broadcast sender
    tx: broadcast::Sender<SyncEvent>,
}

impl EventBus {
    /// Create a new event bus
    #[must_use]
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(100);
        Self { tx }
    }

    /// Subscribe to events
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.tx.subscribe()
    }

    /// Emit an event
    pub fn emit(&self, event: SyncEvent) {
        // Ignore error if no receivers
        let _ = self.tx.send(event);
    }

    /// Get subscriber count
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Event filter for selective subscription
pub struct EventFilter {
    rx: broadcast::Receiver<SyncEvent>,
    filter: Box<dyn Fn(&SyncEvent) -> bool + Send>,
}

impl EventFilter {
    /// Create a filtered event receiver
    pub fn new<F>(bus: &EventBus, filter: F) -> Self
    where
        F: Fn(&SyncEvent) -> bool + Send + 'static,
    {
        Self {
            rx: bus.subscribe(),
            filter: Box::new(filter),
        }
    }

    /// Receive next matching event
    pub async fn recv(&mut self) -> Option<SyncEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) if (self.filter)(&event) => return Some(event),
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Next matching event already queued, without waiting
    pub fn try_recv(&mut self) -> Option<SyncEvent> {
        loop {
            match self.rx.try_recv() {
                Ok(event) if (self.filter)(&event) => return Some(event),
                Ok(_) | Err(broadcast::error::TryRecvError::Lagged(_)) => {}
                Err(_) => return None,
            }
        }
    }
}

/// Helper functions for common filters
impl EventFilter {
    /// Filter for clock estimate events only
    #[must_use]
    pub fn clock_events(bus: &EventBus) -> Self {
        Self::new(bus, |e| {
            matches!(
                e,
                SyncEvent::RoundCompleted { .. } | SyncEvent::ClockJumpRejected { .. }
            )
        })
    }

    /// Filter for presence events only
    #[must_use]
    pub fn presence_events(bus: &EventBus) -> Self {
        Self::new(bus, |e| {
            matches!(
                e,
                SyncEvent::FollowerDiscovered { .. } | SyncEvent::FollowerAbsent { .. }
            )
        })
    }

    /// Filter for error events only
    #[must_use]
    pub fn error_events(bus: &EventBus) -> Self {
        Self::new(bus, |e| {
            matches!(
                e,
                SyncEvent::RoundAbandoned { .. }
                    | SyncEvent::ClockJumpRejected { .. }
                    | SyncEvent::ProtocolDesync { .. }
            )
        })
    }

    /// Filter for events about one follower
    #[must_use]
    pub fn for_follower(bus: &EventBus, address: FollowerAddress) -> Self {
        Self::new(bus, move |e| e.address() == Some(address))
    }
}
