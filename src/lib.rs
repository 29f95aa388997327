//! # busclock
//!
//! Reference clock distribution over a master-polled, full-duplex bus.
//!
//! One source node owns the reference clock and the bus. It visits every
//! follower in turn and runs a short synchronization round; each follower
//! keeps an offset that maps its own free-running clock onto the
//! reference.
//!
//! ## Features
//!
//! - Three round variants: broadcast, round-trip with status report,
//!   and a four-exchange handshake
//! - Step or cumulative offset correction with a jump filter
//! - Presence probing and periodic re-probing of absent followers
//! - Edge-latched local timestamps
//! - In-memory bus for tests and simulations
//!
//! ## Example
//!
//! ```rust,no_run
//! use busclock::prelude::*;
//! use busclock::testing::SimulatedBus;
//!
//! # async fn example() -> Result<(), busclock::SyncError> {
//! let config = SyncConfig::builder()
//!     .protocol_variant(ProtocolVariant::FullHandshake)
//!     .follower_count(4)
//!     .build();
//!
//! let mut bus = SimulatedBus::new(4);
//! let port = bus.attach(0);
//! let mut follower = FollowerNode::new(
//!     port,
//!     MonotonicClock::new(TimeUnit::Millisecond),
//!     FollowerConfig::matching(&config, 0),
//! )?;
//!
//! let (_stop, shutdown) = tokio::sync::watch::channel(false);
//! tokio::spawn({
//!     let shutdown = shutdown.clone();
//!     async move { follower.run(shutdown).await }
//! });
//!
//! let clock = MonotonicClock::starting_at(TimeUnit::Millisecond, Timestamp::new(1));
//! let mut scheduler = Scheduler::new(bus, clock, config)?;
//! scheduler.run(shutdown).await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Architecture
//!
//! - **Scheduling**: [`Scheduler`] (source) and [`FollowerNode`] (follower)
//! - **Protocol**: per-round state machines and the frame codec
//! - **Clock**: raw clocks, the offset model and the edge latch
//! - **Bus**: the transport traits hardware drivers implement

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Public modules
/// Error types
pub mod error;
/// Synchronization events
pub mod events;
/// Core types
pub mod types;

/// Testing utilities
pub mod testing;

pub mod bus;
pub mod clock;
pub mod follower;
pub mod protocol;
pub mod scheduler;

// Re-exports
pub use bus::{BusTransport, FollowerAddress, FollowerPort};
pub use clock::{Clock, ClockModel, EdgeLatch, ManualClock, MonotonicClock};
pub use error::{SyncError, TransportError};
pub use events::{EventBus, SyncEvent};
pub use follower::FollowerNode;
pub use protocol::{FollowerSession, Report, SyncSession};
pub use scheduler::{FollowerRecord, Scheduler};
pub use types::{
    CorrectionMode, FollowerConfig, Offset, ProtocolVariant, SyncConfig, TimeUnit, Timestamp,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude for common imports
///
/// Convenient re-exports
pub mod prelude {
    pub use crate::{
        BusTransport, Clock, ClockModel, CorrectionMode, EdgeLatch, EventBus, FollowerConfig,
        FollowerNode, FollowerPort, MonotonicClock, ProtocolVariant, Scheduler, SyncConfig,
        SyncError, SyncEvent, TimeUnit, Timestamp,
    };
}
