//! Testing utilities
//!
//! Stand-ins for real bus hardware: a scripted transport for driving one
//! end in isolation, and an in-memory bus that connects a source to any
//! number of followers.

pub mod bus_conditions;
pub mod scripted;
pub mod simulated_bus;

pub use bus_conditions::BusConditions;
pub use scripted::{ExchangeLog, ExchangeRecord, ScriptedPort, ScriptedReply, ScriptedTransport};
pub use simulated_bus::{INJECTED_FAULT_CODE, SimulatedBus, SimulatedPort};
