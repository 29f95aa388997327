//! Synchronization events

mod bus;
#[cfg(test)]
mod tests;

pub use bus::{EventBus, EventFilter, SyncEvent};
