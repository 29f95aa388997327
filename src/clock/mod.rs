//! Local clocks, offset estimation and edge-latched capture.
//!
//! - [`Clock`]: where a node reads its own raw time.
//! - [`ClockModel`]: turns raw (reference, local) samples into a
//!   validated offset and answers "corrected now".
//! - [`EdgeLatch`]: single-slot hand-off of a timestamp captured at a
//!   trigger edge to the node's main loop.

pub mod latch;
pub mod model;
pub mod source;

#[cfg(test)]
mod tests;

pub use latch::EdgeLatch;
pub use model::{ClockModel, ClockModelConfig, SampleVerdict};
pub use source::{Clock, ManualClock, MonotonicClock};
