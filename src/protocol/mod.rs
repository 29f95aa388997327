//! Synchronization wire protocol.
//!
//! ## Variants
//!
//! - **Broadcast**: one 8-byte exchange; the follower keeps the source's
//!   timestamp and the source ignores the reply.
//! - **Round-trip**: one 20-byte exchange; the source's timestamp goes
//!   out, the follower's report about the previous round comes back.
//! - **Full handshake**: four exchanges (timestamp, follower timestamp,
//!   source arrival time, acknowledgement byte `0xAC`).
//!
//! ## Offset
//!
//! ```text
//!   offset = reference - local
//! ```
//!
//! No path delay is subtracted. The follower measures the round-trip
//! delay during a full handshake and reports it, but the offset it
//! applies still includes the one-way latency.
//!
//! The follower's `childTs` is read when it arms the reply for the second
//! exchange, which is as soon as the first one returns. The source only
//! clocks that exchange after its inter-exchange pause, so the offset the
//! source mirrors from `(arrival, childTs)` is larger than the follower's
//! own by that idle time as well as the latency.
//!
//! ## Resynchronizing
//!
//! Either end may abandon a full handshake on its own. The second frame
//! from the source is always the placeholder, so a follower that sees a
//! timestamp there restarts the round from it; a follower left waiting
//! mid-round drops the round after its round timeout.

pub mod codec;
pub mod session;


pub use codec::{
    ACK_FRAME_LEN, ACK_MARKER, FrameDump, REPORT_FRAME_LEN, Report, TIMESTAMP_FRAME_LEN,
    ZERO_FRAME, decode_report, decode_timestamp, decode_timestamp_prefix, encode_padded,
    encode_report, encode_timestamp, is_zero_frame,
};
pub use session::{
    FollowerSession, FollowerStep, RoundOutcome, SessionState, SyncSample, SyncSession,
    probe_frame_len,
};
