//! Wire encoding of timestamps, reports and acknowledgements.
//!
//! Every frame has a fixed length: 8 bytes for a timestamp, 20 bytes for
//! a report, 1 byte for an acknowledgement. All integers are big-endian.
//! An all-zero timestamp frame is the placeholder payload and is never a
//! valid reference.

use crate::error::CodecError;
use crate::types::{Offset, Timestamp};

/// Length of an encoded timestamp.
pub const TIMESTAMP_FRAME_LEN: usize = 8;

/// Length of an encoded report.
pub const REPORT_FRAME_LEN: usize = 20;

/// Length of an acknowledgement frame.
pub const ACK_FRAME_LEN: usize = 1;

/// Marker byte a follower returns to acknowledge a handshake.
pub const ACK_MARKER: u8 = 0xAC;

/// Placeholder timestamp frame.
pub const ZERO_FRAME: [u8; TIMESTAMP_FRAME_LEN] = [0u8; TIMESTAMP_FRAME_LEN];

/// Encode a timestamp, most significant byte first.
#[must_use]
pub fn encode_timestamp(ts: Timestamp) -> [u8; TIMESTAMP_FRAME_LEN] {
    ts.ticks().to_be_bytes()
}

/// Decode a timestamp frame.
#[must_use]
pub fn decode_timestamp(frame: &[u8; TIMESTAMP_FRAME_LEN]) -> Timestamp {
    Timestamp::new(u64::from_be_bytes(*frame))
}

/// Decode the timestamp carried in the first 8 bytes of a longer frame.
///
/// # Errors
///
/// Returns `CodecError::InvalidLength` if fewer than 8 bytes are supplied.
pub fn decode_timestamp_prefix(data: &[u8]) -> Result<Timestamp, CodecError> {
    let prefix: &[u8; TIMESTAMP_FRAME_LEN] = data
        .get(..TIMESTAMP_FRAME_LEN)
        .and_then(|s| s.try_into().ok())
        .ok_or(CodecError::InvalidLength {
            expected: TIMESTAMP_FRAME_LEN,
            actual: data.len(),
        })?;
    Ok(decode_timestamp(prefix))
}

/// Write a timestamp into the head of `out` and zero the remainder.
///
/// # Errors
///
/// Returns `CodecError::InvalidLength` if `out` is shorter than 8 bytes.
pub fn encode_padded(ts: Timestamp, out: &mut [u8]) -> Result<(), CodecError> {
    if out.len() < TIMESTAMP_FRAME_LEN {
        return Err(CodecError::InvalidLength {
            expected: TIMESTAMP_FRAME_LEN,
            actual: out.len(),
        });
    }
    out[..TIMESTAMP_FRAME_LEN].copy_from_slice(&encode_timestamp(ts));
    out[TIMESTAMP_FRAME_LEN..].fill(0);
    Ok(())
}

/// Whether every byte of `data` is zero.
#[must_use]
pub fn is_zero_frame(data: &[u8]) -> bool {
    data.iter().all(|&b| b == 0)
}

/// Status report a follower piggy-backs on its reply.
///
/// The report always describes the round before the one it travels in,
/// because the reply is armed before the request arrives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Report {
    /// Identifier of the reporting follower.
    pub identifier: u32,
    /// Follower's offset after its last round.
    pub offset: Offset,
    /// Follower's corrected clock when the report was prepared.
    pub corrected_timestamp: Timestamp,
}

impl Report {
    /// Wire size in bytes.
    pub const SIZE: usize = REPORT_FRAME_LEN;

    /// Create a new report.
    #[must_use]
    pub fn new(identifier: u32, offset: Offset, corrected_timestamp: Timestamp) -> Self {
        Self {
            identifier,
            offset,
            corrected_timestamp,
        }
    }

    /// Encode to 20 bytes: identifier (4), offset (8), corrected timestamp (8).
    #[must_use]
    pub fn encode(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[0..4].copy_from_slice(&self.identifier.to_be_bytes());
        buf[4..12].copy_from_slice(&self.offset.to_be_bytes());
        buf[12..20].copy_from_slice(&self.corrected_timestamp.ticks().to_be_bytes());
        buf
    }

    /// Decode from exactly 20 bytes.
    #[must_use]
    pub fn decode(data: &[u8; Self::SIZE]) -> Self {
        Self {
            identifier: u32::from_be_bytes([data[0], data[1], data[2], data[3]]),
            offset: Offset::from_be_bytes([
                data[4], data[5], data[6], data[7], data[8], data[9], data[10], data[11],
            ]),
            corrected_timestamp: Timestamp::new(u64::from_be_bytes([
                data[12], data[13], data[14], data[15], data[16], data[17], data[18], data[19],
            ])),
        }
    }

    /// Decode from a slice that must be exactly 20 bytes long.
    ///
    /// # Errors
    ///
    /// Returns `CodecError::InvalidLength` for any other length.
    pub fn decode_slice(data: &[u8]) -> Result<Self, CodecError> {
        let frame: &[u8; Self::SIZE] = data.try_into().map_err(|_| CodecError::InvalidLength {
            expected: Self::SIZE,
            actual: data.len(),
        })?;
        Ok(Self::decode(frame))
    }
}

/// Encode a report.
#[must_use]
pub fn encode_report(report: &Report) -> [u8; REPORT_FRAME_LEN] {
    report.encode()
}

/// Decode a report.
#[must_use]
pub fn decode_report(frame: &[u8; REPORT_FRAME_LEN]) -> Report {
    Report::decode(frame)
}

/// Hex plus printable-ASCII rendering of a received frame.
pub struct FrameDump<'a>(pub &'a [u8]);

impl std::fmt::Display for FrameDump<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, b) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{b:02x}")?;
        }
        write!(f, " |")?;
        for &b in self.0 {
            let c = if (32..=126).contains(&b) {
                char::from(b)
            } else {
                '.'
            };
            write!(f, "{c}")?;
        }
        write!(f, "|")
    }
}
