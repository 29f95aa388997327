use std::io;
use thiserror::Error;

use crate::types::Offset;

/// Bus-level transfer errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The transfer primitive reported a failure
    #[error("bus transfer failed with code {code}")]
    Fault {
        /// Driver-specific error code (negative in most drivers)
        code: i32,
    },

    /// The peer on the other end of the bus went away
    #[error("bus peer at address {address} disconnected")]
    Disconnected {
        /// The address whose peer disappeared
        address: u8,
    },

    /// Transmit and receive buffers differ in length
    #[error("frame length mismatch: tx {tx} bytes, rx {rx} bytes")]
    LengthMismatch {
        /// Transmit buffer length
        tx: usize,
        /// Receive buffer length
        rx: usize,
    },

    /// The bus or one of its select lines is not ready
    #[error("bus not ready")]
    NotReady,
}

/// Wire codec errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// Frame is not the length the decoder expects
    #[error("invalid frame length: expected {expected} bytes, got {actual}")]
    InvalidLength {
        /// Required length
        expected: usize,
        /// Length actually supplied
        actual: usize,
    },
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A field holds a value outside its accepted range
    #[error("invalid configuration value for {field}: {reason}")]
    Invalid {
        /// The offending field
        field: &'static str,
        /// Why the value was refused
        reason: String,
    },

    /// The configuration document could not be parsed
    #[error("configuration parse error: {0}")]
    Parse(String),

    /// The configuration document could not be read
    #[error("configuration I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Why a completed round was flagged as out of step with its peer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DesyncReason {
    /// The acknowledgement byte did not carry the marker
    AckMismatch {
        /// Marker the source expected
        expected: u8,
        /// Byte actually read back
        actual: u8,
    },
    /// A report carried somebody else's identifier
    ReportIdentifier {
        /// Identifier assigned to the addressed follower
        expected: u32,
        /// Identifier found in the report
        actual: u32,
    },
    /// A follower expected a reference timestamp and received the placeholder frame
    UnexpectedPlaceholder,
}

impl std::fmt::Display for DesyncReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AckMismatch { expected, actual } => {
                write!(f, "ack byte 0x{actual:02X}, expected 0x{expected:02X}")
            }
            Self::ReportIdentifier { expected, actual } => {
                write!(
                    f,
                    "report identifier 0x{actual:08X}, expected 0x{expected:08X}"
                )
            }
            Self::UnexpectedPlaceholder => write!(f, "placeholder frame where a timestamp was due"),
        }
    }
}

/// Errors that can occur while synchronizing clocks
#[derive(Debug, Error)]
pub enum SyncError {
    /// Bus exchange failed; the round is abandoned
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// A sample was discarded because its offset was implausibly large
    #[error("clock jump rejected: raw difference {raw_diff} exceeds limit {limit}")]
    ClockJumpRejected {
        /// The rejected reference-minus-local difference
        raw_diff: Offset,
        /// The configured acceptance limit
        limit: u64,
    },

    /// The peer's reply did not match the protocol state
    #[error("protocol desync: {reason}")]
    ProtocolDesync {
        /// What did not match
        reason: DesyncReason,
    },

    /// An exchange was addressed past the configured follower set
    #[error("follower address {address} out of range (follower count {follower_count})")]
    InvalidAddress {
        /// Requested address
        address: u8,
        /// Configured number of followers
        follower_count: usize,
    },

    /// The source clock read zero, which is reserved for the placeholder frame
    #[error("reference clock reads zero; zero frames are reserved")]
    ReservedTimestamp,

    /// The bus failed its readiness check at startup
    #[error("bus not ready: {0}")]
    BusNotReady(TransportError),

    /// Invalid configuration
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Malformed frame
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),
}

impl From<DesyncReason> for SyncError {
    fn from(reason: DesyncReason) -> Self {
        Self::ProtocolDesync { reason }
    }
}

impl SyncError {
    /// Check if this error only affects the current round
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Transport(_)
                | Self::ClockJumpRejected { .. }
                | Self::ProtocolDesync { .. }
                | Self::ReservedTimestamp
                | Self::Codec(_)
        )
    }

    /// Check if this error came from the bus layer
    #[must_use]
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::BusNotReady(_))
    }
}

/// Result type alias for synchronization operations
pub type Result<T> = std::result::Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SyncError::InvalidAddress {
            address: 7,
            follower_count: 4,
        };
        assert_eq!(
            err.to_string(),
            "follower address 7 out of range (follower count 4)"
        );
    }

    #[test]
    fn test_transport_error_display() {
        let err = TransportError::Fault { code: -5 };
        assert_eq!(err.to_string(), "bus transfer failed with code -5");
    }

    #[test]
    fn test_error_is_recoverable() {
        assert!(SyncError::Transport(TransportError::Fault { code: -1 }).is_recoverable());
        assert!(
            SyncError::ClockJumpRejected {
                raw_diff: 15_000,
                limit: 10_000
            }
            .is_recoverable()
        );
        assert!(
            SyncError::ProtocolDesync {
                reason: DesyncReason::AckMismatch {
                    expected: 0xAC,
                    actual: 0x00
                }
            }
            .is_recoverable()
        );
        assert!(!SyncError::BusNotReady(TransportError::NotReady).is_recoverable());

        let cfg = SyncError::Config(ConfigError::Parse("eof".to_string()));
        assert!(!cfg.is_recoverable());
    }

    #[test]
    fn test_error_from_transport() {
        let err: SyncError = TransportError::Disconnected { address: 2 }.into();
        assert!(matches!(err, SyncError::Transport(_)));
        assert!(err.is_transport());
    }

    #[test]
    fn test_error_from_io_is_config() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "missing");
        let err: SyncError = ConfigError::from(io_err).into();
        assert!(matches!(err, SyncError::Config(ConfigError::Io(_))));
    }

    #[test]
    fn test_error_from_desync_reason() {
        let err: SyncError = DesyncReason::UnexpectedPlaceholder.into();
        assert!(matches!(
            err,
            SyncError::ProtocolDesync {
                reason: DesyncReason::UnexpectedPlaceholder
            }
        ));
        assert_eq!(
            err.to_string(),
            "protocol desync: placeholder frame where a timestamp was due"
        );
    }

    #[test]
    fn test_desync_reason_display() {
        let reason = DesyncReason::AckMismatch {
            expected: 0xAC,
            actual: 0x01,
        };
        assert_eq!(reason.to_string(), "ack byte 0x01, expected 0xAC");
    }

    #[test]
    fn test_error_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<SyncError>();
        assert_send_sync::<TransportError>();
    }
}
