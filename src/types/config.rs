use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::time::TimeUnit;
use crate::error::ConfigError;

/// Largest follower set a source will address.
pub const MAX_FOLLOWERS: usize = 32;

/// Base value for report identifiers; the low byte carries the follower address.
pub const REPORT_ID_BASE: u32 = 0x5359_4E00;

/// Report identifier a follower at `address` announces itself with.
#[must_use]
pub const fn report_identifier(address: u8) -> u32 {
    REPORT_ID_BASE | address as u32
}

/// Refuse a clock that counts in a different unit than the configuration.
///
/// Offsets, limits and frames are all in raw ticks, so a mismatch would
/// scale every threshold by a thousand.
pub(crate) fn check_clock_unit(
    configured: TimeUnit,
    clock: TimeUnit,
) -> Result<(), ConfigError> {
    if configured == clock {
        return Ok(());
    }
    Err(ConfigError::Invalid {
        field: "time_unit",
        reason: format!("configured {configured} but the clock counts {clock}"),
    })
}

/// Protocol variant run for every round
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProtocolVariant {
    /// Source pushes its timestamp; replies are not interpreted
    #[default]
    Broadcast,
    /// Source pushes its timestamp and reads back the previous round's report
    RoundTrip,
    /// Four-exchange handshake with acknowledgement
    FullHandshake,
}

impl ProtocolVariant {
    /// Number of physical exchanges in one round
    #[must_use]
    pub const fn exchanges(self) -> usize {
        match self {
            Self::Broadcast | Self::RoundTrip => 1,
            Self::FullHandshake => 4,
        }
    }
}

impl std::fmt::Display for ProtocolVariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Broadcast => write!(f, "broadcast"),
            Self::RoundTrip => write!(f, "round-trip"),
            Self::FullHandshake => write!(f, "full-handshake"),
        }
    }
}

/// How an accepted sample updates the running offset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorrectionMode {
    /// Replace the offset with the newest estimate
    #[default]
    Step,
    /// Add each round's residual onto the running offset
    Cumulative,
}

/// Physical bus parameters handed through to the transport unchanged
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusSettings {
    /// Bus clock frequency in hertz (default: 1 MHz)
    pub frequency_hz: u32,
    /// Word size in bits (default: 8)
    pub word_size: u8,
    /// Most significant bit first (default: true)
    pub msb_first: bool,
}

impl Default for BusSettings {
    fn default() -> Self {
        Self {
            frequency_hz: 1_000_000,
            word_size: 8,
            msb_first: true,
        }
    }
}

/// Durations (de)serialized as whole milliseconds
mod duration_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

/// Source-side configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Protocol variant (default: broadcast)
    pub protocol_variant: ProtocolVariant,

    /// Timestamp resolution (default: milliseconds)
    pub time_unit: TimeUnit,

    /// Correction policy mirrored for each follower (default: step)
    pub correction_mode: CorrectionMode,

    /// Largest plausible offset magnitude; `None` means ten seconds in `time_unit`
    pub max_acceptable_offset: Option<u64>,

    /// Reject samples larger than `max_acceptable_offset` (default: true)
    pub validation_enabled: bool,

    /// Pause after each follower's session (default: 100ms)
    #[serde(with = "duration_millis")]
    pub inter_session_delay: Duration,

    /// Pause after each full pass over the followers (default: 1 second)
    #[serde(with = "duration_millis")]
    pub inter_cycle_delay: Duration,

    /// Pause between the exchanges of one round (default: 1ms)
    #[serde(with = "duration_millis")]
    pub inter_exchange_delay: Duration,

    /// Extra pause after an abandoned round (default: 50ms)
    #[serde(with = "duration_millis")]
    pub retry_backoff: Duration,

    /// Re-probe absent followers every this many cycles (default: 60)
    pub reprobe_every_n_cycles: u32,

    /// Number of addressable followers (default: 4)
    pub follower_count: usize,

    /// Physical bus parameters
    pub bus: BusSettings,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            protocol_variant: ProtocolVariant::Broadcast,
            time_unit: TimeUnit::Millisecond,
            correction_mode: CorrectionMode::Step,
            max_acceptable_offset: None,
            validation_enabled: true,
            inter_session_delay: Duration::from_millis(100),
            inter_cycle_delay: Duration::from_secs(1),
            inter_exchange_delay: Duration::from_millis(1),
            retry_backoff: Duration::from_millis(50),
            reprobe_every_n_cycles: 60,
            follower_count: 4,
            bus: BusSettings::default(),
        }
    }
}

impl SyncConfig {
    /// Create a new config builder
    #[must_use]
    pub fn builder() -> SyncConfigBuilder {
        SyncConfigBuilder::default()
    }

    /// Effective offset acceptance limit in `time_unit`
    #[must_use]
    pub fn max_acceptable_offset(&self) -> u64 {
        self.max_acceptable_offset
            .unwrap_or_else(|| self.time_unit.default_max_offset())
    }

    /// Check every field for a usable value
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` naming the first bad field
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.follower_count == 0 || self.follower_count > MAX_FOLLOWERS {
            return Err(ConfigError::Invalid {
                field: "follower_count",
                reason: format!("must be within 1..={MAX_FOLLOWERS}"),
            });
        }
        if self.reprobe_every_n_cycles == 0 {
            return Err(ConfigError::Invalid {
                field: "reprobe_every_n_cycles",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.max_acceptable_offset == Some(0) {
            return Err(ConfigError::Invalid {
                field: "max_acceptable_offset",
                reason: "must be non-zero".to_string(),
            });
        }
        Ok(())
    }

    /// Parse and validate a JSON configuration document
    ///
    /// Missing fields take their defaults.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Parse` for malformed JSON and
    /// `ConfigError::Invalid` for out-of-range values
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON configuration file
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Io` if the file cannot be read, otherwise as
    /// [`SyncConfig::from_json_str`]
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Serialize to pretty-printed JSON
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Parse` if serialization fails
    pub fn to_json_string(&self) -> Result<String, ConfigError> {
        serde_json::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }
}

/// Builder for `SyncConfig`
#[derive(Debug, Clone, Default)]
pub struct SyncConfigBuilder {
    config: SyncConfig,
}

impl SyncConfigBuilder {
    /// Set protocol variant
    #[must_use]
    pub fn protocol_variant(mut self, variant: ProtocolVariant) -> Self {
        self.config.protocol_variant = variant;
        self
    }

    /// Set timestamp resolution
    #[must_use]
    pub fn time_unit(mut self, unit: TimeUnit) -> Self {
        self.config.time_unit = unit;
        self
    }

    /// Set correction policy
    #[must_use]
    pub fn correction_mode(mut self, mode: CorrectionMode) -> Self {
        self.config.correction_mode = mode;
        self
    }

    /// Set offset acceptance limit in the configured unit
    #[must_use]
    pub fn max_acceptable_offset(mut self, limit: u64) -> Self {
        self.config.max_acceptable_offset = Some(limit);
        self
    }

    /// Enable or disable jump validation
    #[must_use]
    pub fn validation_enabled(mut self, enabled: bool) -> Self {
        self.config.validation_enabled = enabled;
        self
    }

    /// Set pause after each follower's session
    #[must_use]
    pub fn inter_session_delay(mut self, delay: Duration) -> Self {
        self.config.inter_session_delay = delay;
        self
    }

    /// Set pause after each cycle
    #[must_use]
    pub fn inter_cycle_delay(mut self, delay: Duration) -> Self {
        self.config.inter_cycle_delay = delay;
        self
    }

    /// Set pause between exchanges of one round
    #[must_use]
    pub fn inter_exchange_delay(mut self, delay: Duration) -> Self {
        self.config.inter_exchange_delay = delay;
        self
    }

    /// Set extra pause after an abandoned round
    #[must_use]
    pub fn retry_backoff(mut self, delay: Duration) -> Self {
        self.config.retry_backoff = delay;
        self
    }

    /// Set re-probe period in cycles
    #[must_use]
    pub fn reprobe_every_n_cycles(mut self, cycles: u32) -> Self {
        self.config.reprobe_every_n_cycles = cycles;
        self
    }

    /// Set number of addressable followers
    #[must_use]
    pub fn follower_count(mut self, count: usize) -> Self {
        self.config.follower_count = count;
        self
    }

    /// Set physical bus parameters
    #[must_use]
    pub fn bus(mut self, bus: BusSettings) -> Self {
        self.config.bus = bus;
        self
    }

    /// Build the configuration
    #[must_use]
    pub fn build(self) -> SyncConfig {
        self.config
    }
}

/// Follower-side configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FollowerConfig {
    /// Select line this follower answers on
    pub address: u8,

    /// Identifier placed in reports; `None` derives it from `address`
    pub identifier: Option<u32>,

    /// Protocol variant the source runs (default: broadcast)
    pub protocol_variant: ProtocolVariant,

    /// Timestamp resolution (default: milliseconds)
    pub time_unit: TimeUnit,

    /// Correction policy (default: step)
    pub correction_mode: CorrectionMode,

    /// Largest plausible offset magnitude; `None` means ten seconds in `time_unit`
    pub max_acceptable_offset: Option<u64>,

    /// Reject samples larger than `max_acceptable_offset` (default: true)
    pub validation_enabled: bool,

    /// Pause after a failed receive before re-arming (default: 100ms)
    #[serde(with = "duration_millis")]
    pub backoff: Duration,

    /// Pause after a completed or ignored round before re-arming (default: 10ms)
    #[serde(with = "duration_millis")]
    pub rearm_delay: Duration,

    /// Drop a half-finished handshake after this long without an exchange;
    /// zero waits forever (default: 50ms)
    #[serde(with = "duration_millis")]
    pub round_timeout: Duration,

    /// Dump every received frame at trace level (default: false)
    pub dump_frames: bool,
}

impl Default for FollowerConfig {
    fn default() -> Self {
        Self {
            address: 0,
            identifier: None,
            protocol_variant: ProtocolVariant::Broadcast,
            time_unit: TimeUnit::Millisecond,
            correction_mode: CorrectionMode::Step,
            max_acceptable_offset: None,
            validation_enabled: true,
            backoff: Duration::from_millis(100),
            rearm_delay: Duration::from_millis(10),
            round_timeout: Duration::from_millis(50),
            dump_frames: false,
        }
    }
}

impl FollowerConfig {
    /// Default configuration for the follower on `address`
    #[must_use]
    pub fn for_address(address: u8) -> Self {
        Self {
            address,
            ..Self::default()
        }
    }

    /// Match the protocol settings of a source configuration
    #[must_use]
    pub fn matching(source: &SyncConfig, address: u8) -> Self {
        Self {
            address,
            protocol_variant: source.protocol_variant,
            time_unit: source.time_unit,
            correction_mode: source.correction_mode,
            max_acceptable_offset: source.max_acceptable_offset,
            validation_enabled: source.validation_enabled,
            ..Self::default()
        }
    }

    /// Check every field for a usable value
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` naming the first bad field
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_acceptable_offset == Some(0) {
            return Err(ConfigError::Invalid {
                field: "max_acceptable_offset",
                reason: "must be non-zero".to_string(),
            });
        }
        Ok(())
    }

    /// Effective report identifier
    #[must_use]
    pub fn identifier(&self) -> u32 {
        self.identifier
            .unwrap_or_else(|| report_identifier(self.address))
    }

    /// Effective offset acceptance limit in `time_unit`
    #[must_use]
    pub fn max_acceptable_offset(&self) -> u64 {
        self.max_acceptable_offset
            .unwrap_or_else(|| self.time_unit.default_max_offset())
    }
}
