//! Core types module

mod config;
mod time;


pub use config::{
    BusSettings, CorrectionMode, FollowerConfig, MAX_FOLLOWERS, ProtocolVariant, REPORT_ID_BASE,
    SyncConfig, SyncConfigBuilder, report_identifier,
};
pub(crate) use config::check_clock_unit;
pub use time::{Offset, TimeUnit, Timestamp};
