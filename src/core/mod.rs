//! Core types for the radio network simulator
//!
//! This module contains the error taxonomy, station identifiers, channel
//! payloads and run configuration shared by every other module.

pub mod error;
pub mod types;

pub use self::error::{Error, Result};
pub use self::types::{
    Config,
    MergeStrategy,
    Payload,
    StationId,
    TieBreak,
    Word,
    MAX_PAYLOAD_WORDS,
    MAX_STATIONS,
    NIL,
};
