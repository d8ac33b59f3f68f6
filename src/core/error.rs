use thiserror::Error;

use super::types::{Payload, StationId, Word};

/// Faults raised by the simulator.
///
/// Every variant aborts the run at the point of detection. Collisions, bad
/// payloads and schedule mismatches always point at a flaw in the protocol
/// encoding, so nothing here is retried or recovered locally.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("Collision in slot {slot}: {holder} already broadcast, {sender} tried to send {payload}")]
    Collision {
        slot: u64,
        holder: StationId,
        sender: StationId,
        payload: Payload,
    },

    #[error("Invalid payload in slot {slot} from {sender}: {payload}")]
    InvalidPayload {
        slot: u64,
        sender: StationId,
        payload: Payload,
    },

    #[error("Schedule inconsistency in slot {slot} ({station:?}): {detail}")]
    ScheduleInconsistency {
        slot: u64,
        station: Option<StationId>,
        detail: String,
    },

    /// `position` counts from 1 within the table being filled
    #[error("No sender for position {position} in slot {slot}")]
    MissingSender { slot: u64, position: usize },

    /// `position` counts from 1, as for `MissingSender`
    #[error("Position {position} claimed by both {first} and {second}")]
    DuplicateSender {
        position: usize,
        first: StationId,
        second: StationId,
    },

    #[error("Postcondition violated ({check}): {detail}")]
    PostconditionViolation { check: &'static str, detail: String },

    #[error("Unknown station {0}")]
    UnknownStation(StationId),

    #[error("{station} cannot be hosted by {host}: host is not physical")]
    InvalidHost { station: StationId, host: StationId },

    #[error("{context}: value {value} held by {station} is outside 0..{limit}")]
    OutOfRange {
        context: &'static str,
        station: StationId,
        value: Word,
        limit: usize,
    },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Codec error: {0}")]
    Codec(String),
}

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Creates a schedule inconsistency for the given slot
    pub fn schedule(slot: u64, station: Option<StationId>, detail: impl Into<String>) -> Self {
        Error::ScheduleInconsistency {
            slot,
            station,
            detail: detail.into(),
        }
    }

    /// Creates a postcondition violation
    pub fn postcondition(check: &'static str, detail: impl Into<String>) -> Self {
        Error::PostconditionViolation {
            check,
            detail: detail.into(),
        }
    }

    /// Creates a new invalid input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Error::InvalidInput(msg.into())
    }

    /// Creates a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// Creates a new codec error
    pub fn codec(msg: impl Into<String>) -> Self {
        Error::Codec(msg.into())
    }

    /// Whether this fault originated on the channel itself
    pub fn is_channel_fault(&self) -> bool {
        matches!(self, Error::Collision { .. } | Error::InvalidPayload { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = Error::invalid_input("odd length");
        assert!(matches!(err, Error::InvalidInput(_)));
        assert_eq!(err.to_string(), "Invalid input: odd length");
    }

    #[test]
    fn test_collision_message_names_both_stations() {
        let err = Error::Collision {
            slot: 7,
            holder: StationId(1),
            sender: StationId(4),
            payload: Payload::word(12),
        };
        let text = err.to_string();
        assert!(text.contains("slot 7"));
        assert!(text.contains("#1"));
        assert!(text.contains("#4"));
        assert!(text.contains("(12)"));
        assert!(err.is_channel_fault());
    }

    #[test]
    fn test_schedule_helper() {
        let err = Error::schedule(3, Some(StationId(2)), "bad sender");
        match err {
            Error::ScheduleInconsistency { slot, station, detail } => {
                assert_eq!(slot, 3);
                assert_eq!(station, Some(StationId(2)));
                assert_eq!(detail, "bad sender");
            }
            _ => panic!("wrong variant"),
        }
        assert!(!Error::config("x").is_channel_fault());
    }
}
