use std::fmt;

use arrayvec::ArrayVec;
use serde::{Deserialize, Serialize};

use super::error::{Error, Result};

/// A single integer carried by the channel.
pub type Word = i64;

/// Register value meaning "not set". Broadcasting it is rejected by the channel.
pub const NIL: Word = -1;

/// Largest tuple the channel carries in one slot.
pub const MAX_PAYLOAD_WORDS: usize = 4;

/// Upper bound on stations a single network may hold
pub const MAX_STATIONS: usize = 1 << 24;

/// Index of a station within its network
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StationId(pub usize);

impl StationId {
    /// Returns the raw index
    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for StationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One slot's worth of channel traffic: a short tuple of words.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Payload(ArrayVec<Word, MAX_PAYLOAD_WORDS>);

impl Payload {
    /// Creates a one-word payload
    pub fn word(value: Word) -> Self {
        let mut words = ArrayVec::new();
        words.push(value);
        Payload(words)
    }

    /// Creates a payload from up to `MAX_PAYLOAD_WORDS` words
    pub fn from_words(words: &[Word]) -> Result<Self> {
        if words.is_empty() {
            return Err(Error::invalid_input("empty payload"));
        }
        let words = ArrayVec::try_from(words).map_err(|_| {
            Error::invalid_input(format!(
                "payload of {} words exceeds {}",
                words.len(),
                MAX_PAYLOAD_WORDS
            ))
        })?;
        Ok(Payload(words))
    }

    /// First word of the tuple
    pub fn first(&self) -> Word {
        self.0.first().copied().unwrap_or(NIL)
    }

    /// Word at `index`, if present
    pub fn get(&self, index: usize) -> Option<Word> {
        self.0.get(index).copied()
    }

    /// All words of the tuple
    pub fn words(&self) -> &[Word] {
        &self.0
    }

    /// Number of words
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the tuple has no words
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether the payload may go on air: non-empty and non-negative
    pub fn is_valid(&self) -> bool {
        !self.0.is_empty() && self.0.iter().all(|w| *w >= 0)
    }
}

impl From<Word> for Payload {
    fn from(value: Word) -> Self {
        Payload::word(value)
    }
}

impl fmt::Display for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, w) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", w)?;
        }
        write!(f, ")")
    }
}

/// Where a ranked element goes relative to reference elements with an equal key.
///
/// `Before` counts strictly smaller reference keys, `After` counts smaller or
/// equal ones. Ranking A in B with `Before` and B in A with `After` places
/// every element of A ahead of equal elements of B, which keeps merged
/// positions distinct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TieBreak {
    Before,
    After,
}

impl TieBreak {
    /// Whether an element holding `own` sorts after a reference holding `heard`
    pub fn places_after(self, own: Word, heard: Word) -> bool {
        match self {
            TieBreak::Before => own > heard,
            TieBreak::After => own >= heard,
        }
    }

    /// The policy the reference sequence must use to stay consistent
    pub fn reversed(self) -> Self {
        match self {
            TieBreak::Before => TieBreak::After,
            TieBreak::After => TieBreak::Before,
        }
    }
}

impl Default for TieBreak {
    fn default() -> Self {
        TieBreak::Before
    }
}

/// Ranking scheme used by merge and merge-sort
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MergeStrategy {
    /// Lock-step binary searches over the whole reference tree
    Tournament,
    /// One regrouping round, then searches inside small groups
    Regrouped,
    /// Regrouping iterated until groups shrink to pairs
    Iterated,
}

impl MergeStrategy {
    /// Whether both merged sequences must have the same length
    pub fn needs_equal_halves(&self) -> bool {
        !matches!(self, MergeStrategy::Tournament)
    }
}

impl Default for MergeStrategy {
    fn default() -> Self {
        MergeStrategy::Tournament
    }
}

/// Configuration for a simulated network
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Physical stations created up front
    pub station_count: usize,
    /// Strategy used by `merge` and `merge_sort`
    pub strategy: MergeStrategy,
    /// Check sortedness and permutation after every merge, sort and correction
    pub verify_postconditions: bool,
}

impl Config {
    /// Creates a configuration with `station_count` physical stations
    pub fn with_stations(station_count: usize) -> Self {
        Config {
            station_count,
            ..Default::default()
        }
    }

    /// Selects the merge strategy
    pub fn strategy(mut self, strategy: MergeStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Validates the configuration
    pub fn validate(&self) -> Result<()> {
        if self.station_count > MAX_STATIONS {
            return Err(Error::config(format!(
                "station count {} exceeds {}",
                self.station_count, MAX_STATIONS
            )));
        }
        if self.strategy.needs_equal_halves()
            && self.station_count > 0
            && !self.station_count.is_power_of_two()
        {
            return Err(Error::config(format!(
                "{:?} merge-sort needs a power-of-two station count, got {}",
                self.strategy, self.station_count
            )));
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            station_count: 0,
            strategy: MergeStrategy::default(),
            verify_postconditions: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_creation() {
        let p = Payload::from_words(&[3, 1, 4, 1]).unwrap();
        assert_eq!(p.len(), 4);
        assert_eq!(p.first(), 3);
        assert_eq!(p.get(2), Some(4));
        assert_eq!(p.get(4), None);
        assert_eq!(p.to_string(), "(3, 1, 4, 1)");
        assert!(p.is_valid());
    }

    #[test]
    fn test_payload_limits() {
        assert!(Payload::from_words(&[]).is_err());
        assert!(Payload::from_words(&[1, 2, 3, 4, 5]).is_err());
        assert!(!Payload::word(NIL).is_valid());
        assert!(!Payload::from_words(&[0, -3]).unwrap().is_valid());
    }

    #[test]
    fn test_tie_break() {
        assert!(!TieBreak::Before.places_after(5, 5));
        assert!(TieBreak::After.places_after(5, 5));
        assert!(TieBreak::Before.places_after(6, 5));
        assert!(!TieBreak::After.places_after(4, 5));
        assert_eq!(TieBreak::Before.reversed(), TieBreak::After);
        assert_eq!(TieBreak::After.reversed().reversed(), TieBreak::After);
    }

    #[test]
    fn test_config_validation() {
        assert!(Config::with_stations(12).validate().is_ok());
        assert!(Config::with_stations(16)
            .strategy(MergeStrategy::Iterated)
            .validate()
            .is_ok());
        let err = Config::with_stations(12)
            .strategy(MergeStrategy::Regrouped)
            .validate()
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(Config::with_stations(MAX_STATIONS + 1).validate().is_err());
    }

    #[test]
    fn test_config_json_round_trip() {
        let config = Config::with_stations(64).strategy(MergeStrategy::Regrouped);
        let json = serde_json::to_string(&config).unwrap();
        let decoded: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, config);

        let partial: Config = serde_json::from_str(r#"{"station_count": 8}"#).unwrap();
        assert_eq!(partial.station_count, 8);
        assert!(partial.verify_postconditions);
        assert_eq!(partial.strategy, MergeStrategy::Tournament);
    }
}
