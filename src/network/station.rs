use serde::{Deserialize, Serialize};

use crate::core::{Error, Payload, Result, StationId, Word, NIL};

/// Send and listen counters of a physical station
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Energy {
    /// Successful broadcasts
    pub sends: u64,
    /// Slots spent listening
    pub listens: u64,
}

impl Energy {
    /// Total energetic cost
    pub fn total(&self) -> u64 {
        self.sends + self.listens
    }
}

/// Physical device or a logical role played on behalf of one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StationRole {
    /// Owns its energy counters
    Physical,
    /// Every send and listen is charged to `host`
    Virtual { host: StationId },
}

/// Search state handed from one group member to the next during regrouping
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Handoff {
    /// Heap index of the node the search waits for, 0 once finished
    pub cursor: Word,
    /// Best rank found so far
    pub rank: Word,
    /// Group of the reference sequence being searched
    pub group: Word,
    /// Key being searched for
    pub key: Word,
}

impl Handoff {
    /// Packs the state into one 4-word payload
    pub fn to_payload(&self) -> Result<Payload> {
        Payload::from_words(&[self.cursor, self.rank, self.group, self.key])
    }

    /// Unpacks a payload produced by `to_payload`
    pub fn from_payload(payload: &Payload) -> Option<Self> {
        Some(Handoff {
            cursor: payload.get(0)?,
            rank: payload.get(1)?,
            group: payload.get(2)?,
            key: payload.get(3)?,
        })
    }
}

/// Which subsequence a station falls into while a sequence is being corrected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// Key unchanged; index among the unchanged stations
    Kept(usize),
    /// Key changed; index among the changed stations
    Moved(usize),
}

/// Protocol registers. Each protocol owns the fields it documents and
/// leaves the rest alone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registers {
    /// Current key
    pub key: Word,
    /// Key received during routing, or the replacement key of a correction
    pub new_key: Word,
    /// Count of reference elements ordered before this one
    pub rank: Word,
    /// Rank computed in the current level, not yet handed on
    pub new_rank: Word,
    /// Tree position the station waits for
    pub cursor: Word,
    /// Position in the current sequence (1-based for merging)
    pub index: Word,
    /// Position computed for the next phase
    pub new_index: Word,
    /// Group of the other sequence this element falls into, `NIL` if unknown
    pub group: Word,
    /// Leader flag: last group leader inside its gap
    pub winner: bool,
    /// Travelling search state of a regrouping round
    pub handoff: Handoff,
    /// Key the sorted sequence was built from
    pub old_key: Word,
    /// Position in the sorted sequence
    pub old_index: Word,
    /// Changed-key count of all earlier positions
    pub prefix: Word,
    /// Number of changed keys in the whole sequence
    pub changed_total: Word,
    /// Split computed by the counting sweep
    pub placement: Option<Placement>,
    /// Last changed key in its gap of the unchanged sequence
    pub last_in_gap: bool,
    /// How far an unchanged key shifts right, `NIL` until known
    pub shift: Word,
}

impl Default for Registers {
    fn default() -> Self {
        Registers {
            key: 0,
            new_key: 0,
            rank: 0,
            new_rank: 0,
            cursor: 0,
            index: 0,
            new_index: 0,
            group: NIL,
            winner: false,
            handoff: Handoff::default(),
            old_key: 0,
            old_index: 0,
            prefix: 0,
            changed_total: 0,
            placement: None,
            last_in_gap: false,
            shift: NIL,
        }
    }
}

/// A broadcast-capable entity of the network
#[derive(Debug, Clone)]
pub struct Station {
    id: StationId,
    role: StationRole,
    energy: Energy,
    /// Protocol state
    pub regs: Registers,
}

impl Station {
    /// Creates a physical station
    pub fn physical(id: StationId) -> Self {
        Station {
            id,
            role: StationRole::Physical,
            energy: Energy::default(),
            regs: Registers::default(),
        }
    }

    /// Creates a virtual station hosted by `host`
    pub fn virtual_on(id: StationId, host: StationId) -> Self {
        Station {
            id,
            role: StationRole::Virtual { host },
            energy: Energy::default(),
            regs: Registers::default(),
        }
    }

    /// Station identifier
    pub fn id(&self) -> StationId {
        self.id
    }

    /// Current role
    pub fn role(&self) -> StationRole {
        self.role
    }

    /// Whether the station owns its counters
    pub fn is_physical(&self) -> bool {
        matches!(self.role, StationRole::Physical)
    }

    /// Station whose counters this one charges
    pub fn energy_owner(&self) -> StationId {
        match self.role {
            StationRole::Physical => self.id,
            StationRole::Virtual { host } => host,
        }
    }

    /// Energy counters; always zero for a virtual station
    pub fn energy(&self) -> Energy {
        self.energy
    }

    /// Moves a virtual station to another host. Counters are untouched.
    pub(crate) fn rebind(&mut self, host: StationId) -> Result<()> {
        match &mut self.role {
            StationRole::Virtual { host: current } => {
                *current = host;
                Ok(())
            }
            StationRole::Physical => Err(Error::InvalidHost {
                station: self.id,
                host,
            }),
        }
    }

    pub(crate) fn record_send(&mut self) {
        debug_assert!(self.is_physical());
        self.energy.sends += 1;
    }

    pub(crate) fn record_listen(&mut self) {
        debug_assert!(self.is_physical());
        self.energy.listens += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_physical_station_counts() {
        let mut station = Station::physical(StationId(0));
        station.record_send();
        station.record_listen();
        station.record_listen();
        assert_eq!(station.energy(), Energy { sends: 1, listens: 2 });
        assert_eq!(station.energy().total(), 3);
        assert_eq!(station.energy_owner(), StationId(0));
    }

    #[test]
    fn test_virtual_rebinding() {
        let mut station = Station::virtual_on(StationId(7), StationId(1));
        assert!(!station.is_physical());
        assert_eq!(station.energy_owner(), StationId(1));

        station.rebind(StationId(3)).unwrap();
        assert_eq!(station.role(), StationRole::Virtual { host: StationId(3) });
        assert_eq!(station.energy(), Energy::default());
    }

    #[test]
    fn test_physical_cannot_rebind() {
        let mut station = Station::physical(StationId(2));
        let err = station.rebind(StationId(0)).unwrap_err();
        assert!(matches!(err, Error::InvalidHost { .. }));
    }

    #[test]
    fn test_handoff_payload() {
        let state = Handoff {
            cursor: 3,
            rank: 17,
            group: 2,
            key: 905,
        };
        let payload = state.to_payload().unwrap();
        assert_eq!(payload.len(), 4);
        assert_eq!(Handoff::from_payload(&payload), Some(state));
        assert_eq!(Handoff::from_payload(&Payload::word(1)), None);
    }
}
