//! Simulated single-hop radio network
//!
//! This module owns the whole mutable simulation state: the shared channel,
//! the global slot clock and the arena of stations. Protocols receive the
//! [`Network`] by mutable reference and drive it slot by slot.

mod channel;
mod clock;
mod report;
mod station;

pub use self::channel::Channel;
pub use self::clock::Clock;
pub use self::report::CostReport;
pub use self::station::{Energy, Handoff, Placement, Registers, Station, StationRole};

use std::ops::{Index, IndexMut};

use tracing::{debug, trace};

use crate::core::{Config, Error, Payload, Result, StationId, Word};

/// Channel, clock and stations of one simulation run
#[derive(Debug)]
pub struct Network {
    config: Config,
    channel: Channel,
    clock: Clock,
    stations: Vec<Station>,
    busy_slots: u64,
}

impl Network {
    /// Creates a network with `config.station_count` physical stations
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let stations = (0..config.station_count)
            .map(|i| Station::physical(StationId(i)))
            .collect();
        debug!(stations = config.station_count, strategy = ?config.strategy, "network created");
        Ok(Network {
            config,
            channel: Channel::new(),
            clock: Clock::new(),
            stations,
            busy_slots: 0,
        })
    }

    /// Creates a network of `n` physical stations with default settings
    pub fn with_stations(n: usize) -> Result<Self> {
        Network::new(Config::with_stations(n))
    }

    /// Run configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Slots elapsed since the network was created
    pub fn clock(&self) -> u64 {
        self.clock.now()
    }

    /// Elapsed slots that carried a broadcast
    pub fn busy_slots(&self) -> u64 {
        self.busy_slots
    }

    /// The shared channel
    pub fn channel(&self) -> &Channel {
        &self.channel
    }

    /// Number of stations, physical and virtual
    pub fn len(&self) -> usize {
        self.stations.len()
    }

    /// Whether the network holds no station
    pub fn is_empty(&self) -> bool {
        self.stations.is_empty()
    }

    /// All stations in creation order
    pub fn stations(&self) -> &[Station] {
        &self.stations
    }

    /// Identifiers of the physical stations
    pub fn physical_ids(&self) -> Vec<StationId> {
        self.stations
            .iter()
            .filter(|s| s.is_physical())
            .map(|s| s.id())
            .collect()
    }

    /// Adds one physical station
    pub fn add_station(&mut self) -> StationId {
        let id = StationId(self.stations.len());
        self.stations.push(Station::physical(id));
        id
    }

    /// Adds a virtual station whose energy is charged to `host`
    pub fn attach_virtual(&mut self, host: StationId) -> Result<StationId> {
        let id = StationId(self.stations.len());
        self.ensure_physical(id, host)?;
        self.stations.push(Station::virtual_on(id, host));
        trace!(%id, %host, "virtual station attached");
        Ok(id)
    }

    /// Moves virtual station `station` to a new physical `host`
    pub fn rebind(&mut self, station: StationId, host: StationId) -> Result<()> {
        self.ensure_physical(station, host)?;
        self.station_mut(station)?.rebind(host)
    }

    /// Looks up a station
    pub fn station(&self, id: StationId) -> Result<&Station> {
        self.stations.get(id.0).ok_or(Error::UnknownStation(id))
    }

    /// Looks up a station for mutation
    pub fn station_mut(&mut self, id: StationId) -> Result<&mut Station> {
        self.stations.get_mut(id.0).ok_or(Error::UnknownStation(id))
    }

    /// Fails with `UnknownStation` for the first id this network does not hold
    pub fn check_ids(&self, ids: &[StationId]) -> Result<()> {
        match ids.iter().find(|id| id.0 >= self.stations.len()) {
            Some(id) => Err(Error::UnknownStation(*id)),
            None => Ok(()),
        }
    }

    /// Broadcasts `payload` from `id` in the current slot.
    ///
    /// The send is charged to the station's physical owner once the channel
    /// accepts it; collisions and invalid payloads are returned unchanged.
    pub fn send(&mut self, id: StationId, payload: Payload) -> Result<()> {
        let owner = self.owner_of(id)?;
        let slot = self.clock.now();
        self.channel.broadcast(slot, id, payload)?;
        self.stations[owner.0].record_send();
        Ok(())
    }

    /// Listens on behalf of `id` and returns what is on air, if anything
    pub fn listen(&mut self, id: StationId) -> Result<Option<Payload>> {
        let owner = self.owner_of(id)?;
        self.stations[owner.0].record_listen();
        Ok(self.channel.receive().cloned())
    }

    /// Ends the current slot: clears the channel and advances the clock
    pub fn advance_slot(&mut self) {
        if let Some(holder) = self.channel.holder() {
            self.busy_slots += 1;
            trace!(slot = self.clock.now(), %holder, "slot closed");
        }
        self.channel.reset();
        self.clock.tick();
    }

    /// Stores `keys[i]` as the key of `ids[i]`
    pub fn seed_keys(&mut self, ids: &[StationId], keys: &[Word]) -> Result<()> {
        if ids.len() != keys.len() {
            return Err(Error::invalid_input(format!(
                "{} stations but {} keys",
                ids.len(),
                keys.len()
            )));
        }
        self.check_ids(ids)?;
        for (id, key) in ids.iter().zip(keys) {
            self.stations[id.0].regs.key = *key;
        }
        Ok(())
    }

    /// Current keys of `ids`, in order
    pub fn keys(&self, ids: &[StationId]) -> Vec<Word> {
        ids.iter()
            .filter_map(|id| self.stations.get(id.0))
            .map(|s| s.regs.key)
            .collect()
    }

    /// Measures clock and energy over all physical stations
    pub fn report(&self) -> CostReport {
        CostReport::measure(self, &self.physical_ids())
    }

    fn owner_of(&self, id: StationId) -> Result<StationId> {
        let owner = self.station(id)?.energy_owner();
        match self.station(owner)?.role() {
            StationRole::Physical => Ok(owner),
            StationRole::Virtual { .. } => Err(Error::InvalidHost {
                station: id,
                host: owner,
            }),
        }
    }

    fn ensure_physical(&self, station: StationId, host: StationId) -> Result<()> {
        if self.station(host)?.is_physical() {
            Ok(())
        } else {
            Err(Error::InvalidHost { station, host })
        }
    }
}

impl Index<StationId> for Network {
    type Output = Station;

    fn index(&self, id: StationId) -> &Station {
        &self.stations[id.0]
    }
}

impl IndexMut<StationId> for Network {
    fn index_mut(&mut self, id: StationId) -> &mut Station {
        &mut self.stations[id.0]
    }
}
