use serde::{Deserialize, Serialize};

use super::Network;
use crate::core::{Error, Result, StationId};
use crate::util::checksum;

/// Measured cost of a run, read back for external bound checks
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostReport {
    /// Slots elapsed
    pub clock: u64,
    /// Slots that carried a broadcast
    pub busy_slots: u64,
    /// Stations measured
    pub stations: usize,
    /// Largest send count of a single station
    pub max_sends: u64,
    /// Largest listen count of a single station
    pub max_listens: u64,
    /// Largest send plus listen count of a single station
    pub max_energy: u64,
    /// Wrapping sum of the measured stations' keys
    pub key_checksum: u64,
}

impl CostReport {
    /// Measures `ids` on `network`. Virtual stations contribute zero energy.
    pub fn measure(network: &Network, ids: &[StationId]) -> Self {
        let mut report = CostReport {
            clock: network.clock(),
            busy_slots: network.busy_slots(),
            stations: 0,
            max_sends: 0,
            max_listens: 0,
            max_energy: 0,
            key_checksum: checksum(&network.keys(ids)),
        };

        for station in ids.iter().filter_map(|id| network.station(*id).ok()) {
            let energy = station.energy();
            report.stations += 1;
            report.max_sends = report.max_sends.max(energy.sends);
            report.max_listens = report.max_listens.max(energy.listens);
            report.max_energy = report.max_energy.max(energy.total());
        }

        report
    }

    /// Encodes the report for an external validator
    pub fn encode(&self) -> Result<Vec<u8>> {
        bincode::serialize(self)
            .map_err(|e| Error::codec(format!("Failed to serialize report: {}", e)))
    }

    /// Decodes a report produced by `encode`
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        bincode::deserialize(bytes)
            .map_err(|e| Error::codec(format!("Failed to deserialize report: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Payload;

    #[test]
    fn test_measure_takes_maxima() {
        let mut network = Network::with_stations(3).unwrap();
        let ids = network.physical_ids();
        network.seed_keys(&ids, &[4, 5, 6]).unwrap();

        network.send(ids[0], Payload::word(1)).unwrap();
        network.listen(ids[1]).unwrap();
        network.listen(ids[0]).unwrap();
        network.advance_slot();
        network.listen(ids[1]).unwrap();
        network.advance_slot();

        let report = network.report();
        assert_eq!(report.clock, 2);
        assert_eq!(report.busy_slots, 1);
        assert_eq!(report.stations, 3);
        assert_eq!(report.max_sends, 1);
        assert_eq!(report.max_listens, 2);
        assert_eq!(report.max_energy, 2);
        assert_eq!(report.key_checksum, 15);
    }

    #[test]
    fn test_report_codec() {
        let network = Network::with_stations(2).unwrap();
        let report = network.report();
        let bytes = report.encode().unwrap();
        assert_eq!(CostReport::decode(&bytes).unwrap(), report);
        assert!(matches!(CostReport::decode(&[1]), Err(Error::Codec(_))));
    }
}
