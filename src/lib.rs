//! Radio Sim: slot-synchronous single-hop radio network simulator
//!
//! This library simulates stations sharing one collision-detecting broadcast
//! channel and runs energy-bounded ranking, merging, sorting and correction
//! protocols on them. Every broadcast and every listen is charged to a
//! physical station, so a run reports both its time in slots and the energy
//! each station spent.
//!
//! ```no_run
//! use radio_sim::{merge_sort, Config, Network};
//!
//! let mut network = Network::new(Config::with_stations(8))?;
//! let ids = network.physical_ids();
//! network.seed_keys(&ids, &[6, 2, 7, 1, 8, 3, 5, 4])?;
//! merge_sort(&mut network, &ids)?;
//! assert_eq!(network.keys(&ids), vec![1, 2, 3, 4, 5, 6, 7, 8]);
//! # Ok::<(), radio_sim::Error>(())
//! ```
pub mod core;
pub mod network;
pub mod protocol;
pub mod tree;
pub mod util;

// Re-export commonly used items
pub use crate::core::{Config, Error, MergeStrategy, Payload, Result, StationId, TieBreak, Word};
pub use crate::network::{CostReport, Network};
pub use crate::protocol::{merge, merge_sort, rank, Correction};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
