//! Protocol implementation module
//!
//! Ranking, merging, sorting and correction protocols. Every protocol drives
//! a [`Network`](crate::network::Network) slot by slot: in each slot at most
//! one station sends, any number listen, and the clock advances. Protocols
//! never read another station's registers directly; everything a station
//! learns arrives through the channel.

mod activation;
pub mod correction;
pub mod merge;
pub mod rank;
pub mod regroup;

pub use self::activation::ActivationQueue;
pub use self::correction::{level_rank, Correction, CorrectionSummary};
pub use self::merge::{merge, merge_sort, merge_sort_with, merge_with};
pub use self::rank::rank;
pub use self::regroup::{rank_iterated, rank_regrouped, regroup};

use crate::core::{Error, Result, StationId, Word};

/// Reads a register value as a table index below `limit`
pub(crate) fn index_in(
    context: &'static str,
    station: StationId,
    value: Word,
    limit: usize,
) -> Result<usize> {
    match usize::try_from(value) {
        Ok(index) if index < limit => Ok(index),
        _ => Err(Error::OutOfRange {
            context,
            station,
            value,
            limit,
        }),
    }
}
