use tracing::{debug, instrument};

use super::index_in;
use super::rank::rank;
use super::regroup::{rank_iterated, rank_regrouped};
use crate::core::{Error, MergeStrategy, Payload, Result, StationId, TieBreak, Word};
use crate::network::Network;
use crate::util::{ensure_permutation, ensure_sorted};

/// Merges the sorted sequences `a` and `b` with the network's configured strategy
pub fn merge(network: &mut Network, a: &[StationId], b: &[StationId]) -> Result<()> {
    let strategy = network.config().strategy;
    merge_with(network, a, b, strategy)
}

/// Merges the sorted sequences `a` and `b` in place.
///
/// Afterwards the stations of `a` followed by those of `b` hold the merged
/// keys in non-decreasing order. Equal keys from `a` land before those from
/// `b`.
#[instrument(level = "debug", skip_all, fields(a = a.len(), b = b.len(), strategy = ?strategy))]
pub fn merge_with(
    network: &mut Network,
    a: &[StationId],
    b: &[StationId],
    strategy: MergeStrategy,
) -> Result<()> {
    network.check_ids(a)?;
    network.check_ids(b)?;
    let merged: Vec<StationId> = a.iter().chain(b).copied().collect();
    let input = network.keys(&merged);

    merge_runs(network, a, b, strategy)?;

    if network.config().verify_postconditions {
        let output = network.keys(&merged);
        ensure_sorted("merge output sorted", &output)?;
        ensure_permutation("merge output permutes input", &input, &output)?;
    }
    Ok(())
}

/// Sorts the keys held by `ids` with the network's configured strategy
pub fn merge_sort(network: &mut Network, ids: &[StationId]) -> Result<()> {
    let strategy = network.config().strategy;
    merge_sort_with(network, ids, strategy)
}

/// Sorts the keys held by `ids` by recursive halving and merging.
///
/// Clock and energy accumulate across every merge of the recursion. The
/// regrouping strategies need a power-of-two length.
#[instrument(level = "debug", skip_all, fields(n = ids.len(), strategy = ?strategy))]
pub fn merge_sort_with(
    network: &mut Network,
    ids: &[StationId],
    strategy: MergeStrategy,
) -> Result<()> {
    network.check_ids(ids)?;
    if strategy.needs_equal_halves() && !ids.is_empty() && !ids.len().is_power_of_two() {
        return Err(Error::invalid_input(format!(
            "{:?} merge-sort needs a power-of-two length, got {}",
            strategy,
            ids.len()
        )));
    }

    let input = network.keys(ids);
    sort_range(network, ids, strategy)?;

    if network.config().verify_postconditions {
        let output = network.keys(ids);
        ensure_sorted("sort output sorted", &output)?;
        ensure_permutation("sort output permutes input", &input, &output)?;
    }
    debug!(clock = network.clock(), "merge sort complete");
    Ok(())
}

fn sort_range(network: &mut Network, ids: &[StationId], strategy: MergeStrategy) -> Result<()> {
    if ids.len() < 2 {
        return Ok(());
    }
    let (left, right) = ids.split_at(ids.len() / 2);
    sort_range(network, left, strategy)?;
    sort_range(network, right, strategy)?;
    merge_runs(network, left, right, strategy)
}

/// Ranks both runs against each other, then routes every key to its position
fn merge_runs(
    network: &mut Network,
    a: &[StationId],
    b: &[StationId],
    strategy: MergeStrategy,
) -> Result<()> {
    if strategy.needs_equal_halves() && a.len() != b.len() {
        return Err(Error::invalid_input(format!(
            "{:?} merge needs equal lengths, got {} and {}",
            strategy,
            a.len(),
            b.len()
        )));
    }

    match strategy {
        MergeStrategy::Tournament => {
            rank(network, a, b, TieBreak::Before)?;
            rank(network, b, a, TieBreak::After)?;
        }
        MergeStrategy::Regrouped => {
            rank_regrouped(network, a, b, TieBreak::Before)?;
            rank_regrouped(network, b, a, TieBreak::After)?;
        }
        MergeStrategy::Iterated => rank_iterated(network, a, b, TieBreak::Before)?,
    }

    for run in [a, b] {
        for (i, id) in run.iter().enumerate() {
            let regs = &mut network[*id].regs;
            regs.index = i as Word + 1 + regs.rank;
        }
    }

    let merged: Vec<StationId> = a.iter().chain(b).copied().collect();
    route(network, &merged)
}

/// Moves every key to the station at its 1-based `index` register.
///
/// One slot per position; exactly one station must claim each position.
pub(crate) fn route(network: &mut Network, stations: &[StationId]) -> Result<()> {
    let n = stations.len();
    let mut senders: Vec<Option<StationId>> = vec![None; n];
    for id in stations {
        let position = index_in("routing index", *id, network[*id].regs.index - 1, n)?;
        if let Some(first) = senders[position] {
            return Err(Error::DuplicateSender {
                position: position + 1,
                first,
                second: *id,
            });
        }
        senders[position] = Some(*id);
    }

    for (position, receiver) in stations.iter().enumerate() {
        let slot = network.clock();
        let missing = Error::MissingSender {
            slot,
            position: position + 1,
        };
        let sender = senders[position].ok_or_else(|| missing.clone())?;
        let key = network[sender].regs.key;
        network.send(sender, Payload::word(key))?;
        let heard = network.listen(*receiver)?.ok_or(missing)?;
        network[*receiver].regs.new_key = heard.first();
        network.advance_slot();
    }

    for id in stations {
        let regs = &mut network[*id].regs;
        regs.key = regs.new_key;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Config;
    use crate::network::CostReport;
    use proptest::prelude::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn network_with(keys: &[Word], strategy: MergeStrategy) -> (Network, Vec<StationId>) {
        let config = Config::with_stations(keys.len()).strategy(strategy);
        let mut network = Network::new(config).unwrap();
        let ids = network.physical_ids();
        network.seed_keys(&ids, keys).unwrap();
        (network, ids)
    }

    fn random_keys(seed: u64, n: usize, range: Word) -> Vec<Word> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..n).map(|_| rng.gen_range(0..range)).collect()
    }

    fn sorted(keys: &[Word]) -> Vec<Word> {
        let mut keys = keys.to_vec();
        keys.sort_unstable();
        keys
    }

    #[test]
    fn test_merge_two_runs() {
        let (mut network, ids) = network_with(&[1, 4, 9, 2, 3, 10, 11], MergeStrategy::Tournament);
        let (a, b) = ids.split_at(3);
        merge(&mut network, a, b).unwrap();
        assert_eq!(network.keys(&ids), vec![1, 2, 3, 4, 9, 10, 11]);
        // Two ranks and one routing pass
        assert_eq!(network.clock(), 4 + 3 + 7);
    }

    #[test]
    fn test_merge_keeps_duplicates_stable() {
        let (mut network, ids) = network_with(&[5, 5, 7, 5, 6, 7], MergeStrategy::Tournament);
        let (a, b) = ids.split_at(3);
        merge(&mut network, a, b).unwrap();
        assert_eq!(network.keys(&ids), vec![5, 5, 5, 6, 7, 7]);
        let positions: Vec<Word> = ids.iter().map(|id| network[*id].regs.index).collect();
        assert_eq!(positions, vec![1, 2, 5, 3, 4, 6]);
    }

    #[test]
    fn test_merge_sort_clock_and_energy() {
        let (mut network, ids) = network_with(&[6, 2, 7, 1, 8, 3, 5, 4], MergeStrategy::Tournament);
        merge_sort(&mut network, &ids).unwrap();
        assert_eq!(network.keys(&ids), vec![1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(network.clock(), 48);

        let (mut network, ids) = network_with(&[9, 3], MergeStrategy::Tournament);
        merge_sort(&mut network, &ids).unwrap();
        for id in &ids {
            assert_eq!(network[*id].energy().total(), 4);
        }
    }

    #[test]
    fn test_merge_sort_clock_grows_as_n_log_n() {
        for k in 1..=6u32 {
            let n = 1usize << k;
            let (mut network, ids) = network_with(&random_keys(k as u64, n, 1000), MergeStrategy::Tournament);
            merge_sort(&mut network, &ids).unwrap();
            assert_eq!(network.clock(), 2 * n as u64 * k as u64);
        }
    }

    #[test]
    fn test_every_strategy_sorts() {
        for strategy in [
            MergeStrategy::Tournament,
            MergeStrategy::Regrouped,
            MergeStrategy::Iterated,
        ] {
            for n in [1usize, 2, 4, 8, 16, 64, 128] {
                for (seed, range) in [(1, 1_000_000), (2, 5)] {
                    let keys = random_keys(seed, n, range);
                    let (mut network, ids) = network_with(&keys, strategy);
                    merge_sort(&mut network, &ids).unwrap();
                    assert_eq!(network.keys(&ids), sorted(&keys), "{:?} n = {}", strategy, n);
                }
            }
        }
    }

    #[test]
    fn test_runs_are_reproducible() {
        let keys = random_keys(99, 32, 1_000_000);
        let run = |strategy| -> CostReport {
            let (mut network, ids) = network_with(&keys, strategy);
            merge_sort(&mut network, &ids).unwrap();
            network.report()
        };
        for strategy in [MergeStrategy::Regrouped, MergeStrategy::Iterated] {
            let first = run(strategy);
            assert_eq!(first, run(strategy));
            assert!(first.max_energy > 0);
        }
    }

    #[test]
    fn test_regrouping_needs_power_of_two() {
        let mut network = Network::with_stations(6).unwrap();
        let ids = network.physical_ids();
        let err = merge_sort_with(&mut network, &ids, MergeStrategy::Regrouped).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));

        let err = merge_with(&mut network, &ids[..2], &ids[2..], MergeStrategy::Iterated).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn test_route_detects_duplicate_position() {
        let mut network = Network::with_stations(3).unwrap();
        let ids = network.physical_ids();
        for (id, index) in ids.iter().zip([1, 1, 3]) {
            network[*id].regs.index = index;
        }
        let err = route(&mut network, &ids).unwrap_err();
        assert!(matches!(err, Error::DuplicateSender { position: 1, .. }));

        network[ids[1]].regs.index = 4;
        let err = route(&mut network, &ids).unwrap_err();
        assert!(matches!(err, Error::OutOfRange { value: 3, limit: 3, .. }));
    }

    proptest! {
        #[test]
        fn prop_tournament_merge_sorts_any_length(
            mut a in proptest::collection::vec(0i64..1000, 0..30),
            mut b in proptest::collection::vec(0i64..1000, 0..30),
        ) {
            a.sort_unstable();
            b.sort_unstable();
            let keys: Vec<Word> = a.iter().chain(&b).copied().collect();
            let (mut network, ids) = network_with(&keys, MergeStrategy::Tournament);
            let (left, right) = ids.split_at(a.len());
            merge(&mut network, left, right).unwrap();
            prop_assert_eq!(network.keys(&ids), sorted(&keys));
            prop_assert_eq!(network.clock(), 2 * keys.len() as u64);
        }
    }
}
