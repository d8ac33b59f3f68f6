//! Ranking by regrouping.
//!
//! A regrouping round splits one sequence into groups and lets every group
//! leader search the other sequence's groups from the previous round. The
//! search is handed from member to member after each tree level, so no
//! station listens more than once per level. Once leaders know where their
//! group falls, the other sequence learns, element by element, which group
//! it falls into. Ranking then only needs to search inside one small group.

use tracing::{debug, instrument, trace};

use super::{index_in, ActivationQueue};
use crate::core::{Error, Payload, Result, StationId, TieBreak, Word, NIL};
use crate::network::{Handoff, Network};
use crate::tree::pow2;
use crate::tree::preorder::{
    alpha,
    group_count,
    iterated_height,
    l_star,
    left_child_value,
    postorder_to_inorder_value,
    preorder_index,
    right_child_value,
};

/// Regrouping round `round` of `c1` against `d1`.
///
/// `c1` is split into `group_count(m, round)` groups of
/// `iterated_height(m, round)` members, the last group padded with stations
/// of `d1`. Each `c1` leader searches the group of `d1` it belongs to at
/// round `round - 1`, as recorded in its `group` register. Afterwards every
/// `d1` station's `group` register names the `c1` group it falls into, 0 for
/// none. Leaders keep their rank in `d1` in `rank`.
#[instrument(level = "debug", skip_all, fields(round = round, m = c1.len()))]
pub fn regroup(
    network: &mut Network,
    round: usize,
    c1: &[StationId],
    d1: &[StationId],
    tie: TieBreak,
) -> Result<()> {
    network.check_ids(c1)?;
    network.check_ids(d1)?;
    let m = c1.len();
    if m == 0 {
        return Ok(());
    }
    if round == 0 || d1.len() != m {
        return Err(Error::invalid_input(format!(
            "regroup round {} over sequences of {} and {}",
            round,
            m,
            d1.len()
        )));
    }

    let size = iterated_height(m, round);
    let groups = group_count(m, round);
    let prev_size = iterated_height(m, round - 1);
    let prev_groups = group_count(m, round - 1);

    // Member k of group j sits at position alpha(j, k) of c1 followed by d1
    let pool: Vec<StationId> = c1.iter().chain(d1).copied().collect();
    let member = |j: usize, k: usize| pool[alpha(m, round, j, k) - 1];
    let leaders: Vec<StationId> = (1..=groups).map(|j| member(j, 1)).collect();

    // Phase 1: grouped tree search, handed down one member per level
    for leader in &leaders {
        let regs = &mut network[*leader].regs;
        regs.handoff = Handoff {
            cursor: 1,
            rank: 0,
            group: regs.group,
            key: regs.key,
        };
    }

    let mut queue = ActivationQueue::new();
    for level in 1..=size {
        let width = pow2(level as u32 - 1);
        queue.reset(width * prev_groups);
        for j in 1..=groups {
            let id = member(j, level);
            let state = network[id].regs.handoff;
            if state.cursor == 0 || state.group < 1 || state.group > prev_groups as Word {
                continue;
            }
            let offset = index_in("regroup cursor", id, state.cursor - width as Word, width)?;
            queue.insert(offset * prev_groups + state.group as usize - 1, id)?;
        }

        for v in width..=(2 * width - 1).min(prev_size) {
            let x = postorder_to_inorder_value(prev_size, v);
            for g in 1..=prev_groups {
                let target = alpha(m, round - 1, g, x);
                if let Some(sender) = d1.get(target - 1).copied() {
                    let key = network[sender].regs.key;
                    network.send(sender, Payload::word(key))?;
                }

                while let Some(id) = queue.pop_one((v - width) * prev_groups + g - 1) {
                    let heard = network.listen(id)?;
                    let state = &mut network[id].regs.handoff;
                    match heard {
                        Some(msg) if tie.places_after(state.key, msg.first()) => {
                            state.cursor = preorder_index(prev_size, right_child_value(prev_size, x)) as Word;
                            state.rank = target as Word;
                        }
                        _ => {
                            state.cursor = preorder_index(prev_size, left_child_value(prev_size, x)) as Word;
                        }
                    }
                }
                network.advance_slot();
            }
        }
        queue.ensure_drained(network.clock())?;

        if level < size {
            for j in 1..=groups {
                let slot = network.clock();
                let (from, to) = (member(j, level), member(j, level + 1));
                let payload = network[from].regs.handoff.to_payload()?;
                network.send(from, payload)?;
                let state = network
                    .listen(to)?
                    .as_ref()
                    .and_then(Handoff::from_payload)
                    .ok_or_else(|| Error::schedule(slot, Some(to), "search hand-off lost"))?;
                network[to].regs.handoff = state;
                network.advance_slot();
            }
        }
    }
    trace!(round, clock = network.clock(), "grouped search finished");

    // Phase 2: leaders learn their rank; only the last leader of a gap wins
    for leader in &leaders {
        network[*leader].regs.winner = true;
    }
    for j in 1..=groups {
        let slot = network.clock();
        let tail = member(j, size);
        let found = network[tail].regs.handoff.rank;
        network.send(tail, Payload::word(found))?;

        let leader = leaders[j - 1];
        let heard = network
            .listen(leader)?
            .ok_or_else(|| Error::schedule(slot, Some(leader), "leader missed its rank"))?
            .first();
        network[leader].regs.rank = heard;

        if j > 1 {
            let previous = leaders[j - 2];
            let heard = network
                .listen(previous)?
                .ok_or_else(|| Error::schedule(slot, Some(previous), "leader missed its successor"))?
                .first();
            if network[previous].regs.rank == heard {
                network[previous].regs.winner = false;
            }
        }
        network.advance_slot();
    }

    // Phase 3: each winner tells the first d1 element after its gap
    let mut announcers: Vec<Option<(StationId, usize)>> = vec![None; m];
    for (j, leader) in leaders.iter().enumerate() {
        let regs = &network[*leader].regs;
        if !regs.winner {
            continue;
        }
        if let Ok(position) = usize::try_from(regs.rank) {
            if position < m {
                if let Some((first, _)) = announcers[position] {
                    return Err(Error::DuplicateSender {
                        position: position + 1,
                        first,
                        second: *leader,
                    });
                }
                announcers[position] = Some((*leader, j + 1));
            }
        }
    }

    for id in d1 {
        network[*id].regs.group = NIL;
    }
    network[d1[0]].regs.group = 0;
    for (position, target) in d1.iter().enumerate() {
        if let Some((leader, j)) = announcers[position] {
            network.send(leader, Payload::word(j as Word))?;
        }
        if let Some(msg) = network.listen(*target)? {
            network[*target].regs.group = msg.first();
        }
        network.advance_slot();
    }

    // Phase 4: groups flow forward to elements nobody announced to
    for pair in d1.windows(2) {
        let slot = network.clock();
        let (from, to) = (pair[0], pair[1]);
        let group = network[from].regs.group;
        network.send(from, Payload::word(group))?;
        if network[to].regs.group == NIL {
            let heard = network
                .listen(to)?
                .ok_or_else(|| Error::schedule(slot, Some(to), "group propagation lost"))?;
            network[to].regs.group = heard.first();
        }
        network.advance_slot();
    }

    Ok(())
}

/// Ranks `a` in `b` after one regrouping round of `b` against `a`.
///
/// Both sequences must have the same length. Each element of `a` searches only
/// the group of `b` it was assigned to.
#[instrument(level = "debug", skip_all, fields(m = a.len(), tie = ?tie))]
pub fn rank_regrouped(
    network: &mut Network,
    a: &[StationId],
    b: &[StationId],
    tie: TieBreak,
) -> Result<()> {
    check_equal(network, a, b)?;
    let m = a.len();
    if m == 0 {
        return Ok(());
    }

    for id in b {
        network[*id].regs.group = 1;
    }
    regroup(network, 1, b, a, tie.reversed())?;

    let size = iterated_height(m, 1);
    let groups = group_count(m, 1);
    let mut members: Vec<Vec<StationId>> = vec![Vec::new(); groups];
    for id in a {
        let regs = &mut network[*id].regs;
        regs.rank = 0;
        regs.cursor = 1;
        if let Ok(g) = usize::try_from(regs.group) {
            if (1..=groups).contains(&g) {
                members[g - 1].push(*id);
            }
        }
    }

    let mut queue = ActivationQueue::new();
    for (g, searchers) in members.iter().enumerate() {
        queue.reset(size);
        for id in searchers {
            queue.insert(0, *id)?;
        }

        for k in 1..=size {
            let x = postorder_to_inorder_value(size, k);
            let position = g * size + x;
            if let Some(sender) = b.get(position - 1).copied() {
                let key = network[sender].regs.key;
                network.send(sender, Payload::word(key))?;
            }

            while let Some(id) = queue.pop_one(k - 1) {
                let heard = network.listen(id)?;
                let regs = &mut network[id].regs;
                match heard {
                    Some(msg) if tie.places_after(regs.key, msg.first()) => {
                        regs.rank = position as Word;
                        regs.cursor = preorder_index(size, right_child_value(size, x)) as Word;
                    }
                    _ => {
                        regs.cursor = preorder_index(size, left_child_value(size, x)) as Word;
                    }
                }
                let cursor = regs.cursor;
                if cursor != 0 {
                    queue.insert(index_in("group cursor", id, cursor - 1, size)?, id)?;
                }
            }
            network.advance_slot();
        }
        queue.ensure_drained(network.clock())?;
    }

    debug!(clock = network.clock(), "regrouped rank complete");
    Ok(())
}

/// Ranks `a` in `b` and `b` in `a` by iterated regrouping.
///
/// Rounds alternate between the two sequences until groups hold at most two
/// elements; two linear sweeps then settle every rank inside its pair.
/// `a` uses `tie`, `b` the reversed policy.
#[instrument(level = "debug", skip_all, fields(m = a.len(), tie = ?tie))]
pub fn rank_iterated(
    network: &mut Network,
    a: &[StationId],
    b: &[StationId],
    tie: TieBreak,
) -> Result<()> {
    check_equal(network, a, b)?;
    let m = a.len();
    if m == 0 {
        return Ok(());
    }

    for id in a {
        network[*id].regs.group = 1;
    }
    let rounds = (l_star(m) + 1) / 2 + 1;
    for i in 1..=rounds {
        regroup(network, 2 * i - 1, a, b, tie)?;
        regroup(network, 2 * i, b, a, tie.reversed())?;
    }

    if m >= 2 {
        pair_sweep(network, a, b, tie.reversed())?;
        pair_sweep(network, b, a, tie)?;
    }

    debug!(clock = network.clock(), rounds, "iterated rank complete");
    Ok(())
}

/// Every `senders` element broadcasts in turn; listeners in group `g` hear
/// positions `2g - 1` and `2g` and keep the last one they sort after.
fn pair_sweep(
    network: &mut Network,
    senders: &[StationId],
    listeners: &[StationId],
    tie: TieBreak,
) -> Result<()> {
    let pairs = (senders.len() + 1) / 2;
    let mut by_group: Vec<Vec<StationId>> = vec![Vec::new(); pairs + 1];
    for id in listeners {
        let regs = &mut network[*id].regs;
        regs.rank = 0;
        if let Ok(g) = usize::try_from(regs.group) {
            if (1..=pairs).contains(&g) {
                by_group[g].push(*id);
            }
        }
    }

    for (i, sender) in senders.iter().enumerate() {
        let slot = network.clock();
        let position = i + 1;
        let key = network[*sender].regs.key;
        network.send(*sender, Payload::word(key))?;
        for id in &by_group[(position + 1) / 2] {
            let heard = network
                .listen(*id)?
                .ok_or_else(|| Error::schedule(slot, Some(*id), "pair sweep slot silent"))?
                .first();
            let regs = &mut network[*id].regs;
            if tie.places_after(regs.key, heard) {
                regs.rank = position as Word;
            }
        }
        network.advance_slot();
    }
    Ok(())
}

fn check_equal(network: &Network, a: &[StationId], b: &[StationId]) -> Result<()> {
    network.check_ids(a)?;
    network.check_ids(b)?;
    if a.len() != b.len() {
        return Err(Error::invalid_input(format!(
            "regrouped ranking needs equal lengths, got {} and {}",
            a.len(),
            b.len()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn sorted_keys(rng: &mut StdRng, m: usize, range: Word) -> Vec<Word> {
        let mut keys: Vec<Word> = (0..m).map(|_| rng.gen_range(0..range)).collect();
        keys.sort_unstable();
        keys
    }

    fn setup(a_keys: &[Word], b_keys: &[Word]) -> (Network, Vec<StationId>, Vec<StationId>) {
        let mut network = Network::with_stations(a_keys.len() + b_keys.len()).unwrap();
        let ids = network.physical_ids();
        let (a, b) = ids.split_at(a_keys.len());
        network.seed_keys(a, a_keys).unwrap();
        network.seed_keys(b, b_keys).unwrap();
        (network, a.to_vec(), b.to_vec())
    }

    fn brute_rank(key: Word, reference: &[Word], tie: TieBreak) -> Word {
        reference.iter().filter(|r| tie.places_after(key, **r)).count() as Word
    }

    fn ranks(network: &Network, ids: &[StationId]) -> Vec<Word> {
        ids.iter().map(|id| network[*id].regs.rank).collect()
    }

    #[test]
    fn test_regroup_assigns_groups() {
        // 16 elements: round 1 groups of 5 led by positions 1, 6, 11, 16
        let c_keys: Vec<Word> = (0..16).map(|k| 10 * k).collect();
        let d_keys: Vec<Word> = (0..16).map(|k| 10 * k + 5).collect();
        let (mut network, c, d) = setup(&c_keys, &d_keys);
        for id in &c {
            network[*id].regs.group = 1;
        }
        regroup(&mut network, 1, &c, &d, TieBreak::Before).unwrap();

        // Leader keys 0, 50, 100, 150
        let groups: Vec<Word> = d.iter().map(|id| network[*id].regs.group).collect();
        assert_eq!(
            groups,
            vec![1, 1, 1, 1, 1, 2, 2, 2, 2, 2, 3, 3, 3, 3, 3, 4]
        );
        assert_eq!(network[c[5]].regs.rank, 5);
        assert!(network.clock() > 0);
    }

    #[test]
    fn test_regrouped_rank_matches_brute_force() {
        let mut rng = StdRng::seed_from_u64(7);
        for m in [1usize, 2, 3, 5, 8, 13, 32, 50] {
            for range in [4, 1_000_000] {
                let a_keys = sorted_keys(&mut rng, m, range);
                let b_keys = sorted_keys(&mut rng, m, range);
                let (mut network, a, b) = setup(&a_keys, &b_keys);
                rank_regrouped(&mut network, &a, &b, TieBreak::Before).unwrap();
                let expected: Vec<Word> = a_keys
                    .iter()
                    .map(|k| brute_rank(*k, &b_keys, TieBreak::Before))
                    .collect();
                assert_eq!(ranks(&network, &a), expected, "m = {}", m);
            }
        }
    }

    #[test]
    fn test_iterated_rank_matches_brute_force() {
        let mut rng = StdRng::seed_from_u64(11);
        for m in [1usize, 2, 4, 7, 16, 33, 64] {
            for range in [3, 1_000_000] {
                let a_keys = sorted_keys(&mut rng, m, range);
                let b_keys = sorted_keys(&mut rng, m, range);
                let (mut network, a, b) = setup(&a_keys, &b_keys);
                rank_iterated(&mut network, &a, &b, TieBreak::Before).unwrap();

                let a_expected: Vec<Word> = a_keys
                    .iter()
                    .map(|k| brute_rank(*k, &b_keys, TieBreak::Before))
                    .collect();
                let b_expected: Vec<Word> = b_keys
                    .iter()
                    .map(|k| brute_rank(*k, &a_keys, TieBreak::After))
                    .collect();
                assert_eq!(ranks(&network, &a), a_expected, "m = {}", m);
                assert_eq!(ranks(&network, &b), b_expected, "m = {}", m);
            }
        }
    }

    #[test]
    fn test_unequal_lengths_rejected() {
        let (mut network, a, b) = setup(&[1, 2], &[3]);
        assert!(matches!(
            rank_regrouped(&mut network, &a, &b, TieBreak::Before),
            Err(Error::InvalidInput(_))
        ));
        assert!(matches!(
            rank_iterated(&mut network, &a, &b, TieBreak::Before),
            Err(Error::InvalidInput(_))
        ));
        assert!(matches!(
            regroup(&mut network, 0, &a, &a, TieBreak::Before),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_regroup_rejects_unknown_station() {
        let mut network = Network::with_stations(2).unwrap();
        let err = regroup(&mut network, 1, &[StationId(0)], &[StationId(7)], TieBreak::Before)
            .unwrap_err();
        assert_eq!(err, Error::UnknownStation(StationId(7)));
        assert_eq!(network.clock(), 0);
    }
}
