//! Correction of a sorted sequence after some keys changed.
//!
//! Every station holds its position in a sorted sequence (`old_index`), the
//! key it was sorted by (`old_key`) and possibly a replacement (`new_key`).
//! With `k` changed keys out of `n`, each changed key gets a team of `n / k`
//! virtual workers hosted by distinct physical stations. The teams sort the
//! changed keys among themselves, rotating search and index duties so that no
//! host pays for more than one level of any search, and the sorted keys are
//! then merged back into the unchanged ones.

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, trace};

use super::{index_in, ActivationQueue};
use crate::core::{Error, Payload, Result, StationId, TieBreak, Word, NIL};
use crate::network::{Network, Placement, Registers};
use crate::tree::inorder::{bso, heap_index_at, height, level_size};
use crate::tree::pow2;
use crate::util::ensure_sorted;

/// Outcome of one correction run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorrectionSummary {
    /// Stations whose key changed
    pub changed: usize,
    /// Virtual workers per changed key, 0 when nothing changed
    pub team_size: usize,
    /// Slots spent
    pub slots: u64,
}

/// Runs corrections on one network, keeping its virtual workers between runs
#[derive(Debug, Default)]
pub struct Correction {
    /// Virtual stations created so far; worker `j` of a run is `pool[j]`
    pool: Vec<StationId>,
    queue: ActivationQueue,
}

/// Workers serving one changed key
#[derive(Debug)]
struct Team {
    workers: Vec<StationId>,
    /// Worker holding the current search state
    rank_worker: usize,
    /// Worker holding the key's current position
    index_worker: usize,
}

impl Team {
    fn ranker(&self) -> StationId {
        self.workers[self.rank_worker]
    }

    fn indexer(&self) -> StationId {
        self.workers[self.index_worker]
    }

    fn next_ranker(&self) -> StationId {
        self.workers[(self.rank_worker + 1) % self.workers.len()]
    }

    fn previous_indexer(&self) -> StationId {
        let size = self.workers.len();
        self.workers[(self.index_worker + size - 1) % size]
    }
}

impl Correction {
    /// Creates a correction with an empty worker pool
    pub fn new() -> Self {
        Self::default()
    }

    /// Virtual stations created so far
    pub fn pool_size(&self) -> usize {
        self.pool.len()
    }

    /// Moves every station of `ids` to its position in the corrected order.
    ///
    /// On success `old_index` and `old_key` describe the new arrangement.
    /// Fails with `InvalidInput` when every key changed.
    #[instrument(level = "debug", skip_all, fields(n = ids.len()))]
    pub fn run(&mut self, network: &mut Network, ids: &[StationId]) -> Result<CorrectionSummary> {
        network.check_ids(ids)?;
        let start = network.clock();
        let n = ids.len();
        if n == 0 {
            return Ok(CorrectionSummary {
                changed: 0,
                team_size: 0,
                slots: 0,
            });
        }

        let by_position = positions(network, ids)?;
        let changed = split_and_count(network, &by_position)?;
        if changed == n {
            return Err(Error::invalid_input(format!(
                "all {} keys changed, sort the sequence instead",
                n
            )));
        }

        let mut kept: Vec<Option<StationId>> = vec![None; n - changed];
        let mut moved: Vec<Option<StationId>> = vec![None; changed];
        for id in ids {
            let placement = network[*id].regs.placement;
            let (table, at) = match placement {
                Some(Placement::Kept(i)) => (&mut kept, i),
                Some(Placement::Moved(t)) => (&mut moved, t),
                None => {
                    return Err(Error::schedule(
                        network.clock(),
                        Some(*id),
                        "station missed the counting sweep",
                    ))
                }
            };
            let limit = table.len();
            match table.get_mut(at) {
                Some(Some(first)) => {
                    return Err(Error::DuplicateSender {
                        position: at + 1,
                        first: *first,
                        second: *id,
                    })
                }
                Some(cell) => *cell = Some(*id),
                None => {
                    return Err(Error::OutOfRange {
                        context: "placement",
                        station: *id,
                        value: at as Word,
                        limit,
                    })
                }
            }
        }
        let kept = filled(kept, network.clock())?;
        let moved = filled(moved, network.clock())?;

        let team_size = if changed == 0 { 0 } else { n / changed };
        if changed > 0 {
            let teams = self.assign_workers(network, ids, &moved, team_size)?;
            let mut sorter = Sorter {
                network: &mut *network,
                queue: &mut self.queue,
                teams,
            };
            sorter.sort_changed()?;
            sorter.final_merge(&kept, &moved)?;
        } else {
            for id in ids {
                let regs = &mut network[*id].regs;
                regs.new_index = regs.index;
            }
        }

        for id in ids {
            let regs = &mut network[*id].regs;
            regs.old_index = regs.new_index;
            regs.old_key = regs.new_key;
        }
        if network.config().verify_postconditions {
            let order = positions(network, ids)?;
            ensure_sorted("correction output sorted", &network.keys(&order))?;
        }

        let summary = CorrectionSummary {
            changed,
            team_size,
            slots: network.clock() - start,
        };
        debug!(?summary, "correction complete");
        Ok(summary)
    }

    /// Gives every changed key a team and lets the team learn the key
    fn assign_workers(
        &mut self,
        network: &mut Network,
        ids: &[StationId],
        moved: &[StationId],
        team_size: usize,
    ) -> Result<Vec<Team>> {
        let mut teams = Vec::with_capacity(moved.len());
        for (t, owner) in moved.iter().enumerate() {
            let mut workers = Vec::with_capacity(team_size);
            for j in t * team_size..(t + 1) * team_size {
                workers.push(self.worker(network, j, ids[j])?);
            }

            let key = network[*owner].regs.new_key;
            network.send(*owner, Payload::word(key))?;
            for worker in &workers {
                let slot = network.clock();
                let heard = network
                    .listen(*worker)?
                    .ok_or_else(|| Error::schedule(slot, Some(*worker), "worker missed its key"))?;
                network[*worker].regs.key = heard.first();
            }
            network.advance_slot();

            teams.push(Team {
                workers,
                rank_worker: 0,
                index_worker: team_size - 1,
            });
        }
        debug!(teams = teams.len(), team_size, pool = self.pool.len(), "workers assigned");
        Ok(teams)
    }

    /// Worker `j`, hosted by `host`: rebinds a pooled station or creates one
    fn worker(&mut self, network: &mut Network, j: usize, host: StationId) -> Result<StationId> {
        match self.pool.get(j).copied() {
            Some(id) => {
                network.rebind(id, host)?;
                network[id].regs = Registers::default();
                Ok(id)
            }
            None => {
                let id = network.attach_virtual(host)?;
                self.pool.push(id);
                Ok(id)
            }
        }
    }
}

/// Ranks the `searchers`, parked at in-level positions given by their `rank`
/// registers, against level `level` of a BSO-ordered reference run.
///
/// `senders[y]` is the reference station at heap index `y`. Searchers waiting
/// on a position the last level does not have skip ahead without a slot.
/// Results land in `new_rank`.
pub fn level_rank(
    network: &mut Network,
    queue: &mut ActivationQueue,
    level: u32,
    searchers: &[StationId],
    senders: &[Option<StationId>],
    tie: TieBreak,
) -> Result<()> {
    network.check_ids(searchers)?;
    let listed: Vec<StationId> = senders.iter().flatten().copied().collect();
    network.check_ids(&listed)?;
    let m = senders.len();
    let present = level_size(m, level);
    let width = pow2(level);

    queue.reset(width);
    for id in searchers {
        let position = network[*id].regs.rank;
        queue.insert(index_in("level position", *id, position, width)?, *id)?;
    }

    for r in 0..present {
        let slot = network.clock();
        let y = heap_index_at(level, r);
        let sender = senders
            .get(y)
            .copied()
            .flatten()
            .ok_or(Error::MissingSender {
                slot,
                position: y + 1,
            })?;
        let index = network[sender].regs.index;
        if bso(m, index_in("reference index", sender, index, m)?) != y {
            return Err(Error::schedule(
                slot,
                Some(sender),
                format!("index {} does not sit at heap index {}", index, y),
            ));
        }

        let key = network[sender].regs.key;
        network.send(sender, Payload::word(key))?;
        while let Some(id) = queue.pop_one(r) {
            let heard = network
                .listen(id)?
                .ok_or_else(|| Error::schedule(slot, Some(id), "silent level slot"))?
                .first();
            let regs = &mut network[id].regs;
            regs.new_rank = if tie.places_after(regs.key, heard) {
                2 * regs.rank + 1
            } else {
                2 * regs.rank
            };
        }
        network.advance_slot();
    }

    for r in present..width {
        while let Some(id) = queue.pop_one(r) {
            let regs = &mut network[id].regs;
            regs.new_rank = regs.rank + present as Word;
        }
    }
    queue.ensure_drained(network.clock())
}

/// Team-based sorting of the changed keys and the final merge
struct Sorter<'a> {
    network: &'a mut Network,
    queue: &'a mut ActivationQueue,
    teams: Vec<Team>,
}

impl Sorter<'_> {
    /// Merges runs of doubling length until the teams' index workers hold the
    /// sorted position of their key
    fn sort_changed(&mut self) -> Result<()> {
        let k = self.teams.len();
        for team in &self.teams {
            self.network[team.indexer()].regs.index = 0;
        }

        let mut run = 1;
        while run < k {
            let pairs = k / (2 * run);
            for i in 0..pairs {
                let start = 2 * i * run;
                self.merge_runs(start, start + run - 1, start + run, start + 2 * run - 1)?;
            }
            if k % (2 * run) > run {
                let start = pairs * 2 * run;
                self.merge_runs(start, start + run - 1, start + run, k - 1)?;
            }
            run *= 2;
        }
        debug!(clock = self.network.clock(), "changed keys sorted");
        Ok(())
    }

    fn merge_runs(&mut self, i1: usize, i2: usize, i3: usize, i4: usize) -> Result<()> {
        let right: Vec<StationId> = self.teams[i3..=i4].iter().map(Team::indexer).collect();
        self.rank_teams(i1, i2, &right, TieBreak::Before, None)?;
        let left: Vec<StationId> = self.teams[i1..=i2].iter().map(Team::indexer).collect();
        self.rank_teams(i3, i4, &left, TieBreak::After, None)?;
        self.transfer_indexes(i1, i2)?;
        self.transfer_indexes(i3, i4)
    }

    /// Ranks teams `i1..=i2` in `reference`, a run whose `index` registers
    /// give each station's position. The rank lands on each team's index
    /// worker as `new_index = index + rank`, and on `informed[t]` as `rank`
    /// when given.
    fn rank_teams(
        &mut self,
        i1: usize,
        i2: usize,
        reference: &[StationId],
        tie: TieBreak,
        informed: Option<&[StationId]>,
    ) -> Result<()> {
        let m = reference.len();
        let mut senders: Vec<Option<StationId>> = vec![None; m];
        for id in reference {
            let index = self.network[*id].regs.index;
            let y = bso(m, index_in("reference index", *id, index, m)?);
            if let Some(first) = senders[y] {
                return Err(Error::DuplicateSender {
                    position: y + 1,
                    first,
                    second: *id,
                });
            }
            senders[y] = Some(*id);
        }

        for team in &self.teams[i1..=i2] {
            self.network[team.ranker()].regs.rank = 0;
        }

        let levels = height(m);
        for level in 0..levels {
            let searchers: Vec<StationId> = self.teams[i1..=i2].iter().map(Team::ranker).collect();
            level_rank(self.network, self.queue, level, &searchers, &senders, tie)?;
            if level + 1 < levels {
                self.transfer_ranks(i1, i2)?;
            }
        }
        self.send_ranks_to_indexes(i1, i2, informed)
    }

    /// Hands each team's search state to its next worker
    fn transfer_ranks(&mut self, i1: usize, i2: usize) -> Result<()> {
        for team in &mut self.teams[i1..=i2] {
            let slot = self.network.clock();
            let (from, to) = (team.ranker(), team.next_ranker());
            let value = self.network[from].regs.new_rank;
            self.network.send(from, Payload::word(value))?;
            let heard = self
                .network
                .listen(to)?
                .ok_or_else(|| Error::schedule(slot, Some(to), "rank hand-off lost"))?;
            self.network[to].regs.rank = heard.first();
            self.network.advance_slot();
        }
        for team in &mut self.teams[i1..=i2] {
            team.rank_worker = (team.rank_worker + 1) % team.workers.len();
        }
        Ok(())
    }

    fn send_ranks_to_indexes(
        &mut self,
        i1: usize,
        i2: usize,
        informed: Option<&[StationId]>,
    ) -> Result<()> {
        for (t, team) in self.teams[i1..=i2].iter().enumerate() {
            let slot = self.network.clock();
            let (from, to) = (team.ranker(), team.indexer());
            let value = self.network[from].regs.new_rank;
            self.network.send(from, Payload::word(value))?;

            let heard = self
                .network
                .listen(to)?
                .ok_or_else(|| Error::schedule(slot, Some(to), "rank lost on the way to the index"))?
                .first();
            let regs = &mut self.network[to].regs;
            regs.new_index = regs.index + heard;

            if let Some(listener) = informed.and_then(|list| list.get(t)).copied() {
                let heard = self
                    .network
                    .listen(listener)?
                    .ok_or_else(|| Error::schedule(slot, Some(listener), "rank lost"))?;
                self.network[listener].regs.rank = heard.first();
            }
            self.network.advance_slot();
        }
        for team in &mut self.teams[i1..=i2] {
            team.rank_worker = (team.rank_worker + 1) % team.workers.len();
        }
        Ok(())
    }

    /// Hands each team's merged position to its previous worker
    fn transfer_indexes(&mut self, i1: usize, i2: usize) -> Result<()> {
        for team in &self.teams[i1..=i2] {
            let slot = self.network.clock();
            let (from, to) = (team.indexer(), team.previous_indexer());
            let value = self.network[from].regs.new_index;
            self.network.send(from, Payload::word(value))?;
            let heard = self
                .network
                .listen(to)?
                .ok_or_else(|| Error::schedule(slot, Some(to), "index hand-off lost"))?;
            self.network[to].regs.index = heard.first();
            self.network.advance_slot();
        }
        for team in &mut self.teams[i1..=i2] {
            let size = team.workers.len();
            team.index_worker = (team.index_worker + size - 1) % size;
        }
        Ok(())
    }

    /// Merges the sorted changed keys into the unchanged ones.
    ///
    /// `kept[i]` is the `i`-th unchanged station, `moved[t]` the owner of team `t`.
    fn final_merge(&mut self, kept: &[StationId], moved: &[StationId]) -> Result<()> {
        let k = moved.len();
        let gaps = kept.len();

        for (i, id) in kept.iter().enumerate() {
            self.network[*id].regs.index = i as Word;
        }
        if self.network.config().verify_postconditions {
            ensure_sorted("unchanged keys sorted", &self.network.keys(kept))?;
        }

        // Each changed key learns how many unchanged keys precede it
        self.rank_teams(0, k - 1, kept, TieBreak::Before, Some(moved))?;

        // ... and its final position from its team
        for (team, owner) in self.teams.iter().zip(moved) {
            let slot = self.network.clock();
            let from = team.indexer();
            let value = self.network[from].regs.new_index;
            self.network.send(from, Payload::word(value))?;
            let heard = self
                .network
                .listen(*owner)?
                .ok_or_else(|| Error::schedule(slot, Some(*owner), "final position lost"))?
                .first();
            let regs = &mut self.network[*owner].regs;
            regs.new_index = heard;
            regs.index = heard - regs.rank;
            self.network.advance_slot();
        }

        let mut ordered: Vec<Option<StationId>> = vec![None; k];
        for id in moved {
            let index = self.network[*id].regs.index;
            let at = index_in("changed position", *id, index, k)?;
            if let Some(first) = ordered[at] {
                return Err(Error::DuplicateSender {
                    position: at + 1,
                    first,
                    second: *id,
                });
            }
            ordered[at] = Some(*id);
        }
        let ordered = filled(ordered, self.network.clock())?;
        if self.network.config().verify_postconditions {
            ensure_sorted("changed keys sorted", &self.network.keys(&ordered))?;
        }

        // The last changed key of each gap between unchanged keys
        for id in &ordered {
            self.network[*id].regs.last_in_gap = false;
        }
        self.network[ordered[k - 1]].regs.last_in_gap = true;
        for t in (1..k).rev() {
            let slot = self.network.clock();
            let (from, to) = (ordered[t], ordered[t - 1]);
            let value = self.network[from].regs.rank;
            self.network.send(from, Payload::word(value))?;
            let heard = self
                .network
                .listen(to)?
                .ok_or_else(|| Error::schedule(slot, Some(to), "gap marker lost"))?
                .first();
            let regs = &mut self.network[to].regs;
            regs.last_in_gap = regs.rank != heard;
            self.network.advance_slot();
        }

        let mut announcers: Vec<Option<StationId>> = vec![None; gaps + 1];
        for id in &ordered {
            let regs = &self.network[*id].regs;
            if !regs.last_in_gap {
                continue;
            }
            let at = index_in("gap", *id, regs.rank, gaps + 1)?;
            if let Some(first) = announcers[at] {
                return Err(Error::DuplicateSender {
                    position: at + 1,
                    first,
                    second: *id,
                });
            }
            announcers[at] = Some(*id);
        }

        // Unchanged keys shift right by the changed keys before them
        for (i, id) in kept.iter().enumerate() {
            self.network[*id].regs.shift = if i == 0 { 0 } else { NIL };
        }
        for (t, id) in kept.iter().enumerate() {
            if let Some(sender) = announcers[t] {
                let index = self.network[sender].regs.index;
                self.network.send(sender, Payload::word(index))?;
            }
            if let Some(msg) = self.network.listen(*id)? {
                self.network[*id].regs.shift = msg.first() + 1;
            }
            self.network.advance_slot();
        }
        for pair in kept.windows(2) {
            let slot = self.network.clock();
            let shift = self.network[pair[0]].regs.shift;
            self.network.send(pair[0], Payload::word(shift))?;
            if self.network[pair[1]].regs.shift == NIL {
                let heard = self
                    .network
                    .listen(pair[1])?
                    .ok_or_else(|| Error::schedule(slot, Some(pair[1]), "shift lost"))?;
                self.network[pair[1]].regs.shift = heard.first();
            }
            self.network.advance_slot();
        }
        for id in kept {
            let regs = &mut self.network[*id].regs;
            regs.new_index = regs.index + regs.shift;
        }

        trace!(clock = self.network.clock(), "final merge done");
        Ok(())
    }
}

/// Stations ordered by `old_index`, which must be a permutation of `0..n`
fn positions(network: &Network, ids: &[StationId]) -> Result<Vec<StationId>> {
    let n = ids.len();
    let mut order: Vec<Option<StationId>> = vec![None; n];
    for id in ids {
        let at = index_in("sorted position", *id, network[*id].regs.old_index, n)?;
        if let Some(first) = order[at] {
            return Err(Error::DuplicateSender {
                position: at + 1,
                first,
                second: *id,
            });
        }
        order[at] = Some(*id);
    }
    filled(order, network.clock())
}

/// Prefix count of changed keys in position order; returns the total
fn split_and_count(network: &mut Network, by_position: &[StationId]) -> Result<usize> {
    for id in by_position {
        let regs = &mut network[*id].regs;
        regs.index = regs.old_index;
        regs.prefix = 0;
        regs.key = regs.new_key;
        regs.placement = None;
    }

    let place = |regs: &mut Registers| -> Word {
        let changed = Word::from(regs.new_key != regs.old_key);
        regs.placement = Some(if changed == 1 {
            Placement::Moved(regs.prefix as usize)
        } else {
            Placement::Kept((regs.index - regs.prefix) as usize)
        });
        regs.prefix + changed
    };

    for pair in by_position.windows(2) {
        let slot = network.clock();
        let count = place(&mut network[pair[0]].regs);
        network.send(pair[0], Payload::word(count))?;
        let heard = network
            .listen(pair[1])?
            .ok_or_else(|| Error::schedule(slot, Some(pair[1]), "prefix count lost"))?;
        network[pair[1]].regs.prefix = heard.first();
        network.advance_slot();
    }

    let slot = network.clock();
    let last = by_position[by_position.len() - 1];
    let total = place(&mut network[last].regs);
    network.send(last, Payload::word(total))?;
    for id in by_position {
        let heard = network
            .listen(*id)?
            .ok_or_else(|| Error::schedule(slot, Some(*id), "total count lost"))?;
        network[*id].regs.changed_total = heard.first();
    }
    network.advance_slot();

    debug!(changed = total, "counting sweep done");
    Ok(total as usize)
}

fn filled(table: Vec<Option<StationId>>, slot: u64) -> Result<Vec<StationId>> {
    table
        .iter()
        .enumerate()
        .map(|(position, id)| {
            id.ok_or(Error::MissingSender {
                slot,
                position: position + 1,
            })
        })
        .collect()
}
