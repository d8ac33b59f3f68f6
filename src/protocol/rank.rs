use tracing::{debug, instrument, trace};

use super::{index_in, ActivationQueue};
use crate::core::{Error, Payload, Result, StationId, TieBreak, Word};
use crate::network::Network;
use crate::tree::inorder::height;
use crate::tree::pow2;
use crate::tree::preorder::{
    left_child_value,
    postorder_to_inorder_value,
    preorder_index,
    right_child_value,
};

/// Ranks every station of `a` in the sorted sequence `b`.
///
/// Each element of `a` runs a binary search over the implicit tree of `b`, all
/// searches in lock step. The tree node with heap index `d` broadcasts in the
/// `d`-th slot, and a searcher listens only in the slot of the node it waits
/// for, so one rank costs `|b|` slots and every searcher listens at most
/// `height(|b|)` times.
///
/// On return `a[i].regs.rank` holds the number of `b` keys ordered before
/// `a[i]` under `tie`.
#[instrument(level = "debug", skip_all, fields(a = a.len(), b = b.len(), tie = ?tie))]
pub fn rank(network: &mut Network, a: &[StationId], b: &[StationId], tie: TieBreak) -> Result<()> {
    network.check_ids(a)?;
    network.check_ids(b)?;

    let m = b.len();
    let start = if m > 0 { 1 } else { 0 };
    for id in a {
        let regs = &mut network[*id].regs;
        regs.cursor = start;
        regs.rank = 0;
    }

    let mut frontier: Vec<StationId> = if m > 0 { a.to_vec() } else { Vec::new() };
    let mut queue = ActivationQueue::new();

    for level in 0..height(m) {
        let width = pow2(level);
        queue.reset(width);
        for id in frontier.drain(..) {
            let offset = network[id].regs.cursor - width as Word;
            queue.insert(index_in("rank cursor", id, offset, width)?, id)?;
        }
        sweep_level(network, &mut queue, b, level, tie, &mut frontier)?;
    }

    if let Some(id) = frontier.first() {
        return Err(Error::schedule(
            network.clock(),
            Some(*id),
            "search still open after the last tree level",
        ));
    }

    debug!(clock = network.clock(), "rank complete");
    Ok(())
}

/// Runs the slots of one tree level. Searchers still descending are pushed
/// onto `frontier`.
fn sweep_level(
    network: &mut Network,
    queue: &mut ActivationQueue,
    b: &[StationId],
    level: u32,
    tie: TieBreak,
    frontier: &mut Vec<StationId>,
) -> Result<()> {
    let m = b.len();
    let width = pow2(level);
    for d in width..=(2 * width - 1).min(m) {
        let slot = network.clock();
        let x = node_value(m, d, slot)?;

        let sender = b[x - 1];
        let key = network[sender].regs.key;
        network.send(sender, Payload::word(key))?;

        while let Some(id) = queue.pop_one(d - width) {
            let heard = network
                .listen(id)?
                .ok_or_else(|| Error::schedule(slot, Some(id), "silent tree slot"))?
                .first();
            let regs = &mut network[id].regs;
            if regs.cursor != d as Word {
                return Err(Error::schedule(
                    slot,
                    Some(id),
                    format!("waiting for node {} but node {} is on air", regs.cursor, d),
                ));
            }
            if tie.places_after(regs.key, heard) {
                regs.cursor = preorder_index(m, right_child_value(m, x)) as Word;
                regs.rank = x as Word;
            } else {
                regs.cursor = preorder_index(m, left_child_value(m, x)) as Word;
            }
            trace!(slot, station = %id, node = x, cursor = regs.cursor, "searcher moved");
            if regs.cursor != 0 {
                frontier.push(id);
            }
        }
        network.advance_slot();
    }
    queue.ensure_drained(network.clock())
}

/// Value held by the node at heap index `d`; it must map back to `d`
fn node_value(m: usize, d: usize, slot: u64) -> Result<usize> {
    let x = postorder_to_inorder_value(m, d);
    if x == 0 || preorder_index(m, x) != d {
        return Err(Error::schedule(
            slot,
            None,
            format!("heap index {} resolves to value {} in a tree of {}", d, x, m),
        ));
    }
    Ok(x)
}
