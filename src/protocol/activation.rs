use crate::core::{Error, Result, StationId, Word};

/// Stations waiting at each position of one tree level.
///
/// Buckets are intrusive singly linked lists threaded through a shared arena.
/// `reset` clears the lists but keeps both allocations, so a protocol reuses
/// one queue for every level it processes.
#[derive(Debug, Default)]
pub struct ActivationQueue {
    /// First arena node of each bucket
    heads: Vec<Option<usize>>,
    /// Station held by each arena node
    slots: Vec<StationId>,
    /// Next node in the same bucket
    links: Vec<Option<usize>>,
    /// Inserted minus popped
    pending: usize,
}

impl ActivationQueue {
    /// Creates an empty queue with no buckets
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops every pending station and resizes to `capacity` empty buckets
    pub fn reset(&mut self, capacity: usize) {
        self.heads.clear();
        self.heads.resize(capacity, None);
        self.slots.clear();
        self.links.clear();
        self.pending = 0;
    }

    /// Number of buckets
    pub fn capacity(&self) -> usize {
        self.heads.len()
    }

    /// Stations inserted and not yet popped
    pub fn pending(&self) -> usize {
        self.pending
    }

    /// Prepends `station` to `bucket`
    pub fn insert(&mut self, bucket: usize, station: StationId) -> Result<()> {
        let limit = self.heads.len();
        let head = self.heads.get_mut(bucket).ok_or(Error::OutOfRange {
            context: "activation bucket",
            station,
            value: bucket as Word,
            limit,
        })?;
        let node = self.slots.len();
        self.slots.push(station);
        self.links.push(*head);
        *head = Some(node);
        self.pending += 1;
        Ok(())
    }

    /// Removes one station from `bucket`, `None` once it is empty
    pub fn pop_one(&mut self, bucket: usize) -> Option<StationId> {
        let head = self.heads.get_mut(bucket)?;
        let node = (*head)?;
        *head = self.links[node];
        self.pending -= 1;
        Some(self.slots[node])
    }

    /// Whether every inserted station has been popped
    pub fn is_drained(&self) -> bool {
        self.pending == 0
    }

    /// Fails with a schedule inconsistency if any station is still waiting
    pub fn ensure_drained(&self, slot: u64) -> Result<()> {
        if self.is_drained() {
            return Ok(());
        }
        let stuck = self.heads.iter().flatten().next().map(|node| self.slots[*node]);
        Err(Error::schedule(
            slot,
            stuck,
            format!("{} stations still pending at level end", self.pending),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_drain() {
        let mut queue = ActivationQueue::new();
        queue.reset(3);
        queue.insert(1, StationId(4)).unwrap();
        queue.insert(1, StationId(7)).unwrap();
        queue.insert(2, StationId(9)).unwrap();
        assert_eq!(queue.pending(), 3);

        assert_eq!(queue.pop_one(0), None);
        assert_eq!(queue.pop_one(1), Some(StationId(7)));
        assert_eq!(queue.pop_one(1), Some(StationId(4)));
        assert_eq!(queue.pop_one(1), None);
        assert!(!queue.is_drained());
        assert_eq!(queue.pop_one(2), Some(StationId(9)));
        assert!(queue.is_drained());
        assert!(queue.ensure_drained(0).is_ok());
    }

    #[test]
    fn test_bucket_out_of_range() {
        let mut queue = ActivationQueue::new();
        queue.reset(2);
        let err = queue.insert(2, StationId(1)).unwrap_err();
        assert!(matches!(err, Error::OutOfRange { value: 2, limit: 2, .. }));
        assert_eq!(queue.pop_one(5), None);
    }

    #[test]
    fn test_reset_discards_pending() {
        let mut queue = ActivationQueue::new();
        queue.reset(4);
        queue.insert(3, StationId(0)).unwrap();
        let err = queue.ensure_drained(12).unwrap_err();
        assert!(matches!(
            err,
            Error::ScheduleInconsistency { slot: 12, station: Some(StationId(0)), .. }
        ));

        queue.reset(1);
        assert_eq!(queue.capacity(), 1);
        assert!(queue.is_drained());
        assert_eq!(queue.pop_one(0), None);
    }
}
