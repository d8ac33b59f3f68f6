use serde::{Deserialize, Serialize};

/// Global slot counter. Only moves forward, one slot at a time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Clock {
    elapsed: u64,
}

impl Clock {
    /// Creates a clock at slot zero
    pub fn new() -> Self {
        Clock { elapsed: 0 }
    }

    /// Current slot, equal to the number of slots already completed
    pub fn now(&self) -> u64 {
        self.elapsed
    }

    /// Moves to the next slot
    pub(crate) fn tick(&mut self) {
        self.elapsed += 1;
    }
}
