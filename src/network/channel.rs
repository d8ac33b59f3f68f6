use tracing::trace;

use crate::core::{Error, Payload, Result, StationId};

/// The single shared broadcast medium with collision detection.
///
/// Holds at most one message per slot. A second broadcast before `reset`
/// is a fault, never a silent garble.
#[derive(Debug, Default)]
pub struct Channel {
    /// Message on air this slot and the station that sent it
    pending: Option<(StationId, Payload)>,
}

impl Channel {
    /// Creates an idle channel
    pub fn new() -> Self {
        Channel { pending: None }
    }

    /// Puts `payload` on air for the current slot
    pub fn broadcast(&mut self, slot: u64, sender: StationId, payload: Payload) -> Result<()> {
        if !payload.is_valid() {
            trace!(slot, %sender, %payload, "rejected payload");
            return Err(Error::InvalidPayload {
                slot,
                sender,
                payload,
            });
        }

        if let Some((holder, _)) = &self.pending {
            trace!(slot, %holder, %sender, "collision");
            return Err(Error::Collision {
                slot,
                holder: *holder,
                sender,
                payload,
            });
        }

        self.pending = Some((sender, payload));
        Ok(())
    }

    /// Message on air, or `None` when the slot is silent
    pub fn receive(&self) -> Option<&Payload> {
        self.pending.as_ref().map(|(_, payload)| payload)
    }

    /// Station that currently holds the channel
    pub fn holder(&self) -> Option<StationId> {
        self.pending.as_ref().map(|(sender, _)| *sender)
    }

    /// Whether a message is on air
    pub fn is_busy(&self) -> bool {
        self.pending.is_some()
    }

    /// Clears the slot; only the network's slot scheduler calls this
    pub(crate) fn reset(&mut self) {
        self.pending = None;
    }
}
