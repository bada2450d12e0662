//! Single-slot inbound message buffer
//!
//! Each local participant holds exactly one inbound message at a time. A
//! received message occupies the slot until it is consumed; while occupied,
//! further arrivals stay queued in the transport beneath.

use tracing::trace;

use crate::protocol::message::NetworkMessage;
use crate::types::Gamertag;

/// The inbound message currently awaiting handling, and who sent it
#[derive(Debug, Default)]
pub struct MessageSlot {
    message: NetworkMessage,
    sender: Option<Gamertag>,
}

impl MessageSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// True when nothing is waiting to be handled
    pub fn is_empty(&self) -> bool {
        self.message.is_undefined()
    }

    /// Place a received message in the slot.
    ///
    /// Returns false and leaves the slot untouched if it is still occupied.
    pub fn accept(&mut self, sender: Gamertag, message: NetworkMessage) -> bool {
        if !self.is_empty() || message.is_undefined() {
            return false;
        }
        trace!(kind = message.discriminator(), %sender, "message slot filled");
        self.message = message;
        self.sender = Some(sender);
        true
    }

    /// The waiting message, `Undefined` when empty
    pub fn peek(&self) -> &NetworkMessage {
        &self.message
    }

    /// Gamer that sent the waiting message
    pub fn sender(&self) -> Option<&Gamertag> {
        self.sender.as_ref()
    }

    /// Take the waiting message and reset the slot to `Undefined`.
    ///
    /// Consuming an empty slot returns `None` and changes nothing.
    pub fn consume(&mut self) -> Option<(Gamertag, NetworkMessage)> {
        if self.is_empty() {
            return None;
        }
        let message = std::mem::take(&mut self.message);
        let sender = self.sender.take()?;
        trace!(kind = message.discriminator(), "message slot consumed");
        Some((sender, message))
    }

    /// Drop whatever is waiting
    pub fn clear(&mut self) {
        self.message = NetworkMessage::Undefined;
        self.sender = None;
    }
}
