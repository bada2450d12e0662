//! Message protocol between host and clients
//!
//! `message` holds the closed catalogue of messages, `wire` their binary
//! framing, and `slot` the single-message inbound buffer each participant
//! reads from.

pub mod message;
pub mod slot;
pub mod wire;

pub use message::{HighscoreEntry, InputRecord, NetworkMessage, PlayerEntry, Question, WelcomePack};
pub use slot::MessageSlot;
pub use wire::{PacketReader, PacketWriter, WireFormat, WireResult};
