//! DuelSync Core
//!
//! This crate provides the foundational pieces of the DuelSync match engine:
//! the cooperative task scheduler that drives every multi-frame piece of game
//! logic, the closed catalogue of network messages exchanged between host and
//! clients together with their wire codec, and the shared types, configuration
//! and error taxonomy used by the runtime.

// ----------------------------------------------------------------------------
// Module Declarations
// ----------------------------------------------------------------------------

pub mod config;
pub mod errors;
pub mod protocol;
pub mod scheduler;
pub mod types;

// ----------------------------------------------------------------------------
// Public API
// ----------------------------------------------------------------------------

pub use config::{DuelConfig, Ruleset, SessionConfig, TimingConfig};
pub use errors::{DuelError, DuelResult, ProtocolError, SchedulerError, TransportError};
pub use protocol::{
    HighscoreEntry, InputRecord, MessageSlot, NetworkMessage, PlayerEntry, Question,
    WelcomePack, WireFormat,
};
pub use scheduler::{
    FnTask, RunOnce, Sequence, Task, TaskCommands, TaskId, TaskScheduler, TaskState, TaskStep,
    WaitFrames, WaitUntil,
};
pub use types::{CharacterId, Gamertag, PlayerSlot};
