//! Match synchronization
//!
//! Host-authoritative state machine that keeps every participant's view of a
//! duel (question sequence, answers, health, outcome) in agreement.

mod handlers;
mod roster;
mod state;
mod sync;
mod tasks;

pub use roster::{MatchSetup, Roster};
pub use state::{JoiningState, MatchState, MatchStatus, Role};
pub use sync::MatchSync;
pub use tasks::{AttackTask, ConcludeTask};
