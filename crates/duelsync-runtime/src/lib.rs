//! DuelSync Runtime
//!
//! This crate contains the networked half of the DuelSync match engine:
//! - `SessionManager`: the single network session, its event queue and the
//!   scheduled create/find/join operations
//! - `MatchSync`: the host-authoritative match state machine
//! - `LobbySync`: character selection ahead of a match
//! - `DuelRuntime`: the per-frame orchestrator tying them to the scheduler
//!
//! Rendering, audio, input devices and persistence stay outside; they are
//! reached through the traits in [`presentation`] and [`questions`].

pub mod context;
pub mod lobby;
pub mod matchsync;
pub mod presentation;
pub mod questions;
mod runtime;
pub mod session;
pub mod session_loss;

pub use context::{animation_clock, Arena, GameContext, LogicGate, GAMEPLAY_LIST, GAME_LIST};
pub use lobby::{LobbySignal, LobbySync};
pub use matchsync::{
    AttackTask, ConcludeTask, JoiningState, MatchSetup, MatchState, MatchStatus, MatchSync, Role,
    Roster,
};
pub use presentation::{
    Animation, AnimationPlayer, FrameAnimator, InputSource, JsonScoreStore, MemoryScoreStore,
    Notification, Notifications, Reply, ScoreRecord, ScoreStore, ScriptedInput,
};
pub use questions::{ArithmeticQuestions, QuestionSource};
pub use runtime::{DuelRuntime, ScreenKind};
pub use session::{
    LoopbackConfig, LoopbackNetwork, SessionEndReason, SessionEvent, SessionManager, NETWORK_LIST,
};
pub use session_loss::handle_session_loss;

// Re-export core types for convenience
pub use duelsync_core::{
    DuelConfig, DuelError, DuelResult, Gamertag, NetworkMessage, PlayerSlot, Ruleset, TaskScheduler,
};
