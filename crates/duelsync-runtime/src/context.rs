//! Shared game context
//!
//! Everything tasks and screens operate on is reachable from one
//! `GameContext`, built once per participant and passed by reference into the
//! scheduler, so there are no process-wide singletons.

use duelsync_core::{DuelConfig, FnTask, PlayerSlot, Task, TaskStep};
use tracing::info;

use crate::presentation::{
    AnimationPlayer, FrameAnimator, InputSource, MemoryScoreStore, Notifications, ScoreStore,
    ScriptedInput,
};
use crate::questions::{ArithmeticQuestions, QuestionSource};
use crate::session::{SessionHost, SessionManager};

/// Task list for per-match gameplay: phase timers, attacks, conclusions
pub const GAMEPLAY_LIST: &str = "gameplay";

/// Task list for process-wide tasks such as the animation clock
pub const GAME_LIST: &str = "game";

// ----------------------------------------------------------------------------
// Arena
// ----------------------------------------------------------------------------

/// Health of the two fighters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Arena {
    health: [i32; 2],
}

impl Arena {
    pub fn new(starting_health: i32) -> Self {
        Self {
            health: [starting_health; 2],
        }
    }

    pub fn health(&self) -> [i32; 2] {
        self.health
    }

    pub fn health_of(&self, slot: PlayerSlot) -> i32 {
        self.health[slot.index()]
    }

    /// Health in wire order
    pub fn health_vec(&self) -> Vec<i32> {
        self.health.to_vec()
    }

    pub fn reset(&mut self, starting_health: i32) {
        self.health = [starting_health; 2];
    }

    /// Subtract `damage`, never going below zero. Returns the new health.
    pub fn apply_damage(&mut self, slot: PlayerSlot, damage: i32) -> i32 {
        let health = &mut self.health[slot.index()];
        *health = health.saturating_sub(damage).max(0);
        *health
    }

    pub fn set_health(&mut self, slot: PlayerSlot, health: i32) {
        self.health[slot.index()] = health.max(0);
    }

    /// Adopt health values received from the host. Returns false, leaving the
    /// arena untouched, unless exactly two values are given.
    pub fn set_all(&mut self, health: &[i32]) -> bool {
        match health {
            [one, two] => {
                self.health = [(*one).max(0), (*two).max(0)];
                true
            }
            _ => false,
        }
    }

    pub fn is_knocked_out(&self, slot: PlayerSlot) -> bool {
        self.health[slot.index()] == 0
    }

    /// First fighter at zero health, if any
    pub fn knocked_out(&self) -> Option<PlayerSlot> {
        PlayerSlot::ALL.into_iter().find(|slot| self.is_knocked_out(*slot))
    }
}

// ----------------------------------------------------------------------------
// Logic Gate
// ----------------------------------------------------------------------------

/// Suspends game logic after the session is lost
#[derive(Debug, Default)]
pub struct LogicGate {
    suspended: bool,
}

impl LogicGate {
    pub fn suspend(&mut self) {
        if !self.suspended {
            info!("game logic suspended");
        }
        self.suspended = true;
    }

    pub fn resume(&mut self) {
        if self.suspended {
            info!("game logic resumed");
        }
        self.suspended = false;
    }

    pub fn is_suspended(&self) -> bool {
        self.suspended
    }
}

// ----------------------------------------------------------------------------
// Game Context
// ----------------------------------------------------------------------------

pub struct GameContext {
    pub config: DuelConfig,
    pub session: SessionManager,
    pub arena: Arena,
    pub animations: Box<dyn AnimationPlayer>,
    pub input: Box<dyn InputSource>,
    pub questions: Box<dyn QuestionSource>,
    pub scores: Box<dyn ScoreStore>,
    pub notifications: Notifications,
    pub gate: LogicGate,
    /// Frames run so far
    pub frame: u64,
}

impl GameContext {
    /// Context with frame-counted animations, in-memory scores, seeded
    /// questions and no local input
    pub fn new(config: DuelConfig, session: SessionManager) -> Self {
        Self {
            arena: Arena::new(config.ruleset.starting_health),
            animations: Box::new(FrameAnimator::new(config.timing.animation_frames)),
            input: Box::new(ScriptedInput::silent()),
            questions: Box::new(ArithmeticQuestions::new(config.question_seed)),
            scores: Box::new(MemoryScoreStore::new()),
            notifications: Notifications::new(),
            gate: LogicGate::default(),
            frame: 0,
            config,
            session,
        }
    }

    pub fn with_input(mut self, input: Box<dyn InputSource>) -> Self {
        self.input = input;
        self
    }

    pub fn with_scores(mut self, scores: Box<dyn ScoreStore>) -> Self {
        self.scores = scores;
        self
    }

    pub fn with_questions(mut self, questions: Box<dyn QuestionSource>) -> Self {
        self.questions = questions;
        self
    }

    pub fn with_animations(mut self, animations: Box<dyn AnimationPlayer>) -> Self {
        self.animations = animations;
        self
    }
}

impl SessionHost for GameContext {
    fn session(&mut self) -> &mut SessionManager {
        &mut self.session
    }
}

/// Advances the animation player once per frame. Lives on the game list for
/// the whole process.
pub fn animation_clock() -> impl Task<GameContext> {
    FnTask::new("animation_clock", |ctx: &mut GameContext, _commands| {
        ctx.animations.advance();
        TaskStep::Yield
    })
}
