//! Centralized Configuration Management
//!
//! All tunables of a duel live here: the ruleset (which also travels on the
//! wire so late joiners adopt the host's rules), frame timings for the
//! scripted phases, and session limits.

use serde::{Deserialize, Serialize};

use crate::errors::{DuelError, Result};

// ----------------------------------------------------------------------------
// Ruleset
// ----------------------------------------------------------------------------

/// Match rules chosen by the host and replicated to every participant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Ruleset {
    /// Health each fighter starts the match with
    pub starting_health: i32,
    /// Damage dealt by one successful attack
    pub damage_per_hit: i32,
    /// Questions asked before the match is decided on health
    pub questions_per_match: u32,
    /// Frames the answer window stays open
    pub answer_time_frames: u32,
}

impl Default for Ruleset {
    fn default() -> Self {
        Self {
            starting_health: 100,
            damage_per_hit: 20,
            questions_per_match: 10,
            answer_time_frames: 600, // 10 seconds at 60 fps
        }
    }
}

impl Ruleset {
    /// Short matches for tests and demos
    pub fn quick() -> Self {
        Self {
            starting_health: 40,
            damage_per_hit: 20,
            questions_per_match: 3,
            answer_time_frames: 30,
        }
    }

    /// Longer matches with less damage per hit
    pub fn tournament() -> Self {
        Self {
            starting_health: 150,
            damage_per_hit: 15,
            questions_per_match: 20,
            answer_time_frames: 480,
        }
    }

    /// Check that the rules can produce a finite match
    pub fn validate(&self) -> Result<()> {
        if self.starting_health <= 0 {
            return Err(DuelError::config_error("starting_health must be positive"));
        }
        if self.damage_per_hit <= 0 {
            return Err(DuelError::config_error("damage_per_hit must be positive"));
        }
        if self.questions_per_match == 0 {
            return Err(DuelError::config_error("questions_per_match must be at least 1"));
        }
        if self.answer_time_frames == 0 {
            return Err(DuelError::config_error("answer_time_frames must be at least 1"));
        }
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Timing Configuration
// ----------------------------------------------------------------------------

/// Frame counts for the scripted phases of a match
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    pub intro_frames: u32,
    pub question_intro_frames: u32,
    pub question_display_frames: u32,
    pub no_answer_frames: u32,
    pub question_outro_frames: u32,
    pub outro_frames: u32,
    /// Frames each attack/hit/KO animation plays for
    pub animation_frames: u32,
    /// Upper bound on inbound messages handled per frame
    pub max_messages_per_frame: usize,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            intro_frames: 180,
            question_intro_frames: 60,
            question_display_frames: 90,
            no_answer_frames: 45,
            question_outro_frames: 60,
            outro_frames: 240,
            animation_frames: 40,
            max_messages_per_frame: 16,
        }
    }
}

impl TimingConfig {
    /// Minimal frame counts so tests run in a handful of ticks
    pub fn testing() -> Self {
        Self {
            intro_frames: 2,
            question_intro_frames: 1,
            question_display_frames: 1,
            no_answer_frames: 1,
            question_outro_frames: 1,
            outro_frames: 2,
            animation_frames: 2,
            max_messages_per_frame: 16,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_messages_per_frame == 0 {
            return Err(DuelError::config_error(
                "max_messages_per_frame must be at least 1",
            ));
        }
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Session Configuration
// ----------------------------------------------------------------------------

/// Limits applied to the network session
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Maximum gamers (players and spectators) in one session
    pub max_gamers: usize,
    /// A platform operation still pending after this many frames is a transport fault
    pub operation_timeout_frames: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_gamers: 8,
            operation_timeout_frames: 600,
        }
    }
}

impl SessionConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_gamers < 2 {
            return Err(DuelError::config_error("max_gamers must allow two players"));
        }
        if self.operation_timeout_frames == 0 {
            return Err(DuelError::config_error(
                "operation_timeout_frames must be at least 1",
            ));
        }
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Aggregate Configuration
// ----------------------------------------------------------------------------

/// Complete configuration for a DuelSync instance
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DuelConfig {
    pub ruleset: Ruleset,
    pub timing: TimingConfig,
    pub session: SessionConfig,
    /// Seed for host-side question generation
    pub question_seed: u64,
}

impl DuelConfig {
    /// Configuration tuned for fast, deterministic tests
    pub fn testing() -> Self {
        Self {
            ruleset: Ruleset::quick(),
            timing: TimingConfig::testing(),
            session: SessionConfig::default(),
            question_seed: 7,
        }
    }

    /// Validate every section
    pub fn validate(&self) -> Result<()> {
        self.ruleset.validate()?;
        self.timing.validate()?;
        self.session.validate()
    }
}
