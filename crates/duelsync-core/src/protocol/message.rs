//! Network message catalogue
//!
//! Every message exchanged between host and clients is one variant of the
//! closed `NetworkMessage` enum. Payload records that appear inside messages
//! (questions, inputs, roster entries, highscores) are defined alongside.

use serde::{Deserialize, Serialize};

use crate::config::Ruleset;
use crate::types::{CharacterId, Gamertag, PlayerSlot};

// ----------------------------------------------------------------------------
// Payload Records
// ----------------------------------------------------------------------------

/// Content of one quiz question, generated by the host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub prompt: String,
    pub answers: Vec<String>,
    /// Index into `answers`
    pub correct_answer: u8,
}

impl Question {
    /// Whether `answer` picks the correct entry
    pub fn is_correct(&self, answer: u8) -> bool {
        answer == self.correct_answer
    }
}

/// One fighter's host-confirmed input for the current question
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputRecord {
    pub slot: PlayerSlot,
    /// Chosen answer, `None` while nothing has been pressed
    pub answer: Option<u8>,
    /// Increments each time the fighter's input changes
    pub sequence: u32,
}

/// A gamer on the character selection screen
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerEntry {
    pub gamertag: Gamertag,
    pub character: CharacterId,
    pub locked: bool,
}

/// A row of the end-of-match highscore table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HighscoreEntry {
    pub gamertag: Gamertag,
    pub wins: u32,
    pub best_health: i32,
}

// ----------------------------------------------------------------------------
// Welcome Pack
// ----------------------------------------------------------------------------

/// World state sent once to a gamer that joins a session already in progress
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WelcomePack {
    /// Joined while characters are being selected
    Selection {
        players: Vec<PlayerEntry>,
        ruleset: Ruleset,
    },
    /// Joined while a match is being fought
    Gameplay {
        all_players: Vec<Gamertag>,
        active_players: Vec<Gamertag>,
        characters: Vec<CharacterId>,
        health: Vec<i32>,
        question_index: u32,
        ruleset: Ruleset,
    },
}

impl WelcomePack {
    /// Sub-kind written after the `WelcomePack` discriminator
    pub fn kind(&self) -> &'static str {
        match self {
            WelcomePack::Selection { .. } => "selection",
            WelcomePack::Gameplay { .. } => "gameplay",
        }
    }
}

// ----------------------------------------------------------------------------
// Network Message
// ----------------------------------------------------------------------------

/// A message exchanged between host and clients
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum NetworkMessage {
    /// Empty slot; never written and never interpreted
    #[default]
    Undefined,
    /// Client acknowledges the latest snapshot and asks for the next question
    ReadyForNextQuestion { question_index: u32 },
    /// Host re-aligns every participant's health before a question
    SyncSnapshot { question_index: u32, health: Vec<i32> },
    /// Host publishes the question every side must display
    QuestionContent { question_index: u32, question: Question },
    /// Input for a question. From a client: its own tentative input. From the
    /// host: the confirmed vector, ordered by confirmation time.
    PlayerInputs {
        question_index: u32,
        window_closed: bool,
        inputs: Vec<InputRecord>,
    },
    SettingsChanged { ruleset: Ruleset },
    PlayerList { players: Vec<PlayerEntry> },
    SelectionMovement {
        gamertag: Gamertag,
        character: CharacterId,
        locked: bool,
    },
    GotoVsScreen {
        active_players: Vec<Gamertag>,
        characters: Vec<CharacterId>,
    },
    /// A late joiner announces itself and requests a welcome pack
    GameStateJoined { gamertag: Gamertag },
    WelcomePack(WelcomePack),
    /// Match outcome; `winner` is `None` on a draw
    PlayerWins {
        winner: Option<Gamertag>,
        final_health: Vec<i32>,
    },
    Highscores { entries: Vec<HighscoreEntry> },
}

impl NetworkMessage {
    /// Discriminator string that leads the message on the wire
    pub fn discriminator(&self) -> &'static str {
        match self {
            NetworkMessage::Undefined => "Undefined",
            NetworkMessage::ReadyForNextQuestion { .. } => "ReadyForNextQuestion",
            NetworkMessage::SyncSnapshot { .. } => "SyncSnapshot",
            NetworkMessage::QuestionContent { .. } => "QuestionContent",
            NetworkMessage::PlayerInputs { .. } => "PlayerInputs",
            NetworkMessage::SettingsChanged { .. } => "SettingsChanged",
            NetworkMessage::PlayerList { .. } => "PlayerList",
            NetworkMessage::SelectionMovement { .. } => "SelectionMovement",
            NetworkMessage::GotoVsScreen { .. } => "GotoVsScreen",
            NetworkMessage::GameStateJoined { .. } => "GameStateJoined",
            NetworkMessage::WelcomePack(_) => "WelcomePack",
            NetworkMessage::PlayerWins { .. } => "PlayerWins",
            NetworkMessage::Highscores { .. } => "Highscores",
        }
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, NetworkMessage::Undefined)
    }
}
