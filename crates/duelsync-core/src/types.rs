//! Core types for DuelSync
//!
//! Newtypes for the identities that cross the wire, so a gamertag is never
//! confused with an arbitrary string and a fighter slot is never an
//! out-of-range index.

use core::fmt;
use core::ops::Deref;
use serde::{Deserialize, Serialize};

// ----------------------------------------------------------------------------
// Gamertag
// ----------------------------------------------------------------------------

/// Platform-unique name of a gamer in a session
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Gamertag(String);

impl Gamertag {
    /// Create a new gamertag
    pub fn new<T: Into<String>>(name: T) -> Self {
        Self(name.into())
    }

    /// Get the gamertag as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume into the inner string
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for Gamertag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Deref for Gamertag {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<&str> for Gamertag {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for Gamertag {
    fn from(name: String) -> Self {
        Self(name)
    }
}

// ----------------------------------------------------------------------------
// Player Slot
// ----------------------------------------------------------------------------

/// One of the two fighter positions in a match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlayerSlot {
    One,
    Two,
}

impl PlayerSlot {
    /// Both slots in wire order
    pub const ALL: [PlayerSlot; 2] = [PlayerSlot::One, PlayerSlot::Two];

    /// Index into per-slot arrays (health, characters, inputs)
    pub fn index(self) -> usize {
        match self {
            PlayerSlot::One => 0,
            PlayerSlot::Two => 1,
        }
    }

    /// The opposing slot
    pub fn opponent(self) -> PlayerSlot {
        match self {
            PlayerSlot::One => PlayerSlot::Two,
            PlayerSlot::Two => PlayerSlot::One,
        }
    }

    /// Slot for a wire index, if valid
    pub fn from_index(index: usize) -> Option<PlayerSlot> {
        match index {
            0 => Some(PlayerSlot::One),
            1 => Some(PlayerSlot::Two),
            _ => None,
        }
    }
}

impl fmt::Display for PlayerSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlayerSlot::One => write!(f, "P1"),
            PlayerSlot::Two => write!(f, "P2"),
        }
    }
}

/// Index of a selectable fighter character
pub type CharacterId = i32;
