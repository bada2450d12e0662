//! Match roster
//!
//! Who is in the session, who has been welcomed into the match, and which two
//! gamers are fighting in which slot.

use std::collections::BTreeSet;

use duelsync_core::{CharacterId, Gamertag, PlayerSlot, Ruleset};
use tracing::debug;

use super::state::Role;

/// Everything needed to start a match from the versus screen
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchSetup {
    pub role: Role,
    pub local: Gamertag,
    pub host: Gamertag,
    pub all_players: Vec<Gamertag>,
    /// The two fighters, in slot order
    pub active_players: Vec<Gamertag>,
    pub characters: Vec<CharacterId>,
    pub ruleset: Ruleset,
}

#[derive(Debug, Clone, Default)]
pub struct Roster {
    /// Gamers present, in join order
    gamers: Vec<Gamertag>,
    /// Gamers the host has brought up to date with the match
    welcomed: BTreeSet<Gamertag>,
    active: Vec<Gamertag>,
    characters: Vec<CharacterId>,
}

impl Roster {
    /// Roster for a match started by everyone present
    pub fn from_setup(setup: &MatchSetup) -> Self {
        Self {
            gamers: setup.all_players.clone(),
            welcomed: setup.all_players.iter().cloned().collect(),
            active: setup.active_players.clone(),
            characters: setup.characters.clone(),
        }
    }

    /// Roster of a late joiner before the welcome pack arrives
    pub fn observed(gamers: Vec<Gamertag>) -> Self {
        Self {
            gamers,
            ..Self::default()
        }
    }

    pub fn gamers(&self) -> &[Gamertag] {
        &self.gamers
    }

    pub fn active(&self) -> &[Gamertag] {
        &self.active
    }

    pub fn characters(&self) -> &[CharacterId] {
        &self.characters
    }

    pub fn contains(&self, gamer: &Gamertag) -> bool {
        self.gamers.contains(gamer)
    }

    /// Returns false, changing nothing, if the gamer is already present
    pub fn add(&mut self, gamer: Gamertag) -> bool {
        if self.contains(&gamer) {
            debug!(%gamer, "gamer already in roster");
            return false;
        }
        self.gamers.push(gamer);
        true
    }

    /// Remove a departed gamer. Active fighters keep their slot so the match
    /// can still be decided against them.
    pub fn remove(&mut self, gamer: &Gamertag) -> bool {
        let before = self.gamers.len();
        self.gamers.retain(|g| g != gamer);
        self.welcomed.remove(gamer);
        self.gamers.len() != before
    }

    pub fn welcome(&mut self, gamer: &Gamertag) {
        self.welcomed.insert(gamer.clone());
    }

    pub fn is_welcomed(&self, gamer: &Gamertag) -> bool {
        self.welcomed.contains(gamer)
    }

    /// Welcomed gamers still present, other than `host`
    pub fn welcomed_clients(&self, host: &Gamertag) -> BTreeSet<Gamertag> {
        self.gamers
            .iter()
            .filter(|g| *g != host && self.welcomed.contains(*g))
            .cloned()
            .collect()
    }

    pub fn slot_of(&self, gamer: &Gamertag) -> Option<PlayerSlot> {
        self.active
            .iter()
            .position(|g| g == gamer)
            .and_then(PlayerSlot::from_index)
    }

    pub fn player_in(&self, slot: PlayerSlot) -> Option<&Gamertag> {
        self.active.get(slot.index())
    }

    /// Merge the host's view into the locally observed roster. Gamers seen
    /// locally but missing from the host's list joined after the pack was
    /// built and are kept.
    pub fn reconcile(
        &mut self,
        all_players: &[Gamertag],
        active_players: &[Gamertag],
        characters: &[CharacterId],
    ) {
        let mut merged: Vec<Gamertag> = all_players.to_vec();
        for gamer in &self.gamers {
            if !merged.contains(gamer) {
                merged.push(gamer.clone());
            }
        }
        self.gamers = merged;
        self.welcomed = all_players.iter().cloned().collect();
        self.active = active_players.to_vec();
        self.characters = characters.to_vec();
    }
}
