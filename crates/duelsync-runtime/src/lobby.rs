//! Character selection synchronization
//!
//! The host owns the player list and the ruleset. Clients propose their own
//! selection and adopt whatever the host broadcasts. Once the first two
//! gamers have locked in, the host sends everyone to the versus screen and
//! each side starts its `MatchSync`.

use duelsync_core::{
    CharacterId, DuelError, DuelResult, Gamertag, MessageSlot, NetworkMessage, PlayerEntry,
    Ruleset, TransportError, WelcomePack,
};
use tracing::{debug, info, warn};

use crate::context::GameContext;
use crate::matchsync::{MatchSetup, Role};
use crate::session::{recover_transport, Received, SessionEndReason, SessionEvent};

/// Character picked before anyone moves the cursor
pub const DEFAULT_CHARACTER: CharacterId = 0;

/// What a frame of lobby logic produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LobbySignal {
    Idle,
    /// Everyone moves to the versus screen and the match begins
    StartMatch(MatchSetup),
    /// Client only: the host is already fighting and answered with this pack
    MatchInProgress(WelcomePack),
    SessionLost(SessionEndReason),
}

pub struct LobbySync {
    role: Role,
    local: Gamertag,
    host: Gamertag,
    players: Vec<PlayerEntry>,
    ruleset: Ruleset,
    slot: MessageSlot,
    /// Host: the player list changed and must be rebroadcast
    dirty: bool,
    /// Client: the host's selection state has arrived
    welcomed: bool,
}

impl LobbySync {
    /// Open the lobby on the hosting side
    pub fn new_host(ctx: &mut GameContext) -> DuelResult<Self> {
        if !ctx.session.is_host() {
            return Err(DuelError::invalid_transition("lobby", "local gamer is not the host"));
        }
        let local = ctx.session.local_gamer().clone();
        let mut lobby = Self::blank(Role::Host, local.clone(), local, ctx);
        lobby.welcomed = true;
        lobby.dirty = true;
        info!(host = %lobby.host, players = lobby.players.len(), "lobby opened");
        Ok(lobby)
    }

    /// Enter the lobby of a joined session and ask the host for its state
    pub fn new_client(ctx: &mut GameContext) -> DuelResult<Self> {
        let host = ctx.session.host_gamer().ok_or(TransportError::NoSession)?;
        let local = ctx.session.local_gamer().clone();
        let lobby = Self::blank(Role::Client, local.clone(), host, ctx);
        info!(local = %local, host = %lobby.host, "entered lobby");
        recover_transport(
            ctx.session
                .send_to_host(&NetworkMessage::GameStateJoined { gamertag: local }),
        )?;
        Ok(lobby)
    }

    fn blank(role: Role, local: Gamertag, host: Gamertag, ctx: &GameContext) -> Self {
        let players = ctx.session.gamers().into_iter().map(unselected).collect();
        Self {
            role,
            local,
            host,
            players,
            ruleset: ctx.config.ruleset,
            slot: MessageSlot::new(),
            dirty: false,
            welcomed: false,
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn players(&self) -> &[PlayerEntry] {
        &self.players
    }

    pub fn ruleset(&self) -> &Ruleset {
        &self.ruleset
    }

    /// Whether the host's selection state has been received
    pub fn is_welcomed(&self) -> bool {
        self.welcomed
    }

    pub fn entry(&self, gamer: &Gamertag) -> Option<&PlayerEntry> {
        self.players.iter().find(|p| &p.gamertag == gamer)
    }

    // ------------------------------------------------------------------------
    // Local Actions
    // ------------------------------------------------------------------------

    /// Move the local cursor or lock in a character
    pub fn select(&mut self, ctx: &mut GameContext, character: CharacterId, locked: bool) -> DuelResult<()> {
        debug!(local = %self.local, character, locked, "local selection");
        match self.role {
            Role::Host => {
                let local = self.local.clone();
                self.apply_selection(&local, character, locked);
                Ok(())
            }
            Role::Client => {
                let movement = NetworkMessage::SelectionMovement {
                    gamertag: self.local.clone(),
                    character,
                    locked,
                };
                recover_transport(ctx.session.send_to_host(&movement))
            }
        }
    }

    /// Host: change the ruleset for the coming match
    pub fn change_settings(&mut self, ctx: &mut GameContext, ruleset: Ruleset) -> DuelResult<()> {
        if !self.role.is_host() {
            return Err(DuelError::invalid_transition("lobby", "only the host changes settings"));
        }
        ruleset.validate()?;
        self.ruleset = ruleset;
        ctx.config.ruleset = ruleset;
        info!(?ruleset, "settings changed");
        recover_transport(ctx.session.send_to_all(&NetworkMessage::SettingsChanged { ruleset }))
    }

    // ------------------------------------------------------------------------
    // Frame Update
    // ------------------------------------------------------------------------

    pub fn update(&mut self, ctx: &mut GameContext) -> DuelResult<LobbySignal> {
        while let Some(event) = ctx.session.get_next_event() {
            match event {
                SessionEvent::SessionEnded { reason } => return Ok(LobbySignal::SessionLost(reason)),
                SessionEvent::GamerJoined { gamer } => self.gamer_joined(gamer),
                SessionEvent::GamerLeft { gamer } => self.gamer_left(&gamer),
                SessionEvent::GameStarted | SessionEvent::GameEnded => {
                    debug!(?event, "session lifecycle event in lobby");
                }
            }
        }

        for _ in 0..ctx.config.timing.max_messages_per_frame {
            let received = if self.role.is_host() {
                ctx.session.receive_from_client(&mut self.slot)?
            } else {
                ctx.session.receive_from_host(&mut self.slot)?
            };
            match received {
                Received::Nothing => break,
                Received::Discarded => continue,
                Received::Filled | Received::Occupied => {}
            }
            let Some((sender, message)) = self.slot.consume() else {
                continue;
            };
            let signal = match self.role {
                Role::Host => self.host_message(ctx, sender, message)?,
                Role::Client => self.client_message(ctx, message),
            };
            if signal != LobbySignal::Idle {
                return Ok(signal);
            }
        }

        if self.role.is_host() {
            if self.dirty {
                self.dirty = false;
                let list = NetworkMessage::PlayerList {
                    players: self.players.clone(),
                };
                recover_transport(ctx.session.send_to_all(&list))?;
            }
            if let Some(setup) = self.ready_to_fight() {
                return self.go_to_versus(ctx, setup);
            }
        }
        Ok(LobbySignal::Idle)
    }

    fn gamer_joined(&mut self, gamer: Gamertag) {
        if self.entry(&gamer).is_some() {
            debug!(%gamer, "gamer already in lobby");
            return;
        }
        info!(%gamer, "gamer joined lobby");
        self.players.push(unselected(gamer));
        self.dirty = true;
    }

    fn gamer_left(&mut self, gamer: &Gamertag) {
        let before = self.players.len();
        self.players.retain(|p| &p.gamertag != gamer);
        if self.players.len() != before {
            info!(%gamer, "gamer left lobby");
            self.dirty = true;
        }
    }

    fn apply_selection(&mut self, gamer: &Gamertag, character: CharacterId, locked: bool) {
        match self.players.iter_mut().find(|p| &p.gamertag == gamer) {
            Some(entry) => {
                entry.character = character;
                entry.locked = locked;
                self.dirty = true;
            }
            None => debug!(%gamer, "selection for a gamer not in the lobby"),
        }
    }

    // ------------------------------------------------------------------------
    // Host Side
    // ------------------------------------------------------------------------

    fn host_message(
        &mut self,
        ctx: &mut GameContext,
        sender: Gamertag,
        message: NetworkMessage,
    ) -> DuelResult<LobbySignal> {
        match message {
            NetworkMessage::SelectionMovement {
                gamertag,
                character,
                locked,
            } => {
                if gamertag == sender {
                    self.apply_selection(&gamertag, character, locked);
                } else {
                    warn!(%sender, claimed = %gamertag, "selection for another gamer rejected");
                }
            }
            NetworkMessage::GameStateJoined { .. } => {
                self.gamer_joined(sender.clone());
                let pack = WelcomePack::Selection {
                    players: self.players.clone(),
                    ruleset: self.ruleset,
                };
                recover_transport(ctx.session.send_to(&sender, &NetworkMessage::WelcomePack(pack)))?;
            }
            other => debug!(kind = other.discriminator(), %sender, "unexpected lobby message dropped"),
        }
        Ok(LobbySignal::Idle)
    }

    /// The first two gamers in the list have both locked in
    fn ready_to_fight(&self) -> Option<MatchSetup> {
        match self.players.as_slice() {
            [one, two, ..] if one.locked && two.locked => Some(MatchSetup {
                role: self.role,
                local: self.local.clone(),
                host: self.host.clone(),
                all_players: self.players.iter().map(|p| p.gamertag.clone()).collect(),
                active_players: vec![one.gamertag.clone(), two.gamertag.clone()],
                characters: vec![one.character, two.character],
                ruleset: self.ruleset,
            }),
            _ => None,
        }
    }

    fn go_to_versus(&mut self, ctx: &mut GameContext, setup: MatchSetup) -> DuelResult<LobbySignal> {
        info!(fighters = ?setup.active_players, "both fighters locked in");
        let versus = NetworkMessage::GotoVsScreen {
            active_players: setup.active_players.clone(),
            characters: setup.characters.clone(),
        };
        recover_transport(ctx.session.send_to_all(&versus))?;
        if let Err(error) = ctx.session.start_game() {
            warn!(%error, "could not mark the game as started");
        }
        Ok(LobbySignal::StartMatch(setup))
    }

    // ------------------------------------------------------------------------
    // Client Side
    // ------------------------------------------------------------------------

    /// A ruleset from the host that fails validation leaves the current one in place
    fn adopt_ruleset(&mut self, ctx: &mut GameContext, ruleset: Ruleset) {
        match ruleset.validate() {
            Ok(()) => {
                self.ruleset = ruleset;
                ctx.config.ruleset = ruleset;
            }
            Err(error) => warn!(?ruleset, %error, "host ruleset ignored"),
        }
    }

    fn client_message(&mut self, ctx: &mut GameContext, message: NetworkMessage) -> LobbySignal {
        match message {
            NetworkMessage::PlayerList { players } => {
                self.players = players;
            }
            NetworkMessage::SettingsChanged { ruleset } => {
                info!(?ruleset, "host changed settings");
                self.adopt_ruleset(ctx, ruleset);
            }
            NetworkMessage::WelcomePack(WelcomePack::Selection { players, ruleset }) => {
                self.players = players;
                self.adopt_ruleset(ctx, ruleset);
                self.welcomed = true;
                info!(players = self.players.len(), "lobby state received");
            }
            NetworkMessage::WelcomePack(pack @ WelcomePack::Gameplay { .. }) => {
                info!("host is already in a match");
                return LobbySignal::MatchInProgress(pack);
            }
            NetworkMessage::GotoVsScreen {
                active_players,
                characters,
            } => {
                let mut all_players: Vec<Gamertag> =
                    self.players.iter().map(|p| p.gamertag.clone()).collect();
                for gamer in ctx.session.gamers() {
                    if !all_players.contains(&gamer) {
                        all_players.push(gamer);
                    }
                }
                info!(fighters = ?active_players, "going to the versus screen");
                return LobbySignal::StartMatch(MatchSetup {
                    role: Role::Client,
                    local: self.local.clone(),
                    host: self.host.clone(),
                    all_players,
                    active_players,
                    characters,
                    ruleset: self.ruleset,
                });
            }
            other => debug!(kind = other.discriminator(), "unexpected lobby message dropped"),
        }
        LobbySignal::Idle
    }
}

fn unselected(gamertag: Gamertag) -> PlayerEntry {
    PlayerEntry {
        gamertag,
        character: DEFAULT_CHARACTER,
        locked: false,
    }
}
