//! DuelSync Runtime
//!
//! Owns the task scheduler and the game context for one participant and runs
//! the per-frame loop:
//!
//! 1. pump the platform session into the event queue
//! 2. tick the `network` list (session operations)
//! 3. update the active screen (session events, then messages, then the
//!    `gameplay` list)
//! 4. tick the `game` list
//!
//! ## Screens
//!
//! The runtime moves between the main menu, a pending session operation, the
//! lobby and a match. Losing the session from any screen routes through
//! session-loss handling and, once the user acknowledges the notification,
//! back to the main menu.

use duelsync_core::{
    CharacterId, DuelConfig, DuelError, DuelResult, Gamertag, Ruleset, TaskScheduler,
};
use tracing::{debug, error, info, warn};

use crate::context::{animation_clock, GameContext, GAMEPLAY_LIST, GAME_LIST};
use crate::lobby::{LobbySignal, LobbySync};
use crate::matchsync::{MatchStatus, MatchSync};
use crate::presentation::Notification;
use crate::session::{
    begin_create, begin_find, begin_join, begin_join_invited, LoopbackNetwork, OperationHandle,
    OperationOutcome, OperationStatus, SessionManager, NETWORK_LIST,
};
use crate::session_loss::handle_session_loss;

// ----------------------------------------------------------------------------
// Screens
// ----------------------------------------------------------------------------

/// Why a session operation was started
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Intent {
    Host,
    Find,
    Join,
}

enum Screen {
    MainMenu,
    Connecting {
        handle: OperationHandle,
        intent: Intent,
    },
    Lobby(LobbySync),
    Match(MatchSync),
    /// Waiting for the user to acknowledge the loss
    SessionLost,
}

/// Which screen is active, for callers that only need to know where they are
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScreenKind {
    MainMenu,
    Connecting,
    Lobby,
    Match,
    SessionLost,
}

impl Screen {
    fn kind(&self) -> ScreenKind {
        match self {
            Screen::MainMenu => ScreenKind::MainMenu,
            Screen::Connecting { .. } => ScreenKind::Connecting,
            Screen::Lobby(_) => ScreenKind::Lobby,
            Screen::Match(_) => ScreenKind::Match,
            Screen::SessionLost => ScreenKind::SessionLost,
        }
    }
}

// ----------------------------------------------------------------------------
// DuelSync Runtime
// ----------------------------------------------------------------------------

pub struct DuelRuntime {
    scheduler: TaskScheduler<GameContext>,
    ctx: GameContext,
    screen: Screen,
}

impl DuelRuntime {
    /// Create a runtime around a fully built context
    pub fn new(mut ctx: GameContext) -> DuelResult<Self> {
        ctx.config.validate()?;

        let mut scheduler = TaskScheduler::new();
        scheduler.new_task_list(NETWORK_LIST)?;
        scheduler.new_task_list(GAMEPLAY_LIST)?;
        scheduler.new_task_list(GAME_LIST)?;
        scheduler.add_task(GAME_LIST, animation_clock(), false, &mut ctx)?;

        info!(gamer = %ctx.session.local_gamer(), "runtime created");
        Ok(Self {
            scheduler,
            ctx,
            screen: Screen::MainMenu,
        })
    }

    /// Runtime for `gamer` on an in-memory network shared with other runtimes
    pub fn loopback(network: &LoopbackNetwork, gamer: impl Into<Gamertag>, config: DuelConfig) -> DuelResult<Self> {
        let gamer = gamer.into();
        let session = SessionManager::new(
            config.session.clone(),
            gamer.clone(),
            Box::new(network.platform()),
            Box::new(network.discovery(gamer)),
        );
        Self::new(GameContext::new(config, session))
    }

    // ------------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------------

    pub fn screen(&self) -> ScreenKind {
        self.screen.kind()
    }

    pub fn context(&self) -> &GameContext {
        &self.ctx
    }

    pub fn context_mut(&mut self) -> &mut GameContext {
        &mut self.ctx
    }

    pub fn scheduler(&self) -> &TaskScheduler<GameContext> {
        &self.scheduler
    }

    pub fn match_sync(&self) -> Option<&MatchSync> {
        match &self.screen {
            Screen::Match(sync) => Some(sync),
            _ => None,
        }
    }

    pub fn lobby(&self) -> Option<&LobbySync> {
        match &self.screen {
            Screen::Lobby(lobby) => Some(lobby),
            _ => None,
        }
    }

    // ------------------------------------------------------------------------
    // User Actions
    // ------------------------------------------------------------------------

    /// Create a session and open its lobby as host
    pub fn host_match(&mut self) -> DuelResult<()> {
        self.require_menu("host a match")?;
        let handle = begin_create(&mut self.scheduler, &mut self.ctx, None)?;
        self.screen = Screen::Connecting {
            handle,
            intent: Intent::Host,
        };
        Ok(())
    }

    /// Find sessions and join the first one found
    pub fn join_first_available(&mut self) -> DuelResult<()> {
        self.require_menu("join a match")?;
        let handle = begin_find(&mut self.scheduler, &mut self.ctx, None)?;
        self.screen = Screen::Connecting {
            handle,
            intent: Intent::Find,
        };
        Ok(())
    }

    /// Join the session the local gamer was invited to
    pub fn accept_invite(&mut self) -> DuelResult<()> {
        self.require_menu("accept an invite")?;
        let handle = begin_join_invited(&mut self.scheduler, &mut self.ctx, None)?;
        self.screen = Screen::Connecting {
            handle,
            intent: Intent::Join,
        };
        Ok(())
    }

    pub fn select_character(&mut self, character: CharacterId, locked: bool) -> DuelResult<()> {
        match &mut self.screen {
            Screen::Lobby(lobby) => lobby.select(&mut self.ctx, character, locked),
            other => Err(DuelError::invalid_transition(
                format!("{:?}", other.kind()),
                "characters are selected in the lobby",
            )),
        }
    }

    pub fn change_settings(&mut self, ruleset: Ruleset) -> DuelResult<()> {
        match &mut self.screen {
            Screen::Lobby(lobby) => lobby.change_settings(&mut self.ctx, ruleset),
            other => Err(DuelError::invalid_transition(
                format!("{:?}", other.kind()),
                "settings are changed in the lobby",
            )),
        }
    }

    /// Dismiss the current notification. After a session loss this resumes
    /// game logic and returns to the main menu. Returns false if there was
    /// nothing to acknowledge.
    pub fn acknowledge_notification(&mut self) -> bool {
        let Some(notification) = self.ctx.notifications.acknowledge() else {
            return false;
        };
        debug!(title = %notification.title, "notification acknowledged");
        if self.ctx.notifications.is_empty() && self.ctx.gate.is_suspended() {
            self.ctx.gate.resume();
            self.screen = Screen::MainMenu;
            info!("returned to main menu");
        }
        true
    }

    fn require_menu(&self, action: &str) -> DuelResult<()> {
        match self.screen {
            Screen::MainMenu => Ok(()),
            ref other => Err(DuelError::invalid_transition(
                format!("{:?}", other.kind()),
                format!("cannot {action} outside the main menu"),
            )),
        }
    }

    // ------------------------------------------------------------------------
    // Frame Loop
    // ------------------------------------------------------------------------

    /// Run one frame
    pub fn update(&mut self) -> DuelResult<()> {
        self.ctx.frame += 1;
        self.ctx.session.pump();
        self.scheduler.tick(NETWORK_LIST, &mut self.ctx)?;

        if !self.ctx.gate.is_suspended() {
            let screen = std::mem::replace(&mut self.screen, Screen::MainMenu);
            let (next, result) = self.update_screen(screen);
            self.screen = next;
            if let Err(error) = result {
                error!(screen = ?self.screen.kind(), %error, "screen update failed");
                return Err(error);
            }
        }

        self.scheduler.tick(GAME_LIST, &mut self.ctx)?;
        Ok(())
    }

    /// Advance `screen` by one frame. On failure the screen that was being
    /// updated comes back alongside the error.
    fn update_screen(&mut self, screen: Screen) -> (Screen, DuelResult<()>) {
        match screen {
            Screen::MainMenu => (Screen::MainMenu, Ok(())),
            Screen::Connecting { handle, intent } => {
                let status = handle.borrow().clone();
                match status {
                    OperationStatus::Pending => (Screen::Connecting { handle, intent }, Ok(())),
                    OperationStatus::Succeeded(outcome) => {
                        settle(self.connected(outcome).map(Some), Screen::MainMenu)
                    }
                    OperationStatus::Failed(error) => {
                        warn!(%error, ?intent, "could not connect");
                        self.ctx
                            .notifications
                            .push(Notification::new("Connection failed", error.to_string()));
                        (Screen::MainMenu, Ok(()))
                    }
                }
            }
            Screen::Lobby(mut lobby) => {
                let next = lobby
                    .update(&mut self.ctx)
                    .and_then(|signal| self.lobby_signal(signal));
                settle(next, Screen::Lobby(lobby))
            }
            Screen::Match(mut sync) => {
                let next = sync
                    .update(&mut self.scheduler, &mut self.ctx)
                    .and_then(|status| match status {
                        MatchStatus::Running | MatchStatus::Finished => Ok(None),
                        MatchStatus::SessionLost(reason) => {
                            handle_session_loss(reason, &mut self.scheduler, &mut self.ctx)?;
                            Ok(Some(Screen::SessionLost))
                        }
                    });
                settle(next, Screen::Match(sync))
            }
            Screen::SessionLost => (Screen::SessionLost, Ok(())),
        }
    }

    /// Screen the lobby hands over to, `None` to stay in it
    fn lobby_signal(&mut self, signal: LobbySignal) -> DuelResult<Option<Screen>> {
        match signal {
            LobbySignal::Idle => Ok(None),
            LobbySignal::StartMatch(setup) => {
                let sync = MatchSync::start(setup, &mut self.scheduler, &mut self.ctx)?;
                Ok(Some(Screen::Match(sync)))
            }
            LobbySignal::MatchInProgress(pack) => {
                let sync = MatchSync::late_join(&mut self.scheduler, &mut self.ctx, Some(pack))?;
                Ok(Some(Screen::Match(sync)))
            }
            LobbySignal::SessionLost(reason) => {
                handle_session_loss(reason, &mut self.scheduler, &mut self.ctx)?;
                Ok(Some(Screen::SessionLost))
            }
        }
    }

    fn connected(&mut self, outcome: OperationOutcome) -> DuelResult<Screen> {
        match outcome {
            OperationOutcome::Created(_) => Ok(Screen::Lobby(LobbySync::new_host(&mut self.ctx)?)),
            OperationOutcome::Found(sessions) => match sessions.first() {
                Some(available) => {
                    info!(session = %available.id, host = %available.host, "joining session");
                    let handle = begin_join(&mut self.scheduler, &mut self.ctx, available.id, None)?;
                    Ok(Screen::Connecting {
                        handle,
                        intent: Intent::Join,
                    })
                }
                None => {
                    info!("no sessions found");
                    self.ctx
                        .notifications
                        .push(Notification::new("No matches", "No joinable session was found."));
                    Ok(Screen::MainMenu)
                }
            },
            OperationOutcome::Joined(_) => {
                if self.ctx.session.is_game_in_progress() {
                    let sync = MatchSync::late_join(&mut self.scheduler, &mut self.ctx, None)?;
                    Ok(Screen::Match(sync))
                } else {
                    Ok(Screen::Lobby(LobbySync::new_client(&mut self.ctx)?))
                }
            }
        }
    }
}

/// Move to `next` when the frame produced one, otherwise keep `current`
fn settle(next: DuelResult<Option<Screen>>, current: Screen) -> (Screen, DuelResult<()>) {
    match next {
        Ok(Some(screen)) => (screen, Ok(())),
        Ok(None) => (current, Ok(())),
        Err(error) => (current, Err(error)),
    }
}
