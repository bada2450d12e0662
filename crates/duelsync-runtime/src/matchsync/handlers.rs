//! Session event and message handling for `MatchSync`
//!
//! Every inbound message is either consumed or deferred: a deferred message
//! stays in the slot and blocks the ones behind it until a later state can
//! use it. Messages a state never expects are consumed and dropped.

use duelsync_core::{
    DuelResult, Gamertag, InputRecord, NetworkMessage, TaskScheduler, WelcomePack,
};
use tracing::{debug, info, warn};

use super::state::{Disposition, JoiningState, MatchState};
use super::sync::MatchSync;
use super::tasks::ConcludeTask;
use crate::context::GameContext;
use crate::session::{Received, SessionEndReason, SessionEvent};

impl MatchSync {
    // ------------------------------------------------------------------------
    // Session Events
    // ------------------------------------------------------------------------

    /// Handle queued session events. Returns the reason if the session ended.
    pub(super) fn drain_events(
        &mut self,
        scheduler: &mut TaskScheduler<GameContext>,
        ctx: &mut GameContext,
    ) -> DuelResult<Option<SessionEndReason>> {
        while let Some(event) = ctx.session.get_next_event() {
            if event.is_roster_change() && self.state == MatchState::Concluding {
                debug!(?event, "conclusion in progress, roster event deferred");
                ctx.session.push_back_event(event);
                break;
            }
            match event {
                SessionEvent::SessionEnded { reason } => return Ok(Some(reason)),
                SessionEvent::GamerJoined { gamer } => {
                    if self.roster.add(gamer.clone()) {
                        info!(%gamer, "gamer joined during match");
                    }
                }
                SessionEvent::GamerLeft { gamer } => self.handle_departure(&gamer, scheduler, ctx)?,
                SessionEvent::GameStarted | SessionEvent::GameEnded => {
                    debug!(?event, "session lifecycle event");
                }
            }
        }
        Ok(None)
    }

    fn handle_departure(
        &mut self,
        gamer: &Gamertag,
        scheduler: &mut TaskScheduler<GameContext>,
        ctx: &mut GameContext,
    ) -> DuelResult<()> {
        if !self.roster.remove(gamer) {
            debug!(%gamer, "departure of unknown gamer ignored");
            return Ok(());
        }
        self.awaiting_ready.remove(gamer);
        self.early_ready.retain(|(_, g)| g != gamer);
        info!(%gamer, "gamer left during match");

        let Some(slot) = self.roster.slot_of(gamer) else {
            return Ok(());
        };
        if self.concluded {
            return Ok(());
        }
        if !self.role.is_host() {
            info!(%gamer, %slot, "fighter left, waiting for the host's verdict");
            return Ok(());
        }

        warn!(%gamer, %slot, "fighter left the match, awarding the win to the opponent");
        self.begin_conclusion(
            ConcludeTask::forfeit(slot),
            Some(slot.opponent()),
            scheduler,
            ctx,
        )
    }

    // ------------------------------------------------------------------------
    // Message Loop
    // ------------------------------------------------------------------------

    pub(super) fn process_messages(
        &mut self,
        scheduler: &mut TaskScheduler<GameContext>,
        ctx: &mut GameContext,
    ) -> DuelResult<()> {
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

            let Some(sender) = self.slot.sender().cloned() else {
                self.slot.clear();
                continue;
            };
            let message = self.slot.peek().clone();
            let disposition = if self.role.is_host() {
                self.host_message(sender, message, scheduler, ctx)?
            } else {
                self.client_message(message, scheduler, ctx)?
            };

            match disposition {
                Disposition::Consumed => self.slot.clear(),
                Disposition::Deferred => {
                    debug!(kind = self.slot.peek().discriminator(), state = %self.state, "message deferred");
                    break;
                }
            }
        }
        Ok(())
    }

    fn unexpected(&self, message: &NetworkMessage) -> Disposition {
        debug!(
            kind = message.discriminator(),
            state = %self.state,
            joining = ?self.joining,
            "unexpected message dropped"
        );
        Disposition::Consumed
    }

    // ------------------------------------------------------------------------
    // Host Side
    // ------------------------------------------------------------------------

    fn host_message(
        &mut self,
        sender: Gamertag,
        message: NetworkMessage,
        scheduler: &mut TaskScheduler<GameContext>,
        ctx: &mut GameContext,
    ) -> DuelResult<Disposition> {
        match message {
            NetworkMessage::ReadyForNextQuestion { question_index } => {
                self.record_ready(sender, question_index);
                Ok(Disposition::Consumed)
            }
            NetworkMessage::PlayerInputs {
                question_index,
                inputs,
                ..
            } => self.client_inputs(sender, question_index, inputs, scheduler, ctx),
            NetworkMessage::GameStateJoined { gamertag } => {
                if gamertag != sender {
                    warn!(claimed = %gamertag, %sender, "join announcement names another gamer");
                }
                self.welcome(sender, ctx)?;
                Ok(Disposition::Consumed)
            }
            other => Ok(self.unexpected(&other)),
        }
    }

    fn record_ready(&mut self, sender: Gamertag, question_index: u32) {
        let next = self.question_index + 1;
        if self.state == MatchState::WaitForReady && question_index == next {
            if self.awaiting_ready.remove(&sender) {
                debug!(%sender, remaining = self.awaiting_ready.len(), "ready acknowledged");
            }
        } else if question_index > self.question_index {
            debug!(%sender, question_index, "early ready recorded");
            self.early_ready.insert((question_index, sender));
        } else {
            debug!(%sender, question_index, "stale ready dropped");
        }
    }

    fn client_inputs(
        &mut self,
        sender: Gamertag,
        question_index: u32,
        inputs: Vec<InputRecord>,
        scheduler: &mut TaskScheduler<GameContext>,
        ctx: &mut GameContext,
    ) -> DuelResult<Disposition> {
        if question_index != self.question_index {
            debug!(%sender, question_index, "input for another question dropped");
            return Ok(Disposition::Consumed);
        }
        match self.state {
            MatchState::QuestionIntro | MatchState::QuestionDisplay => Ok(Disposition::Deferred),
            MatchState::WaitForAnswer => {
                let owned = self.roster.slot_of(&sender);
                for record in inputs {
                    if owned == Some(record.slot) {
                        self.confirm(record, scheduler, ctx)?;
                    } else {
                        warn!(%sender, slot = %record.slot, "input for a slot the sender does not own");
                    }
                }
                Ok(Disposition::Consumed)
            }
            _ => {
                debug!(%sender, state = %self.state, "late input dropped");
                Ok(Disposition::Consumed)
            }
        }
    }

    /// Bring a late joiner up to date with the match
    fn welcome(&mut self, gamer: Gamertag, ctx: &mut GameContext) -> DuelResult<()> {
        if !ctx.session.gamers().contains(&gamer) {
            debug!(%gamer, "join request from a gamer no longer in the session");
            return Ok(());
        }
        self.roster.add(gamer.clone());
        self.roster.welcome(&gamer);
        info!(%gamer, question = self.question_index, "welcoming late joiner");

        let pack = WelcomePack::Gameplay {
            all_players: self.roster.gamers().to_vec(),
            active_players: self.roster.active().to_vec(),
            characters: self.roster.characters().to_vec(),
            health: ctx.arena.health_vec(),
            question_index: self.question_index,
            ruleset: self.ruleset,
        };
        self.send_to(ctx, &gamer, &NetworkMessage::WelcomePack(pack))?;

        if self.concluded {
            let outcome = self.outcome_message(ctx);
            self.send_to(ctx, &gamer, &outcome)?;
        } else if self.state == MatchState::WaitForReady {
            // The broadcast snapshot went out before this gamer was welcomed
            let snapshot = NetworkMessage::SyncSnapshot {
                question_index: self.question_index + 1,
                health: ctx.arena.health_vec(),
            };
            self.send_to(ctx, &gamer, &snapshot)?;
            self.awaiting_ready.insert(gamer);
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Client Side
    // ------------------------------------------------------------------------

    fn client_message(
        &mut self,
        message: NetworkMessage,
        scheduler: &mut TaskScheduler<GameContext>,
        ctx: &mut GameContext,
    ) -> DuelResult<Disposition> {
        match self.joining {
            JoiningState::WaitingForWelcomePack => Ok(self.awaiting_welcome(message, ctx)),
            JoiningState::WaitingToWatch => self.watching(message, scheduler, ctx),
            JoiningState::Joined => self.joined_message(message, scheduler, ctx),
        }
    }

    fn awaiting_welcome(&mut self, message: NetworkMessage, ctx: &mut GameContext) -> Disposition {
        let (all_players, active_players, characters, health, question_index, ruleset) = match message {
            NetworkMessage::WelcomePack(WelcomePack::Gameplay {
                all_players,
                active_players,
                characters,
                health,
                question_index,
                ruleset,
            }) => (all_players, active_players, characters, health, question_index, ruleset),
            other => return self.unexpected(&other),
        };

        self.roster.reconcile(&all_players, &active_players, &characters);
        match ruleset.validate() {
            Ok(()) => {
                self.ruleset = ruleset;
                ctx.config.ruleset = ruleset;
            }
            Err(error) => warn!(?ruleset, %error, "welcome pack ruleset ignored"),
        }
        if !ctx.arena.set_all(&health) {
            warn!(?health, "welcome pack health ignored");
        }
        self.question_index = question_index;
        self.joining = JoiningState::WaitingToWatch;
        info!(question = question_index, fighters = ?active_players, "welcome pack applied");
        Disposition::Consumed
    }

    fn watching(
        &mut self,
        message: NetworkMessage,
        scheduler: &mut TaskScheduler<GameContext>,
        ctx: &mut GameContext,
    ) -> DuelResult<Disposition> {
        match message {
            NetworkMessage::SyncSnapshot {
                question_index,
                health,
            } => {
                ctx.arena.set_all(&health);
                self.question_index = question_index.saturating_sub(1);
                self.joining = JoiningState::Joined;
                info!(question = question_index, "caught up with the match");
                self.next_question(scheduler, ctx)?;
                Ok(Disposition::Consumed)
            }
            NetworkMessage::PlayerWins {
                winner,
                final_health,
            } => {
                // The match ended before catching up; skip straight to the result
                ctx.arena.set_all(&final_health);
                self.joining = JoiningState::Joined;
                self.concluded = true;
                self.winner = winner.as_ref().and_then(|w| self.roster.slot_of(w));
                self.cancel_gameplay(scheduler);
                let terminal = if self.winner.is_some() {
                    MatchState::GameWon
                } else {
                    MatchState::GameLost
                };
                self.enter(terminal, scheduler, ctx)?;
                Ok(Disposition::Consumed)
            }
            other => Ok(self.unexpected(&other)),
        }
    }

    fn joined_message(
        &mut self,
        message: NetworkMessage,
        scheduler: &mut TaskScheduler<GameContext>,
        ctx: &mut GameContext,
    ) -> DuelResult<Disposition> {
        match message {
            NetworkMessage::SyncSnapshot {
                question_index,
                health,
            } => Ok(match self.state {
                MatchState::WaitForQuestion => {
                    if question_index > self.question_index {
                        ctx.arena.set_all(&health);
                        debug!(question = question_index, ?health, "snapshot applied");
                    }
                    Disposition::Consumed
                }
                state if state.is_concluded() => Disposition::Consumed,
                _ => Disposition::Deferred,
            }),
            NetworkMessage::QuestionContent {
                question_index,
                question,
            } => match self.state {
                MatchState::WaitForQuestion if question_index > self.question_index => {
                    self.question_index = question_index;
                    self.question = Some(question);
                    self.enter(MatchState::QuestionIntro, scheduler, ctx)?;
                    Ok(Disposition::Consumed)
                }
                MatchState::WaitForQuestion => Ok(Disposition::Consumed),
                state if state.is_concluded() => Ok(Disposition::Consumed),
                _ => Ok(Disposition::Deferred),
            },
            NetworkMessage::PlayerInputs {
                question_index,
                window_closed,
                inputs,
            } => {
                if question_index != self.question_index {
                    return Ok(Disposition::Consumed);
                }
                match self.state {
                    MatchState::QuestionIntro | MatchState::QuestionDisplay => Ok(Disposition::Deferred),
                    MatchState::WaitForAnswer => {
                        // Only the host-confirmed vector is acted on
                        if let Some(first) = inputs.iter().find(|r| r.answer.is_some()).copied() {
                            self.resolve(first, scheduler, ctx)?;
                        } else if window_closed {
                            self.enter(MatchState::AnswerNotGiven, scheduler, ctx)?;
                        }
                        Ok(Disposition::Consumed)
                    }
                    _ => Ok(Disposition::Consumed),
                }
            }
            NetworkMessage::PlayerWins {
                winner,
                final_health,
            } => {
                if !self.concluded {
                    ctx.arena.set_all(&final_health);
                    let slot = winner.as_ref().and_then(|w| self.roster.slot_of(w));
                    info!(winner = ?winner, ?final_health, "host announced the result");
                    self.begin_conclusion(ConcludeTask::new(slot), slot, scheduler, ctx)?;
                }
                Ok(Disposition::Consumed)
            }
            NetworkMessage::Highscores { entries } => {
                ctx.scores.adopt_highscores(&entries);
                Ok(Disposition::Consumed)
            }
            other => Ok(self.unexpected(&other)),
        }
    }
}
