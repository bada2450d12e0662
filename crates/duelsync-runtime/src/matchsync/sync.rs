//! Match synchronization state machine
//!
//! One `MatchSync` runs per gameplay screen on the host and on every client.
//! Each frame it drains session events, handles inbound messages, then
//! advances its own state and ticks the gameplay task list, in that order.
//!
//! The host generates questions, confirms inputs and decides the outcome.
//! Clients only commit shared facts (question content, health, winner) when
//! the host's message for them arrives.

use std::collections::BTreeSet;

use duelsync_core::{
    DuelError, DuelResult, Gamertag, InputRecord, MessageSlot, NetworkMessage, PlayerSlot,
    Question, Ruleset, TaskId, TaskScheduler, TransportError, WaitFrames, WelcomePack,
};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::roster::{MatchSetup, Roster};
use super::state::{JoiningState, MatchState, MatchStatus, Role};
use super::tasks::{AttackTask, ConcludeTask};
use crate::context::{GameContext, GAMEPLAY_LIST};
use crate::presentation::ScoreRecord;
use crate::session::recover_transport;

pub struct MatchSync {
    pub(super) role: Role,
    pub(super) local: Gamertag,
    pub(super) host: Gamertag,
    pub(super) match_id: Uuid,
    pub(super) state: MatchState,
    pub(super) joining: JoiningState,
    pub(super) roster: Roster,
    pub(super) ruleset: Ruleset,
    /// Index of the current question; 0 before the first one
    pub(super) question_index: u32,
    pub(super) question: Option<Question>,
    /// Host: content generated for the question being readied
    pub(super) pending_question: Option<Question>,
    pub(super) slot: MessageSlot,
    /// Host: gamers whose ready acknowledgement is still missing
    pub(super) awaiting_ready: BTreeSet<Gamertag>,
    /// Host: acknowledgements that arrived before their question was readied
    pub(super) early_ready: BTreeSet<(u32, Gamertag)>,
    /// Host: confirmed inputs for the current question, in confirmation order
    pub(super) confirmed: Vec<InputRecord>,
    pub(super) input_sequence: u32,
    pub(super) local_answered: bool,
    pub(super) frames_open: u32,
    /// Phase timer of the current state
    pub(super) timer: Option<TaskId>,
    /// Attack or conclusion sequence in progress
    pub(super) effect: Option<TaskId>,
    pub(super) winner: Option<PlayerSlot>,
    pub(super) concluded: bool,
    pub(super) ready_sent: u32,
    pub(super) state_log: Vec<MatchState>,
}

impl MatchSync {
    fn blank(role: Role, local: Gamertag, host: Gamertag, roster: Roster, ruleset: Ruleset) -> Self {
        Self {
            role,
            local,
            host,
            match_id: Uuid::new_v4(),
            state: MatchState::Intro,
            joining: JoiningState::Joined,
            roster,
            ruleset,
            question_index: 0,
            question: None,
            pending_question: None,
            slot: MessageSlot::new(),
            awaiting_ready: BTreeSet::new(),
            early_ready: BTreeSet::new(),
            confirmed: Vec::new(),
            input_sequence: 0,
            local_answered: false,
            frames_open: 0,
            timer: None,
            effect: None,
            winner: None,
            concluded: false,
            ready_sent: 0,
            state_log: Vec::new(),
        }
    }

    /// Start a match everyone present entered through the versus screen
    pub fn start(
        setup: MatchSetup,
        scheduler: &mut TaskScheduler<GameContext>,
        ctx: &mut GameContext,
    ) -> DuelResult<Self> {
        if setup.active_players.len() != 2 {
            return Err(DuelError::config_error(format!(
                "a match needs two active players, got {}",
                setup.active_players.len()
            )));
        }
        setup.ruleset.validate()?;

        scheduler.kill_all_tasks(GAMEPLAY_LIST, true, ctx)?;
        ctx.config.ruleset = setup.ruleset;
        ctx.arena.reset(setup.ruleset.starting_health);

        let roster = Roster::from_setup(&setup);
        let mut sync = Self::blank(setup.role, setup.local, setup.host, roster, setup.ruleset);
        info!(
            role = ?sync.role,
            local = %sync.local,
            fighters = ?sync.roster.active(),
            "match started"
        );
        sync.enter(MatchState::Intro, scheduler, ctx)?;
        Ok(sync)
    }

    /// Attach to a match already underway.
    ///
    /// A `welcome` pack the lobby already received is handled on the next
    /// frame. Without one the host is asked for it.
    pub fn late_join(
        scheduler: &mut TaskScheduler<GameContext>,
        ctx: &mut GameContext,
        welcome: Option<WelcomePack>,
    ) -> DuelResult<Self> {
        let host = ctx.session.host_gamer().ok_or(TransportError::NoSession)?;
        let local = ctx.session.local_gamer().clone();
        scheduler.kill_all_tasks(GAMEPLAY_LIST, true, ctx)?;

        let roster = Roster::observed(ctx.session.gamers());
        let ruleset = ctx.config.ruleset;
        let mut sync = Self::blank(Role::Client, local.clone(), host, roster, ruleset);
        sync.joining = JoiningState::WaitingForWelcomePack;
        sync.set_state(MatchState::WaitForQuestion);
        info!(local = %local, host = %sync.host, "joining match in progress");

        match welcome {
            Some(pack) => {
                sync.slot.accept(sync.host.clone(), NetworkMessage::WelcomePack(pack));
            }
            None => sync.send_to_host(ctx, &NetworkMessage::GameStateJoined { gamertag: local })?,
        }
        Ok(sync)
    }

    // ------------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------------

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn state(&self) -> MatchState {
        self.state
    }

    pub fn joining_state(&self) -> JoiningState {
        self.joining
    }

    pub fn question_index(&self) -> u32 {
        self.question_index
    }

    pub fn question(&self) -> Option<&Question> {
        self.question.as_ref()
    }

    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    pub fn ruleset(&self) -> &Ruleset {
        &self.ruleset
    }

    /// Winning slot once the outcome is known; `None` also on a draw
    pub fn winner(&self) -> Option<PlayerSlot> {
        self.winner
    }

    pub fn is_concluded(&self) -> bool {
        self.concluded
    }

    pub fn is_finished(&self) -> bool {
        self.state == MatchState::Finished
    }

    /// Slot of the local gamer if it is fighting
    pub fn local_slot(&self) -> Option<PlayerSlot> {
        self.roster.slot_of(&self.local)
    }

    /// Ready acknowledgements this participant has sent
    pub fn ready_sent(&self) -> u32 {
        self.ready_sent
    }

    /// Every state entered, in order
    pub fn state_log(&self) -> &[MatchState] {
        &self.state_log
    }

    /// How many times `state` has been entered
    pub fn times_entered(&self, state: MatchState) -> usize {
        self.state_log.iter().filter(|s| **s == state).count()
    }

    // ------------------------------------------------------------------------
    // Frame Update
    // ------------------------------------------------------------------------

    /// Run one frame of match logic
    pub fn update(
        &mut self,
        scheduler: &mut TaskScheduler<GameContext>,
        ctx: &mut GameContext,
    ) -> DuelResult<MatchStatus> {
        if let Some(reason) = self.drain_events(scheduler, ctx)? {
            return Ok(MatchStatus::SessionLost(reason));
        }
        self.process_messages(scheduler, ctx)?;
        self.advance(scheduler, ctx)?;
        scheduler.tick(GAMEPLAY_LIST, ctx)?;

        Ok(if self.is_finished() {
            MatchStatus::Finished
        } else {
            MatchStatus::Running
        })
    }

    /// State checks driven by timers, tasks and local input
    fn advance(
        &mut self,
        scheduler: &mut TaskScheduler<GameContext>,
        ctx: &mut GameContext,
    ) -> DuelResult<()> {
        if self.joining != JoiningState::Joined {
            return Ok(());
        }
        match self.state {
            MatchState::Intro => {
                if self.timer_done(scheduler) {
                    self.next_question(scheduler, ctx)?;
                }
            }
            MatchState::WaitForReady => self.publish_if_ready(scheduler, ctx)?,
            MatchState::WaitForQuestion => {}
            MatchState::QuestionIntro => {
                if self.timer_done(scheduler) {
                    self.enter(MatchState::QuestionDisplay, scheduler, ctx)?;
                }
            }
            MatchState::QuestionDisplay => {
                if self.timer_done(scheduler) {
                    self.enter(MatchState::WaitForAnswer, scheduler, ctx)?;
                }
            }
            MatchState::WaitForAnswer => self.poll_answer(scheduler, ctx)?,
            MatchState::AnswerCorrect | MatchState::AnswerWrong => {
                if self.effect_done(scheduler) {
                    self.enter(MatchState::QuestionOutro, scheduler, ctx)?;
                }
            }
            MatchState::AnswerNotGiven => {
                if self.timer_done(scheduler) {
                    self.enter(MatchState::QuestionOutro, scheduler, ctx)?;
                }
            }
            MatchState::QuestionOutro => {
                if self.timer_done(scheduler) {
                    match self.decide(ctx) {
                        Some(winner) if self.role.is_host() => {
                            self.begin_conclusion(ConcludeTask::new(winner), winner, scheduler, ctx)?
                        }
                        _ => self.next_question(scheduler, ctx)?,
                    }
                }
            }
            MatchState::Concluding => {
                if self.effect_done(scheduler) {
                    let terminal = if self.winner.is_some() {
                        MatchState::GameWon
                    } else {
                        MatchState::GameLost
                    };
                    self.enter(terminal, scheduler, ctx)?;
                }
            }
            MatchState::GameWon | MatchState::GameLost => {
                self.enter(MatchState::Outro, scheduler, ctx)?;
            }
            MatchState::Outro => {
                if self.timer_done(scheduler) {
                    self.enter(MatchState::Finished, scheduler, ctx)?;
                }
            }
            MatchState::Finished => {}
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Transitions
    // ------------------------------------------------------------------------

    pub(super) fn set_state(&mut self, state: MatchState) {
        info!(from = %self.state, to = %state, question = self.question_index, "match state");
        self.state = state;
        self.state_log.push(state);
    }

    /// Enter `state` and run its entry actions
    pub(super) fn enter(
        &mut self,
        state: MatchState,
        scheduler: &mut TaskScheduler<GameContext>,
        ctx: &mut GameContext,
    ) -> DuelResult<()> {
        if let Some(timer) = self.timer.take() {
            scheduler.kill_task(timer);
        }
        self.set_state(state);

        let timing = ctx.config.timing.clone();
        match state {
            MatchState::Intro => self.start_timer(timing.intro_frames, scheduler, ctx)?,
            MatchState::QuestionIntro => {
                self.start_timer(timing.question_intro_frames, scheduler, ctx)?
            }
            MatchState::QuestionDisplay => {
                self.start_timer(timing.question_display_frames, scheduler, ctx)?
            }
            MatchState::WaitForAnswer => {
                self.confirmed.clear();
                self.local_answered = false;
                self.frames_open = 0;
                // The host owns the answer window
                if self.role.is_host() {
                    self.start_timer(self.ruleset.answer_time_frames, scheduler, ctx)?;
                }
            }
            MatchState::AnswerNotGiven => self.start_timer(timing.no_answer_frames, scheduler, ctx)?,
            MatchState::QuestionOutro => {
                self.start_timer(timing.question_outro_frames, scheduler, ctx)?
            }
            MatchState::Outro => {
                self.record_result(ctx)?;
                self.start_timer(timing.outro_frames, scheduler, ctx)?;
            }
            MatchState::Finished => {
                if self.role.is_host() {
                    if let Err(error) = ctx.session.end_game() {
                        warn!(%error, "could not mark the game as ended");
                    }
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn start_timer(
        &mut self,
        frames: u32,
        scheduler: &mut TaskScheduler<GameContext>,
        ctx: &mut GameContext,
    ) -> DuelResult<()> {
        let id = scheduler.add_task(GAMEPLAY_LIST, WaitFrames::new(frames), false, ctx)?;
        self.timer = Some(id);
        Ok(())
    }

    fn timer_done(&self, scheduler: &TaskScheduler<GameContext>) -> bool {
        self.timer.map_or(true, |id| !scheduler.is_alive(id))
    }

    fn effect_done(&self, scheduler: &TaskScheduler<GameContext>) -> bool {
        self.effect.map_or(true, |id| !scheduler.is_alive(id))
    }

    /// Stop the phase timer and any attack in flight
    pub(super) fn cancel_gameplay(&mut self, scheduler: &mut TaskScheduler<GameContext>) {
        for id in [self.timer.take(), self.effect.take()].into_iter().flatten() {
            scheduler.kill_task(id);
        }
    }

    // ------------------------------------------------------------------------
    // Question Cycle
    // ------------------------------------------------------------------------

    /// Reached the point where the next question is needed
    pub(super) fn next_question(
        &mut self,
        scheduler: &mut TaskScheduler<GameContext>,
        ctx: &mut GameContext,
    ) -> DuelResult<()> {
        let next = self.question_index + 1;
        match self.role {
            Role::Host => {
                self.pending_question = Some(ctx.questions.next_question(next));

                let mut awaiting = self.roster.welcomed_clients(&self.host);
                for (_, gamer) in self.early_ready.iter().filter(|(index, _)| *index == next) {
                    awaiting.remove(gamer);
                }
                self.early_ready.retain(|(index, _)| *index > next);
                self.awaiting_ready = awaiting;

                let snapshot = NetworkMessage::SyncSnapshot {
                    question_index: next,
                    health: ctx.arena.health_vec(),
                };
                self.broadcast(ctx, &snapshot)?;
                self.enter(MatchState::WaitForReady, scheduler, ctx)?;
                self.publish_if_ready(scheduler, ctx)
            }
            Role::Client => {
                self.send_to_host(ctx, &NetworkMessage::ReadyForNextQuestion { question_index: next })?;
                self.ready_sent += 1;
                self.enter(MatchState::WaitForQuestion, scheduler, ctx)
            }
        }
    }

    /// Host: publish the readied question once every client acknowledged
    fn publish_if_ready(
        &mut self,
        scheduler: &mut TaskScheduler<GameContext>,
        ctx: &mut GameContext,
    ) -> DuelResult<()> {
        if self.state != MatchState::WaitForReady || !self.awaiting_ready.is_empty() {
            return Ok(());
        }
        let next = self.question_index + 1;
        let question = match self.pending_question.take() {
            Some(question) => question,
            None => ctx.questions.next_question(next),
        };

        self.broadcast(
            ctx,
            &NetworkMessage::QuestionContent {
                question_index: next,
                question: question.clone(),
            },
        )?;
        self.question_index = next;
        self.question = Some(question);
        self.enter(MatchState::QuestionIntro, scheduler, ctx)
    }

    /// Sample the local controller and, on the host, close an expired window
    fn poll_answer(
        &mut self,
        scheduler: &mut TaskScheduler<GameContext>,
        ctx: &mut GameContext,
    ) -> DuelResult<()> {
        self.frames_open += 1;

        let sampled = match (self.local_slot(), self.question.as_ref()) {
            (Some(slot), Some(question)) if !self.local_answered => ctx
                .input
                .sample(slot, self.question_index, question, self.frames_open)
                .map(|answer| (slot, answer)),
            _ => None,
        };

        if let Some((slot, answer)) = sampled {
            self.local_answered = true;
            self.input_sequence += 1;
            let record = InputRecord {
                slot,
                answer: Some(answer),
                sequence: self.input_sequence,
            };
            debug!(%slot, answer, "local answer");
            match self.role {
                Role::Host => self.confirm(record, scheduler, ctx)?,
                Role::Client => {
                    let tentative = NetworkMessage::PlayerInputs {
                        question_index: self.question_index,
                        window_closed: false,
                        inputs: vec![record],
                    };
                    self.send_to_host(ctx, &tentative)?;
                }
            }
        }

        if self.role.is_host() && self.state == MatchState::WaitForAnswer && self.timer_done(scheduler) {
            info!(question = self.question_index, "answer window closed without an answer");
            let closed = NetworkMessage::PlayerInputs {
                question_index: self.question_index,
                window_closed: true,
                inputs: self.confirmed.clone(),
            };
            self.broadcast(ctx, &closed)?;
            self.enter(MatchState::AnswerNotGiven, scheduler, ctx)?;
        }
        Ok(())
    }

    /// Host: confirm one fighter's input and rebroadcast the confirmed vector.
    /// The first confirmed answer decides the question.
    pub(super) fn confirm(
        &mut self,
        record: InputRecord,
        scheduler: &mut TaskScheduler<GameContext>,
        ctx: &mut GameContext,
    ) -> DuelResult<()> {
        if self.state != MatchState::WaitForAnswer
            || record.answer.is_none()
            || self.confirmed.iter().any(|r| r.slot == record.slot)
        {
            return Ok(());
        }
        self.confirmed.push(record);

        let confirmed = NetworkMessage::PlayerInputs {
            question_index: self.question_index,
            window_closed: false,
            inputs: self.confirmed.clone(),
        };
        self.broadcast(ctx, &confirmed)?;
        self.resolve(self.confirmed[0], scheduler, ctx)
    }

    /// Apply the deciding input: a correct answer attacks the opponent, a
    /// wrong one lets the opponent attack
    pub(super) fn resolve(
        &mut self,
        record: InputRecord,
        scheduler: &mut TaskScheduler<GameContext>,
        ctx: &mut GameContext,
    ) -> DuelResult<()> {
        let Some(answer) = record.answer else {
            return Ok(());
        };
        let correct = self
            .question
            .as_ref()
            .map(|q| q.is_correct(answer))
            .unwrap_or(false);
        let attacker = if correct { record.slot } else { record.slot.opponent() };
        info!(answerer = %record.slot, answer, correct, %attacker, "question decided");

        let state = if correct {
            MatchState::AnswerCorrect
        } else {
            MatchState::AnswerWrong
        };
        self.enter(state, scheduler, ctx)?;
        let attack = AttackTask::new(attacker, self.ruleset.damage_per_hit);
        self.effect = Some(scheduler.add_task(GAMEPLAY_LIST, attack, true, ctx)?);
        Ok(())
    }

    /// Host: the match is over after a knock-out or the last question.
    /// `Some(None)` is a draw.
    fn decide(&self, ctx: &GameContext) -> Option<Option<PlayerSlot>> {
        if let Some(knocked_out) = ctx.arena.knocked_out() {
            return Some(Some(knocked_out.opponent()));
        }
        if self.question_index < self.ruleset.questions_per_match {
            return None;
        }
        let [one, two] = ctx.arena.health();
        Some(match one.cmp(&two) {
            std::cmp::Ordering::Greater => Some(PlayerSlot::One),
            std::cmp::Ordering::Less => Some(PlayerSlot::Two),
            std::cmp::Ordering::Equal => None,
        })
    }

    // ------------------------------------------------------------------------
    // Conclusion
    // ------------------------------------------------------------------------

    /// Lock in the outcome and play the closing sequence. The host announces
    /// the result; clients only get here from the host's announcement.
    pub(super) fn begin_conclusion(
        &mut self,
        task: ConcludeTask,
        winner: Option<PlayerSlot>,
        scheduler: &mut TaskScheduler<GameContext>,
        ctx: &mut GameContext,
    ) -> DuelResult<()> {
        if self.concluded {
            return Ok(());
        }
        self.concluded = true;
        self.winner = winner;
        self.cancel_gameplay(scheduler);
        self.effect = Some(scheduler.add_task(GAMEPLAY_LIST, task, true, ctx)?);

        if self.role.is_host() {
            let outcome = self.outcome_message(ctx);
            self.broadcast(ctx, &outcome)?;
        }
        self.enter(MatchState::Concluding, scheduler, ctx)
    }

    pub(super) fn outcome_message(&self, ctx: &GameContext) -> NetworkMessage {
        NetworkMessage::PlayerWins {
            winner: self.winner.and_then(|slot| self.roster.player_in(slot).cloned()),
            final_health: ctx.arena.health_vec(),
        }
    }

    /// Store the local result and, on the host, publish the highscore table
    fn record_result(&mut self, ctx: &mut GameContext) -> DuelResult<()> {
        let winner = self.winner.and_then(|slot| self.roster.player_in(slot).cloned());
        let record = ScoreRecord {
            match_id: self.match_id,
            local: self.local.clone(),
            won: winner.as_ref() == Some(&self.local),
            winner,
            final_health: ctx.arena.health_vec(),
            questions_played: self.question_index,
        };
        ctx.scores.store_score_data(&record);
        ctx.scores.save();

        if self.role.is_host() {
            let entries = ctx.scores.highscores();
            self.broadcast(ctx, &NetworkMessage::Highscores { entries })?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Sending
    // ------------------------------------------------------------------------

    pub(super) fn broadcast(&self, ctx: &mut GameContext, message: &NetworkMessage) -> DuelResult<()> {
        recover_transport(ctx.session.send_to_all(message))
    }

    pub(super) fn send_to_host(&self, ctx: &mut GameContext, message: &NetworkMessage) -> DuelResult<()> {
        recover_transport(ctx.session.send_to_host(message))
    }

    pub(super) fn send_to(
        &self,
        ctx: &mut GameContext,
        gamer: &Gamertag,
        message: &NetworkMessage,
    ) -> DuelResult<()> {
        recover_transport(ctx.session.send_to(gamer, message))
    }
}
