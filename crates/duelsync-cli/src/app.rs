//! Local match simulation
//!
//! Drives a host, a client and any number of spectators, each with its own
//! runtime, over one in-memory network. Every frame updates the participants
//! in a fixed order, so a given configuration always plays out the same way.

use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;
use tokio::time::{interval, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use duelsync_core::{CharacterId, Gamertag, HighscoreEntry};
use duelsync_runtime::{
    DuelRuntime, JsonScoreStore, LoopbackNetwork, Reply, ScreenKind, ScriptedInput,
};

use crate::config::AppConfig;
use crate::error::{CliError, Result};

const HOST_CHARACTER: CharacterId = 3;
const CLIENT_CHARACTER: CharacterId = 5;
/// Frames a scripted fighter waits before answering
const HOST_DELAY: u32 = 3;
const CLIENT_DELAY: u32 = 2;
/// Frames into the match before the late spectator looks for it
const LATE_JOIN_AFTER: u64 = 3;

/// What to simulate
#[derive(Debug, Clone)]
pub struct SimulationOptions {
    pub host_reply: Reply,
    pub client_reply: Reply,
    pub spectators: usize,
    pub late_join: bool,
    /// Frames into the match at which the client drops out
    pub disconnect_at: Option<u64>,
    pub scores: Option<PathBuf>,
}

impl Default for SimulationOptions {
    fn default() -> Self {
        Self {
            host_reply: Reply::Correct,
            client_reply: Reply::Wrong,
            spectators: 0,
            late_join: false,
            disconnect_at: None,
            scores: None,
        }
    }
}

/// Final view of one participant
#[derive(Debug, Clone, Serialize)]
pub struct ParticipantReport {
    pub gamertag: Gamertag,
    pub screen: String,
    pub match_state: Option<String>,
    pub health: Vec<i32>,
    pub packets_sent: usize,
    pub notifications: usize,
}

/// Outcome of a simulation, as seen by the host
#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    pub frames: u64,
    /// `None` on a draw
    pub winner: Option<Gamertag>,
    pub final_health: Vec<i32>,
    pub questions_played: u32,
    pub participants: Vec<ParticipantReport>,
    pub highscores: Vec<HighscoreEntry>,
}

struct Participant {
    gamer: Gamertag,
    runtime: DuelRuntime,
}

pub struct Simulation {
    config: AppConfig,
    options: SimulationOptions,
    network: LoopbackNetwork,
    participants: Vec<Participant>,
    pacer: Option<Interval>,
    frames: u64,
}

impl Simulation {
    pub fn new(config: AppConfig, options: SimulationOptions) -> Result<Self> {
        config.validate()?;
        let network = LoopbackNetwork::new();

        let mut participants = Vec::new();
        let mut host = Self::participant(&network, "host", &config)?;
        host.runtime.context_mut().input =
            Box::new(ScriptedInput::always(options.host_reply, HOST_DELAY));
        if let Some(path) = &options.scores {
            info!(path = %path.display(), "recording host scores");
            host.runtime.context_mut().scores = Box::new(JsonScoreStore::open(path.clone()));
        }
        participants.push(host);

        let mut client = Self::participant(&network, "client", &config)?;
        client.runtime.context_mut().input =
            Box::new(ScriptedInput::always(options.client_reply, CLIENT_DELAY));
        participants.push(client);

        for n in 1..=options.spectators {
            participants.push(Self::participant(&network, &format!("spectator-{n}"), &config)?);
        }

        let pacer = match config.simulation.frames_per_second {
            0 => None,
            fps => {
                let mut pacer = interval(Duration::from_secs_f64(1.0 / f64::from(fps)));
                pacer.set_missed_tick_behavior(MissedTickBehavior::Delay);
                Some(pacer)
            }
        };

        Ok(Self {
            config,
            options,
            network,
            participants,
            pacer,
            frames: 0,
        })
    }

    fn participant(network: &LoopbackNetwork, name: &str, config: &AppConfig) -> Result<Participant> {
        let gamer = Gamertag::new(name);
        let runtime = DuelRuntime::loopback(network, gamer.clone(), config.duel.clone())?;
        Ok(Participant { gamer, runtime })
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Play the whole scenario and report on it
    pub async fn run(&mut self) -> Result<SimulationReport> {
        self.participants[0].runtime.host_match()?;
        self.run_until("host lobby", |sim| sim.screen(0) == ScreenKind::Lobby)
            .await?;

        let lobby_members = 2 + self.options.spectators;
        for index in 1..lobby_members {
            self.participants[index].runtime.join_first_available()?;
            self.run_until("lobby join", move |sim| sim.is_welcomed(index)).await?;
        }
        info!(players = lobby_members, "lobby assembled");

        self.participants[0]
            .runtime
            .select_character(HOST_CHARACTER, true)?;
        self.participants[1]
            .runtime
            .select_character(CLIENT_CHARACTER, true)?;
        self.run_until("match start", |sim| {
            sim.screen(0) == ScreenKind::Match && sim.screen(1) == ScreenKind::Match
        })
        .await?;

        let match_start = self.frames;
        let mut late_joiner = None;
        while !self.is_done() {
            let elapsed = self.frames - match_start;
            if self.options.late_join && late_joiner.is_none() && elapsed >= LATE_JOIN_AFTER {
                late_joiner = Some(self.add_late_joiner()?);
            }
            if self.options.disconnect_at == Some(elapsed) {
                let client = self.participants[1].gamer.clone();
                warn!(gamer = %client, frame = self.frames, "disconnecting client");
                self.network.disconnect(&client);
            }
            self.frame().await?;
        }

        info!(frames = self.frames, "simulation finished");
        Ok(self.report())
    }

    fn add_late_joiner(&mut self) -> Result<usize> {
        let mut joiner = Self::participant(&self.network, "late-spectator", &self.config)?;
        joiner.runtime.join_first_available()?;
        info!(gamer = %joiner.gamer, frame = self.frames, "late spectator joining");
        self.participants.push(joiner);
        Ok(self.participants.len() - 1)
    }

    async fn frame(&mut self) -> Result<()> {
        if self.frames >= self.config.simulation.max_frames {
            return Err(CliError::Simulation(format!(
                "no result after {} frames",
                self.frames
            )));
        }
        if let Some(pacer) = &mut self.pacer {
            pacer.tick().await;
        }
        for participant in &mut self.participants {
            participant.runtime.update()?;
        }
        self.frames += 1;
        Ok(())
    }

    async fn run_until<F>(&mut self, label: &str, done: F) -> Result<()>
    where
        F: Fn(&Simulation) -> bool,
    {
        while !done(self) {
            self.frame().await.map_err(|e| match e {
                CliError::Simulation(reason) => CliError::Simulation(format!("{label}: {reason}")),
                other => other,
            })?;
        }
        debug!(label, frame = self.frames, "reached");
        Ok(())
    }

    fn screen(&self, index: usize) -> ScreenKind {
        self.participants[index].runtime.screen()
    }

    fn is_welcomed(&self, index: usize) -> bool {
        self.participants[index]
            .runtime
            .lobby()
            .map(|lobby| lobby.is_welcomed())
            .unwrap_or(false)
    }

    /// The host has finished and nobody else is still playing
    fn is_done(&self) -> bool {
        let host_finished = self.participants[0]
            .runtime
            .match_sync()
            .map(|sync| sync.is_finished())
            .unwrap_or(false);
        host_finished
            && self.participants[1..].iter().all(|p| match p.runtime.screen() {
                ScreenKind::Match => p
                    .runtime
                    .match_sync()
                    .map(|sync| sync.is_finished())
                    .unwrap_or(false),
                ScreenKind::SessionLost | ScreenKind::MainMenu => true,
                ScreenKind::Connecting | ScreenKind::Lobby => false,
            })
    }

    pub fn report(&self) -> SimulationReport {
        let host = &self.participants[0].runtime;
        let (winner, questions_played) = match host.match_sync() {
            Some(sync) => (
                sync.winner()
                    .and_then(|slot| sync.roster().player_in(slot).cloned()),
                sync.question_index(),
            ),
            None => (None, 0),
        };

        let participants = self
            .participants
            .iter()
            .map(|p| {
                let ctx = p.runtime.context();
                ParticipantReport {
                    gamertag: p.gamer.clone(),
                    screen: format!("{:?}", p.runtime.screen()),
                    match_state: p.runtime.match_sync().map(|s| format!("{:?}", s.state())),
                    health: ctx.arena.health_vec(),
                    packets_sent: self.network.packets_sent_by(&p.gamer),
                    notifications: ctx.notifications.total(),
                }
            })
            .collect();

        SimulationReport {
            frames: self.frames,
            winner,
            final_health: host.context().arena.health_vec(),
            questions_played,
            participants,
            highscores: host.context().scores.highscores(),
        }
    }
}
