//! Command handlers for the DuelSync CLI

use std::path::PathBuf;

use tracing::info;

use crate::app::{Simulation, SimulationOptions, SimulationReport};
use crate::cli::{Cli, Commands, ReplyArg};
use crate::config::AppConfig;
use crate::error::Result;

/// Command dispatcher for handling CLI commands
pub struct CommandDispatcher;

impl CommandDispatcher {
    /// Execute a CLI command
    pub async fn execute(cli: Cli, config: AppConfig) -> Result<()> {
        match cli.command {
            Commands::Simulate {
                host,
                client,
                spectators,
                late_join,
                disconnect_at,
                scores,
                json,
            } => {
                let options = Self::simulation_options(
                    host,
                    client,
                    spectators,
                    late_join,
                    disconnect_at,
                    scores,
                );
                Self::handle_simulate_command(config, options, json).await
            }
            Commands::Config => Self::handle_config_command(&config),
        }
    }

    fn simulation_options(
        host: ReplyArg,
        client: ReplyArg,
        spectators: usize,
        late_join: bool,
        disconnect_at: Option<u64>,
        scores: Option<PathBuf>,
    ) -> SimulationOptions {
        SimulationOptions {
            host_reply: host.into(),
            client_reply: client.into(),
            spectators,
            late_join,
            disconnect_at,
            scores,
        }
    }

    /// Handle the simulate command
    async fn handle_simulate_command(
        config: AppConfig,
        options: SimulationOptions,
        json: bool,
    ) -> Result<()> {
        info!(
            spectators = options.spectators,
            late_join = options.late_join,
            "starting simulation"
        );
        let mut simulation = Simulation::new(config, options)?;
        let report = simulation.run().await?;

        if json {
            println!("{}", serde_json::to_string_pretty(&report)?);
        } else {
            Self::print_report(&report);
        }
        Ok(())
    }

    /// Handle the config command
    fn handle_config_command(config: &AppConfig) -> Result<()> {
        print!("{}", config.to_toml()?);
        Ok(())
    }

    fn print_report(report: &SimulationReport) {
        match &report.winner {
            Some(winner) => println!("Winner: {winner}"),
            None => println!("Draw"),
        }
        println!(
            "Final health: {:?} after {} question(s), {} frames",
            report.final_health, report.questions_played, report.frames
        );
        println!();
        println!("{:<16} {:<12} {:<16} {:>10} {:>8}", "Gamer", "Screen", "State", "Health", "Packets");
        for p in &report.participants {
            println!(
                "{:<16} {:<12} {:<16} {:>10} {:>8}",
                p.gamertag.as_str(),
                p.screen,
                p.match_state.as_deref().unwrap_or("-"),
                format!("{:?}", p.health),
                p.packets_sent
            );
        }
        if !report.highscores.is_empty() {
            println!();
            println!("Highscores:");
            for (rank, entry) in report.highscores.iter().enumerate() {
                println!(
                    "  {}. {} ({} win(s), best health {})",
                    rank + 1,
                    entry.gamertag,
                    entry.wins,
                    entry.best_health
                );
            }
        }
    }
}
