//! Command-line interface definitions and parsing

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use duelsync_runtime::Reply;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Configuration file path
    #[arg(short, long)]
    pub config: Option<String>,

    /// Seed for host question generation
    #[arg(long)]
    pub seed: Option<u64>,

    /// Questions per match
    #[arg(long)]
    pub questions: Option<u32>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a local match between a host, a client and optional spectators
    Simulate {
        /// How the host fighter answers
        #[arg(long, value_enum, default_value_t = ReplyArg::Correct)]
        host: ReplyArg,
        /// How the client fighter answers
        #[arg(long, value_enum, default_value_t = ReplyArg::Wrong)]
        client: ReplyArg,
        /// Spectators present in the lobby before the match
        #[arg(long, default_value_t = 0)]
        spectators: usize,
        /// Add a spectator that joins after the match has started
        #[arg(long)]
        late_join: bool,
        /// Disconnect the client this many frames into the match
        #[arg(long)]
        disconnect_at: Option<u64>,
        /// Persist the host's results to this JSON file
        #[arg(long)]
        scores: Option<PathBuf>,
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print the effective configuration as TOML
    Config,
}

/// Scripted answering behaviour
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ReplyArg {
    Correct,
    Wrong,
    Silent,
}

impl From<ReplyArg> for Reply {
    fn from(arg: ReplyArg) -> Self {
        match arg {
            ReplyArg::Correct => Reply::Correct,
            ReplyArg::Wrong => Reply::Wrong,
            ReplyArg::Silent => Reply::Silent,
        }
    }
}
