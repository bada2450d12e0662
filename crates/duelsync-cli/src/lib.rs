//! DuelSync CLI library
//!
//! Runs scripted matches between local runtimes over the in-memory network
//! and reports the result.

pub mod app;
pub mod cli;
pub mod commands;
pub mod config;
pub mod error;

pub use app::{Simulation, SimulationOptions, SimulationReport};
pub use cli::{Cli, Commands};
pub use config::AppConfig;
pub use error::{CliError, Result};
