//! Error handling for the DuelSync CLI

use thiserror::Error;

/// CLI-specific error types
#[derive(Error, Debug)]
pub enum CliError {
    #[error("DuelSync error: {0}")]
    Duel(#[from] duelsync_core::DuelError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Simulation did not complete: {0}")]
    Simulation(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    TomlParsing(#[from] toml::de::Error),

    #[error("TOML writing error: {0}")]
    TomlWriting(#[from] toml::ser::Error),
}

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;

impl From<anyhow::Error> for CliError {
    fn from(err: anyhow::Error) -> Self {
        CliError::Config(err.to_string())
    }
}
