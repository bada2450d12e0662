//! DuelSync CLI configuration
//!
//! Configuration is loaded from a TOML file when one is given, otherwise the
//! defaults apply. Command-line flags override either.

use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use duelsync_core::DuelConfig;

use crate::error::Result;

/// Complete configuration for the CLI application
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Engine configuration shared by every simulated participant
    pub duel: DuelConfig,
    pub simulation: SimulationConfig,
}

/// How simulations are run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Frame rate to pace the loop at; 0 runs unpaced
    pub frames_per_second: u32,
    /// Give up after this many frames
    pub max_frames: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            frames_per_second: 0,
            max_frames: 20_000,
        }
    }
}

impl AppConfig {
    /// Load and validate configuration from a TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let config: AppConfig = toml::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.duel.validate()?;
        if self.simulation.max_frames == 0 {
            return Err(crate::error::CliError::Config(
                "simulation.max_frames must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config: AppConfig = toml::from_str(
            r#"
            [duel.ruleset]
            questions_per_match = 7

            [simulation]
            frames_per_second = 30
            "#,
        )
        .unwrap();

        assert_eq!(config.duel.ruleset.questions_per_match, 7);
        assert_eq!(
            config.duel.ruleset.starting_health,
            duelsync_core::Ruleset::default().starting_health
        );
        assert_eq!(config.simulation.frames_per_second, 30);
        assert_eq!(config.simulation.max_frames, 20_000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_ruleset_is_rejected() {
        let mut config = AppConfig::default();
        config.duel.ruleset.damage_per_hit = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_toml_output_parses_back() {
        let config = AppConfig::default();
        let text = config.to_toml().unwrap();
        let parsed: AppConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed.simulation.max_frames, config.simulation.max_frames);
        assert_eq!(parsed.duel.ruleset, config.duel.ruleset);
    }
}
