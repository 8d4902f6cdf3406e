//! Game configuration
//!
//! `game_config.json` holds the four spaces the bridge exchanges with the
//! Brain plus a few tuning values. Field names are accepted both in
//! camelCase and in the snake_case form the editor tooling writes.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use crate::space::{Dimension, SchemaError};

/// Brain protocol version this bridge speaks
pub const BRAIN_VERSION: &str = "11.2.0";

/// Default location of the configuration file, relative to the working directory
pub const DEFAULT_CONFIG_PATH: &str = "game_config.json";

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid config JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid {space}: {source}")]
    Schema {
        space: &'static str,
        #[source]
        source: SchemaError,
    },
}

/// Contents of `game_config.json`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameConfig {
    #[serde(default, alias = "action_space")]
    pub action_space: Dimension,
    #[serde(default, alias = "object_space")]
    pub object_space: Dimension,
    #[serde(default, alias = "feature_space")]
    pub feature_space: Dimension,
    #[serde(default, alias = "sensor_space")]
    pub sensor_space: Dimension,
    /// Frame rate below which `LowFPS` events are reported
    #[serde(default, alias = "min_fps")]
    pub min_fps: f64,
    #[serde(default, alias = "feature_granularity")]
    pub feature_granularity: Vec<f64>,
    #[serde(default, alias = "brain_version")]
    pub brain_version: String,
}

impl GameConfig {
    /// Parse and validate a JSON document. The Brain version is always
    /// stamped with [`BRAIN_VERSION`].
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let mut config: GameConfig = serde_json::from_str(json)?;
        config.validate()?;
        config.brain_version = BRAIN_VERSION.to_string();
        Ok(config)
    }

    /// Read the configuration file.
    ///
    /// With `allow_missing`, an unreadable file yields empty spaces instead
    /// of an error (editor sessions start before any config exists).
    pub fn load(path: impl AsRef<Path>, allow_missing: bool) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(json) => Self::from_json(&json),
            Err(e) if allow_missing => {
                log::info!(
                    "{} Initializing empty config, could not read {}: {}",
                    crate::LOG_PREFIX,
                    path.display(),
                    e
                );
                Ok(Self::empty())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Configuration with four empty spaces
    pub fn empty() -> Self {
        Self {
            brain_version: BRAIN_VERSION.to_string(),
            ..Default::default()
        }
    }

    /// Write the configuration as pretty JSON
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path.as_ref(), json)?;
        log::info!("{} Game config saved to {}", crate::LOG_PREFIX, path.as_ref().display());
        Ok(())
    }

    /// Check every space tree
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (space, dim) in self.spaces() {
            dim.validate().map_err(|source| ConfigError::Schema { space, source })?;
        }
        Ok(())
    }

    /// The four spaces with their JSON names
    pub fn spaces(&self) -> [(&'static str, &Dimension); 4] {
        [
            ("actionSpace", &self.action_space),
            ("objectSpace", &self.object_space),
            ("featureSpace", &self.feature_space),
            ("sensorSpace", &self.sensor_space),
        ]
    }
}
