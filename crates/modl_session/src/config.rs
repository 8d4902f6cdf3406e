//! Bridge configuration
//!
//! Process-level switches, as opposed to the game schema in
//! `game_config.json`. Everything has a default and can be overridden from
//! the environment:
//!
//! | Variable                    | Default            | Meaning                              |
//! |-----------------------------|--------------------|--------------------------------------|
//! | `MODL_COMM_TYPE`            | `brain`            | `none`, `validation` or `brain`      |
//! | `MODL_VALIDATION_MODE`      | `everything`       | `everything`, `actions`, `objects`, `features` |
//! | `MODL_CONFIG_PATH`          | `game_config.json` | schema file                          |
//! | `MODL_ALLOW_MISSING_CONFIG` | off                | start with empty spaces              |
//! | `MODL_LOW_FPS_EVENTS`       | off                | report `LowFPS` events               |
//! | `MODL_AVG_FPS_EVENTS`       | off                | report `AvgFPS` events on heartbeats |
//! | `MODL_DRAIN_TIMEOUT_MS`     | none               | give up draining the consumer after  |

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use modl_core::DEFAULT_CONFIG_PATH;
use modl_transport::ValidationMode;

pub const COMM_TYPE_ENV: &str = "MODL_COMM_TYPE";
pub const VALIDATION_MODE_ENV: &str = "MODL_VALIDATION_MODE";
pub const CONFIG_PATH_ENV: &str = "MODL_CONFIG_PATH";
pub const ALLOW_MISSING_CONFIG_ENV: &str = "MODL_ALLOW_MISSING_CONFIG";
pub const LOW_FPS_EVENTS_ENV: &str = "MODL_LOW_FPS_EVENTS";
pub const AVG_FPS_EVENTS_ENV: &str = "MODL_AVG_FPS_EVENTS";
pub const DRAIN_TIMEOUT_ENV: &str = "MODL_DRAIN_TIMEOUT_MS";

/// Which Brain the session talks to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CommType {
    /// No transmission at all
    None,
    /// Offline validation transport
    ConfigValidation,
    /// Socket connection to the Brain
    #[default]
    Brain,
}

impl fmt::Display for CommType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::ConfigValidation => write!(f, "validation"),
            Self::Brain => write!(f, "brain"),
        }
    }
}

impl FromStr for CommType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "none" | "off" | "0" => Ok(Self::None),
            "validation" | "config_validation" | "1" => Ok(Self::ConfigValidation),
            "brain" | "socket" | "2" => Ok(Self::Brain),
            _ => Err(format!("Unknown communicator type: {}", s)),
        }
    }
}

/// Process-level bridge settings
#[derive(Debug, Clone, PartialEq)]
pub struct BridgeConfig {
    pub comm_type: CommType,
    pub validation_mode: ValidationMode,
    pub config_path: PathBuf,
    /// Start with empty spaces when the schema file cannot be read
    pub allow_missing_config: bool,
    pub send_low_fps_events: bool,
    pub send_avg_fps_events: bool,
    /// Give up waiting for the consumer after this long; `None` waits forever
    pub drain_timeout: Option<Duration>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            comm_type: CommType::default(),
            validation_mode: ValidationMode::default(),
            config_path: PathBuf::from(DEFAULT_CONFIG_PATH),
            allow_missing_config: false,
            send_low_fps_events: false,
            send_avg_fps_events: false,
            drain_timeout: None,
        }
    }
}

fn flag(value: &str) -> bool {
    matches!(value.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

impl BridgeConfig {
    /// Defaults overridden by the process environment
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden through a custom variable lookup
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(value) = lookup(COMM_TYPE_ENV) {
            match value.parse() {
                Ok(comm_type) => config.comm_type = comm_type,
                Err(e) => log::warn!("{} {}, using {}", modl_core::LOG_PREFIX, e, config.comm_type),
            }
        }

        if let Some(value) = lookup(VALIDATION_MODE_ENV) {
            match ValidationMode::parse(&value) {
                Some(mode) => config.validation_mode = mode,
                None => log::warn!(
                    "{} Unknown validation mode '{}', using {}",
                    modl_core::LOG_PREFIX,
                    value,
                    config.validation_mode
                ),
            }
        }

        if let Some(path) = lookup(CONFIG_PATH_ENV).filter(|p| !p.trim().is_empty()) {
            config.config_path = PathBuf::from(path.trim());
        }

        config.allow_missing_config = lookup(ALLOW_MISSING_CONFIG_ENV).map_or(false, |v| flag(&v));
        config.send_low_fps_events = lookup(LOW_FPS_EVENTS_ENV).map_or(false, |v| flag(&v));
        config.send_avg_fps_events = lookup(AVG_FPS_EVENTS_ENV).map_or(false, |v| flag(&v));
        config.drain_timeout = lookup(DRAIN_TIMEOUT_ENV)
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_millis);

        config
    }

    /// Log the effective settings
    pub fn log_summary(&self) {
        log::info!(
            "{} Bridge config: comm={} validation={} config={} fps_events(low={}, avg={})",
            modl_core::LOG_PREFIX,
            self.comm_type,
            self.validation_mode,
            self.config_path.display(),
            self.send_low_fps_events,
            self.send_avg_fps_events
        );
    }
}
