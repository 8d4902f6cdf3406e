//! Offline validation transport
//!
//! Stands in for the Brain while a game's configuration is being checked.
//! Observations are archived instead of sent, and commands are synthesized
//! from the config:
//!
//! - `Everything`: random actions every heartbeat, and every
//!   [`LOAD_FREQ`] heartbeats a replay of an archived observation
//! - `ActionSpaceDimensions`: one action leaf at a time driven with a random
//!   value, the others held at zero
//! - `ObjectSpaceDimensions`: one tracked object at a time reloaded from the
//!   archive
//! - `FeatureSpaceDimensions`: logs how each feature changes between
//!   consecutive observations
//!
//! Single-dimension modes move to the next dimension every
//! [`STEP_HEARTBEATS`] heartbeats and start over after the last one.
//! Configuration problems (empty spaces, nothing tracked) are counted; once
//! more than five have been seen the transport answers with a shutdown
//! command.

use std::collections::VecDeque;
use std::fmt;

use modl_core::{Dimension, GameConfig, Scalar, LOG_PREFIX};
use modl_runtime::{ActionVector, Command, CommandType, FeatureVector, Initialization, ObjectVector, Observation};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::{ChannelState, Communicator, TransportError, TransportResult, TransportStats};

/// Observations kept for load replay
pub const ARCHIVE_SIZE: usize = 2000;

/// Heartbeats spent on each dimension
pub const STEP_HEARTBEATS: u32 = 5;

/// Heartbeats between two load replays in `Everything` mode
pub const LOAD_FREQ: u32 = 10;

/// Configuration problems tolerated before shutting down
const MAX_CONFIG_ERRORS: u32 = 5;

/// Minimum archive length before object reloads start
const OBJECT_WARMUP: usize = 5;

/// Helper objects that are never reloaded
const SKIPPED_OBJECTS: [&str; 2] = ["FPSTracker", "ModlWaypoint"];

/// What the validation transport exercises
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ValidationMode {
    #[default]
    Everything,
    ActionSpaceDimensions,
    ObjectSpaceDimensions,
    FeatureSpaceDimensions,
}

impl ValidationMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationMode::Everything => "everything",
            ValidationMode::ActionSpaceDimensions => "actions",
            ValidationMode::ObjectSpaceDimensions => "objects",
            ValidationMode::FeatureSpaceDimensions => "features",
        }
    }

    /// Parse a mode name, case-insensitive
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "everything" | "all" => Some(ValidationMode::Everything),
            "actions" | "action_space" => Some(ValidationMode::ActionSpaceDimensions),
            "objects" | "object_space" => Some(ValidationMode::ObjectSpaceDimensions),
            "features" | "feature_space" => Some(ValidationMode::FeatureSpaceDimensions),
            _ => None,
        }
    }

    fn banner(&self) -> &'static str {
        match self {
            ValidationMode::Everything => "Testing everything at once",
            ValidationMode::ActionSpaceDimensions => "Testing bot input configuration",
            ValidationMode::ObjectSpaceDimensions => "Testing value sampling configuration",
            ValidationMode::FeatureSpaceDimensions => "Testing exploration configuration",
        }
    }
}

impl fmt::Display for ValidationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone)]
struct ArchivedFrame {
    obs_id: String,
    objects: Vec<ObjectVector>,
}

/// Brain stand-in that never touches the network
pub struct ValidationTransport {
    action_space: Dimension,
    object_space: Dimension,
    feature_space: Dimension,
    mode: ValidationMode,
    rng: StdRng,
    archive: VecDeque<ArchivedFrame>,
    latest_features: Vec<FeatureVector>,
    previous_features: Vec<FeatureVector>,
    heartbeat: u32,
    dimension: usize,
    error_count: u32,
    state: ChannelState,
    stats: TransportStats,
}

impl ValidationTransport {
    /// Create a transport seeded from the OS
    pub fn new(config: &GameConfig, mode: ValidationMode) -> Self {
        Self::with_rng(config, mode, StdRng::from_entropy())
    }

    /// Create a transport with a fixed seed, for reproducible runs
    pub fn with_seed(config: &GameConfig, mode: ValidationMode, seed: u64) -> Self {
        Self::with_rng(config, mode, StdRng::seed_from_u64(seed))
    }

    fn with_rng(config: &GameConfig, mode: ValidationMode, rng: StdRng) -> Self {
        log::info!(
            "{} ==== {} ==== Stop the session to end the test at any time",
            LOG_PREFIX,
            mode.banner()
        );
        Self {
            action_space: config.action_space.clone(),
            object_space: config.object_space.clone(),
            feature_space: config.feature_space.clone(),
            mode,
            rng,
            archive: VecDeque::with_capacity(ARCHIVE_SIZE),
            latest_features: Vec::new(),
            previous_features: Vec::new(),
            heartbeat: 0,
            dimension: 0,
            error_count: 0,
            state: ChannelState::Disconnected,
            stats: TransportStats::default(),
        }
    }

    pub fn mode(&self) -> ValidationMode {
        self.mode
    }

    /// Configuration problems seen so far
    pub fn error_count(&self) -> u32 {
        self.error_count
    }

    /// Observations currently archived
    pub fn archive_len(&self) -> usize {
        self.archive.len()
    }

    /// Index of the dimension under test
    pub fn current_dimension(&self) -> usize {
        self.dimension
    }

    fn config_error(&mut self, title: &str, hint: &str) {
        if self.error_count == 0 {
            log::error!("{} ==== {} ==== {}", LOG_PREFIX, title, hint);
        }
        self.error_count += 1;
    }

    fn sample_actions(&mut self) -> ActionVector {
        match self.action_space.sample_action(&mut self.rng) {
            Ok(values) => ActionVector::from_numbers(values),
            Err(e) => {
                log::error!("{} Could not sample actions: {}", LOG_PREFIX, e);
                self.error_count += 1;
                ActionVector::from_numbers(vec![0.0; self.action_space.size()])
            }
        }
    }

    fn random_frame(&mut self) -> Option<ArchivedFrame> {
        if self.archive.is_empty() {
            return None;
        }
        let index = self.rng.gen_range(0..self.archive.len());
        self.archive.get(index).cloned()
    }

    /// Advance the heartbeat and, in single-dimension modes, the dimension
    /// under test. Returns true when every dimension has been covered.
    fn advance(&mut self, dimension_count: usize) -> bool {
        self.heartbeat += 1;
        if self.mode == ValidationMode::Everything {
            return false;
        }
        if self.heartbeat % STEP_HEARTBEATS == 0 {
            self.dimension += 1;
        }
        if self.dimension < dimension_count {
            return false;
        }

        self.dimension = 0;
        self.heartbeat = 0;
        log::info!("{} ==== All parameters have been tested, starting over ====", LOG_PREFIX);
        true
    }

    fn sample_and_load(&mut self) -> Command {
        if self.action_space.size() == 0 {
            self.config_error("NO ACTIONS DEFINED", "Please define bot input before previewing.");
        } else if self.feature_space.size() == 0 {
            self.config_error(
                "NO EXPLORATION VALUES DEFINED",
                "Please define bot exploration values before previewing.",
            );
        } else if self.object_space.size() == 0 {
            self.config_error(
                "NO SAMPLE VALUES DEFINED",
                "Please define state tracking variables before using a state sampling bot.",
            );
        } else if self.archive.front().map_or(false, |frame| frame.objects.is_empty()) {
            self.config_error(
                "NO SAMPLED VALUES FOUND",
                "Please ensure variables are tracked in the scene before using a state sampling bot.",
            );
        }

        let load = self.heartbeat % LOAD_FREQ == 0;
        let command = match (load, self.random_frame()) {
            (true, Some(frame)) => {
                log::debug!("{} Pretending to receive LOAD", LOG_PREFIX);
                Command {
                    kind: CommandType::Load,
                    objects: frame.objects,
                    obs_id: frame.obs_id,
                    ..Default::default()
                }
            }
            _ => {
                log::debug!("{} Pretending to receive ACT", LOG_PREFIX);
                Command::act(self.sample_actions())
            }
        };

        self.advance(0);
        command
    }

    fn validate_actions(&mut self) -> Command {
        let size = self.action_space.size();
        if size == 0 {
            self.config_error("NO ACTIONS DEFINED", "Please define bot input before previewing.");
            return Command {
                kind: CommandType::Act,
                ..Default::default()
            };
        }

        let sampled = self.sample_actions();
        let value = sampled.values.get(self.dimension).cloned().unwrap_or(Scalar::Number(0.0));
        let label = self
            .action_space
            .to_display_string(self.dimension, true)
            .unwrap_or_else(|| format!("#{}", self.dimension));
        log::info!(
            "{} ==== Testing bot input configuration ==== {} Value=[{}]",
            LOG_PREFIX,
            label,
            value
        );

        let mut values = vec![Scalar::Number(0.0); size];
        values[self.dimension] = value;
        self.advance(size);
        Command::act(ActionVector { values })
    }

    fn validate_objects(&mut self) -> Command {
        let actions = self.sample_actions();
        if self.archive.len() < OBJECT_WARMUP {
            return Command::act(actions);
        }

        let Some(frame) = self.random_frame() else {
            return Command::act(actions);
        };
        let object_count = frame.objects.len();
        let node = frame.objects.get(self.dimension).cloned();

        let node = match node {
            Some(node) if self.object_space.size() > 0 => node,
            node => {
                if object_count > 0 && node.is_some() {
                    self.config_error(
                        "NO SAMPLE VALUES DEFINED",
                        "Please define state tracking variables before using a state sampling bot.",
                    );
                } else {
                    self.config_error(
                        "NO SAMPLED VALUES FOUND",
                        "Please ensure variables are tracked in the scene before using a state sampling bot.",
                    );
                }
                return Command {
                    kind: CommandType::Load,
                    actions: vec![actions],
                    obs_id: frame.obs_id,
                    ..Default::default()
                };
            }
        };

        let schema = self.object_space.find_by_id(&node.id);
        let name = schema.map(|d| d.name.clone()).unwrap_or_else(|| node.id.clone());

        if SKIPPED_OBJECTS.contains(&name.as_str()) {
            log::info!("{} ==== Skipping load for {} ====", LOG_PREFIX, name);
            self.dimension += 1;
            self.heartbeat = 0;
            self.advance(object_count);
            return Command {
                kind: CommandType::Act,
                actions: vec![actions],
                objects: vec![node],
                ..Default::default()
            };
        }

        let fields: Vec<String> = match schema {
            Some(dimension) => (0..dimension.size())
                .filter_map(|i| dimension.to_display_string(i, false))
                .collect(),
            None => Vec::new(),
        };
        let values: Vec<String> = node.values.iter().map(|v| v.to_string()).collect();
        log::info!(
            "{} ==== Testing observation load ==== {} fields [{}] values [{}]",
            LOG_PREFIX,
            node.runtime_id,
            fields.join(", "),
            values.join(", ")
        );

        self.advance(object_count);
        Command {
            kind: CommandType::Load,
            actions: vec![actions],
            objects: vec![node],
            obs_id: frame.obs_id,
        }
    }

    fn validate_features(&mut self) -> Command {
        let actions = self.sample_actions();
        if self.latest_features.len() != self.previous_features.len() {
            return Command::act(actions);
        }

        let size = self.feature_space.size();
        if size == 0 {
            self.config_error(
                "NO EXPLORATION VALUES DEFINED",
                "Please define bot exploration values before previewing.",
            );
            return Command::act(actions);
        }

        let feature = |set: &[FeatureVector], i: usize| set.first().and_then(|f| f.values.get(i)).copied();
        let latest = feature(&self.latest_features, self.dimension).unwrap_or_default();
        let previous = feature(&self.previous_features, self.dimension).unwrap_or_default();
        let label = self
            .feature_space
            .to_display_string(self.dimension, false)
            .unwrap_or_else(|| format!("#{}", self.dimension));
        log::info!(
            "{} ==== Testing bot exploration configuration ==== {} latest {} previous {} change [{}]",
            LOG_PREFIX,
            label,
            latest,
            previous,
            latest - previous
        );

        self.advance(size);
        Command::act(actions)
    }
}

impl Communicator for ValidationTransport {
    fn connect(&mut self) -> TransportResult<()> {
        match self.state {
            ChannelState::Closed => Err(TransportError::Closed),
            _ => {
                self.state = ChannelState::Connected;
                Ok(())
            }
        }
    }

    fn receive_init(&mut self) -> TransportResult<Initialization> {
        Ok(Initialization {
            game_speed: 1.0,
            heartbeat_interval: 1.0,
        })
    }

    fn send(&mut self, observation: &Observation) -> TransportResult<()> {
        match self.state {
            ChannelState::Disconnected => return Err(TransportError::NotConnected),
            ChannelState::Closed => return Err(TransportError::Closed),
            ChannelState::Connected => {}
        }

        log::debug!("{} Pretending to send observation {}", LOG_PREFIX, observation.id);
        self.previous_features = std::mem::replace(&mut self.latest_features, observation.features.clone());
        self.archive.push_back(ArchivedFrame {
            obs_id: observation.id.to_string(),
            objects: observation.objects.clone(),
        });
        while self.archive.len() > ARCHIVE_SIZE {
            self.archive.pop_front();
        }
        self.stats.messages_sent += 1;
        Ok(())
    }

    fn receive_command(&mut self) -> TransportResult<Command> {
        match self.state {
            ChannelState::Disconnected => return Err(TransportError::NotConnected),
            ChannelState::Closed => return Err(TransportError::Closed),
            ChannelState::Connected => {}
        }

        let command = match self.mode {
            ValidationMode::Everything => self.sample_and_load(),
            ValidationMode::ActionSpaceDimensions => self.validate_actions(),
            ValidationMode::ObjectSpaceDimensions => self.validate_objects(),
            ValidationMode::FeatureSpaceDimensions => self.validate_features(),
        };
        self.stats.messages_received += 1;

        if self.error_count > MAX_CONFIG_ERRORS {
            log::error!(
                "{} {} configuration problems, shutting the validation session down",
                LOG_PREFIX,
                self.error_count
            );
            return Ok(Command::shutdown());
        }
        Ok(command)
    }

    fn close(&mut self) {
        self.state = ChannelState::Closed;
    }

    fn state(&self) -> ChannelState {
        self.state
    }

    fn stats(&self) -> TransportStats {
        self.stats.clone()
    }
}
