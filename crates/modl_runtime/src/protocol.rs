//! Brain protocol messages
//!
//! JSON shapes exchanged with the Brain. Field names are camelCase and every
//! collection defaults to empty, matching proto3 JSON.

use modl_core::Scalar;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Encoded state of one tracked instance
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectVector {
    /// Prefab schema id
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub runtime_id: String,
    #[serde(default)]
    pub values: Vec<Scalar>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    #[serde(default)]
    pub values: Vec<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionVector {
    #[serde(default)]
    pub values: Vec<Scalar>,
}

impl ActionVector {
    pub fn from_numbers(values: impl IntoIterator<Item = f64>) -> Self {
        Self {
            values: values.into_iter().map(Scalar::Number).collect(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SensorVector {
    #[serde(default)]
    pub values: Vec<Scalar>,
}

/// A game event attached to an observation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Event {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    /// Unix time in milliseconds
    #[serde(default)]
    pub timestamp: i64,
    #[serde(default)]
    pub payload: Vec<Scalar>,
}

/// One heartbeat's snapshot, sent to the Brain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub id: Uuid,
    #[serde(default)]
    pub objects: Vec<ObjectVector>,
    #[serde(default)]
    pub features: Vec<FeatureVector>,
    #[serde(default)]
    pub actions: Vec<ActionVector>,
    #[serde(default)]
    pub sensors: Vec<SensorVector>,
    #[serde(default)]
    pub events: Vec<Event>,
    #[serde(default)]
    pub terminal: bool,
}

impl Observation {
    /// Empty observation with a fresh id
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            objects: Vec::new(),
            features: Vec::new(),
            actions: Vec::new(),
            sensors: Vec::new(),
            events: Vec::new(),
            terminal: false,
        }
    }

    /// Look up an object by runtime id
    pub fn object(&self, runtime_id: &str) -> Option<&ObjectVector> {
        self.objects.iter().find(|o| o.runtime_id == runtime_id)
    }
}

impl Default for Observation {
    fn default() -> Self {
        Self::new()
    }
}

/// Kind of command sent by the Brain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CommandType {
    #[default]
    Act,
    Load,
    Shutdown,
}

/// One heartbeat's instruction from the Brain
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Command {
    #[serde(rename = "type", default)]
    pub kind: CommandType,
    #[serde(default)]
    pub actions: Vec<ActionVector>,
    #[serde(default)]
    pub objects: Vec<ObjectVector>,
    /// Id of the observation being restored by a load command
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub obs_id: String,
}

impl Command {
    pub fn act(actions: ActionVector) -> Self {
        Self {
            kind: CommandType::Act,
            actions: vec![actions],
            ..Default::default()
        }
    }

    /// Restore the object state carried by an earlier observation
    pub fn load(observation: &Observation) -> Self {
        Self {
            kind: CommandType::Load,
            actions: observation.actions.clone(),
            objects: observation.objects.clone(),
            obs_id: observation.id.to_string(),
        }
    }

    pub fn shutdown() -> Self {
        Self {
            kind: CommandType::Shutdown,
            ..Default::default()
        }
    }
}

/// First message after connecting, sets the tick cadence
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Initialization {
    #[serde(default = "default_rate")]
    pub game_speed: f32,
    /// Seconds between two observations
    #[serde(default = "default_rate")]
    pub heartbeat_interval: f32,
}

fn default_rate() -> f32 {
    1.0
}

impl Default for Initialization {
    fn default() -> Self {
        Self {
            game_speed: 1.0,
            heartbeat_interval: 1.0,
        }
    }
}
