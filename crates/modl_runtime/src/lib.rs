//! # modl_runtime - Modl Bridge Runtime
//!
//! Connects the schema in `game_config.json` to live host objects:
//! - **Accessors**: explicit getter/setter tables standing in for reflection
//! - **Registry**: per-prefab binding templates and per-instance bindings
//! - **Protocol**: Observation / Command / Initialization messages
//! - **Frame codec**: builds observations and applies commands
//! - **Events**: game events reported into the next observation
//!
//! ## Frame flow
//!
//! ```text
//! RuntimeBindingCache ──build_observation──► Observation ──► transport
//!          ▲                                                    │
//!          └────────────── apply_command ◄── Command ◄──────────┘
//! ```

pub mod accessor;
pub mod error;
pub mod events;
pub mod frame;
pub mod protocol;
pub mod registry;
pub mod runtime_id;

pub use accessor::{
    AccessorTable, BoundField, ComponentResolver, ComponentSet, FieldAccessor, FieldTemplate, SharedComponent,
};
pub use error::{RegistryError, RegistryResult};
pub use events::{EventQueue, LOAD_EVENT, LOW_FPS_EVENT, AVG_FPS_EVENT};
pub use frame::{ApplyReport, FrameCodec, LoadStateEntry};
pub use protocol::{
    ActionVector, Command, CommandType, Event, FeatureVector, Initialization, ObjectVector, Observation, SensorVector,
};
pub use registry::{BindingTemplate, FieldBinding, FieldRegistry, RuntimeBindingCache, RuntimeObjectEntry, SchemaTemplates};
pub use runtime_id::RuntimeId;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::accessor::{AccessorTable, ComponentSet, SharedComponent};
    pub use crate::events::EventQueue;
    pub use crate::frame::FrameCodec;
    pub use crate::protocol::{Command, CommandType, Initialization, Observation};
    pub use crate::registry::{FieldRegistry, RuntimeBindingCache};
    pub use crate::runtime_id::RuntimeId;
    pub use modl_core::prelude::*;
}
