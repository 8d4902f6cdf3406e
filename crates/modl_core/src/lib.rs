//! # modl_core - Modl Bridge Core
//!
//! Leaf-level building blocks shared by every other bridge crate:
//! - **Scalars**: the closed set of wire values exchanged with the Brain
//! - **Codec**: flattening typed host fields into scalar buffers and back
//! - **Spaces**: schema trees describing actions, objects and features
//! - **Config**: the `game_config.json` document read at startup
//!
//! ## Wire formats
//!
//! Two buffer layouts coexist, mirroring the Brain protocol:
//!
//! ```text
//! Legacy  (actions, features):  [count, v0, v1, ...]   numbers only
//! Typed   (objects):            [List([v0, v1, ...])]   numbers, text, lists
//! ```

pub mod codec;
pub mod config;
pub mod scalar;
pub mod space;

pub use codec::{CodecError, CodecResult, FieldType, FieldValue, NumericKind, ValueCodec, WireFormat};
pub use config::{ConfigError, GameConfig, BRAIN_VERSION, DEFAULT_CONFIG_PATH};
pub use scalar::Scalar;
pub use space::{Dimension, DimensionKind, SchemaError, SchemaResult, SpaceBuilder, FieldSpec};

/// Prefix carried by every diagnostic line the bridge emits.
///
/// Downstream log scrapers match on it, so it must never change.
pub const LOG_PREFIX: &str = "[MODL]";

/// Tag marking a dimension whose field is consumed but never written back.
pub const READ_ONLY_TAG: &str = "readOnly";

/// Re-export commonly used types
pub mod prelude {
    pub use crate::codec::{FieldType, FieldValue, NumericKind, ValueCodec, WireFormat};
    pub use crate::config::GameConfig;
    pub use crate::scalar::Scalar;
    pub use crate::space::{Dimension, DimensionKind, SpaceBuilder};
    pub use crate::LOG_PREFIX;
}
