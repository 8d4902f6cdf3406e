//! # modl_session - Bridge Session
//!
//! Drives the Brain exchange from the host's frame loop:
//! - **Config**: process switches from `MODL_*` environment variables
//! - **Heartbeat**: one observation/command exchange per heartbeat interval,
//!   plus optional frame rate events
//! - **Session**: owns the binding cache, codec, transport and consumer;
//!   handles pause/resume, terminal states and the shutdown drain
//!
//! ```text
//! tick(dt) ──► heartbeat? ──► observation ──► Brain ──► command ──► game
//!                                   └──────► consumer
//! ```

pub mod config;
pub mod error;
pub mod heartbeat;
pub mod session;

pub use config::{BridgeConfig, CommType};
pub use error::{SessionError, SessionResult};
pub use heartbeat::{FpsEvent, FpsMonitor, Heartbeat, FPS_WINDOW};
pub use session::{transport_for, BridgeSession, ListenerId, LoadStateListener, TickOutcome};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::config::{BridgeConfig, CommType};
    pub use crate::session::{BridgeSession, TickOutcome};
    pub use crate::{SessionError, SessionResult};
    pub use modl_delivery::prelude::*;
    pub use modl_runtime::prelude::*;
    pub use modl_transport::prelude::*;
}
