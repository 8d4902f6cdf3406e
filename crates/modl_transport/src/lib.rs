//! # modl_transport - Brain Transports
//!
//! Blocking request/response channels between the bridge and the Brain:
//! - **Socket**: ETX-framed JSON over a local TCP connection
//! - **Validation**: an offline stand-in that samples actions from the
//!   config so a game's schema can be exercised without a Brain
//!
//! ## Channel lifecycle
//!
//! ```text
//! Disconnected ──connect──► Connected ──close──► Closed
//! ```
//!
//! `Closed` is terminal, a closed channel is never reconnected.

pub mod framing;
pub mod socket;
pub mod validation;

use modl_runtime::{Command, Initialization, Observation};
use thiserror::Error;

pub use framing::{encode_frame, FrameBuffer, ETX, RECEIVE_CHUNK_SIZE};
pub use socket::{SocketTransport, DEFAULT_SOCKET_PORT, SOCKET_HOST, SOCKET_PORT_ENV};
pub use validation::{ValidationMode, ValidationTransport, ARCHIVE_SIZE, LOAD_FREQ, STEP_HEARTBEATS};

/// Transport errors
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Not connected")]
    NotConnected,

    #[error("Connection closed")]
    Closed,

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for transport operations
pub type TransportResult<T> = Result<T, TransportError>;

/// Connection state of a channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChannelState {
    #[default]
    Disconnected,
    Connected,
    Closed,
}

/// Transport statistics
#[derive(Debug, Clone, Default)]
pub struct TransportStats {
    /// Total bytes sent
    pub bytes_sent: u64,
    /// Total bytes received
    pub bytes_received: u64,
    /// Observations sent
    pub messages_sent: u64,
    /// Initializations and commands received
    pub messages_received: u64,
}

/// Blocking channel to the Brain.
///
/// One observation goes out per heartbeat and exactly one command comes
/// back; the caller blocks on [`Communicator::receive_command`].
pub trait Communicator: Send {
    /// Open the channel
    fn connect(&mut self) -> TransportResult<()>;

    /// Read the initialization message sent once after connecting
    fn receive_init(&mut self) -> TransportResult<Initialization>;

    /// Send one observation
    fn send(&mut self, observation: &Observation) -> TransportResult<()>;

    /// Block until the next command arrives
    fn receive_command(&mut self) -> TransportResult<Command>;

    /// Close the channel. Failures are logged, never returned.
    fn close(&mut self);

    /// Current channel state
    fn state(&self) -> ChannelState;

    /// Check if the channel is connected
    fn is_connected(&self) -> bool {
        self.state() == ChannelState::Connected
    }

    /// Get transport statistics
    fn stats(&self) -> TransportStats;
}

/// Re-export commonly used types
pub mod prelude {
    pub use crate::socket::SocketTransport;
    pub use crate::validation::{ValidationMode, ValidationTransport};
    pub use crate::{ChannelState, Communicator, TransportError, TransportResult};
}
