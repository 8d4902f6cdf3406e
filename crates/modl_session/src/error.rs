//! Session errors

use modl_core::ConfigError;
use modl_delivery::DeliveryError;
use modl_runtime::RegistryError;
use modl_transport::TransportError;
use thiserror::Error;

/// Errors surfaced by a bridge session
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Delivery error: {0}")]
    Delivery(#[from] DeliveryError),

    #[error("Session already finished")]
    Finished,
}

/// Result type for session operations
pub type SessionResult<T> = Result<T, SessionError>;
