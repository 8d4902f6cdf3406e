//! # modl_delivery - Observation Delivery
//!
//! Every observation sent to the Brain is also handed to an
//! [`ObservationConsumer`] for archival:
//! - **Local**: keeps observations in memory as JSON
//! - **SQS**: batches observations into signed `SendMessage` /
//!   `SendMessageBatch` requests sent in the background
//!
//! ## Shutdown
//!
//! ```text
//! deinitialize() ──► flush buffer + DONE message ──► DrainWaiter polls is_done()
//! ```
//!
//! Shutdown never aborts a request in flight; the host keeps ticking until
//! [`ObservationConsumer::is_done`] reports every send task finished.

pub mod client;
pub mod credentials;
pub mod drain;
pub mod local;
pub mod message;
pub mod signing;
pub mod sqs;

use modl_core::LOG_PREFIX;
use modl_runtime::Observation;
use thiserror::Error;

pub use client::{Completion, DeliveryClient, DeliveryOutcome, HttpDeliveryClient, DEFAULT_REQUEST_TIMEOUT};
pub use credentials::{Credentials, OBS_SESSION_ENV, OBS_URL_ENV};
pub use drain::{DrainStatus, DrainWaiter};
pub use local::LocalObservationConsumer;
pub use message::{Envelope, PLUGIN_IDENTITY};
pub use signing::{aws_escape, signing_key, HttpMethod, SignedRequest, Signer};
pub use sqs::{SqsObservationConsumer, SQS_SERVICE};

/// Delivery errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DeliveryError {
    #[error("Missing credentials: {0}")]
    MissingCredentials(String),

    #[error("Delivery refused with status {status}")]
    DeliveryRefused { status: u16 },

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("Signing failed: {0}")]
    Signing(String),
}

/// Result type for delivery operations
pub type DeliveryResult<T> = Result<T, DeliveryError>;

/// Sink receiving every observation of a session
pub trait ObservationConsumer: Send {
    /// Prepare for a new session. Returns false when the consumer cannot
    /// deliver anything (e.g. incomplete credentials).
    fn initialize(&mut self) -> bool;

    /// Accept one observation, in call order
    fn on_observation(&mut self, observation: &Observation);

    /// Flush what is buffered and announce the end of the session
    fn deinitialize(&mut self);

    /// True once nothing is left in flight
    fn is_done(&self) -> bool;

    /// Short name used in logs
    fn name(&self) -> &'static str;
}

/// Pick the consumer for this process.
///
/// The SQS consumer is used when `OBS_URL` and `OBS_SESSION` are set and
/// the remaining credentials are present; otherwise observations stay local.
pub fn consumer_from_env() -> Box<dyn ObservationConsumer> {
    consumer_from_lookup(|key| std::env::var(key).ok())
}

/// [`consumer_from_env`] with a custom variable lookup
pub fn consumer_from_lookup<F>(lookup: F) -> Box<dyn ObservationConsumer>
where
    F: Fn(&str) -> Option<String>,
{
    if lookup(OBS_URL_ENV).is_none() || lookup(OBS_SESSION_ENV).is_none() {
        log::debug!("{} No observation endpoint configured, keeping observations local", LOG_PREFIX);
        return Box::new(LocalObservationConsumer::new());
    }

    let credentials = match Credentials::from_lookup(&lookup) {
        Ok(credentials) => credentials,
        Err(e) => {
            log::warn!("{} {}, keeping observations local", LOG_PREFIX, e);
            return Box::new(LocalObservationConsumer::new());
        }
    };

    match HttpDeliveryClient::new() {
        Ok(client) => Box::new(SqsObservationConsumer::new(client, credentials)),
        Err(e) => {
            log::error!("{} Could not start delivery client: {}", LOG_PREFIX, e);
            Box::new(LocalObservationConsumer::new())
        }
    }
}

/// Re-export commonly used types
pub mod prelude {
    pub use crate::client::{DeliveryClient, HttpDeliveryClient};
    pub use crate::credentials::Credentials;
    pub use crate::drain::DrainWaiter;
    pub use crate::local::LocalObservationConsumer;
    pub use crate::sqs::SqsObservationConsumer;
    pub use crate::{consumer_from_env, DeliveryError, DeliveryResult, ObservationConsumer};
}
