//! HTTP clients for signed requests
//!
//! Requests are dispatched fire-and-forget; the completion callback runs on
//! whatever thread the client finishes on.

use std::time::Duration;

use modl_core::LOG_PREFIX;
use tokio::runtime::Runtime;

use crate::signing::{HttpMethod, SignedRequest};
use crate::{DeliveryError, DeliveryResult};

/// Upper bound on a single request, connection included
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// How a send task ended
#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryOutcome {
    pub task_id: u64,
    /// Response status, `None` when no response arrived
    pub status: Option<u16>,
    /// Transport failure, if any
    pub error: Option<String>,
}

impl DeliveryOutcome {
    pub fn ok(task_id: u64) -> Self {
        Self::status(task_id, 200)
    }

    pub fn status(task_id: u64, status: u16) -> Self {
        Self {
            task_id,
            status: Some(status),
            error: None,
        }
    }

    pub fn failed(task_id: u64, error: impl Into<String>) -> Self {
        Self {
            task_id,
            status: None,
            error: Some(error.into()),
        }
    }

    /// Only a 200 counts as delivered
    pub fn is_success(&self) -> bool {
        self.status == Some(200)
    }

    pub fn to_error(&self) -> Option<DeliveryError> {
        match (self.status, &self.error) {
            (Some(200), _) => None,
            (Some(status), _) => Some(DeliveryError::DeliveryRefused { status }),
            (None, Some(e)) => Some(DeliveryError::Http(e.clone())),
            (None, None) => Some(DeliveryError::Http("no response".to_string())),
        }
    }
}

/// Callback invoked once per dispatched request
pub type Completion = Box<dyn FnOnce(DeliveryOutcome) + Send + 'static>;

/// Sends signed requests in the background
pub trait DeliveryClient: Send + Sync {
    /// Start sending `request`; `on_complete` must be called exactly once
    fn dispatch(&self, task_id: u64, request: SignedRequest, on_complete: Completion);
}

/// reqwest client driven by its own tokio runtime
pub struct HttpDeliveryClient {
    runtime: Runtime,
    http: reqwest::Client,
}

impl HttpDeliveryClient {
    pub fn new() -> DeliveryResult<Self> {
        Self::with_timeout(DEFAULT_REQUEST_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> DeliveryResult<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("modl-delivery")
            .enable_all()
            .build()
            .map_err(|e| DeliveryError::Http(format!("could not start runtime: {}", e)))?;
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DeliveryError::Http(e.to_string()))?;
        Ok(Self { runtime, http })
    }

    async fn send(http: reqwest::Client, request: SignedRequest) -> Result<u16, reqwest::Error> {
        let mut builder = match request.method {
            HttpMethod::Get => http.get(&request.url),
            HttpMethod::Post => http.post(&request.url),
        };
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        if status != 200 {
            let body = response.text().await.unwrap_or_default();
            log::debug!("{} Response {} body: {}", LOG_PREFIX, status, body);
        }
        Ok(status)
    }
}

impl DeliveryClient for HttpDeliveryClient {
    fn dispatch(&self, task_id: u64, request: SignedRequest, on_complete: Completion) {
        let http = self.http.clone();
        self.runtime.spawn(async move {
            let url = request.url.clone();
            let outcome = match Self::send(http, request).await {
                Ok(status) => DeliveryOutcome::status(task_id, status),
                Err(e) => DeliveryOutcome::failed(task_id, e.to_string()),
            };
            log::trace!("{} Send task {} finished: {:?} {}", LOG_PREFIX, task_id, outcome.status, url);
            on_complete(outcome);
        });
    }
}
