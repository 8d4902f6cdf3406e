//! SQS observation consumer
//!
//! Observations are rendered into queue messages and buffered. Every
//! `batch_size` messages a send task is started:
//!
//! ```text
//! 1 message   ──► presigned GET  ?Action=SendMessage&MessageBody=...
//! n messages  ──► signed POST    SendMessageBatch {"Entries": [...], "QueueUrl": ...}
//! ```
//!
//! Tasks complete on the client's threads. Their ids live in a shared set
//! until the completion callback removes them; any non-200 response raises
//! the refused flag for the rest of the session.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use modl_core::LOG_PREFIX;
use modl_runtime::Observation;
use parking_lot::Mutex;

use crate::client::{DeliveryClient, DeliveryOutcome, HttpDeliveryClient};
use crate::credentials::Credentials;
use crate::message::{batch_body, Envelope};
use crate::signing::{SignedRequest, Signer};
use crate::{DeliveryError, DeliveryResult, ObservationConsumer};

/// Service name used for signing and the batch target header
pub const SQS_SERVICE: &str = "sqs";

const SEND_MESSAGE: &str = "SendMessage";
const SEND_MESSAGE_BATCH: &str = "SendMessageBatch";

/// Batches observations into signed SQS requests
pub struct SqsObservationConsumer<C: DeliveryClient> {
    client: C,
    signer: Signer,
    envelope: Envelope,
    batch_size: usize,
    buffer: Vec<String>,
    total: u64,
    next_task_id: u64,
    outstanding: Arc<Mutex<HashSet<u64>>>,
    refused: Arc<AtomicBool>,
}

impl SqsObservationConsumer<HttpDeliveryClient> {
    /// Consumer configured from the environment, sending over HTTP
    pub fn from_env() -> DeliveryResult<Self> {
        Ok(Self::new(HttpDeliveryClient::new()?, Credentials::from_env()?))
    }
}

impl<C: DeliveryClient> SqsObservationConsumer<C> {
    pub fn new(client: C, credentials: Credentials) -> Self {
        let envelope = Envelope::new(credentials.session_id.clone());
        Self {
            client,
            signer: Signer::new(credentials, SQS_SERVICE),
            envelope,
            batch_size: 1,
            buffer: Vec::new(),
            total: 0,
            next_task_id: 0,
            outstanding: Arc::new(Mutex::new(HashSet::new())),
            refused: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.set_batch_size(batch_size);
        self
    }

    pub fn with_identity(mut self, identity: impl Into<String>) -> Self {
        self.envelope = self.envelope.with_identity(identity);
        self
    }

    /// Messages per send task. Values below 1 are ignored.
    pub fn set_batch_size(&mut self, batch_size: usize) {
        if batch_size >= 1 {
            self.batch_size = batch_size;
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Messages waiting for the next send task
    pub fn current_buffer_size(&self) -> usize {
        self.buffer.len()
    }

    /// True once any request got something other than a 200
    pub fn was_any_message_refused(&self) -> bool {
        self.refused.load(Ordering::SeqCst)
    }

    /// Send tasks started but not yet completed
    pub fn outstanding_tasks(&self) -> usize {
        self.outstanding.lock().len()
    }

    /// Observations accepted since the session started
    pub fn total_observations(&self) -> u64 {
        self.total
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    fn build_request(&self, messages: &[String]) -> DeliveryResult<SignedRequest> {
        let now = Utc::now();
        match messages {
            [] => Err(DeliveryError::Http("send task with no messages".to_string())),
            [single] => {
                let mut params = BTreeMap::new();
                params.insert("MessageBody".to_string(), single.clone());
                self.signer.presigned_get(SEND_MESSAGE, &params, now)
            }
            many => {
                let queue_url = self.signer.credentials().queue_url(SQS_SERVICE);
                let body = batch_body(many, &queue_url).map_err(|e| DeliveryError::Http(e.to_string()))?;
                self.signer.signed_post(SEND_MESSAGE_BATCH, body, now)
            }
        }
    }

    /// Start a send task for `messages`
    fn start_task(&mut self, messages: Vec<String>) {
        let request = match self.build_request(&messages) {
            Ok(request) => request,
            Err(e) => {
                log::error!("{} Could not prepare send task: {}", LOG_PREFIX, e);
                self.refused.store(true, Ordering::SeqCst);
                return;
            }
        };

        let task_id = self.next_task_id;
        self.next_task_id += 1;
        self.outstanding.lock().insert(task_id);
        log::trace!("{} Send task {} with {} messages", LOG_PREFIX, task_id, messages.len());

        let outstanding = self.outstanding.clone();
        let refused = self.refused.clone();
        self.client.dispatch(
            task_id,
            request,
            Box::new(move |outcome: DeliveryOutcome| {
                if !outstanding.lock().remove(&outcome.task_id) {
                    log::error!("{} Unknown send task {}", LOG_PREFIX, outcome.task_id);
                }
                if let Some(e) = outcome.to_error() {
                    log::warn!("{} Send task {} failed: {}", LOG_PREFIX, outcome.task_id, e);
                    refused.store(true, Ordering::SeqCst);
                }
            }),
        );
    }

    fn flush(&mut self) {
        if !self.buffer.is_empty() {
            let messages = std::mem::take(&mut self.buffer);
            self.start_task(messages);
        }
    }
}

impl<C: DeliveryClient> ObservationConsumer for SqsObservationConsumer<C> {
    fn initialize(&mut self) -> bool {
        self.buffer.clear();
        self.total = 0;
        self.refused.store(false, Ordering::SeqCst);

        let valid = self.signer.credentials().is_valid();
        if valid {
            log::info!(
                "{} Sending observations to {} in batches of {}",
                LOG_PREFIX,
                self.signer.credentials().host,
                self.batch_size
            );
        } else {
            log::warn!("{} Incomplete queue credentials, observations will not be delivered", LOG_PREFIX);
        }
        valid
    }

    fn on_observation(&mut self, observation: &Observation) {
        let json = match serde_json::to_string(observation) {
            Ok(json) => json,
            Err(e) => {
                log::error!("{} Could not serialize observation {}: {}", LOG_PREFIX, observation.id, e);
                return;
            }
        };

        self.buffer.push(self.envelope.observation(Utc::now(), &json));
        self.total += 1;
        if self.buffer.len() >= self.batch_size {
            self.flush();
        }
    }

    fn deinitialize(&mut self) {
        self.flush();
        let done = self.envelope.done(Utc::now(), self.total);
        self.start_task(vec![done]);
        self.total = 0;
    }

    fn is_done(&self) -> bool {
        self.outstanding.lock().is_empty()
    }

    fn name(&self) -> &'static str {
        "sqs"
    }
}

impl<C: DeliveryClient> fmt::Display for SqsObservationConsumer<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Observations received: {}; {} messages buffered for SQS in batches of {}",
            self.total,
            self.current_buffer_size(),
            self.batch_size
        )
    }
}
