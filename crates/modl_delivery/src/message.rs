//! Queue message bodies
//!
//! ```text
//! {session}; {unix ms}; {identity}; OBSERVATION; {observation json}
//! {session}; {unix ms}; {identity}; DONE; {"total":N}
//! ```

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Identity of the bridge in message bodies
pub const PLUGIN_IDENTITY: &str = "UnityPlugin";

/// Fixed part of every message sent during a session
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub session_id: String,
    pub identity: String,
}

impl Envelope {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            identity: PLUGIN_IDENTITY.to_string(),
        }
    }

    pub fn with_identity(mut self, identity: impl Into<String>) -> Self {
        self.identity = identity.into();
        self
    }

    fn render(&self, at: DateTime<Utc>, kind: &str, body: &str) -> String {
        format!(
            "{}; {}; {}; {}; {}",
            self.session_id,
            at.timestamp_millis(),
            self.identity,
            kind,
            body
        )
    }

    /// Message carrying one serialized observation
    pub fn observation(&self, at: DateTime<Utc>, observation_json: &str) -> String {
        self.render(at, "OBSERVATION", observation_json)
    }

    /// Message closing the session
    pub fn done(&self, at: DateTime<Utc>, total: u64) -> String {
        self.render(at, "DONE", &format!("{{\"total\":{}}}", total))
    }
}

#[derive(Serialize)]
struct BatchEntry<'a> {
    #[serde(rename = "MessageBody")]
    message_body: &'a str,
    #[serde(rename = "Id")]
    id: String,
}

#[derive(Serialize)]
struct BatchBody<'a> {
    #[serde(rename = "Entries")]
    entries: Vec<BatchEntry<'a>>,
    #[serde(rename = "QueueUrl")]
    queue_url: &'a str,
}

/// JSON body of a `SendMessageBatch` request; entry ids are positions
pub fn batch_body(messages: &[String], queue_url: &str) -> serde_json::Result<String> {
    serde_json::to_string(&BatchBody {
        entries: messages
            .iter()
            .enumerate()
            .map(|(i, m)| BatchEntry {
                message_body: m,
                id: i.to_string(),
            })
            .collect(),
        queue_url,
    })
}
