//! Game event queue
//!
//! Events reported by the host during a heartbeat are logged right away and
//! attached to the next observation. The log line format is scraped by the
//! test platform:
//!
//! ```text
//! ModlEvent;{frame};{local time};{name};{payload0};{payload1}...
//! ModlError;{frame};{local time};{name}: {reason}
//! ```

use chrono::{Local, Utc};
use modl_core::Scalar;
use parking_lot::Mutex;
use std::sync::Arc;

use crate::protocol::Event;

/// Event emitted when a load command restored an earlier observation
pub const LOAD_EVENT: &str = "MODL_DEFAULT::LOAD";
/// Event emitted while the rolling frame rate is under `minFps`
pub const LOW_FPS_EVENT: &str = "MODL_DEFAULT::LowFPS";
/// Event carrying the rolling frame rate on heartbeats
pub const AVG_FPS_EVENT: &str = "MODL_DEFAULT::AvgFPS";

/// Id given to every event until the config declares event ids
const DEFAULT_EVENT_ID: &str = "-1";

#[derive(Debug, Default)]
struct EventQueueInner {
    events: Vec<Event>,
    frame: u64,
}

/// Shared queue of pending events. Clones share the same queue.
#[derive(Debug, Clone, Default)]
pub struct EventQueue {
    inner: Arc<Mutex<EventQueueInner>>,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Frame number used in log lines
    pub fn set_frame(&self, frame: u64) {
        self.inner.lock().frame = frame;
    }

    pub fn frame(&self) -> u64 {
        self.inner.lock().frame
    }

    /// Report a game event.
    ///
    /// A payload made of a single list is flattened into numbers. Lists mixed
    /// with other values are rejected with a `ModlError` line and the event
    /// is dropped.
    pub fn report(&self, name: &str, payload: Vec<Scalar>) -> bool {
        let mut inner = self.inner.lock();
        let now = Local::now().format("%Y-%m-%d %H:%M:%S%.3f");

        let lists = payload.iter().filter(|v| matches!(v, Scalar::List(_))).count();
        let payload = match (lists, payload.len()) {
            (0, _) => payload,
            (1, 1) => payload
                .into_iter()
                .flat_map(|v| match v {
                    Scalar::List(values) => values,
                    _ => Vec::new(),
                })
                .map(Scalar::Number)
                .collect(),
            _ => {
                log::error!(
                    "ModlError;{};{};{}: trying to send not allowed type: list",
                    inner.frame,
                    now,
                    name
                );
                return false;
            }
        };

        let rendered: String = payload.iter().map(|v| format!(";{}", v)).collect();
        log::info!("ModlEvent;{};{};{}{}", inner.frame, now, name, rendered);

        inner.events.push(Event {
            id: DEFAULT_EVENT_ID.to_string(),
            name: name.to_string(),
            timestamp: Utc::now().timestamp_millis(),
            payload,
        });
        true
    }

    /// Queue a bridge event without logging it
    pub fn push(&self, event: Event) {
        self.inner.lock().events.push(event);
    }

    /// Queue the event announcing that an observation was loaded
    pub fn push_load(&self, obs_id: &str) {
        self.push(Event {
            id: DEFAULT_EVENT_ID.to_string(),
            name: LOAD_EVENT.to_string(),
            timestamp: Utc::now().timestamp_millis(),
            payload: vec![Scalar::Text(obs_id.to_string())],
        });
    }

    /// Take every pending event, oldest first
    pub fn drain(&self) -> Vec<Event> {
        std::mem::take(&mut self.inner.lock().events)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
