//! Heartbeat timing and frame rate events

use std::collections::VecDeque;

use modl_runtime::{AVG_FPS_EVENT, LOW_FPS_EVENT};

/// Frames in the rolling frame rate average
pub const FPS_WINDOW: usize = 10;

/// Accumulates frame time and fires once the interval is exceeded
#[derive(Debug, Clone)]
pub struct Heartbeat {
    interval: f64,
    since_last: f64,
}

impl Heartbeat {
    pub fn new(interval: f64) -> Self {
        Self {
            interval,
            since_last: 0.0,
        }
    }

    pub fn interval(&self) -> f64 {
        self.interval
    }

    /// Change the interval, keeping the time already accumulated
    pub fn set_interval(&mut self, interval: f64) {
        self.interval = interval;
    }

    /// Add `dt` seconds. Returns true on a heartbeat, which restarts the count.
    pub fn tick(&mut self, dt: f64) -> bool {
        self.since_last += dt;
        if self.since_last > self.interval {
            self.since_last = 0.0;
            true
        } else {
            false
        }
    }

    pub fn reset(&mut self) {
        self.since_last = 0.0;
    }
}

impl Default for Heartbeat {
    fn default() -> Self {
        Self::new(1.0)
    }
}

/// Frame rate event ready to be reported
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FpsEvent {
    pub name: &'static str,
    pub fps: f64,
}

/// Rolling frame rate over the last [`FPS_WINDOW`] frames.
///
/// Nothing is reported until the average has reached `min_fps` once, so the
/// slow frames of a loading screen do not count as drops.
#[derive(Debug, Clone)]
pub struct FpsMonitor {
    min_fps: f64,
    send_low: bool,
    send_avg: bool,
    durations: VecDeque<f64>,
    triggering: bool,
}

impl FpsMonitor {
    pub fn new(min_fps: f64, send_low: bool, send_avg: bool) -> Self {
        Self {
            min_fps,
            send_low,
            send_avg,
            durations: VecDeque::with_capacity(FPS_WINDOW),
            triggering: false,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.send_low || self.send_avg
    }

    pub fn is_triggering(&self) -> bool {
        self.triggering
    }

    /// Record one frame duration and return the events it produces
    pub fn sample(&mut self, dt: f64, is_heartbeat: bool) -> Vec<FpsEvent> {
        let mut events = Vec::new();
        if !self.is_enabled() {
            return events;
        }

        self.durations.push_back(dt);
        if self.durations.len() < FPS_WINDOW {
            return events;
        }

        let average = self.durations.iter().sum::<f64>() / self.durations.len() as f64;
        let fps = if average > 0.0 { 1.0 / average } else { f64::INFINITY };

        if fps >= self.min_fps {
            self.triggering = true;
        }
        if self.triggering {
            if self.send_low && fps < self.min_fps {
                events.push(FpsEvent { name: LOW_FPS_EVENT, fps });
            }
            if self.send_avg && is_heartbeat {
                events.push(FpsEvent { name: AVG_FPS_EVENT, fps });
            }
        }

        self.durations.pop_front();
        events
    }
}
