//! Waiting for a consumer to finish
//!
//! The host keeps ticking while the consumer drains, so the waiter is
//! polled once per frame. [`DrainWaiter::wait`] is the blocking variant for
//! hosts without a frame loop.

use std::time::{Duration, Instant};

use modl_core::LOG_PREFIX;

use crate::ObservationConsumer;

/// Pause between two polls in [`DrainWaiter::wait`]
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Result of one poll
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainStatus {
    Pending,
    Done,
    TimedOut,
}

/// Tracks how long a drain has been running
#[derive(Debug, Clone)]
pub struct DrainWaiter {
    started: Instant,
    timeout: Option<Duration>,
}

impl DrainWaiter {
    /// Wait with no deadline
    pub fn new() -> Self {
        log::info!("{} Waiting for consumer shut down", LOG_PREFIX);
        Self {
            started: Instant::now(),
            timeout: None,
        }
    }

    /// Give up after `timeout`
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
            ..Self::new()
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Check the consumer once
    pub fn poll(&self, consumer: &dyn ObservationConsumer) -> DrainStatus {
        if consumer.is_done() {
            log::info!(
                "{} Done waiting for consumer ({:.3} s)",
                LOG_PREFIX,
                self.elapsed().as_secs_f64()
            );
            return DrainStatus::Done;
        }
        match self.timeout {
            Some(timeout) if self.elapsed() >= timeout => {
                log::warn!(
                    "{} Gave up waiting for {} consumer after {:.3} s",
                    LOG_PREFIX,
                    consumer.name(),
                    self.elapsed().as_secs_f64()
                );
                DrainStatus::TimedOut
            }
            _ => DrainStatus::Pending,
        }
    }

    /// Block until the consumer is done or the deadline passes.
    /// Returns true when the consumer finished.
    pub fn wait(consumer: &dyn ObservationConsumer, timeout: Duration) -> bool {
        let waiter = Self::with_timeout(timeout);
        loop {
            match waiter.poll(consumer) {
                DrainStatus::Done => return true,
                DrainStatus::TimedOut => return false,
                DrainStatus::Pending => std::thread::sleep(POLL_INTERVAL),
            }
        }
    }
}

impl Default for DrainWaiter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use modl_runtime::Observation;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    struct Flagged(Arc<AtomicBool>);

    impl ObservationConsumer for Flagged {
        fn initialize(&mut self) -> bool {
            true
        }
        fn on_observation(&mut self, _observation: &Observation) {}
        fn deinitialize(&mut self) {}
        fn is_done(&self) -> bool {
            self.0.load(Ordering::SeqCst)
        }
        fn name(&self) -> &'static str {
            "flagged"
        }
    }

    #[test]
    fn test_poll_until_done() {
        let flag = Arc::new(AtomicBool::new(false));
        let consumer = Flagged(flag.clone());
        let waiter = DrainWaiter::new();
        assert_eq!(waiter.poll(&consumer), DrainStatus::Pending);
        flag.store(true, Ordering::SeqCst);
        assert_eq!(waiter.poll(&consumer), DrainStatus::Done);
    }

    #[test]
    fn test_wait_times_out() {
        let consumer = Flagged(Arc::new(AtomicBool::new(false)));
        assert!(!DrainWaiter::wait(&consumer, Duration::from_millis(30)));
    }

    #[test]
    fn test_wait_returns_when_done() {
        let flag = Arc::new(AtomicBool::new(false));
        let consumer = Flagged(flag.clone());
        let setter = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            flag.store(true, Ordering::SeqCst);
        });
        assert!(DrainWaiter::wait(&consumer, Duration::from_secs(5)));
        setter.join().unwrap();
    }
}
