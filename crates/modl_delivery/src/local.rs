//! In-memory observation consumer

use std::fmt;

use modl_core::LOG_PREFIX;
use modl_runtime::Observation;

use crate::ObservationConsumer;

/// Keeps every observation of the session as JSON
#[derive(Debug, Default)]
pub struct LocalObservationConsumer {
    observations: Vec<String>,
}

impl LocalObservationConsumer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observations(&self) -> &[String] {
        &self.observations
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }
}

impl ObservationConsumer for LocalObservationConsumer {
    fn initialize(&mut self) -> bool {
        self.observations.clear();
        true
    }

    fn on_observation(&mut self, observation: &Observation) {
        match serde_json::to_string(observation) {
            Ok(json) => self.observations.push(json),
            Err(e) => log::error!("{} Could not serialize observation {}: {}", LOG_PREFIX, observation.id, e),
        }
    }

    fn deinitialize(&mut self) {
        self.observations.clear();
    }

    fn is_done(&self) -> bool {
        true
    }

    fn name(&self) -> &'static str {
        "local"
    }
}

impl fmt::Display for LocalObservationConsumer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, observation) in self.observations.iter().enumerate() {
            writeln!(f, "[{}] {}", i, observation)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keeps_json_in_order() {
        let mut consumer = LocalObservationConsumer::new();
        assert!(consumer.initialize());

        let first = Observation::new();
        let second = Observation::new();
        consumer.on_observation(&first);
        consumer.on_observation(&second);

        assert_eq!(consumer.len(), 2);
        assert!(consumer.observations()[0].contains(&first.id.to_string()));
        assert!(consumer.to_string().starts_with("[0] {"));
        assert!(consumer.is_done());

        consumer.deinitialize();
        assert!(consumer.is_empty());
    }
}
