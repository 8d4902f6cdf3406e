//! Frame codec
//!
//! Builds the observation for a heartbeat from the binding cache and applies
//! the Brain's command back onto the bound fields. Iteration always follows
//! registration order, then schema declaration order, so the same binding
//! state encodes to the same buffers.

use modl_core::{CodecError, FieldValue, Scalar, ValueCodec, LOG_PREFIX};

use crate::error::{RegistryError, RegistryResult};
use crate::events::EventQueue;
use crate::protocol::{ActionVector, Command, CommandType, FeatureVector, ObjectVector, Observation, SensorVector};
use crate::registry::{FieldBinding, RuntimeBindingCache};
use crate::runtime_id::RuntimeId;

/// Value of one object field carried by a command, handed to load-state listeners
#[derive(Debug, Clone, PartialEq)]
pub struct LoadStateEntry {
    pub runtime_id: RuntimeId,
    pub field_id: String,
    pub read_only: bool,
    pub value: FieldValue,
}

/// Outcome of applying a command
#[derive(Debug, Default)]
pub struct ApplyReport {
    pub kind: CommandType,
    /// Action fields written
    pub actions_written: usize,
    /// Object fields written
    pub fields_written: usize,
    /// Runtime ids named by the command that are not tracked
    pub unknown_instances: Vec<String>,
    /// Field-level failures; the rest of the command was still applied
    pub errors: Vec<RegistryError>,
    /// Every object field value carried by the command
    pub loaded: Vec<LoadStateEntry>,
}

impl ApplyReport {
    fn new(kind: CommandType) -> Self {
        Self {
            kind,
            ..Default::default()
        }
    }

    pub fn is_shutdown(&self) -> bool {
        self.kind == CommandType::Shutdown
    }

    pub fn is_clean(&self) -> bool {
        self.unknown_instances.is_empty() && self.errors.is_empty()
    }
}

fn window<T>(values: &[T], offset: usize, len: usize) -> &[T] {
    let start = offset.min(values.len());
    let end = offset.saturating_add(len).min(values.len());
    &values[start..end]
}

/// Legacy action buffers are numeric; the first other scalar is returned as the error.
fn numeric_window(values: &[Scalar]) -> Result<Vec<f64>, &Scalar> {
    values.iter().map(|v| v.as_number().ok_or(v)).collect()
}

/// Encodes observations and decodes commands
#[derive(Debug, Clone)]
pub struct FrameCodec {
    typed: ValueCodec,
    legacy: ValueCodec,
    events: EventQueue,
}

impl FrameCodec {
    pub fn new(events: EventQueue) -> Self {
        Self {
            typed: ValueCodec::typed(),
            legacy: ValueCodec::legacy(),
            events,
        }
    }

    /// Override the nesting limit of both codecs
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.typed = self.typed.with_max_depth(max_depth);
        self.legacy = self.legacy.with_max_depth(max_depth);
        self
    }

    /// Queue that feeds the observation event list
    pub fn events(&self) -> &EventQueue {
        &self.events
    }

    /// Snapshot every tracked instance into a new observation.
    ///
    /// Pending events are drained into it. Only instances whose prefab has
    /// object fields produce an object vector.
    pub fn build_observation(&self, cache: &RuntimeBindingCache, terminal: bool) -> RegistryResult<Observation> {
        let mut observation = Observation::new();
        observation.terminal = terminal;

        for entry in cache.entries() {
            if entry.object_bindings.is_empty() {
                continue;
            }
            let mut values = Vec::new();
            for binding in &entry.object_bindings {
                values.extend(self.encode_typed(binding)?);
            }
            observation.objects.push(ObjectVector {
                id: entry.prefab_schema_id.clone(),
                runtime_id: entry.runtime_id.to_string(),
                values,
            });
        }

        observation.features.push(FeatureVector {
            values: self.encode_numbers(cache.feature_bindings())?,
        });
        observation
            .actions
            .push(ActionVector::from_numbers(self.encode_numbers(cache.action_bindings())?));
        observation.sensors.push(SensorVector::default());
        observation.events = self.events.drain();

        Ok(observation)
    }

    fn encode_typed(&self, binding: &FieldBinding) -> RegistryResult<Vec<Scalar>> {
        let accessor = binding.accessor();
        let value = accessor.read()?;
        self.typed
            .encode(&value, accessor.field_type())
            .map_err(|e| RegistryError::codec(binding.field_id.clone(), e))
    }

    fn encode_numbers<'a>(&self, bindings: impl Iterator<Item = &'a FieldBinding>) -> RegistryResult<Vec<f64>> {
        let mut out = Vec::new();
        for binding in bindings {
            let accessor = binding.accessor();
            let value = accessor.read()?;
            let numbers = self
                .legacy
                .encode_numbers(&value, accessor.field_type())
                .map_err(|e| RegistryError::codec(binding.field_id.clone(), e))?;
            out.extend(numbers);
        }
        Ok(out)
    }

    /// Apply a command from the Brain.
    ///
    /// The first action vector is decoded against every action binding in
    /// order. Object vectors are matched by runtime id; unknown ids are
    /// logged and skipped. Read-only fields are consumed from the buffer but
    /// never written. A load command queues a load event for the next
    /// observation.
    pub fn apply_command(&self, cache: &RuntimeBindingCache, command: &Command) -> ApplyReport {
        let mut report = ApplyReport::new(command.kind);

        if let Some(actions) = command.actions.first() {
            self.apply_actions(cache, actions, &mut report);
        }

        for object in &command.objects {
            self.apply_object(cache, object, &mut report);
        }

        if command.kind == CommandType::Load {
            self.events.push_load(&command.obs_id);
        }

        report
    }

    fn apply_actions(&self, cache: &RuntimeBindingCache, actions: &ActionVector, report: &mut ApplyReport) {
        let mut offset = 0;
        for binding in cache.action_bindings() {
            let slice = window(&actions.values, offset, binding.buffer_size);
            offset += binding.buffer_size;
            if binding.read_only {
                continue;
            }

            let accessor = binding.accessor();
            let numbers = match numeric_window(slice) {
                Ok(numbers) => numbers,
                Err(found) => {
                    let e = RegistryError::codec(
                        binding.field_id.clone(),
                        CodecError::TypeMismatch {
                            expected: accessor.field_type().type_name(),
                            found: found.kind_name().to_string(),
                        },
                    );
                    log::warn!("{} Could not apply action: {}", LOG_PREFIX, e);
                    report.errors.push(e);
                    continue;
                }
            };
            let result = self
                .legacy
                .decode_numbers(&numbers, accessor.field_type())
                .map_err(|e| RegistryError::codec(binding.field_id.clone(), e))
                .and_then(|(value, _)| accessor.write(value));
            match result {
                Ok(()) => report.actions_written += 1,
                Err(e) => {
                    log::warn!("{} Could not apply action: {}", LOG_PREFIX, e);
                    report.errors.push(e);
                }
            }
        }
    }

    fn apply_object(&self, cache: &RuntimeBindingCache, object: &ObjectVector, report: &mut ApplyReport) {
        let entry = match cache.entry(&object.runtime_id) {
            Ok(entry) => entry,
            Err(e) => {
                log::error!(
                    "{} {}, do not track objects that are destroyed during runtime",
                    LOG_PREFIX,
                    e
                );
                report.unknown_instances.push(object.runtime_id.clone());
                return;
            }
        };

        let mut offset = 0;
        for binding in &entry.object_bindings {
            let slice = window(&object.values, offset, binding.buffer_size);
            offset += binding.buffer_size;

            let accessor = binding.accessor();
            let value = match self.typed.decode(slice, accessor.field_type()) {
                Ok((value, _)) => value,
                Err(e) => {
                    let e = RegistryError::codec(binding.field_id.clone(), e);
                    log::warn!("{} Could not decode {} field: {}", LOG_PREFIX, entry.runtime_id, e);
                    report.errors.push(e);
                    continue;
                }
            };

            report.loaded.push(LoadStateEntry {
                runtime_id: entry.runtime_id.clone(),
                field_id: binding.field_id.clone(),
                read_only: binding.read_only,
                value: value.clone(),
            });

            if binding.read_only {
                continue;
            }
            match accessor.write(value) {
                Ok(()) => report.fields_written += 1,
                Err(e) => {
                    log::warn!("{} Could not write {} field: {}", LOG_PREFIX, entry.runtime_id, e);
                    report.errors.push(e);
                }
            }
        }
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new(EventQueue::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accessor::{AccessorTable, ComponentSet};
    use crate::events::LOAD_EVENT;
    use crate::registry::{BindingTemplate, FieldRegistry};
    use modl_core::WireFormat;
    use parking_lot::RwLock;
    use std::sync::Arc;

    #[derive(Default)]
    struct Body {
        x: f32,
        y: f32,
        hp: f32,
    }

    fn cache_with_body(body: Arc<RwLock<Body>>) -> RuntimeBindingCache {
        let mut table = AccessorTable::new();
        table
            .register_float::<Body, _, _>("Body", "Body|x", |b| b.x, |b, v| b.x = v)
            .register_float::<Body, _, _>("Body", "Body|y", |b| b.y, |b, v| b.y = v)
            .register_float::<Body, _, _>("Body", "Body|hp", |b| b.hp, |b, v| b.hp = v);

        let template = |field: &str, read_only: bool| {
            BindingTemplate::sized(table.get("Body", field).unwrap(), WireFormat::Typed, read_only).unwrap()
        };
        let mut registry = FieldRegistry::new();
        registry.register_schema(
            "body",
            vec![template("Body|x", false), template("Body|hp", true)],
            vec![template("Body|y", false)],
            Vec::new(),
        );

        let mut cache = RuntimeBindingCache::new(registry);
        cache
            .track_instance("body_0", "body", &ComponentSet::new().with("Body", body))
            .unwrap();
        cache
    }

    #[test]
    fn test_build_observation_layout() {
        let body = Arc::new(RwLock::new(Body { x: 1.5, y: 2.0, hp: 10.0 }));
        let cache = cache_with_body(body);
        let codec = FrameCodec::default();

        let observation = codec.build_observation(&cache, true).unwrap();
        assert!(observation.terminal);
        assert_eq!(observation.objects.len(), 1);
        assert_eq!(observation.objects[0].id, "body");
        assert_eq!(observation.objects[0].values, vec![Scalar::Number(1.5), Scalar::Number(10.0)]);
        assert_eq!(observation.actions[0].values, vec![Scalar::Number(2.0)]);
        assert_eq!(observation.features, vec![FeatureVector::default()]);
        assert_eq!(observation.sensors.len(), 1);
    }

    #[test]
    fn test_read_only_fields_are_never_written() {
        let body = Arc::new(RwLock::new(Body { x: 0.0, y: 0.0, hp: 10.0 }));
        let cache = cache_with_body(body.clone());
        let codec = FrameCodec::default();

        let command = Command {
            objects: vec![ObjectVector {
                id: "body".into(),
                runtime_id: "body_0".into(),
                values: vec![Scalar::Number(3.0), Scalar::Number(99.0)],
            }],
            ..Default::default()
        };
        let report = codec.apply_command(&cache, &command);

        assert!(report.is_clean());
        assert_eq!(report.fields_written, 1);
        assert_eq!(body.read().x, 3.0);
        assert_eq!(body.read().hp, 10.0);
        assert_eq!(report.loaded.len(), 2);
        assert!(report.loaded[1].read_only);
        assert_eq!(report.loaded[1].value, FieldValue::Float(99.0));
    }

    #[test]
    fn test_unknown_instance_is_skipped() {
        let body = Arc::new(RwLock::new(Body::default()));
        let cache = cache_with_body(body.clone());
        let codec = FrameCodec::default();

        let command = Command {
            actions: vec![ActionVector::from_numbers([4.0])],
            objects: vec![
                ObjectVector {
                    runtime_id: "ghost".into(),
                    values: vec![Scalar::Number(1.0)],
                    ..Default::default()
                },
                ObjectVector {
                    runtime_id: "body_0".into(),
                    values: vec![Scalar::Number(5.0), Scalar::Number(0.0)],
                    ..Default::default()
                },
            ],
            ..Default::default()
        };
        let report = codec.apply_command(&cache, &command);

        assert_eq!(report.unknown_instances, vec!["ghost".to_string()]);
        assert_eq!(report.actions_written, 1);
        assert_eq!(body.read().y, 4.0);
        assert_eq!(body.read().x, 5.0);
    }

    #[test]
    fn test_load_event_goes_into_next_observation() {
        let cache = cache_with_body(Arc::new(RwLock::new(Body::default())));
        let codec = FrameCodec::default();

        let mut command = Command::shutdown();
        command.kind = CommandType::Load;
        command.obs_id = "obs-42".into();
        let report = codec.apply_command(&cache, &command);
        assert!(!report.is_shutdown());

        let observation = codec.build_observation(&cache, false).unwrap();
        assert_eq!(observation.events.len(), 1);
        assert_eq!(observation.events[0].name, LOAD_EVENT);
        assert_eq!(observation.events[0].payload, vec![Scalar::Text("obs-42".into())]);

        let next = codec.build_observation(&cache, false).unwrap();
        assert!(next.events.is_empty());
    }

    #[test]
    fn test_type_mismatch_is_reported_not_fatal() {
        let cache = cache_with_body(Arc::new(RwLock::new(Body::default())));
        let codec = FrameCodec::default();
        let command = Command {
            objects: vec![ObjectVector {
                runtime_id: "body_0".into(),
                values: vec![Scalar::Text("oops".into()), Scalar::Number(1.0)],
                ..Default::default()
            }],
            ..Default::default()
        };
        let report = codec.apply_command(&cache, &command);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.loaded.len(), 1);
        assert_eq!(report.fields_written, 0);
    }
}
