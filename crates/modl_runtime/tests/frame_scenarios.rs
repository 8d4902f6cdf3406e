//! End-to-end frame tests: config → registry → cache → observation → command

use modl_core::{CodecError, DimensionKind, FieldSpec, GameConfig, Scalar, SpaceBuilder};
use modl_runtime::{
    AccessorTable, ActionVector, Command, ComponentSet, FieldRegistry, FrameCodec, ObjectVector, RegistryError,
    RuntimeBindingCache, RuntimeId,
};
use parking_lot::RwLock;
use std::sync::Arc;

#[derive(Debug, Default)]
struct Transform {
    x: f32,
    y: f32,
}

#[derive(Debug, Default)]
struct Controller {
    throttle: f32,
}

fn accessors() -> AccessorTable {
    let mut table = AccessorTable::new();
    table
        .register_float::<Transform, _, _>("Transform", "Transform|x", |t| t.x, |t, v| t.x = v)
        .register_float::<Transform, _, _>("Transform", "Transform|y", |t| t.y, |t, v| t.y = v)
        .register_float::<Controller, _, _>("Controller", "Controller|throttle", |c| c.throttle, |c, v| {
            c.throttle = v
        });
    table
}

fn config() -> GameConfig {
    let object_space = SpaceBuilder::new("objectSpace")
        .prefab_name("player", "Player")
        .field(
            FieldSpec::new("player", "Transform", "Transform|x", DimensionKind::Continuous)
                .named("x")
                .bounds(-10.0, 10.0),
        )
        .field(
            FieldSpec::new("player", "Transform", "Transform|y", DimensionKind::Continuous)
                .named("y")
                .bounds(-10.0, 10.0),
        )
        .build()
        .unwrap();
    let action_space = SpaceBuilder::new("actionSpace")
        .field(
            FieldSpec::new("player", "Controller", "Controller|throttle", DimensionKind::Continuous)
                .named("throttle")
                .bounds(0.0, 10.0),
        )
        .build()
        .unwrap();

    GameConfig {
        object_space,
        action_space,
        ..GameConfig::empty()
    }
}

struct Player {
    transform: Arc<RwLock<Transform>>,
    controller: Arc<RwLock<Controller>>,
}

impl Player {
    fn new(x: f32, y: f32) -> Self {
        Self {
            transform: Arc::new(RwLock::new(Transform { x, y })),
            controller: Arc::new(RwLock::new(Controller::default())),
        }
    }

    fn components(&self) -> ComponentSet {
        ComponentSet::new()
            .with("Transform", self.transform.clone())
            .with("Controller", self.controller.clone())
    }
}

fn cache() -> RuntimeBindingCache {
    RuntimeBindingCache::new(FieldRegistry::from_config(&config(), &accessors()).unwrap())
}

#[test]
fn test_scenario_a_object_round_trip() {
    let config = config();
    let mut cache = cache();
    let codec = FrameCodec::default();

    let source = Player::new(3.5, -2.0);
    cache.track_instance("player_0", "player", &source.components()).unwrap();

    let observation = codec.build_observation(&cache, false).unwrap();
    let object = observation.object("player_0").unwrap();
    assert_eq!(object.id, "player");
    assert_eq!(object.values, vec![Scalar::Number(3.5), Scalar::Number(-2.0)]);
    assert_eq!(object.values.len(), config.object_space.size());

    // Apply the same buffer to another instance
    let target = Player::new(0.0, 0.0);
    cache.track_instance("player_1", "player", &target.components()).unwrap();
    let command = Command {
        objects: vec![ObjectVector {
            id: "player".into(),
            runtime_id: "player_1".into(),
            values: object.values.clone(),
        }],
        ..Default::default()
    };
    let report = codec.apply_command(&cache, &command);
    assert!(report.is_clean());
    assert_eq!(target.transform.read().x, 3.5);
    assert_eq!(target.transform.read().y, -2.0);
}

#[test]
fn test_scenario_b_action_applied_then_observed() {
    let mut cache = cache();
    let codec = FrameCodec::default();
    let player = Player::new(0.0, 0.0);
    cache.track_instance("player_0", "player", &player.components()).unwrap();

    let before = codec.build_observation(&cache, false).unwrap();
    assert_eq!(before.actions[0].values, vec![Scalar::Number(0.0)]);

    let report = codec.apply_command(&cache, &Command::act(ActionVector::from_numbers([7.2])));
    assert_eq!(report.actions_written, 1);

    let after = codec.build_observation(&cache, false).unwrap();
    assert_eq!(after.actions[0].values, vec![Scalar::Number(7.2f32 as f64)]);
    assert_eq!(player.controller.read().throttle, 7.2);
}

#[test]
fn test_scenario_e_duplicate_track_replaces() {
    let mut cache = cache();
    let codec = FrameCodec::default();

    let first = Player::new(1.0, 1.0);
    let second = Player::new(2.0, 2.0);
    let other = Player::new(5.0, 5.0);

    cache.track_instance("player_0", "player", &first.components()).unwrap();
    cache.track_instance("other", "player", &other.components()).unwrap();
    cache.track_instance("player_0", "player", &second.components()).unwrap();

    assert_eq!(cache.len(), 2);
    let order: Vec<&str> = cache.entries().map(|e| e.runtime_id.as_str()).collect();
    assert_eq!(order, vec!["player_0", "other"]);

    let observation = codec.build_observation(&cache, false).unwrap();
    assert_eq!(
        observation.object("player_0").unwrap().values,
        vec![Scalar::Number(2.0), Scalar::Number(2.0)]
    );

    codec.apply_command(
        &cache,
        &Command {
            objects: vec![ObjectVector {
                runtime_id: "player_0".into(),
                values: vec![Scalar::Number(9.0), Scalar::Number(9.0)],
                ..Default::default()
            }],
            ..Default::default()
        },
    );
    assert_eq!(second.transform.read().x, 9.0);
    assert_eq!(first.transform.read().x, 1.0);
}

#[test]
fn test_track_then_untrack_leaves_nothing() {
    let mut cache = cache();
    let codec = FrameCodec::default();
    let player = Player::new(1.0, 2.0);
    let id = RuntimeId::from_scene_path("Player", "Arena", &[0, 3]);

    cache.track_instance(id.clone(), "player", &player.components()).unwrap();
    cache.untrack_instance(id.as_str()).unwrap();

    assert!(!cache.contains(id.as_str()));
    let observation = codec.build_observation(&cache, false).unwrap();
    assert!(observation.objects.is_empty());
    assert!(observation.actions[0].values.is_empty());

    // Commands still naming the id are skipped
    let report = codec.apply_command(
        &cache,
        &Command {
            objects: vec![ObjectVector {
                runtime_id: id.to_string(),
                values: vec![Scalar::Number(1.0), Scalar::Number(1.0)],
                ..Default::default()
            }],
            ..Default::default()
        },
    );
    assert_eq!(report.unknown_instances, vec![id.to_string()]);
}

#[test]
fn test_encoding_is_reproducible() {
    let mut cache = cache();
    let codec = FrameCodec::default();
    let players: Vec<Player> = (0..4).map(|i| Player::new(i as f32, -(i as f32))).collect();
    for (i, player) in players.iter().enumerate() {
        cache
            .track_instance(format!("player_{}", i), "player", &player.components())
            .unwrap();
    }

    let first = codec.build_observation(&cache, false).unwrap();
    let second = codec.build_observation(&cache, false).unwrap();
    assert_ne!(first.id, second.id);

    let strip = |o: &modl_runtime::Observation| {
        let mut value = serde_json::to_value(o).unwrap();
        value["id"] = serde_json::Value::Null;
        serde_json::to_string(&value).unwrap()
    };
    assert_eq!(strip(&first), strip(&second));

    let ids: Vec<&str> = first.objects.iter().map(|o| o.runtime_id.as_str()).collect();
    assert_eq!(ids, vec!["player_0", "player_1", "player_2", "player_3"]);
}

#[test]
fn test_actions_span_instances_in_registration_order() {
    let mut cache = cache();
    let codec = FrameCodec::default();
    let a = Player::new(0.0, 0.0);
    let b = Player::new(0.0, 0.0);
    cache.track_instance("a", "player", &a.components()).unwrap();
    cache.track_instance("b", "player", &b.components()).unwrap();

    codec.apply_command(&cache, &Command::act(ActionVector::from_numbers([1.0, 2.0])));
    assert_eq!(a.controller.read().throttle, 1.0);
    assert_eq!(b.controller.read().throttle, 2.0);
}

#[test]
fn test_text_action_value_is_reported_and_skipped() {
    let mut cache = cache();
    let codec = FrameCodec::default();
    let a = Player::new(0.0, 0.0);
    let b = Player::new(0.0, 0.0);
    a.controller.write().throttle = 4.0;
    cache.track_instance("a", "player", &a.components()).unwrap();
    cache.track_instance("b", "player", &b.components()).unwrap();

    let actions = ActionVector {
        values: vec![Scalar::Text("fast".into()), Scalar::Number(6.0)],
    };
    let report = codec.apply_command(&cache, &Command::act(actions));

    assert_eq!(report.errors.len(), 1);
    assert!(matches!(
        &report.errors[0],
        RegistryError::Codec { field, source: CodecError::TypeMismatch { .. } } if field == "Controller|throttle"
    ));
    assert_eq!(report.actions_written, 1);
    assert_eq!(a.controller.read().throttle, 4.0);
    assert_eq!(b.controller.read().throttle, 6.0);
}
