//! Session loop against a scripted Brain

use std::collections::VecDeque;
use std::net::TcpListener;
use std::sync::Arc;

use modl_core::{DimensionKind, FieldSpec, GameConfig, Scalar, SpaceBuilder};
use modl_delivery::{LocalObservationConsumer, ObservationConsumer};
use modl_runtime::{
    AccessorTable, ActionVector, Command, CommandType, ComponentSet, Initialization, LoadStateEntry, Observation,
    ObjectVector, LOAD_EVENT,
};
use modl_session::{BridgeConfig, BridgeSession, SessionError, TickOutcome};
use modl_transport::{
    ChannelState, Communicator, SocketTransport, TransportError, TransportResult, TransportStats, ValidationMode,
    ValidationTransport,
};
use parking_lot::{Mutex, RwLock};

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
        .field(FieldSpec::new("player", "Transform", "Transform|x", DimensionKind::Continuous).named("x"))
        .field(FieldSpec::new("player", "Transform", "Transform|y", DimensionKind::Continuous).named("y"))
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
    fn new() -> Self {
        Self {
            transform: Arc::new(RwLock::new(Transform::default())),
            controller: Arc::new(RwLock::new(Controller::default())),
        }
    }

    fn components(&self) -> ComponentSet {
        ComponentSet::new()
            .with("Transform", self.transform.clone())
            .with("Controller", self.controller.clone())
    }
}

/// What the scripted Brain saw
#[derive(Default)]
struct BrainLog {
    connects: usize,
    sent: Vec<Observation>,
    closed: bool,
}

/// Answers each observation with the next scripted command, ACT when out of script
struct ScriptedBrain {
    init: Initialization,
    commands: VecDeque<Command>,
    log: Arc<Mutex<BrainLog>>,
    state: ChannelState,
}

impl ScriptedBrain {
    fn new(commands: Vec<Command>) -> (Self, Arc<Mutex<BrainLog>>) {
        let log = Arc::new(Mutex::new(BrainLog::default()));
        let brain = Self {
            init: Initialization {
                game_speed: 2.0,
                heartbeat_interval: 0.5,
            },
            commands: commands.into(),
            log: log.clone(),
            state: ChannelState::Disconnected,
        };
        (brain, log)
    }
}

impl Communicator for ScriptedBrain {
    fn connect(&mut self) -> TransportResult<()> {
        self.log.lock().connects += 1;
        self.state = ChannelState::Connected;
        Ok(())
    }

    fn receive_init(&mut self) -> TransportResult<Initialization> {
        Ok(self.init)
    }

    fn send(&mut self, observation: &Observation) -> TransportResult<()> {
        self.log.lock().sent.push(observation.clone());
        Ok(())
    }

    fn receive_command(&mut self) -> TransportResult<Command> {
        Ok(self
            .commands
            .pop_front()
            .unwrap_or_else(|| Command::act(ActionVector::from_numbers([0.0]))))
    }

    fn close(&mut self) {
        self.log.lock().closed = true;
        self.state = ChannelState::Closed;
    }

    fn state(&self) -> ChannelState {
        self.state
    }

    fn stats(&self) -> TransportStats {
        TransportStats::default()
    }
}

/// Consumer whose drain the test controls
#[derive(Clone, Default)]
struct GatedConsumer {
    received: Arc<Mutex<usize>>,
    deinitialized: Arc<Mutex<bool>>,
    done: Arc<Mutex<bool>>,
}

impl ObservationConsumer for GatedConsumer {
    fn initialize(&mut self) -> bool {
        true
    }

    fn on_observation(&mut self, _observation: &Observation) {
        *self.received.lock() += 1;
    }

    fn deinitialize(&mut self) {
        *self.deinitialized.lock() = true;
    }

    fn is_done(&self) -> bool {
        *self.done.lock()
    }

    fn name(&self) -> &'static str {
        "gated"
    }
}

fn session(commands: Vec<Command>, consumer: GatedConsumer) -> (BridgeSession, Arc<Mutex<BrainLog>>) {
    let (brain, log) = ScriptedBrain::new(commands);
    let session = BridgeSession::new(
        config(),
        BridgeConfig::default(),
        &accessors(),
        Some(Box::new(brain)),
        Box::new(consumer),
    )
    .unwrap();
    (session, log)
}

#[test]
fn test_heartbeat_follows_init_interval() {
    let (mut session, log) = session(vec![], GatedConsumer::default());
    session.start_transmitting().unwrap();
    assert!(session.is_transmitting());
    assert_eq!(session.game_speed(), 2.0);
    assert_eq!(log.lock().connects, 1);

    assert_eq!(session.tick(0.25).unwrap(), TickOutcome::Idle);
    assert_eq!(session.tick(0.25).unwrap(), TickOutcome::Idle);
    assert_eq!(session.tick(0.1).unwrap(), TickOutcome::Heartbeat(CommandType::Act));
    assert_eq!(log.lock().sent.len(), 1);
    assert_eq!(session.heartbeat_count(), 1);
}

#[test]
fn test_actions_reach_the_game() {
    let consumer = GatedConsumer::default();
    let (mut session, log) = session(
        vec![Command::act(ActionVector::from_numbers([4.5]))],
        consumer.clone(),
    );
    let player = Player::new();
    session.track_instance("player_0", "player", &player.components()).unwrap();
    session.start_transmitting().unwrap();

    session.tick(1.0).unwrap();
    assert_eq!(player.controller.read().throttle, 4.5);
    assert_eq!(*consumer.received.lock(), 1);

    // The next observation reports the applied action
    player.transform.write().x = 3.0;
    session.tick(1.0).unwrap();
    let log = log.lock();
    let latest = &log.sent[1];
    assert_eq!(latest.actions[0].values, vec![Scalar::Number(4.5)]);
    assert_eq!(latest.object("player_0").unwrap().values[0], Scalar::Number(3.0));
}

#[test]
fn test_shutdown_drains_consumer_then_finishes() {
    let consumer = GatedConsumer::default();
    let (mut session, _log) = session(vec![Command::shutdown()], consumer.clone());
    session.start_transmitting().unwrap();

    assert_eq!(session.tick(1.0).unwrap(), TickOutcome::Heartbeat(CommandType::Shutdown));
    assert!(!session.is_transmitting());
    assert!(session.is_draining());
    assert!(*consumer.deinitialized.lock());
    // The shutdown observation still reached the consumer
    assert_eq!(*consumer.received.lock(), 1);

    assert_eq!(session.tick(1.0).unwrap(), TickOutcome::Draining);
    assert_eq!(session.tick(1.0).unwrap(), TickOutcome::Draining);

    *consumer.done.lock() = true;
    assert_eq!(session.tick(1.0).unwrap(), TickOutcome::Finished);
    assert!(session.is_finished());
    assert!(matches!(session.start_transmitting(), Err(SessionError::Finished)));
}

#[test]
fn test_pause_and_resume_without_reconnecting() {
    let (mut session, log) = session(vec![], GatedConsumer::default());
    session.start_transmitting().unwrap();
    session.pause_transmitting();
    assert!(session.is_paused());
    assert!(!session.is_transmitting());

    assert_eq!(session.tick(10.0).unwrap(), TickOutcome::Idle);
    assert!(log.lock().sent.is_empty());

    session.start_transmitting().unwrap();
    assert!(session.is_transmitting());
    assert!(!session.is_paused());
    assert_eq!(log.lock().connects, 1);
    assert_eq!(session.tick(1.0).unwrap(), TickOutcome::Heartbeat(CommandType::Act));
}

#[test]
fn test_load_notifies_listeners_and_next_observation() {
    let load = Command {
        kind: CommandType::Load,
        objects: vec![ObjectVector {
            id: "player".into(),
            runtime_id: "player_0".into(),
            values: vec![Scalar::Number(1.0), Scalar::Number(2.0)],
        }],
        obs_id: "obs-42".into(),
        ..Default::default()
    };
    let (mut session, log) = session(vec![load], GatedConsumer::default());
    let player = Player::new();
    session.track_instance("player_0", "player", &player.components()).unwrap();

    let seen: Arc<Mutex<Vec<LoadStateEntry>>> = Arc::default();
    let sink = seen.clone();
    session.add_load_state_listener(move |entries: &[LoadStateEntry]| sink.lock().extend_from_slice(entries));
    session.start_transmitting().unwrap();

    assert_eq!(session.tick(1.0).unwrap(), TickOutcome::Heartbeat(CommandType::Load));
    assert_eq!(player.transform.read().x, 1.0);
    assert_eq!(player.transform.read().y, 2.0);
    {
        let seen = seen.lock();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].runtime_id.as_str(), "player_0");
    }

    session.tick(1.0).unwrap();
    let log = log.lock();
    let event = log.sent[1].events.iter().find(|e| e.name == LOAD_EVENT).unwrap();
    assert_eq!(event.payload, vec![Scalar::Text("obs-42".into())]);
    assert!(log.sent[0].events.iter().all(|e| e.name != LOAD_EVENT));
}

#[test]
fn test_removed_listener_is_not_called() {
    let load = Command {
        kind: CommandType::Load,
        objects: vec![ObjectVector {
            id: "player".into(),
            runtime_id: "player_0".into(),
            values: vec![Scalar::Number(1.0), Scalar::Number(2.0)],
        }],
        ..Default::default()
    };
    let (mut session, _log) = session(vec![load], GatedConsumer::default());
    let player = Player::new();
    session.track_instance("player_0", "player", &player.components()).unwrap();

    let calls = Arc::new(Mutex::new(0));
    let counter = calls.clone();
    let id = session.add_load_state_listener(move |_: &[LoadStateEntry]| *counter.lock() += 1);
    assert!(session.remove_load_state_listener(id));
    assert!(!session.remove_load_state_listener(id));

    session.start_transmitting().unwrap();
    session.tick(1.0).unwrap();
    assert_eq!(*calls.lock(), 0);
}

#[test]
fn test_terminal_update_marks_observation() {
    let (mut session, log) = session(vec![], GatedConsumer::default());
    assert_eq!(session.terminal_state_update().unwrap(), None);

    session.start_transmitting().unwrap();
    assert_eq!(session.terminal_state_update().unwrap(), Some(CommandType::Act));
    assert!(log.lock().sent[0].terminal);
}

#[test]
fn test_reported_events_ride_along() {
    let (mut session, log) = session(vec![], GatedConsumer::default());
    session.start_transmitting().unwrap();
    assert!(session.report_event("Goal", vec![Scalar::Number(1.0)]));

    session.tick(1.0).unwrap();
    let log = log.lock();
    assert!(log.sent[0].events.iter().any(|e| e.name == "Goal"));
}

#[test]
fn test_no_transport_stays_idle() {
    let mut session = BridgeSession::new(
        config(),
        BridgeConfig::default(),
        &accessors(),
        None,
        Box::new(LocalObservationConsumer::new()),
    )
    .unwrap();

    session.start_transmitting().unwrap();
    assert!(!session.is_transmitting());
    for _ in 0..5 {
        assert_eq!(session.tick(1.0).unwrap(), TickOutcome::Idle);
    }
}

#[test]
fn test_validation_with_empty_config_shuts_down() {
    let transport = ValidationTransport::with_seed(&GameConfig::empty(), ValidationMode::Everything, 3);
    let mut session = BridgeSession::new(
        GameConfig::empty(),
        BridgeConfig::default(),
        &AccessorTable::new(),
        Some(Box::new(transport)),
        Box::new(LocalObservationConsumer::new()),
    )
    .unwrap();
    session.start_transmitting().unwrap();

    let mut kinds = Vec::new();
    for _ in 0..6 {
        match session.tick(1.5).unwrap() {
            TickOutcome::Heartbeat(kind) => kinds.push(kind),
            other => panic!("expected a heartbeat, got {:?}", other),
        }
    }
    // Heartbeat 0 replays the frame just archived, then random actions
    assert_eq!(kinds[0], CommandType::Load);
    assert!(kinds[1..5].iter().all(|kind| *kind == CommandType::Act));
    assert_eq!(kinds[5], CommandType::Shutdown);

    // The local consumer has nothing in flight
    assert_eq!(session.tick(1.5).unwrap(), TickOutcome::Finished);
}

#[test]
fn test_connect_failure_is_an_error() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let mut session = BridgeSession::new(
        config(),
        BridgeConfig::default(),
        &accessors(),
        Some(Box::new(SocketTransport::new(addr))),
        Box::new(LocalObservationConsumer::new()),
    )
    .unwrap();

    let result = session.start_transmitting();
    assert!(matches!(
        result,
        Err(SessionError::Transport(TransportError::ConnectionFailed(_)))
    ));
    assert!(!session.is_transmitting());
}

#[test]
fn test_drop_closes_transport() {
    let (session, log) = session(vec![], GatedConsumer::default());
    drop(session);
    assert!(log.lock().closed);
}
