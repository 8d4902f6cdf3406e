//! Bridge session
//!
//! Owns everything one game process needs to talk to the Brain: the binding
//! cache, the frame codec, the transport and the observation consumer. The
//! host calls [`BridgeSession::tick`] once per frame with the unscaled frame
//! time; every heartbeat runs one exchange:
//!
//! ```text
//! build observation ─► send ─► receive command ─► apply ─► consumer
//!                                                   │
//!                                         SHUTDOWN ─┴─► pause, drain consumer
//! ```

use std::fmt;

use modl_core::{GameConfig, Scalar, LOG_PREFIX};
use modl_delivery::{consumer_from_env, DrainStatus, DrainWaiter, ObservationConsumer};
use modl_runtime::{
    AccessorTable, CommandType, ComponentResolver, EventQueue, FieldRegistry, FrameCodec, LoadStateEntry,
    Observation, RuntimeBindingCache, RuntimeId, RuntimeObjectEntry,
};
use modl_transport::{Communicator, SocketTransport, ValidationTransport};

use crate::config::{BridgeConfig, CommType};
use crate::error::{SessionError, SessionResult};
use crate::heartbeat::{FpsMonitor, Heartbeat};

/// Callback receiving the object values carried by a command
pub type LoadStateListener = Box<dyn FnMut(&[LoadStateEntry]) + Send>;

/// Handle returned when adding a load-state listener
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// What a tick did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Nothing to do this frame
    Idle,
    /// One observation/command exchange ran
    Heartbeat(CommandType),
    /// Shutting down, waiting for the consumer
    Draining,
    /// Shut down; the host should exit
    Finished,
}

/// Build the transport selected by `comm_type`
pub fn transport_for(bridge: &BridgeConfig, config: &GameConfig) -> SessionResult<Option<Box<dyn Communicator>>> {
    let transport: Option<Box<dyn Communicator>> = match bridge.comm_type {
        CommType::None => None,
        CommType::Brain => Some(Box::new(SocketTransport::from_env()?)),
        CommType::ConfigValidation => Some(Box::new(ValidationTransport::new(config, bridge.validation_mode))),
    };
    Ok(transport)
}

/// One game process connected to the Brain
pub struct BridgeSession {
    config: GameConfig,
    bridge: BridgeConfig,
    cache: RuntimeBindingCache,
    codec: FrameCodec,
    transport: Option<Box<dyn Communicator>>,
    consumer: Box<dyn ObservationConsumer>,
    heartbeat: Heartbeat,
    fps: FpsMonitor,
    transmitting: bool,
    paused: bool,
    drain: Option<DrainWaiter>,
    finished: bool,
    frame: u64,
    heartbeats: u64,
    game_speed: f32,
    listeners: Vec<(ListenerId, LoadStateListener)>,
    next_listener: u64,
}

impl BridgeSession {
    /// Create a session and initialize its consumer
    pub fn new(
        config: GameConfig,
        bridge: BridgeConfig,
        accessors: &AccessorTable,
        transport: Option<Box<dyn Communicator>>,
        mut consumer: Box<dyn ObservationConsumer>,
    ) -> SessionResult<Self> {
        let registry = FieldRegistry::from_config(&config, accessors)?;
        log::info!(
            "{} Session ready: {} prefab schema(s), {} action(s), {} feature(s)",
            LOG_PREFIX,
            registry.len(),
            config.action_space.size(),
            config.feature_space.size()
        );

        if !consumer.initialize() {
            log::warn!("{} Could not initialize the {} observation consumer", LOG_PREFIX, consumer.name());
        }

        let fps = FpsMonitor::new(config.min_fps, bridge.send_low_fps_events, bridge.send_avg_fps_events);
        Ok(Self {
            cache: RuntimeBindingCache::new(registry),
            codec: FrameCodec::new(EventQueue::new()),
            transport,
            consumer,
            heartbeat: Heartbeat::default(),
            fps,
            transmitting: false,
            paused: false,
            drain: None,
            finished: false,
            frame: 0,
            heartbeats: 0,
            game_speed: 1.0,
            listeners: Vec::new(),
            next_listener: 0,
            config,
            bridge,
        })
    }

    /// Session configured from the environment: `game_config.json`, the
    /// communicator selected by `MODL_COMM_TYPE` and the consumer selected by
    /// the queue variables
    pub fn from_env(accessors: &AccessorTable) -> SessionResult<Self> {
        let bridge = BridgeConfig::from_env();
        bridge.log_summary();

        let config = GameConfig::load(&bridge.config_path, bridge.allow_missing_config)?;
        let transport = transport_for(&bridge, &config)?;
        Self::new(config, bridge, accessors, transport, consumer_from_env())
    }

    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    pub fn bridge_config(&self) -> &BridgeConfig {
        &self.bridge
    }

    pub fn cache(&self) -> &RuntimeBindingCache {
        &self.cache
    }

    pub fn events(&self) -> &EventQueue {
        self.codec.events()
    }

    pub fn consumer(&self) -> &dyn ObservationConsumer {
        self.consumer.as_ref()
    }

    /// Start tracking a game object
    pub fn track_instance<R>(
        &mut self,
        runtime_id: impl Into<RuntimeId>,
        prefab_schema_id: &str,
        resolver: &R,
    ) -> SessionResult<()>
    where
        R: ComponentResolver + ?Sized,
    {
        self.cache.track_instance(runtime_id, prefab_schema_id, resolver)?;
        Ok(())
    }

    /// Stop tracking a game object. Must be called before the object goes away.
    pub fn untrack_instance(&mut self, runtime_id: &str) -> SessionResult<RuntimeObjectEntry> {
        Ok(self.cache.untrack_instance(runtime_id)?)
    }

    /// Report a game event; it rides along with the next observation
    pub fn report_event(&self, name: &str, payload: Vec<Scalar>) -> bool {
        self.codec.events().report(name, payload)
    }

    /// Register a callback for the object values carried by commands
    pub fn add_load_state_listener<F>(&mut self, listener: F) -> ListenerId
    where
        F: FnMut(&[LoadStateEntry]) + Send + 'static,
    {
        let id = ListenerId(self.next_listener);
        self.next_listener += 1;
        self.listeners.push((id, Box::new(listener)));
        id
    }

    pub fn remove_load_state_listener(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(listener_id, _)| *listener_id != id);
        self.listeners.len() != before
    }

    /// Connect to the Brain, or resume after a pause.
    ///
    /// Without a transport this does nothing.
    pub fn start_transmitting(&mut self) -> SessionResult<()> {
        if self.finished || self.drain.is_some() {
            return Err(SessionError::Finished);
        }
        let Some(transport) = self.transport.as_mut() else {
            return Ok(());
        };

        if self.paused {
            self.paused = false;
            self.transmitting = true;
            log::info!("{} Resumed transmitting", LOG_PREFIX);
            return Ok(());
        }
        if self.transmitting {
            return Ok(());
        }

        if let Err(e) = transport.connect() {
            log::error!("{} Could not connect to the Modl backend: {}", LOG_PREFIX, e);
            return Err(e.into());
        }
        let init = transport.receive_init()?;
        self.game_speed = init.game_speed;
        self.heartbeat = Heartbeat::new(f64::from(init.heartbeat_interval));
        self.transmitting = true;

        log::info!(
            "{} Transmitting: game speed {}, heartbeat every {} s",
            LOG_PREFIX,
            init.game_speed,
            init.heartbeat_interval
        );
        Ok(())
    }

    /// Stop exchanging observations until [`Self::start_transmitting`] is called again
    pub fn pause_transmitting(&mut self) {
        if self.transmitting {
            self.transmitting = false;
            self.paused = true;
            log::info!("{} Paused transmitting", LOG_PREFIX);
        }
    }

    pub fn is_transmitting(&self) -> bool {
        self.transmitting
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// True once shutdown finished and the host should exit
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// True between a shutdown command and the consumer finishing
    pub fn is_draining(&self) -> bool {
        self.drain.is_some()
    }

    /// Time scale requested by the Brain at connect time
    pub fn game_speed(&self) -> f32 {
        self.game_speed
    }

    pub fn frame(&self) -> u64 {
        self.frame
    }

    pub fn heartbeat_count(&self) -> u64 {
        self.heartbeats
    }

    /// Advance one frame of `dt` unscaled seconds
    pub fn tick(&mut self, dt: f64) -> SessionResult<TickOutcome> {
        if self.finished {
            return Ok(TickOutcome::Finished);
        }
        self.frame += 1;
        self.codec.events().set_frame(self.frame);

        if let Some(status) = self.drain.as_ref().map(|drain| drain.poll(self.consumer.as_ref())) {
            return Ok(match status {
                DrainStatus::Pending => TickOutcome::Draining,
                DrainStatus::Done | DrainStatus::TimedOut => {
                    log::info!("{} Shutting down the game", LOG_PREFIX);
                    self.drain = None;
                    self.finished = true;
                    TickOutcome::Finished
                }
            });
        }

        if !self.transmitting {
            return Ok(TickOutcome::Idle);
        }

        let is_heartbeat = self.heartbeat.tick(dt);
        for event in self.fps.sample(dt, is_heartbeat) {
            self.codec.events().report(event.name, vec![Scalar::Number(event.fps)]);
        }

        if !is_heartbeat {
            return Ok(TickOutcome::Idle);
        }
        let kind = self.runtime_update(false)?;
        Ok(TickOutcome::Heartbeat(kind))
    }

    /// Send a terminal observation right away; the Brain usually answers with a load
    pub fn terminal_state_update(&mut self) -> SessionResult<Option<CommandType>> {
        if !self.transmitting {
            return Ok(None);
        }
        self.runtime_update(true).map(Some)
    }

    fn runtime_update(&mut self, terminal: bool) -> SessionResult<CommandType> {
        let transport = self.transport.as_mut().ok_or(modl_transport::TransportError::NotConnected)?;
        self.heartbeats += 1;

        let observation = self.codec.build_observation(&self.cache, terminal)?;
        if let Err(e) = transport.send(&observation) {
            log::error!("{} Error sending observation to the Brain: {}", LOG_PREFIX, e);
        }

        let command = transport.receive_command()?;
        let report = self.codec.apply_command(&self.cache, &command);
        if !report.is_clean() {
            log::debug!(
                "{} {:?} applied with {} unknown instance(s), {} field error(s)",
                LOG_PREFIX,
                report.kind,
                report.unknown_instances.len(),
                report.errors.len()
            );
        }

        if !report.loaded.is_empty() {
            for (_, listener) in self.listeners.iter_mut() {
                listener(&report.loaded);
            }
        }

        self.consumer.on_observation(&observation);

        if command.kind == CommandType::Shutdown {
            log::info!("{} Received SHUTDOWN from the Brain, initiating shut down", LOG_PREFIX);
            self.begin_shutdown();
        }
        Ok(command.kind)
    }

    fn begin_shutdown(&mut self) {
        log::info!(
            "{} Pausing transmissions and shutting down {} consumer",
            LOG_PREFIX,
            self.consumer.name()
        );
        self.pause_transmitting();
        self.consumer.deinitialize();
        self.drain = Some(match self.bridge.drain_timeout {
            Some(timeout) => DrainWaiter::with_timeout(timeout),
            None => DrainWaiter::new(),
        });
    }

    /// Snapshot the tracked state without sending it
    pub fn snapshot(&self) -> SessionResult<Observation> {
        Ok(self.codec.build_observation(&self.cache, false)?)
    }
}

impl Drop for BridgeSession {
    fn drop(&mut self) {
        if let Some(transport) = self.transport.as_mut() {
            transport.close();
        }
    }
}

impl fmt::Debug for BridgeSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BridgeSession")
            .field("comm_type", &self.bridge.comm_type)
            .field("tracked", &self.cache.len())
            .field("transmitting", &self.transmitting)
            .field("paused", &self.paused)
            .field("draining", &self.drain.is_some())
            .field("finished", &self.finished)
            .field("frame", &self.frame)
            .field("heartbeats", &self.heartbeats)
            .finish()
    }
}
