//! Mock simulation host
//!
//! Deterministic in-process stand-in for the simulator. Each clock advance
//! bumps the frame id and delivers, through the registered callbacks, one
//! world snapshot plus one frame for every sensor whose capture period
//! divides the step index (the simulator's `sensor_tick` behavior).
//! Supports failure injection for tests.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use contracts::{
    ActorId, ContractError, RawSensorFrame, SensorDataCallback, SensorDescriptor, SensorKind,
    SensorPayload, SensorSource, SimulationClock, StepTiming, Tick, WeatherPreset, WorldSnapshot,
    WORLD_KEY,
};
use tracing::{debug, info, instrument, trace, warn};

use crate::error::{HostError, Result};
use crate::host::{SettingsToken, SimulationHost, SpawnedSensor, WorldSettings};
use crate::mock_sensor::{synthetic_payload, MockSensorSource, Tap};

/// How produced frames reach the callbacks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Delivery {
    /// Called synchronously inside `advance_clock`
    #[default]
    Inline,
    /// Called from a delivery thread, `delay` after the step
    Deferred { delay: Duration },
}

/// Mock host configuration
#[derive(Debug, Clone)]
pub struct MockHostConfig {
    /// Frame id of the first tick
    pub first_frame: u64,
    /// Image size used when a sensor has no `image_size_x/y` options
    pub default_width: u32,
    pub default_height: u32,
    /// DVS events per produced frame
    pub events_per_frame: usize,
    pub delivery: Delivery,
    /// Step index at which `advance_clock` fails
    pub fail_advance_at: Option<u64>,
    /// Sensors that spawn but never produce frames
    pub silent_sensors: Vec<String>,
    /// Sensors whose spawn fails
    pub fail_sensors: Vec<String>,
    /// Vehicle roles materialized by `replay_file`
    pub replay_roles: Vec<String>,
}

impl Default for MockHostConfig {
    fn default() -> Self {
        Self {
            first_frame: 1,
            default_width: 8,
            default_height: 6,
            events_per_frame: 4,
            delivery: Delivery::Inline,
            fail_advance_at: None,
            silent_sensors: Vec::new(),
            fail_sensors: Vec::new(),
            replay_roles: vec!["hero".to_string()],
        }
    }
}

/// Lifecycle events observed by the mock host
#[derive(Debug, Clone, PartialEq)]
pub enum HostEvent {
    Connected,
    WorldLoaded(String),
    WeatherSet(WeatherPreset),
    SettingsApplied { delta_seconds: f64 },
    SettingsRestored,
    VehicleSpawned { actor: ActorId, role: String },
    SensorSpawned { actor: ActorId, name: String },
    ActorDestroyed(ActorId),
    RecorderStarted(PathBuf),
    RecorderStopped,
    ReplayStarted(PathBuf),
    Listening(String),
    StoppedListening(String),
}

/// Shared, append-only event log
#[derive(Debug, Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<HostEvent>>>);

impl Journal {
    pub fn record(&self, event: HostEvent) {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }

    pub fn events(&self) -> Vec<HostEvent> {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Index of the first event matching `pred`
    pub fn position(&self, pred: impl Fn(&HostEvent) -> bool) -> Option<usize> {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .position(pred)
    }

    pub fn count(&self, pred: impl Fn(&HostEvent) -> bool) -> usize {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|e| pred(e))
            .count()
    }
}

#[derive(Debug)]
enum MockActor {
    Vehicle { role: String },
    Sensor { name: String },
}

struct SensorEntry {
    tap: Arc<Tap>,
    kind: SensorKind,
    period: u32,
    width: u32,
    height: u32,
    silent: bool,
}

struct HostState {
    connected: bool,
    step: u64,
    settings: WorldSettings,
    recording: Option<PathBuf>,
    actors: BTreeMap<ActorId, MockActor>,
    sensors: BTreeMap<ActorId, SensorEntry>,
    next_actor_id: ActorId,
}

struct DeliveryJob {
    due: Instant,
    callback: SensorDataCallback,
    frame: RawSensorFrame,
}

struct Inner {
    config: MockHostConfig,
    state: Mutex<HostState>,
    world_tap: Arc<Tap>,
    journal: Journal,
    worker: Option<mpsc::Sender<DeliveryJob>>,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, HostState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn deliver(&self, callback: SensorDataCallback, frame: RawSensorFrame) {
        match (&self.worker, self.config.delivery) {
            (Some(worker), Delivery::Deferred { delay }) => {
                let job = DeliveryJob {
                    due: Instant::now() + delay,
                    callback,
                    frame,
                };
                if let Err(mpsc::SendError(job)) = worker.send(job) {
                    (job.callback)(job.frame);
                }
            }
            _ => callback(frame),
        }
    }
}

/// Deterministic mock host
#[derive(Clone)]
pub struct MockSimHost {
    inner: Arc<Inner>,
}

impl MockSimHost {
    pub fn new(config: MockHostConfig) -> Self {
        let worker = match config.delivery {
            Delivery::Deferred { .. } => spawn_delivery_worker(),
            Delivery::Inline => None,
        };
        Self {
            inner: Arc::new(Inner {
                config,
                state: Mutex::new(HostState {
                    connected: false,
                    step: 0,
                    settings: WorldSettings::default(),
                    recording: None,
                    actors: BTreeMap::new(),
                    sensors: BTreeMap::new(),
                    next_actor_id: 1000,
                }),
                world_tap: Tap::new(WORLD_KEY),
                journal: Journal::default(),
                worker,
            }),
        }
    }

    /// Already connected host in synchronous mode with `delta_seconds`
    pub fn connected(config: MockHostConfig, delta_seconds: f64) -> Self {
        let host = Self::new(config);
        {
            let mut state = host.inner.lock();
            state.connected = true;
            state.settings = WorldSettings::synchronous(delta_seconds);
        }
        host
    }

    pub fn journal(&self) -> &Journal {
        &self.inner.journal
    }

    /// Number of clock advances so far
    pub fn step_count(&self) -> u64 {
        self.inner.lock().step
    }

    pub fn settings(&self) -> WorldSettings {
        self.inner.lock().settings
    }

    pub fn actor_count(&self) -> usize {
        self.inner.lock().actors.len()
    }

    pub fn is_recording(&self) -> bool {
        self.inner.lock().recording.is_some()
    }

    /// Host-side capture period of a spawned sensor
    pub fn sensor_period(&self, name: &str) -> Option<u32> {
        self.inner
            .lock()
            .sensors
            .values()
            .find(|entry| entry.tap.name() == name)
            .map(|entry| entry.period)
    }

    fn ensure_connected(state: &HostState) -> Result<()> {
        if state.connected {
            Ok(())
        } else {
            Err(HostError::NotConnected)
        }
    }

    fn allocate_actor(state: &mut HostState, actor: MockActor) -> ActorId {
        let id = state.next_actor_id;
        state.next_actor_id += 1;
        state.actors.insert(id, actor);
        id
    }
}

impl Default for MockSimHost {
    fn default() -> Self {
        Self::new(MockHostConfig::default())
    }
}

fn spawn_delivery_worker() -> Option<mpsc::Sender<DeliveryJob>> {
    let (tx, rx) = mpsc::channel::<DeliveryJob>();
    let spawned = thread::Builder::new()
        .name("mock-host-delivery".into())
        .spawn(move || {
            for job in rx {
                let now = Instant::now();
                if job.due > now {
                    thread::sleep(job.due - now);
                }
                (job.callback)(job.frame);
            }
        });
    match spawned {
        Ok(_) => Some(tx),
        Err(e) => {
            warn!(error = %e, "failed to start mock delivery thread, delivering inline");
            None
        }
    }
}

fn image_size(descriptor: &SensorDescriptor, key: &str, default: u32) -> u32 {
    descriptor
        .options
        .get(key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl SimulationClock for MockSimHost {
    async fn advance_clock(&self) -> std::result::Result<Tick, ContractError> {
        let (tick, deliveries) = {
            let mut state = self.inner.lock();
            if !state.connected {
                return Err(ContractError::host_advance("not connected"));
            }
            let step = state.step;
            if self.inner.config.fail_advance_at == Some(step) {
                return Err(ContractError::host_advance(format!(
                    "injected failure at step {step}"
                )));
            }
            state.step += 1;

            let tick = Tick::new(self.inner.config.first_frame + step);
            let delta = state.settings.fixed_delta_seconds.unwrap_or(0.0);
            let elapsed = step as f64 * delta;
            let mut deliveries = Vec::new();

            if let Some(callback) = self.inner.world_tap.active_callback() {
                let frame = RawSensorFrame {
                    sensor: WORLD_KEY.into(),
                    tick,
                    timestamp: elapsed,
                    payload: SensorPayload::World(WorldSnapshot {
                        elapsed_seconds: elapsed,
                        delta_seconds: delta,
                    }),
                };
                deliveries.push((callback, frame));
            }

            for entry in state.sensors.values() {
                if entry.silent || step % u64::from(entry.period) != 0 {
                    continue;
                }
                let Some(callback) = entry.tap.active_callback() else {
                    continue;
                };
                let frame = RawSensorFrame {
                    sensor: entry.tap.name().into(),
                    tick,
                    timestamp: elapsed,
                    payload: synthetic_payload(
                        entry.kind,
                        entry.width,
                        entry.height,
                        self.inner.config.events_per_frame,
                        step,
                    ),
                };
                deliveries.push((callback, frame));
            }
            (tick, deliveries)
        };

        trace!(%tick, frames = deliveries.len(), "mock clock advanced");
        for (callback, frame) in deliveries {
            self.inner.deliver(callback, frame);
        }
        Ok(tick)
    }
}

impl SimulationHost for MockSimHost {
    #[instrument(name = "mock_host_connect", skip_all)]
    async fn connect(&self, host: &str, port: u16, _timeout: Duration) -> Result<()> {
        self.inner.lock().connected = true;
        self.inner.journal.record(HostEvent::Connected);
        info!(host, port, "mock host connected");
        Ok(())
    }

    async fn load_world(&self, map: &str) -> Result<()> {
        Self::ensure_connected(&self.inner.lock())?;
        self.inner
            .journal
            .record(HostEvent::WorldLoaded(map.to_string()));
        Ok(())
    }

    async fn set_weather(&self, preset: WeatherPreset) -> Result<()> {
        Self::ensure_connected(&self.inner.lock())?;
        self.inner.journal.record(HostEvent::WeatherSet(preset));
        Ok(())
    }

    async fn apply_sync_settings(&self, delta_seconds: f64) -> Result<SettingsToken> {
        let token = {
            let mut state = self.inner.lock();
            Self::ensure_connected(&state)?;
            let applied = WorldSettings::synchronous(delta_seconds);
            let previous = std::mem::replace(&mut state.settings, applied);
            SettingsToken::new(previous, applied)
        };
        self.inner
            .journal
            .record(HostEvent::SettingsApplied { delta_seconds });
        Ok(token)
    }

    async fn restore_settings(&self, token: SettingsToken) -> Result<()> {
        self.inner.lock().settings = token.into_previous();
        self.inner.journal.record(HostEvent::SettingsRestored);
        Ok(())
    }

    fn world_source(&self) -> Box<dyn SensorSource> {
        Box::new(MockSensorSource::new(
            self.inner.world_tap.clone(),
            self.inner.journal.clone(),
        ))
    }

    async fn spawn_vehicle(&self, blueprint: &str, role_name: &str, autopilot: bool) -> Result<ActorId> {
        let actor = {
            let mut state = self.inner.lock();
            Self::ensure_connected(&state)?;
            Self::allocate_actor(
                &mut state,
                MockActor::Vehicle {
                    role: role_name.to_string(),
                },
            )
        };
        debug!(actor, blueprint, role_name, autopilot, "mock vehicle spawned");
        self.inner.journal.record(HostEvent::VehicleSpawned {
            actor,
            role: role_name.to_string(),
        });
        Ok(actor)
    }

    async fn find_vehicle_by_role(&self, role_name: &str) -> Result<ActorId> {
        let state = self.inner.lock();
        Self::ensure_connected(&state)?;
        let mut first_vehicle = None;
        for (id, actor) in &state.actors {
            if let MockActor::Vehicle { role } = actor {
                if role == role_name {
                    return Ok(*id);
                }
                first_vehicle.get_or_insert(*id);
            }
        }
        first_vehicle.ok_or_else(|| HostError::ActorNotFound {
            what: format!("vehicle with role '{role_name}'"),
        })
    }

    async fn spawn_sensor(&self, descriptor: &SensorDescriptor, parent: ActorId) -> Result<SpawnedSensor> {
        let (actor_id, tap) = {
            let mut state = self.inner.lock();
            Self::ensure_connected(&state)?;
            if self.inner.config.fail_sensors.contains(&descriptor.name) {
                return Err(HostError::sensor_spawn(
                    &descriptor.name,
                    parent,
                    "injected spawn failure",
                ));
            }
            if !matches!(state.actors.get(&parent), Some(MockActor::Vehicle { .. })) {
                return Err(HostError::sensor_spawn(
                    &descriptor.name,
                    parent,
                    "parent vehicle not found",
                ));
            }

            let delta = state.settings.fixed_delta_seconds.unwrap_or(0.0);
            let period = descriptor.decimation_period(&StepTiming::new(delta, 0.0));
            let tap = Tap::new(descriptor.name.as_str());
            let actor_id = Self::allocate_actor(
                &mut state,
                MockActor::Sensor {
                    name: descriptor.name.clone(),
                },
            );
            state.sensors.insert(
                actor_id,
                SensorEntry {
                    tap: tap.clone(),
                    kind: descriptor.kind,
                    period,
                    width: image_size(descriptor, "image_size_x", self.inner.config.default_width),
                    height: image_size(descriptor, "image_size_y", self.inner.config.default_height),
                    silent: self.inner.config.silent_sensors.contains(&descriptor.name),
                },
            );
            (actor_id, tap)
        };

        debug!(actor_id, sensor = %descriptor.name, parent, "mock sensor spawned");
        self.inner.journal.record(HostEvent::SensorSpawned {
            actor: actor_id,
            name: descriptor.name.clone(),
        });
        Ok(SpawnedSensor {
            descriptor: descriptor.clone(),
            actor_id,
            source: Box::new(MockSensorSource::new(tap, self.inner.journal.clone())),
        })
    }

    async fn destroy_actor(&self, actor_id: ActorId) -> Result<()> {
        let removed = {
            let mut state = self.inner.lock();
            state.sensors.remove(&actor_id);
            state.actors.remove(&actor_id)
        };
        if let Some(actor) = removed {
            debug!(actor_id, ?actor, "mock actor destroyed");
            self.inner.journal.record(HostEvent::ActorDestroyed(actor_id));
        }
        Ok(())
    }

    async fn start_recorder(&self, path: &Path) -> Result<()> {
        {
            let mut state = self.inner.lock();
            Self::ensure_connected(&state)?;
            if let Some(active) = &state.recording {
                return Err(HostError::recorder(format!(
                    "already recording to {}",
                    active.display()
                )));
            }
            state.recording = Some(path.to_path_buf());
        }
        self.inner
            .journal
            .record(HostEvent::RecorderStarted(path.to_path_buf()));
        Ok(())
    }

    async fn stop_recorder(&self) -> Result<()> {
        let stopped = self.inner.lock().recording.take();
        if stopped.is_some() {
            self.inner.journal.record(HostEvent::RecorderStopped);
        }
        Ok(())
    }

    async fn replay_file(&self, path: &Path) -> Result<()> {
        let spawned: Vec<(ActorId, String)> = {
            let mut state = self.inner.lock();
            Self::ensure_connected(&state)?;
            self.inner
                .config
                .replay_roles
                .iter()
                .map(|role| {
                    let id = Self::allocate_actor(&mut state, MockActor::Vehicle { role: role.clone() });
                    (id, role.clone())
                })
                .collect()
        };
        self.inner
            .journal
            .record(HostEvent::ReplayStarted(path.to_path_buf()));
        for (actor, role) in spawned {
            self.inner
                .journal
                .record(HostEvent::VehicleSpawned { actor, role });
        }
        Ok(())
    }
}
