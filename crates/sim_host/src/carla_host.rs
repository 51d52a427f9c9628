//! CARLA-backed simulation host
//!
//! Drives a live server through the carla-rust crate. Only compiled with the
//! `real-carla` feature.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use carla::client::{ActorBase, Client, Sensor, Vehicle, World};
use carla::geom::{Location, Rotation, Transform as CarlaTransform};
use carla::rpc::EpisodeSettings;
use contracts::{
    ActorId, ContractError, RawSensorFrame, SensorDataCallback, SensorDescriptor, SensorPayload,
    SensorSource, SimulationClock, Tick, Transform, WeatherPreset, WorldSnapshot, WORLD_KEY,
};
use tracing::{debug, info, instrument, warn};

use crate::carla_sensor_source::CarlaSensorSource;
use crate::error::{HostError, Result};
use crate::host::{SettingsToken, SimulationHost, SpawnedSensor, WorldSettings};

#[derive(Clone)]
enum CarlaActor {
    Vehicle(Vehicle),
    Sensor(Sensor),
}

#[derive(Default)]
struct Connection {
    client: Option<Client>,
    world: Option<World>,
    /// Elapsed simulated time, advanced by the fixed step on every tick
    elapsed: f64,
    delta: f64,
}

/// Real CARLA host
#[derive(Clone, Default)]
pub struct CarlaHost {
    conn: Arc<Mutex<Connection>>,
    actors: Arc<Mutex<HashMap<ActorId, CarlaActor>>>,
    world_callback: Arc<Mutex<Option<SensorDataCallback>>>,
}

impl CarlaHost {
    pub fn new() -> Self {
        Self::default()
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn actors(&self) -> MutexGuard<'_, HashMap<ActorId, CarlaActor>> {
        self.actors.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn with_world<R>(&self, f: impl FnOnce(&mut World) -> Result<R>) -> Result<R> {
        let mut conn = self.conn();
        let world = conn.world.as_mut().ok_or(HostError::NotConnected)?;
        f(world)
    }

    fn with_client<R>(&self, f: impl FnOnce(&mut Client) -> Result<R>) -> Result<R> {
        let mut conn = self.conn();
        let client = conn.client.as_mut().ok_or(HostError::NotConnected)?;
        f(client)
    }

    fn to_episode_settings(base: &EpisodeSettings, settings: &WorldSettings) -> EpisodeSettings {
        let mut episode = base.clone();
        episode.synchronous_mode = settings.synchronous_mode;
        episode.no_rendering_mode = settings.no_rendering_mode;
        episode.fixed_delta_seconds = settings.fixed_delta_seconds;
        episode
    }

    fn from_episode_settings(episode: &EpisodeSettings) -> WorldSettings {
        WorldSettings {
            synchronous_mode: episode.synchronous_mode,
            no_rendering_mode: episode.no_rendering_mode,
            fixed_delta_seconds: episode.fixed_delta_seconds,
        }
    }

    fn to_carla_transform(transform: &Transform) -> CarlaTransform {
        CarlaTransform {
            location: Location {
                x: transform.location.x as f32,
                y: transform.location.y as f32,
                z: transform.location.z as f32,
            },
            rotation: Rotation {
                pitch: transform.rotation.pitch as f32,
                yaw: transform.rotation.yaw as f32,
                roll: transform.rotation.roll as f32,
            },
        }
    }

    /// Cloudiness, precipitation, wetness, sun altitude of a preset
    fn preset_parameters(preset: WeatherPreset) -> (f32, f32, f32, f32) {
        use WeatherPreset::*;
        match preset {
            WeatherPreset::Default | ClearNoon => (5.0, 0.0, 0.0, 75.0),
            CloudyNoon => (60.0, 0.0, 0.0, 75.0),
            WetNoon => (5.0, 0.0, 50.0, 75.0),
            WetCloudyNoon => (60.0, 0.0, 50.0, 75.0),
            SoftRainNoon => (20.0, 30.0, 50.0, 75.0),
            MidRainyNoon => (60.0, 60.0, 60.0, 75.0),
            HardRainNoon => (100.0, 100.0, 90.0, 75.0),
            ClearSunset => (5.0, 0.0, 0.0, 15.0),
            CloudySunset => (60.0, 0.0, 0.0, 15.0),
            WetSunset => (5.0, 0.0, 50.0, 15.0),
            WetCloudySunset => (60.0, 0.0, 50.0, 15.0),
            SoftRainSunset => (20.0, 30.0, 50.0, 15.0),
            MidRainSunset => (60.0, 60.0, 60.0, 15.0),
            HardRainSunset => (100.0, 100.0, 90.0, 15.0),
        }
    }
}

impl SimulationClock for CarlaHost {
    async fn advance_clock(&self) -> std::result::Result<Tick, ContractError> {
        let host = self.clone();
        let (frame, elapsed, delta) = tokio::task::spawn_blocking(move || {
            let mut conn = host.conn();
            let delta = conn.delta;
            let world = conn
                .world
                .as_mut()
                .ok_or_else(|| ContractError::host_advance("not connected"))?;
            let frame = world.tick();
            let elapsed = conn.elapsed;
            conn.elapsed += delta;
            Ok::<_, ContractError>((frame, elapsed, delta))
        })
        .await
        .map_err(|e| ContractError::host_advance(format!("tick task failed: {e}")))??;

        let tick = Tick::new(frame);
        let callback = self
            .world_callback
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(callback) = callback {
            callback(RawSensorFrame {
                sensor: WORLD_KEY.into(),
                tick,
                timestamp: elapsed,
                payload: SensorPayload::World(WorldSnapshot {
                    elapsed_seconds: elapsed,
                    delta_seconds: delta,
                }),
            });
        }
        Ok(tick)
    }
}

/// World tick source fed by `CarlaHost::advance_clock`
struct CarlaWorldSource {
    slot: Arc<Mutex<Option<SensorDataCallback>>>,
}

impl SensorSource for CarlaWorldSource {
    fn sensor_id(&self) -> &str {
        WORLD_KEY
    }

    fn listen(&self, callback: SensorDataCallback) {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_none() {
            *slot = Some(callback);
        }
    }

    fn stop(&self) {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    fn is_listening(&self) -> bool {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}

impl SimulationHost for CarlaHost {
    #[instrument(name = "carla_host_connect", skip(self, timeout), fields(host = %host, port))]
    async fn connect(&self, host: &str, port: u16, timeout: Duration) -> Result<()> {
        let mut client = Client::connect(host, port, None);
        client.set_timeout(timeout);
        let world = client.world();
        info!(map = %world.map().name(), "connected to CARLA server");

        let mut conn = self.conn();
        conn.client = Some(client);
        conn.world = Some(world);
        Ok(())
    }

    #[instrument(name = "carla_host_load_world", skip(self))]
    async fn load_world(&self, map: &str) -> Result<()> {
        let world = self.with_client(|client| Ok(client.load_world(map)))?;
        self.conn().world = Some(world);
        Ok(())
    }

    async fn set_weather(&self, preset: WeatherPreset) -> Result<()> {
        let (cloudiness, precipitation, wetness, sun_altitude) = Self::preset_parameters(preset);
        self.with_world(|world| {
            let mut weather = world.weather();
            weather.cloudiness = cloudiness;
            weather.precipitation = precipitation;
            weather.wetness = wetness;
            weather.sun_altitude_angle = sun_altitude;
            world.set_weather(&weather);
            Ok(())
        })?;
        info!(%preset, "weather applied");
        Ok(())
    }

    #[instrument(name = "carla_host_apply_sync_settings", skip(self))]
    async fn apply_sync_settings(&self, delta_seconds: f64) -> Result<SettingsToken> {
        let applied = WorldSettings::synchronous(delta_seconds);
        let previous = self.with_world(|world| {
            let current = world.settings();
            let next = Self::to_episode_settings(&current, &applied);
            world.apply_settings(&next, Duration::from_secs(10));
            Ok(Self::from_episode_settings(&current))
        })?;
        {
            let mut conn = self.conn();
            conn.delta = delta_seconds;
            conn.elapsed = 0.0;
        }
        info!(?previous, "synchronous mode applied");
        Ok(SettingsToken::new(previous, applied))
    }

    #[instrument(name = "carla_host_restore_settings", skip(self, token))]
    async fn restore_settings(&self, token: SettingsToken) -> Result<()> {
        let previous = token.into_previous();
        self.with_world(|world| {
            let current = world.settings();
            let restored = Self::to_episode_settings(&current, &previous);
            world.apply_settings(&restored, Duration::from_secs(10));
            Ok(())
        })?;
        info!("simulation settings reset");
        Ok(())
    }

    fn world_source(&self) -> Box<dyn SensorSource> {
        Box::new(CarlaWorldSource {
            slot: self.world_callback.clone(),
        })
    }

    #[instrument(name = "carla_host_spawn_vehicle", skip(self))]
    async fn spawn_vehicle(&self, blueprint: &str, role_name: &str, autopilot: bool) -> Result<ActorId> {
        let vehicle = self.with_world(|world| {
            let library = world.blueprint_library();
            let mut vehicle_bp =
                library
                    .find(blueprint)
                    .ok_or_else(|| HostError::VehicleSpawnFailed {
                        blueprint: blueprint.to_string(),
                        message: "blueprint not found".into(),
                    })?;
            if !vehicle_bp.set_attribute("role_name", role_name) {
                warn!(role_name, "failed to set role_name");
            }
            let spawn_point = world
                .map()
                .recommended_spawn_points()
                .get(0)
                .cloned()
                .ok_or_else(|| HostError::VehicleSpawnFailed {
                    blueprint: blueprint.to_string(),
                    message: "map has no spawn points".into(),
                })?;
            let actor = world.spawn_actor(&vehicle_bp, &spawn_point).map_err(|e| {
                HostError::VehicleSpawnFailed {
                    blueprint: blueprint.to_string(),
                    message: e.to_string(),
                }
            })?;
            Vehicle::try_from(actor).map_err(|_| HostError::VehicleSpawnFailed {
                blueprint: blueprint.to_string(),
                message: "spawned actor is not a vehicle".into(),
            })
        })?;

        vehicle.set_autopilot(autopilot);
        let actor_id = vehicle.id();
        debug!(actor_id, "vehicle spawned");
        self.actors().insert(actor_id, CarlaActor::Vehicle(vehicle));
        Ok(actor_id)
    }

    #[instrument(name = "carla_host_find_vehicle", skip(self))]
    async fn find_vehicle_by_role(&self, role_name: &str) -> Result<ActorId> {
        let found = self.with_world(|world| {
            let mut first = None;
            for actor in world.actors().iter() {
                if !actor.type_id().starts_with("vehicle.") {
                    continue;
                }
                let role = actor
                    .attributes()
                    .iter()
                    .find(|attr| attr.id() == "role_name")
                    .map(|attr| attr.value_string());
                if role.as_deref() == Some(role_name) {
                    return Ok(Some(actor));
                }
                if first.is_none() {
                    first = Some(actor);
                }
            }
            Ok(first)
        })?;

        let actor = found.ok_or_else(|| HostError::ActorNotFound {
            what: format!("vehicle with role '{role_name}'"),
        })?;
        let actor_id = actor.id();
        if let Ok(vehicle) = Vehicle::try_from(actor) {
            self.actors().insert(actor_id, CarlaActor::Vehicle(vehicle));
        }
        Ok(actor_id)
    }

    #[instrument(name = "carla_host_spawn_sensor", skip(self, descriptor), fields(sensor = %descriptor.name, parent))]
    async fn spawn_sensor(&self, descriptor: &SensorDescriptor, parent: ActorId) -> Result<SpawnedSensor> {
        let parent_vehicle = match self.actors().get(&parent) {
            Some(CarlaActor::Vehicle(v)) => v.clone(),
            _ => {
                return Err(HostError::sensor_spawn(
                    &descriptor.name,
                    parent,
                    "parent vehicle not found",
                ))
            }
        };

        let sensor = self.with_world(|world| {
            let library = world.blueprint_library();
            let mut sensor_bp = library.find(descriptor.host_blueprint()).ok_or_else(|| {
                HostError::sensor_spawn(&descriptor.name, parent, "blueprint not found")
            })?;
            for (key, value) in &descriptor.options {
                if !sensor_bp.set_attribute(key, value) {
                    warn!(key, value, "failed to set sensor attribute");
                }
            }
            let transform = Self::to_carla_transform(&descriptor.transform);
            let actor = world
                .spawn_actor_attached(&sensor_bp, &transform, &parent_vehicle, None)
                .map_err(|e| HostError::sensor_spawn(&descriptor.name, parent, e.to_string()))?;
            Sensor::try_from(actor).map_err(|_| {
                HostError::sensor_spawn(&descriptor.name, parent, "spawned actor is not a sensor")
            })
        })?;

        let actor_id = sensor.id();
        self.actors()
            .insert(actor_id, CarlaActor::Sensor(sensor.clone()));
        Ok(SpawnedSensor {
            descriptor: descriptor.clone(),
            actor_id,
            source: Box::new(CarlaSensorSource::new(descriptor.name.clone(), descriptor.kind, sensor)),
        })
    }

    #[instrument(name = "carla_host_destroy_actor", skip(self))]
    async fn destroy_actor(&self, actor_id: ActorId) -> Result<()> {
        let Some(actor) = self.actors().remove(&actor_id) else {
            return Ok(());
        };
        let destroyed = match actor {
            CarlaActor::Vehicle(vehicle) => vehicle.destroy(),
            CarlaActor::Sensor(sensor) => {
                if sensor.is_listening() {
                    sensor.stop();
                }
                sensor.destroy()
            }
        };
        if destroyed {
            Ok(())
        } else {
            Err(HostError::DestroyFailed {
                actor_id,
                message: "server refused destroy".into(),
            })
        }
    }

    #[instrument(name = "carla_host_start_recorder", skip(self))]
    async fn start_recorder(&self, path: &Path) -> Result<()> {
        let name = path.to_string_lossy().into_owned();
        let reply = self.with_client(|client| Ok(client.start_recorder(&name, false)))?;
        info!(reply = %reply, "recorder started");
        Ok(())
    }

    async fn stop_recorder(&self) -> Result<()> {
        self.with_client(|client| {
            client.stop_recorder();
            Ok(())
        })
    }

    #[instrument(name = "carla_host_replay_file", skip(self))]
    async fn replay_file(&self, path: &Path) -> Result<()> {
        let name = path.to_string_lossy().into_owned();
        let reply = self.with_client(|client| Ok(client.replay_file(&name, 0.0, 0.0, 0, false)))?;
        if reply.is_empty() || reply.contains("not found") {
            return Err(HostError::recorder(format!("replay of {} failed: {reply}", path.display())));
        }
        info!(reply = %reply, "replay started");
        Ok(())
    }
}
