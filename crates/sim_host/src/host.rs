//! Simulation host abstraction
//!
//! Everything the scenario tool needs from the external simulator. The
//! synchronizer itself only sees `SimulationClock` and `SensorSource`.

use std::future::Future;
use std::path::Path;
use std::time::Duration;

use contracts::{ActorId, SensorDescriptor, SensorSource, SimulationClock, WeatherPreset};

use crate::error::Result;

/// Host world settings relevant to synchronous stepping
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WorldSettings {
    pub synchronous_mode: bool,
    pub no_rendering_mode: bool,
    pub fixed_delta_seconds: Option<f64>,
}

impl Default for WorldSettings {
    /// Asynchronous, rendering, variable step: a freshly started server
    fn default() -> Self {
        Self {
            synchronous_mode: false,
            no_rendering_mode: false,
            fixed_delta_seconds: None,
        }
    }
}

impl WorldSettings {
    /// Synchronous mode with a fixed step
    pub fn synchronous(delta_seconds: f64) -> Self {
        Self {
            synchronous_mode: true,
            no_rendering_mode: false,
            fixed_delta_seconds: Some(delta_seconds),
        }
    }
}

/// Proof that synchronous settings were applied.
///
/// Holds the settings in force before, and must be handed back to
/// `SimulationHost::restore_settings` exactly once.
#[must_use = "settings must be restored through SimulationHost::restore_settings"]
#[derive(Debug)]
pub struct SettingsToken {
    previous: WorldSettings,
    applied: WorldSettings,
}

impl SettingsToken {
    pub(crate) fn new(previous: WorldSettings, applied: WorldSettings) -> Self {
        Self { previous, applied }
    }

    pub fn previous(&self) -> &WorldSettings {
        &self.previous
    }

    pub fn applied(&self) -> &WorldSettings {
        &self.applied
    }

    pub(crate) fn into_previous(self) -> WorldSettings {
        self.previous
    }
}

/// Sensor actor spawned on the host
pub struct SpawnedSensor {
    pub descriptor: SensorDescriptor,
    pub actor_id: ActorId,
    pub source: Box<dyn SensorSource>,
}

impl std::fmt::Debug for SpawnedSensor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpawnedSensor")
            .field("name", &self.descriptor.name)
            .field("actor_id", &self.actor_id)
            .finish()
    }
}

/// Simulation host trait
///
/// Implemented by the in-process `MockSimHost` and, with `real-carla`, by
/// `CarlaHost`. Handles are cheap to clone and share one connection.
pub trait SimulationHost: SimulationClock + Clone + 'static {
    /// Connect to the server
    fn connect(
        &self,
        host: &str,
        port: u16,
        timeout: Duration,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Load a map by name
    fn load_world(&self, map: &str) -> impl Future<Output = Result<()>> + Send;

    fn set_weather(&self, preset: WeatherPreset) -> impl Future<Output = Result<()>> + Send;

    /// Switch to synchronous mode with a fixed step, capturing the previous settings
    fn apply_sync_settings(
        &self,
        delta_seconds: f64,
    ) -> impl Future<Output = Result<SettingsToken>> + Send;

    /// Put back the settings captured by `token`
    fn restore_settings(&self, token: SettingsToken) -> impl Future<Output = Result<()>> + Send;

    /// Producer of one world snapshot per tick
    fn world_source(&self) -> Box<dyn SensorSource>;

    fn spawn_vehicle(
        &self,
        blueprint: &str,
        role_name: &str,
        autopilot: bool,
    ) -> impl Future<Output = Result<ActorId>> + Send;

    /// Vehicle carrying `role_name`, or the first vehicle if none does
    fn find_vehicle_by_role(&self, role_name: &str)
        -> impl Future<Output = Result<ActorId>> + Send;

    /// Spawn a sensor attached to `parent`
    fn spawn_sensor(
        &self,
        descriptor: &SensorDescriptor,
        parent: ActorId,
    ) -> impl Future<Output = Result<SpawnedSensor>> + Send;

    /// Destroy an actor. Unknown ids are not an error.
    fn destroy_actor(&self, actor_id: ActorId) -> impl Future<Output = Result<()>> + Send;

    fn start_recorder(&self, path: &Path) -> impl Future<Output = Result<()>> + Send;

    /// Stop the recorder. A no-op when nothing is being recorded.
    fn stop_recorder(&self) -> impl Future<Output = Result<()>> + Send;

    /// Start replaying a recorder log from the beginning
    fn replay_file(&self, path: &Path) -> impl Future<Output = Result<()>> + Send;
}
