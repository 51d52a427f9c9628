//! ActorFactory - spawns the ego vehicle and its sensor rig
//!
//! Sensors are spawned in declaration order; if any spawn fails, the ones
//! already created are destroyed before the error is returned.

use contracts::{ActorId, EgoConfig, SensorDescriptor, SensorId};
use tracing::{error, info, instrument, warn};

use crate::error::Result;
use crate::host::{SimulationHost, SpawnedSensor};

/// Actors owned by one scenario run, released at cleanup
#[derive(Debug, Default, Clone)]
pub struct ActorRegistry {
    vehicles: Vec<(String, ActorId)>,
    sensors: Vec<(SensorId, ActorId)>,
}

impl ActorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_vehicle(&mut self, label: impl Into<String>, actor_id: ActorId) {
        self.vehicles.push((label.into(), actor_id));
    }

    pub fn register_sensor(&mut self, sensor: SensorId, actor_id: ActorId) {
        self.sensors.push((sensor, actor_id));
    }

    pub fn vehicle_count(&self) -> usize {
        self.vehicles.len()
    }

    pub fn sensor_count(&self) -> usize {
        self.sensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vehicles.is_empty() && self.sensors.is_empty()
    }
}

/// Outcome of a teardown
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TeardownReport {
    pub destroyed: usize,
    pub failed: Vec<ActorId>,
}

/// Actor Factory
pub struct ActorFactory<H: SimulationHost> {
    host: H,
}

impl<H: SimulationHost> ActorFactory<H> {
    pub fn new(host: H) -> Self {
        Self { host }
    }

    /// Spawn the ego vehicle described by `ego`
    #[instrument(
        name = "actor_factory_spawn_ego",
        skip(self, ego, registry),
        fields(blueprint = %ego.blueprint, role = %ego.role_name)
    )]
    pub async fn spawn_ego(&self, ego: &EgoConfig, registry: &mut ActorRegistry) -> Result<ActorId> {
        let actor_id = self
            .host
            .spawn_vehicle(&ego.blueprint, &ego.role_name, ego.autopilot)
            .await?;
        registry.register_vehicle(ego.role_name.clone(), actor_id);
        info!(actor_id, "ego vehicle spawned");
        Ok(actor_id)
    }

    /// Adopt the replayed vehicle carrying `role_name` so it is released at cleanup
    #[instrument(name = "actor_factory_adopt_vehicle", skip(self, registry))]
    pub async fn adopt_vehicle(&self, role_name: &str, registry: &mut ActorRegistry) -> Result<ActorId> {
        let actor_id = self.host.find_vehicle_by_role(role_name).await?;
        registry.register_vehicle(role_name, actor_id);
        info!(actor_id, "using replayed vehicle");
        Ok(actor_id)
    }

    /// Spawn every sensor on `parent`, in declaration order.
    ///
    /// # Atomicity
    /// On failure all sensors spawned by this call are destroyed again.
    #[instrument(
        name = "actor_factory_spawn_sensors",
        skip(self, descriptors, registry),
        fields(parent, sensor_count = descriptors.len())
    )]
    pub async fn spawn_sensors(
        &self,
        descriptors: &[SensorDescriptor],
        parent: ActorId,
        registry: &mut ActorRegistry,
    ) -> Result<Vec<SpawnedSensor>> {
        let mut spawned: Vec<SpawnedSensor> = Vec::with_capacity(descriptors.len());

        for descriptor in descriptors {
            match self.host.spawn_sensor(descriptor, parent).await {
                Ok(sensor) => {
                    info!(
                        sensor_id = %descriptor.name,
                        actor_id = sensor.actor_id,
                        blueprint = descriptor.host_blueprint(),
                        "sensor spawned and attached"
                    );
                    spawned.push(sensor);
                }
                Err(e) => {
                    warn!(
                        sensor_id = %descriptor.name,
                        error = %e,
                        "sensor spawn failed, rolling back rig"
                    );
                    for sensor in &spawned {
                        sensor.source.stop();
                        self.destroy_actor_safe(sensor.actor_id, &sensor.descriptor.name)
                            .await;
                    }
                    return Err(e);
                }
            }
        }

        for sensor in &spawned {
            registry.register_sensor(sensor.descriptor.id(), sensor.actor_id);
        }
        Ok(spawned)
    }

    /// Destroy all registered actors: sensors first, then vehicles.
    ///
    /// Continues past individual failures; safe to call on an empty registry.
    #[instrument(
        name = "actor_factory_teardown",
        skip(self, registry),
        fields(vehicle_count = registry.vehicle_count(), sensor_count = registry.sensor_count())
    )]
    pub async fn teardown(&self, registry: &mut ActorRegistry) -> TeardownReport {
        let mut report = TeardownReport::default();

        for (sensor, actor_id) in std::mem::take(&mut registry.sensors) {
            if self.destroy_actor_safe(actor_id, &sensor).await {
                report.destroyed += 1;
            } else {
                report.failed.push(actor_id);
            }
        }
        for (label, actor_id) in std::mem::take(&mut registry.vehicles) {
            if self.destroy_actor_safe(actor_id, &label).await {
                report.destroyed += 1;
            } else {
                report.failed.push(actor_id);
            }
        }

        info!(destroyed = report.destroyed, failed = report.failed.len(), "teardown completed");
        report
    }

    async fn destroy_actor_safe(&self, actor_id: ActorId, label: &str) -> bool {
        match self.host.destroy_actor(actor_id).await {
            Ok(()) => true,
            Err(e) => {
                error!(actor_id, label, error = %e, "failed to destroy actor");
                false
            }
        }
    }
}
