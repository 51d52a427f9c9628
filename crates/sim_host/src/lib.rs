//! Simulation host layer
//!
//! The `SimulationHost` trait abstracts the simulator connection used by the
//! scenario driver. `MockSimHost` is a deterministic in-process host for tests
//! and dry runs; `CarlaHost` talks to a live server behind the `real-carla`
//! feature. `ActorFactory` spawns and tears down the ego vehicle and its
//! sensors.

pub mod error;
pub mod factory;
pub mod host;
pub mod mock_host;
pub mod mock_sensor;

#[cfg(feature = "real-carla")]
pub mod carla_host;
#[cfg(feature = "real-carla")]
pub mod carla_sensor_source;
#[cfg(feature = "real-carla")]
mod sensor_data_converter;

pub use error::{HostError, Result};
pub use factory::{ActorFactory, ActorRegistry, TeardownReport};
pub use host::{SettingsToken, SimulationHost, SpawnedSensor, WorldSettings};
pub use mock_host::{Delivery, HostEvent, Journal, MockHostConfig, MockSimHost};
pub use mock_sensor::{synthetic_payload, MockSensorSource, DVS_RECORD_SIZE};

#[cfg(feature = "real-carla")]
pub use carla_host::CarlaHost;
#[cfg(feature = "real-carla")]
pub use carla_sensor_source::CarlaSensorSource;
