//! # Contracts
//!
//! Interface contracts shared by every crate of the scenario tool. Business
//! crates depend on this crate only, never on each other's internals.
//!
//! ## Time Model
//! - The host's frame id (`Tick`) is the primary clock; it is strictly
//!   increasing within a run
//! - Simulated time is derived from the tick index and the fixed step

mod blueprint;
mod clock;
mod error;
mod extracted;
mod frame_set;
mod sensor;
mod sensor_id;
mod sensor_source;
mod sink;
mod tick;

pub use blueprint::*;
pub use clock::SimulationClock;
pub use error::*;
pub use extracted::*;
pub use frame_set::*;
pub use sensor::*;
pub use sensor_id::SensorId;
pub use sensor_source::{SensorDataCallback, SensorSource};
pub use sink::*;
pub use tick::*;
