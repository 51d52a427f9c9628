//! # carla-scenario
//!
//! The scenario loop driver behind the `carla-scenario` binary: world and
//! rig setup on a `SimulationHost`, the per-tick acquire / extract /
//! dispatch loop and the fixed cleanup sequence.

pub mod error;
pub mod pipeline;

pub use error::{DriverError, Result};
pub use pipeline::{
    discover_jobs, infer_world, inject_sensor_size, job_blueprint, redirect_file_sinks, BatchJob,
    DisplayRefresh, DriverOptions, RunMode, RunSummary, ScenarioDriver, StatusDisplay, StopReason,
};
