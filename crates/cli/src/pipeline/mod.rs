//! Scenario pipeline: driver, display, run summary and run planning.

mod display;
mod driver;
mod plan;
mod stats;

pub use display::{DisplayRefresh, StatusDisplay};
pub use driver::{DriverOptions, RunMode, ScenarioDriver};
pub use plan::{
    discover_jobs, infer_world, inject_sensor_size, job_blueprint, redirect_file_sinks, BatchJob,
};
pub use stats::{RunSummary, StopReason};
