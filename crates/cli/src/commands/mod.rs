//! Command implementations.

mod batch;
mod info;
mod scenario;
mod validate;

pub use batch::run_batch;
pub use info::run_info;
pub use scenario::{run_record, run_replay};
pub use validate::run_validate;
