//! SimulationClock - the one host operation the synchronizer drives.

use std::future::Future;

use crate::{ContractError, Tick};

/// Host clock advanced once per frame-set.
pub trait SimulationClock: Send + Sync {
    /// Advance the host by one fixed step and return the new tick.
    ///
    /// Blocks for as long as the host needs; any error is fatal to the run.
    fn advance_clock(&self) -> impl Future<Output = Result<Tick, ContractError>> + Send;
}
