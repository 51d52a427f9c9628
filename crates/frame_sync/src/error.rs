//! Frame synchronizer errors
//!
//! Sensor read timeouts never show up here; they are recorded as absence in
//! the frame-set. What remains is either fatal to the run or a programming
//! error.

use contracts::{ContractError, SensorId, Tick};
use thiserror::Error;

use crate::synchronizer::SyncState;

#[derive(Debug, Error)]
pub enum SyncError {
    /// The host failed to step. Fatal for the run.
    #[error("host failed to advance the clock at tick index {index}: {source}")]
    HostAdvance {
        index: u64,
        #[source]
        source: ContractError,
    },

    /// The host handed out a tick that does not follow the previous one
    #[error("host issued tick {current} after {previous}")]
    NonMonotonicTick { previous: Tick, current: Tick },

    /// `tick` called outside the acquisition scope
    #[error("tick issued while the synchronizer is {state}")]
    NotArmed { state: SyncState },

    #[error("sensor '{sensor}' registered twice")]
    DuplicateSensor { sensor: SensorId },

    #[error("'{0}' is reserved for the world entry")]
    ReservedName(SensorId),
}

impl SyncError {
    /// Whether the run must stop
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SyncError::HostAdvance { .. } | SyncError::NonMonotonicTick { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
