//! Error types of the scenario driver.

use dispatcher::DispatcherError;
use frame_sync::SyncError;
use sim_host::HostError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DriverError {
    /// World setup, actor spawn or recorder call failed
    #[error("simulation host error: {0}")]
    Host(#[from] HostError),

    /// Host advance failure or synchronizer misuse
    #[error("frame synchronization failed: {0}")]
    Sync(#[from] SyncError),

    #[error("failed to set up outputs: {0}")]
    Dispatcher(#[from] DispatcherError),

    /// The dispatcher task panicked or was cancelled
    #[error("dispatcher task failed: {0}")]
    DispatcherTask(#[from] tokio::task::JoinError),

    #[error("dispatcher input closed while the scenario was running")]
    DispatchClosed,
}

impl DriverError {
    /// Whether the run was ended by a failing host rather than by us
    pub fn is_host_failure(&self) -> bool {
        matches!(
            self,
            DriverError::Host(_) | DriverError::Sync(SyncError::HostAdvance { .. })
        )
    }
}

pub type Result<T> = std::result::Result<T, DriverError>;
