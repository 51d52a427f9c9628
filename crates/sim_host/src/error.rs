//! Simulation host error types

use contracts::{ActorId, ContractError};
use thiserror::Error;

/// Host boundary error
#[derive(Debug, Error)]
pub enum HostError {
    /// Connection error
    #[error("failed to connect to simulation host: {message}")]
    ConnectionFailed { message: String },

    /// Operation issued before `connect`
    #[error("not connected to simulation host")]
    NotConnected,

    /// World / settings / weather call failed
    #[error("world operation '{operation}' failed: {message}")]
    WorldFailed { operation: String, message: String },

    /// Vehicle spawn error
    #[error("failed to spawn vehicle '{blueprint}': {message}")]
    VehicleSpawnFailed { blueprint: String, message: String },

    /// Sensor spawn error
    #[error("failed to spawn sensor '{sensor_id}' on actor {parent}: {message}")]
    SensorSpawnFailed {
        sensor_id: String,
        parent: ActorId,
        message: String,
    },

    /// No actor matched a lookup
    #[error("no actor found: {what}")]
    ActorNotFound { what: String },

    /// Destroy error
    #[error("failed to destroy actor {actor_id}: {message}")]
    DestroyFailed { actor_id: ActorId, message: String },

    /// Recorder / replayer error
    #[error("recorder error: {message}")]
    Recorder { message: String },

    /// Wrapped ContractError
    #[error(transparent)]
    Contract(#[from] ContractError),
}

impl HostError {
    pub fn world(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::WorldFailed {
            operation: operation.into(),
            message: message.into(),
        }
    }

    pub fn sensor_spawn(
        sensor_id: impl Into<String>,
        parent: ActorId,
        message: impl Into<String>,
    ) -> Self {
        Self::SensorSpawnFailed {
            sensor_id: sensor_id.into(),
            parent,
            message: message.into(),
        }
    }

    pub fn recorder(message: impl Into<String>) -> Self {
        Self::Recorder {
            message: message.into(),
        }
    }
}

impl From<HostError> for ContractError {
    fn from(err: HostError) -> Self {
        match err {
            HostError::Contract(inner) => inner,
            HostError::ConnectionFailed { message } => ContractError::HostConnection { message },
            HostError::NotConnected => ContractError::HostConnection {
                message: "not connected".into(),
            },
            HostError::VehicleSpawnFailed { blueprint, message } => {
                ContractError::spawn(blueprint, message)
            }
            HostError::SensorSpawnFailed {
                sensor_id, message, ..
            } => ContractError::spawn(sensor_id, message),
            HostError::ActorNotFound { what } => ContractError::ActorNotFound { actor: what },
            HostError::Recorder { message } => ContractError::recorder(message),
            other => ContractError::Other(other.to_string()),
        }
    }
}

/// Result alias
pub type Result<T> = std::result::Result<T, HostError>;
