//! Layered error definitions
//!
//! Categorized by source: config / host / payload / sink

use thiserror::Error;

/// Unified error type
#[derive(Debug, Error)]
pub enum ContractError {
    // ===== Configuration Errors =====
    /// Configuration parse error
    #[error("config parse error: {message}")]
    ConfigParse {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration validation error
    #[error("config validation error at '{field}': {message}")]
    ConfigValidation { field: String, message: String },

    // ===== Simulation Host Errors =====
    /// Host connection error
    #[error("host connection error: {message}")]
    HostConnection { message: String },

    /// The host failed to advance its clock by one step
    #[error("host failed to advance clock: {message}")]
    HostAdvance { message: String },

    /// Actor spawn error
    #[error("spawn error for '{actor}': {message}")]
    Spawn { actor: String, message: String },

    /// Actor not found
    #[error("actor not found: {actor}")]
    ActorNotFound { actor: String },

    /// Recorder / replayer error
    #[error("recorder error: {message}")]
    Recorder { message: String },

    // ===== Payload Errors =====
    /// Data parse error
    #[error("payload parse error for sensor '{sensor_id}': {message}")]
    PayloadParse { sensor_id: String, message: String },

    // ===== Sink Errors =====
    /// Sink write error
    #[error("sink '{sink_name}' write error: {message}")]
    SinkWrite { sink_name: String, message: String },

    // ===== General Errors =====
    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl ContractError {
    /// Create configuration parse error
    pub fn config_parse(message: impl Into<String>) -> Self {
        Self::ConfigParse {
            message: message.into(),
            source: None,
        }
    }

    /// Create configuration validation error
    pub fn config_validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConfigValidation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create host advance error
    pub fn host_advance(message: impl Into<String>) -> Self {
        Self::HostAdvance {
            message: message.into(),
        }
    }

    /// Create spawn error
    pub fn spawn(actor: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Spawn {
            actor: actor.into(),
            message: message.into(),
        }
    }

    /// Create recorder error
    pub fn recorder(message: impl Into<String>) -> Self {
        Self::Recorder {
            message: message.into(),
        }
    }

    /// Create payload parse error
    pub fn payload_parse(sensor_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::PayloadParse {
            sensor_id: sensor_id.into(),
            message: message.into(),
        }
    }

    /// Create sink write error
    pub fn sink_write(sink_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SinkWrite {
            sink_name: sink_name.into(),
            message: message.into(),
        }
    }
}
