//! Extraction errors

use contracts::{SensorId, SensorKind};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExtractionError {
    /// The payload variant does not fit the sensor kind
    #[error("sensor {sensor} is {kind} but delivered a {found} payload")]
    PayloadMismatch {
        sensor: SensorId,
        kind: SensorKind,
        found: &'static str,
    },

    /// Buffer length does not match the declared shape
    #[error("malformed {what} payload: expected {expected} bytes, got {actual}")]
    Malformed {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("sensor {0} has no descriptor")]
    UnknownSensor(SensorId),
}

impl ExtractionError {
    /// Short label for metrics
    pub fn kind(&self) -> &'static str {
        match self {
            ExtractionError::PayloadMismatch { .. } => "payload_mismatch",
            ExtractionError::Malformed { .. } => "malformed",
            ExtractionError::UnknownSensor(_) => "unknown_sensor",
        }
    }
}

pub type Result<T> = std::result::Result<T, ExtractionError>;
