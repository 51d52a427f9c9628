//! Tick - simulation step identifier
//!
//! The host hands out one `Tick` per clock advance. Ticks are strictly
//! increasing within a run and never reused.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Host-issued frame identifier of one simulation step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Tick(u64);

impl Tick {
    #[inline]
    pub const fn new(frame: u64) -> Self {
        Self(frame)
    }

    /// Raw host frame number
    #[inline]
    pub const fn frame(self) -> u64 {
        self.0
    }

    /// The tick that follows this one
    #[inline]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl From<u64> for Tick {
    fn from(frame: u64) -> Self {
        Self(frame)
    }
}

impl fmt::Display for Tick {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Host actor handle
pub type ActorId = u32;

/// Step timing shared by the synchronizer and the driver.
///
/// `delta_time` is the fixed simulated step; `start_time` the warm-up span.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepTiming {
    pub delta_time: f64,
    pub start_time: f64,
}

impl StepTiming {
    /// Tolerance for float ratios such as `1.0 / 0.04`.
    const EPSILON: f64 = 1e-9;

    pub fn new(delta_time: f64, start_time: f64) -> Self {
        Self {
            delta_time,
            start_time,
        }
    }

    /// Number of warm-up ticks: `floor(start_time / delta_time)`.
    pub fn warmup_ticks(&self) -> u64 {
        if self.delta_time <= 0.0 || self.start_time <= 0.0 {
            return 0;
        }
        (self.start_time / self.delta_time + Self::EPSILON).floor() as u64
    }

    /// Decimation period for a capture interval: `max(1, round(interval / delta))`.
    pub fn period_for(&self, capture_interval: Option<f64>) -> u32 {
        match capture_interval {
            Some(interval) if interval > 0.0 && self.delta_time > 0.0 => {
                ((interval / self.delta_time).round() as u32).max(1)
            }
            _ => 1,
        }
    }

    /// Simulated elapsed time at the start of tick `index`.
    pub fn elapsed_at(&self, index: u64) -> f64 {
        index as f64 * self.delta_time
    }
}
