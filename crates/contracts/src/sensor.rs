//! Sensor descriptors and raw frames
//!
//! A `SensorDescriptor` is fixed at scenario setup. A `RawSensorFrame` is
//! produced on the host's callback thread and consumed exactly once by the
//! synchronizer before extraction.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use validator::Validate;

use crate::{SensorId, StepTiming, Tick, Transform};

/// Option key carrying the sensor capture interval in seconds.
pub const SENSOR_TICK_OPTION: &str = "sensor_tick";

/// Sensor kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorKind {
    /// Color camera
    Rgb,
    /// Grayscale computed from a color camera
    Gray,
    /// Event (DVS) camera
    Dvs,
    /// Optical flow camera
    OpticalFlow,
}

impl SensorKind {
    /// Default host blueprint for this kind
    pub fn default_blueprint(self) -> &'static str {
        match self {
            SensorKind::Rgb | SensorKind::Gray => "sensor.camera.rgb",
            SensorKind::Dvs => "sensor.camera.dvs",
            SensorKind::OpticalFlow => "sensor.camera.optical_flow",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SensorKind::Rgb => "rgb",
            SensorKind::Gray => "gray",
            SensorKind::Dvs => "dvs",
            SensorKind::OpticalFlow => "optical_flow",
        }
    }
}

impl fmt::Display for SensorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sensor descriptor
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SensorDescriptor {
    /// Unique name, also the frame-set key
    #[validate(length(min = 1, message = "sensor name must not be empty"))]
    pub name: String,

    pub kind: SensorKind,

    /// Host blueprint override (defaults to the kind's blueprint)
    #[serde(default)]
    pub blueprint: Option<String>,

    /// Host attribute bag, e.g. `sensor_tick`, `positive_threshold`
    #[serde(default)]
    pub options: HashMap<String, String>,

    /// Mount pose relative to the parent actor
    #[serde(default)]
    pub transform: Transform,
}

impl SensorDescriptor {
    pub fn new(name: impl Into<String>, kind: SensorKind) -> Self {
        Self {
            name: name.into(),
            kind,
            blueprint: None,
            options: HashMap::new(),
            transform: Transform::default(),
        }
    }

    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    pub fn id(&self) -> SensorId {
        SensorId::from(self.name.as_str())
    }

    pub fn host_blueprint(&self) -> &str {
        self.blueprint
            .as_deref()
            .unwrap_or_else(|| self.kind.default_blueprint())
    }

    /// Capture interval from the `sensor_tick` option, if set and numeric.
    pub fn capture_interval(&self) -> Option<f64> {
        self.options
            .get(SENSOR_TICK_OPTION)
            .and_then(|v| v.trim().parse::<f64>().ok())
    }

    /// Ticks between consumed frames once the sensor is armed.
    pub fn decimation_period(&self, timing: &StepTiming) -> u32 {
        timing.period_for(self.capture_interval())
    }
}

/// Raw frame delivered by a host callback
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawSensorFrame {
    /// Producing sensor (or the world source)
    pub sensor: SensorId,

    /// Host step this frame belongs to
    pub tick: Tick,

    /// Host simulation timestamp (seconds)
    pub timestamp: f64,

    pub payload: SensorPayload,
}

/// Payload carried by a raw frame
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SensorPayload {
    /// Camera image
    Image(ImageData),

    /// DVS event array
    DvsEvents(DvsEventData),

    /// Optical flow image
    OpticalFlow(FlowData),

    /// World tick snapshot
    World(WorldSnapshot),

    /// Raw bytes (fallback)
    Raw(Bytes),
}

impl SensorPayload {
    pub fn variant_name(&self) -> &'static str {
        match self {
            SensorPayload::Image(_) => "image",
            SensorPayload::DvsEvents(_) => "dvs_events",
            SensorPayload::OpticalFlow(_) => "optical_flow",
            SensorPayload::World(_) => "world",
            SensorPayload::Raw(_) => "raw",
        }
    }
}

/// Image data
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageData {
    pub width: u32,
    pub height: u32,
    pub format: ImageFormat,
    /// Row-major pixel data
    pub data: Bytes,
}

/// Pixel layout of `ImageData`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageFormat {
    /// 4 bytes per pixel, host native
    Bgra8,
    Rgba8,
}

/// DVS event array.
///
/// `data` holds packed 13-byte records: x u16, y u16, t i64, polarity bool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DvsEventData {
    pub width: u32,
    pub height: u32,
    pub data: Bytes,
}

/// Optical flow image.
///
/// `data` holds one `(f32, f32)` pair per pixel, normalized to [-1, 1].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowData {
    pub width: u32,
    pub height: u32,
    pub data: Bytes,
}

/// World tick snapshot
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WorldSnapshot {
    /// Simulated seconds since the episode started
    pub elapsed_seconds: f64,
    /// Simulated seconds of this step
    pub delta_seconds: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_period_from_sensor_tick() {
        let timing = StepTiming::new(0.01, 1.0);
        let gray = SensorDescriptor::new("gray", SensorKind::Gray).with_option("sensor_tick", "0.04");
        let events = SensorDescriptor::new("events", SensorKind::Dvs);
        assert_eq!(gray.decimation_period(&timing), 4);
        assert_eq!(events.decimation_period(&timing), 1);
    }

    #[test]
    fn test_unparseable_sensor_tick_means_every_tick() {
        let timing = StepTiming::new(0.05, 0.0);
        let d = SensorDescriptor::new("cam", SensorKind::Rgb).with_option("sensor_tick", "fast");
        assert_eq!(d.capture_interval(), None);
        assert_eq!(d.decimation_period(&timing), 1);
    }

    #[test]
    fn test_host_blueprint_defaults() {
        let mut d = SensorDescriptor::new("gray", SensorKind::Gray);
        assert_eq!(d.host_blueprint(), "sensor.camera.rgb");
        d.blueprint = Some("sensor.camera.rgb.wide".into());
        assert_eq!(d.host_blueprint(), "sensor.camera.rgb.wide");
        assert_eq!(SensorKind::OpticalFlow.default_blueprint(), "sensor.camera.optical_flow");
    }

    #[test]
    fn test_kind_serde_names() {
        let kind: SensorKind = serde_json::from_str("\"optical_flow\"").unwrap();
        assert_eq!(kind, SensorKind::OpticalFlow);
        assert_eq!(serde_json::to_string(&SensorKind::Dvs).unwrap(), "\"dvs\"");
    }
}
