//! Extraction output consumed by sinks.

use serde::{Deserialize, Serialize};

use crate::{SensorId, SensorKind, Tick};

/// One DVS event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DvsEvent {
    pub x: u16,
    pub y: u16,
    /// Host event timestamp
    pub t: i64,
    pub polarity: bool,
}

/// RGB8 image, row-major
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RgbImage {
    pub width: u32,
    pub height: u32,
    #[serde(with = "serde_bytes")]
    pub data: Vec<u8>,
}

/// Luma8 image, row-major
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GrayImage {
    pub width: u32,
    pub height: u32,
    #[serde(with = "serde_bytes")]
    pub data: Vec<u8>,
}

/// Optical flow field in pixel units, `[dx, dy]` per pixel, row-major
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowField {
    pub width: u32,
    pub height: u32,
    pub vectors: Vec<[f32; 2]>,
}

/// Extracted sensor data
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ExtractedData {
    Rgb(RgbImage),
    Gray(GrayImage),
    Events(Vec<DvsEvent>),
    Flow(FlowField),
}

impl ExtractedData {
    /// Image dimensions (height, width), if the data is image-shaped
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        match self {
            ExtractedData::Rgb(img) => Some((img.height, img.width)),
            ExtractedData::Gray(img) => Some((img.height, img.width)),
            ExtractedData::Flow(flow) => Some((flow.height, flow.width)),
            ExtractedData::Events(_) => None,
        }
    }
}

/// Extracted frame of one sensor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedFrame {
    pub sensor: SensorId,
    pub kind: SensorKind,
    pub tick: Tick,
    /// Host timestamp of the raw frame
    pub timestamp: f64,
    pub data: ExtractedData,
}

/// Extracted counterpart of a `FrameSet`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedFrameSet {
    pub tick: Tick,
    pub index: u64,
    pub sim_time: f64,
    pub warmup: bool,
    /// Extracted frames, in registration order
    pub frames: Vec<ExtractedFrame>,
    /// Sensors with nothing extracted this tick
    pub absent: Vec<SensorId>,
}

impl ExtractedFrameSet {
    pub fn get(&self, sensor: &str) -> Option<&ExtractedFrame> {
        self.frames.iter().find(|f| f.sensor == sensor)
    }
}
