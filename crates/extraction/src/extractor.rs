//! Frame-set extraction

use std::collections::HashMap;

use contracts::{
    ExtractedData, ExtractedFrame, ExtractedFrameSet, FrameSet, RawSensorFrame, SensorDescriptor,
    SensorId, SensorKind, SensorPayload,
};
use metrics::counter;
use tracing::{instrument, warn};

use crate::error::{ExtractionError, Result};
use crate::extract::{extract_events, extract_flow, extract_gray, extract_rgb};

/// Extraction counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractionStats {
    pub extracted: u64,
    pub errors: u64,
}

/// Applies the extractor matching each sensor's kind
#[derive(Debug, Default)]
pub struct Extractor {
    kinds: HashMap<SensorId, SensorKind>,
    stats: ExtractionStats,
}

impl Extractor {
    pub fn new<'a>(descriptors: impl IntoIterator<Item = &'a SensorDescriptor>) -> Self {
        Self {
            kinds: descriptors
                .into_iter()
                .map(|d| (d.id(), d.kind))
                .collect(),
            stats: ExtractionStats::default(),
        }
    }

    pub fn stats(&self) -> ExtractionStats {
        self.stats
    }

    /// Extract one raw frame
    pub fn extract_frame(&self, frame: &RawSensorFrame) -> Result<ExtractedFrame> {
        let kind = *self
            .kinds
            .get(&frame.sensor)
            .ok_or_else(|| ExtractionError::UnknownSensor(frame.sensor.clone()))?;

        let data = match (kind, &frame.payload) {
            (SensorKind::Rgb, SensorPayload::Image(image)) => ExtractedData::Rgb(extract_rgb(image)?),
            (SensorKind::Gray, SensorPayload::Image(image)) => {
                ExtractedData::Gray(extract_gray(image)?)
            }
            (SensorKind::Dvs, SensorPayload::DvsEvents(events)) => {
                ExtractedData::Events(extract_events(events)?)
            }
            (SensorKind::OpticalFlow, SensorPayload::OpticalFlow(flow)) => {
                ExtractedData::Flow(extract_flow(flow)?)
            }
            (kind, payload) => {
                return Err(ExtractionError::PayloadMismatch {
                    sensor: frame.sensor.clone(),
                    kind,
                    found: payload.variant_name(),
                })
            }
        };

        Ok(ExtractedFrame {
            sensor: frame.sensor.clone(),
            kind,
            tick: frame.tick,
            timestamp: frame.timestamp,
            data,
        })
    }

    /// Extract every present frame of `frame_set`.
    ///
    /// Frames that fail are logged, counted and listed as absent.
    #[instrument(
        level = "debug",
        name = "extraction_extract",
        skip(self, frame_set),
        fields(tick = %frame_set.tick, index = frame_set.index)
    )]
    pub fn extract(&mut self, frame_set: &FrameSet) -> ExtractedFrameSet {
        let mut frames = Vec::with_capacity(frame_set.present_count());
        let mut absent = Vec::new();

        for slot in &frame_set.slots {
            let Some(raw) = slot.frame.as_ref() else {
                absent.push(slot.sensor.clone());
                continue;
            };
            match self.extract_frame(raw) {
                Ok(frame) => {
                    self.stats.extracted += 1;
                    frames.push(frame);
                }
                Err(e) => {
                    self.stats.errors += 1;
                    counter!("extraction_errors_total", "kind" => e.kind()).increment(1);
                    warn!(sensor = %slot.sensor, error = %e, "extraction failed, frame skipped");
                    absent.push(slot.sensor.clone());
                }
            }
        }

        ExtractedFrameSet {
            tick: frame_set.tick,
            index: frame_set.index,
            sim_time: frame_set.sim_time,
            warmup: frame_set.warmup,
            frames,
            absent,
        }
    }
}
