//! Mock sensor source and synthetic payloads
//!
//! `MockSensorSource` implements `SensorSource` for sensors owned by
//! `MockSimHost`. The host, not the sensor, decides when a frame is produced.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use bytes::{BufMut, Bytes, BytesMut};
use contracts::{
    DvsEventData, FlowData, ImageData, ImageFormat, SensorDataCallback, SensorKind,
    SensorPayload, SensorSource,
};
use tracing::debug;

use crate::mock_host::{HostEvent, Journal};

/// Size of one packed DVS record: x u16, y u16, t i64, pol u8
pub const DVS_RECORD_SIZE: usize = 13;

/// Callback slot shared between a mock source and the host delivering to it
pub(crate) struct Tap {
    name: String,
    callback: Mutex<Option<SensorDataCallback>>,
    listening: AtomicBool,
}

impl Tap {
    pub(crate) fn new(name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            callback: Mutex::new(None),
            listening: AtomicBool::new(false),
        })
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    /// Current callback, if listening
    pub(crate) fn active_callback(&self) -> Option<SensorDataCallback> {
        if !self.listening.load(Ordering::Acquire) {
            return None;
        }
        self.callback
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub(crate) fn is_listening(&self) -> bool {
        self.listening.load(Ordering::Acquire)
    }
}

/// Mock sensor (or world) source
pub struct MockSensorSource {
    tap: Arc<Tap>,
    journal: Journal,
}

impl MockSensorSource {
    pub(crate) fn new(tap: Arc<Tap>, journal: Journal) -> Self {
        Self { tap, journal }
    }
}

impl SensorSource for MockSensorSource {
    fn sensor_id(&self) -> &str {
        self.tap.name()
    }

    fn listen(&self, callback: SensorDataCallback) {
        if self.tap.listening.swap(true, Ordering::AcqRel) {
            return;
        }
        *self
            .tap
            .callback
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(callback);
        debug!(sensor_id = %self.tap.name, "mock source listening");
        self.journal
            .record(HostEvent::Listening(self.tap.name.clone()));
    }

    fn stop(&self) {
        if self.tap.listening.swap(false, Ordering::AcqRel) {
            self.tap
                .callback
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take();
            debug!(sensor_id = %self.tap.name, "mock source stopped");
            self.journal
                .record(HostEvent::StoppedListening(self.tap.name.clone()));
        }
    }

    fn is_listening(&self) -> bool {
        self.tap.is_listening()
    }
}

/// Synthetic payload for `kind` at host step `step`
pub fn synthetic_payload(
    kind: SensorKind,
    width: u32,
    height: u32,
    events_per_frame: usize,
    step: u64,
) -> SensorPayload {
    match kind {
        SensorKind::Rgb | SensorKind::Gray => SensorPayload::Image(synthetic_image(width, height, step)),
        SensorKind::Dvs => {
            SensorPayload::DvsEvents(synthetic_events(width, height, events_per_frame, step))
        }
        SensorKind::OpticalFlow => SensorPayload::OpticalFlow(synthetic_flow(width, height)),
    }
}

/// BGRA gradient shifted by the step
fn synthetic_image(width: u32, height: u32, step: u64) -> ImageData {
    let mut buf = BytesMut::with_capacity((width * height * 4) as usize);
    for y in 0..height {
        for x in 0..width {
            let v = ((x as u64 + y as u64 + step) % 256) as u8;
            buf.put_slice(&[v, v / 2, v / 4, 255]);
        }
    }
    ImageData {
        width,
        height,
        format: ImageFormat::Bgra8,
        data: buf.freeze(),
    }
}

fn synthetic_events(width: u32, height: u32, count: usize, step: u64) -> DvsEventData {
    let mut buf = BytesMut::with_capacity(count * DVS_RECORD_SIZE);
    for i in 0..count {
        let x = (i as u32 % width.max(1)) as u16;
        let y = (i as u32 % height.max(1)) as u16;
        let t = (step * 1_000 + i as u64) as i64;
        buf.put_slice(&x.to_ne_bytes());
        buf.put_slice(&y.to_ne_bytes());
        buf.put_slice(&t.to_ne_bytes());
        buf.put_u8(u8::from(i % 2 == 0));
    }
    DvsEventData {
        width,
        height,
        data: buf.freeze(),
    }
}

/// Uniform flow of (0.1, -0.2) in normalized units
fn synthetic_flow(width: u32, height: u32) -> FlowData {
    let pixels = (width * height) as usize;
    let mut buf = BytesMut::with_capacity(pixels * 8);
    for _ in 0..pixels {
        buf.put_slice(&0.1f32.to_ne_bytes());
        buf.put_slice(&(-0.2f32).to_ne_bytes());
    }
    FlowData {
        width,
        height,
        data: buf.freeze(),
    }
}

/// Empty payload for callers that only care about timing
pub fn empty_payload() -> SensorPayload {
    SensorPayload::Raw(Bytes::new())
}
