//! CARLA measurement conversion
//!
//! Turns native CARLA sensor data into `RawSensorFrame`s. Only compiled with
//! the `real-carla` feature.

use bytes::{BufMut, Bytes, BytesMut};
use carla::sensor::data::{DVSEventArray, Image, OpticalFlowImage};
use carla::sensor::{SensorData, SensorDataBase};
use contracts::{
    DvsEventData, FlowData, ImageData, ImageFormat, RawSensorFrame, SensorKind, SensorPayload,
    Tick,
};

use crate::mock_sensor::DVS_RECORD_SIZE;

fn image_to_payload(image: &Image) -> SensorPayload {
    SensorPayload::Image(ImageData {
        width: image.width() as u32,
        height: image.height() as u32,
        format: ImageFormat::Bgra8,
        data: Bytes::copy_from_slice(image.as_raw_bytes()),
    })
}

/// Events are repacked into 13-byte records: x u16, y u16, t i64, polarity u8.
fn events_to_payload(events: &DVSEventArray) -> SensorPayload {
    let slice = events.as_slice();
    let mut buf = BytesMut::with_capacity(slice.len() * DVS_RECORD_SIZE);
    for event in slice {
        buf.put_slice(&event.x.to_ne_bytes());
        buf.put_slice(&event.y.to_ne_bytes());
        buf.put_slice(&event.t.to_ne_bytes());
        buf.put_u8(u8::from(event.pol));
    }
    SensorPayload::DvsEvents(DvsEventData {
        width: events.width() as u32,
        height: events.height() as u32,
        data: buf.freeze(),
    })
}

fn flow_to_payload(flow: &OpticalFlowImage) -> SensorPayload {
    let pixels = flow.as_slice();
    let mut buf = BytesMut::with_capacity(pixels.len() * 8);
    for pixel in pixels {
        buf.put_slice(&pixel.x.to_ne_bytes());
        buf.put_slice(&pixel.y.to_ne_bytes());
    }
    SensorPayload::OpticalFlow(FlowData {
        width: flow.width() as u32,
        height: flow.height() as u32,
        data: buf.freeze(),
    })
}

/// Convert a CARLA measurement for the given sensor kind
///
/// Returns `None` when the measurement type does not match the kind.
pub fn convert_sensor_data(
    sensor_id: &str,
    kind: SensorKind,
    data: &SensorData,
) -> Option<RawSensorFrame> {
    let payload = match kind {
        SensorKind::Rgb | SensorKind::Gray => {
            image_to_payload(&Image::try_from(data.clone()).ok()?)
        }
        SensorKind::Dvs => events_to_payload(&DVSEventArray::try_from(data.clone()).ok()?),
        SensorKind::OpticalFlow => {
            flow_to_payload(&OpticalFlowImage::try_from(data.clone()).ok()?)
        }
    };

    Some(RawSensorFrame {
        sensor: sensor_id.into(),
        tick: Tick::new(data.frame() as u64),
        timestamp: data.timestamp(),
        payload,
    })
}
