//! Payload extractors
//!
//! Pure conversions from host payloads to the output representations.

use bytemuck::{Pod, Zeroable};
use contracts::{
    DvsEvent, DvsEventData, FlowData, FlowField, GrayImage, ImageData, ImageFormat, RgbImage,
};

use crate::error::{ExtractionError, Result};

/// Size of one packed DVS record
pub const DVS_RECORD_SIZE: usize = std::mem::size_of::<RawDvsEvent>();

const FLOW_PIXEL_SIZE: usize = std::mem::size_of::<[f32; 2]>();

/// ITU-R BT.601 luma weights for R, G, B
const LUMA: [f32; 3] = [0.299, 0.587, 0.114];

/// Host layout of one DVS event
#[derive(Clone, Copy, Pod, Zeroable)]
#[repr(C, packed)]
struct RawDvsEvent {
    x: u16,
    y: u16,
    t: i64,
    pol: u8,
}

fn check_len(what: &'static str, expected: usize, actual: usize) -> Result<()> {
    if expected == actual {
        Ok(())
    } else {
        Err(ExtractionError::Malformed {
            what,
            expected,
            actual,
        })
    }
}

/// Iterate pixels as (r, g, b)
fn rgb_pixels(image: &ImageData) -> Result<impl Iterator<Item = [u8; 3]> + '_> {
    let expected = image.width as usize * image.height as usize * 4;
    check_len("image", expected, image.data.len())?;
    let format = image.format;
    Ok(image.data.chunks_exact(4).map(move |px| match format {
        ImageFormat::Bgra8 => [px[2], px[1], px[0]],
        ImageFormat::Rgba8 => [px[0], px[1], px[2]],
    }))
}

/// Drop alpha and put channels in RGB order
pub fn extract_rgb(image: &ImageData) -> Result<RgbImage> {
    let mut data = Vec::with_capacity(image.width as usize * image.height as usize * 3);
    for px in rgb_pixels(image)? {
        data.extend_from_slice(&px);
    }
    Ok(RgbImage {
        width: image.width,
        height: image.height,
        data,
    })
}

/// Luma of the RGB channels, rounded to u8
pub fn extract_gray(image: &ImageData) -> Result<GrayImage> {
    let data = rgb_pixels(image)?
        .map(|[r, g, b]| {
            let y = LUMA[0] * f32::from(r) + LUMA[1] * f32::from(g) + LUMA[2] * f32::from(b);
            y.round().clamp(0.0, 255.0) as u8
        })
        .collect();
    Ok(GrayImage {
        width: image.width,
        height: image.height,
        data,
    })
}

/// Decode packed event records
pub fn extract_events(events: &DvsEventData) -> Result<Vec<DvsEvent>> {
    let len = events.data.len();
    if len % DVS_RECORD_SIZE != 0 {
        return Err(ExtractionError::Malformed {
            what: "dvs",
            expected: len - len % DVS_RECORD_SIZE,
            actual: len,
        });
    }
    Ok(events
        .data
        .chunks_exact(DVS_RECORD_SIZE)
        .map(|chunk| {
            let raw: RawDvsEvent = bytemuck::pod_read_unaligned(chunk);
            let (x, y, t, pol) = (raw.x, raw.y, raw.t, raw.pol);
            DvsEvent {
                x,
                y,
                t,
                polarity: pol != 0,
            }
        })
        .collect())
}

/// Scale normalized flow to pixels: x by `-width / 2`, y by `height / 2`
pub fn extract_flow(flow: &FlowData) -> Result<FlowField> {
    let expected = flow.width as usize * flow.height as usize * FLOW_PIXEL_SIZE;
    check_len("optical_flow", expected, flow.data.len())?;

    let sx = flow.width as f32 * -0.5;
    let sy = flow.height as f32 * 0.5;
    let vectors = flow
        .data
        .chunks_exact(FLOW_PIXEL_SIZE)
        .map(|chunk| {
            let [x, y]: [f32; 2] = bytemuck::pod_read_unaligned(chunk);
            [x * sx, y * sy]
        })
        .collect();
    Ok(FlowField {
        width: flow.width,
        height: flow.height,
        vectors,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::{BufMut, Bytes, BytesMut};

    fn image(format: ImageFormat, pixels: &[[u8; 4]], width: u32) -> ImageData {
        ImageData {
            width,
            height: pixels.len() as u32 / width,
            format,
            data: Bytes::from(pixels.concat()),
        }
    }

    #[test]
    fn test_record_size_matches_host_layout() {
        assert_eq!(DVS_RECORD_SIZE, 13);
    }

    #[test]
    fn test_rgb_reverses_bgra() {
        let img = image(ImageFormat::Bgra8, &[[1, 2, 3, 255], [10, 20, 30, 0]], 2);
        let rgb = extract_rgb(&img).unwrap();
        assert_eq!(rgb.data, vec![3, 2, 1, 30, 20, 10]);
        assert_eq!((rgb.width, rgb.height), (2, 1));
    }

    #[test]
    fn test_rgb_keeps_rgba_order() {
        let img = image(ImageFormat::Rgba8, &[[1, 2, 3, 255]], 1);
        assert_eq!(extract_rgb(&img).unwrap().data, vec![1, 2, 3]);
    }

    #[test]
    fn test_gray_weights() {
        // BGRA: pure red, pure green, pure blue, white
        let img = image(
            ImageFormat::Bgra8,
            &[
                [0, 0, 255, 255],
                [0, 255, 0, 255],
                [255, 0, 0, 255],
                [255, 255, 255, 255],
            ],
            2,
        );
        let gray = extract_gray(&img).unwrap();
        assert_eq!(gray.data, vec![76, 150, 29, 255]);
        assert_eq!((gray.width, gray.height), (2, 2));
    }

    #[test]
    fn test_short_image_rejected() {
        let mut img = image(ImageFormat::Bgra8, &[[0, 0, 0, 0]; 4], 2);
        img.height = 3;
        assert!(matches!(
            extract_gray(&img),
            Err(ExtractionError::Malformed {
                expected: 24,
                actual: 16,
                ..
            })
        ));
    }

    #[test]
    fn test_events_decode() {
        let mut buf = BytesMut::new();
        for (x, y, t, pol) in [(3u16, 4u16, 1_000i64, true), (5, 6, -2, false)] {
            buf.put_slice(&x.to_ne_bytes());
            buf.put_slice(&y.to_ne_bytes());
            buf.put_slice(&t.to_ne_bytes());
            buf.put_u8(u8::from(pol));
        }
        let data = DvsEventData {
            width: 8,
            height: 8,
            data: buf.freeze(),
        };

        let events = extract_events(&data).unwrap();
        assert_eq!(
            events,
            vec![
                DvsEvent { x: 3, y: 4, t: 1_000, polarity: true },
                DvsEvent { x: 5, y: 6, t: -2, polarity: false },
            ]
        );
    }

    #[test]
    fn test_events_truncated_record() {
        let data = DvsEventData {
            width: 1,
            height: 1,
            data: Bytes::from(vec![0u8; 20]),
        };
        assert!(extract_events(&data).is_err());
    }

    #[test]
    fn test_flow_scaling() {
        let mut buf = BytesMut::new();
        for _ in 0..6 {
            buf.put_slice(&0.5f32.to_ne_bytes());
            buf.put_slice(&(-0.25f32).to_ne_bytes());
        }
        let flow = FlowData {
            width: 3,
            height: 2,
            data: buf.freeze(),
        };

        let field = extract_flow(&flow).unwrap();
        assert_eq!(field.vectors.len(), 6);
        assert_eq!(field.vectors[0], [0.5 * 3.0 * -0.5, -0.25 * 2.0 * 0.5]);
    }

    #[test]
    fn test_gray_of_random_image_stays_in_range() {
        use rand::Rng;
        let mut rng = rand::rng();
        let pixels: Vec<[u8; 4]> = (0..64).map(|_| rng.random()).collect();
        let img = image(ImageFormat::Bgra8, &pixels, 8);

        let gray = extract_gray(&img).unwrap();
        for (px, y) in pixels.iter().zip(&gray.data) {
            let max = px[..3].iter().copied().max().unwrap_or(0);
            let min = px[..3].iter().copied().min().unwrap_or(0);
            assert!(*y >= min && *y <= max);
        }
    }
}
