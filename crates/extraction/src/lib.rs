//! # Extraction
//!
//! Converts raw host payloads into output data: RGB and grayscale images,
//! decoded DVS events and optical flow in pixel units.

mod error;
mod extract;
mod extractor;

pub use error::{ExtractionError, Result};
pub use extract::{extract_events, extract_flow, extract_gray, extract_rgb, DVS_RECORD_SIZE};
pub use extractor::{ExtractionStats, Extractor};
