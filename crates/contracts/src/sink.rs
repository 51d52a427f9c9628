//! DataSink trait - Dispatcher output interface

use crate::{ContractError, ExtractedFrameSet};

/// Data output trait
///
/// All sink implementations must implement this trait.
#[trait_variant::make(DataSink: Send)]
pub trait LocalDataSink {
    /// Sink name (used for logging/metrics)
    fn name(&self) -> &str;

    /// Write one extracted frame-set
    async fn write(&mut self, frame_set: &ExtractedFrameSet) -> Result<(), ContractError>;

    /// Flush buffer (if any)
    async fn flush(&mut self) -> Result<(), ContractError>;

    /// Close sink, writing any trailing index files
    async fn close(&mut self) -> Result<(), ContractError>;
}
