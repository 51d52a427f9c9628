//! # Dispatcher
//!
//! Fans extracted frame-sets out to sinks. Every sink runs behind its own
//! bounded queue and worker task, so a slow or failing sink never stalls
//! the scenario loop.

pub mod dispatcher;
pub mod error;
pub mod handle;
pub mod metrics;
pub mod sinks;

pub use contracts::{DataSink, ExtractedFrameSet};
pub use dispatcher::{
    create_dispatcher, DispatchReport, Dispatcher, DispatcherBuilder, DispatcherConfig,
    OVERFLOW_PARAM,
};
pub use error::{DispatcherError, Result};
pub use handle::{OverflowPolicy, SinkHandle};
pub use metrics::{MetricsSnapshot, SinkMetrics};
pub use sinks::{
    DatasetIndex, FileSink, FileSinkConfig, FrameRecord, LogSink, TimeOffset, INDEX_FILE,
    PROPS_FILE,
};
