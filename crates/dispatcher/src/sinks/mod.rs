//! Sink implementations

mod file;
mod log;

pub use self::file::{
    DatasetIndex, FileSink, FileSinkConfig, FrameRecord, TimeOffset, INDEX_FILE, PROPS_FILE,
};
pub use self::log::LogSink;
