//! LogSink - per-tick presence report via tracing

use contracts::{ContractError, DataSink, ExtractedFrameSet};
use tracing::{info, instrument};

pub struct LogSink {
    name: String,
    written: u64,
}

impl LogSink {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            written: 0,
        }
    }

    fn log_presence(&self, frame_set: &ExtractedFrameSet) {
        let present: Vec<&str> = frame_set.frames.iter().map(|f| f.sensor.as_str()).collect();
        let absent: Vec<&str> = frame_set.absent.iter().map(|s| s.as_str()).collect();

        info!(
            sink = %self.name,
            tick = %frame_set.tick,
            index = frame_set.index,
            sim_time = frame_set.sim_time,
            warmup = frame_set.warmup,
            present = ?present,
            absent = ?absent,
            "frame-set"
        );
    }
}

impl DataSink for LogSink {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(
        level = "trace",
        name = "log_sink_write",
        skip(self, frame_set),
        fields(sink = %self.name, tick = %frame_set.tick)
    )]
    async fn write(&mut self, frame_set: &ExtractedFrameSet) -> Result<(), ContractError> {
        self.log_presence(frame_set);
        self.written += 1;
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), ContractError> {
        Ok(())
    }

    #[instrument(name = "log_sink_close", skip(self))]
    async fn close(&mut self) -> Result<(), ContractError> {
        info!(sink = %self.name, frame_sets = self.written, "LogSink closed");
        Ok(())
    }
}
