//! Per-sink counters
//!
//! Updated by the handle on enqueue and by the worker after each write.
//! Besides frame-set counts the sink tracks how many sensor frames it wrote
//! and the last tick it got through, so a report shows how far each output
//! got when a run stops early.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use contracts::{ExtractedFrameSet, Tick};
use metrics::counter;

/// `last_tick` holds `frame + 1`; zero means nothing written yet
const NO_TICK: u64 = 0;

#[derive(Debug)]
pub struct SinkMetrics {
    sink: String,
    queue_len: AtomicUsize,
    write_count: AtomicU64,
    frames_written: AtomicU64,
    failure_count: AtomicU64,
    /// Frame-sets dropped because the queue was full
    dropped_count: AtomicU64,
    last_tick: AtomicU64,
}

impl SinkMetrics {
    pub fn new(sink: impl Into<String>) -> Self {
        Self {
            sink: sink.into(),
            queue_len: AtomicUsize::new(0),
            write_count: AtomicU64::new(0),
            frames_written: AtomicU64::new(0),
            failure_count: AtomicU64::new(0),
            dropped_count: AtomicU64::new(0),
            last_tick: AtomicU64::new(NO_TICK),
        }
    }

    pub fn sink(&self) -> &str {
        &self.sink
    }

    pub fn queue_len(&self) -> usize {
        self.queue_len.load(Ordering::Relaxed)
    }

    pub(crate) fn set_queue_len(&self, len: usize) {
        self.queue_len.store(len, Ordering::Relaxed);
    }

    /// A frame-set went through `DataSink::write`
    pub(crate) fn record_written(&self, frame_set: &ExtractedFrameSet) {
        self.write_count.fetch_add(1, Ordering::Relaxed);
        self.frames_written
            .fetch_add(frame_set.frames.len() as u64, Ordering::Relaxed);
        self.last_tick
            .fetch_max(frame_set.tick.frame().saturating_add(1), Ordering::Relaxed);
        counter!("dispatcher_frames_written_total", "sink" => self.sink.clone()).increment(1);
    }

    pub(crate) fn record_failed(&self) {
        self.failure_count.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_dropped(&self) {
        self.dropped_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn last_tick(&self) -> Option<Tick> {
        match self.last_tick.load(Ordering::Relaxed) {
            NO_TICK => None,
            stored => Some(Tick::new(stored - 1)),
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            queue_len: self.queue_len(),
            write_count: self.write_count.load(Ordering::Relaxed),
            frames_written: self.frames_written.load(Ordering::Relaxed),
            failure_count: self.failure_count.load(Ordering::Relaxed),
            dropped_count: self.dropped_count.load(Ordering::Relaxed),
            last_tick: self.last_tick(),
        }
    }
}

/// Point-in-time copy of `SinkMetrics`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub queue_len: usize,
    /// Frame-sets written
    pub write_count: u64,
    /// Sensor frames inside the written frame-sets
    pub frames_written: u64,
    pub failure_count: u64,
    pub dropped_count: u64,
    pub last_tick: Option<Tick>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{ExtractedData, ExtractedFrame, SensorKind};

    fn frame_set(tick: u64, events: usize) -> ExtractedFrameSet {
        ExtractedFrameSet {
            tick: Tick::new(tick),
            index: tick,
            sim_time: 0.0,
            warmup: false,
            frames: (0..events)
                .map(|i| ExtractedFrame {
                    sensor: format!("dvs{i}").as_str().into(),
                    kind: SensorKind::Dvs,
                    tick: Tick::new(tick),
                    timestamp: 0.0,
                    data: ExtractedData::Events(Vec::new()),
                })
                .collect(),
            absent: Vec::new(),
        }
    }

    #[test]
    fn test_written_frame_sets() {
        let metrics = SinkMetrics::new("dataset");
        assert_eq!(metrics.last_tick(), None);

        metrics.record_written(&frame_set(0, 2));
        metrics.record_written(&frame_set(7, 0));
        metrics.record_written(&frame_set(3, 1));
        metrics.record_dropped();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.write_count, 3);
        assert_eq!(snapshot.frames_written, 3);
        assert_eq!(snapshot.dropped_count, 1);
        assert_eq!(snapshot.failure_count, 0);
        assert_eq!(snapshot.last_tick, Some(Tick::new(7)));
    }
}
