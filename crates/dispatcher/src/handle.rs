//! SinkHandle - one sink behind its own bounded queue and worker task

use std::str::FromStr;
use std::sync::Arc;

use contracts::{DataSink, ExtractedFrameSet};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, instrument, warn};

use crate::metrics::{MetricsSnapshot, SinkMetrics};

/// What to do when a sink's queue is full
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OverflowPolicy {
    /// Drop the incoming frame-set and count it
    #[default]
    DropNewest,
    /// Wait for room, pushing back on the dispatcher
    Block,
}

impl FromStr for OverflowPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "drop_newest" => Ok(OverflowPolicy::DropNewest),
            "block" => Ok(OverflowPolicy::Block),
            other => Err(other.to_string()),
        }
    }
}

/// Handle to a running sink worker
pub struct SinkHandle {
    name: String,
    tx: mpsc::Sender<Arc<ExtractedFrameSet>>,
    policy: OverflowPolicy,
    metrics: Arc<SinkMetrics>,
    worker_handle: JoinHandle<()>,
}

impl SinkHandle {
    /// Spawn the worker task for `sink`
    pub fn spawn<S: DataSink + Send + 'static>(
        sink: S,
        queue_capacity: usize,
        policy: OverflowPolicy,
    ) -> Self {
        let name = sink.name().to_string();
        let (tx, rx) = mpsc::channel(queue_capacity.max(1));
        let metrics = Arc::new(SinkMetrics::new(name.clone()));

        let worker_metrics = Arc::clone(&metrics);
        let worker_name = name.clone();
        let worker_handle = tokio::spawn(async move {
            sink_worker(sink, rx, worker_metrics, worker_name).await;
        });

        Self {
            name,
            tx,
            policy,
            metrics,
            worker_handle,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn policy(&self) -> OverflowPolicy {
        self.policy
    }

    pub fn metrics(&self) -> &Arc<SinkMetrics> {
        &self.metrics
    }

    /// Queue a frame-set according to the overflow policy.
    ///
    /// Returns false if the frame-set was dropped.
    pub async fn send(&self, frame_set: Arc<ExtractedFrameSet>) -> bool {
        match self.policy {
            OverflowPolicy::DropNewest => self.try_send(frame_set),
            OverflowPolicy::Block => {
                let tick = frame_set.tick;
                if self.tx.send(frame_set).await.is_err() {
                    error!(sink = %self.name, %tick, "sink worker closed unexpectedly");
                    return false;
                }
                self.metrics
                    .set_queue_len(self.tx.max_capacity() - self.tx.capacity());
                true
            }
        }
    }

    /// Queue without waiting; a full queue drops the frame-set
    pub fn try_send(&self, frame_set: Arc<ExtractedFrameSet>) -> bool {
        match self.tx.try_send(frame_set) {
            Ok(()) => {
                self.metrics
                    .set_queue_len(self.tx.max_capacity() - self.tx.capacity());
                true
            }
            Err(mpsc::error::TrySendError::Full(f)) => {
                self.metrics.record_dropped();
                warn!(sink = %self.name, tick = %f.tick, "queue full, frame-set dropped");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                error!(sink = %self.name, "sink worker closed unexpectedly");
                false
            }
        }
    }

    /// Close the queue and wait for the worker to flush and close the sink
    #[instrument(name = "sink_handle_shutdown", skip(self), fields(sink = %self.name))]
    pub async fn shutdown(self) -> MetricsSnapshot {
        drop(self.tx);
        if let Err(e) = self.worker_handle.await {
            error!(sink = %self.name, error = ?e, "worker task panicked");
        }
        debug!(sink = %self.name, "sink handle shut down");
        self.metrics.snapshot()
    }
}

#[instrument(name = "sink_worker_loop", skip(sink, rx, metrics), fields(sink = %name))]
async fn sink_worker<S: DataSink>(
    mut sink: S,
    mut rx: mpsc::Receiver<Arc<ExtractedFrameSet>>,
    metrics: Arc<SinkMetrics>,
    name: String,
) {
    debug!("sink worker started");

    while let Some(frame_set) = rx.recv().await {
        metrics.set_queue_len(rx.len());

        match sink.write(&frame_set).await {
            Ok(()) => metrics.record_written(&frame_set),
            Err(e) => {
                metrics.record_failed();
                error!(tick = %frame_set.tick, error = %e, "write failed");
            }
        }
    }

    if let Err(e) = sink.flush().await {
        error!(error = %e, "flush failed on shutdown");
    }
    if let Err(e) = sink.close().await {
        error!(error = %e, "close failed on shutdown");
    }

    debug!("sink worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{ContractError, Tick};
    use std::sync::atomic::{AtomicU64, Ordering};
    use tokio::time::{sleep, Duration};

    struct MockSink {
        name: String,
        write_count: Arc<AtomicU64>,
        closed: Arc<AtomicU64>,
        should_fail: bool,
        delay_ms: u64,
    }

    impl MockSink {
        fn new(name: &str) -> Self {
            Self {
                name: name.to_string(),
                write_count: Arc::new(AtomicU64::new(0)),
                closed: Arc::new(AtomicU64::new(0)),
                should_fail: false,
                delay_ms: 0,
            }
        }
    }

    impl DataSink for MockSink {
        fn name(&self) -> &str {
            &self.name
        }

        async fn write(&mut self, _frame_set: &ExtractedFrameSet) -> Result<(), ContractError> {
            if self.delay_ms > 0 {
                sleep(Duration::from_millis(self.delay_ms)).await;
            }
            if self.should_fail {
                return Err(ContractError::sink_write(&self.name, "mock failure"));
            }
            self.write_count.fetch_add(1, Ordering::Relaxed);
            Ok(())
        }

        async fn flush(&mut self) -> Result<(), ContractError> {
            Ok(())
        }

        async fn close(&mut self) -> Result<(), ContractError> {
            self.closed.fetch_add(1, Ordering::Relaxed);
            Ok(())
        }
    }

    fn frame_set(i: u64) -> Arc<ExtractedFrameSet> {
        Arc::new(ExtractedFrameSet {
            tick: Tick::new(i),
            index: i,
            sim_time: i as f64 * 0.1,
            warmup: false,
            frames: Vec::new(),
            absent: Vec::new(),
        })
    }

    #[tokio::test]
    async fn test_sink_handle_basic() {
        let sink = MockSink::new("test");
        let write_count = Arc::clone(&sink.write_count);
        let closed = Arc::clone(&sink.closed);

        let handle = SinkHandle::spawn(sink, 10, OverflowPolicy::DropNewest);
        for i in 0..5 {
            assert!(handle.try_send(frame_set(i)));
        }

        let snapshot = handle.shutdown().await;
        assert_eq!(write_count.load(Ordering::Relaxed), 5);
        assert_eq!(snapshot.write_count, 5);
        assert_eq!(closed.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_drop_newest_on_full_queue() {
        let mut sink = MockSink::new("slow");
        sink.delay_ms = 100;

        let handle = SinkHandle::spawn(sink, 2, OverflowPolicy::DropNewest);
        for i in 0..10 {
            handle.send(frame_set(i)).await;
        }

        assert!(handle.metrics().snapshot().dropped_count > 0);
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_block_policy_loses_nothing() {
        let mut sink = MockSink::new("slow");
        sink.delay_ms = 5;
        let write_count = Arc::clone(&sink.write_count);

        let handle = SinkHandle::spawn(sink, 1, OverflowPolicy::Block);
        for i in 0..10 {
            assert!(handle.send(frame_set(i)).await);
        }

        let snapshot = handle.shutdown().await;
        assert_eq!(snapshot.dropped_count, 0);
        assert_eq!(write_count.load(Ordering::Relaxed), 10);
    }

    #[tokio::test]
    async fn test_sink_handle_failure_isolation() {
        let mut sink = MockSink::new("failing");
        sink.should_fail = true;

        let handle = SinkHandle::spawn(sink, 10, OverflowPolicy::DropNewest);
        for i in 0..3 {
            handle.try_send(frame_set(i));
        }

        let snapshot = handle.shutdown().await;
        assert_eq!(snapshot.failure_count, 3);
    }

    #[test]
    fn test_overflow_policy_parse() {
        assert_eq!("block".parse::<OverflowPolicy>(), Ok(OverflowPolicy::Block));
        assert_eq!(
            "drop_newest".parse::<OverflowPolicy>(),
            Ok(OverflowPolicy::DropNewest)
        );
        assert!("drop_oldest".parse::<OverflowPolicy>().is_err());
    }
}
