//! Sensor handle - policy-gated pull side of one sensor queue

use std::time::Duration;

use async_channel::Receiver;
use contracts::{RawSensorFrame, SensorId, SensorKind, SensorSlot, SlotStatus, Tick};
use metrics::counter;
use tracing::{debug, instrument, trace, warn};

use crate::decimation::Decimation;
use crate::queue::{FrameQueue, MatchOutcome};

/// Per-sensor read counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HandleStats {
    pub present: u64,
    pub warmup: u64,
    pub decimated: u64,
    pub timed_out: u64,
    pub overtaken: u64,
    pub stale_discarded: u64,
}

/// Runtime companion of a sensor descriptor.
///
/// The host callback is the only producer of the queue; the synchronizer is the
/// only caller of `read`, so the decimation state has a single mutator.
pub struct SensorHandle {
    id: SensorId,
    kind: SensorKind,
    queue: FrameQueue,
    decimation: Decimation,
    consecutive_timeouts: u32,
    stall_threshold: u32,
    stats: HandleStats,
}

impl SensorHandle {
    pub fn new(
        id: SensorId,
        kind: SensorKind,
        period: u32,
        stall_threshold: u32,
        rx: Receiver<RawSensorFrame>,
    ) -> Self {
        Self {
            queue: FrameQueue::new(id.clone(), rx),
            id,
            kind,
            decimation: Decimation::new(period),
            consecutive_timeouts: 0,
            stall_threshold: stall_threshold.max(1),
            stats: HandleStats::default(),
        }
    }

    pub fn id(&self) -> &SensorId {
        &self.id
    }

    pub fn kind(&self) -> SensorKind {
        self.kind
    }

    pub fn decimation(&self) -> &Decimation {
        &self.decimation
    }

    pub fn stats(&self) -> HandleStats {
        HandleStats {
            stale_discarded: self.queue.discarded(),
            ..self.stats
        }
    }

    /// Frames waiting in the queue
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Slot for a warm-up tick. The queue is not touched.
    pub fn warm_up(&mut self) -> SensorSlot {
        self.stats.warmup += 1;
        self.slot(SlotStatus::WarmUp, None)
    }

    /// Read the frame for `tick`.
    ///
    /// Decimated ticks return immediately. Otherwise frames are popped, each
    /// pop bounded by `timeout`, until one carries `tick`. Older frames are
    /// discarded; a newer one is kept for a later read and this tick is
    /// reported as overtaken.
    #[instrument(
        level = "trace",
        name = "sensor_handle_read",
        skip(self, timeout),
        fields(sensor = %self.id, tick = %tick)
    )]
    pub async fn read(&mut self, tick: Tick, timeout: Duration) -> SensorSlot {
        if !self.decimation.begin_tick() {
            self.stats.decimated += 1;
            trace!("decimated");
            return self.slot(SlotStatus::Decimated, None);
        }

        match self.queue.match_tick(tick, timeout).await {
            MatchOutcome::Matched(frame) => {
                self.decimation.on_match();
                self.consecutive_timeouts = 0;
                self.stats.present += 1;
                counter!("frame_sync_sensor_present_total", "sensor" => self.id.to_string())
                    .increment(1);
                self.slot(SlotStatus::Present, Some(frame))
            }
            MatchOutcome::Overtaken => {
                self.stats.overtaken += 1;
                debug!(
                    pending = ?self.queue.pending_tick(),
                    "newer frame arrived first, frame for tick lost"
                );
                self.slot(SlotStatus::Overtaken, None)
            }
            MatchOutcome::TimedOut => {
                let stalled = self.record_timeout(tick, timeout);
                self.slot(SlotStatus::TimedOut { stalled }, None)
            }
            MatchOutcome::Disconnected => {
                warn!("sensor queue disconnected");
                self.slot(SlotStatus::Disconnected, None)
            }
        }
    }

    fn record_timeout(&mut self, tick: Tick, timeout: Duration) -> bool {
        self.stats.timed_out += 1;
        self.consecutive_timeouts += 1;
        counter!("frame_sync_sensor_timeout_total", "sensor" => self.id.to_string()).increment(1);

        let stalled = self.consecutive_timeouts >= self.stall_threshold;
        if self.consecutive_timeouts == self.stall_threshold {
            counter!("frame_sync_sensor_stalled_total", "sensor" => self.id.to_string())
                .increment(1);
            warn!(
                %tick,
                consecutive = self.consecutive_timeouts,
                timeout_ms = timeout.as_millis() as u64,
                "sensor stalled"
            );
        } else {
            debug!(%tick, consecutive = self.consecutive_timeouts, "sensor read timed out");
        }
        stalled
    }

    fn slot(&self, status: SlotStatus, frame: Option<RawSensorFrame>) -> SensorSlot {
        SensorSlot {
            sensor: self.id.clone(),
            status,
            frame,
        }
    }
}

impl std::fmt::Debug for SensorHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SensorHandle")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("decimation", &self.decimation)
            .field("queued", &self.queue.len())
            .field("consecutive_timeouts", &self.consecutive_timeouts)
            .finish()
    }
}
