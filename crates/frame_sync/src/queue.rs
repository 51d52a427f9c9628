//! Tick-matching frame queue
//!
//! Consumer end of one host callback. Frames arrive in tick order; a match
//! pops until it sees the requested tick, dropping older frames.

use std::cmp::Ordering;
use std::time::Duration;

use async_channel::Receiver;
use contracts::{RawSensorFrame, SensorId, Tick};
use metrics::counter;
use tracing::trace;

#[derive(Debug)]
pub enum MatchOutcome {
    Matched(RawSensorFrame),
    /// A frame for a later tick arrived first
    Overtaken,
    TimedOut,
    Disconnected,
}

pub struct FrameQueue {
    id: SensorId,
    rx: Receiver<RawSensorFrame>,
    /// Newer than the last requested tick, held for the next match
    pending: Option<RawSensorFrame>,
    discarded: u64,
}

impl FrameQueue {
    pub fn new(id: SensorId, rx: Receiver<RawSensorFrame>) -> Self {
        Self {
            id,
            rx,
            pending: None,
            discarded: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.rx.len() + usize::from(self.pending.is_some())
    }

    /// Stale frames dropped so far
    pub fn discarded(&self) -> u64 {
        self.discarded
    }

    pub fn pending_tick(&self) -> Option<Tick> {
        self.pending.as_ref().map(|f| f.tick)
    }

    /// Pop until a frame for `tick` shows up. Every pop waits at most `timeout`.
    pub async fn match_tick(&mut self, tick: Tick, timeout: Duration) -> MatchOutcome {
        if let Some(frame) = self.pending.take() {
            if let Some(outcome) = self.classify(frame, tick) {
                return outcome;
            }
        }

        loop {
            let frame = match tokio::time::timeout(timeout, self.rx.recv()).await {
                Ok(Ok(frame)) => frame,
                Ok(Err(_)) => return MatchOutcome::Disconnected,
                Err(_) => return MatchOutcome::TimedOut,
            };
            if let Some(outcome) = self.classify(frame, tick) {
                return outcome;
            }
        }
    }

    /// `None` when the frame was stale and dropped
    fn classify(&mut self, frame: RawSensorFrame, tick: Tick) -> Option<MatchOutcome> {
        match frame.tick.cmp(&tick) {
            Ordering::Equal => Some(MatchOutcome::Matched(frame)),
            Ordering::Greater => {
                self.pending = Some(frame);
                Some(MatchOutcome::Overtaken)
            }
            Ordering::Less => {
                self.discarded += 1;
                counter!("frame_sync_stale_discarded_total", "sensor" => self.id.to_string())
                    .increment(1);
                trace!(sensor = %self.id, stale = %frame.tick, wanted = %tick, "discarding stale frame");
                None
            }
        }
    }
}
