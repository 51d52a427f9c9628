//! Per-tick status output

use std::time::Duration;

use contracts::{FrameSet, SlotStatus};
use tracing::{debug, info};

/// Refreshed once per frame-set, after it has been dispatched
pub trait DisplayRefresh: Send {
    fn refresh(&mut self, frame_set: &FrameSet, sim_time: f64, wall_time: Duration);

    /// Called once during cleanup
    fn close(&mut self) {}
}

/// Logs sensor presence, simulated and wall time.
///
/// Every `every`-th frame-set goes out at info level, the rest at debug.
#[derive(Debug, Clone)]
pub struct StatusDisplay {
    every: u64,
    refreshed: u64,
}

impl StatusDisplay {
    pub fn new(every: u64) -> Self {
        Self {
            every: every.max(1),
            refreshed: 0,
        }
    }

    pub fn refreshed(&self) -> u64 {
        self.refreshed
    }
}

impl Default for StatusDisplay {
    fn default() -> Self {
        Self::new(25)
    }
}

fn presence(frame_set: &FrameSet) -> String {
    frame_set
        .slots
        .iter()
        .map(|slot| {
            let mark = match slot.status {
                SlotStatus::Present => "yes",
                SlotStatus::WarmUp => "warmup",
                SlotStatus::Decimated => "-",
                SlotStatus::TimedOut { stalled: true } => "stalled",
                SlotStatus::TimedOut { stalled: false } => "no",
                SlotStatus::Overtaken => "missed",
                SlotStatus::Disconnected => "gone",
            };
            format!("{}={}", slot.sensor, mark)
        })
        .collect::<Vec<_>>()
        .join(" ")
}

impl DisplayRefresh for StatusDisplay {
    fn refresh(&mut self, frame_set: &FrameSet, sim_time: f64, wall_time: Duration) {
        let sensors = presence(frame_set);
        if self.refreshed % self.every == 0 {
            info!(
                tick = %frame_set.tick,
                sensors = %sensors,
                sim_time = format!("{sim_time:.3}"),
                wall_time = format!("{:.3}", wall_time.as_secs_f64()),
                "frame-set"
            );
        } else {
            debug!(tick = %frame_set.tick, sensors = %sensors, sim_time, "frame-set");
        }
        self.refreshed += 1;
    }

    fn close(&mut self) {
        debug!(refreshed = self.refreshed, "status display closed");
    }
}
