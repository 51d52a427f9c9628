//! Frame-set metrics and run-level aggregation
//!
//! Per-sensor read outcomes are counted by `frame_sync` itself; this module
//! adds scenario-level gauges and keeps an in-memory aggregate for the
//! end-of-run summary.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use contracts::{FrameSet, SlotStatus};
use metrics::{counter, gauge, histogram};

/// Record scenario-level gauges for one frame-set.
pub fn record_frame_set(frame_set: &FrameSet) {
    gauge!("scenario_last_tick").set(frame_set.tick.frame() as f64);
    gauge!("scenario_sim_time_seconds").set(frame_set.sim_time);
    gauge!("scenario_sensors_present").set(frame_set.present_count() as f64);

    if frame_set.world.snapshot.is_none() {
        counter!("scenario_world_missing_total").increment(1);
    }
}

/// Wall-time spent producing, extracting and dispatching one frame-set
pub fn record_loop_duration(elapsed: Duration) {
    histogram!("scenario_loop_duration_seconds").record(elapsed.as_secs_f64());
}

/// Outcome counts of one sensor over a run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SensorCounts {
    pub present: u64,
    pub warmup: u64,
    pub decimated: u64,
    pub timed_out: u64,
    pub stalled: u64,
    pub overtaken: u64,
    pub disconnected: u64,
}

impl SensorCounts {
    fn observe(&mut self, status: SlotStatus) {
        match status {
            SlotStatus::Present => self.present += 1,
            SlotStatus::WarmUp => self.warmup += 1,
            SlotStatus::Decimated => self.decimated += 1,
            SlotStatus::TimedOut { stalled } => {
                self.timed_out += 1;
                if stalled {
                    self.stalled += 1;
                }
            }
            SlotStatus::Overtaken => self.overtaken += 1,
            SlotStatus::Disconnected => self.disconnected += 1,
        }
    }

    /// Reads that were attempted (neither warm-up nor decimated)
    pub fn attempted(&self) -> u64 {
        self.present + self.timed_out + self.overtaken + self.disconnected
    }

    /// Share of attempted reads that matched, in percent
    pub fn presence_rate(&self) -> f64 {
        match self.attempted() {
            0 => 0.0,
            n => self.present as f64 / n as f64 * 100.0,
        }
    }
}

/// In-memory aggregate of every frame-set of a run
#[derive(Debug, Clone, Default)]
pub struct FrameSetAggregator {
    pub ticks: u64,
    pub warmup_ticks: u64,
    pub world_missing: u64,
    pub last_sim_time: f64,
    /// Tick wall-time in milliseconds
    pub tick_stats: RunningStats,
    pub sensors: BTreeMap<String, SensorCounts>,
}

impl FrameSetAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, frame_set: &FrameSet, tick_duration: Duration) {
        self.ticks += 1;
        if frame_set.warmup {
            self.warmup_ticks += 1;
        }
        if frame_set.world.snapshot.is_none() {
            self.world_missing += 1;
        }
        self.last_sim_time = frame_set.sim_time;
        self.tick_stats.push(tick_duration.as_secs_f64() * 1000.0);

        for slot in &frame_set.slots {
            self.sensors
                .entry(slot.sensor.to_string())
                .or_default()
                .observe(slot.status);
        }
    }

    pub fn summary(&self) -> MetricsSummary {
        MetricsSummary {
            ticks: self.ticks,
            warmup_ticks: self.warmup_ticks,
            world_missing: self.world_missing,
            sim_time: self.last_sim_time,
            tick_ms: StatsSummary::from(&self.tick_stats),
            sensors: self.sensors.clone(),
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[derive(Debug, Clone, Default)]
pub struct MetricsSummary {
    pub ticks: u64,
    pub warmup_ticks: u64,
    pub world_missing: u64,
    pub sim_time: f64,
    pub tick_ms: StatsSummary,
    pub sensors: BTreeMap<String, SensorCounts>,
}

impl fmt::Display for MetricsSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Frame-Set Summary ===")?;
        writeln!(
            f,
            "Ticks: {} ({} warm-up), sim time {:.3}s",
            self.ticks, self.warmup_ticks, self.sim_time
        )?;
        if self.world_missing > 0 {
            writeln!(f, "World snapshot missing: {}", self.world_missing)?;
        }
        writeln!(f, "Tick wall-time (ms): {}", self.tick_ms)?;

        for (sensor, c) in &self.sensors {
            writeln!(
                f,
                "  {sensor}: present={} ({:.1}%), decimated={}, timed_out={}, stalled={}, overtaken={}",
                c.present,
                c.presence_rate(),
                c.decimated,
                c.timed_out,
                c.stalled,
                c.overtaken
            )?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct StatsSummary {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
}

impl From<&RunningStats> for StatsSummary {
    fn from(stats: &RunningStats) -> Self {
        Self {
            count: stats.count,
            min: stats.min,
            max: stats.max,
            mean: stats.mean(),
            std_dev: stats.std_dev(),
        }
    }
}

impl fmt::Display for StatsSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.count == 0 {
            return write!(f, "N/A");
        }
        write!(
            f,
            "min={:.3}, max={:.3}, mean={:.3}, std={:.3} (n={})",
            self.min, self.max, self.mean, self.std_dev, self.count
        )
    }
}

/// Online mean / variance (Welford)
#[derive(Debug, Clone, Default)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl RunningStats {
    pub fn push(&mut self, value: f64) {
        self.count += 1;
        if self.count == 1 {
            self.min = value;
            self.max = value;
            self.mean = value;
            self.m2 = 0.0;
            return;
        }

        self.min = self.min.min(value);
        self.max = self.max.max(value);
        let delta = value - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (value - self.mean);
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.mean
        }
    }

    /// Sample variance
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / (self.count - 1) as f64
        }
    }

    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }
}
