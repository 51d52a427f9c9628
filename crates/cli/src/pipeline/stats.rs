//! End-of-run summary

use std::fmt;
use std::time::Duration;

use dispatcher::DispatchReport;
use extraction::ExtractionStats;
use frame_sync::ScopeSummary;
use observability::MetricsSummary;
use sim_host::TeardownReport;

/// Why the scenario loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Record or replay span fully covered
    Completed,
    /// Quit signal observed between ticks
    Quit,
    /// `max_ticks` reached
    TickLimit,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StopReason::Completed => "completed",
            StopReason::Quit => "quit",
            StopReason::TickLimit => "tick limit",
        })
    }
}

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub mode: &'static str,
    pub stop: StopReason,
    pub wall_time: Duration,
    pub frames: MetricsSummary,
    pub scope: Option<ScopeSummary>,
    pub extraction: ExtractionStats,
    pub teardown: TeardownReport,
    pub dispatch: DispatchReport,
}

impl RunSummary {
    pub fn ticks(&self) -> u64 {
        self.frames.ticks
    }

    /// Simulated seconds per wall second
    pub fn realtime_factor(&self) -> f64 {
        let wall = self.wall_time.as_secs_f64();
        if wall > 0.0 {
            self.frames.sim_time / wall
        } else {
            0.0
        }
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Scenario Run ({}) ===", self.mode)?;
        writeln!(f, "Stopped: {}", self.stop)?;
        writeln!(
            f,
            "Wall time: {:.2}s (x{:.2} real time)",
            self.wall_time.as_secs_f64(),
            self.realtime_factor()
        )?;
        write!(f, "{}", self.frames)?;

        if let Some(scope) = &self.scope {
            let discarded: u64 = scope.sensors.iter().map(|(_, s)| s.stale_discarded).sum();
            if discarded > 0 {
                writeln!(f, "Stale frames discarded: {discarded}")?;
            }
        }
        writeln!(
            f,
            "Extraction: {} frames, {} errors",
            self.extraction.extracted, self.extraction.errors
        )?;
        writeln!(
            f,
            "Teardown: {} destroyed, {} failed",
            self.teardown.destroyed,
            self.teardown.failed.len()
        )?;
        writeln!(f, "Dispatched frame-sets: {}", self.dispatch.frame_sets)?;
        for (sink, m) in &self.dispatch.sinks {
            writeln!(
                f,
                "  {sink}: written={} ({} frames), failed={}, dropped={}",
                m.write_count, m.frames_written, m.failure_count, m.dropped_count
            )?;
            if let Some(tick) = m.last_tick {
                writeln!(f, "    last tick: {tick}")?;
            }
        }
        Ok(())
    }
}
