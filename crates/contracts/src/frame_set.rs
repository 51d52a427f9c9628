//! FrameSet - Frame Synchronizer output
//!
//! Exactly one `FrameSet` per tick. Every registered sensor has a slot, in
//! registration order; the world entry is always present.

use serde::{Deserialize, Serialize};

use crate::{RawSensorFrame, SensorId, Tick, WorldSnapshot};

/// Reserved key of the world entry
pub const WORLD_KEY: &str = "world";

/// Per-tick collection of sensor frames
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameSet {
    /// Host tick this set belongs to
    pub tick: Tick,

    /// Zero-based tick index since the scope was entered
    pub index: u64,

    /// Simulated seconds elapsed since the scope was entered
    pub sim_time: f64,

    /// Produced inside the warm-up window
    pub warmup: bool,

    pub world: WorldEntry,

    /// One slot per sensor, in registration order
    pub slots: Vec<SensorSlot>,
}

/// The world entry of a frame-set
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorldEntry {
    pub tick: Tick,

    /// World snapshot delivered by the host for this tick, if it arrived
    pub snapshot: Option<WorldSnapshot>,
}

/// A sensor's slot in a frame-set
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensorSlot {
    pub sensor: SensorId,
    pub status: SlotStatus,
    pub frame: Option<RawSensorFrame>,
}

/// Why a slot is (not) filled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotStatus {
    /// A frame matching the tick was read
    Present,
    /// Inside the warm-up window, queue untouched
    WarmUp,
    /// Skipped by the decimation policy, queue untouched
    Decimated,
    /// No matching frame within the timeout
    TimedOut { stalled: bool },
    /// A newer frame arrived first; this tick's frame was never delivered
    Overtaken,
    /// The producer side of the queue is gone
    Disconnected,
}

impl SlotStatus {
    pub fn is_present(self) -> bool {
        matches!(self, SlotStatus::Present)
    }

    pub fn is_stalled(self) -> bool {
        matches!(self, SlotStatus::TimedOut { stalled: true })
    }
}

impl FrameSet {
    /// Frame of the named sensor, if present this tick
    pub fn get(&self, sensor: &str) -> Option<&RawSensorFrame> {
        self.slot(sensor).and_then(|s| s.frame.as_ref())
    }

    pub fn slot(&self, sensor: &str) -> Option<&SensorSlot> {
        self.slots.iter().find(|s| s.sensor == sensor)
    }

    pub fn is_present(&self, sensor: &str) -> bool {
        self.get(sensor).is_some()
    }

    /// Whether `key` names an entry of this set (sensor or world)
    pub fn contains_key(&self, key: &str) -> bool {
        key == WORLD_KEY || self.slot(key).is_some()
    }

    pub fn present_count(&self) -> usize {
        self.slots.iter().filter(|s| s.frame.is_some()).count()
    }

    pub fn absent_sensors(&self) -> impl Iterator<Item = &SensorId> {
        self.slots
            .iter()
            .filter(|s| s.frame.is_none())
            .map(|s| &s.sensor)
    }

    pub fn stalled_sensors(&self) -> impl Iterator<Item = &SensorId> {
        self.slots
            .iter()
            .filter(|s| s.status.is_stalled())
            .map(|s| &s.sensor)
    }

    /// Present frames in registration order
    pub fn frames(&self) -> impl Iterator<Item = &RawSensorFrame> {
        self.slots.iter().filter_map(|s| s.frame.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SensorPayload;
    use bytes::Bytes;

    fn frame(sensor: &str, tick: u64) -> RawSensorFrame {
        RawSensorFrame {
            sensor: sensor.into(),
            tick: Tick::new(tick),
            timestamp: 0.0,
            payload: SensorPayload::Raw(Bytes::new()),
        }
    }

    fn sample() -> FrameSet {
        FrameSet {
            tick: Tick::new(7),
            index: 3,
            sim_time: 0.12,
            warmup: false,
            world: WorldEntry {
                tick: Tick::new(7),
                snapshot: None,
            },
            slots: vec![
                SensorSlot {
                    sensor: "gray".into(),
                    status: SlotStatus::Present,
                    frame: Some(frame("gray", 7)),
                },
                SensorSlot {
                    sensor: "flow".into(),
                    status: SlotStatus::TimedOut { stalled: true },
                    frame: None,
                },
            ],
        }
    }

    #[test]
    fn test_lookup() {
        let set = sample();
        assert!(set.is_present("gray"));
        assert!(!set.is_present("flow"));
        assert!(set.contains_key("flow"));
        assert!(set.contains_key(WORLD_KEY));
        assert!(!set.contains_key("events"));
        assert_eq!(set.get("gray").map(|f| f.tick), Some(set.tick));
    }

    #[test]
    fn test_absent_and_stalled() {
        let set = sample();
        assert_eq!(set.present_count(), 1);
        assert_eq!(set.absent_sensors().collect::<Vec<_>>(), vec!["flow"]);
        assert_eq!(set.stalled_sensors().count(), 1);
    }
}
