//! Frame synchronizer
//!
//! Advances the host clock once per call and assembles exactly one
//! `FrameSet` for the tick the host hands back.

use std::fmt;
use std::time::Duration;

use async_channel::Receiver;
use contracts::{
    FrameSet, RawSensorFrame, SensorPayload, SimulationClock, StepTiming, Tick, WorldEntry,
    WorldSnapshot, WORLD_KEY,
};
use metrics::{counter, histogram};
use tokio::time::Instant;
use tracing::{debug, error, info, instrument};

use crate::error::{Result, SyncError};
use crate::handle::SensorHandle;
use crate::queue::{FrameQueue, MatchOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Unarmed,
    Armed,
    Closed,
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SyncState::Unarmed => "unarmed",
            SyncState::Armed => "armed",
            SyncState::Closed => "closed",
        })
    }
}

pub struct FrameSynchronizer<C> {
    clock: C,
    timing: StepTiming,
    warmup_ticks: u64,
    state: SyncState,
    world: Option<FrameQueue>,
    /// Registration order is read order
    handles: Vec<SensorHandle>,
    index: u64,
    last_tick: Option<Tick>,
}

impl<C> FrameSynchronizer<C> {
    pub fn new(clock: C, timing: StepTiming) -> Self {
        Self {
            clock,
            warmup_ticks: timing.warmup_ticks(),
            timing,
            state: SyncState::Unarmed,
            world: None,
            handles: Vec::new(),
            index: 0,
            last_tick: None,
        }
    }

    pub fn state(&self) -> SyncState {
        self.state
    }

    /// Index of the next tick
    pub fn index(&self) -> u64 {
        self.index
    }

    pub fn warmup_ticks(&self) -> u64 {
        self.warmup_ticks
    }

    pub fn timing(&self) -> StepTiming {
        self.timing
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn last_tick(&self) -> Option<Tick> {
        self.last_tick
    }

    pub fn handles(&self) -> &[SensorHandle] {
        &self.handles
    }

    pub fn handle(&self, sensor: &str) -> Option<&SensorHandle> {
        self.handles.iter().find(|h| h.id() == sensor)
    }

    /// Add a sensor. Only allowed before arming.
    pub fn register(&mut self, handle: SensorHandle) -> Result<()> {
        if self.state != SyncState::Unarmed {
            return Err(SyncError::NotArmed { state: self.state });
        }
        if handle.id() == WORLD_KEY {
            return Err(SyncError::ReservedName(handle.id().clone()));
        }
        if self.handle(handle.id()).is_some() {
            return Err(SyncError::DuplicateSensor {
                sensor: handle.id().clone(),
            });
        }
        self.handles.push(handle);
        Ok(())
    }

    /// Attach the queue fed by the host's world source
    pub fn attach_world(&mut self, rx: Receiver<RawSensorFrame>) {
        self.world = Some(FrameQueue::new(WORLD_KEY.into(), rx));
    }

    pub fn arm(&mut self) -> Result<()> {
        match self.state {
            SyncState::Unarmed => {
                self.state = SyncState::Armed;
                info!(
                    sensors = self.handles.len(),
                    warmup_ticks = self.warmup_ticks,
                    delta_time = self.timing.delta_time,
                    "frame synchronizer armed"
                );
                Ok(())
            }
            SyncState::Armed => Ok(()),
            SyncState::Closed => Err(SyncError::NotArmed { state: self.state }),
        }
    }

    /// Returns false if already closed
    pub fn close(&mut self) -> bool {
        if self.state == SyncState::Closed {
            return false;
        }
        self.state = SyncState::Closed;
        info!(ticks = self.index, "frame synchronizer closed");
        true
    }
}

impl<C: SimulationClock> FrameSynchronizer<C> {
    /// Advance the host one step and assemble its frame-set.
    ///
    /// Inside the warm-up window no sensor queue is read. Sensor timeouts end
    /// up as absent slots; only a failed clock advance is an error.
    #[instrument(name = "frame_sync_tick", skip(self, timeout), fields(index = self.index))]
    pub async fn tick(&mut self, timeout: Duration) -> Result<FrameSet> {
        if self.state != SyncState::Armed {
            error!(state = %self.state, "tick issued outside the acquisition scope");
            return Err(SyncError::NotArmed { state: self.state });
        }

        let started = Instant::now();
        let index = self.index;
        let tick = self.clock.advance_clock().await.map_err(|source| {
            error!(index, error = %source, "host clock advance failed");
            SyncError::HostAdvance { index, source }
        })?;

        if let Some(previous) = self.last_tick {
            if tick <= previous {
                error!(%previous, current = %tick, "host tick went backwards");
                return Err(SyncError::NonMonotonicTick {
                    previous,
                    current: tick,
                });
            }
        }
        self.last_tick = Some(tick);

        let world = self.read_world(tick, timeout).await;
        let warmup = index < self.warmup_ticks;

        let mut slots = Vec::with_capacity(self.handles.len());
        for handle in &mut self.handles {
            let slot = if warmup {
                handle.warm_up()
            } else {
                handle.read(tick, timeout).await
            };
            slots.push(slot);
        }
        self.index += 1;

        let frame_set = FrameSet {
            tick,
            index,
            sim_time: self.timing.elapsed_at(index),
            warmup,
            world,
            slots,
        };

        counter!("frame_sync_ticks_total").increment(1);
        if warmup {
            counter!("frame_sync_warmup_ticks_total").increment(1);
        }
        histogram!("frame_sync_tick_duration_seconds").record(started.elapsed().as_secs_f64());
        debug!(
            %tick,
            warmup,
            present = frame_set.present_count(),
            sensors = frame_set.slots.len(),
            "frame-set assembled"
        );
        Ok(frame_set)
    }

    async fn read_world(&mut self, tick: Tick, timeout: Duration) -> WorldEntry {
        let snapshot = match self.world.as_mut() {
            Some(queue) => match queue.match_tick(tick, timeout).await {
                MatchOutcome::Matched(RawSensorFrame {
                    payload: SensorPayload::World(snapshot),
                    ..
                }) => Some(snapshot),
                MatchOutcome::Matched(frame) => {
                    debug!(payload = frame.payload.variant_name(), "unexpected world payload");
                    None
                }
                outcome => {
                    debug!(%tick, ?outcome, "no world snapshot for tick");
                    None
                }
            },
            None => None,
        };
        WorldEntry { tick, snapshot }
    }
}

impl<C> fmt::Debug for FrameSynchronizer<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameSynchronizer")
            .field("state", &self.state)
            .field("index", &self.index)
            .field("warmup_ticks", &self.warmup_ticks)
            .field("handles", &self.handles)
            .finish()
    }
}

/// Simulated time carried by a world snapshot, falling back to the tick index
pub fn world_time(frame_set: &FrameSet) -> f64 {
    frame_set
        .world
        .snapshot
        .map(|WorldSnapshot { elapsed_seconds, .. }| elapsed_seconds)
        .unwrap_or(frame_set.sim_time)
}
