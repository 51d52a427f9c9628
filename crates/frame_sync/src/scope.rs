//! Acquisition scope
//!
//! Wires every host source to its own unbounded queue on entry and stops
//! them on exit. `exit` runs once; dropping an un-exited scope runs it too.

use std::sync::Arc;
use std::time::Duration;

use async_channel::{unbounded, Sender};
use contracts::{
    FrameSet, RawSensorFrame, SensorDataCallback, SensorDescriptor, SensorId, SensorSource,
    SimulationClock, TimingConfig,
};
use tracing::{info, instrument, trace, warn};

use crate::error::Result;
use crate::handle::{HandleStats, SensorHandle};
use crate::synchronizer::FrameSynchronizer;

/// Per-sensor totals handed back on exit
#[derive(Debug, Clone, Default)]
pub struct ScopeSummary {
    pub ticks: u64,
    pub sensors: Vec<(SensorId, HandleStats)>,
}

pub struct AcquisitionScope<C> {
    synchronizer: FrameSynchronizer<C>,
    /// World source first, then sensors in registration order
    sources: Vec<Box<dyn SensorSource>>,
    exited: bool,
}

fn queue_callback(name: SensorId, tx: Sender<RawSensorFrame>) -> SensorDataCallback {
    Arc::new(move |frame| {
        if tx.try_send(frame).is_err() {
            trace!(sensor = %name, "queue closed, frame dropped");
        }
    })
}

impl<C: SimulationClock> AcquisitionScope<C> {
    /// Register all callbacks and arm the synchronizer.
    ///
    /// Handles are registered before any source starts listening, so a bad
    /// sensor list fails without side effects on the host.
    #[instrument(name = "acquisition_scope_enter", skip_all, fields(sensors = sensors.len()))]
    pub fn enter(
        clock: C,
        timing: &TimingConfig,
        sensors: Vec<(SensorDescriptor, Box<dyn SensorSource>)>,
        world: Option<Box<dyn SensorSource>>,
    ) -> Result<Self> {
        let step = timing.step_timing();
        let mut synchronizer = FrameSynchronizer::new(clock, step);
        let mut wiring = Vec::with_capacity(sensors.len() + 1);

        for (descriptor, source) in sensors {
            let (tx, rx) = unbounded();
            let id = descriptor.id();
            let period = descriptor.decimation_period(&step);
            synchronizer.register(SensorHandle::new(
                id.clone(),
                descriptor.kind,
                period,
                timing.stall_threshold,
                rx,
            ))?;
            wiring.push((id, tx, source));
        }

        let mut sources: Vec<Box<dyn SensorSource>> = Vec::with_capacity(wiring.len() + 1);
        if let Some(world) = world {
            let (tx, rx) = unbounded();
            synchronizer.attach_world(rx);
            world.listen(queue_callback(world.sensor_id().into(), tx));
            sources.push(world);
        }
        for (id, tx, source) in wiring {
            source.listen(queue_callback(id, tx));
            sources.push(source);
        }

        synchronizer.arm()?;
        info!(
            sources = sources.len(),
            warmup_ticks = synchronizer.warmup_ticks(),
            "acquisition scope entered"
        );
        Ok(Self {
            synchronizer,
            sources,
            exited: false,
        })
    }

    pub async fn tick(&mut self, timeout: Duration) -> Result<FrameSet> {
        self.synchronizer.tick(timeout).await
    }

    pub fn synchronizer(&self) -> &FrameSynchronizer<C> {
        &self.synchronizer
    }

    pub fn is_exited(&self) -> bool {
        self.exited
    }

    /// Stop every source and close the synchronizer
    pub fn exit(mut self) -> ScopeSummary {
        self.release();
        self.summary()
    }

    fn summary(&self) -> ScopeSummary {
        ScopeSummary {
            ticks: self.synchronizer.index(),
            sensors: self
                .synchronizer
                .handles()
                .iter()
                .map(|h| (h.id().clone(), h.stats()))
                .collect(),
        }
    }
}

impl<C> AcquisitionScope<C> {
    fn release(&mut self) {
        if self.exited {
            return;
        }
        self.exited = true;
        for source in &self.sources {
            source.stop();
        }
        self.synchronizer.close();
        info!(sources = self.sources.len(), "acquisition scope exited");
    }
}

impl<C> Drop for AcquisitionScope<C> {
    fn drop(&mut self) {
        if !self.exited {
            warn!("acquisition scope dropped without exit, releasing");
            self.release();
        }
    }
}
