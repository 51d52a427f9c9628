//! ScenarioDriver - one record or replay run against a simulation host
//!
//! Setup: connect, load map, weather, synchronous settings, ego vehicle,
//! sensor rig, acquisition scope. Then one loop iteration per tick until the
//! scenario span is covered, a quit is requested or the host fails.
//!
//! Cleanup runs on every exit path, exactly once, in this order: stop the
//! recorder, restore the settings token, tear down actors, exit the scope.
//! The dispatcher is closed afterwards so sinks see every frame-set.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use contracts::{ActorId, ExtractedFrameSet, ScenarioBlueprint};
use extraction::Extractor;
use frame_sync::{AcquisitionScope, ScopeSummary};
use observability::FrameSetAggregator;
use sim_host::{ActorFactory, ActorRegistry, HostError, SettingsToken, SimulationHost, TeardownReport};
use tokio::sync::{mpsc, watch};
use tracing::{error, info, instrument, warn};

use super::display::{DisplayRefresh, StatusDisplay};
use super::plan::inject_sensor_size;
use super::stats::{RunSummary, StopReason};
use crate::error::{DriverError, Result};

#[derive(Debug, Clone, PartialEq)]
pub enum RunMode {
    /// Spawn an autopilot ego vehicle and record the drive
    Record { record_path: Option<PathBuf> },
    /// Replay a recorder log and capture the sensors along it
    Replay { recording: PathBuf },
}

impl RunMode {
    pub fn name(&self) -> &'static str {
        match self {
            RunMode::Record { .. } => "record",
            RunMode::Replay { .. } => "replay",
        }
    }
}

#[derive(Debug, Clone)]
pub struct DriverOptions {
    /// Stop after this many frame-sets
    pub max_ticks: Option<u64>,
    /// Capacity of the channel into the dispatcher
    pub dispatch_capacity: usize,
}

impl Default for DriverOptions {
    fn default() -> Self {
        Self {
            max_ticks: None,
            dispatch_capacity: 64,
        }
    }
}

pub struct ScenarioDriver<H: SimulationHost, D: DisplayRefresh = StatusDisplay> {
    host: H,
    factory: ActorFactory<H>,
    blueprint: ScenarioBlueprint,
    mode: RunMode,
    display: D,
    quit: watch::Receiver<bool>,
    options: DriverOptions,
    registry: ActorRegistry,
    token: Option<SettingsToken>,
    recorder_running: bool,
}

fn seconds(value: f64) -> Duration {
    Duration::try_from_secs_f64(value).unwrap_or_default()
}

impl<H: SimulationHost, D: DisplayRefresh> ScenarioDriver<H, D> {
    pub fn new(
        host: H,
        mut blueprint: ScenarioBlueprint,
        mode: RunMode,
        display: D,
        quit: watch::Receiver<bool>,
    ) -> Self {
        inject_sensor_size(&mut blueprint);
        Self {
            factory: ActorFactory::new(host.clone()),
            host,
            blueprint,
            mode,
            display,
            quit,
            options: DriverOptions::default(),
            registry: ActorRegistry::new(),
            token: None,
            recorder_running: false,
        }
    }

    pub fn with_options(mut self, options: DriverOptions) -> Self {
        self.options = options;
        self
    }

    pub fn blueprint(&self) -> &ScenarioBlueprint {
        &self.blueprint
    }

    /// Run the scenario to completion and clean up.
    ///
    /// A host failure still goes through the full cleanup before the error
    /// is returned.
    #[instrument(name = "scenario_driver_run", skip(self), fields(mode = self.mode.name()))]
    pub async fn run(mut self) -> Result<RunSummary> {
        let wall = Instant::now();
        let (tx, rx) = mpsc::channel(self.options.dispatch_capacity.max(1));
        let dispatcher = dispatcher::create_dispatcher(self.blueprint.outputs.clone(), rx)?.spawn();

        let mut scope = None;
        let mut extractor = Extractor::new(&self.blueprint.sensors);
        let mut aggregator = FrameSetAggregator::new();
        let outcome = self
            .execute(&mut scope, &mut extractor, &mut aggregator, &tx, wall)
            .await;

        let (teardown, scope_summary) = self.cleanup(scope).await;
        drop(tx);
        let dispatch = dispatcher.await;

        let stop = outcome.inspect_err(|e| error!(error = %e, "scenario run failed"))?;
        let dispatch = dispatch?;
        info!(%stop, ticks = aggregator.ticks, "scenario run finished");

        Ok(RunSummary {
            mode: self.mode.name(),
            stop,
            wall_time: wall.elapsed(),
            frames: aggregator.summary(),
            scope: scope_summary,
            extraction: extractor.stats(),
            teardown,
            dispatch,
        })
    }

    async fn execute(
        &mut self,
        scope_slot: &mut Option<AcquisitionScope<H>>,
        extractor: &mut Extractor,
        aggregator: &mut FrameSetAggregator,
        tx: &mpsc::Sender<ExtractedFrameSet>,
        wall: Instant,
    ) -> Result<StopReason> {
        self.prepare_world().await?;
        let parent = self.prepare_ego().await?;

        let descriptors = self.blueprint.sensors_with_resolution();
        let spawned = self
            .factory
            .spawn_sensors(&descriptors, parent, &mut self.registry)
            .await?;
        let sensors = spawned
            .into_iter()
            .map(|sensor| (sensor.descriptor, sensor.source))
            .collect();

        let scope = scope_slot.insert(AcquisitionScope::enter(
            self.host.clone(),
            &self.blueprint.timing,
            sensors,
            Some(self.host.world_source()),
        )?);
        self.run_loop(scope, extractor, aggregator, tx, wall).await
    }

    #[instrument(name = "scenario_driver_prepare_world", skip(self))]
    async fn prepare_world(&mut self) -> Result<()> {
        let world = &self.blueprint.world;
        self.host
            .connect(&world.host, world.port, seconds(world.client_timeout_sec))
            .await?;

        if let Some(map) = &world.map {
            self.host.load_world(map).await?;
            info!(map = %map, "world loaded");
        }
        if world.init_sleep_sec > 0.0 {
            tokio::time::sleep(seconds(world.init_sleep_sec)).await;
        }
        if let Some(weather) = world.weather {
            self.host.set_weather(weather).await?;
            info!(weather = weather.as_str(), "weather set");
        }

        let delta = self.blueprint.timing.delta_time;
        self.token = Some(self.host.apply_sync_settings(delta).await?);
        info!(delta_time = delta, "synchronous mode enabled");
        Ok(())
    }

    /// The vehicle the sensor rig is attached to
    async fn prepare_ego(&mut self) -> Result<ActorId> {
        match &self.mode {
            RunMode::Replay { recording } => {
                self.host.replay_file(recording).await?;
                // One bare step so the replayed actors exist before the lookup.
                self.host.advance_clock().await.map_err(HostError::from)?;
                let actor = self
                    .factory
                    .adopt_vehicle(&self.blueprint.ego.role_name, &mut self.registry)
                    .await?;
                info!(recording = %recording.display(), actor, "replay started");
                Ok(actor)
            }
            RunMode::Record { .. } => Ok(self
                .factory
                .spawn_ego(&self.blueprint.ego, &mut self.registry)
                .await?),
        }
    }

    async fn run_loop(
        &mut self,
        scope: &mut AcquisitionScope<H>,
        extractor: &mut Extractor,
        aggregator: &mut FrameSetAggregator,
        tx: &mpsc::Sender<ExtractedFrameSet>,
        wall: Instant,
    ) -> Result<StopReason> {
        let timeout = self.blueprint.timing.read_timeout();
        let delta = self.blueprint.timing.delta_time;
        let mut ticks: u64 = 0;

        loop {
            if *self.quit.borrow() {
                info!(ticks, "quit requested");
                return Ok(StopReason::Quit);
            }
            if self.options.max_ticks.is_some_and(|max| ticks >= max) {
                info!(ticks, "tick limit reached");
                return Ok(StopReason::TickLimit);
            }

            let sim_time = ticks as f64 * delta;
            let started = Instant::now();
            let frame_set = scope.tick(timeout).await?;
            let extracted = extractor.extract(&frame_set);
            tx.send(extracted)
                .await
                .map_err(|_| DriverError::DispatchClosed)?;

            let elapsed = started.elapsed();
            observability::record_frame_set(&frame_set);
            observability::record_loop_duration(elapsed);
            aggregator.update(&frame_set, elapsed);
            self.display.refresh(&frame_set, sim_time, wall.elapsed());

            self.update_recorder(sim_time).await?;

            ticks += 1;
            if self.span_covered(ticks as f64 * delta) {
                return Ok(StopReason::Completed);
            }
        }
    }

    async fn update_recorder(&mut self, sim_time: f64) -> Result<()> {
        let RunMode::Record { record_path } = &self.mode else {
            return Ok(());
        };
        if self.recorder_running || sim_time < self.blueprint.recording.record_start_time {
            return Ok(());
        }
        let Some(path) = record_path else {
            return Ok(());
        };

        self.host.start_recorder(path).await?;
        self.recorder_running = true;
        info!(path = %path.display(), sim_time, "recorder started");
        Ok(())
    }

    fn span_covered(&self, sim_time: f64) -> bool {
        let recording = &self.blueprint.recording;
        match self.mode {
            RunMode::Record { .. } => {
                sim_time >= recording.record_start_time + recording.record_delta_time
            }
            RunMode::Replay { .. } => {
                sim_time > recording.record_delta_time - self.blueprint.timing.start_time
            }
        }
    }

    #[instrument(name = "scenario_driver_cleanup", skip_all)]
    async fn cleanup(
        &mut self,
        scope: Option<AcquisitionScope<H>>,
    ) -> (TeardownReport, Option<ScopeSummary>) {
        if self.recorder_running {
            self.recorder_running = false;
            match self.host.stop_recorder().await {
                Ok(()) => info!("recorder stopped"),
                Err(e) => error!(error = %e, "failed to stop recorder"),
            }
        }

        if let Some(token) = self.token.take() {
            match self.host.restore_settings(token).await {
                Ok(()) => info!("world settings restored"),
                Err(e) => error!(error = %e, "failed to restore world settings"),
            }
        }

        let teardown = self.factory.teardown(&mut self.registry).await;
        if !teardown.failed.is_empty() {
            warn!(failed = ?teardown.failed, "some actors were not destroyed");
        }

        let summary = scope.map(AcquisitionScope::exit);
        self.display.close();
        (teardown, summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{
        RecordingConfig, SensorDescriptor, SensorKind, SinkConfig, SinkType, TimingConfig,
        WorldConfig,
    };
    use dispatcher::{DatasetIndex, INDEX_FILE, PROPS_FILE};
    use sim_host::{HostEvent, Journal, MockHostConfig, MockSimHost, WorldSettings};
    use std::collections::HashMap;
    use std::fs::File;
    use tempfile::tempdir;

    fn blueprint(recording: RecordingConfig) -> ScenarioBlueprint {
        ScenarioBlueprint {
            world: WorldConfig {
                map: Some("Town02".to_string()),
                init_sleep_sec: 0.0,
                ..WorldConfig::default()
            },
            timing: TimingConfig {
                delta_time: 0.04,
                start_time: 0.2,
                read_timeout_sec: 0.5,
                stall_threshold: 3,
            },
            recording,
            sensors: vec![
                SensorDescriptor::new("gray", SensorKind::Gray).with_option("sensor_tick", "0.12"),
                SensorDescriptor::new("events", SensorKind::Dvs),
            ],
            ..ScenarioBlueprint::default()
        }
    }

    fn replay_blueprint() -> ScenarioBlueprint {
        // Replay stops once sim_time > 0.62 - 0.2, i.e. after 11 ticks.
        blueprint(RecordingConfig {
            record_path: None,
            record_start_time: 0.0,
            record_delta_time: 0.62,
        })
    }

    fn replay() -> RunMode {
        RunMode::Replay {
            recording: PathBuf::from("recordings/drive_town2_.log"),
        }
    }

    fn pos(journal: &Journal, pred: impl Fn(&HostEvent) -> bool) -> usize {
        journal.position(pred).unwrap()
    }

    fn assert_cleanup_order(journal: &Journal) {
        let restored = pos(journal, |e| matches!(e, HostEvent::SettingsRestored));
        let destroyed = pos(journal, |e| matches!(e, HostEvent::ActorDestroyed(_)));
        let stopped = pos(journal, |e| matches!(e, HostEvent::StoppedListening(_)));
        assert!(restored < destroyed);
        assert!(destroyed < stopped);
    }

    #[tokio::test]
    async fn test_replay_run() {
        let host = MockSimHost::new(MockHostConfig::default());
        let (_quit_tx, quit_rx) = watch::channel(false);
        let driver = ScenarioDriver::new(
            host.clone(),
            replay_blueprint(),
            replay(),
            StatusDisplay::default(),
            quit_rx,
        );

        let summary = driver.run().await.unwrap();

        assert_eq!(summary.stop, StopReason::Completed);
        assert_eq!(summary.ticks(), 11);
        assert_eq!(summary.frames.warmup_ticks, 5);
        let gray = summary.frames.sensors["gray"];
        assert_eq!(gray.warmup, 5);
        assert_eq!(gray.present, 2);
        assert_eq!(gray.decimated, 4);
        assert_eq!(summary.frames.sensors["events"].present, 6);
        assert_eq!(summary.teardown.destroyed, 3);

        let journal = host.journal();
        let applied = pos(journal, |e| matches!(e, HostEvent::SettingsApplied { .. }));
        let replayed = pos(journal, |e| matches!(e, HostEvent::ReplayStarted(_)));
        assert!(applied < replayed);
        assert_cleanup_order(journal);
        assert_eq!(host.actor_count(), 0);
        assert_eq!(host.settings(), WorldSettings::default());
    }

    #[tokio::test]
    async fn test_record_run_starts_and_stops_recorder() {
        let host = MockSimHost::new(MockHostConfig::default());
        let (_quit_tx, quit_rx) = watch::channel(false);
        let blueprint = blueprint(RecordingConfig {
            record_path: None,
            record_start_time: 0.2,
            record_delta_time: 0.42,
        });
        let mode = RunMode::Record {
            record_path: Some(PathBuf::from("recordings/drive.log")),
        };

        let summary = ScenarioDriver::new(host.clone(), blueprint, mode, StatusDisplay::default(), quit_rx)
            .run()
            .await
            .unwrap();

        assert_eq!(summary.stop, StopReason::Completed);
        assert_eq!(summary.ticks(), 16);
        assert!(!host.is_recording());

        let journal = host.journal();
        let started = pos(journal, |e| matches!(e, HostEvent::RecorderStarted(_)));
        let stopped = pos(journal, |e| matches!(e, HostEvent::RecorderStopped));
        let restored = pos(journal, |e| matches!(e, HostEvent::SettingsRestored));
        assert!(started < stopped);
        assert!(stopped < restored);
        assert_cleanup_order(journal);
        assert_eq!(
            journal.count(|e| matches!(e, HostEvent::VehicleSpawned { .. })),
            1
        );
    }

    #[tokio::test]
    async fn test_host_failure_still_cleans_up() {
        // Step 0 is the bare replay step, the scope fails on its third tick.
        let host = MockSimHost::new(MockHostConfig {
            fail_advance_at: Some(3),
            ..Default::default()
        });
        let (_quit_tx, quit_rx) = watch::channel(false);

        let err = ScenarioDriver::new(
            host.clone(),
            replay_blueprint(),
            replay(),
            StatusDisplay::default(),
            quit_rx,
        )
        .run()
        .await
        .unwrap_err();

        assert!(err.is_host_failure());
        let journal = host.journal();
        assert_cleanup_order(journal);
        assert_eq!(journal.count(|e| matches!(e, HostEvent::SettingsRestored)), 1);
        assert_eq!(journal.count(|e| matches!(e, HostEvent::ActorDestroyed(_))), 3);
        assert_eq!(journal.count(|e| matches!(e, HostEvent::StoppedListening(_))), 3);
        assert_eq!(host.actor_count(), 0);
    }

    #[tokio::test]
    async fn test_spawn_failure_rolls_back_without_scope() {
        let host = MockSimHost::new(MockHostConfig {
            fail_sensors: vec!["events".to_string()],
            ..Default::default()
        });
        let (_quit_tx, quit_rx) = watch::channel(false);

        let err = ScenarioDriver::new(
            host.clone(),
            replay_blueprint(),
            replay(),
            StatusDisplay::default(),
            quit_rx,
        )
        .run()
        .await
        .unwrap_err();

        assert!(err.is_host_failure());
        let journal = host.journal();
        assert_eq!(journal.count(|e| matches!(e, HostEvent::Listening(_))), 0);
        assert_eq!(journal.count(|e| matches!(e, HostEvent::SettingsRestored)), 1);
        assert_eq!(host.actor_count(), 0);
    }

    #[tokio::test]
    async fn test_quit_before_first_tick() {
        let host = MockSimHost::new(MockHostConfig::default());
        let (_quit_tx, quit_rx) = watch::channel(true);

        let summary = ScenarioDriver::new(
            host.clone(),
            replay_blueprint(),
            replay(),
            StatusDisplay::default(),
            quit_rx,
        )
        .run()
        .await
        .unwrap();

        assert_eq!(summary.stop, StopReason::Quit);
        assert_eq!(summary.ticks(), 0);
        assert_cleanup_order(host.journal());
    }

    #[tokio::test]
    async fn test_tick_limit() {
        let host = MockSimHost::new(MockHostConfig::default());
        let (_quit_tx, quit_rx) = watch::channel(false);

        let summary = ScenarioDriver::new(
            host,
            replay_blueprint(),
            replay(),
            StatusDisplay::default(),
            quit_rx,
        )
        .with_options(DriverOptions {
            max_ticks: Some(4),
            ..DriverOptions::default()
        })
        .run()
        .await
        .unwrap();

        assert_eq!(summary.stop, StopReason::TickLimit);
        assert_eq!(summary.ticks(), 4);
    }

    #[tokio::test]
    async fn test_replay_writes_dataset() {
        let out = tempdir().unwrap();
        let mut blueprint = replay_blueprint();
        blueprint.outputs = vec![SinkConfig {
            name: "dataset".to_string(),
            sink_type: SinkType::File,
            queue_capacity: 16,
            params: HashMap::from([("path".to_string(), out.path().display().to_string())]),
        }];
        let (_quit_tx, quit_rx) = watch::channel(false);

        let summary = ScenarioDriver::new(
            MockSimHost::new(MockHostConfig::default()),
            blueprint,
            replay(),
            StatusDisplay::default(),
            quit_rx,
        )
        .run()
        .await
        .unwrap();

        assert_eq!(summary.dispatch.frame_sets, 11);
        assert_eq!(summary.dispatch.sinks[0].1.write_count, 11);

        let props: serde_json::Value =
            serde_json::from_reader(File::open(out.path().join(PROPS_FILE)).unwrap()).unwrap();
        assert_eq!(props["sensor_size"], serde_json::json!([260, 346]));

        let index: DatasetIndex =
            serde_json::from_reader(File::open(out.path().join(INDEX_FILE)).unwrap()).unwrap();
        assert_eq!(index.frames["gray"].len(), 2);
        assert_eq!(index.time_to_events.len(), 6);
    }
}
