//! # Integration Tests
//!
//! End-to-end runs against the mock host, no simulator required:
//! - scenario file snapshots
//! - warm-up and decimation over a full acquisition scope
//! - the same with frames delivered from another thread
//! - scope -> extraction -> dispatcher into a dataset directory
//! - replay driver with a file output

#[cfg(test)]
mod contract_tests {
    use std::path::PathBuf;

    use contracts::{SensorKind, SinkType, WeatherPreset};

    fn config_path(name: &str) -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR"))
            .join("../../configs")
            .join(name)
    }

    #[test]
    fn test_replay_scenario_file_loads() {
        let blueprint =
            config_loader::ConfigLoader::load_from_path(&config_path("replay_town02.toml"))
                .unwrap();

        assert_eq!(blueprint.world.map.as_deref(), Some("Town02"));
        assert_eq!(blueprint.world.weather, Some(WeatherPreset::CloudySunset));
        assert_eq!(blueprint.step_timing().warmup_ticks(), 100);

        let kinds: Vec<_> = blueprint.sensors.iter().map(|s| s.kind).collect();
        assert_eq!(
            kinds,
            vec![SensorKind::Gray, SensorKind::Dvs, SensorKind::OpticalFlow]
        );
        let timing = blueprint.step_timing();
        assert_eq!(blueprint.sensors[0].decimation_period(&timing), 4);
        assert_eq!(blueprint.sensors[1].decimation_period(&timing), 1);

        assert!(blueprint
            .outputs
            .iter()
            .any(|o| o.sink_type == SinkType::File));
        let batch = blueprint.batch.unwrap();
        assert_eq!(batch.towns["_town10_"], "Town10HD");
    }
}

#[cfg(test)]
mod e2e_tests {
    use std::collections::HashMap;
    use std::fs::File;
    use std::time::Duration;

    use contracts::{
        ExtractedFrameSet, SensorDescriptor, SensorKind, SensorSource, SinkConfig, SinkType,
        SlotStatus, TimingConfig,
    };
    use dispatcher::{create_dispatcher, DatasetIndex, INDEX_FILE, PROPS_FILE};
    use extraction::Extractor;
    use frame_sync::AcquisitionScope;
    use observability::FrameSetAggregator;
    use sim_host::{Delivery, HostEvent, MockHostConfig, MockSimHost, SimulationHost};
    use tokio::sync::mpsc;

    const TIMEOUT: Duration = Duration::from_millis(20);

    async fn spawn_rig(
        host: &MockSimHost,
        descriptors: &[SensorDescriptor],
    ) -> Vec<(SensorDescriptor, Box<dyn SensorSource>)> {
        let parent = host
            .spawn_vehicle("vehicle.tesla.cybertruck", "hero", true)
            .await
            .unwrap();
        let mut rig = Vec::new();
        for descriptor in descriptors {
            let spawned = host.spawn_sensor(descriptor, parent).await.unwrap();
            rig.push((spawned.descriptor, spawned.source));
        }
        rig
    }

    /// 0.04s steps, 1.0s warm-up: 25 warm-up ticks, then a period-1 and a
    /// period-3 sensor over 30 ticks.
    #[tokio::test]
    async fn test_warmup_and_decimation_over_scope() {
        let timing = TimingConfig {
            delta_time: 0.04,
            start_time: 1.0,
            read_timeout_sec: 0.02,
            stall_threshold: 3,
        };
        let host = MockSimHost::connected(MockHostConfig::default(), timing.delta_time);
        let rig = spawn_rig(
            &host,
            &[
                SensorDescriptor::new("every", SensorKind::Rgb),
                SensorDescriptor::new("third", SensorKind::Gray).with_option("sensor_tick", "0.12"),
            ],
        )
        .await;

        let mut scope =
            AcquisitionScope::enter(host.clone(), &timing, rig, Some(host.world_source()))
                .unwrap();
        assert_eq!(scope.synchronizer().warmup_ticks(), 25);

        let mut every = Vec::new();
        let mut third = Vec::new();
        for i in 0..30u64 {
            let set = scope.tick(TIMEOUT).await.unwrap();
            assert_eq!(set.index, i);
            assert_eq!(set.warmup, i < 25);
            assert!(set.world.snapshot.is_some());
            if set.is_present("every") {
                every.push(set.index);
            }
            if set.is_present("third") {
                third.push(set.index);
            }
            if set.warmup {
                assert!(set
                    .slots
                    .iter()
                    .all(|slot| slot.status == SlotStatus::WarmUp));
            }
        }

        assert_eq!(every, vec![25, 26, 27, 28, 29]);
        assert_eq!(third, vec![27]);

        let summary = scope.exit();
        assert_eq!(summary.ticks, 30);
        let (_, third_stats) = summary
            .sensors
            .iter()
            .find(|(id, _)| id.as_str() == "third")
            .unwrap();
        assert_eq!(third_stats.warmup, 25);
        assert_eq!(third_stats.timed_out, 2);
        assert_eq!(third_stats.decimated, 2);
        assert_eq!(
            host.journal()
                .count(|e| matches!(e, HostEvent::StoppedListening(_))),
            3
        );
    }

    /// Frames pushed from the host's delivery thread, 5ms after each step.
    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_scope_with_deferred_delivery() {
        let timing = TimingConfig {
            delta_time: 0.1,
            start_time: 0.2,
            read_timeout_sec: 0.2,
            stall_threshold: 3,
        };
        let config = MockHostConfig {
            delivery: Delivery::Deferred {
                delay: Duration::from_millis(5),
            },
            ..MockHostConfig::default()
        };
        let host = MockSimHost::connected(config, timing.delta_time);
        let rig = spawn_rig(
            &host,
            &[
                SensorDescriptor::new("a", SensorKind::Rgb),
                SensorDescriptor::new("b", SensorKind::Gray).with_option("sensor_tick", "0.3"),
            ],
        )
        .await;

        let mut scope =
            AcquisitionScope::enter(host.clone(), &timing, rig, Some(host.world_source()))
                .unwrap();

        let mut a = Vec::new();
        let mut b = Vec::new();
        for _ in 0..12 {
            let set = scope.tick(timing.read_timeout()).await.unwrap();
            assert_eq!(set.world.tick, set.tick);
            assert!(set.world.snapshot.is_some());
            for frame in set.frames() {
                assert_eq!(frame.tick, set.tick);
            }
            if set.is_present("a") {
                a.push(set.index);
            }
            if set.is_present("b") {
                b.push(set.index);
            }
        }
        scope.exit();

        assert_eq!(a, (2..=11).collect::<Vec<u64>>());
        assert_eq!(b, vec![3, 6, 9]);
    }

    /// Scope -> Extractor -> Dispatcher -> FileSink
    #[tokio::test]
    async fn test_scope_to_dataset_directory() {
        let dir = tempfile::tempdir().unwrap();
        let timing = TimingConfig {
            delta_time: 0.04,
            start_time: 0.2,
            read_timeout_sec: 0.02,
            stall_threshold: 3,
        };
        let descriptors = vec![
            SensorDescriptor::new("gray", SensorKind::Gray).with_option("sensor_tick", "0.12"),
            SensorDescriptor::new("events", SensorKind::Dvs),
            SensorDescriptor::new("flow", SensorKind::OpticalFlow)
                .with_option("sensor_tick", "0.12"),
        ];

        let host = MockSimHost::connected(MockHostConfig::default(), timing.delta_time);
        let rig = spawn_rig(&host, &descriptors).await;

        let (tx, rx) = mpsc::channel::<ExtractedFrameSet>(16);
        let sinks = vec![
            SinkConfig {
                name: "status".to_string(),
                sink_type: SinkType::Log,
                queue_capacity: 16,
                params: HashMap::new(),
            },
            SinkConfig {
                name: "dataset".to_string(),
                sink_type: SinkType::File,
                queue_capacity: 16,
                params: HashMap::from([(
                    "path".to_string(),
                    dir.path().display().to_string(),
                )]),
            },
        ];
        let dispatcher = create_dispatcher(sinks, rx).unwrap().spawn();

        let mut extractor = Extractor::new(&descriptors);
        let mut aggregator = FrameSetAggregator::new();
        let mut scope =
            AcquisitionScope::enter(host.clone(), &timing, rig, Some(host.world_source()))
                .unwrap();
        for _ in 0..11 {
            let set = scope.tick(TIMEOUT).await.unwrap();
            aggregator.update(&set, Duration::ZERO);
            tx.send(extractor.extract(&set)).await.unwrap();
        }
        scope.exit();
        drop(tx);

        let report = tokio::time::timeout(Duration::from_secs(5), dispatcher)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(report.frame_sets, 11);
        assert!(report
            .sinks
            .iter()
            .all(|(_, m)| m.write_count == 11 && m.failure_count == 0));

        // Warm-up covers indexes 0..5; gray and flow then match at steps 6 and 9.
        let metrics = aggregator.summary();
        assert_eq!(metrics.ticks, 11);
        assert_eq!(metrics.warmup_ticks, 5);
        assert_eq!(metrics.sensors["gray"].present, 2);
        assert_eq!(metrics.sensors["events"].present, 6);
        assert_eq!(extractor.stats().errors, 0);
        assert_eq!(extractor.stats().extracted, 10);

        let props: serde_json::Value =
            serde_json::from_reader(File::open(dir.path().join(PROPS_FILE)).unwrap()).unwrap();
        assert_eq!(props["sensor_size"], serde_json::json!([6, 8]));

        let index: DatasetIndex =
            serde_json::from_reader(File::open(dir.path().join(INDEX_FILE)).unwrap()).unwrap();
        let offsets: Vec<u64> = index
            .time_to_events
            .iter()
            .map(|t| t.events_offset)
            .collect();
        assert_eq!(offsets, vec![4, 8, 12, 16, 20, 24]);
        assert_eq!(index.frames["gray"].len(), 2);
        assert_eq!(index.frames["flow"].len(), 2);
        assert!(dir.path().join("gray").join("000000.png").exists());
        assert!(dir.path().join("flow").join("000001.bin").exists());
    }
}

#[cfg(test)]
mod driver_tests {
    use std::collections::HashMap;
    use std::fs::File;
    use std::path::PathBuf;

    use carla_scenario_cli::{RunMode, ScenarioDriver, StatusDisplay, StopReason};
    use contracts::{
        RecordingConfig, ScenarioBlueprint, SensorDescriptor, SensorKind, SinkConfig, SinkType,
        TimingConfig, WorldConfig,
    };
    use dispatcher::{DatasetIndex, INDEX_FILE};
    use sim_host::{HostEvent, MockHostConfig, MockSimHost, WorldSettings};
    use tokio::sync::watch;

    fn blueprint(output: &std::path::Path) -> ScenarioBlueprint {
        ScenarioBlueprint {
            world: WorldConfig {
                map: Some("Town04".to_string()),
                init_sleep_sec: 0.0,
                ..WorldConfig::default()
            },
            timing: TimingConfig {
                delta_time: 0.05,
                start_time: 0.1,
                read_timeout_sec: 0.5,
                stall_threshold: 3,
            },
            // Replay runs while sim_time <= 0.5 - 0.1
            recording: RecordingConfig {
                record_path: None,
                record_start_time: 0.0,
                record_delta_time: 0.5,
            },
            sensors: vec![
                SensorDescriptor::new("rgb", SensorKind::Rgb),
                SensorDescriptor::new("events", SensorKind::Dvs),
            ],
            outputs: vec![SinkConfig {
                name: "dataset".to_string(),
                sink_type: SinkType::File,
                queue_capacity: 8,
                params: HashMap::from([(
                    "path".to_string(),
                    output.display().to_string(),
                )]),
            }],
            ..ScenarioBlueprint::default()
        }
    }

    #[tokio::test]
    async fn test_replay_driver_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let host = MockSimHost::new(MockHostConfig::default());
        let (_quit_tx, quit_rx) = watch::channel(false);

        let summary = ScenarioDriver::new(
            host.clone(),
            blueprint(dir.path()),
            RunMode::Replay {
                recording: PathBuf::from("recordings/drive_town4_.log"),
            },
            StatusDisplay::new(5),
            quit_rx,
        )
        .run()
        .await
        .unwrap();

        assert_eq!(summary.stop, StopReason::Completed);
        assert!(summary.ticks() > 2);
        assert_eq!(summary.frames.warmup_ticks, 2);
        assert_eq!(summary.dispatch.frame_sets, summary.ticks());
        assert_eq!(
            summary.frames.sensors["rgb"].present,
            summary.ticks() - 2
        );

        let journal = host.journal();
        assert!(journal
            .position(|e| matches!(e, HostEvent::WorldLoaded(map) if map == "Town04"))
            .is_some());
        assert_eq!(host.settings(), WorldSettings::default());
        assert_eq!(host.actor_count(), 0);

        let index: DatasetIndex =
            serde_json::from_reader(File::open(dir.path().join(INDEX_FILE)).unwrap()).unwrap();
        assert_eq!(index.frames["rgb"].len() as u64, summary.ticks() - 2);
        assert_eq!(index.time_to_events.len() as u64, summary.ticks() - 2);
    }
}
