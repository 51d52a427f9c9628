//! `info` command implementation.

use std::collections::HashMap;

use anyhow::{Context, Result};
use contracts::ScenarioBlueprint;
use serde::Serialize;
use tracing::info;

use crate::cli::InfoArgs;

/// Scenario info for JSON output
#[derive(Serialize)]
struct ScenarioInfo {
    version: String,
    world: WorldInfo,
    timing: TimingInfo,
    resolution: [u32; 2],
    ego: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    sensors: Vec<SensorInfo>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    outputs: Vec<OutputInfo>,
}

#[derive(Serialize)]
struct WorldInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    map: Option<String>,
    host: String,
    port: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    weather: Option<String>,
}

#[derive(Serialize)]
struct TimingInfo {
    delta_time: f64,
    start_time: f64,
    warmup_ticks: u64,
    read_timeout_sec: f64,
    stall_threshold: u32,
}

#[derive(Serialize)]
struct SensorInfo {
    name: String,
    kind: String,
    blueprint: String,
    period: u32,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    options: HashMap<String, String>,
}

#[derive(Serialize)]
struct OutputInfo {
    name: String,
    sink_type: String,
    queue_capacity: usize,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    params: HashMap<String, String>,
}

pub fn run_info(args: &InfoArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading scenario info");

    if !args.config.exists() {
        anyhow::bail!("Scenario file not found: {}", args.config.display());
    }

    let blueprint = config_loader::ConfigLoader::load_from_path(&args.config)
        .with_context(|| format!("Failed to load scenario from {}", args.config.display()))?;

    if args.json {
        let info = build_info(&blueprint, args);
        let json =
            serde_json::to_string_pretty(&info).context("Failed to serialize scenario info")?;
        println!("{}", json);
    } else {
        print_info(&blueprint, args);
    }

    Ok(())
}

fn build_info(blueprint: &ScenarioBlueprint, args: &InfoArgs) -> ScenarioInfo {
    let timing = blueprint.step_timing();

    let sensors = if args.sensors {
        blueprint
            .sensors
            .iter()
            .map(|s| SensorInfo {
                name: s.name.clone(),
                kind: s.kind.as_str().to_string(),
                blueprint: s.host_blueprint().to_string(),
                period: s.decimation_period(&timing),
                options: s.options.clone(),
            })
            .collect()
    } else {
        Vec::new()
    };

    let outputs = if args.outputs {
        blueprint
            .outputs
            .iter()
            .map(|o| OutputInfo {
                name: o.name.clone(),
                sink_type: format!("{:?}", o.sink_type),
                queue_capacity: o.queue_capacity,
                params: o.params.clone(),
            })
            .collect()
    } else {
        Vec::new()
    };

    ScenarioInfo {
        version: format!("{:?}", blueprint.version),
        world: WorldInfo {
            map: blueprint.world.map.clone(),
            host: blueprint.world.host.clone(),
            port: blueprint.world.port,
            weather: blueprint.world.weather.map(|w| w.as_str().to_string()),
        },
        timing: TimingInfo {
            delta_time: blueprint.timing.delta_time,
            start_time: blueprint.timing.start_time,
            warmup_ticks: timing.warmup_ticks(),
            read_timeout_sec: blueprint.timing.read_timeout_sec,
            stall_threshold: blueprint.timing.stall_threshold,
        },
        resolution: [blueprint.resolution.height, blueprint.resolution.width],
        ego: format!("{} ({})", blueprint.ego.blueprint, blueprint.ego.role_name),
        sensors,
        outputs,
    }
}

fn print_info(blueprint: &ScenarioBlueprint, args: &InfoArgs) {
    let timing = blueprint.step_timing();

    println!("=== Scenario ===\n");
    println!("World");
    println!("   ├─ Version: {:?}", blueprint.version);
    println!(
        "   ├─ Map: {}",
        blueprint.world.map.as_deref().unwrap_or("(current)")
    );
    println!(
        "   ├─ CARLA Server: {}:{}",
        blueprint.world.host, blueprint.world.port
    );
    println!(
        "   └─ Weather: {}",
        blueprint.world.weather.map_or("(current)", |w| w.as_str())
    );

    println!("\nTiming");
    println!("   ├─ Step: {}s", blueprint.timing.delta_time);
    println!(
        "   ├─ Warm-up: {}s ({} ticks)",
        blueprint.timing.start_time,
        timing.warmup_ticks()
    );
    println!("   ├─ Read timeout: {}s", blueprint.timing.read_timeout_sec);
    println!("   └─ Stall threshold: {}", blueprint.timing.stall_threshold);

    println!(
        "\nEgo: {} ({}), resolution {}x{}",
        blueprint.ego.blueprint,
        blueprint.ego.role_name,
        blueprint.resolution.width,
        blueprint.resolution.height
    );

    println!("\nSensors ({})", blueprint.sensors.len());
    for (i, sensor) in blueprint.sensors.iter().enumerate() {
        let prefix = if i + 1 == blueprint.sensors.len() { "└─" } else { "├─" };
        if args.sensors {
            println!(
                "   {} {} ({}, {}, every {} ticks)",
                prefix,
                sensor.name,
                sensor.kind.as_str(),
                sensor.host_blueprint(),
                sensor.decimation_period(&timing)
            );
        } else {
            println!("   {} {} ({})", prefix, sensor.name, sensor.kind.as_str());
        }
    }

    if !blueprint.outputs.is_empty() {
        println!("\nOutputs ({})", blueprint.outputs.len());
        for (i, output) in blueprint.outputs.iter().enumerate() {
            let prefix = if i + 1 == blueprint.outputs.len() { "└─" } else { "├─" };
            match output.params.get("path").filter(|_| args.outputs) {
                Some(path) => println!(
                    "   {} {} ({:?}) -> {}",
                    prefix, output.name, output.sink_type, path
                ),
                None => println!("   {} {} ({:?})", prefix, output.name, output.sink_type),
            }
        }
    }

    if let Some(batch) = &blueprint.batch {
        println!(
            "\nBatch: {} -> {} ({} towns, {} weathers)",
            batch.input_dir.display(),
            batch.output_dir.display(),
            batch.towns.len(),
            batch.weathers.len()
        );
    }

    println!();
}
