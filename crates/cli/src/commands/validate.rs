//! `validate` command implementation.

use anyhow::{Context, Result};
use contracts::{ScenarioBlueprint, SinkType};
use serde::Serialize;
use tracing::info;

use crate::cli::ValidateArgs;

/// Validation result for JSON output
#[derive(Serialize)]
struct ValidationResult {
    valid: bool,
    config_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    warnings: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<ConfigSummary>,
}

#[derive(Serialize)]
struct ConfigSummary {
    version: String,
    map: Option<String>,
    warmup_ticks: u64,
    sensor_count: usize,
    output_count: usize,
}

pub fn run_validate(args: &ValidateArgs) -> Result<()> {
    info!(config = %args.config.display(), "Validating scenario");

    let result = validate_config(args);

    if args.json {
        let json = serde_json::to_string_pretty(&result)
            .context("Failed to serialize validation result")?;
        println!("{}", json);
    } else {
        print_validation_result(&result);
    }

    if result.valid {
        Ok(())
    } else {
        anyhow::bail!("Scenario validation failed")
    }
}

fn validate_config(args: &ValidateArgs) -> ValidationResult {
    let config_path = args.config.display().to_string();

    if !args.config.exists() {
        return ValidationResult {
            valid: false,
            config_path,
            error: Some(format!("File not found: {}", args.config.display())),
            warnings: None,
            summary: None,
        };
    }

    match config_loader::ConfigLoader::load_from_path(&args.config) {
        Ok(blueprint) => {
            let warnings = collect_warnings(&blueprint);
            ValidationResult {
                valid: true,
                config_path,
                error: None,
                warnings: (!warnings.is_empty()).then_some(warnings),
                summary: Some(ConfigSummary {
                    version: format!("{:?}", blueprint.version),
                    map: blueprint.world.map.clone(),
                    warmup_ticks: blueprint.step_timing().warmup_ticks(),
                    sensor_count: blueprint.sensors.len(),
                    output_count: blueprint.outputs.len(),
                }),
            }
        }
        Err(e) => ValidationResult {
            valid: false,
            config_path,
            error: Some(e.to_string()),
            warnings: None,
            summary: None,
        },
    }
}

/// Non-fatal issues
fn collect_warnings(blueprint: &ScenarioBlueprint) -> Vec<String> {
    let mut warnings = Vec::new();
    let timing = blueprint.step_timing();

    if blueprint.outputs.is_empty() {
        warnings.push("No outputs configured - frame-sets will only be counted".to_string());
    } else if !blueprint
        .outputs
        .iter()
        .any(|o| o.sink_type == SinkType::File)
    {
        warnings.push("No file output configured - no dataset will be written".to_string());
    }

    for sensor in &blueprint.sensors {
        if let Some(interval) = sensor.capture_interval() {
            let period = sensor.decimation_period(&timing);
            let effective = f64::from(period) * timing.delta_time;
            if (effective - interval).abs() > 1e-6 {
                warnings.push(format!(
                    "Sensor '{}': sensor_tick {} is not a multiple of delta_time {}, reading every {} ticks ({:.4}s)",
                    sensor.name, interval, timing.delta_time, period, effective
                ));
            }
        }
    }

    if blueprint.recording.record_path.is_none() && blueprint.batch.is_none() {
        warnings.push(
            "recording.record_path is not set - replay needs --recording, record will not record"
                .to_string(),
        );
    }

    warnings
}

fn print_validation_result(result: &ValidationResult) {
    if result.valid {
        println!("✓ Scenario is valid: {}", result.config_path);

        if let Some(ref summary) = result.summary {
            println!("\n  Version: {}", summary.version);
            println!("  Map: {}", summary.map.as_deref().unwrap_or("(current)"));
            println!("  Warm-up ticks: {}", summary.warmup_ticks);
            println!("  Sensors: {}", summary.sensor_count);
            println!("  Outputs: {}", summary.output_count);
        }

        if let Some(ref warnings) = result.warnings {
            println!("\n⚠ Warnings:");
            for warning in warnings {
                println!("  - {}", warning);
            }
        }
    } else {
        println!("✗ Scenario is invalid: {}", result.config_path);
        if let Some(ref error) = result.error {
            println!("\n  Error: {}", error);
        }
    }
}
