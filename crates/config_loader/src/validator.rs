//! Blueprint validation
//!
//! Rules:
//! - field ranges (derived `Validate` on the contract types)
//! - sensor names unique, non-empty, not the reserved `world` key
//! - every time value finite and at most `MAX_SECONDS`
//! - `sensor_tick` numeric and not shorter than one step
//! - sink names unique, file sinks carry a `path`

use std::collections::HashSet;

use ::validator::Validate;
use contracts::{ContractError, ScenarioBlueprint, SinkType, SENSOR_TICK_OPTION, WORLD_KEY};

/// Upper bound of any configured time value (one day)
pub const MAX_SECONDS: f64 = 86_400.0;

/// Validate a blueprint, returning the first error found.
pub fn validate(blueprint: &ScenarioBlueprint) -> Result<(), ContractError> {
    validate_sensor_names(blueprint)?;
    validate_time_values(blueprint)?;
    validate_ranges(blueprint)?;
    validate_sensor_ticks(blueprint)?;
    validate_sinks(blueprint)?;
    Ok(())
}

fn validate_ranges(blueprint: &ScenarioBlueprint) -> Result<(), ContractError> {
    blueprint
        .validate()
        .map_err(|errors| ContractError::config_validation("blueprint", errors.to_string()))
}

/// NaN and infinities slip through range checks and cannot become a `Duration`.
fn validate_time_values(blueprint: &ScenarioBlueprint) -> Result<(), ContractError> {
    let values = [
        ("world.client_timeout_sec", blueprint.world.client_timeout_sec),
        ("world.init_sleep_sec", blueprint.world.init_sleep_sec),
        ("timing.delta_time", blueprint.timing.delta_time),
        ("timing.start_time", blueprint.timing.start_time),
        ("timing.read_timeout_sec", blueprint.timing.read_timeout_sec),
        ("recording.record_start_time", blueprint.recording.record_start_time),
        ("recording.record_delta_time", blueprint.recording.record_delta_time),
    ];
    for (field, value) in values {
        check_seconds(field, value)?;
    }
    Ok(())
}

fn check_seconds(field: impl Into<String>, value: f64) -> Result<(), ContractError> {
    if !value.is_finite() {
        return Err(ContractError::config_validation(
            field,
            format!("must be a finite number of seconds, got {value}"),
        ));
    }
    if value > MAX_SECONDS {
        return Err(ContractError::config_validation(
            field,
            format!("{value}s exceeds the {MAX_SECONDS}s limit"),
        ));
    }
    Ok(())
}

fn validate_sensor_names(blueprint: &ScenarioBlueprint) -> Result<(), ContractError> {
    let mut seen = HashSet::new();
    for (idx, sensor) in blueprint.sensors.iter().enumerate() {
        if sensor.name == WORLD_KEY {
            return Err(ContractError::config_validation(
                format!("sensors[{idx}].name"),
                format!("'{WORLD_KEY}' is reserved for the world entry"),
            ));
        }
        if !seen.insert(sensor.name.as_str()) {
            return Err(ContractError::config_validation(
                format!("sensors[name={}]", sensor.name),
                "duplicate sensor name",
            ));
        }
    }
    Ok(())
}

fn validate_sensor_ticks(blueprint: &ScenarioBlueprint) -> Result<(), ContractError> {
    let delta = blueprint.timing.delta_time;
    for sensor in &blueprint.sensors {
        let Some(raw) = sensor.options.get(SENSOR_TICK_OPTION) else {
            continue;
        };
        let field = format!("sensors[{}].options.{SENSOR_TICK_OPTION}", sensor.name);
        let interval: f64 = raw
            .trim()
            .parse()
            .map_err(|_| ContractError::config_validation(&field, format!("not a number: '{raw}'")))?;
        check_seconds(&field, interval)?;
        if interval <= 0.0 {
            return Err(ContractError::config_validation(
                field,
                format!("must be > 0, got {interval}"),
            ));
        }
        if interval + 1e-9 < delta {
            return Err(ContractError::config_validation(
                field,
                format!("capture interval {interval} is shorter than delta_time {delta}"),
            ));
        }
    }
    Ok(())
}

fn validate_sinks(blueprint: &ScenarioBlueprint) -> Result<(), ContractError> {
    let mut seen = HashSet::new();
    for (idx, sink) in blueprint.outputs.iter().enumerate() {
        if sink.name.is_empty() {
            return Err(ContractError::config_validation(
                format!("outputs[{idx}].name"),
                "sink name cannot be empty",
            ));
        }
        if !seen.insert(sink.name.as_str()) {
            return Err(ContractError::config_validation(
                format!("outputs[name={}]", sink.name),
                "duplicate sink name",
            ));
        }
        if sink.queue_capacity == 0 {
            return Err(ContractError::config_validation(
                format!("outputs[{}].queue_capacity", sink.name),
                "queue capacity must be > 0",
            ));
        }
        if sink.sink_type == SinkType::File && !sink.params.contains_key("path") {
            return Err(ContractError::config_validation(
                format!("outputs[{}].params.path", sink.name),
                "file sink requires 'path'",
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{SensorDescriptor, SensorKind, SinkConfig};
    use std::collections::HashMap;

    fn minimal_blueprint() -> ScenarioBlueprint {
        let mut bp: ScenarioBlueprint = toml::from_str("").unwrap();
        bp.timing.delta_time = 0.01;
        bp.sensors = vec![
            SensorDescriptor::new("gray", SensorKind::Gray).with_option("sensor_tick", "0.04"),
            SensorDescriptor::new("events", SensorKind::Dvs),
        ];
        bp.outputs = vec![SinkConfig {
            name: "log".into(),
            sink_type: SinkType::Log,
            queue_capacity: 100,
            params: HashMap::new(),
        }];
        bp
    }

    #[test]
    fn test_valid_config() {
        assert!(validate(&minimal_blueprint()).is_ok());
    }

    #[test]
    fn test_duplicate_sensor_name() {
        let mut bp = minimal_blueprint();
        bp.sensors.push(SensorDescriptor::new("gray", SensorKind::Rgb));
        let err = validate(&bp).unwrap_err().to_string();
        assert!(err.contains("duplicate sensor name"), "got: {err}");
    }

    #[test]
    fn test_world_name_reserved() {
        let mut bp = minimal_blueprint();
        bp.sensors.push(SensorDescriptor::new("world", SensorKind::Rgb));
        let err = validate(&bp).unwrap_err().to_string();
        assert!(err.contains("reserved"), "got: {err}");
    }

    #[test]
    fn test_empty_sensor_name_caught_by_ranges() {
        let mut bp = minimal_blueprint();
        bp.sensors.push(SensorDescriptor::new("", SensorKind::Rgb));
        assert!(matches!(
            validate(&bp),
            Err(ContractError::ConfigValidation { .. })
        ));
    }

    #[test]
    fn test_non_positive_delta_time() {
        let mut bp = minimal_blueprint();
        bp.timing.delta_time = 0.0;
        assert!(validate(&bp).is_err());
    }

    #[test]
    fn test_sensor_tick_shorter_than_step() {
        let mut bp = minimal_blueprint();
        bp.sensors[0]
            .options
            .insert("sensor_tick".into(), "0.005".into());
        let err = validate(&bp).unwrap_err().to_string();
        assert!(err.contains("shorter than delta_time"), "got: {err}");
    }

    #[test]
    fn test_sensor_tick_not_numeric() {
        let mut bp = minimal_blueprint();
        bp.sensors[0]
            .options
            .insert("sensor_tick".into(), "soon".into());
        let err = validate(&bp).unwrap_err().to_string();
        assert!(err.contains("not a number"), "got: {err}");
    }

    #[test]
    fn test_file_sink_requires_path() {
        let mut bp = minimal_blueprint();
        bp.outputs.push(SinkConfig {
            name: "dataset".into(),
            sink_type: SinkType::File,
            queue_capacity: 16,
            params: HashMap::new(),
        });
        let err = validate(&bp).unwrap_err().to_string();
        assert!(err.contains("requires 'path'"), "got: {err}");
    }

    #[test]
    fn test_empty_sink_name() {
        let mut bp = minimal_blueprint();
        bp.outputs[0].name = String::new();
        let err = validate(&bp).unwrap_err().to_string();
        assert!(err.contains("cannot be empty"), "got: {err}");
    }

    #[test]
    fn test_stall_threshold_zero() {
        let mut bp = minimal_blueprint();
        bp.timing.stall_threshold = 0;
        assert!(validate(&bp).is_err());
    }

    #[test]
    fn test_non_finite_read_timeout() {
        for value in [f64::INFINITY, f64::NAN] {
            let mut bp = minimal_blueprint();
            bp.timing.read_timeout_sec = value;
            let err = validate(&bp).unwrap_err().to_string();
            assert!(err.contains("timing.read_timeout_sec"), "got: {err}");
            assert!(err.contains("finite"), "got: {err}");
        }
    }

    #[test]
    fn test_time_value_upper_bound() {
        let mut bp = minimal_blueprint();
        bp.world.client_timeout_sec = 1e30;
        let err = validate(&bp).unwrap_err().to_string();
        assert!(err.contains("exceeds"), "got: {err}");

        let mut bp = minimal_blueprint();
        bp.sensors[0]
            .options
            .insert("sensor_tick".into(), "inf".into());
        let err = validate(&bp).unwrap_err().to_string();
        assert!(err.contains("finite"), "got: {err}");
    }
}
