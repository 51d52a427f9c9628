//! Scenario file parsing (TOML primary, JSON accepted).

use contracts::{ContractError, ScenarioBlueprint};

/// Config file format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Toml,
    Json,
}

impl ConfigFormat {
    /// Infer format from a file extension
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "toml" => Some(Self::Toml),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

pub fn parse_toml(content: &str) -> Result<ScenarioBlueprint, ContractError> {
    toml::from_str(content).map_err(|e| ContractError::ConfigParse {
        message: format!("TOML parse error: {e}"),
        source: Some(Box::new(e)),
    })
}

pub fn parse_json(content: &str) -> Result<ScenarioBlueprint, ContractError> {
    serde_json::from_str(content).map_err(|e| ContractError::ConfigParse {
        message: format!("JSON parse error: {e}"),
        source: Some(Box::new(e)),
    })
}

pub fn parse(content: &str, format: ConfigFormat) -> Result<ScenarioBlueprint, ContractError> {
    match format {
        ConfigFormat::Toml => parse_toml(content),
        ConfigFormat::Json => parse_json(content),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::SensorKind;

    #[test]
    fn test_parse_toml_sensor_table() {
        let content = r#"
[world]
map = "Town04"
weather = "ClearNoon"

[[sensors]]
name = "flow"
kind = "optical_flow"
options = { sensor_tick = "0.04" }
transform = { location = { x = 2.8, z = 1.8 }, rotation = { pitch = -15.0 } }
"#;
        let bp = parse_toml(content).unwrap();
        let flow = &bp.sensors[0];
        assert_eq!(flow.kind, SensorKind::OpticalFlow);
        assert_eq!(flow.transform.location.x, 2.8);
        assert_eq!(flow.transform.location.y, 0.0);
        assert_eq!(flow.transform.rotation.pitch, -15.0);
        assert_eq!(flow.capture_interval(), Some(0.04));
    }

    #[test]
    fn test_parse_json_minimal() {
        let content = r#"{
            "timing": { "delta_time": 0.01, "start_time": 1.0 },
            "sensors": [{ "name": "events", "kind": "dvs",
                          "options": { "positive_threshold": "0.5" } }],
            "outputs": [{ "name": "log", "sink_type": "log" }]
        }"#;
        let bp = parse_json(content).unwrap();
        assert_eq!(bp.sensors[0].kind, SensorKind::Dvs);
        assert_eq!(bp.outputs.len(), 1);
    }

    #[test]
    fn test_unknown_kind_rejected() {
        let content = r#"
[[sensors]]
name = "lidar"
kind = "lidar"
"#;
        assert!(matches!(
            parse_toml(content),
            Err(ContractError::ConfigParse { .. })
        ));
    }

    #[test]
    fn test_format_from_extension() {
        assert_eq!(ConfigFormat::from_extension("TOML"), Some(ConfigFormat::Toml));
        assert_eq!(ConfigFormat::from_extension("json"), Some(ConfigFormat::Json));
        assert_eq!(ConfigFormat::from_extension("yaml"), None);
    }
}
