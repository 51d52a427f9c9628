//! ScenarioBlueprint - Config Loader output
//!
//! Describes a full scenario: host connection, step timing, camera
//! resolution, ego vehicle, sensors, recording and output routing.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use validator::Validate;

use crate::{SensorDescriptor, StepTiming};

/// Config version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConfigVersion {
    #[default]
    V1,
}

/// Complete scenario blueprint
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct ScenarioBlueprint {
    #[serde(default)]
    pub version: ConfigVersion,

    #[validate(nested)]
    #[serde(default)]
    pub world: WorldConfig,

    #[validate(nested)]
    #[serde(default)]
    pub timing: TimingConfig,

    #[validate(nested)]
    #[serde(default)]
    pub resolution: Resolution,

    #[serde(default)]
    pub ego: EgoConfig,

    #[validate(nested)]
    #[serde(default)]
    pub recording: RecordingConfig,

    /// Sensors in registration order
    #[validate(nested)]
    #[serde(default)]
    pub sensors: Vec<SensorDescriptor>,

    #[serde(default)]
    pub outputs: Vec<SinkConfig>,

    /// Batch replay of a directory of recordings
    #[serde(default)]
    pub batch: Option<BatchConfig>,
}

/// Host connection and world setup
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct WorldConfig {
    /// Map to load (e.g. "Town02"); keep the current one if unset
    #[serde(default)]
    pub map: Option<String>,

    #[serde(default)]
    pub weather: Option<WeatherPreset>,

    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Client RPC timeout
    #[validate(range(exclusive_min = 0.0))]
    #[serde(default = "default_client_timeout")]
    pub client_timeout_sec: f64,

    /// Pause after loading the map, letting the server settle
    #[validate(range(min = 0.0))]
    #[serde(default = "default_init_sleep")]
    pub init_sleep_sec: f64,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            map: None,
            weather: None,
            host: default_host(),
            port: default_port(),
            client_timeout_sec: default_client_timeout(),
            init_sleep_sec: default_init_sleep(),
        }
    }
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    2000
}

fn default_client_timeout() -> f64 {
    10.0
}

fn default_init_sleep() -> f64 {
    5.0
}

/// Step timing and read policy
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct TimingConfig {
    /// Fixed simulated seconds per tick
    #[validate(range(exclusive_min = 0.0))]
    #[serde(default = "default_delta_time")]
    pub delta_time: f64,

    /// Warm-up span in simulated seconds
    #[validate(range(min = 0.0))]
    #[serde(default = "default_start_time")]
    pub start_time: f64,

    /// Upper bound of one blocking queue pop
    #[validate(range(exclusive_min = 0.0))]
    #[serde(default = "default_read_timeout")]
    pub read_timeout_sec: f64,

    /// Consecutive timed-out reads before a sensor counts as stalled
    #[validate(range(min = 1))]
    #[serde(default = "default_stall_threshold")]
    pub stall_threshold: u32,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            delta_time: default_delta_time(),
            start_time: default_start_time(),
            read_timeout_sec: default_read_timeout(),
            stall_threshold: default_stall_threshold(),
        }
    }
}

impl TimingConfig {
    pub fn step_timing(&self) -> StepTiming {
        StepTiming::new(self.delta_time, self.start_time)
    }

    /// Falls back to the default timeout when the value is not representable
    pub fn read_timeout(&self) -> std::time::Duration {
        std::time::Duration::try_from_secs_f64(self.read_timeout_sec)
            .unwrap_or_else(|_| std::time::Duration::from_secs_f64(default_read_timeout()))
    }
}

fn default_delta_time() -> f64 {
    0.1
}

fn default_start_time() -> f64 {
    0.5
}

fn default_read_timeout() -> f64 {
    2.0
}

fn default_stall_threshold() -> u32 {
    3
}

/// Camera resolution applied to every sensor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct Resolution {
    #[validate(range(min = 1))]
    pub height: u32,
    #[validate(range(min = 1))]
    pub width: u32,
}

impl Default for Resolution {
    fn default() -> Self {
        Self {
            height: 260,
            width: 346,
        }
    }
}

/// Ego vehicle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EgoConfig {
    #[serde(default = "default_ego_blueprint")]
    pub blueprint: String,

    /// Role used to find the vehicle again during replay
    #[serde(default = "default_role_name")]
    pub role_name: String,

    #[serde(default = "default_true")]
    pub autopilot: bool,
}

impl Default for EgoConfig {
    fn default() -> Self {
        Self {
            blueprint: default_ego_blueprint(),
            role_name: default_role_name(),
            autopilot: true,
        }
    }
}

fn default_ego_blueprint() -> String {
    "vehicle.tesla.cybertruck".to_string()
}

fn default_role_name() -> String {
    "hero".to_string()
}

fn default_true() -> bool {
    true
}

/// Recording / replay parameters
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct RecordingConfig {
    /// Recorder log file (written in record mode, read in replay mode)
    #[serde(default)]
    pub record_path: Option<PathBuf>,

    /// Simulated second at which recording starts
    #[validate(range(min = 0.0))]
    #[serde(default = "default_record_start")]
    pub record_start_time: f64,

    /// Length of the recorded / replayed span in simulated seconds
    #[validate(range(exclusive_min = 0.0))]
    #[serde(default = "default_record_delta")]
    pub record_delta_time: f64,
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            record_path: None,
            record_start_time: default_record_start(),
            record_delta_time: default_record_delta(),
        }
    }
}

fn default_record_start() -> f64 {
    20.0
}

fn default_record_delta() -> f64 {
    60.0
}

/// Host weather preset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WeatherPreset {
    Default,
    ClearNoon,
    CloudyNoon,
    WetNoon,
    WetCloudyNoon,
    SoftRainNoon,
    MidRainyNoon,
    HardRainNoon,
    ClearSunset,
    CloudySunset,
    WetSunset,
    WetCloudySunset,
    SoftRainSunset,
    MidRainSunset,
    HardRainSunset,
}

impl WeatherPreset {
    pub const ALL: [WeatherPreset; 15] = [
        WeatherPreset::Default,
        WeatherPreset::ClearNoon,
        WeatherPreset::CloudyNoon,
        WeatherPreset::WetNoon,
        WeatherPreset::WetCloudyNoon,
        WeatherPreset::SoftRainNoon,
        WeatherPreset::MidRainyNoon,
        WeatherPreset::HardRainNoon,
        WeatherPreset::ClearSunset,
        WeatherPreset::CloudySunset,
        WeatherPreset::WetSunset,
        WeatherPreset::WetCloudySunset,
        WeatherPreset::SoftRainSunset,
        WeatherPreset::MidRainSunset,
        WeatherPreset::HardRainSunset,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            WeatherPreset::Default => "Default",
            WeatherPreset::ClearNoon => "ClearNoon",
            WeatherPreset::CloudyNoon => "CloudyNoon",
            WeatherPreset::WetNoon => "WetNoon",
            WeatherPreset::WetCloudyNoon => "WetCloudyNoon",
            WeatherPreset::SoftRainNoon => "SoftRainNoon",
            WeatherPreset::MidRainyNoon => "MidRainyNoon",
            WeatherPreset::HardRainNoon => "HardRainNoon",
            WeatherPreset::ClearSunset => "ClearSunset",
            WeatherPreset::CloudySunset => "CloudySunset",
            WeatherPreset::WetSunset => "WetSunset",
            WeatherPreset::WetCloudySunset => "WetCloudySunset",
            WeatherPreset::SoftRainSunset => "SoftRainSunset",
            WeatherPreset::MidRainSunset => "MidRainSunset",
            WeatherPreset::HardRainSunset => "HardRainSunset",
        }
    }
}

impl fmt::Display for WeatherPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WeatherPreset {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted: String = s.chars().filter(|c| *c != '_' && *c != '-').collect();
        Self::ALL
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(&wanted))
            .ok_or_else(|| format!("unknown weather preset '{s}'"))
    }
}

/// Sink output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SinkConfig {
    pub name: String,

    pub sink_type: SinkType,

    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Type-specific parameters (e.g. `path` for file sinks)
    #[serde(default)]
    pub params: HashMap<String, String>,
}

fn default_queue_capacity() -> usize {
    100
}

/// Sink type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SinkType {
    /// Per-tick status log
    Log,
    /// Dataset directory
    File,
}

/// Batch replay settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Directory searched recursively for recordings
    pub input_dir: PathBuf,

    /// One output directory per recording is created below this one
    pub output_dir: PathBuf,

    #[serde(default = "default_recording_extension")]
    pub extension: String,

    /// Filename token -> map name (e.g. "_town2_" -> "Town02")
    #[serde(default)]
    pub towns: BTreeMap<String, String>,

    /// Filename token -> weather preset (e.g. "_cloudy-sunset" -> CloudySunset)
    #[serde(default)]
    pub weathers: BTreeMap<String, WeatherPreset>,
}

fn default_recording_extension() -> String {
    "log".to_string()
}

impl ScenarioBlueprint {
    pub fn step_timing(&self) -> StepTiming {
        self.timing.step_timing()
    }

    pub fn sensor(&self, name: &str) -> Option<&SensorDescriptor> {
        self.sensors.iter().find(|s| s.name == name)
    }

    /// Sensors with the scenario resolution injected as
    /// `image_size_y` / `image_size_x` options.
    pub fn sensors_with_resolution(&self) -> Vec<SensorDescriptor> {
        self.sensors
            .iter()
            .cloned()
            .map(|mut sensor| {
                sensor
                    .options
                    .insert("image_size_y".into(), self.resolution.height.to_string());
                sensor
                    .options
                    .insert("image_size_x".into(), self.resolution.width.to_string());
                sensor
            })
            .collect()
    }
}

/// 3D transform: location + rotation
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Transform {
    /// Meters
    #[serde(default)]
    pub location: Location,

    /// Degrees
    #[serde(default)]
    pub rotation: Rotation,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Location {
    #[serde(default)]
    pub x: f64,
    #[serde(default)]
    pub y: f64,
    #[serde(default)]
    pub z: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rotation {
    #[serde(default)]
    pub pitch: f64,
    #[serde(default)]
    pub yaw: f64,
    #[serde(default)]
    pub roll: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SensorKind;

    fn sample_blueprint() -> ScenarioBlueprint {
        ScenarioBlueprint {
            version: ConfigVersion::V1,
            world: WorldConfig::default(),
            timing: TimingConfig {
                delta_time: 0.04,
                start_time: 1.0,
                ..TimingConfig::default()
            },
            resolution: Resolution::default(),
            ego: EgoConfig::default(),
            recording: RecordingConfig::default(),
            sensors: vec![
                SensorDescriptor::new("gray", SensorKind::Gray).with_option("sensor_tick", "0.12"),
                SensorDescriptor::new("events", SensorKind::Dvs),
            ],
            outputs: vec![],
            batch: None,
        }
    }

    #[test]
    fn test_resolution_injected_into_options() {
        let blueprint = sample_blueprint();
        let sensors = blueprint.sensors_with_resolution();
        assert_eq!(sensors[0].options.get("image_size_y").map(String::as_str), Some("260"));
        assert_eq!(sensors[0].options.get("image_size_x").map(String::as_str), Some("346"));
        assert_eq!(sensors[0].options.get("sensor_tick").map(String::as_str), Some("0.12"));
        assert!(blueprint.sensors[1].options.is_empty());
    }

    #[test]
    fn test_step_timing() {
        let blueprint = sample_blueprint();
        let timing = blueprint.step_timing();
        assert_eq!(timing.warmup_ticks(), 25);
        let gray = blueprint.sensor("gray").unwrap();
        assert_eq!(gray.decimation_period(&timing), 3);
    }

    #[test]
    fn test_derived_validation() {
        let mut blueprint = sample_blueprint();
        assert!(blueprint.validate().is_ok());
        blueprint.timing.delta_time = 0.0;
        assert!(blueprint.validate().is_err());
    }

    #[test]
    fn test_weather_parse_lenient() {
        assert_eq!("CloudySunset".parse::<WeatherPreset>(), Ok(WeatherPreset::CloudySunset));
        assert_eq!("cloudy_sunset".parse::<WeatherPreset>(), Ok(WeatherPreset::CloudySunset));
        assert_eq!("clear-noon".parse::<WeatherPreset>(), Ok(WeatherPreset::ClearNoon));
        assert!("Blizzard".parse::<WeatherPreset>().is_err());
    }

    #[test]
    fn test_read_timeout_never_panics() {
        let mut timing = TimingConfig {
            read_timeout_sec: 0.25,
            ..TimingConfig::default()
        };
        assert_eq!(timing.read_timeout(), std::time::Duration::from_millis(250));

        for value in [f64::INFINITY, f64::NAN, -1.0] {
            timing.read_timeout_sec = value;
            assert_eq!(timing.read_timeout(), std::time::Duration::from_secs(2));
        }
    }
}
