//! CLI argument definitions using clap.

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// carla-scenario - record and replay CARLA scenarios, extract sensor datasets
#[derive(Parser, Debug)]
#[command(
    name = "carla-scenario",
    author,
    version,
    about = "Record and replay CARLA scenarios with tick-synchronized sensors",
    long_about = "Drives a CARLA server in synchronous mode, attaches a camera / DVS / \n\
                  optical-flow rig to the ego vehicle, collects exactly one frame-set per \n\
                  simulation tick and writes the extracted data to the configured outputs."
)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true, env = "CARLA_SCENARIO_VERBOSE")]
    pub verbose: u8,

    /// Suppress all output except warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log output format
    #[arg(
        long,
        value_enum,
        default_value = "pretty",
        global = true,
        env = "CARLA_SCENARIO_LOG_FORMAT"
    )]
    pub log_format: LogFormat,

    /// Expose Prometheus metrics on this port
    #[arg(long, global = true, env = "CARLA_SCENARIO_METRICS_PORT")]
    pub metrics_port: Option<u16>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Drive an autopilot ego vehicle and record the drive
    Record(RecordArgs),

    /// Replay a recording and extract the sensor dataset
    Replay(ReplayArgs),

    /// Replay every recording of a directory
    Batch(BatchArgs),

    /// Validate a scenario file without running it
    Validate(ValidateArgs),

    /// Display scenario information
    Info(InfoArgs),
}

/// Options shared by every command that runs a scenario
#[derive(Args, Debug, Clone)]
pub struct ScenarioArgs {
    /// Scenario file (TOML or JSON)
    #[arg(
        short,
        long,
        default_value = "scenario.toml",
        env = "CARLA_SCENARIO_CONFIG"
    )]
    pub config: PathBuf,

    /// Override the CARLA server host
    #[arg(long, env = "CARLA_HOST")]
    pub host: Option<String>,

    /// Override the CARLA server port
    #[arg(long, env = "CARLA_PORT")]
    pub port: Option<u16>,

    /// Override the directory of every file output
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Stop after this many frame-sets (0 = run the full span)
    #[arg(long, default_value = "0")]
    pub max_ticks: u64,

    /// Use the in-process mock host even when built with CARLA support
    #[arg(long)]
    pub mock: bool,
}

#[derive(Args, Debug, Clone)]
pub struct RecordArgs {
    #[command(flatten)]
    pub scenario: ScenarioArgs,

    /// Recorder log to write (default: recording.record_path)
    #[arg(long)]
    pub record_path: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct ReplayArgs {
    #[command(flatten)]
    pub scenario: ScenarioArgs,

    /// Recorder log to replay (default: recording.record_path)
    #[arg(long)]
    pub recording: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct BatchArgs {
    #[command(flatten)]
    pub scenario: ScenarioArgs,

    /// Override batch.input_dir
    #[arg(long)]
    pub input_dir: Option<PathBuf>,

    /// Continue with the next recording when one fails
    #[arg(long)]
    pub keep_going: bool,
}

#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Scenario file to validate
    #[arg(short, long, default_value = "scenario.toml")]
    pub config: PathBuf,

    /// Output validation result as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct InfoArgs {
    /// Scenario file
    #[arg(short, long, default_value = "scenario.toml")]
    pub config: PathBuf,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,

    /// Show per-sensor details
    #[arg(long)]
    pub sensors: bool,

    /// Show output configuration
    #[arg(long)]
    pub outputs: bool,
}

/// Log output format
#[derive(ValueEnum, Clone, Copy, Debug, Default)]
pub enum LogFormat {
    /// JSON structured logging
    Json,
    /// Human-readable pretty format
    #[default]
    Pretty,
    /// Compact single-line format
    Compact,
}

impl From<LogFormat> for observability::LogFormat {
    fn from(format: LogFormat) -> Self {
        match format {
            LogFormat::Json => observability::LogFormat::Json,
            LogFormat::Pretty => observability::LogFormat::Pretty,
            LogFormat::Compact => observability::LogFormat::Compact,
        }
    }
}
