//! `record` and `replay` command implementations.

use anyhow::{Context, Result};
use carla_scenario_cli::{
    redirect_file_sinks, DriverOptions, RunMode, RunSummary, ScenarioDriver, StatusDisplay,
};
use contracts::ScenarioBlueprint;
use sim_host::{MockHostConfig, MockSimHost};
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::cli::{RecordArgs, ReplayArgs, ScenarioArgs};

/// Load the scenario file and apply command-line overrides
pub fn load_blueprint(args: &ScenarioArgs) -> Result<ScenarioBlueprint> {
    info!(config = %args.config.display(), "Loading scenario");

    if !args.config.exists() {
        anyhow::bail!("Scenario file not found: {}", args.config.display());
    }
    let mut blueprint = config_loader::ConfigLoader::load_from_path(&args.config)
        .with_context(|| format!("Failed to load scenario from {}", args.config.display()))?;

    if let Some(ref host) = args.host {
        info!(host = %host, "Overriding CARLA host from CLI");
        blueprint.world.host = host.clone();
    }
    if let Some(port) = args.port {
        info!(port, "Overriding CARLA port from CLI");
        blueprint.world.port = port;
    }
    if let Some(ref output) = args.output {
        info!(output = %output.display(), "Redirecting file outputs");
        redirect_file_sinks(&mut blueprint, output);
    }

    info!(
        map = blueprint.world.map.as_deref().unwrap_or("(current)"),
        host = %blueprint.world.host,
        port = blueprint.world.port,
        sensors = blueprint.sensors.len(),
        outputs = blueprint.outputs.len(),
        "Scenario loaded"
    );
    Ok(blueprint)
}

/// Quit flag raised by Ctrl+C or SIGTERM; the driver checks it between ticks
pub fn quit_signal() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        warn!("Received shutdown signal, stopping after the current tick");
        let _ = tx.send(true);
    });
    rx
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Run one scenario on the configured host
pub async fn drive(
    blueprint: ScenarioBlueprint,
    mode: RunMode,
    args: &ScenarioArgs,
    quit: watch::Receiver<bool>,
) -> Result<RunSummary> {
    let options = DriverOptions {
        max_ticks: (args.max_ticks > 0).then_some(args.max_ticks),
        ..DriverOptions::default()
    };

    #[cfg(feature = "real-carla")]
    if !args.mock {
        info!(mode = mode.name(), "Running against CARLA");
        return ScenarioDriver::new(
            sim_host::CarlaHost::new(),
            blueprint,
            mode,
            StatusDisplay::default(),
            quit,
        )
        .with_options(options)
        .run()
        .await
        .context("Scenario run failed");
    }

    info!(mode = mode.name(), "Running against the in-process mock host");
    ScenarioDriver::new(
        MockSimHost::new(MockHostConfig::default()),
        blueprint,
        mode,
        StatusDisplay::default(),
        quit,
    )
    .with_options(options)
    .run()
    .await
    .context("Scenario run failed")
}

pub async fn run_record(args: &RecordArgs) -> Result<()> {
    let blueprint = load_blueprint(&args.scenario)?;
    let record_path = args
        .record_path
        .clone()
        .or_else(|| blueprint.recording.record_path.clone());
    if record_path.is_none() {
        warn!("No recorder path configured, the drive will not be recorded");
    }

    let summary = drive(
        blueprint,
        RunMode::Record { record_path },
        &args.scenario,
        quit_signal(),
    )
    .await?;
    println!("\n{summary}");
    Ok(())
}

pub async fn run_replay(args: &ReplayArgs) -> Result<()> {
    let blueprint = load_blueprint(&args.scenario)?;
    let recording = args
        .recording
        .clone()
        .or_else(|| blueprint.recording.record_path.clone())
        .context("No recording given: pass --recording or set recording.record_path")?;

    let summary = drive(
        blueprint,
        RunMode::Replay { recording },
        &args.scenario,
        quit_signal(),
    )
    .await?;
    println!("\n{summary}");
    Ok(())
}
