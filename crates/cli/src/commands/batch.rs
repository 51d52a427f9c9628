//! `batch` command implementation.

use anyhow::{Context, Result};
use carla_scenario_cli::{discover_jobs, job_blueprint, RunMode};
use tracing::{error, info, warn};

use super::scenario::{drive, load_blueprint, quit_signal};
use crate::cli::BatchArgs;

pub async fn run_batch(args: &BatchArgs) -> Result<()> {
    let blueprint = load_blueprint(&args.scenario)?;
    let mut batch = blueprint
        .batch
        .clone()
        .context("Scenario has no [batch] section")?;
    if let Some(ref input_dir) = args.input_dir {
        batch.input_dir = input_dir.clone();
    }
    if let Some(ref output) = args.scenario.output {
        batch.output_dir = output.clone();
    }

    let jobs = discover_jobs(&batch)
        .with_context(|| format!("Failed to scan {}", batch.input_dir.display()))?;
    if jobs.is_empty() {
        warn!(input_dir = %batch.input_dir.display(), "No recordings found");
        return Ok(());
    }
    info!(recordings = jobs.len(), "Batch started");

    let quit = quit_signal();
    let mut done = 0usize;
    let mut failed = Vec::new();

    for (i, job) in jobs.iter().enumerate() {
        if *quit.borrow() {
            warn!(remaining = jobs.len() - i, "Batch interrupted");
            break;
        }
        info!(
            n = i + 1,
            of = jobs.len(),
            recording = %job.recording.display(),
            output = %job.output_dir.display(),
            "Processing recording"
        );

        let mode = RunMode::Replay {
            recording: job.recording.clone(),
        };
        match drive(job_blueprint(&blueprint, job), mode, &args.scenario, quit.clone()).await {
            Ok(summary) => {
                done += 1;
                println!("\n{summary}");
            }
            Err(e) => {
                error!(recording = %job.recording.display(), error = %format!("{e:#}"), "Recording failed");
                failed.push(job.recording.clone());
                if !args.keep_going {
                    break;
                }
            }
        }
    }

    info!(done, failed = failed.len(), "Batch finished");
    if !failed.is_empty() {
        anyhow::bail!("{} recording(s) failed", failed.len());
    }
    Ok(())
}
