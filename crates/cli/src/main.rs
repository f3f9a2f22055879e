mod bootstrap;
mod cli;

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use skytrack_core::config::load_dotenv;
use skytrack_core::{Config, IngestionRun, Window};
use skytrack_ingest::{JobRunner, Scheduler, SchedulerOptions};

use crate::cli::CliArgs;

#[tokio::main]
async fn main() -> ExitCode {
    load_dotenv();
    let args = CliArgs::parse();
    init_tracing(args.log_level.as_deref());

    match run(args).await {
        Ok(code) => code,
        Err(e) => {
            error!(error = %format!("{e:#}"), "skytrack exited with an error");
            ExitCode::FAILURE
        }
    }
}

/// `--log-level` / `LOG_LEVEL` win over `RUST_LOG`; default is `info`.
fn init_tracing(level: Option<&str>) {
    let filter = level
        .and_then(|l| EnvFilter::try_new(l).ok())
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

async fn run(args: CliArgs) -> Result<ExitCode> {
    let config = args.load_config();
    config.log_summary();

    if args.show_config {
        println!("{}", serde_json::to_string_pretty(&config.redacted_summary())?);
        return Ok(ExitCode::SUCCESS);
    }

    let notifier = Arc::new(bootstrap::notifier(&config).await);

    let runner = match bootstrap::runner(&config, notifier.clone()).await {
        Ok(runner) => runner,
        Err(fault) => {
            let window = bootstrap::window_policy(&config)
                .map(|p| p.current())
                .unwrap_or_else(|_| Window::instant(Utc::now()));
            let run = JobRunner::construction_failure(fault, window, &notifier).await;
            notifier.flush().await;
            print_run(&run)?;
            return Ok(ExitCode::FAILURE);
        }
    };

    if args.run_once {
        info!("Single-run mode");
        let run = runner.run_once().await;
        notifier.flush().await;
        print_run(&run)?;
        return Ok(ExitCode::SUCCESS);
    }

    let result = run_scheduled(&config, runner).await;
    notifier.flush().await;
    result?;
    Ok(ExitCode::SUCCESS)
}

async fn run_scheduled(config: &Config, runner: JobRunner) -> Result<()> {
    let options = SchedulerOptions::new(
        Duration::from_secs(config.scheduler.interval_secs),
        config.scheduler.run_on_start,
    );
    let mut scheduler = Scheduler::new(Arc::new(runner), options);
    scheduler
        .run_until_signal()
        .await
        .context("scheduler terminated abnormally")?;

    let stats = scheduler.stats();
    info!(
        ticks = stats.ticks(),
        runs = stats.runs_completed(),
        failed = stats.runs_failed(),
        skipped = stats.ticks_skipped(),
        "Scheduler stopped"
    );
    Ok(())
}

fn print_run(run: &IngestionRun) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(run)?);
    Ok(())
}
