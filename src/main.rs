//! MAP collector: binary entrypoint.
//!
//! `run` is the cron-style trigger; `serve` boots the Axum query API with a
//! background ticker that asks the scheduler every `server.tick_secs`.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::process::ExitCode;
use std::time::Duration;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use map_collector::metrics::Metrics;
use map_collector::{api, App, CollectorConfig, ScheduleOutcome, SkipReason};

#[derive(Parser)]
#[command(name = "map-collector")]
#[command(about = "Headline collection pipeline and scheduler for the MAP terminal")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the collector if the schedule says it is due
    Run {
        /// Ignore enabled flag, quiet hours and interval (not a live lock)
        #[arg(long)]
        force: bool,
    },

    /// Run the pipeline once, without scheduling or locking
    Collect,

    /// Print scheduler status as JSON
    Status,

    /// Enable scheduled runs
    Enable,

    /// Disable scheduled runs
    Disable,

    /// Serve the HTTP API and tick the scheduler in the background
    Serve,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("map_collector=info,warn"));
    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json().with_writer(std::io::stderr)).init();
    } else {
        registry.with(fmt::layer().compact().with_writer(std::io::stderr)).init();
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();
    init_tracing();

    match run().await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "map-collector failed");
            eprintln!("Error: {:#}", e);
            ExitCode::from(1)
        }
    }
}

async fn run() -> Result<ExitCode> {
    let cli = Cli::parse();
    let config = CollectorConfig::load().context("loading configuration")?;
    tracing::debug!(profile = ?config.profile, dir = %config.storage.dir.display(), "configuration loaded");
    let app = App::from_config(config)?;

    match cli.command {
        Commands::Run { force } => {
            let outcome = if force {
                app.service.run_now().await?
            } else {
                app.service.run_scheduled().await?
            };
            Ok(report(&outcome))
        }
        Commands::Collect => {
            let result = app.coordinator.run_once().await;
            if result.success {
                println!(
                    "Collected {} items in {}s",
                    result.items_count, result.execution_time
                );
                Ok(ExitCode::SUCCESS)
            } else {
                println!(
                    "Collection failed: {}",
                    result.error.as_deref().unwrap_or("unknown error")
                );
                Ok(ExitCode::from(1))
            }
        }
        Commands::Status => {
            let status = app.service.get_status().await;
            println!("{}", serde_json::to_string_pretty(&status)?);
            Ok(ExitCode::SUCCESS)
        }
        Commands::Enable => toggle(&app, true).await,
        Commands::Disable => toggle(&app, false).await,
        Commands::Serve => serve(app).await.map(|()| ExitCode::SUCCESS),
    }
}

async fn toggle(app: &App, enabled: bool) -> Result<ExitCode> {
    app.service.set_enabled(enabled).await?;
    println!("Scheduler {}", if enabled { "enabled" } else { "disabled" });
    Ok(ExitCode::SUCCESS)
}

/// One-line summary on stdout; exit 0 on success or skip.
fn report(outcome: &ScheduleOutcome) -> ExitCode {
    match outcome {
        ScheduleOutcome::Skipped(reason) => {
            match reason {
                SkipReason::AlreadyRunning => println!("Skipped: a run is already in progress"),
                other => println!("Scraping conditions not met ({other})"),
            }
            ExitCode::SUCCESS
        }
        ScheduleOutcome::Completed(report) if report.succeeded() => {
            println!(
                "Scraping completed: {} items in {}s",
                report.result.items_count, report.result.execution_time
            );
            ExitCode::SUCCESS
        }
        ScheduleOutcome::Completed(report) => {
            let msg = report
                .error()
                .map(|e| e.to_string())
                .unwrap_or_else(|| "unknown error".into());
            println!("Scraping failed: {msg}");
            ExitCode::from(1)
        }
    }
}

async fn serve(app: App) -> Result<()> {
    let metrics = Metrics::init()?;
    let router = api::create_router(app.service.clone()).merge(metrics.router());

    let tick = Duration::from_secs(app.config.server.tick_secs);
    let svc = app.service.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(tick);
        loop {
            ticker.tick().await;
            match svc.run_scheduled().await {
                Ok(ScheduleOutcome::Skipped(reason)) => tracing::debug!(%reason, "tick skipped"),
                Ok(ScheduleOutcome::Completed(r)) => {
                    tracing::info!(success = r.succeeded(), items = r.result.items_count, "tick run finished")
                }
                Err(e) => tracing::warn!(error = %e, "tick run errored"),
            }
        }
    });

    let listener = tokio::net::TcpListener::bind(&app.config.server.bind)
        .await
        .with_context(|| format!("binding {}", app.config.server.bind))?;
    tracing::info!(bind = %app.config.server.bind, "map-collector API listening");
    axum::serve(listener, router).await.context("http server")?;
    Ok(())
}
