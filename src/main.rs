//! Load generator CLI
//!
//! `run` executes a scenario locally and exits non-zero when a threshold is
//! crossed; `serve` turns the process into a WebSocket worker.

use actix_web::{web, App, HttpServer};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use loadforge::config::{normalize_base_url, process_env, resolve_base_url_or, DEFAULT_BASE_URL};
use loadforge::models::dsl_model::{parse_duration, ScenarioConfig};
use loadforge::report::{export_summary, print_summary};
use loadforge::utils::hardware::get_hardware_info;
use loadforge::{run_load_test, ws};

/// Exit code for a run that completed but crossed a threshold.
const THRESHOLDS_FAILED: u8 = 99;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a scenario file, or the built-in review-service scenario
    Run {
        /// Scenario file (JSON)
        #[arg(long)]
        scenario: Option<PathBuf>,

        /// Target base URL; overrides BASE_URL
        #[arg(long)]
        base_url: Option<String>,

        /// Override the number of virtual users
        #[arg(long)]
        vus: Option<u64>,

        /// Override the run duration (e.g. 30s, 1m30s)
        #[arg(long, value_parser = duration_arg)]
        duration: Option<Duration>,

        /// Override the per-request timeout (e.g. 5s, 500ms)
        #[arg(long, value_parser = duration_arg)]
        timeout: Option<Duration>,

        /// Write the summary as JSON to this file
        #[arg(long)]
        summary_export: Option<PathBuf>,
    },

    /// Accept scenarios over WebSocket at /ws
    Serve {
        /// Address to listen on
        #[arg(long, default_value = "127.0.0.1:8080")]
        bind: String,
    },
}

fn duration_arg(value: &str) -> std::result::Result<Duration, String> {
    parse_duration(value).map_err(|e| e.to_string())
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let outcome = match cli.command {
        Commands::Run {
            scenario,
            base_url,
            vus,
            duration,
            timeout,
            summary_export,
        } => tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .context("Failed to start runtime")
            .and_then(|rt| {
                rt.block_on(cmd_run(
                    scenario,
                    base_url,
                    vus,
                    duration,
                    timeout,
                    summary_export,
                ))
            }),
        Commands::Serve { bind } => actix_web::rt::System::new()
            .block_on(cmd_serve(bind))
            .map(|()| ExitCode::SUCCESS),
    };

    match outcome {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn cmd_run(
    scenario: Option<PathBuf>,
    base_url: Option<String>,
    vus: Option<u64>,
    duration: Option<Duration>,
    timeout: Option<Duration>,
    summary_export: Option<PathBuf>,
) -> Result<ExitCode> {
    let mut config = match &scenario {
        Some(path) => ScenarioConfig::from_file(path)
            .with_context(|| format!("Failed to load scenario {}", path.display()))?,
        None => ScenarioConfig::review_service(),
    };
    if let Some(vus) = vus {
        config.vus = vus;
    }
    if let Some(duration) = duration {
        config.duration = duration;
    }
    if let Some(timeout) = timeout {
        config.timeout = timeout;
    }

    let base_url = match base_url {
        Some(url) => normalize_base_url(&url),
        None => {
            let fallback = config.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL);
            resolve_base_url_or(&process_env(), fallback)
        }
    };

    let running = Arc::new(AtomicBool::new(true));
    {
        let running = Arc::clone(&running);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupted, finishing in-flight iterations");
                running.store(false, Ordering::Relaxed);
            }
        });
    }

    let summary = run_load_test(config, base_url, running)
        .await
        .context("Scenario rejected")?;

    print_summary(&summary, &get_hardware_info());

    if let Some(path) = summary_export {
        export_summary(&summary, &path)
            .with_context(|| format!("Failed to write summary to {}", path.display()))?;
        info!(path = %path.display(), "summary exported");
    }

    Ok(if summary.passed {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(THRESHOLDS_FAILED)
    })
}

async fn cmd_serve(bind: String) -> Result<()> {
    info!("worker listening on ws://{}/ws", bind);

    HttpServer::new(|| App::new().route("/ws", web::get().to(ws::ws_handler)))
        .bind(&bind)
        .with_context(|| format!("Failed to bind {bind}"))?
        .run()
        .await
        .context("Worker server failed")
}
