#![doc = include_str!("../README.md")]

mod app;

use anyhow::Context;
use app::config::{AppConfig, CliArgs};
use app::driver::{read_payloads, run};
use app::telemetry::init_telemetry;
use clap::Parser;
use std::io::{self, BufWriter};
use tokio::signal;

// Using mimalloc for better performance under contention, especially in musl
// environments.
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load from .env
    let _ = dotenvy::dotenv();
    let args = CliArgs::parse();
    let config = AppConfig::try_from(args)?;

    let providers = init_telemetry()?;

    let payloads = match config.jobs.clone() {
        Some(jobs) => jobs,
        None => read_payloads(io::stdin().lock()).context("failed to read inputs from stdin")?,
    };
    log_startup_info(&config, payloads.len());

    let outcome = {
        let mut out = BufWriter::new(io::stdout().lock());
        run(&config, payloads, &mut out, shutdown_signal()).await
    };

    match &outcome {
        Ok(_summary) => {
            #[cfg(feature = "tracing")]
            tracing::info!(
                "Done: {} submitted, {} emitted, {} failed{}",
                _summary.submitted,
                _summary.emitted,
                _summary.failed,
                if _summary.interrupted { " (interrupted)" } else { "" }
            );
        }
        Err(_e) => {
            #[cfg(feature = "tracing")]
            tracing::error!("Run failed: {:#}", _e);
        }
    }

    providers.shutdown();
    outcome.map(|_| ())
}

fn log_startup_info(_config: &AppConfig, _jobs: usize) {
    if cfg!(debug_assertions) {
        #[cfg(feature = "tracing")]
        tracing::info!("Running {} jobs with full config: {:#?}", _jobs, _config);
    } else {
        #[cfg(feature = "tracing")]
        tracing::info!(
            "Running {} jobs on {} workers",
            _jobs,
            _config.pool.worker_count
        );
    }
}

/// Resolves on Ctrl+C or SIGTERM. A handler that cannot be installed never
/// fires.
async fn shutdown_signal() {
    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(_e) => {
                #[cfg(feature = "tracing")]
                tracing::warn!("Failed to install SIGTERM handler: {_e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let ctrl_c = async {
        if let Err(_e) = signal::ctrl_c().await {
            #[cfg(feature = "tracing")]
            tracing::warn!("Failed to install Ctrl+C handler: {_e}");
            std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        () = ctrl_c => {
            #[cfg(feature = "tracing")]
            tracing::info!("Received Ctrl+C signal");
        },
        () = terminate => {
            #[cfg(feature = "tracing")]
            tracing::info!("Received SIGTERM signal");
        },
    }
}
