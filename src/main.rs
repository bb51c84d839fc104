// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

use anyhow::Result;
use clap::Parser;
use popdns::{
    config::{Cli, Command, Settings},
    constants::{METRICS_SERVER_BIND_ADDRESS, TOKIO_WORKER_THREADS},
    context::Context,
    metrics,
    reconcilers::{check_endpoints, PassStatus, RunToken},
};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

fn main() -> Result<()> {
    // Build Tokio runtime with custom thread names
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(TOKIO_WORKER_THREADS)
        .thread_name("popdns-worker")
        .enable_all()
        .build()?;

    runtime.block_on(async_main())
}

async fn async_main() -> Result<()> {
    // Respects RUST_LOG (default INFO) and RUST_LOG_FORMAT (text or json)
    // Example: RUST_LOG=debug RUST_LOG_FORMAT=json popdns sync
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let log_format = std::env::var("RUST_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    match log_format.to_lowercase().as_str() {
        "json" => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_file(true)
                .with_line_number(true)
                .with_thread_names(true)
                .with_target(false)
                .json()
                .init();
        }
        _ => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_file(true)
                .with_line_number(true)
                .with_thread_names(true)
                .with_target(false)
                .with_ansi(true)
                .compact()
                .init();
        }
    }

    let cli = Cli::parse();
    info!("Starting popdns");
    debug!("Logging initialized with file and line number tracking");

    // Configuration errors end the run before any network activity
    let requires_provider = !matches!(cli.command, Command::Check { .. });
    let validated = cli
        .command
        .validate()
        .and_then(|()| Settings::from_args(&cli.global, requires_provider));
    let settings = match validated {
        Ok(settings) => settings,
        Err(e) => {
            error!(error = %e, "Invalid configuration");
            return Err(e.into());
        }
    };

    match cli.command {
        Command::Sync => run_sync(settings).await,
        Command::Watch {
            interval_secs,
            metrics_port,
        } => run_watch(settings, Duration::from_secs(interval_secs), metrics_port).await,
        Command::Cleanup => run_cleanup(settings).await,
        Command::Check { domain } => run_check(settings, &domain).await,
    }
}

async fn run_sync(settings: Settings) -> Result<()> {
    let context = Context::with_provider(settings)?;
    let reconciler = context.reconciler()?;
    let pops = context.source.load().await?;
    info!(pops = pops.len(), domains = reconciler.domains().len(), "Running sync pass");

    let summary = reconciler.sync_pass(&pops, &RunToken::standalone()).await;
    println!("{}", serde_json::to_string(&summary)?);
    if summary.batches_failed > 0 {
        anyhow::bail!(
            "{} of {} batches failed",
            summary.batches_failed,
            summary.batches_applied + summary.batches_failed
        );
    }
    Ok(())
}

async fn run_watch(
    settings: Settings,
    interval: Duration,
    metrics_port: Option<u16>,
) -> Result<()> {
    let context = Context::with_provider(settings)?;
    let reconciler = context.reconciler()?;

    if let Some(port) = metrics_port {
        let ip: IpAddr = METRICS_SERVER_BIND_ADDRESS.parse()?;
        let addr = SocketAddr::new(ip, port);
        tokio::spawn(async move {
            if let Err(e) = metrics::serve_metrics(addr).await {
                error!(error = %e, "Metrics server exited");
            }
        });
    }

    let tokens = reconciler
        .run_recurring(Arc::clone(&context.source), interval, shutdown_signal())
        .await;
    info!(last_run_id = tokens.current(), "Recurring sync stopped");
    Ok(())
}

async fn run_cleanup(settings: Settings) -> Result<()> {
    let context = Context::with_provider(settings)?;
    let reconciler = context.reconciler()?;
    let pops = context.source.load().await?;
    info!(pops = pops.len(), "Running cleanup pass");

    let summary = reconciler
        .cleanup_pass(&pops, &RunToken::standalone())
        .await?;
    println!("{}", serde_json::to_string(&summary)?);
    if summary.status != PassStatus::Completed || summary.batches_failed > 0 {
        anyhow::bail!("Cleanup did not complete: {} batches failed", summary.batches_failed);
    }
    Ok(())
}

async fn run_check(settings: Settings, domain: &str) -> Result<()> {
    let domain = domain.trim().trim_end_matches('.').to_lowercase();
    let context = Context::resolution_only(settings)?;
    let pops = context.source.load().await?;
    info!(pops = pops.len(), domain = %domain, "Checking PoP endpoints");

    let reports = check_endpoints(&context.changes, &domain, &pops).await;
    for report in &reports {
        println!("{}", serde_json::to_string(report)?);
    }
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received Ctrl+C"),
        () = terminate => info!("Received SIGTERM"),
    }
}
