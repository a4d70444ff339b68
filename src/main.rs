//! CloneKusto - Kusto schema snapshots
//!
//! Captures the live schema of one or more databases (tables, functions and
//! ingestion mappings) into a deterministic tree of `.csl` scripts:
//!
//! ```text
//! <output>/db/<database>/Functions/<folder...>/<function>.csl
//! <output>/db/<database>/Tables/<folder...>/<table>.csl
//! ```
//!
//! Re-running against the same output directory updates it in place, so the
//! tree can be committed and diffed like any other source.

mod auth;
mod config;
mod connection;
mod error;
mod introspection;
mod models;
mod script;
mod snapshot;

use crate::config::{Cli, Settings};
use crate::connection::KustoClientProvider;
use crate::error::AppError;
use crate::snapshot::{SnapshotOrchestrator, SnapshotReport};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize tracing subscriber for structured logging
    init_tracing(cli.verbose);

    let cancel = CancellationToken::new();
    tokio::spawn(shutdown_signal(cancel.clone()));

    match run(cli, &cancel).await {
        Ok(report) => {
            for database in &report.databases {
                info!(
                    "{}: {} tables, {} functions, {} mappings -> {}",
                    database.database,
                    database.tables,
                    database.functions,
                    database.mappings,
                    database.output_dir.display()
                );
            }
            info!(
                "Snapshot complete: {} databases, {} files written in {} ms",
                report.databases.len(),
                report.files_written(),
                report.duration_ms()
            );
            if let Ok(json) = serde_json::to_string(&report) {
                debug!("Run report: {}", json);
            }
        }
        Err(e) => {
            error!("Snapshot failed: {:#}", e);
            let code = e
                .downcast_ref::<AppError>()
                .map(AppError::exit_code)
                .unwrap_or(1);
            std::process::exit(code);
        }
    }
}

async fn run(cli: Cli, cancel: &CancellationToken) -> anyhow::Result<SnapshotReport> {
    let settings = Settings::resolve(cli).map_err(AppError::from)?;
    info!(
        "Snapshotting {} database(s) from {} into {}",
        settings.databases.len(),
        settings.cluster_uri,
        settings.output_root.display()
    );

    let provider = KustoClientProvider::new(&settings.cluster_uri, settings.auth.clone())?;
    let orchestrator = SnapshotOrchestrator::new(provider, &settings.output_root);

    Ok(orchestrator.run(&settings.databases, cancel).await?)
}

/// Initialize tracing with structured logging
fn init_tracing(verbose: bool) {
    let default_filter = if verbose { "info,clone_kusto=debug" } else { "info" };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(verbose).with_level(true).compact())
        .init();
}

/// Cancel the run on Ctrl+C or SIGTERM
async fn shutdown_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
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
                warn!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            warn!("Received Ctrl+C signal, cancelling snapshot...");
        },
        _ = terminate => {
            warn!("Received terminate signal, cancelling snapshot...");
        },
    }

    cancel.cancel();
}
