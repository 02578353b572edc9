//! Tekton metrics service: records pipeline runs posted over HTTP and scrapes
//! operator repositories for FBC migration stats, exposed for Prometheus.

mod config;
mod error;
mod git;
mod metrics;
mod operators;
mod scraper;
mod server;
mod tekton;

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::git::GitSyncer;
use crate::metrics::MetricsRegistry;
use crate::scraper::Scraper;

/// Tekton metrics service: pipeline run ingestion and operator repository stats.
#[derive(Parser, Debug)]
#[command(name = "tekton-metrics")]
struct Args {
    /// YAML file mapping repository names to remotes
    #[arg(long, env = "METRICS_OPERATOR_REPOS_CFG_PATH", default_value = "repos.yml")]
    repos_config: PathBuf,

    /// HTTP listen address (API and /metrics)
    #[arg(long, env = "METRICS_LISTEN_ADDR", default_value = "0.0.0.0:8080")]
    listen_addr: String,

    /// Directory the operator repositories are cloned into
    #[arg(long, env = "METRICS_CLONE_DIR", default_value = "/tmp")]
    clone_dir: PathBuf,

    /// Time between repository scrapes
    #[arg(
        long,
        env = "METRICS_SYNC_INTERVAL_SECS",
        default_value_t = scraper::SYNC_INTERVAL.as_secs(),
        value_parser = clap::value_parser!(u64).range(1..=MAX_SYNC_INTERVAL_SECS)
    )]
    sync_interval_secs: u64,
}

/// One year; keeps `tokio::time::interval` deadlines far from `Instant` overflow.
const MAX_SYNC_INTERVAL_SECS: u64 = 365 * 24 * 60 * 60;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive("tekton_metrics=info".parse()?))
        .init();

    let args = Args::parse();

    let repositories = config::load_repositories(&args.repos_config)
        .with_context(|| format!("loading {}", args.repos_config.display()))?;
    let registry = MetricsRegistry::new().context("building metrics registry")?;
    let interval = Duration::from_secs(args.sync_interval_secs);
    let shutdown = CancellationToken::new();

    // Background: one scrape loop per registered repository
    let syncer = Arc::new(GitSyncer);
    let mut scrapers = JoinSet::new();
    for repository in repositories {
        tracing::info!(repository = %repository.name, url = %repository.url, "starting scraper");
        let scraper = Scraper::new(
            repository,
            &args.clone_dir,
            interval,
            syncer.clone(),
            registry.clone(),
        );
        scrapers.spawn(scraper.run(shutdown.clone()));
    }

    let listener = tokio::net::TcpListener::bind(&args.listen_addr)
        .await
        .with_context(|| format!("binding {}", args.listen_addr))?;
    tracing::info!(addr = %args.listen_addr, "listening");
    axum::serve(listener, server::router(registry).into_make_service())
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await?;

    // The server may also stop on its own; scrapers must not outlive it.
    shutdown.cancel();
    while let Some(res) = scrapers.join_next().await {
        if let Err(e) = res {
            tracing::warn!(err = %e, "scraper task failed");
        }
    }
    tracing::info!("stopped");
    Ok(())
}

/// Resolves on SIGINT/SIGTERM and cancels `shutdown`.
async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(err = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::warn!(err = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
        _ = shutdown.cancelled() => {}
    }
    tracing::info!("shutting down");
    shutdown.cancel();
}
