//! Censor Server
//!
//! HTTP front end for the censor moderation engine.
//!
//! Accepts submissions for review, receives provider callbacks, serves
//! field bindings and violation snapshots, and exposes the manual review
//! queue. Async provider results are also collected by a background poller.

use anyhow::Result;
use clap::Parser;
use metrics_exporter_prometheus::PrometheusHandle;
use std::net::SocketAddr;
use tokio::signal;
use tracing::{info, warn};

mod config;
mod routes;
mod state;

use config::CensorConfig;

#[derive(Parser, Debug)]
#[command(name = "censor-server")]
#[command(about = "Content moderation orchestration service", long_about = None)]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "config.yaml")]
    config: String,

    /// Listen address
    #[arg(short = 'l', long)]
    listen: Option<String>,

    /// Listen port
    #[arg(short = 'P', long)]
    port: Option<u16>,

    /// Primary provider name
    #[arg(short, long, env = "CENSOR_PRIMARY_PROVIDER")]
    primary: Option<String>,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = CensorConfig::load(&cli.config, &cli)?;
    init_tracing(cli.verbose, config.server.json_logs);

    info!("Starting censor server");
    info!(
        primary = %config.client.pipeline.primary,
        secondary = ?config.client.pipeline.secondary,
        manual = config.manual.is_some(),
        "Configuration loaded"
    );

    let metrics_handle = init_metrics()?;

    let state = state::AppState::new(config.clone(), metrics_handle)?;
    if config.server.enable_poller {
        state.poller.start();
    }

    let addr: SocketAddr = format!("{}:{}", config.server.listen, config.server.port).parse()?;
    let app = routes::create_router(state.clone());

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Listening on http://{}", addr);

    let shutdown = async {
        shutdown_signal().await;
        warn!("Shutdown signal received, stopping server...");
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    state.shutdown().await;
    info!("Server shutdown complete");
    Ok(())
}

/// Listen for shutdown signals (SIGTERM, SIGINT)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
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

fn init_tracing(verbose: bool, json: bool) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = if verbose {
        EnvFilter::new("censor=debug,tower_http=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("censor=info"))
    };

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Install the Prometheus recorder and return the handle `/metrics` renders
fn init_metrics() -> Result<PrometheusHandle> {
    use metrics_exporter_prometheus::PrometheusBuilder;

    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| anyhow::anyhow!("Failed to install metrics: {}", e))?;

    metrics::describe_counter!("censor_submissions_total", "Total number of submissions");
    metrics::describe_counter!(
        "censor_dedup_hits_total",
        "Resources answered from an unchanged binding"
    );
    metrics::describe_counter!(
        "censor_resource_decisions_total",
        "Resource outcomes by decision"
    );
    metrics::describe_histogram!(
        "censor_pipeline_latency_us",
        metrics::Unit::Microseconds,
        "Provider pipeline latency in microseconds"
    );
    metrics::describe_counter!(
        "censor_async_completions_total",
        "Async provider results applied, by delivery path"
    );
    metrics::describe_counter!(
        "censor_poller_tasks_total",
        "Tasks examined by the poller, by provider and outcome"
    );
    metrics::describe_counter!(
        "censor_callbacks_total",
        "Provider callbacks received, by provider and outcome"
    );

    info!("Metrics exporter initialized");
    Ok(handle)
}
