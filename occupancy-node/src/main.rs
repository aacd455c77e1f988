use anyhow::Context;
use clap::Parser;
use occupancy_node::camera::HttpSnapshotSource;
use occupancy_node::config::NodeConfig;
use occupancy_node::counting::RemoteCounter;
use occupancy_node::error::OccupancyError;
use occupancy_node::storage::create_sink;
use occupancy_node::utils::metrics::{self, Metrics};
use occupancy_node::{FleetScheduler, PipelineServices};
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Config file path
    #[arg(short, long, default_value = "config/occupancy.yaml")]
    config: String,

    /// Log level, overrides `logging.level`
    #[arg(short, long)]
    log_level: Option<String>,

    /// Sampling interval in seconds, overrides `sampling.interval_sec`
    #[arg(short, long)]
    interval: Option<u64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = NodeConfig::load(&args.config)
        .with_context(|| format!("loading {}", args.config))?;
    if let Some(interval) = args.interval {
        config.sampling.interval_sec = interval;
        config.validate()?;
    }

    let level = args.log_level.as_deref().unwrap_or(&config.logging.level);
    init_logging(level)?;

    info!("Starting occupancy node {}", config.node_id);

    let metrics = Arc::new(Metrics::new()?);
    if config.monitoring.enable_metrics {
        let metrics_addr = format!("0.0.0.0:{}", config.monitoring.metrics_port);
        let metrics = metrics.clone();
        tokio::spawn(async move {
            if let Err(e) = metrics::start_metrics_server(metrics_addr, metrics).await {
                error!("Metrics server failed: {}", e);
            }
        });
    }

    let services = PipelineServices {
        source: Arc::new(HttpSnapshotSource::new(&config.source)?),
        counter: Arc::new(RemoteCounter::new(&config.counter)?),
        sink: create_sink(&config.sink).await.context("opening sample sink")?,
        metrics,
    };

    let cameras = config.camera_provider().load()?;
    if cameras.is_empty() {
        warn!("No cameras configured");
    }

    let scheduler = FleetScheduler::new(services, config.sampling.backoff.clone());
    let fleet = scheduler
        .start_monitoring(cameras, config.interval())
        .await?;
    for rejected in fleet.rejected() {
        warn!("Camera {} not monitored: {}", rejected.camera_id, rejected.reason);
    }

    wait_for_shutdown().await;

    info!("Shutting down occupancy node");
    scheduler.stop(fleet).await?;
    Ok(())
}

fn init_logging(level: &str) -> Result<(), OccupancyError> {
    let log_level = match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| OccupancyError::ConfigError(e.to_string()))?;

    Ok(())
}

async fn wait_for_shutdown() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
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

    info!("Shutdown signal received");
}
