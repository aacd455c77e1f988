use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGaugeVec, Opts, Registry, TextEncoder,
};
use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::error::Result;

pub struct Metrics {
    registry: Registry,
    cycles: IntCounterVec,
    zone_skips: IntCounterVec,
    samples_written: IntCounterVec,
    consecutive_failures: IntGaugeVec,
    cycle_duration: HistogramVec,
}

impl Metrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let cycles = IntCounterVec::new(
            Opts::new("occupancy_cycles_total", "Sampling cycles by outcome"),
            &["camera_id", "outcome"],
        )?;
        let zone_skips = IntCounterVec::new(
            Opts::new(
                "occupancy_zone_skips_total",
                "Zones skipped because counting failed",
            ),
            &["camera_id", "zone"],
        )?;
        let samples_written = IntCounterVec::new(
            Opts::new("occupancy_samples_written_total", "Samples accepted by the sink"),
            &["camera_id"],
        )?;
        let consecutive_failures = IntGaugeVec::new(
            Opts::new(
                "occupancy_consecutive_failures",
                "Failed cycles since the last successful one",
            ),
            &["camera_id"],
        )?;
        let cycle_duration = HistogramVec::new(
            HistogramOpts::new(
                "occupancy_cycle_duration_seconds",
                "Wall time of one acquire-mask-count-write cycle",
            )
            .buckets(vec![0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
            &["camera_id"],
        )?;

        registry.register(Box::new(cycles.clone()))?;
        registry.register(Box::new(zone_skips.clone()))?;
        registry.register(Box::new(samples_written.clone()))?;
        registry.register(Box::new(consecutive_failures.clone()))?;
        registry.register(Box::new(cycle_duration.clone()))?;

        Ok(Self {
            registry,
            cycles,
            zone_skips,
            samples_written,
            consecutive_failures,
            cycle_duration,
        })
    }

    pub fn record_cycle_ok(&self, camera_id: &str, elapsed: Duration, samples: usize) {
        self.cycles.with_label_values(&[camera_id, "ok"]).inc();
        self.samples_written
            .with_label_values(&[camera_id])
            .inc_by(samples as u64);
        self.consecutive_failures.with_label_values(&[camera_id]).set(0);
        self.cycle_duration
            .with_label_values(&[camera_id])
            .observe(elapsed.as_secs_f64());
    }

    pub fn record_cycle_failed(&self, camera_id: &str, elapsed: Duration, consecutive: u64) {
        self.cycles.with_label_values(&[camera_id, "failed"]).inc();
        self.consecutive_failures
            .with_label_values(&[camera_id])
            .set(consecutive as i64);
        self.cycle_duration
            .with_label_values(&[camera_id])
            .observe(elapsed.as_secs_f64());
    }

    pub fn record_zone_skip(&self, camera_id: &str, zone: &str) {
        self.zone_skips.with_label_values(&[camera_id, zone]).inc();
    }

    pub fn cycles(&self, camera_id: &str, outcome: &str) -> u64 {
        self.cycles.with_label_values(&[camera_id, outcome]).get()
    }

    pub fn consecutive_failures(&self, camera_id: &str) -> i64 {
        self.consecutive_failures.with_label_values(&[camera_id]).get()
    }

    /// Text exposition of every registered metric.
    pub fn render(&self) -> String {
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        if let Err(e) = encoder.encode(&self.registry.gather(), &mut buffer) {
            warn!("Failed to encode metrics: {}", e);
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}

pub fn metrics_router(metrics: Arc<Metrics>) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(metrics)
}

async fn metrics_handler(State(metrics): State<Arc<Metrics>>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        metrics.render(),
    )
}

/// Serves the Prometheus text format on `GET /metrics` until the task is dropped.
pub async fn start_metrics_server(addr: String, metrics: Arc<Metrics>) -> Result<()> {
    let listener = TcpListener::bind(&addr).await?;
    info!("Metrics endpoint listening on {}", addr);
    axum::serve(listener, metrics_router(metrics)).await?;
    Ok(())
}
