use async_trait::async_trait;
use occupancy_common::OccupancySample;
use std::sync::Arc;
use tracing::info;

use crate::config::SinkConfig;
use crate::error::Result;

pub mod jsonl;
pub mod postgres;

pub use jsonl::JsonLinesSink;
pub use postgres::PostgresSink;

/// Persistence boundary for occupancy samples.
///
/// One instance is shared by every worker of a fleet, so implementations
/// handle their own concurrency. A failed write is reported to the caller
/// and never retried or buffered here.
#[async_trait]
pub trait SampleSink: Send + Sync {
    async fn write(&self, samples: &[OccupancySample]) -> Result<()>;

    /// Releases the underlying connection. Called once, after every worker
    /// has stopped.
    async fn close(&self) -> Result<()>;
}

pub async fn create_sink(config: &SinkConfig) -> Result<Arc<dyn SampleSink>> {
    match config {
        SinkConfig::Postgres {
            url,
            max_connections,
        } => {
            info!("Using PostgreSQL sample sink");
            Ok(Arc::new(PostgresSink::connect(url, *max_connections).await?))
        }
        SinkConfig::Jsonl { path } => {
            info!("Using JSON lines sample sink at {}", path.display());
            Ok(Arc::new(JsonLinesSink::open(path).await?))
        }
    }
}
