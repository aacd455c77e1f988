use async_trait::async_trait;
use chrono::Utc;
use std::time::Duration;
use tracing::{debug, info};

use super::{Frame, FrameSource, StreamHandle};
use crate::config::SourceConfig;
use crate::error::{OccupancyError, Result};

/// Pulls single JPEG/PNG snapshots from an HTTP(S) endpoint, one request per
/// frame. The stream address is the snapshot URL itself.
#[derive(Clone)]
pub struct HttpSnapshotSource {
    client: reqwest::Client,
}

impl HttpSnapshotSource {
    pub fn new(config: &SourceConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| OccupancyError::ConfigError(format!("HTTP client: {}", e)))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl FrameSource for HttpSnapshotSource {
    fn supports(&self, address: &str) -> bool {
        address.starts_with("http://") || address.starts_with("https://")
    }

    async fn open(&self, address: &str) -> Result<Box<dyn StreamHandle>> {
        if !self.supports(address) {
            return Err(OccupancyError::ConfigError(format!(
                "snapshot source needs an http(s) address, got {}",
                address
            )));
        }
        let response = self.client.get(address).send().await.map_err(|e| {
            OccupancyError::AcquisitionError(format!("cannot reach {}: {}", address, e))
        })?;
        if !response.status().is_success() {
            return Err(OccupancyError::AcquisitionError(format!(
                "{} answered {}",
                address,
                response.status()
            )));
        }

        info!("Opened snapshot stream {}", address);
        Ok(Box::new(SnapshotHandle {
            client: self.client.clone(),
            address: address.to_string(),
            closed: false,
        }))
    }
}

struct SnapshotHandle {
    client: reqwest::Client,
    address: String,
    closed: bool,
}

#[async_trait]
impl StreamHandle for SnapshotHandle {
    async fn next_frame(&mut self) -> Result<Frame> {
        if self.closed {
            return Err(OccupancyError::AcquisitionError(format!(
                "stream {} already closed",
                self.address
            )));
        }

        let response = self
            .client
            .get(&self.address)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| OccupancyError::AcquisitionError(e.to_string()))?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| OccupancyError::AcquisitionError(e.to_string()))?;
        let captured_at = Utc::now();

        let image = tokio::task::spawn_blocking(move || decode_frame(&bytes))
            .await
            .map_err(|e| OccupancyError::AcquisitionError(format!("decoder task: {}", e)))??;
        debug!(
            width = image.width(),
            height = image.height(),
            "Decoded snapshot from {}",
            self.address
        );

        Ok(Frame::new(image, captured_at))
    }

    async fn close(&mut self) -> Result<()> {
        if !self.closed {
            self.closed = true;
            info!("Released snapshot stream {}", self.address);
        }
        Ok(())
    }
}

fn decode_frame(bytes: &[u8]) -> Result<image::RgbImage> {
    let decoded = image::load_from_memory(bytes)
        .map_err(|e| OccupancyError::AcquisitionError(format!("undecodable frame: {}", e)))?;
    Ok(decoded.to_rgb8())
}
