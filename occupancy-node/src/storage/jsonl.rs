use async_trait::async_trait;
use occupancy_common::OccupancySample;
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::SampleSink;
use crate::error::{OccupancyError, Result};

/// Appends one JSON object per sample to a local file. Writes from all
/// workers are serialized through the internal lock.
pub struct JsonLinesSink {
    path: PathBuf,
    file: Mutex<File>,
}

impl JsonLinesSink {
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await
            .map_err(|e| OccupancyError::WriteError(format!("{}: {}", path.display(), e)))?;

        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(file),
        })
    }
}

fn serialize_batch(samples: &[OccupancySample]) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    for sample in samples {
        serde_json::to_writer(&mut buffer, sample)?;
        buffer.push(b'\n');
    }
    Ok(buffer)
}

#[async_trait]
impl SampleSink for JsonLinesSink {
    async fn write(&self, samples: &[OccupancySample]) -> Result<()> {
        if samples.is_empty() {
            return Ok(());
        }

        // Serialize before taking the lock; one write keeps a batch contiguous.
        let buffer = serialize_batch(samples)?;
        let mut file = self.file.lock().await;
        file.write_all(&buffer)
            .await
            .map_err(|e| OccupancyError::WriteError(e.to_string()))?;
        file.flush()
            .await
            .map_err(|e| OccupancyError::WriteError(e.to_string()))?;

        debug!("Appended {} samples to {}", samples.len(), self.path.display());
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        let mut file = self.file.lock().await;
        file.flush()
            .await
            .map_err(|e| OccupancyError::WriteError(e.to_string()))?;
        file.sync_all()
            .await
            .map_err(|e| OccupancyError::WriteError(e.to_string()))?;
        info!("Closed sample file {}", self.path.display());
        Ok(())
    }
}
