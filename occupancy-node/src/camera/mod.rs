use async_trait::async_trait;
use chrono::{DateTime, Utc};
use image::RgbImage;

use crate::error::Result;

pub mod snapshot;

pub use snapshot::HttpSnapshotSource;

/// One decoded frame and the moment it was captured.
#[derive(Debug, Clone)]
pub struct Frame {
    pub image: RgbImage,
    pub captured_at: DateTime<Utc>,
}

impl Frame {
    pub fn new(image: RgbImage, captured_at: DateTime<Utc>) -> Self {
        Self { image, captured_at }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

/// Opens streams by address. Shared by every worker of a fleet.
#[async_trait]
pub trait FrameSource: Send + Sync {
    async fn open(&self, address: &str) -> Result<Box<dyn StreamHandle>>;

    /// Whether `address` is a kind of stream this source can open. Checked
    /// when a camera is admitted, before any connection is attempted.
    fn supports(&self, _address: &str) -> bool {
        true
    }
}

/// An open stream, exclusively owned by one camera worker.
#[async_trait]
pub trait StreamHandle: Send {
    async fn next_frame(&mut self) -> Result<Frame>;

    /// Releases the stream. Calling it more than once is harmless.
    async fn close(&mut self) -> Result<()>;
}
