use async_trait::async_trait;
use image::{DynamicImage, ImageOutputFormat, RgbImage};
use serde::Deserialize;
use std::io::Cursor;
use std::time::Duration;
use tracing::{debug, instrument};

use super::PeopleCounter;
use crate::config::CounterConfig;
use crate::error::{OccupancyError, Result};

/// COCO class id for "person".
const PERSON_CLASS: u32 = 0;

#[derive(Debug, Deserialize)]
struct CountResponse {
    count: i64,
}

/// Client for an HTTP detection endpoint: the masked frame is POSTed as a
/// JPEG and the service answers `{"count": n}`.
pub struct RemoteCounter {
    client: reqwest::Client,
    endpoint: String,
    confidence_threshold: f32,
    jpeg_quality: u8,
}

impl RemoteCounter {
    pub fn new(config: &CounterConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| OccupancyError::ConfigError(format!("HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            confidence_threshold: config.confidence_threshold,
            jpeg_quality: config.jpeg_quality.clamp(1, 100),
        })
    }

    fn encode(&self, image: &RgbImage) -> Result<Vec<u8>> {
        let mut buffer = Vec::new();
        DynamicImage::ImageRgb8(image.clone())
            .write_to(
                &mut Cursor::new(&mut buffer),
                ImageOutputFormat::Jpeg(self.jpeg_quality),
            )
            .map_err(|e| OccupancyError::DetectionError(format!("JPEG encoding failed: {}", e)))?;
        Ok(buffer)
    }
}

#[async_trait]
impl PeopleCounter for RemoteCounter {
    #[instrument(skip(self, image), level = "debug")]
    async fn count(&self, image: &RgbImage) -> Result<u32> {
        let body = self.encode(image)?;

        let response = self
            .client
            .post(&self.endpoint)
            .query(&[
                ("conf", self.confidence_threshold.to_string()),
                ("classes", PERSON_CLASS.to_string()),
            ])
            .header(reqwest::header::CONTENT_TYPE, "image/jpeg")
            .body(body)
            .send()
            .await
            .map_err(|e| OccupancyError::DetectionError(format!("request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(OccupancyError::DetectionError(format!(
                "detection service answered {}",
                status
            )));
        }

        let text = response
            .text()
            .await
            .map_err(|e| OccupancyError::DetectionError(e.to_string()))?;
        let count = parse_count(&text)?;
        debug!(count, "Detection service responded");
        Ok(count)
    }
}

fn parse_count(body: &str) -> Result<u32> {
    let parsed: CountResponse = serde_json::from_str(body)
        .map_err(|e| OccupancyError::DetectionError(format!("malformed response: {}", e)))?;
    u32::try_from(parsed.count).map_err(|_| {
        OccupancyError::DetectionError(format!("invalid people count {}", parsed.count))
    })
}
