use chrono::{DateTime, Utc};
use occupancy_common::{CameraConfig, OccupancySample, GENERAL_ZONE};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::camera::StreamHandle;
use crate::counting::PeopleCounter;
use crate::error::{OccupancyError, Result};
use crate::geometry::{apply_exclusive, apply_inclusive, MaskCache, MaskKey};

/// Per-zone result of one cycle. A skipped zone carries the reason the
/// counter gave; it never aborts the rest of the cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ZoneOutcome {
    Counted(u32),
    Skipped(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZoneResult {
    pub zone_name: String,
    pub outcome: ZoneOutcome,
}

/// Everything one cycle produced. All samples share `captured_at`.
#[derive(Debug, Clone)]
pub struct CycleOutput {
    pub captured_at: DateTime<Utc>,
    pub zones: Vec<ZoneResult>,
    pub samples: Vec<OccupancySample>,
}

impl CycleOutput {
    pub fn skipped(&self) -> impl Iterator<Item = (&str, &str)> {
        self.zones.iter().filter_map(|z| match &z.outcome {
            ZoneOutcome::Skipped(reason) => Some((z.zone_name.as_str(), reason.as_str())),
            ZoneOutcome::Counted(_) => None,
        })
    }

    pub fn total_people(&self) -> u64 {
        self.samples.iter().map(|s| s.people_count as u64).sum()
    }
}

/// Turns one frame from a camera into occupancy samples: one per configured
/// zone, or a single `general` sample for cameras without zones.
pub struct ZoneSampler {
    camera: Arc<CameraConfig>,
    counter: Arc<dyn PeopleCounter>,
    masks: MaskCache,
}

impl ZoneSampler {
    pub fn new(camera: Arc<CameraConfig>, counter: Arc<dyn PeopleCounter>) -> Self {
        Self {
            camera,
            counter,
            masks: MaskCache::new(),
        }
    }

    pub fn mask_builds(&self) -> u64 {
        self.masks.builds()
    }

    /// Runs one cycle against `stream`.
    ///
    /// A frame that cannot be acquired fails the whole cycle with
    /// `AcquisitionError` and no samples. A counting failure only drops the
    /// affected zone.
    pub async fn sample(&mut self, stream: &mut dyn StreamHandle) -> Result<CycleOutput> {
        let frame = stream.next_frame().await.map_err(|e| match e {
            OccupancyError::AcquisitionError(_) => e,
            other => OccupancyError::AcquisitionError(other.to_string()),
        })?;
        let (width, height) = (frame.width(), frame.height());
        let captured_at = frame.captured_at;
        debug!(width, height, %captured_at, "Frame acquired");

        let camera = self.camera.clone();
        let mut zones = Vec::with_capacity(camera.zones.len().max(1));

        if camera.is_zoned() {
            for zone in &camera.zones {
                let mask = self.masks.get_or_build(
                    MaskKey::Zone(zone.name.clone()),
                    width,
                    height,
                    &zone.polygons,
                );
                debug!(zone = %zone.name, coverage = mask.coverage(), "Zone mask");
                let masked = apply_inclusive(&frame.image, mask);
                let outcome = self.count_zone(&zone.name, &masked).await;
                zones.push(ZoneResult {
                    zone_name: zone.name.clone(),
                    outcome,
                });
            }
        } else {
            let outcome = if camera.exclusion_zones.is_empty() {
                self.count_zone(GENERAL_ZONE, &frame.image).await
            } else {
                let mask = self.masks.get_or_build(
                    MaskKey::Exclusion,
                    width,
                    height,
                    &camera.exclusion_zones,
                );
                debug!(excluded = mask.coverage(), "Exclusion mask");
                let masked = apply_exclusive(&frame.image, mask);
                self.count_zone(GENERAL_ZONE, &masked).await
            };
            zones.push(ZoneResult {
                zone_name: GENERAL_ZONE.to_string(),
                outcome,
            });
        }

        let samples: Vec<OccupancySample> = zones
            .iter()
            .filter_map(|z| match z.outcome {
                ZoneOutcome::Counted(count) => Some(OccupancySample::new(
                    &camera,
                    z.zone_name.clone(),
                    captured_at,
                    count,
                )),
                ZoneOutcome::Skipped(_) => None,
            })
            .collect();

        let output = CycleOutput {
            captured_at,
            zones,
            samples,
        };
        info!(
            hall = %camera.hall_name,
            zones = output.zones.len(),
            total = output.total_people(),
            "Sampled camera"
        );
        Ok(output)
    }

    async fn count_zone(&self, zone: &str, image: &image::RgbImage) -> ZoneOutcome {
        match self.counter.count(image).await {
            Ok(count) => {
                info!(zone, count, "Zone count");
                ZoneOutcome::Counted(count)
            }
            Err(e) => {
                warn!(zone, error = %e, "Counting failed, skipping zone");
                ZoneOutcome::Skipped(e.to_string())
            }
        }
    }
}
