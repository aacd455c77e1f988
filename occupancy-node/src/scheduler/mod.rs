use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::join_all;
use occupancy_common::CameraConfig;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use validator::Validate;

use crate::config::BackoffConfig;
use crate::error::{OccupancyError, Result};
use crate::processing::{CameraWorker, PipelineServices, RunningWorker, WorkerSnapshot};

/// A camera that was not started, with the reason.
#[derive(Debug)]
pub struct RejectedCamera {
    pub camera_id: String,
    pub reason: OccupancyError,
}

/// Everything started by one `start_monitoring` call.
pub struct FleetHandle {
    cancel: CancellationToken,
    workers: Vec<RunningWorker>,
    rejected: Vec<RejectedCamera>,
}

impl FleetHandle {
    pub fn statuses(&self) -> Vec<WorkerSnapshot> {
        self.workers.iter().map(|w| w.status.snapshot()).collect()
    }

    pub fn rejected(&self) -> &[RejectedCamera] {
        &self.rejected
    }

    pub fn camera_ids(&self) -> Vec<&str> {
        self.workers.iter().map(|w| w.camera_id.as_str()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }
}

/// Starts one worker per camera and tears them down together.
///
/// Holds no occupancy data. The only state is the set of camera ids that
/// are currently running, used to refuse a second worker for the same camera.
pub struct FleetScheduler {
    services: PipelineServices,
    backoff: BackoffConfig,
    active: DashMap<String, ()>,
    sink_closed: AtomicBool,
}

impl FleetScheduler {
    pub fn new(services: PipelineServices, backoff: BackoffConfig) -> Self {
        Self {
            services,
            backoff,
            active: DashMap::new(),
            sink_closed: AtomicBool::new(false),
        }
    }

    pub fn active_cameras(&self) -> Vec<String> {
        self.active.iter().map(|entry| entry.key().clone()).collect()
    }

    pub async fn start_monitoring(
        &self,
        cameras: Vec<CameraConfig>,
        interval: Duration,
    ) -> Result<FleetHandle> {
        if interval.is_zero() {
            return Err(OccupancyError::ConfigError(
                "sampling interval must be positive".to_string(),
            ));
        }
        if self.sink_closed.load(Ordering::Acquire) {
            return Err(OccupancyError::ConfigError(
                "scheduler has already released its sink".to_string(),
            ));
        }

        let cancel = CancellationToken::new();
        let mut rejected = Vec::new();
        let mut accepted = Vec::new();
        let mut seen = HashSet::new();

        for camera in cameras {
            let camera_id = camera.camera_id.clone();
            if let Err(reason) = self.check_camera(&camera, &mut seen) {
                error!(camera_id = %camera_id, error = %reason, "Camera rejected");
                rejected.push(RejectedCamera { camera_id, reason });
                continue;
            }
            accepted.push(Arc::new(camera));
        }

        let starts = accepted.into_iter().map(|camera| {
            let worker = CameraWorker::new(
                camera.clone(),
                self.services.clone(),
                interval,
                self.backoff.clone(),
            );
            let cancel = cancel.clone();
            async move { (camera.camera_id.clone(), worker.start(cancel).await) }
        });

        let mut workers = Vec::new();
        for (camera_id, started) in join_all(starts).await {
            match started {
                Ok(worker) => workers.push(worker),
                Err(reason) => {
                    self.active.remove(&camera_id);
                    error!(camera_id = %camera_id, error = %reason, "Failed to open camera stream, skipping");
                    rejected.push(RejectedCamera { camera_id, reason });
                }
            }
        }

        info!(
            started = workers.len(),
            rejected = rejected.len(),
            "Fleet monitoring started"
        );
        Ok(FleetHandle {
            cancel,
            workers,
            rejected,
        })
    }

    /// Validates `camera` and reserves its id. The reservation is atomic, so
    /// concurrent `start_monitoring` calls cannot both claim one camera.
    fn check_camera(&self, camera: &CameraConfig, seen: &mut HashSet<String>) -> Result<()> {
        camera.validate()?;

        let duplicates = camera.duplicate_zone_names();
        if !duplicates.is_empty() {
            return Err(OccupancyError::ConfigError(format!(
                "duplicate zone names: {}",
                duplicates.join(", ")
            )));
        }
        if !self.services.source.supports(&camera.stream_address) {
            return Err(OccupancyError::ConfigError(format!(
                "stream address {} is not supported by the frame source",
                camera.stream_address
            )));
        }
        if !seen.insert(camera.camera_id.clone()) {
            return Err(OccupancyError::ConfigError(format!(
                "camera {} is listed more than once",
                camera.camera_id
            )));
        }
        match self.active.entry(camera.camera_id.clone()) {
            Entry::Occupied(_) => Err(OccupancyError::ConfigError(format!(
                "camera {} is already being monitored",
                camera.camera_id
            ))),
            Entry::Vacant(slot) => {
                slot.insert(());
                Ok(())
            }
        }
    }

    /// Signals every worker of `handle`, waits until each has released its
    /// stream, then closes the shared sink once no camera is left running.
    pub async fn stop(&self, handle: FleetHandle) -> Result<()> {
        info!(workers = handle.workers.len(), "Stopping fleet");
        handle.cancel.cancel();

        let camera_ids: Vec<String> = handle.workers.iter().map(|w| w.camera_id.clone()).collect();
        join_all(handle.workers.into_iter().map(RunningWorker::join)).await;
        for camera_id in &camera_ids {
            self.active.remove(camera_id);
        }

        if !self.active.is_empty() {
            info!(remaining = self.active.len(), "Other cameras still running, sink kept open");
            return Ok(());
        }
        if self.sink_closed.swap(true, Ordering::AcqRel) {
            warn!("Sink already closed");
            return Ok(());
        }
        self.services.sink.close().await?;
        info!("Fleet stopped");
        Ok(())
    }
}
