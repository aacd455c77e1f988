use chrono::{DateTime, Utc};
use occupancy_common::utils::{format_duration, generate_unique_id};
use occupancy_common::CameraConfig;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, warn, Instrument};

use super::zone_sampler::{CycleOutput, ZoneSampler};
use super::PipelineServices;
use crate::camera::StreamHandle;
use crate::config::BackoffConfig;
use crate::error::{OccupancyError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum WorkerPhase {
    Idle,
    Running,
    Stopping,
    Stopped,
}

impl WorkerPhase {
    fn as_u8(self) -> u8 {
        match self {
            WorkerPhase::Idle => 0,
            WorkerPhase::Running => 1,
            WorkerPhase::Stopping => 2,
            WorkerPhase::Stopped => 3,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            0 => WorkerPhase::Idle,
            1 => WorkerPhase::Running,
            2 => WorkerPhase::Stopping,
            _ => WorkerPhase::Stopped,
        }
    }
}

/// Live counters for one worker, readable from outside the worker task.
#[derive(Debug)]
pub struct WorkerStatus {
    camera_id: String,
    phase: AtomicU8,
    consecutive_failures: AtomicU64,
    cycles_ok: AtomicU64,
    cycles_failed: AtomicU64,
    zone_skips: AtomicU64,
    last_success: Mutex<Option<DateTime<Utc>>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct WorkerSnapshot {
    pub camera_id: String,
    pub phase: WorkerPhase,
    pub consecutive_failures: u64,
    pub cycles_ok: u64,
    pub cycles_failed: u64,
    pub zone_skips: u64,
    pub last_success: Option<DateTime<Utc>>,
}

impl WorkerStatus {
    pub fn new(camera_id: impl Into<String>) -> Self {
        Self {
            camera_id: camera_id.into(),
            phase: AtomicU8::new(WorkerPhase::Idle.as_u8()),
            consecutive_failures: AtomicU64::new(0),
            cycles_ok: AtomicU64::new(0),
            cycles_failed: AtomicU64::new(0),
            zone_skips: AtomicU64::new(0),
            last_success: Mutex::new(None),
        }
    }

    pub fn phase(&self) -> WorkerPhase {
        WorkerPhase::from_u8(self.phase.load(Ordering::Acquire))
    }

    fn set_phase(&self, phase: WorkerPhase) {
        self.phase.store(phase.as_u8(), Ordering::Release);
    }

    pub fn consecutive_failures(&self) -> u64 {
        self.consecutive_failures.load(Ordering::Relaxed)
    }

    fn record_success(&self, output: &CycleOutput) {
        self.consecutive_failures.store(0, Ordering::Relaxed);
        self.cycles_ok.fetch_add(1, Ordering::Relaxed);
        self.zone_skips
            .fetch_add(output.skipped().count() as u64, Ordering::Relaxed);
        if let Ok(mut last) = self.last_success.lock() {
            *last = Some(output.captured_at);
        }
    }

    fn record_failure(&self) -> u64 {
        self.cycles_failed.fetch_add(1, Ordering::Relaxed);
        self.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn snapshot(&self) -> WorkerSnapshot {
        WorkerSnapshot {
            camera_id: self.camera_id.clone(),
            phase: self.phase(),
            consecutive_failures: self.consecutive_failures(),
            cycles_ok: self.cycles_ok.load(Ordering::Relaxed),
            cycles_failed: self.cycles_failed.load(Ordering::Relaxed),
            zone_skips: self.zone_skips.load(Ordering::Relaxed),
            last_success: self.last_success.lock().ok().and_then(|last| *last),
        }
    }
}

/// Owns one camera: its stream handle, sampler and mask cache.
///
/// Lifecycle is `Idle -> Running -> Stopping -> Stopped`. Failing to open the
/// stream fails `start`; any failure inside a cycle is logged and counted and
/// the worker keeps ticking.
pub struct CameraWorker {
    camera: Arc<CameraConfig>,
    services: PipelineServices,
    interval: Duration,
    backoff: BackoffConfig,
    status: Arc<WorkerStatus>,
}

/// Handle to a worker task that has been started.
pub struct RunningWorker {
    pub camera_id: String,
    pub status: Arc<WorkerStatus>,
    task: JoinHandle<()>,
}

impl RunningWorker {
    /// Waits for the worker task to finish its in-flight cycle and release
    /// its stream.
    pub async fn join(self) {
        if let Err(e) = self.task.await {
            error!(camera_id = %self.camera_id, error = %e, "Worker task aborted");
            self.status.set_phase(WorkerPhase::Stopped);
        }
    }
}

impl CameraWorker {
    pub fn new(
        camera: Arc<CameraConfig>,
        services: PipelineServices,
        interval: Duration,
        backoff: BackoffConfig,
    ) -> Self {
        let status = Arc::new(WorkerStatus::new(camera.camera_id.clone()));
        Self {
            camera,
            services,
            interval,
            backoff,
            status,
        }
    }

    pub fn status(&self) -> Arc<WorkerStatus> {
        self.status.clone()
    }

    /// Opens the stream and spawns the sampling loop. The loop exits once
    /// `cancel` fires, after finishing any cycle already in progress.
    pub async fn start(self, cancel: CancellationToken) -> Result<RunningWorker> {
        let camera_id = self.camera.camera_id.clone();
        let stream = match self.services.source.open(&self.camera.stream_address).await {
            Ok(stream) => stream,
            Err(e) => {
                self.status.set_phase(WorkerPhase::Stopped);
                return Err(match e {
                    OccupancyError::AcquisitionError(_) => e,
                    other => OccupancyError::AcquisitionError(other.to_string()),
                });
            }
        };

        self.status.set_phase(WorkerPhase::Running);
        info!(
            camera_id = %camera_id,
            hall = %self.camera.hall_name,
            zones = self.camera.zones.len(),
            interval = %format_duration(self.interval),
            "Camera worker started"
        );

        let status = self.status.clone();
        let task = tokio::spawn(self.run(stream, cancel));
        Ok(RunningWorker {
            camera_id,
            status,
            task,
        })
    }

    async fn run(self, mut stream: Box<dyn StreamHandle>, cancel: CancellationToken) {
        let camera_id = self.camera.camera_id.clone();
        let mut sampler = ZoneSampler::new(self.camera.clone(), self.services.counter.clone());
        let mut acquisition_failures: u32 = 0;

        loop {
            let delay = self.backoff.delay_after(self.interval, acquisition_failures);
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
            if cancel.is_cancelled() {
                break;
            }

            let span = info_span!("cycle", camera_id = %camera_id, cycle_id = %generate_unique_id());
            let started = Instant::now();
            match self
                .run_cycle(&mut sampler, stream.as_mut())
                .instrument(span)
                .await
            {
                Ok(output) => {
                    acquisition_failures = 0;
                    self.status.record_success(&output);
                    self.services.metrics.record_cycle_ok(
                        &camera_id,
                        started.elapsed(),
                        output.samples.len(),
                    );
                    if output.samples.is_empty() {
                        warn!(camera_id = %camera_id, "Cycle produced no samples");
                    }
                }
                Err(e) => {
                    if e.is_acquisition() {
                        acquisition_failures = acquisition_failures.saturating_add(1);
                    } else {
                        acquisition_failures = 0;
                    }
                    let consecutive = self.status.record_failure();
                    self.services
                        .metrics
                        .record_cycle_failed(&camera_id, started.elapsed(), consecutive);
                    error!(
                        camera_id = %camera_id,
                        consecutive_failures = consecutive,
                        error = %e,
                        "Sampling cycle failed"
                    );
                }
            }
        }

        self.status.set_phase(WorkerPhase::Stopping);
        if let Err(e) = stream.close().await {
            warn!(camera_id = %camera_id, error = %e, "Failed to release stream");
        }
        self.status.set_phase(WorkerPhase::Stopped);
        info!(camera_id = %camera_id, "Camera worker stopped");
    }

    async fn run_cycle(
        &self,
        sampler: &mut ZoneSampler,
        stream: &mut dyn StreamHandle,
    ) -> Result<CycleOutput> {
        let output = sampler.sample(stream).await?;
        for (zone, _) in output.skipped() {
            self.services
                .metrics
                .record_zone_skip(&self.camera.camera_id, zone);
        }

        self.services
            .sink
            .write(&output.samples)
            .await
            .map_err(|e| match e {
                OccupancyError::WriteError(_) => e,
                other => OccupancyError::WriteError(other.to_string()),
            })?;
        Ok(output)
    }
}
