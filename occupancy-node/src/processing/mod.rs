pub mod camera_worker;
pub mod zone_sampler;

pub use camera_worker::{CameraWorker, RunningWorker, WorkerPhase, WorkerSnapshot, WorkerStatus};
pub use zone_sampler::{CycleOutput, ZoneOutcome, ZoneResult, ZoneSampler};

use std::sync::Arc;

use crate::camera::FrameSource;
use crate::counting::PeopleCounter;
use crate::storage::SampleSink;
use crate::utils::metrics::Metrics;

/// Collaborators shared by every worker of a fleet.
#[derive(Clone)]
pub struct PipelineServices {
    pub source: Arc<dyn FrameSource>,
    pub counter: Arc<dyn PeopleCounter>,
    pub sink: Arc<dyn SampleSink>,
    pub metrics: Arc<Metrics>,
}
