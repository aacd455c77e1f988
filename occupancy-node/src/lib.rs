pub mod camera;
pub mod config;
pub mod counting;
pub mod error;
pub mod geometry;
pub mod processing;
pub mod scheduler;
pub mod storage;
pub mod utils;

pub use error::{OccupancyError, Result};
pub use processing::PipelineServices;
pub use scheduler::{FleetHandle, FleetScheduler, RejectedCamera};
