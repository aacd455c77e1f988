use async_trait::async_trait;
use image::RgbImage;

use crate::error::Result;

pub mod remote;

pub use remote::RemoteCounter;

/// Counts people in an already-masked image. Implementations may run a model
/// locally or call out to a detection service; any failure is treated as
/// local to the zone being counted.
#[async_trait]
pub trait PeopleCounter: Send + Sync {
    async fn count(&self, image: &RgbImage) -> Result<u32>;
}
