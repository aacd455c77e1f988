pub mod mask;

pub use mask::{apply_exclusive, apply_inclusive, build_mask, PolygonMask};

use occupancy_common::Polygon;
use std::collections::hash_map::Entry;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MaskKey {
    Zone(String),
    Exclusion,
}

/// Per-worker mask cache. Zone geometry is fixed for the lifetime of a
/// camera config, so a mask only needs rebuilding when the frame size changes.
#[derive(Debug, Default)]
pub struct MaskCache {
    masks: HashMap<MaskKey, PolygonMask>,
    builds: u64,
}

impl MaskCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_build(
        &mut self,
        key: MaskKey,
        width: u32,
        height: u32,
        polygons: &[Polygon],
    ) -> &PolygonMask {
        match self.masks.entry(key) {
            Entry::Occupied(mut entry) => {
                if entry.get().dimensions() != (width, height) {
                    self.builds += 1;
                    entry.insert(PolygonMask::build(width, height, polygons));
                }
                entry.into_mut()
            }
            Entry::Vacant(entry) => {
                self.builds += 1;
                entry.insert(PolygonMask::build(width, height, polygons))
            }
        }
    }

    /// Number of rasterizations performed so far.
    pub fn builds(&self) -> u64 {
        self.builds
    }

    pub fn len(&self) -> usize {
        self.masks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.masks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reuses_mask_for_same_dimensions() {
        let zone = vec![Polygon::new([(0, 0), (4, 0), (4, 4), (0, 4)])];
        let mut cache = MaskCache::new();
        let first = cache.get_or_build(MaskKey::Zone("left".into()), 8, 8, &zone).clone();
        let second = cache.get_or_build(MaskKey::Zone("left".into()), 8, 8, &zone).clone();
        assert_eq!(first, second);
        assert_eq!(cache.builds(), 1);
    }

    #[test]
    fn rebuilds_when_frame_size_changes() {
        let zone = vec![Polygon::new([(0, 0), (4, 0), (4, 4), (0, 4)])];
        let mut cache = MaskCache::new();
        cache.get_or_build(MaskKey::Exclusion, 8, 8, &zone);
        let resized = cache.get_or_build(MaskKey::Exclusion, 16, 12, &zone);
        assert_eq!(resized.dimensions(), (16, 12));
        assert_eq!(cache.builds(), 2);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn keys_are_independent() {
        let zone = vec![Polygon::new([(0, 0), (4, 0), (4, 4), (0, 4)])];
        let mut cache = MaskCache::new();
        cache.get_or_build(MaskKey::Zone("a".into()), 8, 8, &zone);
        cache.get_or_build(MaskKey::Zone("b".into()), 8, 8, &zone);
        cache.get_or_build(MaskKey::Exclusion, 8, 8, &[]);
        assert_eq!(cache.len(), 3);
        assert_eq!(cache.builds(), 3);
    }
}
