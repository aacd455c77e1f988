use image::{GrayImage, Luma, Rgb, RgbImage};
use occupancy_common::Polygon;
use tracing::warn;

const SET: u8 = 255;

/// Binary per-pixel mask rasterized from one or more polygons.
#[derive(Debug, Clone, PartialEq)]
pub struct PolygonMask {
    mask: GrayImage,
}

impl PolygonMask {
    /// Rasterizes the union of `polygons` over a `width` x `height` grid.
    ///
    /// Each polygon is filled with the even-odd rule sampled at pixel
    /// centres, so self-intersecting outlines and repeated vertices behave
    /// predictably. A polygon with fewer than three points contributes
    /// nothing; malformed configuration never aborts sampling.
    pub fn build(width: u32, height: u32, polygons: &[Polygon]) -> Self {
        let mut mask = GrayImage::new(width, height);
        for polygon in polygons {
            if !polygon.is_valid() {
                warn!(
                    points = polygon.len(),
                    "Ignoring polygon with fewer than 3 points"
                );
                continue;
            }
            fill_even_odd(&mut mask, polygon);
        }
        Self { mask }
    }

    pub fn width(&self) -> u32 {
        self.mask.width()
    }

    pub fn height(&self) -> u32 {
        self.mask.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.mask.dimensions()
    }

    /// Out-of-bounds coordinates are never inside the mask.
    pub fn contains(&self, x: u32, y: u32) -> bool {
        x < self.width() && y < self.height() && self.mask.get_pixel(x, y).0[0] == SET
    }

    pub fn is_empty(&self) -> bool {
        self.mask.pixels().all(|p| p.0[0] != SET)
    }

    /// Fraction of pixels inside the mask, in `[0, 1]`.
    pub fn coverage(&self) -> f64 {
        let total = self.mask.width() as u64 * self.mask.height() as u64;
        if total == 0 {
            return 0.0;
        }
        let set = self.mask.pixels().filter(|p| p.0[0] == SET).count() as u64;
        set as f64 / total as f64
    }
}

pub fn build_mask(frame_size: (u32, u32), polygons: &[Polygon]) -> PolygonMask {
    PolygonMask::build(frame_size.0, frame_size.1, polygons)
}

/// Keeps only the pixels inside the mask; everything else is zeroed.
pub fn apply_inclusive(frame: &RgbImage, mask: &PolygonMask) -> RgbImage {
    RgbImage::from_fn(frame.width(), frame.height(), |x, y| {
        if mask.contains(x, y) {
            *frame.get_pixel(x, y)
        } else {
            Rgb([0, 0, 0])
        }
    })
}

/// Zeroes the pixels inside the mask and keeps the rest.
pub fn apply_exclusive(frame: &RgbImage, mask: &PolygonMask) -> RgbImage {
    RgbImage::from_fn(frame.width(), frame.height(), |x, y| {
        if mask.contains(x, y) {
            Rgb([0, 0, 0])
        } else {
            *frame.get_pixel(x, y)
        }
    })
}

fn fill_even_odd(mask: &mut GrayImage, polygon: &Polygon) {
    let (width, height) = mask.dimensions();
    if width == 0 || height == 0 {
        return;
    }

    let points = polygon.points();
    let min_y = points.iter().map(|p| p.y).min().unwrap_or(0).max(0) as u32;
    let max_y = points.iter().map(|p| p.y).max().unwrap_or(0);
    if max_y < 0 {
        return;
    }
    let max_y = (max_y as u32).min(height - 1);

    let mut crossings: Vec<f64> = Vec::with_capacity(points.len());
    for row in min_y..=max_y {
        let scan_y = row as f64 + 0.5;
        crossings.clear();

        for (i, start) in points.iter().enumerate() {
            let end = points[(i + 1) % points.len()];
            let (y0, y1) = (start.y as f64, end.y as f64);
            if y0 == y1 {
                continue;
            }
            // Half-open span so a vertex shared by two edges is counted once.
            let (lo, hi) = if y0 < y1 { (y0, y1) } else { (y1, y0) };
            if scan_y < lo || scan_y >= hi {
                continue;
            }
            let t = (scan_y - y0) / (y1 - y0);
            crossings.push(start.x as f64 + t * (end.x as f64 - start.x as f64));
        }

        crossings.sort_by(|a, b| a.total_cmp(b));
        for span in crossings.chunks_exact(2) {
            // Pixel centres x + 0.5 within [span[0], span[1]].
            let first = (span[0] - 0.5).ceil().max(0.0);
            let last = (span[1] - 0.5).floor().min(width as f64 - 1.0);
            if last < first {
                continue;
            }
            for x in first as u32..=last as u32 {
                mask.put_pixel(x, row, Luma([SET]));
            }
        }
    }
}
