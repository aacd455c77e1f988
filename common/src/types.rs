use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

/// Zone label used when a camera has no zones configured.
pub const GENERAL_ZONE: &str = "general";

/// Pixel coordinate, serialized as `[x, y]` like the zone editors emit it.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(from = "[i32; 2]", into = "[i32; 2]")]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

impl From<[i32; 2]> for Point {
    fn from([x, y]: [i32; 2]) -> Self {
        Self { x, y }
    }
}

impl From<Point> for [i32; 2] {
    fn from(point: Point) -> Self {
        [point.x, point.y]
    }
}

/// Ordered outline in pixel coordinates. The last point connects back to
/// the first; an explicit closing point is allowed but not required.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Hash, Default)]
#[serde(transparent)]
pub struct Polygon(pub Vec<Point>);

impl Polygon {
    pub fn new(points: impl IntoIterator<Item = (i32, i32)>) -> Self {
        Self(points.into_iter().map(|(x, y)| Point::new(x, y)).collect())
    }

    pub fn points(&self) -> &[Point] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// A polygon needs at least three vertices to enclose any area.
    pub fn is_valid(&self) -> bool {
        self.0.len() >= 3
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Validate)]
pub struct ZoneConfig {
    #[validate(length(min = 1))]
    pub name: String,
    pub polygons: Vec<Polygon>,
}

impl ZoneConfig {
    pub fn new(name: impl Into<String>, polygons: Vec<Polygon>) -> Self {
        Self {
            name: name.into(),
            polygons,
        }
    }
}

/// Static description of one camera. Immutable for the lifetime of its worker.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Validate)]
pub struct CameraConfig {
    #[validate(length(min = 1))]
    pub camera_id: String,
    #[serde(alias = "url")]
    #[validate(custom = "validate_stream_address")]
    pub stream_address: String,
    pub hall_name: String,
    #[serde(default)]
    pub exclusion_zones: Vec<Polygon>,
    /// Zones in definition order; sampling iterates them in this order.
    #[serde(default)]
    #[validate]
    pub zones: Vec<ZoneConfig>,
}

impl CameraConfig {
    pub fn new(
        camera_id: impl Into<String>,
        stream_address: impl Into<String>,
        hall_name: impl Into<String>,
    ) -> Self {
        Self {
            camera_id: camera_id.into(),
            stream_address: stream_address.into(),
            hall_name: hall_name.into(),
            exclusion_zones: Vec::new(),
            zones: Vec::new(),
        }
    }

    pub fn with_zone(mut self, name: impl Into<String>, polygons: Vec<Polygon>) -> Self {
        self.zones.push(ZoneConfig::new(name, polygons));
        self
    }

    pub fn with_exclusion(mut self, polygon: Polygon) -> Self {
        self.exclusion_zones.push(polygon);
        self
    }

    pub fn is_zoned(&self) -> bool {
        !self.zones.is_empty()
    }

    /// Zone names that appear more than once, each reported once.
    pub fn duplicate_zone_names(&self) -> Vec<&str> {
        let mut seen = std::collections::HashSet::new();
        let mut duplicates = Vec::new();
        for zone in &self.zones {
            if !seen.insert(zone.name.as_str()) && !duplicates.contains(&zone.name.as_str()) {
                duplicates.push(zone.name.as_str());
            }
        }
        duplicates
    }
}

fn validate_stream_address(address: &str) -> Result<(), ValidationError> {
    crate::utils::validate_url(address).map_err(|msg| {
        let mut err = ValidationError::new("stream_address");
        err.message = Some(msg.into());
        err
    })
}

/// One persisted occupancy measurement. `timestamp` is the capture time of
/// the source frame, never the write time.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct OccupancySample {
    pub camera_id: String,
    pub hall_name: String,
    pub zone_name: String,
    pub timestamp: DateTime<Utc>,
    pub people_count: u32,
}

impl OccupancySample {
    pub fn new(
        camera: &CameraConfig,
        zone_name: impl Into<String>,
        timestamp: DateTime<Utc>,
        people_count: u32,
    ) -> Self {
        Self {
            camera_id: camera.camera_id.clone(),
            hall_name: camera.hall_name.clone(),
            zone_name: zone_name.into(),
            timestamp,
            people_count,
        }
    }

    pub fn is_general(&self) -> bool {
        self.zone_name == GENERAL_ZONE
    }
}
