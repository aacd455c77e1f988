use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use image::{Rgb, RgbImage};
use occupancy_common::{CameraConfig, OccupancySample, Polygon};
use occupancy_node::camera::{Frame, FrameSource, StreamHandle};
use occupancy_node::config::BackoffConfig;
use occupancy_node::counting::PeopleCounter;
use occupancy_node::processing::WorkerPhase;
use occupancy_node::storage::SampleSink;
use occupancy_node::utils::metrics::Metrics;
use occupancy_node::{FleetScheduler, OccupancyError, PipelineServices, Result};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

const WHITE: Rgb<u8> = Rgb([255, 255, 255]);
const RED: Rgb<u8> = Rgb([255, 0, 0]);
const INTERVAL: Duration = Duration::from_secs(30);

/// Per-address script: how every frame looks and which reads fail.
#[derive(Clone)]
struct Feed {
    paint: fn(&mut RgbImage),
    fail_reads: Vec<u32>,
}

#[derive(Default)]
struct Ledger {
    opens: HashMap<String, u32>,
    closes: HashMap<String, u32>,
}

struct FakeSource {
    feeds: HashMap<String, Feed>,
    ledger: Arc<Mutex<Ledger>>,
}

struct FakeStream {
    address: String,
    feed: Feed,
    reads: u32,
    closed: bool,
    ledger: Arc<Mutex<Ledger>>,
}

fn capture_time(read: u32) -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000 + i64::from(read) * 30, 0)
        .unwrap()
}

#[async_trait]
impl FrameSource for FakeSource {
    async fn open(&self, address: &str) -> Result<Box<dyn StreamHandle>> {
        let feed = self
            .feeds
            .get(address)
            .cloned()
            .ok_or_else(|| OccupancyError::AcquisitionError(format!("{} unreachable", address)))?;
        *self
            .ledger
            .lock()
            .unwrap()
            .opens
            .entry(address.to_string())
            .or_default() += 1;
        Ok(Box::new(FakeStream {
            address: address.to_string(),
            feed,
            reads: 0,
            closed: false,
            ledger: self.ledger.clone(),
        }))
    }
}

#[async_trait]
impl StreamHandle for FakeStream {
    async fn next_frame(&mut self) -> Result<Frame> {
        self.reads += 1;
        if self.feed.fail_reads.contains(&self.reads) {
            return Err(OccupancyError::AcquisitionError("stream stalled".into()));
        }
        let mut image = RgbImage::new(100, 50);
        (self.feed.paint)(&mut image);
        Ok(Frame::new(image, capture_time(self.reads)))
    }

    async fn close(&mut self) -> Result<()> {
        if !self.closed {
            self.closed = true;
            *self
                .ledger
                .lock()
                .unwrap()
                .closes
                .entry(self.address.clone())
                .or_default() += 1;
        }
        Ok(())
    }
}

/// One person per 250 lit pixels. Refuses any image containing red.
struct LitPixelCounter;

#[async_trait]
impl PeopleCounter for LitPixelCounter {
    async fn count(&self, image: &RgbImage) -> Result<u32> {
        if image.pixels().any(|p| *p == RED) {
            return Err(OccupancyError::DetectionError("detector returned 500".into()));
        }
        let lit = image.pixels().filter(|p| p.0 != [0, 0, 0]).count() as u32;
        Ok(lit / 250)
    }
}

#[derive(Default)]
struct MemorySink {
    rows: Mutex<Vec<OccupancySample>>,
    closes: Mutex<u32>,
}

impl MemorySink {
    fn rows_for(&self, camera_id: &str) -> Vec<OccupancySample> {
        self.rows
            .lock()
            .unwrap()
            .iter()
            .filter(|s| s.camera_id == camera_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl SampleSink for MemorySink {
    async fn write(&self, samples: &[OccupancySample]) -> Result<()> {
        self.rows.lock().unwrap().extend_from_slice(samples);
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        *self.closes.lock().unwrap() += 1;
        Ok(())
    }
}

fn fill(image: &mut RgbImage, x: std::ops::Range<u32>, y: std::ops::Range<u32>, color: Rgb<u8>) {
    for py in y {
        for px in x.clone() {
            image.put_pixel(px, py, color);
        }
    }
}

fn rect(x0: i32, y0: i32, x1: i32, y1: i32) -> Polygon {
    Polygon::new([(x0, y0), (x1, y0), (x1, y1), (x0, y1)])
}

fn address(camera_id: &str) -> String {
    format!("https://streams.example/{}/snapshot.jpg", camera_id)
}

struct Harness {
    scheduler: FleetScheduler,
    sink: Arc<MemorySink>,
    ledger: Arc<Mutex<Ledger>>,
}

fn harness(feeds: Vec<(&str, Feed)>) -> Harness {
    let ledger = Arc::new(Mutex::new(Ledger::default()));
    let sink = Arc::new(MemorySink::default());
    let source = FakeSource {
        feeds: feeds
            .into_iter()
            .map(|(camera_id, feed)| (address(camera_id), feed))
            .collect(),
        ledger: ledger.clone(),
    };
    let services = PipelineServices {
        source: Arc::new(source),
        counter: Arc::new(LitPixelCounter),
        sink: sink.clone(),
        metrics: Arc::new(Metrics::new().unwrap()),
    };
    Harness {
        scheduler: FleetScheduler::new(services, BackoffConfig::default()),
        sink,
        ledger,
    }
}

fn halves() -> Feed {
    Feed {
        // Left half fully lit (2500 px), right half top quarter lit (1250 px).
        paint: |image| {
            fill(image, 0..50, 0..50, WHITE);
            fill(image, 50..100, 0..25, WHITE);
        },
        fail_reads: Vec::new(),
    }
}

fn all_lit() -> Feed {
    Feed {
        paint: |image| fill(image, 0..100, 0..50, WHITE),
        fail_reads: Vec::new(),
    }
}

fn zoned(camera_id: &str) -> CameraConfig {
    CameraConfig::new(camera_id, address(camera_id), "gym")
        .with_zone("left", vec![rect(0, 0, 50, 50)])
        .with_zone("right", vec![rect(50, 0, 100, 50)])
}

#[tokio::test(start_paused = true)]
async fn zoned_camera_writes_one_sample_per_zone_with_frame_time() {
    let h = harness(vec![("cam_A", halves())]);
    let fleet = h
        .scheduler
        .start_monitoring(vec![zoned("cam_A")], INTERVAL)
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_secs(31)).await;
    let rows = h.sink.rows_for("cam_A");
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].zone_name, "left");
    assert_eq!(rows[0].people_count, 10);
    assert_eq!(rows[1].zone_name, "right");
    assert_eq!(rows[1].people_count, 5);
    assert_eq!(rows[0].timestamp, rows[1].timestamp);
    assert_eq!(rows[0].timestamp, capture_time(1));
    assert!(rows.iter().all(|r| r.hall_name == "gym"));

    h.scheduler.stop(fleet).await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn unzoned_camera_counts_general_minus_exclusions() {
    let h = harness(vec![("cam_B", all_lit()), ("cam_E", all_lit())]);
    let cameras = vec![
        CameraConfig::new("cam_B", address("cam_B"), "cardio_zone"),
        CameraConfig::new("cam_E", address("cam_E"), "cardio_zone")
            .with_exclusion(rect(0, 0, 50, 50)),
    ];
    let fleet = h.scheduler.start_monitoring(cameras, INTERVAL).await.unwrap();

    tokio::time::sleep(Duration::from_secs(31)).await;
    let plain = h.sink.rows_for("cam_B");
    assert_eq!(plain.len(), 1);
    assert_eq!(plain[0].zone_name, "general");
    assert_eq!(plain[0].people_count, 20);

    let excluded = h.sink.rows_for("cam_E");
    assert_eq!(excluded.len(), 1);
    assert_eq!(excluded[0].zone_name, "general");
    assert_eq!(excluded[0].people_count, 10);

    h.scheduler.stop(fleet).await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn failed_acquisition_skips_only_that_tick() {
    let flaky = Feed {
        fail_reads: vec![2],
        ..all_lit()
    };
    let h = harness(vec![("cam_C", flaky), ("cam_B", all_lit())]);
    let cameras = vec![
        CameraConfig::new("cam_C", address("cam_C"), "gym"),
        CameraConfig::new("cam_B", address("cam_B"), "gym"),
    ];
    let fleet = h.scheduler.start_monitoring(cameras, INTERVAL).await.unwrap();

    tokio::time::sleep(Duration::from_secs(95)).await;
    let rows = h.sink.rows_for("cam_C");
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].timestamp, capture_time(1));
    assert_eq!(rows[1].timestamp, capture_time(3));
    assert_eq!(h.sink.rows_for("cam_B").len(), 3);

    let statuses = fleet.statuses();
    let cam_c = statuses.iter().find(|s| s.camera_id == "cam_C").unwrap();
    assert_eq!(cam_c.cycles_ok, 2);
    assert_eq!(cam_c.cycles_failed, 1);
    assert_eq!(cam_c.consecutive_failures, 0);
    assert_eq!(cam_c.phase, WorkerPhase::Running);

    h.scheduler.stop(fleet).await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn failing_zone_does_not_block_the_others() {
    let feed = Feed {
        paint: |image| {
            fill(image, 0..50, 0..50, RED);
            fill(image, 50..100, 0..50, WHITE);
        },
        fail_reads: Vec::new(),
    };
    let h = harness(vec![("cam_D", feed)]);
    let fleet = h
        .scheduler
        .start_monitoring(vec![zoned("cam_D")], INTERVAL)
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_secs(31)).await;
    let rows = h.sink.rows_for("cam_D");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].zone_name, "right");
    assert_eq!(rows[0].people_count, 10);

    let statuses = fleet.statuses();
    assert_eq!(statuses[0].cycles_ok, 1);
    assert_eq!(statuses[0].zone_skips, 1);

    h.scheduler.stop(fleet).await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn stop_releases_every_stream_once_and_closes_sink() {
    let h = harness(vec![
        ("cam_A", halves()),
        ("cam_B", all_lit()),
        ("cam_C", all_lit()),
    ]);
    let cameras = vec![
        zoned("cam_A"),
        CameraConfig::new("cam_B", address("cam_B"), "gym"),
        CameraConfig::new("cam_C", address("cam_C"), "gym"),
    ];
    let fleet = h.scheduler.start_monitoring(cameras, INTERVAL).await.unwrap();
    tokio::time::sleep(Duration::from_secs(45)).await;

    h.scheduler.stop(fleet).await.unwrap();

    let ledger = h.ledger.lock().unwrap();
    for camera_id in ["cam_A", "cam_B", "cam_C"] {
        assert_eq!(ledger.opens.get(&address(camera_id)), Some(&1));
        assert_eq!(ledger.closes.get(&address(camera_id)), Some(&1));
    }
    assert_eq!(*h.sink.closes.lock().unwrap(), 1);
    assert!(h.scheduler.active_cameras().is_empty());
}

#[tokio::test(start_paused = true)]
async fn unreachable_and_duplicate_cameras_are_skipped() {
    let h = harness(vec![("cam_A", halves()), ("cam_B", all_lit())]);
    let cameras = vec![
        zoned("cam_A"),
        CameraConfig::new("cam_X", address("cam_X"), "gym"),
        CameraConfig::new("cam_A", address("cam_A"), "gym"),
        CameraConfig::new("cam_B", address("cam_B"), "gym"),
    ];
    let fleet = h.scheduler.start_monitoring(cameras, INTERVAL).await.unwrap();

    let mut started = fleet.camera_ids();
    started.sort_unstable();
    assert_eq!(started, vec!["cam_A", "cam_B"]);

    let rejected = fleet.rejected();
    assert_eq!(rejected.len(), 2);
    assert_eq!(rejected[0].camera_id, "cam_A");
    assert!(matches!(rejected[0].reason, OccupancyError::ConfigError(_)));
    assert_eq!(rejected[1].camera_id, "cam_X");
    assert!(rejected[1].reason.is_acquisition());

    tokio::time::sleep(Duration::from_secs(31)).await;
    assert_eq!(h.sink.rows_for("cam_A").len(), 2);
    assert_eq!(h.sink.rows_for("cam_B").len(), 1);

    h.scheduler.stop(fleet).await.unwrap();
}
