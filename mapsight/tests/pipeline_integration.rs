//! End-to-end tests for the tracking pipeline.
//!
//! These drive real feature matching and phase correlation over synthetic
//! imagery: a textured random reference map and frames cropped from it.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

use image::{GrayImage, Luma};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tempfile::TempDir;

use mapsight::capture::{CaptureConfig, Frame, ImageSequenceSource};
use mapsight::coord::{CalibrationPoint, CalibrationSet, CoordinateTransform, DetectionPoint};
use mapsight::features::FeatureConfig;
use mapsight::fps::AdaptiveFpsController;
use mapsight::imaging::{self, PreprocessConfig};
use mapsight::matcher::{CascadeScaleMatcher, MatchMode, MatcherConfig, ScaleLevel, TrackerState};
use mapsight::motion::MotionConfig;
use mapsight::pipeline::{Marker, MarkerSet, Pipeline, PositionService};
use mapsight::reference::ReferenceMap;

// ============================================================================
// Fixtures
// ============================================================================

const FRAME_WIDTH: u32 = 192;
const FRAME_HEIGHT: u32 = 144;

/// Bilinear value noise on an 8px grid plus per-pixel grain.
///
/// The low frequencies drive phase correlation, the grain gives FAST corners.
fn textured_map(width: u32, height: u32, seed: u64) -> GrayImage {
    let mut rng = StdRng::seed_from_u64(seed);
    let cell = 8u32;
    let gw = width / cell + 2;
    let gh = height / cell + 2;
    let grid: Vec<f64> = (0..gw * gh).map(|_| rng.random_range(0.0..200.0)).collect();
    let grain: Vec<f64> = (0..width * height)
        .map(|_| rng.random_range(0.0..40.0))
        .collect();

    GrayImage::from_fn(width, height, |x, y| {
        let (gx, gy) = (x / cell, y / cell);
        let fx = (x % cell) as f64 / cell as f64;
        let fy = (y % cell) as f64 / cell as f64;
        let at = |i: u32, j: u32| grid[(j * gw + i) as usize];
        let top = at(gx, gy) * (1.0 - fx) + at(gx + 1, gy) * fx;
        let bottom = at(gx, gy + 1) * (1.0 - fx) + at(gx + 1, gy + 1) * fx;
        let v = top * (1.0 - fy) + bottom * fy + grain[(y * width + x) as usize];
        Luma([v.clamp(0.0, 255.0) as u8])
    })
}

fn noise(width: u32, height: u32, seed: u64) -> GrayImage {
    let mut rng = StdRng::seed_from_u64(seed);
    GrayImage::from_fn(width, height, |_, _| Luma([rng.random_range(0..=255u8)]))
}

/// Geographic grid: lng 0..1 across 1000 native pixels, lat 0..-1 down.
fn transform(detection_scale: f64) -> Arc<CoordinateTransform> {
    let calibration = CalibrationSet::new(vec![
        CalibrationPoint::new(0.0, 0.0, 0.0, 0.0),
        CalibrationPoint::new(0.0, 1.0, 1000.0, 0.0),
        CalibrationPoint::new(-1.0, 0.0, 0.0, 1000.0),
        CalibrationPoint::new(-1.0, 1.0, 1000.0, 1000.0),
    ])
    .unwrap();
    Arc::new(CoordinateTransform::new(&calibration, detection_scale).unwrap())
}

fn build_matcher(reference: ReferenceMap, lost_after: u32) -> CascadeScaleMatcher {
    CascadeScaleMatcher::with_reference(
        MatcherConfig {
            levels: vec![ScaleLevel::new("full", 1.0, 500, 8)],
            lost_after,
            ..Default::default()
        },
        Arc::new(reference),
        FeatureConfig::default(),
        MotionConfig {
            downscale: 0.5,
            ..Default::default()
        },
    )
}

fn build_pipeline(map: &GrayImage, lost_after: u32, markers: Vec<Marker>) -> Pipeline {
    let reference = ReferenceMap::new(map.clone(), 1.0, &FeatureConfig::default()).unwrap();
    pipeline_over(build_matcher(reference, lost_after), markers)
}

fn pipeline_over(matcher: CascadeScaleMatcher, markers: Vec<Marker>) -> Pipeline {
    let transform = transform(1.0);
    let markers = MarkerSet::new(markers, &transform);
    Pipeline::new(
        matcher,
        transform,
        markers,
        AdaptiveFpsController::with_defaults(),
    )
}

fn frame_at(map: &GrayImage, x: u32, y: u32, sequence: u64) -> Frame {
    Frame::from_gray(imaging::crop(map, x, y, FRAME_WIDTH, FRAME_HEIGHT)).with_sequence(sequence)
}

fn assert_near(actual: DetectionPoint, x: f64, y: f64, tolerance: f64) {
    assert!(
        (actual.x - x).abs() <= tolerance && (actual.y - y).abs() <= tolerance,
        "expected ({}, {}), got ({:.2}, {:.2})",
        x,
        y,
        actual.x,
        actual.y
    );
}

// ============================================================================
// Synchronous pipeline
// ============================================================================

#[test]
fn test_anchor_track_lose_and_reanchor() {
    let map = textured_map(1280, 1024, 2024);
    let mut pipeline = build_pipeline(&map, 1, vec![Marker::new("poi", -0.85, 1.05)]);

    // Anchor at (1000, 800)
    let outcome = pipeline.tick(&frame_at(&map, 1000, 800, 1));
    assert_eq!(outcome.result.state, TrackerState::Anchored);
    assert_eq!(outcome.result.mode, MatchMode::Anchored);
    assert!(outcome.result.confidence >= 0.7);
    assert!(outcome.result.inliers >= 8);
    let fix = outcome.fix.expect("anchor should publish a fix");
    assert_near(fix.viewport.origin(), 1000.0, 800.0, 1.0);
    assert!((fix.viewport.scale - 1.0).abs() < 0.01);

    // Marker at native (1050, 850) is inside the frame, 50 px from its corner
    assert_eq!(fix.markers.len(), 1);
    assert!((fix.markers[0].screen_x - 50.0).abs() < 1.5);
    assert!((fix.markers[0].screen_y - 50.0).abs() < 1.5);

    // Centre converts back to geography
    let center = fix.viewport.center();
    assert!((fix.center.lng - center.x / 1000.0).abs() < 1e-6);
    assert!((fix.center.lat + center.y / 1000.0).abs() < 1e-6);

    // Five tracked translations of (4, -2)
    let mut last_good = fix;
    for i in 1..=5u32 {
        let outcome = pipeline.tick(&frame_at(&map, 1000 + 4 * i, 800 - 2 * i, 1 + i as u64));
        assert_eq!(outcome.result.state, TrackerState::Tracking, "frame {}", i);
        assert_eq!(outcome.result.mode, MatchMode::Tracked);
        let fix = outcome.fix.expect("tracked frame should publish");
        assert_near(
            fix.viewport.origin(),
            1000.0 + 4.0 * i as f64,
            800.0 - 2.0 * i as f64,
            1.5,
        );
        last_good = fix;
    }

    // Noise: motion fails, re-anchor fails, k = 1 → LOST without a position
    let outcome = pipeline.tick(&Frame::from_gray(noise(FRAME_WIDTH, FRAME_HEIGHT, 5)).with_sequence(7));
    assert_eq!(outcome.result.state, TrackerState::Lost);
    assert!(outcome.result.position.is_none());
    assert_eq!(outcome.result.confidence, 0.0);
    assert!(outcome.fix.is_none());
    assert_near(last_good.viewport.origin(), 1020.0, 790.0, 1.5);

    // The original view comes back: full search anchors it again
    let outcome = pipeline.tick(&frame_at(&map, 1000, 800, 8));
    assert_eq!(outcome.result.state, TrackerState::Anchored);
    assert_eq!(outcome.result.mode, MatchMode::Anchored);
    let fix = outcome.fix.expect("re-anchor should publish");
    assert_near(fix.viewport.origin(), 1000.0, 800.0, 1.0);
    assert_eq!(fix.markers.len(), 1);
    assert!((fix.markers[0].screen_x - 50.0).abs() < 1.5);
    assert!((fix.markers[0].screen_y - 50.0).abs() < 1.5);

    let counters = pipeline.metrics().counters();
    assert_eq!(counters.frames_processed, 8);
    assert_eq!(counters.anchors, 2);
    assert_eq!(counters.tracked_updates, 5);
    assert_eq!(counters.failed_steps, 1);
    assert_eq!(counters.lost_events, 1);
}

#[test]
fn test_fresh_view_elsewhere_anchors_after_lost() {
    let map = textured_map(1280, 1024, 2024);
    let mut pipeline = build_pipeline(&map, 1, Vec::new());

    assert!(pipeline.tick(&frame_at(&map, 1000, 800, 1)).fix.is_some());
    let outcome = pipeline.tick(&Frame::from_gray(noise(FRAME_WIDTH, FRAME_HEIGHT, 6)).with_sequence(2));
    assert_eq!(outcome.result.state, TrackerState::Lost);

    let outcome = pipeline.tick(&frame_at(&map, 300, 200, 3));
    assert_eq!(outcome.result.state, TrackerState::Anchored);
    let fix = outcome.fix.expect("re-anchor should publish");
    assert_near(fix.viewport.origin(), 300.0, 200.0, 1.0);
}

#[test]
fn test_posterized_map_anchors_posterized_frames() {
    let map = textured_map(640, 480, 80);
    let posterize = PreprocessConfig {
        posterize_levels: 4,
        ..Default::default()
    };
    let features = FeatureConfig::default();

    // Map and frames both posterized
    let reference = ReferenceMap::with_preprocess(map.clone(), 1.0, &features, posterize).unwrap();
    let mut matched = pipeline_over(build_matcher(reference, 3), Vec::new());
    let outcome = matched.tick(&frame_at(&map, 200, 150, 1));
    assert_eq!(outcome.result.state, TrackerState::Anchored);
    assert!(outcome.result.confidence >= 0.9, "confidence {:.2}", outcome.result.confidence);
    let fix = outcome.fix.expect("anchor should publish");
    assert_near(fix.viewport.origin(), 200.0, 150.0, 1.0);

    // Frames posterized against a raw map lose most of their support
    let raw = ReferenceMap::new(map.clone(), 1.0, &features).unwrap();
    let mut mismatched = pipeline_over(build_matcher(raw, 3).with_preprocess(posterize), Vec::new());
    let other = mismatched.tick(&frame_at(&map, 200, 150, 1));
    assert!(
        outcome.result.inliers > other.result.inliers,
        "consistent {} vs mismatched {}",
        outcome.result.inliers,
        other.result.inliers
    );

    // Tracking continues on posterized frames
    let outcome = matched.tick(&frame_at(&map, 204, 148, 2));
    assert_eq!(outcome.result.state, TrackerState::Tracking);
    let fix = outcome.fix.expect("tracked frame should publish");
    assert_near(fix.viewport.origin(), 204.0, 148.0, 1.5);
}

#[test]
fn test_lost_after_k_consecutive_failures() {
    let map = textured_map(640, 480, 77);
    let mut pipeline = build_pipeline(&map, 3, Vec::new());

    let outcome = pipeline.tick(&frame_at(&map, 200, 150, 1));
    assert_eq!(outcome.result.state, TrackerState::Anchored);

    let states: Vec<TrackerState> = (0..3)
        .map(|i| {
            let frame = Frame::from_gray(noise(FRAME_WIDTH, FRAME_HEIGHT, 100 + i)).with_sequence(2 + i);
            let outcome = pipeline.tick(&frame);
            assert!(outcome.fix.is_none());
            outcome.result.state
        })
        .collect();
    assert_eq!(
        states,
        vec![TrackerState::Anchored, TrackerState::Anchored, TrackerState::Lost]
    );
}

#[test]
fn test_featureless_frame_is_lost_immediately() {
    let map = textured_map(640, 480, 78);
    let mut pipeline = build_pipeline(&map, 3, Vec::new());
    pipeline.tick(&frame_at(&map, 100, 100, 1));

    let blank = Frame::from_gray(GrayImage::from_pixel(FRAME_WIDTH, FRAME_HEIGHT, Luma([128])));
    let outcome = pipeline.tick(&blank.with_sequence(2));
    assert_eq!(outcome.result.state, TrackerState::Lost);
    assert!(outcome.fix.is_none());
}

#[test]
fn test_periodic_reanchor_refreshes_position() {
    let map = textured_map(640, 480, 79);
    let features = FeatureConfig::default();
    let reference = Arc::new(ReferenceMap::new(map.clone(), 1.0, &features).unwrap());
    let mut matcher = CascadeScaleMatcher::with_reference(
        MatcherConfig {
            levels: vec![ScaleLevel::new("full", 1.0, 500, 8)],
            max_frames_since_anchor: 3,
            ..Default::default()
        },
        reference,
        features,
        MotionConfig {
            downscale: 0.5,
            ..Default::default()
        },
    );

    let modes: Vec<MatchMode> = (0..7u32)
        .map(|i| {
            let gray = imaging::crop(&map, 100 + 2 * i, 120, FRAME_WIDTH, FRAME_HEIGHT);
            let result = matcher.step(&gray, i as u64);
            assert!(result.is_accepted(), "frame {}", i);
            assert_near(result.position.unwrap(), 100.0 + 2.0 * i as f64, 120.0, 1.5);
            result.mode
        })
        .collect();
    use MatchMode::{Anchored as A, Tracked as T};
    assert_eq!(modes, vec![A, T, T, A, T, T, A]);
}

// ============================================================================
// Threaded service
// ============================================================================

#[test]
fn test_service_replays_sequence_and_retains_last_fix() {
    let map = textured_map(512, 384, 31);
    let dir = TempDir::new().unwrap();
    for i in 0..3u32 {
        imaging::crop(&map, 150 + 2 * i, 100, FRAME_WIDTH, FRAME_HEIGHT)
            .save(dir.path().join(format!("frame_{:03}.png", i)))
            .unwrap();
    }
    for i in 3..5u64 {
        noise(FRAME_WIDTH, FRAME_HEIGHT, i)
            .save(dir.path().join(format!("frame_{:03}.png", i)))
            .unwrap();
    }

    let source = ImageSequenceSource::open(dir.path(), false).unwrap();
    let finished = source.finished_flag();
    let mut service = PositionService::start(
        build_pipeline(&map, 1, Vec::new()),
        CaptureConfig::default(),
        source,
    )
    .unwrap();

    let deadline = Instant::now() + Duration::from_secs(60);
    while Instant::now() < deadline {
        if finished.load(Ordering::SeqCst)
            && service.last_processed_sequence() == service.last_captured_sequence()
            && service.last_captured_sequence() == 5
        {
            break;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    assert_eq!(service.last_processed_sequence(), 5);

    // The last frame was noise: LOST, but the previous fix is still readable
    assert_eq!(service.tracker_state(), TrackerState::Lost);
    let fix = service.latest_fix().expect("good frames should have published");
    assert!(fix.viewport.x >= 149.0 && fix.viewport.x <= 155.0);
    assert!((fix.viewport.y - 100.0).abs() < 1.5);

    service.stop();
    let snapshot = service.snapshot();
    assert_eq!(snapshot.capture.frames_captured, 5);
    assert!(snapshot.counters.fixes_published >= 1);
    assert_eq!(snapshot.tracker_state, TrackerState::Lost);
    assert!(snapshot.to_json().unwrap().contains("\"LOST\""));
}
