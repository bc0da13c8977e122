//! Track command - replay captured frames through the position service.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use mapsight::capture::ImageSequenceSource;
use mapsight::fps::AdaptiveFpsController;
use mapsight::matcher::CascadeScaleMatcher;
use mapsight::pipeline::{MarkerSet, Pipeline, PositionService};
use mapsight::reference::ReferenceMap;
use mapsight::telemetry::TelemetrySnapshot;

use super::common::{build_transform, load_config, resolve_map_path};
use crate::error::CliError;

const POLL_INTERVAL: Duration = Duration::from_millis(20);
const STATUS_INTERVAL: Duration = Duration::from_secs(10);

/// Arguments for the track command.
pub struct TrackArgs {
    pub config: Option<PathBuf>,
    pub frames: PathBuf,
    pub map: Option<PathBuf>,
    pub looping: bool,
    pub initial_fps: Option<f64>,
    pub max_fps: Option<f64>,
}

/// Run the track command.
///
/// Fixes are printed to stdout as one JSON object per line. The final
/// telemetry snapshot is printed as pretty JSON after shutdown.
pub fn run(args: TrackArgs) -> Result<(), CliError> {
    let config = load_config(args.config.as_deref())?;
    let transform = build_transform(&config)?;
    let map_path = resolve_map_path(args.map, &config)?;

    let mut fps = config.fps.clone();
    if let Some(initial) = args.initial_fps {
        fps.initial_fps = initial;
    }
    if let Some(max) = args.max_fps {
        fps.max_fps = Some(max);
    }

    eprintln!("MapSight Tracker v{}", mapsight::VERSION);
    eprintln!("=====================");
    eprintln!();
    eprintln!("Reference map: {}", map_path.display());
    eprintln!("Frames:        {}", args.frames.display());
    eprintln!("Detection:     {}x scale", config.map.detection_scale);
    eprintln!();

    let started = Instant::now();
    let reference = Arc::new(ReferenceMap::load(
        &map_path,
        config.map.detection_scale,
        &config.features,
        config.map.preprocess,
    )?);
    eprintln!(
        "Indexed {} map features in {:.1}s",
        reference.index().len(),
        started.elapsed().as_secs_f64()
    );

    let matcher = CascadeScaleMatcher::with_reference(
        config.matcher.clone(),
        reference,
        config.features.clone(),
        config.motion.clone(),
    );
    let markers = MarkerSet::new(config.markers.clone(), &transform);
    let pipeline = Pipeline::new(matcher, transform, markers, AdaptiveFpsController::new(fps));

    let source = ImageSequenceSource::open(&args.frames, args.looping)?;
    eprintln!("Replaying {} frames{}", source.len(), if args.looping { " (looping)" } else { "" });
    eprintln!("Press Ctrl+C to stop");
    eprintln!();
    let finished = source.finished_flag();

    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_clone = shutdown.clone();
    ctrlc::set_handler(move || {
        shutdown_clone.store(true, Ordering::SeqCst);
    })
    .map_err(|e| CliError::Config(format!("Failed to set signal handler: {}", e)))?;

    let mut service = PositionService::start(pipeline, config.capture.clone(), source)?;
    let mut last_printed = 0u64;
    let mut last_status = Instant::now();

    while !shutdown.load(Ordering::SeqCst) {
        std::thread::sleep(POLL_INTERVAL);
        print_new_fix(&service, &mut last_printed)?;

        if last_status.elapsed() >= STATUS_INTERVAL {
            log_status(&service.snapshot());
            last_status = Instant::now();
        }

        let drained = service.last_processed_sequence() == service.last_captured_sequence();
        if finished.load(Ordering::SeqCst) && drained {
            tracing::info!("Frame sequence exhausted");
            break;
        }
    }

    service.stop();
    print_new_fix(&service, &mut last_printed)?;

    let snapshot = service.snapshot();
    eprintln!();
    eprintln!("Session Summary");
    eprintln!("───────────────");
    eprintln!(
        "  Frames: {} processed, {} dropped",
        snapshot.counters.frames_processed, snapshot.counters.frames_dropped
    );
    eprintln!(
        "  Accepted: {:.0}% ({} anchors, {} tracked)",
        snapshot.acceptance_rate() * 100.0,
        snapshot.counters.anchors,
        snapshot.counters.tracked_updates
    );
    eprintln!("  Final state: {}", snapshot.tracker_state.display_status());
    eprintln!();
    println!("{}", snapshot.to_json()?);

    Ok(())
}

/// Print the latest fix as a JSON line if it is newer than `last_printed`.
fn print_new_fix(service: &PositionService, last_printed: &mut u64) -> Result<(), CliError> {
    if let Some(fix) = service.latest_fix() {
        if fix.frame_sequence > *last_printed {
            println!("{}", serde_json::to_string(&fix)?);
            *last_printed = fix.frame_sequence;
        }
    }
    Ok(())
}

fn log_status(snapshot: &TelemetrySnapshot) {
    tracing::info!(
        state = %snapshot.tracker_state,
        fps = format!("{:.1}", snapshot.fps.target_fps),
        p95_ms = format!("{:.1}", snapshot.latency.p95_ms),
        processed = snapshot.counters.frames_processed,
        lost = snapshot.counters.lost_events,
        "Tracker status"
    );
}
