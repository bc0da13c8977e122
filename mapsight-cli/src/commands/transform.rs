//! Transform command - convert between geographic and detection coordinates.

use std::path::PathBuf;

use clap::Subcommand;
use mapsight::coord::{CoordinateTransform, DetectionPoint, GeoPoint};

use super::common::{build_transform, load_config};
use crate::error::CliError;

/// Conversion direction.
#[derive(Debug, Subcommand)]
pub enum TransformAction {
    /// Geographic position to detection-space pixels
    #[command(allow_negative_numbers = true)]
    ToDetection {
        /// Latitude in degrees
        lat: f64,
        /// Longitude in degrees
        lng: f64,
    },

    /// Detection-space pixels to geographic position
    #[command(allow_negative_numbers = true)]
    ToGeo {
        /// Horizontal pixel in detection space
        x: f64,
        /// Vertical pixel in detection space
        y: f64,
    },

    /// Show calibration fit residuals
    Residuals,
}

/// Run a transform subcommand.
pub fn run(config: Option<PathBuf>, action: TransformAction) -> Result<(), CliError> {
    let config = load_config(config.as_deref())?;
    let transform = build_transform(&config)?;

    match action {
        TransformAction::ToDetection { lat, lng } => {
            let point = to_detection(&transform, lat, lng)?;
            println!("{:.3}, {:.3}", point.x, point.y);
        }
        TransformAction::ToGeo { x, y } => {
            let geo = to_geographic(&transform, x, y)?;
            println!("{:.7}, {:.7}", geo.lat, geo.lng);
        }
        TransformAction::Residuals => {
            println!("Calibration residuals (native pixels)");
            println!("=====================================");
            for (i, (point, residual)) in config
                .calibration
                .iter()
                .zip(transform.residuals())
                .enumerate()
            {
                println!(
                    "  point.{}  ({:.5}, {:.5}) -> {:.3}",
                    i + 1,
                    point.geo.lat,
                    point.geo.lng,
                    residual
                );
            }
        }
    }

    Ok(())
}

fn to_detection(transform: &CoordinateTransform, lat: f64, lng: f64) -> Result<DetectionPoint, CliError> {
    let geo = GeoPoint::new(lat, lng);
    if !geo.is_finite() {
        return Err(CliError::Config(format!("Invalid coordinate: {}, {}", lat, lng)));
    }
    Ok(transform.to_detection_space(geo))
}

fn to_geographic(transform: &CoordinateTransform, x: f64, y: f64) -> Result<GeoPoint, CliError> {
    if !x.is_finite() || !y.is_finite() {
        return Err(CliError::Config(format!("Invalid pixel: {}, {}", x, y)));
    }
    Ok(transform.to_geographic(DetectionPoint::new(x, y)))
}
