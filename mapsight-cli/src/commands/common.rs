//! Common helpers shared across CLI commands.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use mapsight::config::ConfigFile;
use mapsight::coord::CoordinateTransform;

use crate::error::CliError;

/// Default configuration file location (`<config dir>/mapsight/config.ini`).
pub fn config_file_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("mapsight")
        .join("config.ini")
}

/// Load the configuration.
///
/// An explicit `--config` path must exist. Without one, the default path is
/// used when present and built-in defaults otherwise.
pub fn load_config(explicit: Option<&Path>) -> Result<ConfigFile, CliError> {
    if let Some(path) = explicit {
        tracing::debug!(path = %path.display(), "Loading configuration");
        return Ok(ConfigFile::load_from(path)?);
    }

    let path = config_file_path();
    if path.exists() {
        tracing::debug!(path = %path.display(), "Loading configuration");
        Ok(ConfigFile::load_from(&path)?)
    } else {
        tracing::debug!(path = %path.display(), "No configuration file, using defaults");
        Ok(ConfigFile::default())
    }
}

/// Build the coordinate transform from the configured calibration.
pub fn build_transform(config: &ConfigFile) -> Result<Arc<CoordinateTransform>, CliError> {
    let calibration = config.calibration_set()?;
    let transform = CoordinateTransform::new(&calibration, config.map.detection_scale)?;
    Ok(Arc::new(transform))
}

/// Resolve the reference map path: CLI first, then `[map] path`.
pub fn resolve_map_path(cli: Option<PathBuf>, config: &ConfigFile) -> Result<PathBuf, CliError> {
    cli.or_else(|| config.map.path.clone()).ok_or_else(|| {
        CliError::Config(
            "No reference map. Set path in the [map] section of config.ini or use --map"
                .to_string(),
        )
    })
}
