//! Configuration inspection commands.

use std::path::PathBuf;

use clap::Subcommand;

use super::common::{config_file_path, load_config};
use crate::error::CliError;

/// Config subcommands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommands {
    /// Show the default configuration file path
    Path,

    /// Load the configuration and print the effective settings
    Check,
}

/// Run a config subcommand.
pub fn run(config: Option<PathBuf>, command: ConfigCommands) -> Result<(), CliError> {
    match command {
        ConfigCommands::Path => {
            println!("{}", config_file_path().display());
            Ok(())
        }
        ConfigCommands::Check => run_check(config),
    }
}

fn run_check(path: Option<PathBuf>) -> Result<(), CliError> {
    let config = load_config(path.as_deref())?;

    println!("Effective Configuration");
    println!("=======================");
    println!();
    println!("[map]");
    match &config.map.path {
        Some(path) => println!("  path = {}", path.display()),
        None => println!("  path = (not set)"),
    }
    println!("  detection_scale = {}", config.map.detection_scale);
    println!("  posterize = {}", config.map.preprocess.posterize_levels);
    println!("  equalize_clip = {}", config.map.preprocess.equalize_clip_limit);
    println!("  equalize_tiles = {}", config.map.preprocess.equalize_tiles);
    println!();

    println!("[calibration]");
    match config.calibration_set() {
        Ok(set) => println!("  {} points", set.len()),
        Err(e) => println!("  invalid: {}", e),
    }
    println!();

    println!("[fps]");
    println!("  floor = {}", config.fps.floor_fps);
    println!("  initial = {}", config.fps.initial_fps);
    match config.fps.max_fps {
        Some(max) => println!("  max = {}", max),
        None => println!("  max = (unbounded)"),
    }
    println!();

    println!("[matcher]");
    let scales: Vec<String> = config.matcher.scales().iter().map(|s| s.to_string()).collect();
    println!("  scales = {}", scales.join(", "));
    let thresholds: Vec<String> = config
        .matcher
        .levels
        .iter()
        .map(|l| format!("{}", config.matcher.exit_confidence(l)))
        .collect();
    println!("  level_confidence = {}", thresholds.join(", "));
    println!("  feature_confidence = {}", config.matcher.feature_confidence);
    println!("  motion_confidence = {}", config.matcher.motion_confidence);
    println!("  max_frames_since_anchor = {}", config.matcher.max_frames_since_anchor);
    println!("  lost_after = {}", config.matcher.lost_after);
    println!();

    println!("[motion]");
    println!("  downscale = {}", config.motion.downscale);
    println!();

    println!("[markers]");
    println!("  {} markers", config.markers.len());

    Ok(())
}
