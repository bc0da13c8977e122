//! MapSight CLI - command-line front end for the tracking library.
//!
//! ```text
//! mapsight track --frames ./captures --map world.png
//! mapsight transform to-detection 48.8566 2.3522
//! mapsight config check
//! ```

mod commands;
mod error;
mod logging;

use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand};

use commands::config::ConfigCommands;
use commands::track::TrackArgs;
use commands::transform::TransformAction;
use error::CliError;

#[derive(Debug, Parser)]
#[command(name = "mapsight", version, about = "Track a camera view on a reference map")]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    /// Configuration file (default: <config dir>/mapsight/config.ini)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Also write logs to this file
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Replay captured frames and print position fixes as JSON lines
    Track {
        /// Directory of captured frame images, replayed in file name order
        #[arg(long)]
        frames: PathBuf,

        /// Reference map image (overrides [map] path)
        #[arg(long)]
        map: Option<PathBuf>,

        /// Restart from the first frame after the last one
        #[arg(long = "loop")]
        looping: bool,

        /// Initial capture rate in frames per second
        #[arg(long)]
        fps: Option<f64>,

        /// Upper bound on the adaptive capture rate
        #[arg(long)]
        max_fps: Option<f64>,
    },

    /// Convert coordinates using the configured calibration
    Transform {
        #[command(subcommand)]
        action: TransformAction,
    },

    /// Inspect the configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

fn main() {
    let cli = Cli::parse();

    let _log_guard = match logging::init(cli.verbose, cli.log_file.as_deref()) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = run(cli) {
        tracing::error!(error = %e, "Command failed");
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        Commands::Track {
            frames,
            map,
            looping,
            fps,
            max_fps,
        } => commands::track::run(TrackArgs {
            config: cli.config,
            frames,
            map,
            looping,
            initial_fps: fps,
            max_fps,
        }),
        Commands::Transform { action } => commands::transform::run(cli.config, action),
        Commands::Config { command } => commands::config::run(cli.config, command),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_track() {
        let cli = Cli::try_parse_from([
            "mapsight", "-vv", "track", "--frames", "caps", "--loop", "--fps", "8",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Commands::Track {
                frames,
                looping,
                fps,
                map,
                ..
            } => {
                assert_eq!(frames, PathBuf::from("caps"));
                assert!(looping);
                assert_eq!(fps, Some(8.0));
                assert!(map.is_none());
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_negative_coordinates() {
        let cli = Cli::try_parse_from([
            "mapsight", "--config", "x.ini", "transform", "to-detection", "-33.86", "-151.2",
        ])
        .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("x.ini")));
        match cli.command {
            Commands::Transform {
                action: TransformAction::ToDetection { lat, lng },
            } => {
                assert_eq!(lat, -33.86);
                assert_eq!(lng, -151.2);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_track_requires_frames() {
        assert!(Cli::try_parse_from(["mapsight", "track"]).is_err());
    }
}
