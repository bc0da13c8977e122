//! Tracing subscriber setup.

use std::path::Path;

use time::format_description::well_known::Rfc3339;
use time::UtcOffset;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::time::OffsetTime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::error::CliError;

/// Default filter directive for a verbosity count (`-v`, `-vv`).
pub fn default_directive(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "mapsight=info,mapsight_cli=info",
        1 => "mapsight=debug,mapsight_cli=debug",
        _ => "mapsight=trace,mapsight_cli=trace",
    }
}

/// Install the global subscriber.
///
/// Logs go to stderr so stdout stays clean for JSON output. `RUST_LOG`
/// overrides the verbosity flag. With `log_file`, a second non-blocking
/// writer without ANSI colours is added; keep the returned guard alive until
/// exit so buffered lines are flushed.
pub fn init(verbosity: u8, log_file: Option<&Path>) -> Result<Option<WorkerGuard>, CliError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbosity)));

    // Must run before any thread is spawned for the local offset to resolve
    let timer = OffsetTime::local_rfc_3339()
        .unwrap_or_else(|_| OffsetTime::new(UtcOffset::UTC, Rfc3339));

    let stderr_layer = fmt::layer()
        .with_timer(timer.clone())
        .with_writer(std::io::stderr);

    let (file_layer, guard) = match log_file {
        Some(path) => {
            let file_name = path.file_name().ok_or_else(|| {
                CliError::Config(format!("Log file path has no file name: {}", path.display()))
            })?;
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            std::fs::create_dir_all(dir).map_err(|source| CliError::LogFile {
                path: path.to_path_buf(),
                source,
            })?;

            let appender = tracing_appender::rolling::never(dir, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_ansi(false)
                .with_timer(timer)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| CliError::Config(format!("Failed to initialise logging: {}", e)))?;

    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbosity_directives() {
        assert!(default_directive(0).contains("mapsight=info"));
        assert!(default_directive(1).contains("mapsight=debug"));
        assert!(default_directive(5).contains("mapsight=trace"));
    }

    #[test]
    fn test_directives_parse() {
        for v in 0..3 {
            assert!(EnvFilter::try_new(default_directive(v)).is_ok());
        }
    }
}
