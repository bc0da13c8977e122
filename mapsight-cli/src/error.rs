//! CLI error type.

use std::fmt;
use std::path::PathBuf;

use mapsight::capture::CaptureError;
use mapsight::config::ConfigError;
use mapsight::error::SetupError;

/// Errors surfaced to the user by the `mapsight` binary.
#[derive(Debug)]
pub enum CliError {
    /// Invalid or missing settings (message is shown as-is)
    Config(String),
    /// Configuration file could not be read or parsed
    ConfigFile(ConfigError),
    /// Reference map, calibration or thread setup failed
    Setup(SetupError),
    /// Frame source could not be opened
    Capture(CaptureError),
    /// Log file directory could not be created
    LogFile { path: PathBuf, source: std::io::Error },
    /// Output serialisation failed
    Output(serde_json::Error),
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Config(msg) => write!(f, "Configuration error: {}", msg),
            CliError::ConfigFile(e) => write!(f, "Failed to load configuration: {}", e),
            CliError::Setup(e) => write!(f, "Setup failed: {}", e),
            CliError::Capture(e) => write!(f, "Failed to open frame source: {}", e),
            CliError::LogFile { path, source } => {
                write!(f, "Failed to open log file {}: {}", path.display(), source)
            }
            CliError::Output(e) => write!(f, "Failed to write output: {}", e),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::Config(_) => None,
            CliError::ConfigFile(e) => Some(e),
            CliError::Setup(e) => Some(e),
            CliError::Capture(e) => Some(e),
            CliError::LogFile { source, .. } => Some(source),
            CliError::Output(e) => Some(e),
        }
    }
}

impl From<ConfigError> for CliError {
    fn from(e: ConfigError) -> Self {
        CliError::ConfigFile(e)
    }
}

impl From<SetupError> for CliError {
    fn from(e: SetupError) -> Self {
        CliError::Setup(e)
    }
}

impl From<CaptureError> for CliError {
    fn from(e: CaptureError) -> Self {
        CliError::Capture(e)
    }
}

impl From<serde_json::Error> for CliError {
    fn from(e: serde_json::Error) -> Self {
        CliError::Output(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_cause() {
        let err = CliError::from(SetupError::CalibrationMissing);
        let text = err.to_string();
        assert!(text.starts_with("Setup failed: "));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_config_message_passthrough() {
        let err = CliError::Config("no reference map".to_string());
        assert_eq!(err.to_string(), "Configuration error: no reference map");
    }
}
