//! Tracker state and match mode.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Tracker state.
///
/// ```text
/// COLD ──anchor──► ANCHORED ──motion──► TRACKING ──re-anchor──► ANCHORED
///   ▲                  │                    │
///   │                  └──── k failures / degenerate frame ────► LOST
///   └──────────────────────── next step ◄─────────────────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TrackerState {
    /// No anchor; the next step runs a full-map search.
    Cold,
    /// Position fixed by feature matching on the most recent success.
    Anchored,
    /// Position carried forward by motion estimates since the anchor.
    Tracking,
    /// Too many failures; no position is reported.
    Lost,
}

impl TrackerState {
    /// User-facing description.
    pub fn display_status(&self) -> &'static str {
        match self {
            TrackerState::Cold => "Searching",
            TrackerState::Anchored => "Locked",
            TrackerState::Tracking => "Tracking",
            TrackerState::Lost => "Lost",
        }
    }

    /// Whether an anchor is held in this state.
    pub fn has_anchor(&self) -> bool {
        matches!(self, TrackerState::Anchored | TrackerState::Tracking)
    }
}

impl fmt::Display for TrackerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TrackerState::Cold => "COLD",
            TrackerState::Anchored => "ANCHORED",
            TrackerState::Tracking => "TRACKING",
            TrackerState::Lost => "LOST",
        };
        f.write_str(s)
    }
}

/// Which estimator produced a match result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMode {
    /// Full feature match against the reference map.
    Anchored,
    /// Incremental motion estimate.
    Tracked,
}

impl fmt::Display for MatchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchMode::Anchored => f.write_str("anchored"),
            MatchMode::Tracked => f.write_str("tracked"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(TrackerState::Cold.to_string(), "COLD");
        assert_eq!(TrackerState::Lost.to_string(), "LOST");
        assert_eq!(MatchMode::Tracked.to_string(), "tracked");
        assert_eq!(TrackerState::Anchored.display_status(), "Locked");
    }

    #[test]
    fn test_serde_names() {
        assert_eq!(
            serde_json::to_string(&TrackerState::Tracking).unwrap(),
            "\"TRACKING\""
        );
        assert_eq!(serde_json::to_string(&MatchMode::Anchored).unwrap(), "\"anchored\"");
    }

    #[test]
    fn test_has_anchor() {
        assert!(!TrackerState::Cold.has_anchor());
        assert!(TrackerState::Anchored.has_anchor());
        assert!(TrackerState::Tracking.has_anchor());
        assert!(!TrackerState::Lost.has_anchor());
    }
}
