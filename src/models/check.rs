//! Result of one dashboard fetch cycle.

use std::path::PathBuf;

/// Output of a single fetch. Not persisted beyond the run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckResult {
    /// Fingerprint of the monitored text observed in this fetch.
    pub fingerprint: String,
    /// Screenshot of the dashboard, present only when the content changed.
    pub screenshot_path: Option<PathBuf>,
    /// Whether the fingerprint differs from the previous run's.
    pub changed: bool,
}

impl CheckResult {
    pub fn unchanged(fingerprint: impl Into<String>) -> Self {
        Self {
            fingerprint: fingerprint.into(),
            screenshot_path: None,
            changed: false,
        }
    }

    pub fn changed(fingerprint: impl Into<String>, screenshot_path: PathBuf) -> Self {
        Self {
            fingerprint: fingerprint.into(),
            screenshot_path: Some(screenshot_path),
            changed: true,
        }
    }
}
