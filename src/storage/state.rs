//! Baselines carried between runs: page fingerprint, OCR text and the last
//! timeout alert.

use std::path::PathBuf;

use chrono::{DateTime, FixedOffset};
use tracing::debug;

use super::{read_text, write_text, StoreError};

/// Paths of the per-run baseline files.
#[derive(Debug, Clone)]
pub struct RunState {
    fingerprint_path: PathBuf,
    ocr_text_path: PathBuf,
    timeout_alert_path: PathBuf,
}

impl RunState {
    pub fn new(
        fingerprint_path: impl Into<PathBuf>,
        ocr_text_path: impl Into<PathBuf>,
        timeout_alert_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            fingerprint_path: fingerprint_path.into(),
            ocr_text_path: ocr_text_path.into(),
            timeout_alert_path: timeout_alert_path.into(),
        }
    }

    /// Previous fingerprint, empty on first run.
    pub fn fingerprint(&self) -> Result<String, StoreError> {
        Ok(read_text(&self.fingerprint_path)?.trim().to_string())
    }

    pub fn save_fingerprint(&self, hash: &str) -> Result<(), StoreError> {
        debug!("Persisting fingerprint {}", &hash[..hash.len().min(10)]);
        write_text(&self.fingerprint_path, hash)
    }

    /// Previous OCR text, empty if none recorded.
    pub fn ocr_text(&self) -> Result<String, StoreError> {
        read_text(&self.ocr_text_path)
    }

    pub fn save_ocr_text(&self, text: &str) -> Result<(), StoreError> {
        write_text(&self.ocr_text_path, text)
    }

    /// When the last timeout alert went out. Unparseable content reads as never.
    pub fn last_timeout_alert(&self) -> Result<Option<DateTime<FixedOffset>>, StoreError> {
        let raw = read_text(&self.timeout_alert_path)?;
        Ok(DateTime::parse_from_rfc3339(raw.trim()).ok())
    }

    pub fn record_timeout_alert(&self, at: DateTime<FixedOffset>) -> Result<(), StoreError> {
        write_text(&self.timeout_alert_path, &at.to_rfc3339())
    }
}
