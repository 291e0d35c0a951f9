//! One monitoring cycle, from fetch to persisted baseline.
//!
//! ```text
//! Fetch -> Unchanged
//!       -> Changed -> Extract -> NoTextChange
//!                             -> Dedupe -> Record -> Export? -> Notify -> Persist
//! ```
//!
//! The seen-assignment ledger is written before anything is sent. The
//! fingerprint and text baselines are only written once a cycle reaches a
//! terminal state, so a cycle that fails part way is retried from the same
//! baseline next run.

mod messages;
mod run;
mod setup;

pub use run::{Monitor, MonitorOptions, RunOutcome};
pub use setup::{alert_setup_failure, build_dispatcher, build_monitor};

use thiserror::Error;

use crate::config::ConfigError;
use crate::fetch::FetchError;
use crate::ocr::OcrError;
use crate::storage::StoreError;

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Dashboard fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("OCR failed: {0}")]
    Ocr(#[from] OcrError),

    #[error(transparent)]
    Store(#[from] StoreError),
}
