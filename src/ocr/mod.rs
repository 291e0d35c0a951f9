//! Rate-limited, cache-backed OCR gateway.
//!
//! Turns a dashboard screenshot into structured [`Assignment`] records via an
//! external vision LLM. Two layers sit in front of the provider call:
//!
//! - **Content cache**: keyed by the SHA-256 of the image bytes. An identical
//!   screenshot never reaches the provider and never costs quota.
//! - **Daily quota**: a per-day ceiling on provider calls. Exhaustion is a
//!   policy outcome that yields a "skipped" result, not an error.
//!
//! [`Assignment`]: crate::models::Assignment

mod cache;
mod gateway;
mod gemini;
mod parse;
mod prompt;
mod provider;

pub use cache::{OcrCache, OcrCacheEntry, OCR_CACHE_CAPACITY};
pub use gateway::{OcrGateway, OcrOutcome, OcrSource, NO_RESULT_TEXT, QUOTA_SKIPPED_TEXT};
pub use gemini::{GeminiConfig, GeminiProvider};
pub use parse::{
    format_deadline, format_summary, parse_assignments, strip_code_fences, DEADLINE_FORMAT,
};
pub use prompt::{build_prompt, load_course_list};
pub use provider::VisionProvider;

use thiserror::Error;

/// Errors from OCR extraction that should abort the run.
#[derive(Debug, Error)]
pub enum OcrError {
    #[error("OCR credential missing: {0}")]
    MissingCredential(String),

    #[error("Cannot read image {path}: {source}")]
    ImageUnreadable {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("OCR provider request failed: {0}")]
    Transport(String),

    #[error("OCR provider error: {0}")]
    Api(String),
}
