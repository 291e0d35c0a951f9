//! lmswatch - dashboard change monitor.
//!
//! Watches a login-gated LMS dashboard, extracts assignments from a
//! screenshot with a vision LLM, and notifies over LINE and email. Every
//! external call is metered by a daily quota and every notified assignment
//! is remembered so it is announced once.

pub mod calendar;
pub mod cli;
pub mod clock;
pub mod config;
pub mod fetch;
pub mod fingerprint;
pub mod models;
pub mod monitor;
pub mod notify;
pub mod ocr;
pub mod quota;
pub mod retry;
pub mod storage;
