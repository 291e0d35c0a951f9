//! Backoff helpers for rate-limited API clients.

use std::time::Duration;

/// Upper bound on any single computed wait.
const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Parse a Retry-After header value (seconds), capped at one minute.
/// Returns None if the header is missing or not an integer.
pub fn parse_retry_after(header_value: Option<&str>) -> Option<Duration> {
    let value = header_value?;
    value
        .trim()
        .parse::<u64>()
        .ok()
        .map(|secs| Duration::from_secs(secs).min(MAX_BACKOFF))
}

/// Exponential backoff delay for a given attempt (0-based).
pub fn backoff_delay(attempt: u32, base_ms: u64) -> Duration {
    let factor = 2u64.saturating_pow(attempt);
    Duration::from_millis(base_ms.saturating_mul(factor)).min(MAX_BACKOFF)
}
