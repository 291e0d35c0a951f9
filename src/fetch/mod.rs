//! Dashboard fetching.
//!
//! The orchestrator only sees [`DashboardFetcher`]: give it the previous
//! fingerprint, get back a [`CheckResult`]. Failures come back typed so
//! timeouts can be told apart from structural breakage without looking at
//! error text.
//!
//! [`CheckResult`]: crate::models::CheckResult

mod config;

#[cfg(feature = "browser")]
mod browser;

#[cfg(feature = "browser")]
pub use browser::{BrowserDashboardFetcher, BrowserPaths, PortalLogin};
pub use config::{DashboardSelectors, FetchConfig};

use async_trait::async_trait;
use thiserror::Error;

use crate::models::CheckResult;

#[derive(Debug, Error)]
pub enum FetchError {
    /// The page or an expected element did not appear in time.
    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Navigation failed: {0}")]
    NavigationFailure(String),

    /// The page loaded but the monitored element is missing.
    #[error("Selector not found: {0}")]
    SelectorNotFound(String),

    #[error("Fetch failed: {0}")]
    Unknown(String),
}

impl FetchError {
    /// Whether retrying later may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, FetchError::Timeout(_))
    }
}

/// Fetches the dashboard and reports whether it changed.
#[async_trait]
pub trait DashboardFetcher: Send + Sync {
    async fn check(&self, previous_fingerprint: &str) -> Result<CheckResult, FetchError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_timeouts_are_transient() {
        assert!(FetchError::Timeout("dashboard".into()).is_transient());
        assert!(!FetchError::NavigationFailure("dns".into()).is_transient());
        assert!(!FetchError::SelectorNotFound("#dashboard".into()).is_transient());
        assert!(!FetchError::Unknown("?".into()).is_transient());
    }
}
