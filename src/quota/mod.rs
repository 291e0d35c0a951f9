//! Per-channel daily call budgets.
//!
//! Every external service with a hard free-tier ceiling (the OCR provider,
//! the push API, SMTP submission) is metered through one [`QuotaLedger`].
//! Counters reset whenever the stored day differs from today.

mod config;
mod ledger;

pub use config::QuotaLimits;
pub use ledger::{DailyQuota, QuotaLedger};

use std::fmt;

use serde::{Deserialize, Serialize};

/// A rate-limited outbound channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Ocr,
    Push,
    Email,
}

impl Channel {
    pub const ALL: [Channel; 3] = [Channel::Ocr, Channel::Push, Channel::Email];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ocr => "ocr",
            Self::Push => "push",
            Self::Email => "email",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
