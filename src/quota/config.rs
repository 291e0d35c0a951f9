//! Daily ceilings per channel.

use serde::{Deserialize, Serialize};

use super::Channel;

pub const DEFAULT_OCR_PER_DAY: u32 = 20;
pub const DEFAULT_PUSH_PER_DAY: u32 = 10;
pub const DEFAULT_EMAIL_PER_DAY: u32 = 50;

/// Maximum calls per calendar day for each channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaLimits {
    #[serde(default = "default_ocr")]
    pub ocr: u32,
    #[serde(default = "default_push")]
    pub push: u32,
    #[serde(default = "default_email")]
    pub email: u32,
}

fn default_ocr() -> u32 {
    DEFAULT_OCR_PER_DAY
}
fn default_push() -> u32 {
    DEFAULT_PUSH_PER_DAY
}
fn default_email() -> u32 {
    DEFAULT_EMAIL_PER_DAY
}

impl Default for QuotaLimits {
    fn default() -> Self {
        Self {
            ocr: DEFAULT_OCR_PER_DAY,
            push: DEFAULT_PUSH_PER_DAY,
            email: DEFAULT_EMAIL_PER_DAY,
        }
    }
}

impl QuotaLimits {
    pub fn limit_for(&self, channel: Channel) -> u32 {
        match channel {
            Channel::Ocr => self.ocr,
            Channel::Push => self.push,
            Channel::Email => self.email,
        }
    }
}
