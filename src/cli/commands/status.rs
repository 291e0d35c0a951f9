//! Quota and state overview.

use std::sync::Arc;

use console::style;

use crate::clock::SystemClock;
use crate::config::Settings;
use crate::ocr::OcrCache;
use crate::quota::{Channel, QuotaLedger};
use crate::storage::{HistoryStore, RunState};

/// Print today's quota usage and the size of the stored state.
pub async fn cmd_status(settings: &Settings) -> anyhow::Result<()> {
    let quota = QuotaLedger::load(&settings.data_dir, settings.limits, Arc::new(SystemClock));

    println!("\n{}", style("Daily quota").bold());
    println!("{}", "-".repeat(40));
    for channel in Channel::ALL {
        let used = quota.usage(channel).await.count;
        let limit = settings.limits.limit_for(channel);
        let shown = format!("{}/{}", used, limit);
        let shown = if used >= limit {
            style(shown).red()
        } else {
            style(shown).green()
        };
        println!("  {:<8} {}", channel.as_str(), shown);
    }

    let history = HistoryStore::load(settings.history_path())?;
    let cache = OcrCache::load(settings.ocr_cache_path());
    let state = RunState::new(
        settings.fingerprint_path(),
        settings.ocr_text_path(),
        settings.timeout_alert_path(),
    );
    let fingerprint = state.fingerprint()?;

    println!("\n{}", style("State").bold());
    println!("{}", "-".repeat(40));
    println!("  Data dir:        {}", settings.data_dir.display());
    println!("  Notified items:  {}", history.len());
    println!("  OCR cache:       {}", cache.len());
    if fingerprint.is_empty() {
        println!("  Fingerprint:     {}", style("none").dim());
    } else {
        println!(
            "  Fingerprint:     {}",
            &fingerprint[..fingerprint.len().min(10)]
        );
    }
    if let Some(at) = state.last_timeout_alert()? {
        println!("  Last timeout:    {}", at.format("%Y-%m-%d %H:%M"));
    }
    Ok(())
}
