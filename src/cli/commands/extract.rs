//! One-off extraction from a local screenshot.

use std::path::Path;
use std::sync::Arc;

use console::style;

use crate::clock::{Clock, SystemClock};
use crate::config::{ConfigError, Credentials, Settings};
use crate::ocr::{GeminiProvider, OcrCache, OcrGateway, OcrSource};
use crate::quota::QuotaLedger;

/// Run the OCR gateway on `image` and print the result.
///
/// Uses the same cache and daily quota as the monitor.
pub async fn cmd_extract(settings: &Settings, image: &Path) -> anyhow::Result<()> {
    let credentials = Credentials::from_env();
    if credentials.gemini_api_key.is_none() {
        return Err(ConfigError::MissingCredential("GEMINI_API_KEY").into());
    }

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let quota = QuotaLedger::load(&settings.data_dir, settings.limits, clock.clone());
    let provider = GeminiProvider::new(settings.ocr.clone(), credentials.gemini_api_key)?;
    let mut gateway = OcrGateway::new(
        Arc::new(provider),
        OcrCache::load(settings.ocr_cache_path()),
        quota,
        clock,
        settings.course_list_path(),
    );

    let outcome = gateway.extract_file(image).await?;
    let source = match outcome.source {
        OcrSource::Cache => style("cache").cyan(),
        OcrSource::Provider => style("provider").green(),
        OcrSource::Unparsed => style("unparsed").yellow(),
        OcrSource::Empty => style("empty").yellow(),
        OcrSource::QuotaSkipped => style("skipped").red(),
    };
    println!(
        "{} {} assignments ({})\n",
        style("OCR").bold(),
        outcome.assignments.len(),
        source
    );
    println!("{}", outcome.text);
    Ok(())
}
