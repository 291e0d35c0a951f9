//! OCR gateway: cache lookup, quota gate, provider call, parse.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Datelike;
use tracing::{info, warn};

use super::cache::{OcrCache, OcrCacheEntry};
use super::parse::{format_summary, parse_assignments, strip_code_fences};
use super::prompt::{build_prompt, load_course_list};
use super::{OcrError, VisionProvider};
use crate::clock::Clock;
use crate::fingerprint::sha256_hex;
use crate::models::Assignment;
use crate::quota::{Channel, QuotaLedger};

/// Placeholder text when the daily OCR budget is spent.
pub const QUOTA_SKIPPED_TEXT: &str = "OCR skipped: daily limit reached";

/// Placeholder text when the provider returns no candidate.
pub const NO_RESULT_TEXT: &str = "No text could be read from the screenshot";

/// Where an extraction result came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OcrSource {
    /// Served from the content cache; no provider call, no quota.
    Cache,
    /// Fresh provider result, parsed successfully.
    Provider,
    /// Provider answered but the output was not a JSON assignment list.
    Unparsed,
    /// Provider answered with no candidate text.
    Empty,
    /// Daily quota exhausted; provider not called.
    QuotaSkipped,
}

/// Result of one extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OcrOutcome {
    /// Summary text (or raw model output / placeholder for degraded results).
    pub text: String,
    pub assignments: Vec<Assignment>,
    pub source: OcrSource,
}

impl OcrOutcome {
    fn skipped() -> Self {
        Self {
            text: QUOTA_SKIPPED_TEXT.to_string(),
            assignments: Vec::new(),
            source: OcrSource::QuotaSkipped,
        }
    }
}

/// Cache- and quota-fronted access to a [`VisionProvider`].
pub struct OcrGateway {
    provider: Arc<dyn VisionProvider>,
    cache: OcrCache,
    quota: QuotaLedger,
    clock: Arc<dyn Clock>,
    course_list_path: PathBuf,
}

impl OcrGateway {
    pub fn new(
        provider: Arc<dyn VisionProvider>,
        cache: OcrCache,
        quota: QuotaLedger,
        clock: Arc<dyn Clock>,
        course_list_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            provider,
            cache,
            quota,
            clock,
            course_list_path: course_list_path.into(),
        }
    }

    pub fn cache(&self) -> &OcrCache {
        &self.cache
    }

    /// Read an image from disk and extract from it.
    pub async fn extract_file(&mut self, path: &Path) -> Result<OcrOutcome, OcrError> {
        let image = tokio::fs::read(path)
            .await
            .map_err(|e| OcrError::ImageUnreadable {
                path: path.display().to_string(),
                source: e,
            })?;
        let mime = mime_guess::from_path(path)
            .first()
            .map(|m| m.essence_str().to_string())
            .unwrap_or_else(|| "image/png".to_string());
        self.extract(&image, &mime).await
    }

    /// Extract assignments from screenshot bytes.
    pub async fn extract(&mut self, image: &[u8], mime_type: &str) -> Result<OcrOutcome, OcrError> {
        if image.is_empty() {
            return Err(OcrError::ImageUnreadable {
                path: "<memory>".to_string(),
                source: std::io::Error::new(std::io::ErrorKind::InvalidData, "empty image"),
            });
        }

        let image_hash = sha256_hex(image);
        if let Some(entry) = self.cache.get(&image_hash) {
            info!(
                "OCR cache hit for {} (no provider call)",
                &image_hash[..10]
            );
            return Ok(OcrOutcome {
                text: entry.extracted_text.clone(),
                assignments: entry.assignments.clone(),
                source: OcrSource::Cache,
            });
        }

        if !self.quota.check_and_reserve(Channel::Ocr).await {
            warn!(
                "OCR daily limit ({}) reached, skipping extraction",
                self.quota.limits().ocr
            );
            return Ok(OcrOutcome::skipped());
        }

        let now = self.clock.now();
        let prompt = build_prompt(&load_course_list(&self.course_list_path), now.year());

        info!("Running OCR via {}", self.provider.name());
        let response = match self.provider.generate(image, mime_type, &prompt).await {
            Ok(r) => r,
            Err(e) => {
                self.quota.release(Channel::Ocr).await;
                return Err(e);
            }
        };

        // The provider did the work; count it whatever the output looks like.
        if let Err(e) = self.quota.commit(Channel::Ocr).await {
            warn!("Failed to persist OCR quota: {}", e);
        }

        let Some(raw) = response else {
            warn!("OCR provider returned no candidates");
            return Ok(OcrOutcome {
                text: NO_RESULT_TEXT.to_string(),
                assignments: Vec::new(),
                source: OcrSource::Empty,
            });
        };

        let assignments = match parse_assignments(&raw) {
            Ok(a) => a,
            Err(e) => {
                warn!("OCR output is not an assignment list: {}; raw: {}", e, raw);
                return Ok(OcrOutcome {
                    text: strip_code_fences(&raw).to_string(),
                    assignments: Vec::new(),
                    source: OcrSource::Unparsed,
                });
            }
        };

        info!("OCR extracted {} assignments", assignments.len());
        let text = format_summary(&assignments, now.year());

        self.cache.insert(OcrCacheEntry {
            image_hash,
            extracted_text: text.clone(),
            assignments: assignments.clone(),
            produced_at: now.format("%Y-%m-%d %H:%M:%S").to_string(),
        });
        if let Err(e) = self.cache.save() {
            warn!("Failed to persist OCR cache: {}", e);
        }

        Ok(OcrOutcome {
            text,
            assignments,
            source: OcrSource::Provider,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::quota::QuotaLimits;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tempfile::{tempdir, TempDir};

    struct ScriptedProvider {
        replies: Mutex<Vec<Result<Option<String>, OcrError>>>,
        calls: AtomicUsize,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedProvider {
        fn new(replies: Vec<Result<Option<String>, OcrError>>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies),
                calls: AtomicUsize::new(0),
                prompts: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl VisionProvider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn generate(
            &self,
            _image: &[u8],
            _mime_type: &str,
            prompt: &str,
        ) -> Result<Option<String>, OcrError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.prompts.lock().unwrap().push(prompt.to_string());
            self.replies.lock().unwrap().remove(0)
        }
    }

    const HW1_JSON: &str =
        r#"[{"course": "CS101", "title": "HW1", "deadline": "2025-12-01 23:59"}]"#;

    fn gateway(
        dir: &TempDir,
        provider: Arc<ScriptedProvider>,
        ocr_limit: u32,
    ) -> (OcrGateway, QuotaLedger) {
        let clock: Arc<dyn Clock> = Arc::new(FixedClock::at("2025-11-20T10:00:00+09:00").unwrap());
        let quota = QuotaLedger::load(
            dir.path(),
            QuotaLimits {
                ocr: ocr_limit,
                ..QuotaLimits::default()
            },
            clock.clone(),
        );
        let gateway = OcrGateway::new(
            provider,
            OcrCache::load(dir.path().join("ocr-cache.json")),
            quota.clone(),
            clock,
            dir.path().join("courses.json"),
        );
        (gateway, quota)
    }

    #[tokio::test]
    async fn test_provider_result_is_parsed_and_cached() {
        let dir = tempdir().unwrap();
        let provider = ScriptedProvider::new(vec![Ok(Some(HW1_JSON.to_string()))]);
        let (mut gw, quota) = gateway(&dir, provider.clone(), 20);

        let first = gw.extract(b"image-1", "image/png").await.unwrap();
        assert_eq!(first.source, OcrSource::Provider);
        assert_eq!(
            first.assignments,
            vec![Assignment::new("CS101", "HW1", "2025-12-01 23:59")]
        );
        assert!(first.text.contains("[Task] HW1"));
        assert_eq!(quota.usage(Channel::Ocr).await.count, 1);

        let second = gw.extract(b"image-1", "image/png").await.unwrap();
        assert_eq!(second.source, OcrSource::Cache);
        assert_eq!(second.assignments, first.assignments);
        assert_eq!(second.text, first.text);
        assert_eq!(provider.calls(), 1);
        assert_eq!(quota.usage(Channel::Ocr).await.count, 1);
    }

    #[tokio::test]
    async fn test_cache_survives_restart() {
        let dir = tempdir().unwrap();
        let provider = ScriptedProvider::new(vec![Ok(Some(HW1_JSON.to_string()))]);
        let (mut gw, _) = gateway(&dir, provider.clone(), 20);
        gw.extract(b"image-1", "image/png").await.unwrap();

        let idle = ScriptedProvider::new(vec![]);
        let (mut gw, _) = gateway(&dir, idle.clone(), 20);
        let outcome = gw.extract(b"image-1", "image/png").await.unwrap();
        assert_eq!(outcome.source, OcrSource::Cache);
        assert_eq!(idle.calls(), 0);
    }

    #[tokio::test]
    async fn test_quota_exhausted_skips_without_call() {
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join("quota-ocr.json"),
            r#"{"date": "2025-11-20", "count": 20}"#,
        )
        .unwrap();
        let provider = ScriptedProvider::new(vec![]);
        let (mut gw, _) = gateway(&dir, provider.clone(), 20);

        let outcome = gw.extract(b"image-1", "image/png").await.unwrap();
        assert_eq!(outcome.source, OcrSource::QuotaSkipped);
        assert_eq!(outcome.text, QUOTA_SKIPPED_TEXT);
        assert!(outcome.assignments.is_empty());
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn test_cache_hit_ignores_exhausted_quota() {
        let dir = tempdir().unwrap();
        let provider = ScriptedProvider::new(vec![Ok(Some(HW1_JSON.to_string()))]);
        let (mut gw, _) = gateway(&dir, provider.clone(), 1);

        gw.extract(b"image-1", "image/png").await.unwrap();
        let outcome = gw.extract(b"image-1", "image/png").await.unwrap();
        assert_eq!(outcome.source, OcrSource::Cache);

        let other = gw.extract(b"image-2", "image/png").await.unwrap();
        assert_eq!(other.source, OcrSource::QuotaSkipped);
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn test_unparseable_output_degrades() {
        let dir = tempdir().unwrap();
        let provider =
            ScriptedProvider::new(vec![Ok(Some("Sorry, nothing here.".to_string()))]);
        let (mut gw, quota) = gateway(&dir, provider, 20);

        let outcome = gw.extract(b"image-1", "image/png").await.unwrap();
        assert_eq!(outcome.source, OcrSource::Unparsed);
        assert_eq!(outcome.text, "Sorry, nothing here.");
        assert!(outcome.assignments.is_empty());
        assert!(gw.cache().is_empty());
        assert_eq!(quota.usage(Channel::Ocr).await.count, 1);
    }

    #[tokio::test]
    async fn test_unparseable_output_loses_fences() {
        let dir = tempdir().unwrap();
        let provider = ScriptedProvider::new(vec![Ok(Some(
            "```json\nCS101 HW1 due Monday\n```".to_string(),
        ))]);
        let (mut gw, _) = gateway(&dir, provider, 20);

        let outcome = gw.extract(b"image-1", "image/png").await.unwrap();
        assert_eq!(outcome.source, OcrSource::Unparsed);
        assert_eq!(outcome.text, "CS101 HW1 due Monday");
    }

    #[tokio::test]
    async fn test_empty_response() {
        let dir = tempdir().unwrap();
        let provider = ScriptedProvider::new(vec![Ok(None)]);
        let (mut gw, _) = gateway(&dir, provider, 20);

        let outcome = gw.extract(b"image-1", "image/png").await.unwrap();
        assert_eq!(outcome.source, OcrSource::Empty);
        assert_eq!(outcome.text, NO_RESULT_TEXT);
    }

    #[tokio::test]
    async fn test_transport_error_releases_quota() {
        let dir = tempdir().unwrap();
        let provider = ScriptedProvider::new(vec![
            Err(OcrError::Transport("connection reset".to_string())),
            Ok(Some(HW1_JSON.to_string())),
        ]);
        let (mut gw, quota) = gateway(&dir, provider, 1);

        let err = gw.extract(b"image-1", "image/png").await.unwrap_err();
        assert!(matches!(err, OcrError::Transport(_)));
        assert_eq!(quota.usage(Channel::Ocr).await.count, 0);

        let outcome = gw.extract(b"image-1", "image/png").await.unwrap();
        assert_eq!(outcome.source, OcrSource::Provider);
    }

    #[tokio::test]
    async fn test_prompt_includes_course_list() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("courses.json"), r#"["Statistics (Yabu)"]"#).unwrap();
        let provider = ScriptedProvider::new(vec![Ok(Some("[]".to_string()))]);
        let (mut gw, _) = gateway(&dir, provider.clone(), 20);

        let outcome = gw.extract(b"image-1", "image/png").await.unwrap();
        assert_eq!(outcome.text, "No assignments found");
        let prompts = provider.prompts.lock().unwrap();
        assert!(prompts[0].contains("Statistics (Yabu)"));
        assert!(prompts[0].contains("2025"));
    }

    #[tokio::test]
    async fn test_unreadable_file() {
        let dir = tempdir().unwrap();
        let provider = ScriptedProvider::new(vec![]);
        let (mut gw, _) = gateway(&dir, provider, 20);

        let err = gw
            .extract_file(&dir.path().join("missing.png"))
            .await
            .unwrap_err();
        assert!(matches!(err, OcrError::ImageUnreadable { .. }));
    }
}
