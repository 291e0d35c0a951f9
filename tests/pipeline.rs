//! End-to-end monitoring cycles against fake collaborators.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use lmswatch::calendar::CalendarOptions;
use lmswatch::clock::{Clock, FixedClock};
use lmswatch::config::{ConfigError, Credentials, Settings};
use lmswatch::fetch::{DashboardFetcher, FetchError};
use lmswatch::models::{AssignmentId, CheckResult};
use lmswatch::monitor::{
    alert_setup_failure, build_monitor, Monitor, MonitorError, MonitorOptions, RunOutcome,
};
use lmswatch::notify::{
    MailTransport, NotificationDispatcher, NotifyError, OutgoingMail, PushTransport,
};
use lmswatch::ocr::{OcrCache, OcrError, OcrGateway, OcrSource, VisionProvider};
use lmswatch::quota::{QuotaLedger, QuotaLimits};
use lmswatch::storage::{HistoryStore, RunState};
use tempfile::TempDir;

const HW1: &str = r#"{"course": "CS101", "title": "HW1", "deadline": "2025-12-01 23:59"}"#;
const HW2: &str = r#"{"course": "CS101", "title": "HW2", "deadline": "2025-12-08 23:59"}"#;

#[derive(Default)]
struct ScriptedFetcher {
    replies: Mutex<Vec<Result<CheckResult, FetchError>>>,
    seen_previous: Mutex<Vec<String>>,
}

impl ScriptedFetcher {
    fn push(&self, reply: Result<CheckResult, FetchError>) {
        self.replies.lock().unwrap().push(reply);
    }

    fn calls(&self) -> usize {
        self.seen_previous.lock().unwrap().len()
    }
}

#[async_trait]
impl DashboardFetcher for ScriptedFetcher {
    async fn check(&self, previous: &str) -> Result<CheckResult, FetchError> {
        self.seen_previous.lock().unwrap().push(previous.to_string());
        self.replies.lock().unwrap().remove(0)
    }
}

#[derive(Default)]
struct ScriptedProvider {
    replies: Mutex<Vec<Result<Option<String>, OcrError>>>,
    calls: Mutex<usize>,
}

impl ScriptedProvider {
    fn push(&self, reply: Result<Option<String>, OcrError>) {
        self.replies.lock().unwrap().push(reply);
    }

    fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
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
        _prompt: &str,
    ) -> Result<Option<String>, OcrError> {
        *self.calls.lock().unwrap() += 1;
        self.replies.lock().unwrap().remove(0)
    }
}

#[derive(Default)]
struct Outbox {
    pushes: Mutex<Vec<String>>,
    mails: Mutex<Vec<OutgoingMail>>,
}

#[async_trait]
impl PushTransport for Outbox {
    async fn push(&self, text: &str) -> Result<(), NotifyError> {
        self.pushes.lock().unwrap().push(text.to_string());
        Ok(())
    }
}

#[async_trait]
impl MailTransport for Outbox {
    async fn send(&self, mail: &OutgoingMail) -> Result<(), NotifyError> {
        self.mails.lock().unwrap().push(mail.clone());
        Ok(())
    }
}

impl Outbox {
    fn push_count(&self) -> usize {
        self.pushes.lock().unwrap().len()
    }

    fn mails(&self) -> Vec<OutgoingMail> {
        self.mails.lock().unwrap().clone()
    }
}

struct Harness {
    dir: TempDir,
    clock: Arc<FixedClock>,
    fetcher: Arc<ScriptedFetcher>,
    provider: Arc<ScriptedProvider>,
    outbox: Arc<Outbox>,
    limits: QuotaLimits,
}

impl Harness {
    fn new() -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
            clock: Arc::new(FixedClock::at("2025-11-20T10:00:00+09:00").unwrap()),
            fetcher: Arc::new(ScriptedFetcher::default()),
            provider: Arc::new(ScriptedProvider::default()),
            outbox: Arc::new(Outbox::default()),
            limits: QuotaLimits::default(),
        }
    }

    fn data(&self) -> &Path {
        self.dir.path()
    }

    fn state(&self) -> RunState {
        RunState::new(
            self.data().join("last-run.txt"),
            self.data().join("last-ocr.txt"),
            self.data().join("last-timeout-notify.txt"),
        )
    }

    fn calendar_path(&self) -> PathBuf {
        self.data().join("schedule.ics")
    }

    /// Script a changed dashboard whose screenshot has the given bytes.
    fn changed(&self, fingerprint: &str, screenshot: &[u8]) {
        let path = self.data().join(format!("screenshot-{}.png", fingerprint));
        std::fs::write(&path, screenshot).unwrap();
        self.fetcher
            .push(Ok(CheckResult::changed(fingerprint, path)));
    }

    fn dispatcher(&self, quota: QuotaLedger) -> NotificationDispatcher {
        let push: Arc<dyn PushTransport> = self.outbox.clone();
        let mail: Arc<dyn MailTransport> = self.outbox.clone();
        NotificationDispatcher::new(Some(push), Some(mail), quota)
    }

    /// A fresh monitor over the on-disk state, as a new process would build.
    fn monitor(&self) -> Monitor {
        let clock: Arc<dyn Clock> = self.clock.clone();
        let quota = QuotaLedger::load(self.data(), self.limits, clock.clone());
        let ocr = OcrGateway::new(
            self.provider.clone(),
            OcrCache::load(self.data().join("ocr-cache.json")),
            quota.clone(),
            clock.clone(),
            self.data().join("courses.json"),
        );
        let notifier = self.dispatcher(quota);
        Monitor::new(
            self.fetcher.clone(),
            ocr,
            notifier,
            HistoryStore::load(self.data().join("sent_history.json")).unwrap(),
            self.state(),
            clock,
            MonitorOptions {
                max_attempts: 3,
                retry_delay: Duration::ZERO,
                timeout_alert_cooldown: Duration::from_secs(3600),
                calendar: CalendarOptions::default(),
                calendar_path: self.calendar_path(),
            },
        )
    }
}

#[tokio::test]
async fn test_first_change_notifies_with_calendar() {
    let h = Harness::new();
    h.changed("fp1", b"shot-1");
    h.provider.push(Ok(Some(format!("[{}]", HW1))));

    let outcome = h.monitor().run_once().await.unwrap();

    let RunOutcome::Notified {
        new_assignments,
        calendar,
        source,
        report,
        ..
    } = outcome
    else {
        panic!("expected notification, got {:?}", outcome);
    };
    assert_eq!(new_assignments.len(), 1);
    assert_eq!(source, OcrSource::Provider);
    assert!(report.all_sent());
    assert_eq!(calendar.as_deref(), Some(h.calendar_path().as_path()));

    let ics = std::fs::read_to_string(h.calendar_path()).unwrap();
    let id = AssignmentId::derive("CS101", "HW1", "2025-12-01 23:59");
    assert!(ics.contains(&format!("UID:{}", id)));
    assert!(ics.contains("DTEND;TZID=Asia/Tokyo:20251201T235900"));

    let mails = h.outbox.mails();
    assert_eq!(mails.len(), 1);
    assert_eq!(mails[0].attachments.len(), 2);
    assert!(mails[0].body.contains("[Task] HW1"));
    assert_eq!(h.outbox.push_count(), 1);

    let state = h.state();
    assert_eq!(state.fingerprint().unwrap(), "fp1");
    assert!(state.ocr_text().unwrap().contains("HW1"));

    let history = HistoryStore::load(h.data().join("sent_history.json")).unwrap();
    assert!(!history.is_new("CS101", "HW1", "2025-12-01 23:59"));
}

#[tokio::test]
async fn test_seen_assignment_is_not_exported_again() {
    let h = Harness::new();
    h.changed("fp1", b"shot-1");
    h.provider.push(Ok(Some(format!("[{}, {}]", HW1, HW2))));
    h.monitor().run_once().await.unwrap();
    std::fs::remove_file(h.calendar_path()).unwrap();

    // HW2 disappears from the page: the text changes, nothing is new.
    h.changed("fp2", b"shot-2");
    h.provider.push(Ok(Some(format!("[{}]", HW1))));
    let outcome = h.monitor().run_once().await.unwrap();

    let RunOutcome::Notified {
        new_assignments,
        calendar,
        ..
    } = outcome
    else {
        panic!("expected notification, got {:?}", outcome);
    };
    assert!(new_assignments.is_empty());
    assert!(calendar.is_none());
    assert!(!h.calendar_path().exists());

    let mails = h.outbox.mails();
    assert_eq!(mails.len(), 2);
    assert_eq!(mails[1].attachments.len(), 1);
    assert!(mails[1].body.contains("no calendar file"));
    assert_eq!(h.outbox.push_count(), 2);
    assert_eq!(h.state().fingerprint().unwrap(), "fp2");
    assert_eq!(h.fetcher.seen_previous.lock().unwrap()[1], "fp1");
}

#[tokio::test]
async fn test_unchanged_fingerprint_does_nothing() {
    let h = Harness::new();
    h.state().save_fingerprint("fp1").unwrap();
    h.fetcher.push(Ok(CheckResult::unchanged("fp1")));

    let outcome = h.monitor().run_once().await.unwrap();

    assert!(matches!(outcome, RunOutcome::Unchanged));
    assert_eq!(h.provider.calls(), 0);
    assert_eq!(h.outbox.push_count(), 0);
    assert!(h.outbox.mails().is_empty());
    assert_eq!(h.fetcher.seen_previous.lock().unwrap()[0], "fp1");
}

#[tokio::test]
async fn test_same_text_updates_fingerprint_only() {
    let h = Harness::new();
    h.changed("fp1", b"shot-1");
    h.provider.push(Ok(Some(format!("[{}]", HW1))));
    h.monitor().run_once().await.unwrap();

    h.changed("fp2", b"shot-2");
    h.provider.push(Ok(Some(format!("```json\n[{}]\n```", HW1))));
    let outcome = h.monitor().run_once().await.unwrap();

    assert!(matches!(outcome, RunOutcome::NoTextChange));
    assert_eq!(h.state().fingerprint().unwrap(), "fp2");
    assert_eq!(h.outbox.mails().len(), 1);
    assert_eq!(h.outbox.push_count(), 1);
}

#[tokio::test]
async fn test_timeouts_defer_and_alert_once_per_cooldown() {
    let h = Harness::new();
    h.state().save_fingerprint("fp0").unwrap();
    for _ in 0..3 {
        h.fetcher
            .push(Err(FetchError::Timeout("dashboard".into())));
    }

    let outcome = h.monitor().run_once().await.unwrap();
    assert!(matches!(outcome, RunOutcome::FetchDeferred));
    assert_eq!(h.fetcher.calls(), 3);
    assert_eq!(h.state().fingerprint().unwrap(), "fp0");
    assert_eq!(h.outbox.mails().len(), 1);
    assert!(h.outbox.mails()[0].subject.contains("timeout"));

    h.clock.advance(chrono::Duration::minutes(30));
    for _ in 0..3 {
        h.fetcher
            .push(Err(FetchError::Timeout("dashboard".into())));
    }
    h.monitor().run_once().await.unwrap();
    assert_eq!(h.outbox.mails().len(), 1);

    h.clock.advance(chrono::Duration::minutes(31));
    for _ in 0..3 {
        h.fetcher
            .push(Err(FetchError::Timeout("dashboard".into())));
    }
    h.monitor().run_once().await.unwrap();
    assert_eq!(h.outbox.mails().len(), 2);
}

#[tokio::test]
async fn test_timeout_then_success_within_run() {
    let h = Harness::new();
    h.fetcher
        .push(Err(FetchError::Timeout("dashboard".into())));
    h.changed("fp1", b"shot-1");
    h.provider.push(Ok(Some("[]".to_string())));

    let outcome = h.monitor().run_once().await.unwrap();
    assert!(matches!(outcome, RunOutcome::Notified { .. }));
    assert_eq!(h.fetcher.calls(), 2);
}

#[tokio::test]
async fn test_structural_failure_is_fatal() {
    let h = Harness::new();
    h.fetcher
        .push(Err(FetchError::SelectorNotFound("#dashboard".into())));

    let err = h.monitor().run_once().await.unwrap_err();

    assert!(matches!(
        err,
        MonitorError::Fetch(FetchError::SelectorNotFound(_))
    ));
    assert_eq!(h.fetcher.calls(), 1);
    let mails = h.outbox.mails();
    assert_eq!(mails.len(), 1);
    assert!(mails[0].body.contains("#dashboard"));
}

#[tokio::test]
async fn test_ocr_failure_alerts_with_screenshot() {
    let h = Harness::new();
    h.changed("fp1", b"shot-1");
    h.provider
        .push(Err(OcrError::Api("HTTP 500".to_string())));

    let err = h.monitor().run_once().await.unwrap_err();

    assert!(matches!(err, MonitorError::Ocr(_)));
    let mails = h.outbox.mails();
    assert_eq!(mails.len(), 1);
    assert_eq!(
        mails[0].attachments,
        vec![h.data().join("screenshot-fp1.png")]
    );
    assert_eq!(h.state().fingerprint().unwrap(), "");
    assert_eq!(h.outbox.push_count(), 0);
}

#[tokio::test]
async fn test_ocr_quota_exhausted_still_notifies() {
    let mut h = Harness::new();
    h.limits.ocr = 0;
    h.state().save_ocr_text("previous text").unwrap();
    h.changed("fp1", b"shot-1");

    let outcome = h.monitor().run_once().await.unwrap();

    let RunOutcome::Notified {
        source,
        new_assignments,
        ..
    } = outcome
    else {
        panic!("expected notification, got {:?}", outcome);
    };
    assert_eq!(source, OcrSource::QuotaSkipped);
    assert!(new_assignments.is_empty());
    assert_eq!(h.provider.calls(), 0);
    assert_eq!(h.outbox.push_count(), 1);
    assert_eq!(h.state().fingerprint().unwrap(), "fp1");
    assert_eq!(h.state().ocr_text().unwrap(), "previous text");
}

#[tokio::test]
async fn test_push_quota_exhausted_does_not_block_email() {
    let mut h = Harness::new();
    h.limits.push = 0;
    h.changed("fp1", b"shot-1");
    h.provider.push(Ok(Some(format!("[{}]", HW1))));

    let outcome = h.monitor().run_once().await.unwrap();

    let RunOutcome::Notified { report, .. } = outcome else {
        panic!("expected notification, got {:?}", outcome);
    };
    assert!(matches!(report.push, Err(NotifyError::QuotaExhausted { .. })));
    assert!(report.email.is_ok());
    assert_eq!(h.outbox.push_count(), 0);
    assert_eq!(h.outbox.mails().len(), 1);
    assert_eq!(h.state().fingerprint().unwrap(), "fp1");
}

#[tokio::test]
async fn test_unreadable_state_is_reported() {
    let h = Harness::new();
    std::fs::create_dir(h.data().join("last-run.txt")).unwrap();

    let err = h.monitor().run_once().await.unwrap_err();

    assert!(matches!(err, MonitorError::Store(_)));
    assert_eq!(h.fetcher.calls(), 0);
    let mails = h.outbox.mails();
    assert_eq!(mails.len(), 1);
    assert!(mails[0].subject.contains("Monitor stopped"));
    assert!(mails[0].body.contains("last-run.txt"));
}

#[tokio::test]
async fn test_history_failure_sends_nothing_and_retries_next_run() {
    let h = Harness::new();
    h.changed("fp1", b"shot-1");
    h.provider.push(Ok(Some(format!("[{}]", HW1))));
    let mut monitor = h.monitor();
    let history = h.data().join("sent_history.json");
    std::fs::create_dir(&history).unwrap();

    let err = monitor.run_once().await.unwrap_err();

    assert!(matches!(err, MonitorError::Store(_)));
    assert_eq!(h.outbox.push_count(), 0);
    let mails = h.outbox.mails();
    assert_eq!(mails.len(), 1);
    assert!(mails[0].subject.contains("Monitor stopped"));
    assert_eq!(h.state().fingerprint().unwrap(), "");

    // Once storage recovers, the assignment is announced exactly once.
    std::fs::remove_dir(&history).unwrap();
    h.changed("fp1", b"shot-1");
    let outcome = h.monitor().run_once().await.unwrap();
    let RunOutcome::Notified {
        new_assignments, ..
    } = outcome
    else {
        panic!("expected notification, got {:?}", outcome);
    };
    assert_eq!(new_assignments.len(), 1);
    assert_eq!(h.outbox.push_count(), 1);
    assert_eq!(h.provider.calls(), 1);

    h.changed("fp2", b"shot-2");
    h.provider.push(Ok(Some(format!("[{}, {}]", HW1, HW2))));
    let RunOutcome::Notified {
        new_assignments, ..
    } = h.monitor().run_once().await.unwrap()
    else {
        panic!("expected notification");
    };
    assert_eq!(new_assignments.len(), 1);
    assert_eq!(new_assignments[0].title, "HW2");
}

#[tokio::test]
async fn test_missing_credentials_alert_before_any_fetch() {
    let h = Harness::new();
    let settings = Settings {
        data_dir: h.data().to_path_buf(),
        ..Settings::default()
    };
    let clock: Arc<dyn Clock> = h.clock.clone();

    let err = build_monitor(&settings, &Credentials::default(), clock.clone())
        .err()
        .unwrap();
    assert!(matches!(
        err,
        MonitorError::Config(ConfigError::MissingCredential("PORTAL_USER"))
    ));

    let quota = QuotaLedger::load(h.data(), h.limits, clock);
    assert!(alert_setup_failure(&h.dispatcher(quota), &err).await);

    let mails = h.outbox.mails();
    assert_eq!(mails.len(), 1);
    assert!(mails[0].subject.contains("Monitor stopped"));
    assert!(mails[0].body.contains("PORTAL_USER is not set"));
    assert_eq!(h.fetcher.calls(), 0);
    assert_eq!(h.provider.calls(), 0);
}
