use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use super::messages::{self, TIME_FORMAT};
use super::MonitorError;
use crate::calendar::{self, CalendarOptions};
use crate::clock::Clock;
use crate::fetch::{DashboardFetcher, FetchError};
use crate::fingerprint::same_normalized;
use crate::models::{Assignment, CheckResult};
use crate::notify::{DispatchReport, NotificationDispatcher};
use crate::ocr::{OcrGateway, OcrOutcome, OcrSource};
use crate::storage::{HistoryStore, RunState};

/// Knobs for one monitoring cycle.
#[derive(Debug, Clone)]
pub struct MonitorOptions {
    /// Total fetch attempts within one run, the first included.
    pub max_attempts: u32,
    pub retry_delay: Duration,
    /// Minimum spacing between timeout alerts.
    pub timeout_alert_cooldown: Duration,
    pub calendar: CalendarOptions,
    /// Where the calendar attachment is written.
    pub calendar_path: PathBuf,
}

/// Terminal state of a cycle.
#[derive(Debug)]
pub enum RunOutcome {
    /// Fingerprint matched the baseline; nothing persisted.
    Unchanged,
    /// The page changed but the extracted text did not; fingerprint persisted.
    NoTextChange,
    /// Notifications were attempted and baselines persisted.
    Notified {
        assignments: Vec<Assignment>,
        new_assignments: Vec<Assignment>,
        calendar: Option<PathBuf>,
        source: OcrSource,
        report: DispatchReport,
    },
    /// Transient fetch failures exhausted the retries; baseline untouched.
    FetchDeferred,
}

/// The orchestrator.
pub struct Monitor {
    fetcher: Arc<dyn DashboardFetcher>,
    ocr: OcrGateway,
    notifier: NotificationDispatcher,
    history: HistoryStore,
    state: RunState,
    clock: Arc<dyn Clock>,
    options: MonitorOptions,
}

impl Monitor {
    pub fn new(
        fetcher: Arc<dyn DashboardFetcher>,
        ocr: OcrGateway,
        notifier: NotificationDispatcher,
        history: HistoryStore,
        state: RunState,
        clock: Arc<dyn Clock>,
        options: MonitorOptions,
    ) -> Self {
        Self {
            fetcher,
            ocr,
            notifier,
            history,
            state,
            clock,
            options,
        }
    }

    pub fn history(&self) -> &HistoryStore {
        &self.history
    }

    /// Run one cycle to a terminal state.
    ///
    /// Fatal conditions are reported by email before the error is returned.
    pub async fn run_once(&mut self) -> Result<RunOutcome, MonitorError> {
        let result = self.cycle().await;
        if let Err(MonitorError::Store(e)) = &result {
            error!("State storage failed: {}", e);
            self.notifier
                .send_alert(&messages::fatal_alert(&format!(
                    "Monitor state could not be read or saved: {}",
                    e
                )))
                .await;
        }
        result
    }

    async fn cycle(&mut self) -> Result<RunOutcome, MonitorError> {
        let previous = self.state.fingerprint()?;

        let check = match self.fetch_with_retry(&previous).await {
            Ok(check) => check,
            Err(e) if e.is_transient() => {
                warn!("Dashboard unreachable: {}; next run will retry", e);
                self.alert_timeout(&e).await?;
                return Ok(RunOutcome::FetchDeferred);
            }
            Err(e) => {
                error!("Fatal fetch error: {}", e);
                self.notifier
                    .send_alert(&messages::fatal_alert(&format!("Dashboard fetch failed: {}", e)))
                    .await;
                return Err(e.into());
            }
        };

        if !check.changed {
            info!("No change on the dashboard");
            return Ok(RunOutcome::Unchanged);
        }

        let Some(screenshot) = check.screenshot_path.clone() else {
            let e = FetchError::Unknown("changed dashboard reported without a screenshot".into());
            self.notifier
                .send_alert(&messages::fatal_alert(&e.to_string()))
                .await;
            return Err(e.into());
        };

        info!("Dashboard changed, running OCR");
        let extraction = match self.ocr.extract_file(&screenshot).await {
            Ok(o) => o,
            Err(e) => {
                error!("OCR failed: {}", e);
                self.notifier
                    .send_alert(&messages::ocr_failure_alert(&e.to_string(), screenshot))
                    .await;
                return Err(e.into());
            }
        };

        // Placeholder texts say nothing about the page, so they are never
        // compared against nor stored as the text baseline.
        let degraded = matches!(extraction.source, OcrSource::QuotaSkipped | OcrSource::Empty);
        if !degraded && same_normalized(&extraction.text, &self.state.ocr_text()?) {
            info!("Extracted text unchanged, updating fingerprint only");
            self.state.save_fingerprint(&check.fingerprint)?;
            return Ok(RunOutcome::NoTextChange);
        }

        self.notify_and_persist(check, screenshot, extraction, degraded)
            .await
    }

    async fn fetch_with_retry(&self, previous: &str) -> Result<CheckResult, FetchError> {
        let attempts = self.options.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.fetcher.check(previous).await {
                Ok(check) => return Ok(check),
                Err(e) if e.is_transient() && attempt < attempts => {
                    warn!(
                        "Fetch attempt {}/{} failed: {}; retrying in {:?}",
                        attempt, attempts, e, self.options.retry_delay
                    );
                    tokio::time::sleep(self.options.retry_delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Email a timeout warning unless one went out within the cooldown.
    async fn alert_timeout(&self, err: &FetchError) -> Result<(), MonitorError> {
        let now = self.clock.now();
        if let Some(last) = self.state.last_timeout_alert()? {
            // A timestamp in the future also counts as recent.
            let recent = now
                .signed_duration_since(last)
                .to_std()
                .map(|elapsed| elapsed < self.options.timeout_alert_cooldown)
                .unwrap_or(true);
            if recent {
                debug!("Timeout alert suppressed (last sent {})", last);
                return Ok(());
            }
        }

        if self
            .notifier
            .send_alert(&messages::timeout_alert(&err.to_string()))
            .await
        {
            self.state.record_timeout_alert(now)?;
        }
        Ok(())
    }

    async fn notify_and_persist(
        &mut self,
        check: CheckResult,
        screenshot: PathBuf,
        extraction: OcrOutcome,
        degraded: bool,
    ) -> Result<RunOutcome, MonitorError> {
        let now = self.clock.now();
        let detected_at = now.format(TIME_FORMAT).to_string();
        info!("New content detected ({} assignments)", extraction.assignments.len());

        let mut new_assignments = Vec::new();
        for a in &extraction.assignments {
            if self.history.is_new(&a.course, &a.title, &a.deadline) {
                new_assignments.push(a.clone());
            }
            self.history.add(&a.course, &a.title, &a.deadline);
        }
        // Recorded before sending: a failed save must not lead to a repeat.
        if self.history.is_dirty() {
            self.history.save()?;
        }

        let mut attachments = vec![screenshot];
        let mut calendar_file = None;
        if new_assignments.is_empty() {
            info!("No new assignments, skipping calendar export");
        } else {
            info!(
                "{} new assignments, exporting calendar",
                new_assignments.len()
            );
            match calendar::export(
                &self.options.calendar_path,
                &new_assignments,
                &self.options.calendar,
                now,
            ) {
                Ok(()) => {
                    attachments.push(self.options.calendar_path.clone());
                    calendar_file = Some(self.options.calendar_path.clone());
                }
                Err(e) => warn!("Calendar export failed: {}", e),
            }
        }

        let push = messages::push_text(&extraction.text, &detected_at);
        let mail = messages::update_mail(
            &extraction.text,
            &detected_at,
            calendar_file.is_some(),
            attachments,
        );
        let report = self.notifier.dispatch(&push, &mail).await;
        if report.all_sent() {
            info!("Notifications sent");
        }

        self.state.save_fingerprint(&check.fingerprint)?;
        if !degraded {
            self.state.save_ocr_text(&extraction.text)?;
        }
        info!("Cycle complete ({} new)", new_assignments.len());

        Ok(RunOutcome::Notified {
            assignments: extraction.assignments,
            new_assignments,
            calendar: calendar_file,
            source: extraction.source,
            report,
        })
    }
}
