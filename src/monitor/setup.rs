//! Wiring production components from settings and credentials.

use std::sync::Arc;

use tracing::{info, warn};

use super::messages;
use super::{Monitor, MonitorError, MonitorOptions};
use crate::clock::Clock;
use crate::config::{ConfigError, Credentials, Settings};
use crate::fetch::DashboardFetcher;
use crate::notify::{
    LinePushClient, MailTransport, NotificationDispatcher, PushTransport, SmtpMailer,
};
use crate::ocr::{GeminiProvider, OcrCache, OcrGateway};
use crate::quota::QuotaLedger;
use crate::storage::{HistoryStore, RunState};

/// Dispatcher over whichever channels have credentials.
pub fn build_dispatcher(
    settings: &Settings,
    credentials: &Credentials,
    quota: QuotaLedger,
) -> NotificationDispatcher {
    let push: Option<Arc<dyn PushTransport>> = match credentials.line() {
        Some((token, user_id)) => match LinePushClient::new(settings.line.clone(), token, user_id) {
            Ok(client) => Some(Arc::new(client)),
            Err(e) => {
                warn!("LINE push disabled: {}", e);
                None
            }
        },
        None => {
            info!("LINE_TOKEN/LINE_USER_ID not set, push disabled");
            None
        }
    };

    let mail: Option<Arc<dyn MailTransport>> = match credentials.smtp() {
        Some((user, password)) => Some(Arc::new(SmtpMailer::new(
            settings.email.clone(),
            user,
            password,
        ))),
        None => {
            info!("SMTP_USER/SMTP_PASS not set, email disabled");
            None
        }
    };

    NotificationDispatcher::new(push, mail, quota)
}

#[cfg(feature = "browser")]
fn build_fetcher(
    settings: &Settings,
    credentials: &Credentials,
) -> Result<Arc<dyn DashboardFetcher>, ConfigError> {
    use crate::fetch::{BrowserDashboardFetcher, BrowserPaths, PortalLogin};

    let login = PortalLogin {
        user: credentials
            .portal_user
            .clone()
            .ok_or(ConfigError::MissingCredential("PORTAL_USER"))?,
        password: credentials
            .portal_password
            .clone()
            .ok_or(ConfigError::MissingCredential("PORTAL_PASS"))?,
    };
    Ok(Arc::new(BrowserDashboardFetcher::new(
        settings.fetch.clone(),
        settings.dashboard_url.clone(),
        login,
        BrowserPaths {
            cookies: settings.cookies_path(),
            screenshot: settings.screenshot_path(),
            debug_dir: settings.log_dir.clone(),
        },
    )))
}

#[cfg(not(feature = "browser"))]
fn build_fetcher(
    _settings: &Settings,
    _credentials: &Credentials,
) -> Result<Arc<dyn DashboardFetcher>, ConfigError> {
    Err(ConfigError::Invalid(
        "browser support not compiled; rebuild with --features browser".into(),
    ))
}

/// Assemble a [`Monitor`] backed by the browser, Gemini, LINE and SMTP.
///
/// Credentials are validated before anything touches the network.
pub fn build_monitor(
    settings: &Settings,
    credentials: &Credentials,
    clock: Arc<dyn Clock>,
) -> Result<Monitor, MonitorError> {
    settings.validate()?;
    credentials.validate()?;

    let quota = QuotaLedger::load(&settings.data_dir, settings.limits, clock.clone());
    let provider = GeminiProvider::new(settings.ocr.clone(), credentials.gemini_api_key.clone())?;
    let ocr = OcrGateway::new(
        Arc::new(provider),
        OcrCache::load(settings.ocr_cache_path()),
        quota.clone(),
        clock.clone(),
        settings.course_list_path(),
    );

    let fetcher = build_fetcher(settings, credentials)?;
    let notifier = build_dispatcher(settings, credentials, quota);
    let history = HistoryStore::load(settings.history_path())?;
    let state = RunState::new(
        settings.fingerprint_path(),
        settings.ocr_text_path(),
        settings.timeout_alert_path(),
    );

    Ok(Monitor::new(
        fetcher,
        ocr,
        notifier,
        history,
        state,
        clock,
        MonitorOptions {
            max_attempts: settings.fetch.max_attempts,
            retry_delay: std::time::Duration::from_secs(settings.fetch.retry_delay_secs),
            timeout_alert_cooldown: settings.timeout_alert_cooldown,
            calendar: settings.calendar.clone(),
            calendar_path: settings.calendar_path(),
        },
    ))
}

/// Email the reason the monitor could not be assembled.
///
/// Returns whether the alert went out.
pub async fn alert_setup_failure(notifier: &NotificationDispatcher, err: &MonitorError) -> bool {
    let detail = match err {
        MonitorError::Config(e) => format!("Failed to load configuration: {}", e),
        other => format!("Failed to start the monitor: {}", other),
    };
    notifier.send_alert(&messages::fatal_alert(&detail)).await
}
