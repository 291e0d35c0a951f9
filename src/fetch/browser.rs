//! Chrome-driven dashboard fetcher (chromiumoxide over CDP).
//!
//! One browser per check: launch, restore session cookies, sign in if the
//! portal asks, wait for the dashboard, hash the monitored element's text,
//! and screenshot the page when the hash moved.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::network::CookieParam;
use chromiumoxide::error::CdpError;
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::{DashboardFetcher, FetchConfig, FetchError};
use crate::fingerprint::{fingerprint, has_changed};
use crate::models::CheckResult;

/// Interval between selector probes while waiting for the dashboard.
const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Upper bound on each login-form wait.
const LOGIN_STEP_TIMEOUT: Duration = Duration::from_secs(30);

/// Extra time for late rendering once the dashboard is up.
const SETTLE_DELAY: Duration = Duration::from_secs(2);

const CHROME_PATHS: &[&str] = &[
    "/usr/bin/google-chrome",
    "/usr/bin/google-chrome-stable",
    "/usr/bin/chromium",
    "/usr/bin/chromium-browser",
    "/snap/bin/chromium",
    "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
    "/Applications/Chromium.app/Contents/MacOS/Chromium",
    "/opt/google/chrome/google-chrome",
];

/// Portal account used when the session has expired.
#[derive(Debug, Clone)]
pub struct PortalLogin {
    pub user: String,
    pub password: String,
}

/// Files the fetcher reads and writes.
#[derive(Debug, Clone)]
pub struct BrowserPaths {
    /// Saved session cookies.
    pub cookies: PathBuf,
    /// Full-page screenshot taken on change.
    pub screenshot: PathBuf,
    /// Directory for the monitored-text dump and timeout HTML dumps.
    pub debug_dir: PathBuf,
}

/// Cookie as persisted between runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredCookie {
    name: String,
    value: String,
    domain: String,
    path: String,
    secure: bool,
    http_only: bool,
}

fn cdp_error(context: &str, e: CdpError) -> FetchError {
    match e {
        CdpError::Timeout => FetchError::Timeout(context.to_string()),
        other => FetchError::NavigationFailure(format!("{}: {}", context, other)),
    }
}

fn find_chrome() -> Option<PathBuf> {
    CHROME_PATHS
        .iter()
        .map(Path::new)
        .find(|p| p.exists())
        .map(Path::to_path_buf)
}

/// Fetches the dashboard with a real Chrome instance.
pub struct BrowserDashboardFetcher {
    config: FetchConfig,
    url: String,
    login: PortalLogin,
    paths: BrowserPaths,
}

impl BrowserDashboardFetcher {
    pub fn new(config: FetchConfig, url: String, login: PortalLogin, paths: BrowserPaths) -> Self {
        Self {
            config,
            url,
            login,
            paths,
        }
    }

    async fn launch(&self) -> Result<(Browser, tokio::task::JoinHandle<()>), FetchError> {
        info!("Launching browser (headless={})", self.config.headless);

        let mut builder = BrowserConfig::builder();
        if let Some(path) = self.config.chrome_path.clone().or_else(find_chrome) {
            debug!("Using Chrome at {}", path.display());
            builder = builder.chrome_executable(path);
        }
        if !self.config.headless {
            builder = builder.with_head();
        }
        let browser_config = builder
            .arg("--disable-dev-shm-usage")
            .arg("--no-first-run")
            .arg("--no-default-browser-check")
            .arg("--no-sandbox")
            .arg("--disable-gpu")
            .window_size(1280, 1600)
            .build()
            .map_err(|e| FetchError::Unknown(format!("Failed to build browser config: {}", e)))?;

        let (browser, mut handler) = Browser::launch(browser_config)
            .await
            .map_err(|e| FetchError::Unknown(format!("Failed to launch browser: {}", e)))?;

        let handle = tokio::spawn(async move {
            while let Some(h) = handler.next().await {
                if h.is_err() {
                    break;
                }
            }
        });

        Ok((browser, handle))
    }

    async fn restore_cookies(&self, page: &Page) {
        let content = match tokio::fs::read_to_string(&self.paths.cookies).await {
            Ok(c) => c,
            Err(_) => return,
        };
        let cookies: Vec<StoredCookie> = match serde_json::from_str(&content) {
            Ok(c) => c,
            Err(e) => {
                warn!("Ignoring unreadable cookie file: {}", e);
                return;
            }
        };

        let params: Vec<CookieParam> = cookies
            .iter()
            .filter(|c| !c.name.is_empty() && !c.domain.is_empty())
            .filter_map(|c| {
                CookieParam::builder()
                    .name(c.name.clone())
                    .value(c.value.clone())
                    .domain(c.domain.clone())
                    .path(c.path.clone())
                    .secure(c.secure)
                    .http_only(c.http_only)
                    .build()
                    .map_err(|e| warn!("Failed to build cookie {}: {}", c.name, e))
                    .ok()
            })
            .collect();

        debug!("Restoring {} cookies", params.len());
        if let Err(e) = page.set_cookies(params).await {
            warn!("Failed to restore cookies: {}", e);
        }
    }

    async fn save_cookies(&self, page: &Page) {
        let cookies = match page.get_cookies().await {
            Ok(c) => c,
            Err(e) => {
                warn!("Failed to read browser cookies: {}", e);
                return;
            }
        };
        let stored: Vec<StoredCookie> = cookies
            .into_iter()
            .map(|c| StoredCookie {
                name: c.name,
                value: c.value,
                domain: c.domain,
                path: c.path,
                secure: c.secure,
                http_only: c.http_only,
            })
            .collect();

        match crate::storage::write_json(&self.paths.cookies, &stored) {
            Ok(()) => info!("Saved {} cookies", stored.len()),
            Err(e) => warn!("Failed to save cookies: {}", e),
        }
    }

    /// Poll until `selector` matches or `timeout` passes.
    async fn wait_for(&self, page: &Page, selector: &str, timeout: Duration) -> Result<(), FetchError> {
        let poll = async {
            loop {
                if page.find_element(selector).await.is_ok() {
                    return;
                }
                tokio::time::sleep(POLL_INTERVAL).await;
            }
        };
        tokio::time::timeout(timeout, poll)
            .await
            .map_err(|_| FetchError::Timeout(format!("waiting for {}", selector)))
    }

    /// Sign in through the SSO link if the portal shows one.
    async fn login_if_needed(&self, page: &Page) -> Result<(), FetchError> {
        let selectors = &self.config.selectors;
        let links = page.find_elements("a").await.unwrap_or_default();

        let mut sso_link = None;
        for link in links {
            if let Ok(Some(text)) = link.inner_text().await {
                if text.contains(&selectors.login_link_text) {
                    sso_link = Some(link);
                    break;
                }
            }
        }
        let Some(link) = sso_link else {
            debug!("No login link, assuming an active session");
            return Ok(());
        };

        info!("Session expired, signing in");
        link.click()
            .await
            .map_err(|e| cdp_error("clicking login link", e))?;

        self.wait_for(page, &selectors.user_input, LOGIN_STEP_TIMEOUT).await?;
        let user = page
            .find_element(selectors.user_input.as_str())
            .await
            .map_err(|e| cdp_error("user field", e))?;
        user.click()
            .await
            .map_err(|e| cdp_error("user field", e))?
            .type_str(&self.login.user)
            .await
            .map_err(|e| cdp_error("user field", e))?
            .press_key("Enter")
            .await
            .map_err(|e| cdp_error("user field", e))?;

        self.wait_for(page, &selectors.password_input, LOGIN_STEP_TIMEOUT).await?;
        let password = page
            .find_element(selectors.password_input.as_str())
            .await
            .map_err(|e| cdp_error("password field", e))?;
        password
            .click()
            .await
            .map_err(|e| cdp_error("password field", e))?
            .type_str(&self.login.password)
            .await
            .map_err(|e| cdp_error("password field", e))?
            .press_key("Enter")
            .await
            .map_err(|e| cdp_error("password field", e))?;

        page.wait_for_navigation()
            .await
            .map_err(|e| cdp_error("post-login navigation", e))?;
        self.save_cookies(page).await;
        Ok(())
    }

    /// Wait for any dashboard selector to appear.
    async fn wait_for_dashboard(&self, page: &Page) -> Result<(), FetchError> {
        let ready = &self.config.selectors.ready;
        let poll = async {
            loop {
                for selector in ready {
                    if page.find_element(selector.as_str()).await.is_ok() {
                        return selector.clone();
                    }
                }
                tokio::time::sleep(POLL_INTERVAL).await;
            }
        };

        match tokio::time::timeout(Duration::from_secs(self.config.timeout_secs), poll).await {
            Ok(selector) => {
                info!("Dashboard ready ({})", selector);
                Ok(())
            }
            Err(_) => {
                let url = page.url().await.ok().flatten().unwrap_or_default();
                warn!("Dashboard did not appear; current URL: {}", url);
                self.dump_page(page).await;
                Err(FetchError::Timeout(format!(
                    "dashboard not reached within {}s",
                    self.config.timeout_secs
                )))
            }
        }
    }

    async fn dump_page(&self, page: &Page) {
        let Ok(html) = page.content().await else {
            return;
        };
        let path = self.paths.debug_dir.join(format!(
            "timeout-debug-{}.html",
            chrono::Utc::now().timestamp()
        ));
        match crate::storage::write_text(&path, &html) {
            Ok(()) => info!("Saved page HTML to {}", path.display()),
            Err(e) => debug!("Could not save page HTML: {}", e),
        }
    }

    /// Text of the monitored element.
    async fn monitored_text(&self, page: &Page) -> Result<String, FetchError> {
        let selectors = &self.config.selectors;
        let target = if page
            .find_element(selectors.planner_marker.as_str())
            .await
            .is_ok()
        {
            &selectors.planner_target
        } else {
            &selectors.dashboard_target
        };
        info!("Monitoring {}", target);

        let element = page
            .find_element(target.as_str())
            .await
            .map_err(|_| FetchError::SelectorNotFound(target.clone()))?;
        let text = element
            .inner_text()
            .await
            .map_err(|e| FetchError::Unknown(format!("reading {}: {}", target, e)))?
            .unwrap_or_default();

        let dump = self.paths.debug_dir.join("debug_last_text.txt");
        if let Err(e) = crate::storage::write_text(&dump, &text) {
            debug!("Could not write text dump: {}", e);
        }
        Ok(text)
    }

    async fn check_page(&self, page: &Page, previous: &str) -> Result<CheckResult, FetchError> {
        self.restore_cookies(page).await;

        info!("Opening {}", self.url);
        page.goto(self.url.as_str())
            .await
            .map_err(|e| cdp_error("opening dashboard", e))?;

        self.login_if_needed(page).await?;
        self.wait_for_dashboard(page).await?;
        tokio::time::sleep(SETTLE_DELAY).await;

        let text = self.monitored_text(page).await?;
        let hash = fingerprint(&text);
        info!("Fingerprint {}", &hash[..10]);

        if !has_changed(&hash, previous) {
            info!("Dashboard unchanged");
            return Ok(CheckResult::unchanged(hash));
        }

        info!("Dashboard changed, taking screenshot");
        if let Some(dir) = self.paths.screenshot.parent() {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| FetchError::Unknown(format!("creating {}: {}", dir.display(), e)))?;
        }
        page.save_screenshot(
            ScreenshotParams::builder().full_page(true).build(),
            &self.paths.screenshot,
        )
        .await
        .map_err(|e| FetchError::Unknown(format!("screenshot failed: {}", e)))?;

        Ok(CheckResult::changed(hash, self.paths.screenshot.clone()))
    }
}

#[async_trait]
impl DashboardFetcher for BrowserDashboardFetcher {
    async fn check(&self, previous_fingerprint: &str) -> Result<CheckResult, FetchError> {
        let (mut browser, handle) = self.launch().await?;

        let result = match browser.new_page("about:blank").await {
            Ok(page) => {
                let result = self.check_page(&page, previous_fingerprint).await;
                let _ = page.close().await;
                result
            }
            Err(e) => Err(FetchError::Unknown(format!("Failed to open page: {}", e))),
        };

        if let Err(e) = browser.close().await {
            debug!("Browser close: {}", e);
        }
        let _ = browser.wait().await;
        handle.abort();

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_maps_to_transient() {
        assert!(cdp_error("x", CdpError::Timeout).is_transient());
        assert!(!cdp_error("x", CdpError::NotFound).is_transient());
    }

    #[test]
    fn test_stored_cookie_shape() {
        let cookie: StoredCookie = serde_json::from_str(
            r#"{"name": "sid", "value": "abc", "domain": ".example.jp", "path": "/",
                "secure": true, "http_only": true}"#,
        )
        .unwrap();
        assert_eq!(cookie.name, "sid");
        assert!(cookie.http_only);
    }
}
