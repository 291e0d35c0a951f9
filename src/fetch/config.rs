//! Dashboard fetch configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// How the dashboard is located, waited for and retried.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Total fetch attempts per run for transient failures, the first
    /// included.
    #[serde(default = "default_max_attempts", alias = "max_retries")]
    pub max_attempts: u32,

    /// Delay between attempts in seconds.
    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay_secs: u64,

    /// How long to wait for the dashboard to appear, in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Run Chrome headless (default: true).
    #[serde(default = "default_headless")]
    pub headless: bool,

    /// Chrome executable. Searched for in the usual places when unset.
    #[serde(default)]
    pub chrome_path: Option<PathBuf>,

    #[serde(default)]
    pub selectors: DashboardSelectors,
}

/// CSS selectors and link text describing the dashboard page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardSelectors {
    /// Any of these appearing means the dashboard has loaded.
    #[serde(default = "default_ready")]
    pub ready: Vec<String>,

    /// Present when the planner (list) view is shown.
    #[serde(default = "default_planner_marker")]
    pub planner_marker: String,

    /// Element monitored in planner view.
    #[serde(default = "default_planner_target")]
    pub planner_target: String,

    /// Element monitored otherwise.
    #[serde(default = "default_dashboard_target")]
    pub dashboard_target: String,

    /// Text of the single-sign-on link shown when logged out.
    #[serde(default = "default_login_link_text")]
    pub login_link_text: String,

    #[serde(default = "default_user_input")]
    pub user_input: String,

    #[serde(default = "default_password_input")]
    pub password_input: String,
}

fn default_max_attempts() -> u32 {
    3
}
fn default_retry_delay_secs() -> u64 {
    5
}
fn default_timeout_secs() -> u64 {
    120
}
fn default_headless() -> bool {
    true
}
fn default_ready() -> Vec<String> {
    ["#planner-today-btn", "#dashboard", "#dashboard-planner", ".planner-day"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}
fn default_planner_marker() -> String {
    ".planner-day".to_string()
}
fn default_planner_target() -> String {
    "#dashboard-planner".to_string()
}
fn default_dashboard_target() -> String {
    "#dashboard".to_string()
}
fn default_login_link_text() -> String {
    "keio.jp".to_string()
}
fn default_user_input() -> String {
    "input[type=\"text\"]".to_string()
}
fn default_password_input() -> String {
    "input[type=\"password\"]".to_string()
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            retry_delay_secs: default_retry_delay_secs(),
            timeout_secs: default_timeout_secs(),
            headless: default_headless(),
            chrome_path: None,
            selectors: DashboardSelectors::default(),
        }
    }
}

impl Default for DashboardSelectors {
    fn default() -> Self {
        Self {
            ready: default_ready(),
            planner_marker: default_planner_marker(),
            planner_target: default_planner_target(),
            dashboard_target: default_dashboard_target(),
            login_link_text: default_login_link_text(),
            user_input: default_user_input(),
            password_input: default_password_input(),
        }
    }
}
