//! Configuration management using the prefer crate.
//!
//! Three layers feed a run: an optional config file (discovered by prefer or
//! given with `--config`), environment overrides, and credentials, which are
//! only ever read from the environment.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::calendar::CalendarOptions;
use crate::fetch::FetchConfig;
use crate::notify::{LineConfig, SmtpConfig};
use crate::ocr::GeminiConfig;
use crate::quota::QuotaLimits;

/// Default dashboard location.
pub const DEFAULT_DASHBOARD_URL: &str = "https://lms.keio.jp";

/// Default timeout-alert cooldown: one alert per hour.
pub const DEFAULT_TIMEOUT_ALERT_COOLDOWN_SECS: u64 = 3600;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} is not set")]
    MissingCredential(&'static str),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    Parse { path: String, message: String },
}

/// Config file contents. Every key is optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Directory for persisted state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<String>,
    /// Directory for the run log and debug dumps.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_dir: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dashboard_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_alert_cooldown_secs: Option<u64>,
    #[serde(default)]
    pub limits: QuotaLimits,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub ocr: GeminiConfig,
    #[serde(default)]
    pub calendar: CalendarOptions,
    #[serde(default)]
    pub email: SmtpConfig,
    #[serde(default)]
    pub line: LineConfig,
    /// Path to the config file this was loaded from (not serialized).
    #[serde(skip)]
    pub source_path: Option<PathBuf>,
}

impl Config {
    /// Load configuration using prefer for discovery.
    ///
    /// Falls back to defaults when no `lmswatch` config file is found.
    pub async fn load() -> Result<Self, ConfigError> {
        match prefer::load("lmswatch").await {
            Ok(found) => match found.source_path() {
                Some(path) => Self::load_from_path(path).await,
                None => Ok(Self::default()),
            },
            Err(e) => {
                debug!("No config file discovered: {}", e);
                Ok(Self::default())
            }
        }
    }

    /// Load configuration from a specific file.
    /// The format follows the extension: TOML, YAML, otherwise JSON.
    pub async fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| ConfigError::Io {
                path: path.display().to_string(),
                source: e,
            })?;
        let mut config = Self::parse(&contents, path)?;
        config.source_path = Some(path.to_path_buf());
        Ok(config)
    }

    fn parse(contents: &str, path: &Path) -> Result<Self, ConfigError> {
        let parse_err = |message: String| ConfigError::Parse {
            path: path.display().to_string(),
            message,
        };
        match path.extension().and_then(|e| e.to_str()).unwrap_or("json") {
            "toml" => toml::from_str(contents).map_err(|e| parse_err(e.to_string())),
            "yaml" | "yml" => serde_yaml::from_str(contents).map_err(|e| parse_err(e.to_string())),
            _ => serde_json::from_str(contents).map_err(|e| parse_err(e.to_string())),
        }
    }

    /// Directory relative paths are resolved against: the config file's
    /// directory, or the working directory.
    pub fn base_dir(&self) -> PathBuf {
        self.source_path
            .as_ref()
            .and_then(|p| p.parent().map(Path::to_path_buf))
            .unwrap_or_else(|| PathBuf::from("."))
    }
}

/// Expand `~/` and resolve relative paths against `base_dir`.
pub fn resolve_path(path_str: &str, base_dir: &Path) -> PathBuf {
    let expanded = match path_str.strip_prefix("~/") {
        Some(rest) => match dirs::home_dir() {
            Some(home) => home.join(rest),
            None => PathBuf::from(path_str),
        },
        None => PathBuf::from(path_str),
    };
    if expanded.is_absolute() {
        expanded
    } else {
        base_dir.join(expanded)
    }
}

/// Resolved settings for one run.
#[derive(Debug, Clone)]
pub struct Settings {
    pub data_dir: PathBuf,
    pub log_dir: PathBuf,
    pub dashboard_url: String,
    pub limits: QuotaLimits,
    pub fetch: FetchConfig,
    pub ocr: GeminiConfig,
    pub calendar: CalendarOptions,
    pub email: SmtpConfig,
    pub line: LineConfig,
    pub timeout_alert_cooldown: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            log_dir: PathBuf::from("logs"),
            dashboard_url: DEFAULT_DASHBOARD_URL.to_string(),
            limits: QuotaLimits::default(),
            fetch: FetchConfig::default(),
            ocr: GeminiConfig::default(),
            calendar: CalendarOptions::default(),
            email: SmtpConfig::default(),
            line: LineConfig::default(),
            timeout_alert_cooldown: Duration::from_secs(DEFAULT_TIMEOUT_ALERT_COOLDOWN_SECS),
        }
    }
}

impl Settings {
    /// Build settings from a config file.
    pub fn from_config(config: &Config) -> Self {
        let base = config.base_dir();
        let defaults = Self::default();
        Self {
            data_dir: config
                .data_dir
                .as_deref()
                .map(|d| resolve_path(d, &base))
                .unwrap_or(defaults.data_dir),
            log_dir: config
                .log_dir
                .as_deref()
                .map(|d| resolve_path(d, &base))
                .unwrap_or(defaults.log_dir),
            dashboard_url: config
                .dashboard_url
                .clone()
                .unwrap_or(defaults.dashboard_url),
            limits: config.limits,
            fetch: config.fetch.clone(),
            ocr: config.ocr.clone(),
            calendar: config.calendar.clone(),
            email: config.email.clone(),
            line: config.line.clone(),
            timeout_alert_cooldown: config
                .timeout_alert_cooldown_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout_alert_cooldown),
        }
    }

    /// Apply environment overrides. `MAX_GEMINI_PER_DAY` replaces the OCR
    /// limit when it is a positive integer.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(raw) = std::env::var("MAX_GEMINI_PER_DAY") {
            match raw.trim().parse::<u32>() {
                Ok(n) if n > 0 => self.limits.ocr = n,
                _ => warn!("Ignoring invalid MAX_GEMINI_PER_DAY={:?}", raw),
            }
        }
        self
    }

    /// Check values that would otherwise fail later in the run.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.dashboard_url.trim().is_empty() {
            return Err(ConfigError::Invalid("dashboard_url is empty".into()));
        }
        if self.fetch.selectors.ready.is_empty() {
            return Err(ConfigError::Invalid(
                "fetch.selectors.ready must list at least one selector".into(),
            ));
        }
        if self.calendar.lead_minutes < 0 {
            return Err(ConfigError::Invalid(
                "calendar.lead_minutes must not be negative".into(),
            ));
        }
        Ok(())
    }

    /// Create the data and log directories.
    pub fn ensure_directories(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.data_dir)?;
        std::fs::create_dir_all(&self.log_dir)?;
        Ok(())
    }

    pub fn fingerprint_path(&self) -> PathBuf {
        self.data_dir.join("last-run.txt")
    }

    pub fn ocr_text_path(&self) -> PathBuf {
        self.data_dir.join("last-ocr.txt")
    }

    pub fn timeout_alert_path(&self) -> PathBuf {
        self.data_dir.join("last-timeout-notify.txt")
    }

    pub fn history_path(&self) -> PathBuf {
        self.data_dir.join("sent_history.json")
    }

    pub fn ocr_cache_path(&self) -> PathBuf {
        self.data_dir.join("ocr-cache.json")
    }

    pub fn course_list_path(&self) -> PathBuf {
        self.data_dir.join("courses.json")
    }

    pub fn cookies_path(&self) -> PathBuf {
        self.data_dir.join("state.json")
    }

    pub fn screenshot_path(&self) -> PathBuf {
        self.data_dir.join("screenshot.png")
    }

    pub fn calendar_path(&self) -> PathBuf {
        self.data_dir.join("schedule.ics")
    }

    pub fn run_log_path(&self) -> PathBuf {
        self.log_dir.join("run-log.txt")
    }
}

/// Secrets, read only from the environment.
#[derive(Clone, Default)]
pub struct Credentials {
    pub portal_user: Option<String>,
    pub portal_password: Option<String>,
    pub gemini_api_key: Option<String>,
    pub line_token: Option<String>,
    pub line_user_id: Option<String>,
    pub smtp_user: Option<String>,
    pub smtp_password: Option<String>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let set = |v: &Option<String>| if v.is_some() { "<set>" } else { "<unset>" };
        f.debug_struct("Credentials")
            .field("portal_user", &set(&self.portal_user))
            .field("portal_password", &set(&self.portal_password))
            .field("gemini_api_key", &set(&self.gemini_api_key))
            .field("line_token", &set(&self.line_token))
            .field("line_user_id", &set(&self.line_user_id))
            .field("smtp_user", &set(&self.smtp_user))
            .field("smtp_password", &set(&self.smtp_password))
            .finish()
    }
}

fn env_nonempty(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl Credentials {
    pub fn from_env() -> Self {
        Self {
            portal_user: env_nonempty("PORTAL_USER"),
            portal_password: env_nonempty("PORTAL_PASS"),
            gemini_api_key: env_nonempty("GEMINI_API_KEY"),
            line_token: env_nonempty("LINE_TOKEN"),
            line_user_id: env_nonempty("LINE_USER_ID"),
            smtp_user: env_nonempty("SMTP_USER"),
            smtp_password: env_nonempty("SMTP_PASS"),
        }
    }

    /// Portal login and OCR key are required; push and email are optional.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.portal_user.is_none() {
            return Err(ConfigError::MissingCredential("PORTAL_USER"));
        }
        if self.portal_password.is_none() {
            return Err(ConfigError::MissingCredential("PORTAL_PASS"));
        }
        if self.gemini_api_key.is_none() {
            return Err(ConfigError::MissingCredential("GEMINI_API_KEY"));
        }
        Ok(())
    }

    /// Token and recipient, if push is configured.
    pub fn line(&self) -> Option<(String, String)> {
        Some((self.line_token.clone()?, self.line_user_id.clone()?))
    }

    /// Account and password, if email is configured.
    pub fn smtp(&self) -> Option<(String, String)> {
        Some((self.smtp_user.clone()?, self.smtp_password.clone()?))
    }
}
