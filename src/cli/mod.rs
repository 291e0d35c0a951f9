//! Command-line interface.

mod commands;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use crate::clock::SystemClock;
use crate::config::{Config, ConfigError, Credentials, Settings};
use crate::monitor::{alert_setup_failure, build_dispatcher, MonitorError};
use crate::quota::QuotaLedger;

#[derive(Parser)]
#[command(name = "lmswatch")]
#[command(about = "Watch an LMS dashboard and notify on new assignments")]
#[command(version)]
pub struct Cli {
    /// Data directory (overrides the config file)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Config file (skips discovery)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

#[derive(Subcommand)]
enum Commands {
    /// Run one monitoring cycle (default)
    Run,

    /// Show quota usage and stored state
    Status,

    /// Extract assignments from a local screenshot
    Extract {
        /// Image file (PNG or JPEG)
        image: PathBuf,
    },
}

impl Cli {
    /// Resolve settings from the config file, CLI flags and environment.
    pub async fn load_settings(&self) -> Result<Settings, ConfigError> {
        let config = match &self.config {
            Some(path) => Config::load_from_path(path).await?,
            None => Config::load().await?,
        };
        let mut settings = Settings::from_config(&config).with_env_overrides();
        if let Some(ref data_dir) = self.data_dir {
            settings.data_dir = data_dir.clone();
        }
        Ok(settings)
    }

    /// Report a config file that could not be loaded, as far as defaults
    /// and the environment allow.
    pub async fn alert_config_failure(&self, err: ConfigError) -> anyhow::Error {
        let mut settings = Settings::default();
        if let Some(ref data_dir) = self.data_dir {
            settings.data_dir = data_dir.clone();
        }
        let credentials = Credentials::from_env();
        let quota = QuotaLedger::load(&settings.data_dir, settings.limits, Arc::new(SystemClock));
        let err = MonitorError::Config(err);
        alert_setup_failure(&build_dispatcher(&settings, &credentials, quota), &err).await;
        err.into()
    }

    /// Dispatch the selected command.
    pub async fn run(self, settings: Settings) -> anyhow::Result<()> {
        settings.ensure_directories()?;
        match self.command.unwrap_or(Commands::Run) {
            Commands::Run => commands::cmd_run(&settings).await,
            Commands::Status => commands::cmd_status(&settings).await,
            Commands::Extract { image } => commands::cmd_extract(&settings, &image).await,
        }
    }
}
