//! lmswatch binary: one monitoring cycle per invocation.

use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Arc;

use clap::Parser;
use lmswatch::cli::{self, Cli};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Open the append-only run log, creating its directory.
fn open_run_log(path: &Path) -> std::io::Result<std::fs::File> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    OpenOptions::new().create(true).append(true).open(path)
}

/// Install the global subscriber: stdout, plus the run log when given.
fn init_logging(run_log: Option<&Path>) {
    let default_filter = if cli::is_verbose() {
        "lmswatch=debug"
    } else {
        "lmswatch=info"
    };

    let (file_layer, log_error) = match run_log.map(open_run_log) {
        Some(Ok(file)) => (
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(Arc::new(file)),
            ),
            None,
        ),
        Some(Err(e)) => (None, Some(e)),
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .with(file_layer)
        .init();

    if let (Some(path), Some(e)) = (run_log, log_error) {
        tracing::warn!("Cannot open run log {}: {}", path.display(), e);
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (before anything else)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let settings = match cli.load_settings().await {
        Ok(settings) => settings,
        Err(e) => {
            init_logging(None);
            tracing::error!("Configuration error: {}", e);
            return Err(cli.alert_config_failure(e).await);
        }
    };

    init_logging(Some(&settings.run_log_path()));
    cli.run(settings).await
}
