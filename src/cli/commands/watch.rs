//! The monitoring cycle command.

use std::sync::Arc;

use console::style;
use tracing::{error, info};

use crate::clock::{Clock, SystemClock};
use crate::config::{Credentials, Settings};
use crate::monitor::{alert_setup_failure, build_dispatcher, build_monitor, RunOutcome};
use crate::notify::NotifyError;
use crate::quota::QuotaLedger;

/// Run one monitoring cycle.
pub async fn cmd_run(settings: &Settings) -> anyhow::Result<()> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let credentials = Credentials::from_env();
    info!(
        "Starting dashboard check at {} (OCR limit {}/day)",
        clock.now().format("%Y-%m-%d %H:%M:%S"),
        settings.limits.ocr
    );

    let mut monitor = match build_monitor(settings, &credentials, clock.clone()) {
        Ok(m) => m,
        Err(e) => {
            error!("Cannot start monitor: {}", e);
            let quota = QuotaLedger::load(&settings.data_dir, settings.limits, clock);
            alert_setup_failure(&build_dispatcher(settings, &credentials, quota), &e).await;
            return Err(e.into());
        }
    };

    match monitor.run_once().await? {
        RunOutcome::Unchanged => {
            println!("{} No change", style("✓").green());
        }
        RunOutcome::NoTextChange => {
            println!(
                "{} Page changed but assignments are the same",
                style("✓").green()
            );
        }
        RunOutcome::Notified {
            assignments,
            new_assignments,
            calendar,
            report,
            ..
        } => {
            println!(
                "{} {} assignments, {} new",
                style("!").yellow(),
                assignments.len(),
                new_assignments.len()
            );
            if let Some(path) = calendar {
                println!("  Calendar: {}", path.display());
            }
            let status = |r: &Result<(), NotifyError>| match r {
                Ok(()) => style("sent").green().to_string(),
                Err(e) => style(format!("failed ({})", e)).red().to_string(),
            };
            println!("  Push:  {}", status(&report.push));
            println!("  Email: {}", status(&report.email));
        }
        RunOutcome::FetchDeferred => {
            println!(
                "{} Dashboard unreachable, will retry next run",
                style("!").yellow()
            );
        }
    }
    Ok(())
}
