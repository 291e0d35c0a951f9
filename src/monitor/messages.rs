//! Notification and alert texts.

use std::path::PathBuf;

use crate::notify::OutgoingMail;

pub(crate) const TIME_FORMAT: &str = "%Y-%m-%d %H:%M";

pub(crate) fn push_text(summary: &str, detected_at: &str) -> String {
    format!(
        "Assignment update\n\n{}\n\nDetected: {}\n(See email for details)",
        summary, detected_at
    )
}

pub(crate) fn update_mail(
    summary: &str,
    detected_at: &str,
    calendar_attached: bool,
    attachments: Vec<PathBuf>,
) -> OutgoingMail {
    let mut body = format!(
        "Assignments detected on the dashboard.\n\n{}\n\nDetected: {}",
        summary, detected_at
    );
    if calendar_attached {
        body.push_str("\n\nNew assignments found; a calendar file is attached.");
    } else {
        body.push_str("\n\n(No new assignments, so no calendar file is attached.)");
    }
    OutgoingMail {
        subject: "[LMS] Assignment update".to_string(),
        body,
        attachments,
    }
}

pub(crate) fn timeout_alert(error: &str) -> OutgoingMail {
    OutgoingMail::new(
        "[LMS warning] Dashboard timeout",
        format!(
            "The dashboard did not respond in time.\n\nError: {}\n\n\
             The portal may be slow. The next scheduled run will try again.",
            error
        ),
    )
}

pub(crate) fn ocr_failure_alert(error: &str, screenshot: PathBuf) -> OutgoingMail {
    OutgoingMail::new(
        "[LMS error] OCR failed",
        format!(
            "A dashboard change was detected but OCR failed.\n\nError: {}\n\n\
             The screenshot is attached.",
            error
        ),
    )
    .attach(screenshot)
}

pub(crate) fn fatal_alert(error: &str) -> OutgoingMail {
    OutgoingMail::new("[LMS error] Monitor stopped", error.to_string())
}
