//! iCalendar (RFC 5545) export of assignment deadlines.
//!
//! Each assignment becomes one timed VEVENT ending at the deadline. The UID is
//! the assignment's ID, so re-importing the same assignment updates the
//! existing event instead of duplicating it.

use std::path::Path;

use chrono::{DateTime, Duration, FixedOffset, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::models::Assignment;
use crate::ocr::DEADLINE_FORMAT;
use crate::storage::{write_text, StoreError};

const PRODID: &str = "-//lmswatch//Assignment Calendar//EN";
const ICS_TIME_FORMAT: &str = "%Y%m%dT%H%M%S";

/// Calendar export settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalendarOptions {
    /// IANA timezone the deadlines are expressed in.
    #[serde(default = "default_timezone")]
    pub timezone: String,
    /// How long before the deadline the event starts.
    #[serde(default = "default_lead_minutes")]
    pub lead_minutes: i64,
}

fn default_timezone() -> String {
    "Asia/Tokyo".to_string()
}

fn default_lead_minutes() -> i64 {
    60
}

impl Default for CalendarOptions {
    fn default() -> Self {
        Self {
            timezone: default_timezone(),
            lead_minutes: default_lead_minutes(),
        }
    }
}

/// Escape a TEXT property value.
fn escape_text(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            ';' => out.push_str("\\;"),
            ',' => out.push_str("\\,"),
            '\n' => out.push_str("\\n"),
            '\r' => {}
            _ => out.push(c),
        }
    }
    out
}

/// Build a calendar document for `assignments`.
///
/// Assignments whose deadline cannot be parsed are skipped. An empty input
/// still yields a valid, empty VCALENDAR.
pub fn generate(
    assignments: &[Assignment],
    options: &CalendarOptions,
    now: DateTime<FixedOffset>,
) -> String {
    let stamp = now.with_timezone(&Utc).format("%Y%m%dT%H%M%SZ").to_string();
    let lead = Duration::minutes(options.lead_minutes);

    let mut lines: Vec<String> = vec![
        "BEGIN:VCALENDAR".into(),
        "VERSION:2.0".into(),
        format!("PRODID:{}", PRODID),
        "CALSCALE:GREGORIAN".into(),
        "METHOD:PUBLISH".into(),
    ];

    let mut events = 0;
    for a in assignments {
        let end = match NaiveDateTime::parse_from_str(&a.deadline, DEADLINE_FORMAT) {
            Ok(t) => t,
            Err(e) => {
                warn!(
                    "Skipping calendar event for {} / {}: bad deadline {:?} ({})",
                    a.course, a.title, a.deadline, e
                );
                continue;
            }
        };
        let start = end - lead;

        lines.push("BEGIN:VEVENT".into());
        lines.push(format!("UID:{}", a.id()));
        lines.push(format!("DTSTAMP:{}", stamp));
        lines.push(format!(
            "DTSTART;TZID={}:{}",
            options.timezone,
            start.format(ICS_TIME_FORMAT)
        ));
        lines.push(format!(
            "DTEND;TZID={}:{}",
            options.timezone,
            end.format(ICS_TIME_FORMAT)
        ));
        lines.push(format!(
            "SUMMARY:{}",
            escape_text(&format!("{}: {}", a.course, a.title))
        ));
        lines.push(format!(
            "DESCRIPTION:{}",
            escape_text(&format!(
                "Task: {}\nCourse: {}\nDue: {}",
                a.title, a.course, a.deadline
            ))
        ));
        lines.push("END:VEVENT".into());
        events += 1;
    }

    lines.push("END:VCALENDAR".into());
    debug!("Generated calendar with {} events", events);

    let mut doc = lines.join("\r\n");
    doc.push_str("\r\n");
    doc
}

/// Generate and write the calendar to `path`.
pub fn export(
    path: &Path,
    assignments: &[Assignment],
    options: &CalendarOptions,
    now: DateTime<FixedOffset>,
) -> Result<(), StoreError> {
    write_text(path, &generate(assignments, options, now))
}
