//! Parsing model output into assignments and rendering summaries.

use chrono::{Datelike, NaiveDateTime};

use crate::models::Assignment;

/// Deadline format the model is asked to produce.
pub const DEADLINE_FORMAT: &str = "%Y-%m-%d %H:%M";

/// Remove a surrounding Markdown code fence, if any.
pub fn strip_code_fences(raw: &str) -> &str {
    let mut s = raw.trim();
    if let Some(rest) = s.strip_prefix("```json") {
        s = rest;
    } else if let Some(rest) = s.strip_prefix("```") {
        s = rest;
    }
    if let Some(rest) = s.strip_suffix("```") {
        s = rest;
    }
    s.trim()
}

/// Parse the model's response as a JSON array of assignments.
pub fn parse_assignments(raw: &str) -> Result<Vec<Assignment>, serde_json::Error> {
    serde_json::from_str(strip_code_fences(raw))
}

/// Render a deadline for humans: `M/D HH:MM` in the current year,
/// `YYYY/M/D HH:MM` otherwise. Unparseable input is returned as is.
pub fn format_deadline(deadline: &str, current_year: i32) -> String {
    match NaiveDateTime::parse_from_str(deadline, DEADLINE_FORMAT) {
        Ok(t) if t.year() == current_year => t.format("%-m/%-d %H:%M").to_string(),
        Ok(t) => t.format("%Y/%-m/%-d %H:%M").to_string(),
        Err(_) => deadline.to_string(),
    }
}

/// Human-readable summary used in push messages and email bodies.
pub fn format_summary(assignments: &[Assignment], current_year: i32) -> String {
    if assignments.is_empty() {
        return "No assignments found".to_string();
    }
    assignments
        .iter()
        .map(|a| {
            format!(
                "[Course] {}\n[Task] {}\n[Due] {}\n---\n",
                a.course,
                a.title,
                format_deadline(&a.deadline, current_year)
            )
        })
        .collect()
}
