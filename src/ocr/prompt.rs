//! Extraction prompt for the vision model.

use std::path::Path;

use tracing::{debug, warn};

/// Prompt template. `{courses}` receives the known-course JSON list and
/// `{year}` the current year, used to complete month/day-only deadlines.
const EXTRACTION_PROMPT: &str = r#"This image is a screenshot of a learning-management dashboard.
Consult the "Known courses" list below. When a detected course name matches or closely resembles an entry in the list, ALWAYS output the exact name from the list (including the instructor name).

Known courses:
{courses}

Extraction rules:
1. course: the course name. Prefer names from the list above. If the course is not in the list, use the name as shown in the image, formatted as "Course (Instructor)" when the instructor is visible.
2. title: the assignment title.
3. deadline: the due date. The current year is {year}. Convert to "YYYY-MM-DD HH:mm".

Respond with a JSON array ONLY, no commentary.

Example:
[
  {"course": "Design Theory (Araki)", "title": "Quiz (7)", "deadline": "2025-12-07 23:59"},
  {"course": "Intro to Statistics (Yabu)", "title": "Assignment 1", "deadline": "2026-01-13 23:59"}
]
"#;

/// Build the extraction prompt.
pub fn build_prompt(course_list_json: &str, year: i32) -> String {
    EXTRACTION_PROMPT
        .replace("{courses}", course_list_json)
        .replace("{year}", &year.to_string())
}

/// Read the known-course list, falling back to `[]`.
///
/// The file is passed to the model verbatim, but must at least be valid JSON
/// so a broken file cannot derail the prompt.
pub fn load_course_list(path: &Path) -> String {
    match std::fs::read_to_string(path) {
        Ok(raw) => match serde_json::from_str::<serde_json::Value>(&raw) {
            Ok(_) => {
                debug!("Loaded course list from {}", path.display());
                raw
            }
            Err(e) => {
                warn!("Ignoring invalid course list {}: {}", path.display(), e);
                "[]".to_string()
            }
        },
        Err(_) => "[]".to_string(),
    }
}
