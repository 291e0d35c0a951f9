//! Assignment records extracted from the dashboard screenshot.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::fingerprint::sha256_hex;

/// A single assignment as produced by OCR extraction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Assignment {
    /// Course name, normalized against the known-course list when possible.
    pub course: String,
    /// Assignment title.
    pub title: String,
    /// Deadline as `YYYY-MM-DD HH:mm`.
    pub deadline: String,
}

impl Assignment {
    pub fn new(
        course: impl Into<String>,
        title: impl Into<String>,
        deadline: impl Into<String>,
    ) -> Self {
        Self {
            course: course.into(),
            title: title.into(),
            deadline: deadline.into(),
        }
    }

    /// Deduplication key for this assignment.
    pub fn id(&self) -> AssignmentId {
        AssignmentId::derive(&self.course, &self.title, &self.deadline)
    }
}

/// Deterministic identifier of an assignment: SHA-256 of `course|title|deadline`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssignmentId(String);

impl AssignmentId {
    pub fn derive(course: &str, title: &str, deadline: &str) -> Self {
        let key = format!("{}|{}|{}", course, title, deadline);
        Self(sha256_hex(key.as_bytes()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AssignmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_is_deterministic() {
        let a = AssignmentId::derive("CS101", "HW1", "2025-12-01 23:59");
        let b = AssignmentId::derive("CS101", "HW1", "2025-12-01 23:59");
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), 64);
    }

    #[test]
    fn test_id_matches_pipe_joined_hash() {
        let id = AssignmentId::derive("course", "title", "2025-12-07 23:59");
        assert_eq!(
            id.as_str(),
            sha256_hex("course|title|2025-12-07 23:59".as_bytes())
        );
    }

    #[test]
    fn test_id_differs_per_field() {
        let base = AssignmentId::derive("CS101", "HW1", "2025-12-01 23:59");
        assert_ne!(base, AssignmentId::derive("CS102", "HW1", "2025-12-01 23:59"));
        assert_ne!(base, AssignmentId::derive("CS101", "HW2", "2025-12-01 23:59"));
        assert_ne!(base, AssignmentId::derive("CS101", "HW1", "2025-12-02 23:59"));
    }

    #[test]
    fn test_assignment_id_uses_fields() {
        let a = Assignment::new("CS101", "HW1", "2025-12-01 23:59");
        assert_eq!(a.id(), AssignmentId::derive("CS101", "HW1", "2025-12-01 23:59"));
    }

    #[test]
    fn test_assignment_json_shape() {
        let a: Assignment = serde_json::from_str(
            r#"{"course": "Stats (Yabu)", "title": "Task 1", "deadline": "2026-01-13 23:59"}"#,
        )
        .unwrap();
        assert_eq!(a.course, "Stats (Yabu)");
        assert_eq!(a.deadline, "2026-01-13 23:59");
    }
}
