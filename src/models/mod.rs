//! Data models for lmswatch.

mod assignment;
mod check;

pub use assignment::{Assignment, AssignmentId};
pub use check::CheckResult;
