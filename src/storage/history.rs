//! Durable ledger of assignments that have already been notified.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{read_json, write_json, StoreError};
use crate::models::AssignmentId;

/// On-disk shape of the ledger. Only ever grows.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryRecord {
    #[serde(default)]
    pub sent_ids: BTreeSet<AssignmentId>,
}

/// History ledger bound to its file.
#[derive(Debug)]
pub struct HistoryStore {
    path: PathBuf,
    record: HistoryRecord,
    dirty: bool,
}

impl HistoryStore {
    /// Load the ledger, starting empty if no file exists yet.
    ///
    /// A corrupt ledger is an error rather than an empty set; treating it as
    /// empty would re-notify every assignment ever seen.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let record = read_json::<HistoryRecord>(&path)?.unwrap_or_default();
        debug!(
            "Loaded history ledger with {} entries from {}",
            record.sent_ids.len(),
            path.display()
        );
        Ok(Self {
            path,
            record,
            dirty: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.record.sent_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.record.sent_ids.is_empty()
    }

    /// True if this triple has never been recorded.
    pub fn is_new(&self, course: &str, title: &str, deadline: &str) -> bool {
        !self
            .record
            .sent_ids
            .contains(&AssignmentId::derive(course, title, deadline))
    }

    /// Record a triple as seen. No-op if already present.
    ///
    /// Returns whether the ledger changed.
    pub fn add(&mut self, course: &str, title: &str, deadline: &str) -> bool {
        let inserted = self
            .record
            .sent_ids
            .insert(AssignmentId::derive(course, title, deadline));
        self.dirty |= inserted;
        inserted
    }

    /// Whether entries were added since the last load or save.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn record(&self) -> &HistoryRecord {
        &self.record
    }

    /// Persist the full set.
    pub fn save(&mut self) -> Result<(), StoreError> {
        write_json(&self.path, &self.record)?;
        self.dirty = false;
        Ok(())
    }
}
