//! Bounded cache of OCR results keyed by screenshot content hash.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::models::Assignment;
use crate::storage::{read_json_or_default, write_json, StoreError};

/// Maximum number of cached results kept on disk.
pub const OCR_CACHE_CAPACITY: usize = 50;

/// One cached extraction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OcrCacheEntry {
    pub image_hash: String,
    #[serde(rename = "ocr_text")]
    pub extracted_text: String,
    #[serde(default)]
    pub assignments: Vec<Assignment>,
    #[serde(rename = "timestamp", default)]
    pub produced_at: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct CacheFile {
    #[serde(default)]
    entries: Vec<OcrCacheEntry>,
}

/// FIFO cache. The most recently written entry for a hash is always last.
#[derive(Debug)]
pub struct OcrCache {
    path: PathBuf,
    entries: Vec<OcrCacheEntry>,
}

impl OcrCache {
    /// Load the cache file; a missing or corrupt file yields an empty cache.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let file: CacheFile = read_json_or_default(&path);
        let mut cache = Self {
            path,
            entries: file.entries,
        };
        if cache.entries.len() > OCR_CACHE_CAPACITY {
            warn!(
                "OCR cache holds {} entries, trimming to {}",
                cache.entries.len(),
                OCR_CACHE_CAPACITY
            );
            cache.evict();
        }
        cache
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[OcrCacheEntry] {
        &self.entries
    }

    pub fn get(&self, image_hash: &str) -> Option<&OcrCacheEntry> {
        self.entries.iter().find(|e| e.image_hash == image_hash)
    }

    /// Insert or refresh an entry, evicting the oldest beyond capacity.
    pub fn insert(&mut self, entry: OcrCacheEntry) {
        self.entries.retain(|e| e.image_hash != entry.image_hash);
        self.entries.push(entry);
        self.evict();
    }

    fn evict(&mut self) {
        if self.entries.len() > OCR_CACHE_CAPACITY {
            let excess = self.entries.len() - OCR_CACHE_CAPACITY;
            debug!("Evicting {} oldest OCR cache entries", excess);
            self.entries.drain(..excess);
        }
    }

    pub fn save(&self) -> Result<(), StoreError> {
        write_json(
            &self.path,
            &CacheFile {
                entries: self.entries.clone(),
            },
        )
    }
}
