//! File inventory seam for delta scanning.
//!
//! The inventory remembers what a previous scan saw so unchanged files can be
//! skipped. The production service lives behind this trait; an in-memory
//! implementation ships for embedding and tests.

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::error::PersistError;

use super::source::FileDescriptor;
use super::stats::FolderStats;
use super::store::ScanRecord;

/// Outcome of a delta check for one file.
#[derive(Debug, Clone)]
pub struct ScanDecision {
    pub scan: bool,
    pub reason: String,
}

impl ScanDecision {
    pub fn scan(reason: impl Into<String>) -> Self {
        Self {
            scan: true,
            reason: reason.into(),
        }
    }

    pub fn skip(reason: impl Into<String>) -> Self {
        Self {
            scan: false,
            reason: reason.into(),
        }
    }
}

/// Inventory collaborator contract.
///
/// `force_full` overrides every delta signal unconditionally; a file's
/// rescan flag only matters when it is false.
#[async_trait]
pub trait InventoryService: Send + Sync {
    fn content_hash(&self, content: &[u8]) -> String {
        format!("{:x}", Sha256::digest(content))
    }

    async fn should_scan(
        &self,
        descriptor: &FileDescriptor,
        content_hash: &str,
        force_full: bool,
    ) -> ScanDecision;

    /// Records a sensitive file's latest scan outcome.
    async fn record_file(
        &self,
        descriptor: &FileDescriptor,
        record: &ScanRecord,
        job_id: &str,
    ) -> Result<(), PersistError>;

    /// Records one folder's end-of-scan rollup.
    async fn record_folder(
        &self,
        folder_path: &str,
        stats: &FolderStats,
        job_id: &str,
    ) -> Result<(), PersistError>;

    /// Flags inventoried files absent from `seen_paths` for rescan.
    /// Returns how many were flagged.
    async fn mark_missing(&self, seen_paths: &HashSet<String>, job_id: &str) -> usize;
}

#[derive(Debug, Clone)]
struct FileEntry {
    content_hash: String,
    needs_rescan: bool,
}

#[derive(Default)]
struct MemoryInventoryInner {
    files: HashMap<String, FileEntry>,
    folders: HashMap<String, FolderStats>,
}

/// In-memory inventory, usable as a single-process delta cache.
#[derive(Default)]
pub struct MemoryInventory {
    inner: RwLock<MemoryInventoryInner>,
}

impl MemoryInventory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds an already-seen file, as a previous scan would have left it.
    pub fn seed_file(&self, path: impl Into<String>, content_hash: impl Into<String>) {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        inner.files.insert(
            path.into(),
            FileEntry {
                content_hash: content_hash.into(),
                needs_rescan: false,
            },
        );
    }

    pub fn file_count(&self) -> usize {
        self.inner
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .files
            .len()
    }

    pub fn folder_rollup(&self, folder_path: &str) -> Option<FolderStats> {
        self.inner
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .folders
            .get(folder_path)
            .cloned()
    }

    pub fn needs_rescan(&self, path: &str) -> bool {
        self.inner
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .files
            .get(path)
            .map(|entry| entry.needs_rescan)
            .unwrap_or(false)
    }
}

#[async_trait]
impl InventoryService for MemoryInventory {
    async fn should_scan(
        &self,
        descriptor: &FileDescriptor,
        content_hash: &str,
        force_full: bool,
    ) -> ScanDecision {
        if force_full {
            return ScanDecision::scan("full scan forced");
        }

        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        match inner.files.get(&descriptor.path) {
            None => ScanDecision::scan("new file"),
            Some(entry) if entry.needs_rescan => ScanDecision::scan("flagged for rescan"),
            Some(entry) if entry.content_hash != content_hash => {
                ScanDecision::scan("content changed")
            }
            Some(_) => ScanDecision::skip("unchanged"),
        }
    }

    async fn record_file(
        &self,
        descriptor: &FileDescriptor,
        record: &ScanRecord,
        _job_id: &str,
    ) -> Result<(), PersistError> {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        inner.files.insert(
            descriptor.path.clone(),
            FileEntry {
                content_hash: record.content_hash.clone().unwrap_or_default(),
                needs_rescan: false,
            },
        );
        Ok(())
    }

    async fn record_folder(
        &self,
        folder_path: &str,
        stats: &FolderStats,
        _job_id: &str,
    ) -> Result<(), PersistError> {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        inner.folders.insert(folder_path.to_string(), stats.clone());
        Ok(())
    }

    async fn mark_missing(&self, seen_paths: &HashSet<String>, _job_id: &str) -> usize {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        let mut flagged = 0;
        for (path, entry) in inner.files.iter_mut() {
            if !seen_paths.contains(path) && !entry.needs_rescan {
                entry.needs_rescan = true;
                flagged += 1;
            }
        }
        flagged
    }
}
