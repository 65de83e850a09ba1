//! Scan result persistence seam.
//!
//! The pipeline appends records and commits at collector batch boundaries;
//! whatever sits behind the trait (database, message bus) aligns its
//! transaction with `commit`. An in-memory store ships for embedding and
//! tests.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::agent::ExposureLevel;
use crate::error::PersistError;

use super::score::RiskTier;

/// One file's persisted scan outcome.
#[derive(Debug, Clone, Serialize)]
pub struct ScanRecord {
    pub job_id: String,
    pub file_path: String,
    pub file_name: String,
    pub file_size: u64,
    pub modified: Option<DateTime<Utc>>,
    pub content_hash: Option<String>,
    pub risk_score: u32,
    pub risk_tier: RiskTier,
    pub content_score: u32,
    pub exposure_multiplier: f64,
    pub entity_counts: HashMap<String, usize>,
    pub total_entities: usize,
    pub exposure: Option<ExposureLevel>,
    pub owner: Option<String>,
    pub chunk_count: usize,
    pub errors: Vec<String>,
    pub processing_ms: f64,
    pub scanned_at: DateTime<Utc>,
}

/// Mutable progress fields on the owning job record.
#[derive(Debug, Clone, Serialize)]
pub struct JobProgress {
    pub job_id: String,
    pub current_file: Option<String>,
    pub files_scanned: u64,
    pub files_with_pii: u64,
    pub files_skipped: u64,
    pub errors: u64,
    pub completed: bool,
}

/// Append-only scan-result sink plus job progress updates.
#[async_trait]
pub trait ScanStore: Send + Sync {
    async fn append(&self, record: ScanRecord) -> Result<(), PersistError>;

    /// Transactional boundary; the collector calls this once per batch.
    async fn commit(&self) -> Result<(), PersistError>;

    async fn update_progress(&self, progress: &JobProgress) -> Result<(), PersistError>;
}

#[derive(Default)]
struct MemoryStoreInner {
    staged: Vec<ScanRecord>,
    committed: Vec<ScanRecord>,
    progress: Option<JobProgress>,
    commits: u64,
}

/// In-memory store. Records stay staged until `commit`.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<MemoryStoreInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn committed(&self) -> Vec<ScanRecord> {
        self.inner
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .committed
            .clone()
    }

    pub fn staged_count(&self) -> usize {
        self.inner
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .staged
            .len()
    }

    pub fn commit_count(&self) -> u64 {
        self.inner.read().unwrap_or_else(|e| e.into_inner()).commits
    }

    pub fn progress(&self) -> Option<JobProgress> {
        self.inner
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .progress
            .clone()
    }
}

#[async_trait]
impl ScanStore for MemoryStore {
    async fn append(&self, record: ScanRecord) -> Result<(), PersistError> {
        self.inner
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .staged
            .push(record);
        Ok(())
    }

    async fn commit(&self) -> Result<(), PersistError> {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        let staged = std::mem::take(&mut inner.staged);
        inner.committed.extend(staged);
        inner.commits += 1;
        Ok(())
    }

    async fn update_progress(&self, progress: &JobProgress) -> Result<(), PersistError> {
        self.inner
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .progress = Some(progress.clone());
        Ok(())
    }
}
