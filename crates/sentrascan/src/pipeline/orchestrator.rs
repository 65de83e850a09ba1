//! Scan orchestration.
//!
//! Four cooperating stages over one [`AgentPool`]: walk the source listing,
//! extract/chunk/submit, collect and aggregate chunk results into file
//! results, persist in batches. The stages share per-run bookkeeping behind
//! a single mutex which is never held across a blocking submit, a channel
//! await, or store I/O.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::agent::{
    AgentPool, AgentResult, FileResult, PoolStats, WorkItem, WorkMetadata,
};
use crate::error::Result;

use super::config::ScanConfig;
use super::extract::{TextChunker, TextExtractor, Utf8Extractor};
use super::inventory::InventoryService;
use super::notify::ScanEventBroadcaster;
use super::score::assess_risk;
use super::source::{FileDescriptor, FileSource};
use super::stats::{folder_path, FolderStats, ScanStats};
use super::store::{JobProgress, ScanRecord, ScanStore};

/// Final outcome of one scan run.
#[derive(Debug, Clone, Serialize)]
pub struct ScanReport {
    pub job_id: String,
    pub stats: ScanStats,
    pub pool: PoolStats,
}

/// Adapter context captured at extraction time, keyed by file path until the
/// file's chunks complete.
#[derive(Debug, Clone)]
struct FileContext {
    descriptor: FileDescriptor,
    content_hash: Option<String>,
}

/// Per-run bookkeeping mutated by the walk, extract and collect stages.
struct SharedState {
    /// Expected chunk count per file, fixed at submission time.
    file_chunks: HashMap<String, usize>,
    /// Chunk results accumulated per file until the expected count arrives.
    file_results: HashMap<String, Vec<AgentResult>>,
    file_metadata: HashMap<String, FileContext>,
    folder_stats: HashMap<String, FolderStats>,
    /// Every listed path, for end-of-scan missing-file detection.
    seen_paths: HashSet<String>,
    stats: ScanStats,
}

impl SharedState {
    fn new(force_full_scan: bool) -> Self {
        Self {
            file_chunks: HashMap::new(),
            file_results: HashMap::new(),
            file_metadata: HashMap::new(),
            folder_stats: HashMap::new(),
            seen_paths: HashSet::new(),
            stats: ScanStats::new(force_full_scan),
        }
    }
}

/// Drives one scan run over a file source and an agent pool.
///
/// One orchestrator runs one scan; `run` consumes it. The pool is injected
/// so the caller controls sizing and lifecycle ownership.
pub struct ScanOrchestrator {
    config: ScanConfig,
    pool: AgentPool,
    source: Arc<dyn FileSource>,
    extractor: Arc<dyn TextExtractor>,
    inventory: Option<Arc<dyn InventoryService>>,
    store: Arc<dyn ScanStore>,
    events: Option<ScanEventBroadcaster>,
    job_id: String,
}

impl ScanOrchestrator {
    pub fn new(
        config: ScanConfig,
        pool: AgentPool,
        source: Arc<dyn FileSource>,
        store: Arc<dyn ScanStore>,
    ) -> Self {
        Self {
            config,
            pool,
            source,
            extractor: Arc::new(Utf8Extractor::default()),
            inventory: None,
            store,
            events: None,
            job_id: Uuid::new_v4().to_string(),
        }
    }

    /// Enables delta scanning through the given inventory.
    pub fn with_inventory(mut self, inventory: Arc<dyn InventoryService>) -> Self {
        self.inventory = Some(inventory);
        self
    }

    /// Streams per-file and progress events through the broadcaster.
    pub fn with_events(mut self, events: ScanEventBroadcaster) -> Self {
        self.events = Some(events);
        self
    }

    pub fn with_extractor(mut self, extractor: Arc<dyn TextExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    /// Runs the scan to completion.
    ///
    /// Starts the pool, runs the three stages concurrently, drains the pool
    /// once extraction is done, and stops it after collection finishes, so
    /// every submitted chunk is either aggregated or reported pending at
    /// shutdown.
    pub async fn run(self) -> Result<ScanReport> {
        let job_id = self.job_id.clone();
        let inner = Arc::new(Inner {
            chunker: TextChunker::new(&self.config.chunker),
            state: Mutex::new(SharedState::new(self.config.force_full_scan)),
            config: self.config,
            pool: self.pool,
            source: self.source,
            extractor: self.extractor,
            inventory: self.inventory,
            store: self.store,
            events: self.events,
            job_id: job_id.clone(),
        });

        info!(job_id = %job_id, agents = inner.pool.num_agents(), "Starting scan");
        inner.pool.start().await?;

        let (extract_tx, extract_rx) = mpsc::channel(inner.config.walk_queue_size.max(1));

        let walk = tokio::spawn(
            Arc::clone(&inner)
                .walk_stage(extract_tx)
                .instrument(info_span!("walk", job_id = %job_id)),
        );
        let extract = tokio::spawn(
            Arc::clone(&inner)
                .extract_stage(extract_rx)
                .instrument(info_span!("extract", job_id = %job_id)),
        );
        let collect = tokio::spawn(
            Arc::clone(&inner)
                .collect_stage()
                .instrument(info_span!("collect", job_id = %job_id)),
        );

        if walk.await.is_err() {
            error!("Walk stage panicked");
        }
        if extract.await.is_err() {
            error!("Extract stage panicked");
        }

        // No further submissions; the collector ends once pending hits zero
        inner.pool.drain().await?;
        if collect.await.is_err() {
            error!("Collect stage panicked");
        }

        inner.finalize().await;
        inner.pool.stop(true).await?;

        let stats = inner.lock_state().stats.clone();
        info!(
            job_id = %job_id,
            files_scanned = stats.files_scanned,
            files_with_pii = stats.files_with_pii,
            files_skipped = stats.files_skipped,
            errors = stats.errors,
            "Scan complete"
        );

        Ok(ScanReport {
            job_id,
            stats,
            pool: inner.pool.stats(),
        })
    }
}

struct Inner {
    config: ScanConfig,
    pool: AgentPool,
    source: Arc<dyn FileSource>,
    extractor: Arc<dyn TextExtractor>,
    chunker: TextChunker,
    inventory: Option<Arc<dyn InventoryService>>,
    store: Arc<dyn ScanStore>,
    events: Option<ScanEventBroadcaster>,
    job_id: String,
    state: Mutex<SharedState>,
}

impl Inner {
    fn lock_state(&self) -> MutexGuard<'_, SharedState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Stage 1: consume the source listing, apply the size guard, and feed
    /// survivors to the extraction queue. Dropping the queue sender is the
    /// exhaustion sentinel.
    async fn walk_stage(self: Arc<Self>, extract_tx: mpsc::Sender<FileDescriptor>) {
        let (list_tx, mut list_rx) = mpsc::channel(self.config.walk_queue_size.max(1));
        let source = Arc::clone(&self.source);
        let lister = tokio::spawn(async move {
            if let Err(e) = source.list_files(list_tx).await {
                error!("File listing failed: {e}");
            }
        });

        let max_bytes = self.config.max_file_size_bytes();
        while let Some(descriptor) = list_rx.recv().await {
            let oversized = {
                let mut state = self.lock_state();
                state.seen_paths.insert(descriptor.path.clone());
                state
                    .folder_stats
                    .entry(folder_path(&descriptor.path))
                    .or_default()
                    .note_file(descriptor.size);
                if descriptor.size > max_bytes {
                    state.stats.files_skipped += 1;
                    state.stats.files_too_large += 1;
                    true
                } else {
                    false
                }
            };
            if oversized {
                warn!(
                    path = %descriptor.path,
                    size = descriptor.size,
                    limit = max_bytes,
                    "Skipping file over size limit"
                );
                continue;
            }

            if extract_tx.send(descriptor).await.is_err() {
                debug!("Extraction queue closed; stopping walk");
                break;
            }
        }

        if lister.await.is_err() {
            error!("File lister panicked");
        }
        debug!("Walk stage finished");
    }

    /// Stage 2: read, delta-check, extract, chunk, and submit.
    async fn extract_stage(self: Arc<Self>, mut extract_rx: mpsc::Receiver<FileDescriptor>) {
        while let Some(descriptor) = extract_rx.recv().await {
            if let Err(e) = self.extract_one(&descriptor).await {
                warn!(path = %descriptor.path, "Failed to process file: {e}");
                self.lock_state().stats.errors += 1;
            }
        }
        debug!("Extract stage finished");
    }

    async fn extract_one(&self, descriptor: &FileDescriptor) -> Result<()> {
        let content = self.source.read_file(descriptor).await?;
        let content_hash = self
            .inventory
            .as_ref()
            .map(|inventory| inventory.content_hash(&content));

        if let (Some(inventory), Some(hash)) = (&self.inventory, &content_hash) {
            if self.source.supports_delta() {
                let decision = inventory
                    .should_scan(descriptor, hash, self.config.force_full_scan)
                    .await;
                if !decision.scan {
                    debug!(path = %descriptor.path, reason = %decision.reason, "Skipping file");
                    self.lock_state().stats.files_skipped += 1;
                    return Ok(());
                }
            }
        }

        let text = self.extractor.extract_text(&content, &descriptor.path)?;
        if text.trim().is_empty() {
            debug!(path = %descriptor.path, "No extractable text");
            return Ok(());
        }

        let chunks = self.chunker.chunk(&text);
        let total_chunks = chunks.len();
        let metadata = WorkMetadata {
            exposure: descriptor.exposure,
            owner: descriptor.owner.clone(),
            adapter: Some(descriptor.adapter.clone()),
            item_id: descriptor.item_id.clone(),
            content_hash: content_hash.clone(),
        };

        {
            let mut state = self.lock_state();
            state
                .file_chunks
                .insert(descriptor.path.clone(), total_chunks);
            state.file_metadata.insert(
                descriptor.path.clone(),
                FileContext {
                    descriptor: descriptor.clone(),
                    content_hash,
                },
            );
        }

        // Outside the lock: a full inbound channel blocks here, which is the
        // backpressure that throttles this stage and, through the extraction
        // queue, the walker
        for (index, chunk) in chunks.into_iter().enumerate() {
            let item = WorkItem::new(
                descriptor.path.as_str(),
                chunk,
                index,
                total_chunks,
                metadata.clone(),
            );
            self.pool.submit(item).await?;
        }

        Ok(())
    }

    /// Stage 3: aggregate chunk results per file and persist completed files
    /// in batches.
    async fn collect_stage(self: Arc<Self>) {
        let mut batches = self.pool.results_batched(None, None);
        while let Some(batch) = batches.next_batch().await {
            let batch_len = batch.len();
            let mut completed = Vec::new();

            for result in batch {
                let path = result.file_path.clone();
                let mut state = self.lock_state();
                state
                    .file_results
                    .entry(path.clone())
                    .or_default()
                    .push(result);

                let expected = state.file_chunks.get(&path).copied().unwrap_or(1);
                let collected = state.file_results.get(&path).map_or(0, Vec::len);
                if collected >= expected {
                    let chunks = state.file_results.remove(&path).unwrap_or_default();
                    state.file_chunks.remove(&path);
                    let context = state.file_metadata.remove(&path);
                    completed.push((FileResult::aggregate(path.as_str(), &chunks), context));
                }
            }

            if !completed.is_empty() {
                self.persist_batch(completed).await;
            }
            debug!("Collected batch of {batch_len} chunk results");
        }
        debug!("Collect stage finished");
    }

    async fn persist_batch(&self, completed: Vec<(FileResult, Option<FileContext>)>) {
        let count = completed.len();
        for (file_result, context) in completed {
            let path = file_result.file_path.clone();
            if let Err(e) = self.persist_file(file_result, context).await {
                error!(path = %path, "Failed to persist scan result: {e}");
                self.lock_state().stats.errors += 1;
            }
        }

        // One commit per batch; a failure counts but never aborts the scan
        if let Err(e) = self.store.commit().await {
            error!("Batch commit failed: {e}");
            self.lock_state().stats.errors += 1;
        } else {
            debug!("Persisted batch of {count} file results");
        }
    }

    async fn persist_file(
        &self,
        file_result: FileResult,
        context: Option<FileContext>,
    ) -> Result<()> {
        let (descriptor, content_hash) = match context {
            Some(context) => (Some(context.descriptor), context.content_hash),
            None => (None, None),
        };
        let exposure = descriptor.as_ref().and_then(|d| d.exposure);
        let risk = assess_risk(file_result.total_entities, exposure);

        let file_name = descriptor.as_ref().map_or_else(
            || {
                file_result
                    .file_path
                    .rsplit('/')
                    .next()
                    .unwrap_or(&file_result.file_path)
                    .to_string()
            },
            |d| d.name.clone(),
        );

        let record = ScanRecord {
            job_id: self.job_id.clone(),
            file_path: file_result.file_path.clone(),
            file_name,
            file_size: descriptor.as_ref().map_or(0, |d| d.size),
            modified: descriptor.as_ref().and_then(|d| d.modified),
            content_hash,
            risk_score: risk.risk_score,
            risk_tier: risk.risk_tier,
            content_score: risk.content_score,
            exposure_multiplier: risk.exposure_multiplier,
            entity_counts: file_result.entity_counts.clone(),
            total_entities: file_result.total_entities,
            exposure,
            owner: descriptor.as_ref().and_then(|d| d.owner.clone()),
            chunk_count: file_result.chunk_count,
            errors: file_result.errors.clone(),
            processing_ms: file_result.total_processing_ms,
            scanned_at: Utc::now(),
        };

        self.store.append(record.clone()).await?;

        let (files_scanned, files_with_pii, files_skipped, errors) = {
            let mut state = self.lock_state();
            state.stats.files_scanned += 1;
            if file_result.total_entities > 0 {
                state.stats.files_with_pii += 1;
            }
            state.stats.total_entities += file_result.total_entities as u64;
            state.stats.errors += file_result.errors.len() as u64;
            state.stats.record_tier(risk.risk_tier);

            if file_result.total_entities > 0 {
                state
                    .folder_stats
                    .entry(folder_path(&file_result.file_path))
                    .or_default()
                    .note_sensitive(risk.risk_tier, file_result.total_entities as u64);
            }

            (
                state.stats.files_scanned,
                state.stats.files_with_pii,
                state.stats.files_skipped,
                state.stats.errors,
            )
        };

        // Newly sensitive files flow back into the inventory
        if file_result.total_entities > 0 {
            if let (Some(inventory), Some(descriptor)) = (&self.inventory, descriptor.as_ref()) {
                if let Err(e) = inventory
                    .record_file(descriptor, &record, &self.job_id)
                    .await
                {
                    warn!(path = %record.file_path, "Inventory update failed: {e}");
                }
            }
        }

        if let Some(events) = &self.events {
            events.send_file_result(
                &self.job_id,
                &record.file_path,
                record.risk_score,
                record.risk_tier,
                &record.entity_counts,
            );
        }

        if files_scanned % self.config.progress_interval.max(1) == 0 {
            if let Some(events) = &self.events {
                events.send_progress(
                    &self.job_id,
                    files_scanned,
                    files_with_pii,
                    files_skipped,
                    Some(&record.file_name),
                );
            }
            let progress = JobProgress {
                job_id: self.job_id.clone(),
                current_file: Some(record.file_name.clone()),
                files_scanned,
                files_with_pii,
                files_skipped,
                errors,
                completed: false,
            };
            if let Err(e) = self.store.update_progress(&progress).await {
                warn!("Progress update failed: {e}");
            }
        }

        Ok(())
    }

    /// Post-collection bookkeeping: folder rollups, missing-file detection,
    /// the final progress update and commit, and the completion event.
    async fn finalize(&self) {
        let (folders, seen, incomplete) = {
            let mut state = self.lock_state();
            (
                std::mem::take(&mut state.folder_stats),
                std::mem::take(&mut state.seen_paths),
                state.file_results.len(),
            )
        };
        if incomplete > 0 {
            warn!("{incomplete} files still incomplete at shutdown");
        }

        if let Some(inventory) = &self.inventory {
            for (folder, stats) in &folders {
                if let Err(e) = inventory.record_folder(folder, stats, &self.job_id).await {
                    warn!(folder = %folder, "Folder rollup failed: {e}");
                }
            }
            let missing = inventory.mark_missing(&seen, &self.job_id).await;
            if missing > 0 {
                info!("Flagged {missing} inventoried files for rescan (not seen in this scan)");
            }
        }

        let stats = self.lock_state().stats.clone();
        let progress = JobProgress {
            job_id: self.job_id.clone(),
            current_file: None,
            files_scanned: stats.files_scanned,
            files_with_pii: stats.files_with_pii,
            files_skipped: stats.files_skipped,
            errors: stats.errors,
            completed: true,
        };
        if let Err(e) = self.store.update_progress(&progress).await {
            warn!("Final progress update failed: {e}");
        }
        if let Err(e) = self.store.commit().await {
            error!("Final commit failed: {e}");
            self.lock_state().stats.errors += 1;
        }

        if let Some(events) = &self.events {
            let stats = self.lock_state().stats.clone();
            events.send_completed(&self.job_id, &stats);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::AgentPoolConfig;
    use crate::pipeline::extract::ChunkerConfig;
    use crate::pipeline::inventory::MemoryInventory;
    use crate::pipeline::notify::ScanEvent;
    use crate::pipeline::score::RiskTier;
    use crate::pipeline::source::{DirectorySource, FileListSource};
    use crate::pipeline::store::MemoryStore;
    use std::time::Duration;
    use tempfile::TempDir;

    fn pool(num_agents: usize) -> AgentPool {
        AgentPool::new(AgentPoolConfig {
            num_agents,
            shutdown_timeout: Duration::from_secs(5),
            result_batch_timeout: Duration::from_millis(100),
            ..AgentPoolConfig::default()
        })
    }

    fn orchestrator(
        config: ScanConfig,
        source: Arc<dyn FileSource>,
        store: Arc<MemoryStore>,
    ) -> ScanOrchestrator {
        ScanOrchestrator::new(config, pool(2), source, store)
    }

    #[tokio::test]
    async fn test_scan_directory_end_to_end() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(
            tmp.path().join("leaky.txt"),
            "mail alice@example.com or bob@example.com, ssn 123-45-6789",
        )
        .unwrap();
        std::fs::write(tmp.path().join("clean.txt"), "nothing sensitive here").unwrap();

        let store = Arc::new(MemoryStore::new());
        let source = Arc::new(DirectorySource::new(tmp.path()));
        let report = orchestrator(ScanConfig::default(), source, Arc::clone(&store))
            .run()
            .await
            .unwrap();

        assert_eq!(report.stats.files_scanned, 2);
        assert_eq!(report.stats.files_with_pii, 1);
        assert_eq!(report.stats.total_entities, 3);
        assert_eq!(report.stats.errors, 0);
        assert_eq!(report.pool.items_pending, 0);

        let records = store.committed();
        assert_eq!(records.len(), 2);
        let leaky = records
            .iter()
            .find(|r| r.file_name == "leaky.txt")
            .unwrap();
        assert_eq!(leaky.entity_counts["EMAIL"], 2);
        assert_eq!(leaky.entity_counts["SSN"], 1);
        assert_eq!(leaky.total_entities, 3);
        assert_eq!(leaky.risk_score, 30);
        assert_eq!(leaky.risk_tier, RiskTier::Low);
        assert_eq!(leaky.chunk_count, 1);
    }

    #[tokio::test]
    async fn test_multi_chunk_file_aggregates_once() {
        let tmp = TempDir::new().unwrap();
        let mut text = String::new();
        for i in 0..40 {
            text.push_str(&format!("filler text block {i} with user{i}@example.com inside "));
        }
        std::fs::write(tmp.path().join("big.txt"), &text).unwrap();

        let config = ScanConfig {
            chunker: ChunkerConfig {
                max_chars: 200,
                overlap: 0,
            },
            ..ScanConfig::default()
        };
        let store = Arc::new(MemoryStore::new());
        let source = Arc::new(DirectorySource::new(tmp.path()));
        let report = orchestrator(config, source, Arc::clone(&store))
            .run()
            .await
            .unwrap();

        let records = store.committed();
        assert_eq!(records.len(), 1, "one FileResult per file");
        assert!(records[0].chunk_count > 1);
        assert_eq!(records[0].total_entities as u64, report.stats.total_entities);
        assert!(records[0].entity_counts["EMAIL"] >= 40);
    }

    #[tokio::test]
    async fn test_oversized_file_is_skipped_unread() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("huge.txt"), vec![b'x'; 2 * 1024 * 1024]).unwrap();
        std::fs::write(tmp.path().join("ok.txt"), "fine").unwrap();

        let config = ScanConfig {
            max_file_size_mb: 1,
            ..ScanConfig::default()
        };
        let store = Arc::new(MemoryStore::new());
        let source = Arc::new(DirectorySource::new(tmp.path()));
        let report = orchestrator(config, source, Arc::clone(&store))
            .run()
            .await
            .unwrap();

        assert_eq!(report.stats.files_scanned, 1);
        assert_eq!(report.stats.files_skipped, 1);
        assert_eq!(report.stats.files_too_large, 1);
        assert_eq!(store.committed().len(), 1);
    }

    #[tokio::test]
    async fn test_delta_scan_skips_unchanged_files() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("a.txt"), "ssn 123-45-6789").unwrap();

        let inventory = Arc::new(MemoryInventory::new());
        let store = Arc::new(MemoryStore::new());

        let first = ScanOrchestrator::new(
            ScanConfig::default(),
            pool(1),
            Arc::new(DirectorySource::new(tmp.path())),
            Arc::clone(&store) as Arc<dyn ScanStore>,
        )
        .with_inventory(Arc::clone(&inventory) as Arc<dyn InventoryService>)
        .run()
        .await
        .unwrap();
        assert_eq!(first.stats.files_scanned, 1);

        let second = ScanOrchestrator::new(
            ScanConfig::default(),
            pool(1),
            Arc::new(DirectorySource::new(tmp.path())),
            Arc::clone(&store) as Arc<dyn ScanStore>,
        )
        .with_inventory(Arc::clone(&inventory) as Arc<dyn InventoryService>)
        .run()
        .await
        .unwrap();
        assert_eq!(second.stats.files_scanned, 0);
        assert_eq!(second.stats.files_skipped, 1);
    }

    #[tokio::test]
    async fn test_force_full_scan_overrides_delta() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("a.txt"), "ssn 123-45-6789").unwrap();

        let inventory = Arc::new(MemoryInventory::new());
        let store = Arc::new(MemoryStore::new());

        ScanOrchestrator::new(
            ScanConfig::default(),
            pool(1),
            Arc::new(DirectorySource::new(tmp.path())),
            Arc::clone(&store) as Arc<dyn ScanStore>,
        )
        .with_inventory(Arc::clone(&inventory) as Arc<dyn InventoryService>)
        .run()
        .await
        .unwrap();

        let config = ScanConfig {
            force_full_scan: true,
            ..ScanConfig::default()
        };
        let report = ScanOrchestrator::new(
            config,
            pool(1),
            Arc::new(DirectorySource::new(tmp.path())),
            Arc::clone(&store) as Arc<dyn ScanStore>,
        )
        .with_inventory(Arc::clone(&inventory) as Arc<dyn InventoryService>)
        .run()
        .await
        .unwrap();

        assert_eq!(report.stats.files_scanned, 1);
        assert_eq!(report.stats.files_skipped, 0);
        assert_eq!(report.stats.scan_mode, crate::pipeline::stats::ScanMode::Full);
    }

    #[tokio::test]
    async fn test_file_list_source_follows_same_contract() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("listed.txt");
        std::fs::write(&path, "reach me at carol@example.com").unwrap();

        let store = Arc::new(MemoryStore::new());
        // Inventory present, but the list source opts out of delta checks
        let report = ScanOrchestrator::new(
            ScanConfig::default(),
            pool(1),
            Arc::new(FileListSource::new([path])),
            Arc::clone(&store) as Arc<dyn ScanStore>,
        )
        .with_inventory(Arc::new(MemoryInventory::new()) as Arc<dyn InventoryService>)
        .run()
        .await
        .unwrap();

        assert_eq!(report.stats.files_scanned, 1);
        let records = store.committed();
        assert_eq!(records[0].entity_counts["EMAIL"], 1);
    }

    #[tokio::test]
    async fn test_empty_file_produces_no_record() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("empty.txt"), "").unwrap();

        let store = Arc::new(MemoryStore::new());
        let source = Arc::new(DirectorySource::new(tmp.path()));
        let report = orchestrator(ScanConfig::default(), source, Arc::clone(&store))
            .run()
            .await
            .unwrap();

        assert_eq!(report.stats.files_scanned, 0);
        assert!(store.committed().is_empty());
    }

    #[tokio::test]
    async fn test_missing_root_counts_nothing() {
        let store = Arc::new(MemoryStore::new());
        let source = Arc::new(DirectorySource::new("/definitely/not/here"));
        let report = orchestrator(ScanConfig::default(), source, Arc::clone(&store))
            .run()
            .await
            .unwrap();

        assert_eq!(report.stats.files_scanned, 0);
        assert!(store.committed().is_empty());
    }

    #[tokio::test]
    async fn test_events_stream_file_and_completion() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("a.txt"), "mail dave@example.com").unwrap();

        let store = Arc::new(MemoryStore::new());
        let events = ScanEventBroadcaster::new(64);
        let mut rx = events.subscribe();

        let source = Arc::new(DirectorySource::new(tmp.path()));
        orchestrator(ScanConfig::default(), source, Arc::clone(&store))
            .with_events(events)
            .run()
            .await
            .unwrap();

        let mut saw_file = false;
        let mut saw_completed = false;
        while let Ok(event) = rx.try_recv() {
            match event {
                ScanEvent::FileScanned { file_path, .. } => {
                    assert!(file_path.ends_with("a.txt"));
                    saw_file = true;
                }
                ScanEvent::Completed { stats, .. } => {
                    assert_eq!(stats.files_scanned, 1);
                    saw_completed = true;
                }
                ScanEvent::Progress { .. } => {}
            }
        }
        assert!(saw_file);
        assert!(saw_completed);
    }

    #[tokio::test]
    async fn test_final_progress_marks_completion() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("a.txt"), "mail eve@example.com").unwrap();

        let store = Arc::new(MemoryStore::new());
        let source = Arc::new(DirectorySource::new(tmp.path()));
        let report = orchestrator(ScanConfig::default(), source, Arc::clone(&store))
            .run()
            .await
            .unwrap();

        let progress = store.progress().unwrap();
        assert!(progress.completed);
        assert_eq!(progress.files_scanned, 1);
        assert_eq!(progress.job_id, report.job_id);
    }

    #[tokio::test]
    async fn test_folder_rollup_reaches_inventory() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("a.txt"), "ssn 123-45-6789").unwrap();

        let inventory = Arc::new(MemoryInventory::new());
        let store = Arc::new(MemoryStore::new());
        ScanOrchestrator::new(
            ScanConfig::default(),
            pool(1),
            Arc::new(DirectorySource::new(tmp.path())),
            Arc::clone(&store) as Arc<dyn ScanStore>,
        )
        .with_inventory(Arc::clone(&inventory) as Arc<dyn InventoryService>)
        .run()
        .await
        .unwrap();

        let folder = tmp.path().to_string_lossy().into_owned();
        let rollup = inventory.folder_rollup(&folder).unwrap();
        assert_eq!(rollup.file_count, 1);
        assert!(rollup.has_sensitive);
        assert_eq!(rollup.highest_risk, Some(RiskTier::Low));
    }
}
