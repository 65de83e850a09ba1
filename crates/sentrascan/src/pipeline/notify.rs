//! Real-time scan event broadcasting.
//!
//! Best-effort by contract: a send with no subscribers is not an error, and
//! no notification outcome ever reaches the scan statistics.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;

use super::score::RiskTier;
use super::stats::ScanStats;

/// One streamed scan event.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScanEvent {
    FileScanned {
        job_id: String,
        file_path: String,
        risk_score: u32,
        risk_tier: RiskTier,
        entity_counts: HashMap<String, usize>,
        timestamp: DateTime<Utc>,
    },
    Progress {
        job_id: String,
        files_scanned: u64,
        files_with_pii: u64,
        files_skipped: u64,
        current_file: Option<String>,
        timestamp: DateTime<Utc>,
    },
    Completed {
        job_id: String,
        stats: ScanStats,
        timestamp: DateTime<Utc>,
    },
}

/// Broadcasts scan events for streaming consumers.
#[derive(Clone)]
pub struct ScanEventBroadcaster {
    sender: Arc<broadcast::Sender<ScanEvent>>,
}

impl ScanEventBroadcaster {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Sends an event to all subscribers.
    pub fn send(&self, event: ScanEvent) {
        // Ignore errors - no active receivers is fine
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ScanEvent> {
        self.sender.subscribe()
    }

    pub fn send_file_result(
        &self,
        job_id: &str,
        file_path: &str,
        risk_score: u32,
        risk_tier: RiskTier,
        entity_counts: &HashMap<String, usize>,
    ) {
        self.send(ScanEvent::FileScanned {
            job_id: job_id.to_string(),
            file_path: file_path.to_string(),
            risk_score,
            risk_tier,
            entity_counts: entity_counts.clone(),
            timestamp: Utc::now(),
        });
    }

    pub fn send_progress(
        &self,
        job_id: &str,
        files_scanned: u64,
        files_with_pii: u64,
        files_skipped: u64,
        current_file: Option<&str>,
    ) {
        self.send(ScanEvent::Progress {
            job_id: job_id.to_string(),
            files_scanned,
            files_with_pii,
            files_skipped,
            current_file: current_file.map(str::to_string),
            timestamp: Utc::now(),
        });
    }

    pub fn send_completed(&self, job_id: &str, stats: &ScanStats) {
        self.send(ScanEvent::Completed {
            job_id: job_id.to_string(),
            stats: stats.clone(),
            timestamp: Utc::now(),
        });
    }
}

impl Default for ScanEventBroadcaster {
    fn default() -> Self {
        Self::new(1000)
    }
}
