use serde::{Deserialize, Serialize};

use super::extract::ChunkerConfig;

/// Orchestrator configuration.
///
/// Pool sizing and the per-agent engine live in
/// [`AgentPoolConfig`](crate::agent::AgentPoolConfig); this covers the
/// pipeline stages around the pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Files larger than this are skipped, never read.
    #[serde(default = "default_max_file_size_mb")]
    pub max_file_size_mb: u64,
    /// Ignore the inventory's delta decisions and re-scan everything.
    #[serde(default)]
    pub force_full_scan: bool,
    /// Capacity of the walk-to-extract queue.
    #[serde(default = "default_walk_queue_size")]
    pub walk_queue_size: usize,
    /// Emit a progress event and job update every this many files.
    #[serde(default = "default_progress_interval")]
    pub progress_interval: u64,
    #[serde(default)]
    pub chunker: ChunkerConfig,
}

fn default_max_file_size_mb() -> u64 {
    100
}

fn default_walk_queue_size() -> usize {
    1000
}

fn default_progress_interval() -> u64 {
    10
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            max_file_size_mb: default_max_file_size_mb(),
            force_full_scan: false,
            walk_queue_size: default_walk_queue_size(),
            progress_interval: default_progress_interval(),
            chunker: ChunkerConfig::default(),
        }
    }
}

impl ScanConfig {
    pub fn max_file_size_bytes(&self) -> u64 {
        self.max_file_size_mb * 1024 * 1024
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ScanConfig::default();
        assert_eq!(config.max_file_size_mb, 100);
        assert!(!config.force_full_scan);
        assert_eq!(config.walk_queue_size, 1000);
        assert_eq!(config.progress_interval, 10);
    }

    #[test]
    fn test_deserializes_with_partial_fields() {
        let config: ScanConfig =
            serde_json::from_str(r#"{"max_file_size_mb": 5, "force_full_scan": true}"#).unwrap();
        assert_eq!(config.max_file_size_mb, 5);
        assert!(config.force_full_scan);
        assert_eq!(config.walk_queue_size, 1000);
        assert_eq!(config.chunker.max_chars, 4000);
    }
}
