//! Running scan statistics.
//!
//! These counters are the externally observed outcome of a scan, including
//! partial failures; no error short of a pool-state violation aborts a run.

use std::path::Path;

use serde::Serialize;

use super::score::RiskTier;

/// Whether the scan honored the inventory's delta decisions or forced a
/// re-scan of everything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanMode {
    Full,
    Delta,
}

/// Per-run counters, updated as files complete.
#[derive(Debug, Clone, Serialize)]
pub struct ScanStats {
    pub files_scanned: u64,
    pub files_with_pii: u64,
    pub total_entities: u64,
    pub errors: u64,
    /// Delta skips plus oversized skips.
    pub files_skipped: u64,
    /// Oversized skips only; also counted in `files_skipped`.
    pub files_too_large: u64,
    pub critical_count: u64,
    pub high_count: u64,
    pub medium_count: u64,
    pub low_count: u64,
    pub minimal_count: u64,
    pub scan_mode: ScanMode,
}

impl ScanStats {
    pub fn new(force_full_scan: bool) -> Self {
        Self {
            files_scanned: 0,
            files_with_pii: 0,
            total_entities: 0,
            errors: 0,
            files_skipped: 0,
            files_too_large: 0,
            critical_count: 0,
            high_count: 0,
            medium_count: 0,
            low_count: 0,
            minimal_count: 0,
            scan_mode: if force_full_scan {
                ScanMode::Full
            } else {
                ScanMode::Delta
            },
        }
    }

    pub fn record_tier(&mut self, tier: RiskTier) {
        match tier {
            RiskTier::Critical => self.critical_count += 1,
            RiskTier::High => self.high_count += 1,
            RiskTier::Medium => self.medium_count += 1,
            RiskTier::Low => self.low_count += 1,
            RiskTier::Minimal => self.minimal_count += 1,
        }
    }
}

/// Rolling aggregate for one folder, keyed by [`folder_path`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct FolderStats {
    pub file_count: u64,
    pub total_size: u64,
    pub has_sensitive: bool,
    pub highest_risk: Option<RiskTier>,
    pub total_entities: u64,
}

impl FolderStats {
    /// Called from the walk stage for every listed file.
    pub fn note_file(&mut self, size: u64) {
        self.file_count += 1;
        self.total_size += size;
    }

    /// Called from the persistence stage when a file held entities.
    pub fn note_sensitive(&mut self, tier: RiskTier, total_entities: u64) {
        self.has_sensitive = true;
        self.total_entities += total_entities;
        let higher = match self.highest_risk {
            None => true,
            Some(current) => tier.priority() > current.priority(),
        };
        if higher {
            self.highest_risk = Some(tier);
        }
    }
}

/// Owning folder of a file path, for folder-level rollups.
pub fn folder_path(file_path: &str) -> String {
    Path::new(file_path)
        .parent()
        .map(|p| p.to_string_lossy().into_owned())
        .filter(|p| !p.is_empty())
        .unwrap_or_else(|| ".".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_mode_follows_force_flag() {
        assert_eq!(ScanStats::new(true).scan_mode, ScanMode::Full);
        assert_eq!(ScanStats::new(false).scan_mode, ScanMode::Delta);
    }

    #[test]
    fn test_record_tier_counts() {
        let mut stats = ScanStats::new(false);
        stats.record_tier(RiskTier::Critical);
        stats.record_tier(RiskTier::Critical);
        stats.record_tier(RiskTier::Low);
        assert_eq!(stats.critical_count, 2);
        assert_eq!(stats.low_count, 1);
        assert_eq!(stats.high_count, 0);
    }

    #[test]
    fn test_folder_stats_track_highest_risk() {
        let mut folder = FolderStats::default();
        folder.note_file(100);
        folder.note_file(200);
        assert_eq!(folder.file_count, 2);
        assert_eq!(folder.total_size, 300);
        assert!(!folder.has_sensitive);

        folder.note_sensitive(RiskTier::Low, 1);
        folder.note_sensitive(RiskTier::Critical, 12);
        folder.note_sensitive(RiskTier::Medium, 4);

        assert!(folder.has_sensitive);
        assert_eq!(folder.highest_risk, Some(RiskTier::Critical));
        assert_eq!(folder.total_entities, 17);
    }

    #[test]
    fn test_folder_path() {
        assert_eq!(folder_path("/data/reports/q3.txt"), "/data/reports");
        assert_eq!(folder_path("top.txt"), ".");
        assert_eq!(folder_path("/top.txt"), "/");
    }
}
