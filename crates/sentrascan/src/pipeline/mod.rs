//! The scan pipeline: walk, extract/chunk/submit, collect/aggregate,
//! persist. Built around one [`AgentPool`](crate::agent::AgentPool).

pub mod config;
pub mod extract;
pub mod inventory;
pub mod notify;
pub mod orchestrator;
pub mod score;
pub mod source;
pub mod stats;
pub mod store;

pub use config::ScanConfig;
pub use extract::{ChunkerConfig, TextChunker, TextExtractor, Utf8Extractor};
pub use inventory::{InventoryService, MemoryInventory, ScanDecision};
pub use notify::{ScanEvent, ScanEventBroadcaster};
pub use orchestrator::{ScanOrchestrator, ScanReport};
pub use score::{assess_risk, RiskAssessment, RiskTier};
pub use source::{DirectorySource, FileDescriptor, FileListSource, FileSource};
pub use stats::{folder_path, FolderStats, ScanMode, ScanStats};
pub use store::{JobProgress, MemoryStore, ScanRecord, ScanStore};
