pub mod agent;
pub mod detect;
pub mod error;
pub mod pipeline;

pub use agent::{
    AgentPool, AgentPoolConfig, AgentResult, ExposureLevel, FileResult, HealthSnapshot, PoolState,
    PoolStats, WorkItem, WorkMetadata,
};
pub use detect::{DetectedEntity, DetectorBackend, EngineConfig, EntityDetector, PatternDetector};
pub use error::{
    DetectError, ExtractError, PersistError, PoolError, Result, ScanError, SourceError,
};
pub use pipeline::{
    DirectorySource, FileDescriptor, FileListSource, FileSource, InventoryService, RiskTier,
    ScanConfig, ScanEventBroadcaster, ScanOrchestrator, ScanRecord, ScanReport, ScanStats,
    ScanStore,
};
