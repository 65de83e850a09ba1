pub mod pool;
pub mod work;
pub mod worker;

pub use pool::{
    AgentPool, AgentPoolConfig, BatchStream, HealthSnapshot, PoolState, PoolStats, ResultStream,
};
pub use work::{AgentResult, ExposureLevel, FileResult, WorkItem, WorkMetadata};
pub use worker::AgentMessage;
