//! Entity detection seam.
//!
//! The classification engine proper is a collaborator; agents only see the
//! [`EntityDetector`] trait. The pattern backend ships in-crate so the
//! pipeline is runnable without an external model.

pub mod patterns;

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::DetectError;

pub use patterns::PatternDetector;

/// One detected entity occurrence inside a chunk of text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectedEntity {
    /// Canonical entity type, e.g. "EMAIL" or "SSN".
    pub entity_type: String,
    /// Byte offset of the match start within the chunk.
    pub start: usize,
    /// Byte offset one past the match end.
    pub end: usize,
    /// Detector confidence in [0, 1].
    pub confidence: f32,
}

/// Which classification backend an agent loads at startup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectorBackend {
    /// Regex rule set, no model files required.
    #[default]
    Pattern,
    /// Optimized model inference. Requires a model path; not available in
    /// this build, kept so configurations carrying it fail loudly.
    Onnx,
}

impl std::fmt::Display for DetectorBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DetectorBackend::Pattern => write!(f, "pattern"),
            DetectorBackend::Onnx => write!(f, "onnx"),
        }
    }
}

/// Opaque initialization hook for the per-agent classification engine.
///
/// Construction cost (rule compilation, model load) is paid once per agent
/// at pool start.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub backend: DetectorBackend,
    /// Path to an optimized model, for backends that need one.
    #[serde(default)]
    pub model_path: Option<PathBuf>,
    /// Target inference device, e.g. "cpu".
    #[serde(default = "default_device")]
    pub device: String,
}

fn default_device() -> String {
    "cpu".to_string()
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            backend: DetectorBackend::Pattern,
            model_path: None,
            device: default_device(),
        }
    }
}

/// Runs classification over one chunk of text.
///
/// Implementations are owned by exactly one agent thread and must not share
/// mutable state with other agents.
pub trait EntityDetector: Send {
    fn detect(&self, text: &str) -> std::result::Result<Vec<DetectedEntity>, DetectError>;
}

/// Builds the detector for one agent from its engine configuration.
pub fn build_detector(
    config: &EngineConfig,
) -> std::result::Result<Box<dyn EntityDetector>, DetectError> {
    match config.backend {
        DetectorBackend::Pattern => Ok(Box::new(PatternDetector::with_default_rules()?)),
        DetectorBackend::Onnx => Err(DetectError::UnsupportedBackend {
            backend: config.backend.to_string(),
        }),
    }
}

/// Creates one detector per agent at pool start.
///
/// The production provider wraps [`build_detector`]; tests inject their own.
pub trait DetectorProvider: Send + Sync {
    fn create(&self) -> std::result::Result<Box<dyn EntityDetector>, DetectError>;
}

/// Provider backed by an [`EngineConfig`].
pub struct EngineDetectorProvider {
    config: EngineConfig,
}

impl EngineDetectorProvider {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }
}

impl DetectorProvider for EngineDetectorProvider {
    fn create(&self) -> std::result::Result<Box<dyn EntityDetector>, DetectError> {
        build_detector(&self.config)
    }
}
