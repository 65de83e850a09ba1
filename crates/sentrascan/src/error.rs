use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("Pool error: {0}")]
    Pool(#[from] PoolError),

    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    #[error("Extraction error: {0}")]
    Extract(#[from] ExtractError),

    #[error("Detection error: {0}")]
    Detect(#[from] DetectError),

    #[error("Persistence error: {0}")]
    Persist(#[from] PersistError),
}

#[derive(Error, Debug)]
pub enum PoolError {
    #[error("Operation requires pool state '{expected}', but pool is '{actual}'")]
    InvalidState {
        expected: &'static str,
        actual: String,
    },

    #[error("Failed to spawn agent {id}: {source}")]
    SpawnFailed {
        id: usize,
        #[source]
        source: std::io::Error,
    },

    #[error("Agent channel closed unexpectedly")]
    ChannelClosed,
}

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("Target path does not exist: {path}")]
    MissingTarget { path: PathBuf },

    #[error("Failed to read file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to stat '{path}': {source}")]
    Stat {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Directory walk failed under '{path}': {source}")]
    Walk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    #[error("File listing channel closed before the source was exhausted")]
    ChannelClosed,
}

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("Undecodable content in '{path}': {reason}")]
    Undecodable { path: String, reason: String },
}

#[derive(Error, Debug)]
pub enum DetectError {
    #[error("Invalid detection rule '{rule}': {source}")]
    InvalidRule {
        rule: String,
        #[source]
        source: regex::Error,
    },

    #[error("Detection backend '{backend}' is not available in this build")]
    UnsupportedBackend { backend: String },

    #[error("Detection failed: {0}")]
    Failed(String),
}

#[derive(Error, Debug)]
pub enum PersistError {
    #[error("Failed to persist record for '{path}': {reason}")]
    Record { path: String, reason: String },

    #[error("Commit failed: {0}")]
    Commit(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

pub type Result<T> = std::result::Result<T, ScanError>;
