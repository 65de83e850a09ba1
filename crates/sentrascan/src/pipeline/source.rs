//! File listing and retrieval seam.
//!
//! Storage backends implement [`FileSource`]; the orchestrator consumes the
//! listing through a bounded channel so a slow pipeline throttles the lister
//! instead of buffering the whole tree in memory.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, warn};
use serde::Serialize;
use tokio::sync::mpsc;
use walkdir::WalkDir;

use crate::agent::ExposureLevel;
use crate::error::SourceError;

/// One listed file, with whatever context the backend can provide.
#[derive(Debug, Clone, Serialize)]
pub struct FileDescriptor {
    pub path: String,
    pub name: String,
    pub size: u64,
    pub modified: Option<DateTime<Utc>>,
    pub owner: Option<String>,
    pub exposure: Option<ExposureLevel>,
    pub adapter: String,
    /// Backend-native identifier, where the backend has one.
    pub item_id: Option<String>,
}

impl FileDescriptor {
    pub fn from_path(path: &Path, size: u64, modified: Option<DateTime<Utc>>) -> Self {
        Self {
            path: path.to_string_lossy().into_owned(),
            name: path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            size,
            modified,
            owner: None,
            exposure: None,
            adapter: "filesystem".to_string(),
            item_id: None,
        }
    }
}

/// A storage backend the scan pipeline can list and read files from.
///
/// Listing pushes into the provided bounded channel; a full channel suspends
/// the lister, which is the walk stage's backpressure boundary. Closing the
/// channel (by returning) signals exhaustion.
#[async_trait]
pub trait FileSource: Send + Sync {
    fn adapter_name(&self) -> &str;

    /// Whether descriptors from this source carry enough context for the
    /// inventory's content-hash delta check.
    fn supports_delta(&self) -> bool {
        true
    }

    async fn list_files(&self, tx: mpsc::Sender<FileDescriptor>) -> Result<(), SourceError>;

    async fn read_file(&self, descriptor: &FileDescriptor) -> Result<Vec<u8>, SourceError>;
}

fn stat_descriptor(path: &Path) -> Result<FileDescriptor, SourceError> {
    let meta = std::fs::metadata(path).map_err(|source| SourceError::Stat {
        path: path.to_path_buf(),
        source,
    })?;
    let modified = meta.modified().ok().map(DateTime::<Utc>::from);
    Ok(FileDescriptor::from_path(path, meta.len(), modified))
}

fn read_local(descriptor: &FileDescriptor) -> Result<Vec<u8>, SourceError> {
    let path = PathBuf::from(&descriptor.path);
    std::fs::read(&path).map_err(|source| SourceError::ReadFile { path, source })
}

/// Local directory tree source.
pub struct DirectorySource {
    root: PathBuf,
    recursive: bool,
    patterns: Vec<glob::Pattern>,
}

impl DirectorySource {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            recursive: true,
            patterns: Vec::new(),
        }
    }

    pub fn recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    /// Restricts the listing to file names matching any of the glob patterns.
    /// Invalid patterns are dropped with a warning.
    pub fn with_patterns<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.patterns = patterns
            .into_iter()
            .filter_map(|p| match glob::Pattern::new(p.as_ref()) {
                Ok(pattern) => Some(pattern),
                Err(e) => {
                    warn!("Ignoring invalid include pattern '{}': {}", p.as_ref(), e);
                    None
                }
            })
            .collect();
        self
    }

    fn matches(&self, name: &str) -> bool {
        self.patterns.is_empty() || self.patterns.iter().any(|p| p.matches(name))
    }
}

#[async_trait]
impl FileSource for DirectorySource {
    fn adapter_name(&self) -> &str {
        "filesystem"
    }

    async fn list_files(&self, tx: mpsc::Sender<FileDescriptor>) -> Result<(), SourceError> {
        if !self.root.exists() {
            return Err(SourceError::MissingTarget {
                path: self.root.clone(),
            });
        }

        let mut walker = WalkDir::new(&self.root).min_depth(1);
        if !self.recursive {
            walker = walker.max_depth(1);
        }

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Skipping unreadable entry under {}: {}", self.root.display(), e);
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy();
            if !self.matches(&name) {
                continue;
            }

            let descriptor = match stat_descriptor(entry.path()) {
                Ok(descriptor) => descriptor,
                Err(e) => {
                    warn!("Skipping unstatable file: {}", e);
                    continue;
                }
            };

            // Suspends here when the pipeline lags behind the lister
            if tx.send(descriptor).await.is_err() {
                debug!("Listing consumer dropped; stopping walk");
                break;
            }
        }

        Ok(())
    }

    async fn read_file(&self, descriptor: &FileDescriptor) -> Result<Vec<u8>, SourceError> {
        read_local(descriptor)
    }
}

/// Explicit path-list source, for callers that only hold raw paths.
///
/// Descriptors carry filesystem metadata but no ownership or exposure
/// context, and the source opts out of delta checks.
pub struct FileListSource {
    paths: Vec<PathBuf>,
}

impl FileListSource {
    pub fn new<I, P>(paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            paths: paths.into_iter().map(Into::into).collect(),
        }
    }
}

#[async_trait]
impl FileSource for FileListSource {
    fn adapter_name(&self) -> &str {
        "filesystem"
    }

    fn supports_delta(&self) -> bool {
        false
    }

    async fn list_files(&self, tx: mpsc::Sender<FileDescriptor>) -> Result<(), SourceError> {
        for path in &self.paths {
            let descriptor = match stat_descriptor(path) {
                Ok(descriptor) => descriptor,
                Err(e) => {
                    warn!("Skipping listed file: {}", e);
                    continue;
                }
            };
            if tx.send(descriptor).await.is_err() {
                debug!("Listing consumer dropped; stopping list");
                break;
            }
        }
        Ok(())
    }

    async fn read_file(&self, descriptor: &FileDescriptor) -> Result<Vec<u8>, SourceError> {
        read_local(descriptor)
    }
}
