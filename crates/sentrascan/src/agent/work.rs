use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::detect::DetectedEntity;

/// How broadly a file is accessible, as reported by the source adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExposureLevel {
    Private,
    Internal,
    OrgWide,
    Public,
}

impl ExposureLevel {
    /// Parses adapter-provided strings; unknown values map to `None` and are
    /// treated as private downstream.
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_uppercase().as_str() {
            "PRIVATE" => Some(ExposureLevel::Private),
            "INTERNAL" => Some(ExposureLevel::Internal),
            "ORG_WIDE" => Some(ExposureLevel::OrgWide),
            "PUBLIC" => Some(ExposureLevel::Public),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ExposureLevel::Private => "PRIVATE",
            ExposureLevel::Internal => "INTERNAL",
            ExposureLevel::OrgWide => "ORG_WIDE",
            ExposureLevel::Public => "PUBLIC",
        }
    }
}

impl std::fmt::Display for ExposureLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Adapter-provided context attached to a work item at submission time.
///
/// Read-only once attached; agents carry it through untouched so the
/// collector can score and persist without re-querying the adapter.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkMetadata {
    pub exposure: Option<ExposureLevel>,
    pub owner: Option<String>,
    pub adapter: Option<String>,
    pub item_id: Option<String>,
    pub content_hash: Option<String>,
}

/// One chunk of extractable text submitted for classification.
///
/// Created by the extraction stage, consumed exactly once by exactly one
/// agent, never mutated after creation.
#[derive(Debug, Clone)]
pub struct WorkItem {
    /// Unique per chunk: `<file_path>:<chunk_index>`.
    pub id: String,
    pub file_path: String,
    pub text: String,
    pub chunk_index: usize,
    /// Fixed at submission time; the aggregator waits for exactly this many
    /// chunk results.
    pub total_chunks: usize,
    pub metadata: WorkMetadata,
}

impl WorkItem {
    pub fn new(
        file_path: impl Into<String>,
        text: impl Into<String>,
        chunk_index: usize,
        total_chunks: usize,
        metadata: WorkMetadata,
    ) -> Self {
        let file_path = file_path.into();
        Self {
            id: format!("{file_path}:{chunk_index}"),
            file_path,
            text: text.into(),
            chunk_index,
            total_chunks,
            metadata,
        }
    }
}

/// One chunk's classification outcome.
#[derive(Debug, Clone)]
pub struct AgentResult {
    pub file_path: String,
    pub chunk_index: usize,
    pub entities: Vec<DetectedEntity>,
    /// Wall time the agent spent on this chunk.
    pub processing_ms: f64,
    /// Non-`None` means the chunk failed but still counts toward completion.
    pub error: Option<String>,
}

impl AgentResult {
    pub fn failed(item: &WorkItem, error: impl Into<String>, processing_ms: f64) -> Self {
        Self {
            file_path: item.file_path.clone(),
            chunk_index: item.chunk_index,
            entities: Vec::new(),
            processing_ms,
            error: Some(error.into()),
        }
    }
}

/// Aggregated result for a complete file, built once all expected chunks
/// have arrived.
#[derive(Debug, Clone, Serialize)]
pub struct FileResult {
    pub file_path: String,
    pub entity_counts: HashMap<String, usize>,
    pub total_entities: usize,
    pub total_processing_ms: f64,
    /// Number of chunk results actually received.
    pub chunk_count: usize,
    pub errors: Vec<String>,
}

impl FileResult {
    /// Folds a file's chunk results into one file-level outcome.
    ///
    /// Commutative count/sum: arrival order of chunks does not matter.
    pub fn aggregate(file_path: impl Into<String>, chunks: &[AgentResult]) -> Self {
        let mut entity_counts: HashMap<String, usize> = HashMap::new();
        let mut total_processing_ms = 0.0;
        let mut errors = Vec::new();

        for chunk in chunks {
            total_processing_ms += chunk.processing_ms;
            if let Some(err) = &chunk.error {
                errors.push(format!("Chunk {}: {}", chunk.chunk_index, err));
            }
            for entity in &chunk.entities {
                *entity_counts.entry(entity.entity_type.clone()).or_insert(0) += 1;
            }
        }

        let total_entities = entity_counts.values().sum();

        Self {
            file_path: file_path.into(),
            entity_counts,
            total_entities,
            total_processing_ms,
            chunk_count: chunks.len(),
            errors,
        }
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entity(entity_type: &str) -> DetectedEntity {
        DetectedEntity {
            entity_type: entity_type.to_string(),
            start: 0,
            end: 1,
            confidence: 0.9,
        }
    }

    fn chunk_result(path: &str, index: usize, entities: Vec<DetectedEntity>) -> AgentResult {
        AgentResult {
            file_path: path.to_string(),
            chunk_index: index,
            entities,
            processing_ms: 10.0,
            error: None,
        }
    }

    #[test]
    fn test_work_item_id_format() {
        let item = WorkItem::new("/data/report.txt", "text", 2, 5, WorkMetadata::default());
        assert_eq!(item.id, "/data/report.txt:2");
        assert_eq!(item.total_chunks, 5);
    }

    #[test]
    fn test_exposure_parse() {
        assert_eq!(ExposureLevel::parse("public"), Some(ExposureLevel::Public));
        assert_eq!(
            ExposureLevel::parse("ORG_WIDE"),
            Some(ExposureLevel::OrgWide)
        );
        assert_eq!(ExposureLevel::parse("sharedish"), None);
    }

    #[test]
    fn test_aggregate_sums_entities_and_time() {
        let chunks = vec![
            chunk_result("/f", 0, vec![entity("EMAIL"), entity("EMAIL")]),
            chunk_result("/f", 1, vec![entity("SSN")]),
        ];
        let result = FileResult::aggregate("/f", &chunks);
        assert_eq!(result.total_entities, 3);
        assert_eq!(result.entity_counts["EMAIL"], 2);
        assert_eq!(result.entity_counts["SSN"], 1);
        assert_eq!(result.chunk_count, 2);
        assert!((result.total_processing_ms - 20.0).abs() < f64::EPSILON);
        assert!(!result.has_errors());
    }

    #[test]
    fn test_aggregate_is_order_independent() {
        let mut chunks = vec![
            chunk_result("/f", 0, vec![entity("EMAIL")]),
            chunk_result("/f", 1, vec![entity("SSN")]),
            chunk_result("/f", 2, vec![entity("PHONE")]),
        ];
        let forward = FileResult::aggregate("/f", &chunks);
        chunks.reverse();
        let backward = FileResult::aggregate("/f", &chunks);
        assert_eq!(forward.entity_counts, backward.entity_counts);
        assert_eq!(forward.total_entities, backward.total_entities);
    }

    #[test]
    fn test_aggregate_collects_chunk_errors() {
        let item = WorkItem::new("/f", "", 0, 3, WorkMetadata::default());
        let chunks = vec![
            AgentResult::failed(&item, "engine exploded", 1.0),
            chunk_result("/f", 1, vec![entity("EMAIL")]),
        ];
        let result = FileResult::aggregate("/f", &chunks);
        assert_eq!(result.errors, vec!["Chunk 0: engine exploded"]);
        assert!(result.has_errors());
        assert_eq!(result.total_entities, 1);
        assert_eq!(result.chunk_count, 2);
    }
}
