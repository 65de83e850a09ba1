//! Text extraction and chunking.
//!
//! Extraction turns raw adapter bytes into text; chunking splits that text
//! into bounded pieces so one oversized document cannot pin an agent. Chunk
//! order is preserved but the pipeline never depends on it.

use serde::{Deserialize, Serialize};

use crate::error::ExtractError;

/// Converts raw file bytes into extractable text.
pub trait TextExtractor: Send + Sync {
    fn extract_text(&self, content: &[u8], path: &str) -> Result<String, ExtractError>;
}

/// Plain-text extraction with lossy UTF-8 decoding.
///
/// Binary-heavy content is rejected rather than scanned as mojibake.
pub struct Utf8Extractor {
    /// Replacement-character share above which content is considered binary.
    max_replacement_ratio: f32,
}

impl Default for Utf8Extractor {
    fn default() -> Self {
        Self {
            max_replacement_ratio: 0.10,
        }
    }
}

impl TextExtractor for Utf8Extractor {
    fn extract_text(&self, content: &[u8], path: &str) -> Result<String, ExtractError> {
        let text = String::from_utf8_lossy(content);
        let total = text.chars().count();
        if total > 0 {
            let replaced = text.chars().filter(|c| *c == char::REPLACEMENT_CHARACTER).count();
            if replaced as f32 / total as f32 > self.max_replacement_ratio {
                return Err(ExtractError::Undecodable {
                    path: path.to_string(),
                    reason: format!(
                        "{replaced} of {total} characters undecodable, content looks binary"
                    ),
                });
            }
        }
        Ok(text.into_owned())
    }
}

/// Chunker settings, serde-loadable alongside the scan configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkerConfig {
    /// Upper bound on characters per chunk.
    #[serde(default = "default_max_chars")]
    pub max_chars: usize,
    /// Characters of context repeated from the previous chunk, so entities
    /// spanning a boundary are still seen whole by one agent.
    #[serde(default = "default_overlap")]
    pub overlap: usize,
}

fn default_max_chars() -> usize {
    4000
}

fn default_overlap() -> usize {
    200
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            max_chars: default_max_chars(),
            overlap: default_overlap(),
        }
    }
}

/// Splits one text blob into an ordered sequence of bounded chunks.
pub struct TextChunker {
    max_chars: usize,
    overlap: usize,
}

impl TextChunker {
    pub fn new(config: &ChunkerConfig) -> Self {
        let max_chars = config.max_chars.max(1);
        Self {
            max_chars,
            // Overlap below max_chars keeps the cursor advancing
            overlap: config.overlap.min(max_chars.saturating_sub(1)),
        }
    }

    /// Produces at least one chunk for any non-empty text.
    ///
    /// Splits prefer the last whitespace in the window (when past the halfway
    /// point) so words stay intact.
    pub fn chunk(&self, text: &str) -> Vec<String> {
        if text.is_empty() {
            return Vec::new();
        }

        let chars: Vec<(usize, char)> = text.char_indices().collect();
        if chars.len() <= self.max_chars {
            return vec![text.to_string()];
        }

        let mut chunks = Vec::new();
        let mut start = 0usize;
        loop {
            let window_end = (start + self.max_chars).min(chars.len());
            let mut split = window_end;
            if window_end < chars.len() {
                if let Some(ws) = chars[start..window_end]
                    .iter()
                    .rposition(|(_, c)| c.is_whitespace())
                {
                    if ws > self.max_chars / 2 {
                        split = start + ws + 1;
                    }
                }
            }

            let byte_start = chars[start].0;
            let byte_end = if split < chars.len() {
                chars[split].0
            } else {
                text.len()
            };
            chunks.push(text[byte_start..byte_end].to_string());

            if split >= chars.len() {
                break;
            }
            start = split.saturating_sub(self.overlap).max(start + 1);
        }

        chunks
    }
}

impl Default for TextChunker {
    fn default() -> Self {
        Self::new(&ChunkerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunker(max_chars: usize, overlap: usize) -> TextChunker {
        TextChunker::new(&ChunkerConfig { max_chars, overlap })
    }

    #[test]
    fn test_extract_plain_text() {
        let text = Utf8Extractor::default()
            .extract_text(b"hello world", "/a.txt")
            .unwrap();
        assert_eq!(text, "hello world");
    }

    #[test]
    fn test_extract_rejects_binary() {
        let mut content = vec![0xFFu8; 200];
        content.extend_from_slice(b"tail");
        let err = Utf8Extractor::default()
            .extract_text(&content, "/a.bin")
            .unwrap_err();
        assert!(matches!(err, ExtractError::Undecodable { .. }));
    }

    #[test]
    fn test_extract_tolerates_sparse_invalid_bytes() {
        let mut content = b"mostly readable text with one stray byte ".to_vec();
        content.push(0xFF);
        content.extend_from_slice(b" and plenty more clean text after it");
        let text = Utf8Extractor::default()
            .extract_text(&content, "/a.txt")
            .unwrap();
        assert!(text.contains("mostly readable"));
    }

    #[test]
    fn test_short_text_is_one_chunk() {
        let chunks = chunker(100, 10).chunk("short text");
        assert_eq!(chunks, vec!["short text"]);
    }

    #[test]
    fn test_empty_text_has_no_chunks() {
        assert!(chunker(100, 10).chunk("").is_empty());
    }

    #[test]
    fn test_chunks_respect_max_chars() {
        let text = "word ".repeat(500);
        let chunks = chunker(64, 8).chunk(&text);
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 64);
        }
    }

    #[test]
    fn test_chunks_split_at_whitespace() {
        let text = "alpha beta gamma delta epsilon zeta eta theta".repeat(10);
        let chunks = chunker(40, 0).chunk(&text);
        for chunk in &chunks[..chunks.len() - 1] {
            assert!(chunk.ends_with(' '), "chunk {:?} split mid-word", chunk);
        }
    }

    #[test]
    fn test_overlap_repeats_context() {
        let text = "a".repeat(50) + " " + &"b".repeat(100);
        let chunks = chunker(60, 10).chunk(&text);
        assert!(chunks.len() >= 2);
        let first_tail: String = chunks[0].chars().rev().take(5).collect();
        assert!(chunks[1].contains(&first_tail.chars().rev().collect::<String>()));
    }

    #[test]
    fn test_multibyte_text_splits_on_char_boundaries() {
        let text = "héllö wörld ".repeat(100);
        let chunks = chunker(32, 4).chunk(&text);
        // Reassembly would be garbled if any slice broke a code point
        assert!(chunks.iter().all(|c| !c.is_empty()));
    }

    #[test]
    fn test_unbroken_text_still_chunks() {
        let text = "x".repeat(1000);
        let chunks = chunker(100, 0).chunk(&text);
        assert_eq!(chunks.len(), 10);
        assert!(chunks.iter().all(|c| c.chars().count() == 100));
    }
}
