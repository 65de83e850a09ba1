//! Regex rule detector.
//!
//! A small representative rule set; production deployments swap in their own
//! rules or a model backend via [`EngineConfig`](super::EngineConfig).

use regex::Regex;

use crate::error::DetectError;

use super::{DetectedEntity, EntityDetector};

struct PatternRule {
    entity_type: &'static str,
    regex: Regex,
    confidence: f32,
}

pub struct PatternDetector {
    rules: Vec<PatternRule>,
}

/// (entity type, pattern, confidence)
const DEFAULT_RULES: &[(&str, &str, f32)] = &[
    (
        "EMAIL",
        r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}",
        0.95,
    ),
    ("SSN", r"\b\d{3}-\d{2}-\d{4}\b", 0.90),
    (
        "CREDIT_CARD",
        r"\b\d{4}[ -]\d{4}[ -]\d{4}[ -]\d{4}\b",
        0.80,
    ),
    (
        "PHONE",
        r"\b\(\d{3}\) ?\d{3}-\d{4}\b|\b\d{3}-\d{3}-\d{4}\b",
        0.70,
    ),
    ("IP_ADDRESS", r"\b(?:\d{1,3}\.){3}\d{1,3}\b", 0.85),
    ("API_KEY", r"\b(?:sk|pk|api|key)[-_][A-Za-z0-9]{16,}\b", 0.75),
];

impl PatternDetector {
    pub fn with_default_rules() -> Result<Self, DetectError> {
        Self::from_rules(DEFAULT_RULES)
    }

    pub fn from_rules(rules: &[(&'static str, &str, f32)]) -> Result<Self, DetectError> {
        let mut compiled = Vec::with_capacity(rules.len());
        for (entity_type, pattern, confidence) in rules {
            let regex = Regex::new(pattern).map_err(|source| DetectError::InvalidRule {
                rule: (*entity_type).to_string(),
                source,
            })?;
            compiled.push(PatternRule {
                entity_type,
                regex,
                confidence: *confidence,
            });
        }
        Ok(Self { rules: compiled })
    }
}

impl EntityDetector for PatternDetector {
    fn detect(&self, text: &str) -> Result<Vec<DetectedEntity>, DetectError> {
        let mut entities = Vec::new();
        for rule in &self.rules {
            for m in rule.regex.find_iter(text) {
                entities.push(DetectedEntity {
                    entity_type: rule.entity_type.to_string(),
                    start: m.start(),
                    end: m.end(),
                    confidence: rule.confidence,
                });
            }
        }
        // Stable order for aggregation-independent consumers
        entities.sort_by_key(|e| e.start);
        Ok(entities)
    }
}
