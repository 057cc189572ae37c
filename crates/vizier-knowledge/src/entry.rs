//! Knowledge base entry types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Where a mapping came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MappingSource {
    /// Reused from a stored knowledge base entry
    KnowledgeBase,
    /// Proposed by the language model
    ModelInferred,
    /// Asserted by a user; always wins
    UserOverride,
}

impl MappingSource {
    /// Stable lowercase name
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::KnowledgeBase => "knowledge_base",
            Self::ModelInferred => "model_inferred",
            Self::UserOverride => "user_override",
        }
    }
}

impl std::fmt::Display for MappingSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A learned technical-name to business-label mapping
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeBaseEntry {
    /// Normalized technical name this entry is keyed by
    pub technical_pattern: String,
    /// Human-meaningful label
    pub business_label: String,
    /// Trust in the label, in `[0, 1]`
    pub confidence: f64,
    /// Number of observations that confirmed this label
    pub hit_count: u64,
    /// Origin of the current label
    pub source: MappingSource,
    /// Last time the entry changed
    pub updated_at: DateTime<Utc>,
}

impl KnowledgeBaseEntry {
    /// Create a fresh entry with a single hit
    #[must_use]
    pub fn new(
        technical_pattern: impl Into<String>,
        business_label: impl Into<String>,
        confidence: f64,
        source: MappingSource,
    ) -> Self {
        Self {
            technical_pattern: technical_pattern.into(),
            business_label: business_label.into(),
            confidence: confidence.clamp(0.0, 1.0),
            hit_count: 1,
            source,
            updated_at: Utc::now(),
        }
    }

    /// Whether `label` names the same business entity (case-insensitive)
    #[inline]
    #[must_use]
    pub fn has_label(&self, label: &str) -> bool {
        self.business_label.trim().eq_ignore_ascii_case(label.trim())
    }
}
