//! Conflict resolution for knowledge base updates
//!
//! The rule, in priority order:
//!
//! 1. a `user_override` observation always wins and resets confidence to 1.0
//! 2. non-override observations below [`MergePolicy::min_confidence`] are ignored
//! 3. an observation agreeing with the stored label reinforces it
//! 4. a disagreeing observation replaces the label only with strictly higher
//!    confidence, and never replaces a user override
//!
//! Merging is a pure function so the rule can be tested without storage.

use crate::entry::{KnowledgeBaseEntry, MappingSource};
use crate::normalize::NormalizedKey;
use chrono::{DateTime, Utc};

/// Tunables for [`merge`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MergePolicy {
    /// Minimum confidence for a non-override observation to be stored
    pub min_confidence: f64,
    /// Confidence added when an observation confirms the stored label
    pub reinforcement: f64,
    /// Confidence step applied by explicit user feedback
    pub feedback_step: f64,
    /// Confidence never drops below this through negative feedback
    pub feedback_floor: f64,
    /// Confidence assigned to a label first introduced by positive feedback
    pub feedback_initial: f64,
}

impl MergePolicy {
    /// With minimum accepted confidence
    #[inline]
    #[must_use]
    pub fn with_min_confidence(mut self, min_confidence: f64) -> Self {
        self.min_confidence = min_confidence;
        self
    }
}

impl Default for MergePolicy {
    fn default() -> Self {
        Self {
            min_confidence: 0.6,
            reinforcement: 0.05,
            feedback_step: 0.1,
            feedback_floor: 0.1,
            feedback_initial: 0.6,
        }
    }
}

/// A single piece of evidence about a column's business meaning
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    /// Proposed label
    pub business_label: String,
    /// Confidence attached to the proposal
    pub confidence: f64,
    /// Who proposed it
    pub source: MappingSource,
}

impl Observation {
    /// Create an observation, clamping confidence into `[0, 1]`
    #[must_use]
    pub fn new(business_label: impl Into<String>, confidence: f64, source: MappingSource) -> Self {
        Self {
            business_label: business_label.into(),
            confidence: if confidence.is_nan() {
                0.0
            } else {
                confidence.clamp(0.0, 1.0)
            },
            source,
        }
    }
}

/// Result of applying an observation to the stored state
#[derive(Debug, Clone, PartialEq)]
pub enum MergeOutcome {
    /// No prior entry; a new one was created
    Inserted(KnowledgeBaseEntry),
    /// Observation agreed with the stored label
    Reinforced(KnowledgeBaseEntry),
    /// Observation carried a better label
    Replaced {
        /// Entry after replacement
        entry: KnowledgeBaseEntry,
        /// Label that was displaced
        previous_label: String,
    },
    /// User override applied
    Overridden(KnowledgeBaseEntry),
    /// User feedback moved the stored confidence
    Adjusted(KnowledgeBaseEntry),
    /// Stored entry kept as is
    Retained(KnowledgeBaseEntry),
    /// Observation ignored and nothing stored
    Rejected,
}

impl MergeOutcome {
    /// Entry that is current after the merge, if any
    #[must_use]
    pub fn entry(&self) -> Option<&KnowledgeBaseEntry> {
        match self {
            Self::Inserted(e)
            | Self::Reinforced(e)
            | Self::Overridden(e)
            | Self::Adjusted(e)
            | Self::Retained(e) => Some(e),
            Self::Replaced { entry, .. } => Some(entry),
            Self::Rejected => None,
        }
    }

    /// Whether the stored state must be written
    #[inline]
    #[must_use]
    pub fn changed(&self) -> bool {
        !matches!(self, Self::Retained(_) | Self::Rejected)
    }

    /// Short name for logging
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Inserted(_) => "inserted",
            Self::Reinforced(_) => "reinforced",
            Self::Replaced { .. } => "replaced",
            Self::Overridden(_) => "overridden",
            Self::Adjusted(_) => "adjusted",
            Self::Retained(_) => "retained",
            Self::Rejected => "rejected",
        }
    }
}

/// Apply `observation` to the `existing` entry for `key`
#[must_use]
pub fn merge(
    existing: Option<&KnowledgeBaseEntry>,
    key: &NormalizedKey,
    observation: &Observation,
    policy: &MergePolicy,
    now: DateTime<Utc>,
) -> MergeOutcome {
    if observation.source == MappingSource::UserOverride {
        let hit_count = existing.map_or(1, |e| e.hit_count.saturating_add(1));
        return MergeOutcome::Overridden(KnowledgeBaseEntry {
            technical_pattern: key.as_str().to_string(),
            business_label: observation.business_label.trim().to_string(),
            confidence: 1.0,
            hit_count,
            source: MappingSource::UserOverride,
            updated_at: now,
        });
    }

    if observation.confidence < policy.min_confidence || observation.business_label.trim().is_empty() {
        return existing.map_or(MergeOutcome::Rejected, |e| MergeOutcome::Retained(e.clone()));
    }

    let Some(current) = existing else {
        return MergeOutcome::Inserted(KnowledgeBaseEntry {
            technical_pattern: key.as_str().to_string(),
            business_label: observation.business_label.trim().to_string(),
            confidence: observation.confidence,
            hit_count: 1,
            source: observation.source,
            updated_at: now,
        });
    };

    if current.has_label(&observation.business_label) {
        let mut entry = current.clone();
        entry.confidence = (current.confidence.max(observation.confidence) + policy.reinforcement).min(1.0);
        entry.hit_count = current.hit_count.saturating_add(1);
        entry.updated_at = now;
        return MergeOutcome::Reinforced(entry);
    }

    if current.source == MappingSource::UserOverride || current.confidence >= observation.confidence {
        return MergeOutcome::Retained(current.clone());
    }

    MergeOutcome::Replaced {
        entry: KnowledgeBaseEntry {
            technical_pattern: key.as_str().to_string(),
            business_label: observation.business_label.trim().to_string(),
            confidence: observation.confidence,
            hit_count: 1,
            source: observation.source,
            updated_at: now,
        },
        previous_label: current.business_label.clone(),
    }
}

/// Apply explicit user feedback about `label` to the `existing` entry
///
/// Positive feedback on the stored label raises its confidence; negative
/// feedback lowers it (never below the floor). Positive feedback on a new
/// label is an ordinary observation at the policy's initial confidence.
#[must_use]
pub fn apply_feedback(
    existing: Option<&KnowledgeBaseEntry>,
    key: &NormalizedKey,
    label: &str,
    positive: bool,
    policy: &MergePolicy,
    now: DateTime<Utc>,
) -> MergeOutcome {
    match existing {
        Some(current) if current.has_label(label) => {
            let mut entry = current.clone();
            entry.confidence = if positive {
                (current.confidence + policy.feedback_step).min(1.0)
            } else {
                (current.confidence - policy.feedback_step).max(policy.feedback_floor)
            };
            entry.hit_count = current.hit_count.saturating_add(1);
            entry.updated_at = now;
            MergeOutcome::Adjusted(entry)
        }
        _ if positive => {
            let observation = Observation::new(label, policy.feedback_initial, MappingSource::ModelInferred);
            let relaxed = policy.with_min_confidence(policy.min_confidence.min(policy.feedback_initial));
            merge(existing, key, &observation, &relaxed, now)
        }
        Some(current) => MergeOutcome::Retained(current.clone()),
        None => MergeOutcome::Rejected,
    }
}
