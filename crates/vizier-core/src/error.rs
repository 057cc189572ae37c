//! Error types for the Vizier pipeline
//!
//! Component errors are classified at the orchestrator boundary into a
//! [`PipelineFailure`]: a stable `kind` plus a human-readable message.
//! Raw internal errors never cross that boundary.

use crate::session::PipelineState;
use serde::{Deserialize, Serialize};
use std::fmt;
use vizier_knowledge::KnowledgeError;
use vizier_llm::ModelError;
use vizier_plan::{ExecutionError, PlanError, VocabularyError};

/// Schema mapping failure
///
/// Model problems never surface here; they degrade individual columns.
#[derive(Debug, thiserror::Error)]
pub enum MappingError {
    /// Knowledge base read or write failed
    #[error("knowledge base unavailable: {0}")]
    Knowledge(#[from] KnowledgeError),
}

/// Model output rejected as an operation plan
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PlanValidationError {
    /// Output is not JSON of the expected shape
    #[error("response is not a plan: {0}")]
    Malformed(String),

    /// Step names an operation outside the vocabulary
    #[error("unknown operation '{0}'")]
    UnknownOperation(String),

    /// Step lacks a required field
    #[error("{operation} step is missing '{field}'")]
    MissingField {
        /// Operation name
        operation: String,
        /// Field name
        field: &'static str,
    },

    /// Reference matches no column or business label
    #[error("'{0}' does not match any column or business label")]
    UnknownColumn(String),

    /// Function, predicate, direction or chart type outside the vocabulary
    #[error(transparent)]
    Vocabulary(#[from] VocabularyError),

    /// Plan structure is invalid
    #[error(transparent)]
    Structure(#[from] PlanError),
}

/// Requirement interpretation failed after all correction attempts
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum InterpretError {
    /// Last model output was not a valid plan
    #[error("no valid plan after {attempts} attempt(s): {source}")]
    Invalid {
        /// Model calls made
        attempts: u32,
        /// Last validation failure
        #[source]
        source: PlanValidationError,
    },

    /// Last model call failed
    #[error("model unavailable after {attempts} attempt(s): {source}")]
    Model {
        /// Model calls made
        attempts: u32,
        /// Last model failure
        #[source]
        source: ModelError,
    },
}

/// Any failure that ends a pipeline run
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// File identifier has no registered dataset
    #[error("no dataset registered for file '{0}'")]
    DatasetNotFound(String),

    /// Schema mapping failed
    #[error(transparent)]
    Mapping(#[from] MappingError),

    /// Interpretation failed
    #[error(transparent)]
    Interpret(#[from] InterpretError),

    /// Execution failed
    #[error(transparent)]
    Execution(#[from] ExecutionError),

    /// QA kept rejecting results until retries ran out
    #[error("result rejected after {attempts} attempt(s): {reason}")]
    QaRejected {
        /// Interpretations tried
        attempts: u32,
        /// Last QA reason
        reason: String,
    },

    /// Internal invariant broken
    #[error("internal error: {0}")]
    Internal(&'static str),

    /// State machine violation
    #[error("illegal transition {from:?} -> {to:?}")]
    IllegalTransition {
        /// Current state
        from: PipelineState,
        /// Requested state
        to: PipelineState,
    },
}

impl PipelineError {
    /// Boundary classification
    #[must_use]
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::DatasetNotFound(_) => FailureKind::DatasetNotFound,
            Self::Mapping(MappingError::Knowledge(_)) => FailureKind::KnowledgeBase,
            Self::Interpret(InterpretError::Invalid { .. }) => FailureKind::PlanValidation,
            Self::Interpret(InterpretError::Model { source, .. }) if source.is_timeout() => FailureKind::ModelTimeout,
            Self::Interpret(InterpretError::Model { .. }) => FailureKind::ModelUnavailable,
            Self::Execution(ExecutionError::TypeMismatch { .. }) => FailureKind::TypeMismatch,
            Self::Execution(ExecutionError::ChartBinding { .. }) => FailureKind::ChartBinding,
            Self::Execution(ExecutionError::UnknownColumn { .. } | ExecutionError::InvalidPlan(_)) => {
                FailureKind::PlanValidation
            }
            Self::QaRejected { .. } => FailureKind::QaRejected,
            Self::Internal(_) | Self::IllegalTransition { .. } => FailureKind::Internal,
        }
    }
}

/// Stable failure category shown to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Unknown file identifier
    DatasetNotFound,
    /// Knowledge base I/O failed
    KnowledgeBase,
    /// No valid operation plan could be produced
    PlanValidation,
    /// Language model timed out
    ModelTimeout,
    /// Language model failed
    ModelUnavailable,
    /// Plan applied an operation to an incompatible column
    TypeMismatch,
    /// Chart axes incompatible with the result
    ChartBinding,
    /// QA rejected every attempt
    QaRejected,
    /// Internal invariant violated
    Internal,
}

impl FailureKind {
    /// snake_case name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::DatasetNotFound => "dataset_not_found",
            Self::KnowledgeBase => "knowledge_base",
            Self::PlanValidation => "plan_validation",
            Self::ModelTimeout => "model_timeout",
            Self::ModelUnavailable => "model_unavailable",
            Self::TypeMismatch => "type_mismatch",
            Self::ChartBinding => "chart_binding",
            Self::QaRejected => "qa_rejected",
            Self::Internal => "internal",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured error returned to callers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct PipelineFailure {
    /// Category
    pub kind: FailureKind,
    /// Human-readable reason
    pub message: String,
}

impl From<&PipelineError> for PipelineFailure {
    fn from(err: &PipelineError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

impl From<PipelineError> for PipelineFailure {
    fn from(err: PipelineError) -> Self {
        Self::from(&err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interpretation_failures_classify_by_cause() {
        let invalid = PipelineError::from(InterpretError::Invalid {
            attempts: 2,
            source: PlanValidationError::UnknownColumn("spaceship class".into()),
        });
        assert_eq!(invalid.kind(), FailureKind::PlanValidation);

        let timeout = PipelineError::from(InterpretError::Model {
            attempts: 2,
            source: ModelError::Timeout { after_ms: 100 },
        });
        assert_eq!(timeout.kind(), FailureKind::ModelTimeout);
    }

    #[test]
    fn failure_serializes_with_snake_case_kind() {
        let failure = PipelineFailure::from(PipelineError::QaRejected {
            attempts: 3,
            reason: "result table is empty".into(),
        });
        let json = serde_json::to_value(&failure).unwrap();
        assert_eq!(json["kind"], "qa_rejected");
        assert_eq!(
            json["message"],
            "result rejected after 3 attempt(s): result table is empty"
        );
    }

    #[test]
    fn message_names_the_unknown_reference() {
        let failure = PipelineFailure::from(PipelineError::from(InterpretError::Invalid {
            attempts: 2,
            source: PlanValidationError::UnknownColumn("spaceship class".into()),
        }));
        assert!(failure.message.contains("spaceship class"));
    }
}
