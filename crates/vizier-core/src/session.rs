//! Pipeline state machine and per-request session

use crate::error::PipelineError;
use crate::mapping::SchemaMapping;
use serde::{Deserialize, Serialize};
use ulid::Ulid;
use vizier_plan::{ExecutionResult, OperationPlan};

/// Pipeline stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PipelineState {
    /// Resolving column names to business labels
    Mapping,
    /// Turning the requirement into an operation plan
    Interpreting,
    /// Applying the plan to the dataset
    Executing,
    /// Running the QA gate
    Validating,
    /// Artifact produced
    Done,
    /// Terminal failure
    Failed,
}

impl PipelineState {
    /// Whether no further transition is possible
    #[inline]
    #[must_use]
    pub fn is_terminal(self) -> bool {
        allowed_transitions(self).is_empty()
    }
}

/// States reachable from `from`
#[must_use]
pub fn allowed_transitions(from: PipelineState) -> Vec<PipelineState> {
    use PipelineState::*;
    match from {
        Mapping => vec![Interpreting, Failed],
        Interpreting => vec![Executing, Failed],
        Executing => vec![Validating, Interpreting, Failed],
        Validating => vec![Done, Interpreting, Failed],
        Done => vec![],
        Failed => vec![],
    }
}

/// Check a single transition
///
/// # Errors
/// `PipelineError::IllegalTransition` when `to` is not reachable from `from`.
pub fn validate_transition(from: PipelineState, to: PipelineState) -> Result<(), PipelineError> {
    if allowed_transitions(from).contains(&to) {
        Ok(())
    } else {
        Err(PipelineError::IllegalTransition { from, to })
    }
}

/// State owned by one pipeline run
///
/// Created fresh for every request and dropped once the run returns.
#[derive(Debug)]
pub struct PipelineSession {
    id: Ulid,
    state: PipelineState,
    history: Vec<PipelineState>,
    retries: u32,
    last_reason: Option<String>,
    /// Mapping produced by the first stage; empty until then
    pub mapping: SchemaMapping,
    /// Plan of the current attempt
    pub plan: Option<OperationPlan>,
    /// Result of the current attempt
    pub result: Option<ExecutionResult>,
}

impl PipelineSession {
    /// Session starting in [`PipelineState::Mapping`]
    #[must_use]
    pub fn new() -> Self {
        Self {
            id: Ulid::new(),
            state: PipelineState::Mapping,
            history: vec![PipelineState::Mapping],
            retries: 0,
            last_reason: None,
            mapping: SchemaMapping::new(),
            plan: None,
            result: None,
        }
    }

    /// Session identifier
    #[inline]
    #[must_use]
    pub fn id(&self) -> Ulid {
        self.id
    }

    /// Current state
    #[inline]
    #[must_use]
    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Every state entered, in order
    #[inline]
    #[must_use]
    pub fn history(&self) -> &[PipelineState] {
        &self.history
    }

    /// Re-interpretations so far
    #[inline]
    #[must_use]
    pub fn retries(&self) -> u32 {
        self.retries
    }

    /// Reason recorded by the last retry or failure
    #[inline]
    #[must_use]
    pub fn last_reason(&self) -> Option<&str> {
        self.last_reason.as_deref()
    }

    /// Move to `to`
    ///
    /// # Errors
    /// `PipelineError::IllegalTransition`; the session is left unchanged.
    pub fn advance(&mut self, to: PipelineState) -> Result<(), PipelineError> {
        validate_transition(self.state, to)?;
        tracing::info!(session = %self.id, from = ?self.state, to = ?to, "pipeline transition");
        self.state = to;
        self.history.push(to);
        Ok(())
    }

    /// Go back to interpretation, counting one retry
    ///
    /// The stale plan and result are discarded.
    ///
    /// # Errors
    /// `PipelineError::IllegalTransition` from the current state.
    pub fn retry(&mut self, reason: impl Into<String>) -> Result<(), PipelineError> {
        self.advance(PipelineState::Interpreting)?;
        self.retries += 1;
        self.last_reason = Some(reason.into());
        self.plan = None;
        self.result = None;
        Ok(())
    }

    /// Enter [`PipelineState::Failed`] with `reason`
    ///
    /// # Errors
    /// `PipelineError::IllegalTransition` when already terminal.
    pub fn fail(&mut self, reason: impl Into<String>) -> Result<(), PipelineError> {
        self.advance(PipelineState::Failed)?;
        self.last_reason = Some(reason.into());
        Ok(())
    }
}

impl Default for PipelineSession {
    fn default() -> Self {
        Self::new()
    }
}
