//! Error types for datasets, plans and execution

use crate::dataset::ColumnType;
use crate::plan::ChartType;

/// Structural problem with an operation plan
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlanError {
    /// No chart step
    #[error("plan has no terminal chart operation")]
    MissingChart,

    /// More than one chart step
    #[error("plan has {count} chart operations; exactly one is allowed")]
    MultipleCharts {
        /// Number of chart steps found
        count: usize,
    },

    /// Chart step is not last
    #[error("chart operation must be the last step (found at step {index})")]
    ChartNotTerminal {
        /// Position of the chart step
        index: usize,
    },

    /// `group_by` without key columns
    #[error("group_by at step {index} names no columns")]
    EmptyGroupBy {
        /// Position of the step
        index: usize,
    },

    /// Blank column reference
    #[error("operation at step {index} references an empty column name")]
    EmptyColumn {
        /// Position of the step
        index: usize,
    },
}

/// Name outside the closed operation vocabulary
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} '{value}'")]
pub struct VocabularyError {
    /// Vocabulary that was searched
    pub kind: &'static str,
    /// Offending value
    pub value: String,
}

impl VocabularyError {
    pub(crate) fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

/// Failure while building a dataset or table
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DatasetError {
    /// Record is not a JSON object
    #[error("record {index} is not an object")]
    NotAnObject {
        /// Record position
        index: usize,
    },

    /// Two columns share a name
    #[error("duplicate column '{name}'")]
    DuplicateColumn {
        /// Column name
        name: String,
    },

    /// Column length differs from the table's row count
    #[error("column '{name}' has {found} values, expected {expected}")]
    RaggedColumn {
        /// Column name
        name: String,
        /// Row count of the table
        expected: usize,
        /// Values in this column
        found: usize,
    },
}

/// Plan execution failure
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ExecutionError {
    /// Step references a column the current table does not have
    #[error("unknown column '{column}'")]
    UnknownColumn {
        /// Referenced name
        column: String,
    },

    /// Operation applied to a column of the wrong type
    #[error("type mismatch in {operation} on '{column}' ({found}): {reason}")]
    TypeMismatch {
        /// Column involved
        column: String,
        /// Operation name
        operation: &'static str,
        /// Actual column type
        found: ColumnType,
        /// What was required
        reason: String,
    },

    /// Chart axis bound to an incompatible column
    #[error("cannot bind '{column}' to the {axis} of a {chart} chart: {reason}")]
    ChartBinding {
        /// Chart type
        chart: ChartType,
        /// Axis name (`x`, `y`, `series`)
        axis: &'static str,
        /// Bound column
        column: String,
        /// Violated rule
        reason: String,
    },

    /// Plan failed structural validation
    #[error("invalid plan: {0}")]
    InvalidPlan(#[from] PlanError),
}

impl ExecutionError {
    /// Check whether a different plan could plausibly succeed on the same data
    ///
    /// An unknown column here means an earlier step dropped it, so only a
    /// structurally invalid plan is beyond repair.
    #[inline]
    #[must_use]
    pub fn is_plan_fixable(&self) -> bool {
        matches!(
            self,
            Self::UnknownColumn { .. } | Self::TypeMismatch { .. } | Self::ChartBinding { .. }
        )
    }
}

/// Failure while rendering a chart document
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RenderError {
    /// Chart binds a column missing from the table
    #[error("chart binds column '{column}' which the result table lacks")]
    MissingColumn {
        /// Bound column
        column: String,
    },

    /// Result rows could not be encoded into the document
    #[error("could not encode result rows: {0}")]
    Data(String),
}
