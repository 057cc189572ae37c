//! Operation plans
//!
//! An [`OperationPlan`] is an ordered sequence of steps drawn from a closed
//! vocabulary. Construction goes through [`OperationPlan::new`], which
//! enforces the structural invariants:
//!
//! - exactly one `chart` operation, and it is the last step
//! - every `group_by` names at least one column
//! - no step references an empty column name
//!
//! Column existence is checked later against a concrete schema, since a
//! plan is only meaningful relative to the dataset it will run on.

use crate::error::{PlanError, VocabularyError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Aggregation function
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregateFn {
    /// Sum of non-null values
    Sum,
    /// Arithmetic mean of non-null values
    Mean,
    /// Number of non-null cells
    Count,
    /// Smallest value
    Min,
    /// Largest value
    Max,
}

impl AggregateFn {
    /// Every function in the vocabulary
    pub const ALL: [Self; 5] = [Self::Sum, Self::Mean, Self::Count, Self::Min, Self::Max];

    /// Vocabulary name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Sum => "sum",
            Self::Mean => "mean",
            Self::Count => "count",
            Self::Min => "min",
            Self::Max => "max",
        }
    }
}

impl FromStr for AggregateFn {
    type Err = VocabularyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|f| f.as_str() == name)
            .ok_or_else(|| VocabularyError::new("aggregation function", s))
    }
}

impl fmt::Display for AggregateFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Filter comparison
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Predicate {
    /// `==`
    #[serde(rename = "==")]
    Eq,
    /// `!=`
    #[serde(rename = "!=")]
    Ne,
    /// `>`
    #[serde(rename = ">")]
    Gt,
    /// `>=`
    #[serde(rename = ">=")]
    Ge,
    /// `<`
    #[serde(rename = "<")]
    Lt,
    /// `<=`
    #[serde(rename = "<=")]
    Le,
    /// Membership in a list
    #[serde(rename = "in")]
    In,
    /// Substring match on text
    #[serde(rename = "contains")]
    Contains,
}

impl Predicate {
    /// Every predicate in the vocabulary
    pub const ALL: [Self; 8] = [
        Self::Eq,
        Self::Ne,
        Self::Gt,
        Self::Ge,
        Self::Lt,
        Self::Le,
        Self::In,
        Self::Contains,
    ];

    /// Vocabulary symbol
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::In => "in",
            Self::Contains => "contains",
        }
    }

    /// Plain-language phrase, e.g. "is at least"
    #[must_use]
    pub const fn phrase(self) -> &'static str {
        match self {
            Self::Eq => "is",
            Self::Ne => "is not",
            Self::Gt => "is greater than",
            Self::Ge => "is at least",
            Self::Lt => "is less than",
            Self::Le => "is at most",
            Self::In => "is one of",
            Self::Contains => "contains",
        }
    }
}

impl FromStr for Predicate {
    type Err = VocabularyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let symbol = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|p| p.as_str() == symbol)
            .ok_or_else(|| VocabularyError::new("filter predicate", s))
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    /// Smallest first
    #[default]
    Asc,
    /// Largest first
    Desc,
}

impl SortDirection {
    /// Vocabulary name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Asc => "asc",
            Self::Desc => "desc",
        }
    }
}

impl FromStr for SortDirection {
    type Err = VocabularyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "asc" | "ascending" => Ok(Self::Asc),
            "desc" | "descending" => Ok(Self::Desc),
            _ => Err(VocabularyError::new("sort direction", s)),
        }
    }
}

/// Chart type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChartType {
    /// Bar chart
    Bar,
    /// Line chart
    Line,
    /// Scatter plot
    Scatter,
    /// Pie chart
    Pie,
    /// Plain table
    Table,
}

impl ChartType {
    /// Every chart type in the vocabulary
    pub const ALL: [Self; 5] = [Self::Bar, Self::Line, Self::Scatter, Self::Pie, Self::Table];

    /// Vocabulary name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Bar => "bar",
            Self::Line => "line",
            Self::Scatter => "scatter",
            Self::Pie => "pie",
            Self::Table => "table",
        }
    }
}

impl FromStr for ChartType {
    type Err = VocabularyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == name)
            .ok_or_else(|| VocabularyError::new("chart type", s))
    }
}

impl fmt::Display for ChartType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Filter operand as written in the plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Literal {
    /// Number
    Number(f64),
    /// Text (also dates, coerced at execution)
    Text(String),
    /// Operand list for `in`
    List(Vec<Literal>),
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => f.write_str(&crate::value::format_number(*n)),
            Self::Text(s) => write!(f, "\"{s}\""),
            Self::List(items) => {
                let parts: Vec<String> = items.iter().map(ToString::to_string).collect();
                write!(f, "[{}]", parts.join(", "))
            }
        }
    }
}

/// Terminal chart step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartOp {
    /// Chart type
    #[serde(rename = "type")]
    pub chart_type: ChartType,
    /// Column on the x axis (category axis for pie)
    pub x: String,
    /// Column on the y axis (value axis for pie)
    pub y: String,
    /// Optional series/color column
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub series: Option<String>,
    /// Optional title
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

/// One plan step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Operation {
    /// Keep rows whose `column` satisfies `predicate value`
    Filter {
        /// Column to test
        column: String,
        /// Comparison
        predicate: Predicate,
        /// Operand
        value: Literal,
    },
    /// Group rows by key columns
    GroupBy {
        /// Key columns
        columns: Vec<String>,
    },
    /// Aggregate a column per group, or over the whole table
    Aggregate {
        /// Input column
        column: String,
        /// Function
        function: AggregateFn,
    },
    /// Stable sort
    Sort {
        /// Sort key
        column: String,
        /// Direction
        direction: SortDirection,
    },
    /// Chart binding (terminal)
    Chart(ChartOp),
}

impl Operation {
    /// Vocabulary name of the operation
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Filter { .. } => "filter",
            Self::GroupBy { .. } => "group_by",
            Self::Aggregate { .. } => "aggregate",
            Self::Sort { .. } => "sort",
            Self::Chart(_) => "chart",
        }
    }

    /// Columns this step references
    #[must_use]
    pub fn columns(&self) -> Vec<&str> {
        match self {
            Self::Filter { column, .. } | Self::Aggregate { column, .. } | Self::Sort { column, .. } => {
                vec![column.as_str()]
            }
            Self::GroupBy { columns } => columns.iter().map(String::as_str).collect(),
            Self::Chart(chart) => {
                let mut cols = vec![chart.x.as_str(), chart.y.as_str()];
                cols.extend(chart.series.as_deref());
                cols
            }
        }
    }

    /// Rewrite every column reference through `f`
    #[must_use]
    pub fn map_columns(self, mut f: impl FnMut(String) -> String) -> Self {
        match self {
            Self::Filter { column, predicate, value } => Self::Filter {
                column: f(column),
                predicate,
                value,
            },
            Self::GroupBy { columns } => Self::GroupBy {
                columns: columns.into_iter().map(f).collect(),
            },
            Self::Aggregate { column, function } => Self::Aggregate {
                column: f(column),
                function,
            },
            Self::Sort { column, direction } => Self::Sort {
                column: f(column),
                direction,
            },
            Self::Chart(chart) => Self::Chart(ChartOp {
                x: f(chart.x),
                y: f(chart.y),
                series: chart.series.map(&mut f),
                ..chart
            }),
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Filter { column, predicate, value } => write!(f, "filter({column} {predicate} {value})"),
            Self::GroupBy { columns } => write!(f, "group_by({})", columns.join(", ")),
            Self::Aggregate { column, function } => write!(f, "aggregate({column}, {function})"),
            Self::Sort { column, direction } => write!(f, "sort({column}, {})", direction.as_str()),
            Self::Chart(chart) => {
                write!(f, "chart({}, x={}, y={}", chart.chart_type, chart.x, chart.y)?;
                if let Some(series) = &chart.series {
                    write!(f, ", series={series}")?;
                }
                f.write_str(")")
            }
        }
    }
}

/// Validated, ordered plan ending in exactly one chart step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Operation>", into = "Vec<Operation>")]
pub struct OperationPlan {
    steps: Vec<Operation>,
    chart: ChartOp,
}

impl OperationPlan {
    /// Validate and build a plan
    ///
    /// # Errors
    /// Returns `PlanError` when the chart step is missing, repeated or
    /// not last, when a `group_by` is empty, or when a column name is blank.
    pub fn new(mut operations: Vec<Operation>) -> Result<Self, PlanError> {
        let charts = operations
            .iter()
            .filter(|op| matches!(op, Operation::Chart(_)))
            .count();
        match charts {
            0 => return Err(PlanError::MissingChart),
            1 => {}
            count => return Err(PlanError::MultipleCharts { count }),
        }
        if let Some(index) = operations.iter().position(|op| matches!(op, Operation::Chart(_))) {
            if index + 1 != operations.len() {
                return Err(PlanError::ChartNotTerminal { index });
            }
        }

        for (index, op) in operations.iter().enumerate() {
            if let Operation::GroupBy { columns } = op {
                if columns.is_empty() {
                    return Err(PlanError::EmptyGroupBy { index });
                }
            }
            if op.columns().iter().any(|c| c.trim().is_empty()) {
                return Err(PlanError::EmptyColumn { index });
            }
        }

        match operations.pop() {
            Some(Operation::Chart(chart)) => Ok(Self { steps: operations, chart }),
            _ => Err(PlanError::MissingChart),
        }
    }

    /// Steps before the chart
    #[inline]
    #[must_use]
    pub fn steps(&self) -> &[Operation] {
        &self.steps
    }

    /// The terminal chart step
    #[inline]
    #[must_use]
    pub const fn chart(&self) -> &ChartOp {
        &self.chart
    }

    /// Every column name the plan references
    #[must_use]
    pub fn referenced_columns(&self) -> BTreeSet<&str> {
        let mut columns: BTreeSet<&str> = self.steps.iter().flat_map(Operation::columns).collect();
        columns.extend([self.chart.x.as_str(), self.chart.y.as_str()]);
        columns.extend(self.chart.series.as_deref());
        columns
    }

    /// Key columns of the first `group_by`, if any
    #[must_use]
    pub fn group_by(&self) -> Option<&[String]> {
        self.steps.iter().find_map(|op| match op {
            Operation::GroupBy { columns } => Some(columns.as_slice()),
            _ => None,
        })
    }

    /// Aggregate steps in order
    pub fn aggregates(&self) -> impl Iterator<Item = (&str, AggregateFn)> {
        self.steps.iter().filter_map(|op| match op {
            Operation::Aggregate { column, function } => Some((column.as_str(), *function)),
            _ => None,
        })
    }

    /// Filter steps in order
    pub fn filters(&self) -> impl Iterator<Item = (&str, Predicate, &Literal)> {
        self.steps.iter().filter_map(|op| match op {
            Operation::Filter { column, predicate, value } => Some((column.as_str(), *predicate, value)),
            _ => None,
        })
    }

    /// The last sort step, which determines final row order
    #[must_use]
    pub fn final_sort(&self) -> Option<(&str, SortDirection)> {
        self.steps.iter().rev().find_map(|op| match op {
            Operation::Sort { column, direction } => Some((column.as_str(), *direction)),
            _ => None,
        })
    }

    /// Check whether the plan uses `function` anywhere
    #[must_use]
    pub fn uses(&self, function: AggregateFn) -> bool {
        self.aggregates().any(|(_, f)| f == function)
    }
}

impl TryFrom<Vec<Operation>> for OperationPlan {
    type Error = PlanError;

    fn try_from(operations: Vec<Operation>) -> Result<Self, Self::Error> {
        Self::new(operations)
    }
}

impl From<OperationPlan> for Vec<Operation> {
    fn from(plan: OperationPlan) -> Self {
        let mut operations = plan.steps;
        operations.push(Operation::Chart(plan.chart));
        operations
    }
}

impl fmt::Display for OperationPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let chart = Operation::Chart(self.chart.clone());
        let steps: Vec<String> = self.steps.iter().chain([&chart]).map(ToString::to_string).collect();
        write!(f, "[{}]", steps.join(", "))
    }
}
