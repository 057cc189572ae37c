//! Vizier plan model and executor
//!
//! Datasets, operation plans and their deterministic execution.
//!
//! # Core Concepts
//!
//! - [`Dataset`]: an uploaded table with inferred column types, never mutated
//! - [`OperationPlan`]: validated closed-vocabulary steps ending in one chart
//! - [`PlanExecutor`]: applies a plan to a dataset, producing a new [`Table`]
//! - [`ChartSpec`]: renderer-agnostic axis bindings over the result table
//! - [`ChartRenderer`]: adapter from a chart spec to a displayable document
//!
//! # Example
//!
//! ```rust,ignore
//! use vizier_plan::{Dataset, OperationPlan, PlanExecutor};
//!
//! let dataset = Dataset::from_records(&records)?;
//! let plan: OperationPlan = serde_json::from_str(plan_json)?;
//! let result = PlanExecutor::new().execute(&dataset, &plan)?;
//! println!("{} rows, {} chart", result.table.row_count(), result.chart.chart_type);
//! ```

#![warn(unreachable_pub)]
#![warn(missing_docs)]

mod chart;
mod dataset;
mod error;
mod executor;
mod plan;
mod render;
mod summary;
mod table;
mod value;

pub use chart::{AxisBinding, ChartSpec};
pub use dataset::{ColumnDescriptor, ColumnType, Dataset};
pub use error::{DatasetError, ExecutionError, PlanError, RenderError, VocabularyError};
pub use executor::{ExecutionResult, PlanExecutor};
pub use plan::{AggregateFn, ChartOp, ChartType, Literal, Operation, OperationPlan, Predicate, SortDirection};
pub use render::{ChartRenderer, RenderedChart, VegaLiteRenderer};
pub use summary::{CategoricalStats, NumericStats, ResultSummary, TOP_VALUES};
pub use table::{Column, Lineage, Row, Table};
pub use value::{parse_datetime, Value, ValueKey};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
