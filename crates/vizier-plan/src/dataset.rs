//! Immutable per-upload datasets and column type inference

use crate::error::DatasetError;
use crate::table::{Column, Row, Table};
use crate::value::{parse_datetime, parse_number, Value};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Distinct values at or below which a column is categorical
const CATEGORICAL_MAX_DISTINCT: usize = 20;

/// Inferred column type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    /// Numbers
    Numeric,
    /// Low-cardinality labels
    Categorical,
    /// Dates and date-times
    Datetime,
    /// Free text
    Text,
}

impl ColumnType {
    /// Lowercase name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Numeric => "numeric",
            Self::Categorical => "categorical",
            Self::Datetime => "datetime",
            Self::Text => "text",
        }
    }

    /// Categorical or free text
    #[inline]
    #[must_use]
    pub const fn is_textual(self) -> bool {
        matches!(self, Self::Categorical | Self::Text)
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the schema mapper sees of a column
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnDescriptor {
    /// Technical column name
    pub name: String,
    /// Inferred type
    pub column_type: ColumnType,
    /// First distinct non-null values
    pub sample: Vec<String>,
}

/// Uploaded table, never mutated after loading
///
/// Plan execution reads a dataset and produces new [`Table`]s; nothing
/// holds a mutable handle to the loaded data.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    table: Table,
}

impl Dataset {
    /// Wrap an already-typed table
    #[must_use]
    pub fn new(table: Table) -> Self {
        Self { table }
    }

    /// Build from JSON row objects
    ///
    /// Column order follows first appearance across records. Missing keys
    /// and empty strings become `Null`. Types are inferred per column:
    /// numeric when every non-null cell is a number or numeric string,
    /// datetime when every one parses as a date, categorical when the
    /// distinct count is at most 20 or at most half the rows, text
    /// otherwise.
    ///
    /// # Errors
    /// `DatasetError::NotAnObject` for a record that is not an object
    pub fn from_records(records: &[serde_json::Value]) -> Result<Self, DatasetError> {
        let mut raw: IndexMap<String, Vec<Option<RawCell>>> = IndexMap::new();

        for (index, record) in records.iter().enumerate() {
            let object = record.as_object().ok_or(DatasetError::NotAnObject { index })?;
            for (name, cell) in object {
                let column = raw.entry(name.clone()).or_insert_with(|| vec![None; index]);
                column.resize(index, None);
                column.push(RawCell::from_json(cell));
            }
        }

        let columns = raw
            .into_iter()
            .map(|(name, mut cells)| {
                cells.resize(records.len(), None);
                let (column_type, values) = infer(&cells);
                Column::new(name, column_type, values)
            })
            .collect();

        let table = Table::new(columns)?;
        tracing::debug!(
            rows = table.row_count(),
            columns = table.column_count(),
            "dataset loaded"
        );
        Ok(Self { table })
    }

    /// Underlying table
    #[inline]
    #[must_use]
    pub fn table(&self) -> &Table {
        &self.table
    }

    /// Number of rows
    #[inline]
    #[must_use]
    pub fn row_count(&self) -> usize {
        self.table.row_count()
    }

    /// Column names in order
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.table.column_names()
    }

    /// Check for a column by exact name
    #[must_use]
    pub fn has_column(&self, name: &str) -> bool {
        self.table.column(name).is_some()
    }

    /// First `n` rows
    #[must_use]
    pub fn sample(&self, n: usize) -> Vec<Row> {
        self.table.head(n).rows()
    }

    /// Column descriptors with up to `sample_size` distinct example values
    #[must_use]
    pub fn descriptors(&self, sample_size: usize) -> Vec<ColumnDescriptor> {
        self.table
            .columns()
            .iter()
            .map(|column| {
                let mut seen = HashSet::new();
                let sample = column
                    .values()
                    .iter()
                    .filter(|v| !v.is_null() && seen.insert(v.key()))
                    .take(sample_size)
                    .map(ToString::to_string)
                    .collect();
                ColumnDescriptor {
                    name: column.name().to_string(),
                    column_type: column.column_type(),
                    sample,
                }
            })
            .collect()
    }
}

#[derive(Debug, Clone)]
enum RawCell {
    Number(f64),
    Text(String),
}

impl RawCell {
    fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Null => None,
            serde_json::Value::Number(n) => n.as_f64().filter(|f| f.is_finite()).map(Self::Number),
            serde_json::Value::String(s) if s.trim().is_empty() => None,
            serde_json::Value::String(s) => Some(Self::Text(s.clone())),
            serde_json::Value::Bool(b) => Some(Self::Text(b.to_string())),
            other => Some(Self::Text(other.to_string())),
        }
    }

    fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Text(s) => parse_number(s),
        }
    }

    fn into_text(self) -> String {
        match self {
            Self::Number(n) => crate::value::format_number(n),
            Self::Text(s) => s,
        }
    }
}

fn infer(cells: &[Option<RawCell>]) -> (ColumnType, Vec<Value>) {
    let present: Vec<&RawCell> = cells.iter().flatten().collect();

    if !present.is_empty() && present.iter().all(|c| c.as_number().is_some()) {
        let values = cells
            .iter()
            .map(|c| c.as_ref().and_then(RawCell::as_number).map_or(Value::Null, Value::Number))
            .collect();
        return (ColumnType::Numeric, values);
    }

    let is_date = |c: &&RawCell| matches!(c, RawCell::Text(s) if parse_datetime(s).is_some());
    if !present.is_empty() && present.iter().all(is_date) {
        let values = cells
            .iter()
            .map(|c| match c {
                Some(RawCell::Text(s)) => parse_datetime(s).map_or(Value::Null, Value::DateTime),
                _ => Value::Null,
            })
            .collect();
        return (ColumnType::Datetime, values);
    }

    let values: Vec<Value> = cells
        .iter()
        .map(|c| c.clone().map_or(Value::Null, |c| Value::Text(c.into_text())))
        .collect();
    let distinct = values
        .iter()
        .filter_map(Value::as_text)
        .collect::<HashSet<_>>()
        .len();
    let column_type = if distinct <= CATEGORICAL_MAX_DISTINCT || distinct * 2 <= cells.len() {
        ColumnType::Categorical
    } else {
        ColumnType::Text
    };
    (column_type, values)
}
