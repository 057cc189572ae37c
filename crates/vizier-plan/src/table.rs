//! Row-aligned tables of typed columns

use crate::dataset::ColumnType;
use crate::error::DatasetError;
use crate::plan::AggregateFn;
use crate::value::{Value, ValueKey};
use indexmap::{IndexMap, IndexSet};
use serde::Serialize;
use std::collections::HashSet;

/// Provenance of an aggregate output column
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Lineage {
    /// Column the aggregate read
    pub source_column: String,
    /// Function applied
    pub function: AggregateFn,
}

/// Named, typed column
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Column {
    name: String,
    column_type: ColumnType,
    values: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    lineage: Option<Lineage>,
}

impl Column {
    /// Create a column
    #[must_use]
    pub fn new(name: impl Into<String>, column_type: ColumnType, values: Vec<Value>) -> Self {
        Self {
            name: name.into(),
            column_type,
            values,
            lineage: None,
        }
    }

    /// With aggregate provenance
    #[inline]
    #[must_use]
    pub fn with_lineage(mut self, lineage: Lineage) -> Self {
        self.lineage = Some(lineage);
        self
    }

    /// Column name
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Column type
    #[inline]
    #[must_use]
    pub fn column_type(&self) -> ColumnType {
        self.column_type
    }

    /// Cell values
    #[inline]
    #[must_use]
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Aggregate provenance, if any
    #[inline]
    #[must_use]
    pub fn lineage(&self) -> Option<&Lineage> {
        self.lineage.as_ref()
    }

    /// Distinct non-null values
    #[must_use]
    pub fn distinct_count(&self) -> usize {
        self.values
            .iter()
            .filter(|v| !v.is_null())
            .map(Value::key)
            .collect::<HashSet<_>>()
            .len()
    }

    fn select(&self, rows: &[usize]) -> Self {
        Self {
            name: self.name.clone(),
            column_type: self.column_type,
            values: rows.iter().map(|&i| self.values[i].clone()).collect(),
            lineage: self.lineage.clone(),
        }
    }
}

/// One row keyed by column name
pub type Row = IndexMap<String, Value>;

/// Ordered set of equal-length columns
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Table {
    columns: Vec<Column>,
    row_count: usize,
}

impl Table {
    /// Build a table, checking that names are unique and lengths agree
    ///
    /// # Errors
    /// `DuplicateColumn` or `RaggedColumn`
    pub fn new(columns: Vec<Column>) -> Result<Self, DatasetError> {
        let row_count = columns.first().map_or(0, |c| c.values.len());
        let mut seen = HashSet::new();
        for column in &columns {
            if !seen.insert(column.name.as_str()) {
                return Err(DatasetError::DuplicateColumn {
                    name: column.name.clone(),
                });
            }
            if column.values.len() != row_count {
                return Err(DatasetError::RaggedColumn {
                    name: column.name.clone(),
                    expected: row_count,
                    found: column.values.len(),
                });
            }
        }
        Ok(Self { columns, row_count })
    }

    /// Assemble columns already known to be unique and `row_count` long
    pub(crate) fn from_parts(columns: Vec<Column>, row_count: usize) -> Self {
        debug_assert!(columns.iter().all(|c| c.values.len() == row_count));
        Self { columns, row_count }
    }

    /// Number of rows
    #[inline]
    #[must_use]
    pub fn row_count(&self) -> usize {
        self.row_count
    }

    /// Number of columns
    #[inline]
    #[must_use]
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Check for zero rows
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.row_count == 0
    }

    /// Columns in order
    #[inline]
    #[must_use]
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Column names in order
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(Column::name)
    }

    /// Column by exact name
    #[must_use]
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Column by exact name, else the first aggregate output read from `name`
    #[must_use]
    pub fn resolve(&self, name: &str) -> Option<&Column> {
        self.column(name).or_else(|| {
            self.columns
                .iter()
                .find(|c| c.lineage.as_ref().is_some_and(|l| l.source_column == name))
        })
    }

    /// Number of distinct key combinations over `columns`
    ///
    /// Unknown names are ignored.
    #[must_use]
    pub fn distinct_keys(&self, columns: &[String]) -> usize {
        let cols: Vec<&Column> = columns.iter().filter_map(|c| self.column(c)).collect();
        (0..self.row_count)
            .map(|row| cols.iter().map(|c| c.values[row].key()).collect::<Vec<ValueKey>>())
            .collect::<IndexSet<_>>()
            .len()
    }

    /// New table holding `rows` in the given order
    #[must_use]
    pub fn select_rows(&self, rows: &[usize]) -> Self {
        Self {
            columns: self.columns.iter().map(|c| c.select(rows)).collect(),
            row_count: rows.len(),
        }
    }

    /// First `n` rows
    #[must_use]
    pub fn head(&self, n: usize) -> Self {
        let rows: Vec<usize> = (0..self.row_count.min(n)).collect();
        self.select_rows(&rows)
    }

    /// Row-oriented view
    #[must_use]
    pub fn rows(&self) -> Vec<Row> {
        (0..self.row_count)
            .map(|row| {
                self.columns
                    .iter()
                    .map(|c| (c.name.clone(), c.values[row].clone()))
                    .collect()
            })
            .collect()
    }
}
