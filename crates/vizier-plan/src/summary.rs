//! Descriptive statistics over result tables

use crate::dataset::ColumnType;
use crate::table::Table;
use crate::value::Value;
use indexmap::IndexMap;
use serde::Serialize;

/// Number of most frequent values kept per categorical column
pub const TOP_VALUES: usize = 5;

/// Range and mean of a numeric column
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NumericStats {
    /// Non-null cells
    pub count: usize,
    /// Smallest value
    pub min: f64,
    /// Largest value
    pub max: f64,
    /// Arithmetic mean
    pub mean: f64,
}

/// Cardinality and most frequent values of a textual column
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoricalStats {
    /// Distinct non-null values
    pub distinct: usize,
    /// Most frequent values with their counts, ties in first-appearance order
    pub top: Vec<(String, usize)>,
}

/// Shape and per-column statistics of a result table
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct ResultSummary {
    /// Row count
    pub rows: usize,
    /// Column count
    pub columns: usize,
    /// Numeric columns with at least one value
    pub numeric: IndexMap<String, NumericStats>,
    /// Categorical and text columns
    pub categorical: IndexMap<String, CategoricalStats>,
}

impl ResultSummary {
    /// Summarize `table`
    #[must_use]
    pub fn of(table: &Table) -> Self {
        let mut summary = Self {
            rows: table.row_count(),
            columns: table.column_count(),
            ..Self::default()
        };

        for column in table.columns() {
            match column.column_type() {
                ColumnType::Numeric => {
                    if let Some(stats) = numeric_stats(column.values()) {
                        summary.numeric.insert(column.name().to_string(), stats);
                    }
                }
                ColumnType::Categorical | ColumnType::Text => {
                    summary
                        .categorical
                        .insert(column.name().to_string(), categorical_stats(column.values()));
                }
                ColumnType::Datetime => {}
            }
        }
        summary
    }
}

fn numeric_stats(values: &[Value]) -> Option<NumericStats> {
    let numbers: Vec<f64> = values.iter().filter_map(Value::as_f64).collect();
    let first = *numbers.first()?;
    let (min, max) = numbers
        .iter()
        .fold((first, first), |(lo, hi), &n| (lo.min(n), hi.max(n)));
    let mean = numbers.iter().sum::<f64>() / numbers.len() as f64;
    Some(NumericStats {
        count: numbers.len(),
        min,
        max,
        mean,
    })
}

fn categorical_stats(values: &[Value]) -> CategoricalStats {
    let mut counts: IndexMap<String, usize> = IndexMap::new();
    for value in values.iter().filter(|v| !v.is_null()) {
        *counts.entry(value.to_string()).or_default() += 1;
    }
    let distinct = counts.len();
    let mut top: Vec<(String, usize)> = counts.into_iter().collect();
    top.sort_by(|a, b| b.1.cmp(&a.1));
    top.truncate(TOP_VALUES);
    CategoricalStats { distinct, top }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::Column;

    #[test]
    fn summarizes_numeric_and_categorical_columns() {
        let table = Table::new(vec![
            Column::new(
                "region",
                ColumnType::Categorical,
                ["W", "E", "W", "N", "E", "W"]
                    .iter()
                    .map(|s| Value::Text((*s).into()))
                    .collect(),
            ),
            Column::new(
                "amt",
                ColumnType::Numeric,
                vec![
                    Value::Number(10.0),
                    Value::Null,
                    Value::Number(30.0),
                    Value::Number(20.0),
                    Value::Number(5.0),
                    Value::Number(25.0),
                ],
            ),
        ])
        .unwrap();

        let summary = ResultSummary::of(&table);
        assert_eq!(summary.rows, 6);
        assert_eq!(summary.columns, 2);

        let amt = &summary.numeric["amt"];
        assert_eq!(amt.count, 5);
        assert_eq!(amt.min, 5.0);
        assert_eq!(amt.max, 30.0);
        assert_eq!(amt.mean, 18.0);

        let region = &summary.categorical["region"];
        assert_eq!(region.distinct, 3);
        assert_eq!(
            region.top,
            vec![("W".to_string(), 3), ("E".to_string(), 2), ("N".to_string(), 1)]
        );
    }

    #[test]
    fn all_null_numeric_column_is_skipped() {
        let table = Table::new(vec![Column::new("amt", ColumnType::Numeric, vec![Value::Null])]).unwrap();
        assert!(ResultSummary::of(&table).numeric.is_empty());
    }
}
