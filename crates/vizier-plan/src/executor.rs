//! Deterministic plan execution
//!
//! [`PlanExecutor::execute`] applies a plan's steps strictly in order.
//! Every step reads the table produced by the previous one and returns a
//! new table; the input dataset is never touched. Execution does no I/O.
//!
//! # Grouping
//!
//! A `group_by` absorbs the `aggregate` steps that immediately follow it
//! and emits one row per distinct key, in first-appearance order. With no
//! following aggregate it emits the keys plus a `count` column. An
//! `aggregate` without a preceding `group_by` reduces the whole table to
//! one row, or to no row when the table is empty.

use crate::chart::ChartSpec;
use crate::dataset::{ColumnType, Dataset};
use crate::error::ExecutionError;
use crate::plan::{AggregateFn, Literal, Operation, OperationPlan, Predicate, SortDirection};
use crate::summary::ResultSummary;
use crate::table::{Column, Lineage, Table};
use crate::value::{format_number, parse_datetime, parse_number, Value, ValueKey};
use indexmap::IndexMap;
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::HashSet;

/// Output of a successful execution
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionResult {
    /// Final table
    pub table: Table,
    /// Chart bound to `table`
    pub chart: ChartSpec,
    /// Statistics over `table`
    pub summary: ResultSummary,
}

/// Applies operation plans to datasets
#[derive(Debug, Clone, Copy, Default)]
pub struct PlanExecutor;

impl PlanExecutor {
    /// Create an executor
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Run `plan` against `dataset`
    ///
    /// # Errors
    /// - `UnknownColumn` when a step names a column the current table lacks
    /// - `TypeMismatch` for aggregations or filters on incompatible columns
    /// - `ChartBinding` when a chart axis names a column the result table
    ///   lacks or violates the chart's type rules
    pub fn execute(&self, dataset: &Dataset, plan: &OperationPlan) -> Result<ExecutionResult, ExecutionError> {
        let steps = plan.steps();
        let mut table = dataset.table().clone();
        let mut index = 0;

        while index < steps.len() {
            match &steps[index] {
                Operation::Filter { column, predicate, value } => {
                    table = filter(&table, column, *predicate, value)?;
                }
                Operation::Sort { column, direction } => {
                    table = sort(&table, column, *direction)?;
                }
                Operation::GroupBy { columns } => {
                    let aggregates = consecutive_aggregates(&steps[index + 1..]);
                    index += aggregates.len();
                    table = group(&table, columns, &aggregates)?;
                }
                Operation::Aggregate { .. } => {
                    let aggregates = consecutive_aggregates(&steps[index..]);
                    index += aggregates.len() - 1;
                    table = group(&table, &[], &aggregates)?;
                }
                Operation::Chart(_) => {}
            }
            tracing::trace!(step = %steps[index], rows = table.row_count(), "plan step applied");
            index += 1;
        }

        let chart_op = plan.chart();
        let lookup = |axis: &'static str, name: &str| {
            table.resolve(name).ok_or_else(|| ExecutionError::ChartBinding {
                chart: chart_op.chart_type,
                axis,
                column: name.to_string(),
                reason: "the result table has no such column".into(),
            })
        };
        let x = lookup("x", &chart_op.x)?;
        let y = lookup("y", &chart_op.y)?;
        let series = chart_op.series.as_deref().map(|name| lookup("series", name)).transpose()?;
        let chart = ChartSpec::bind(chart_op.chart_type, x, y, series, chart_op.title.as_deref())?;

        let summary = ResultSummary::of(&table);
        tracing::debug!(rows = table.row_count(), chart = %chart.chart_type, "plan executed");
        Ok(ExecutionResult { table, chart, summary })
    }
}

fn unknown(column: &str) -> ExecutionError {
    ExecutionError::UnknownColumn {
        column: column.to_string(),
    }
}

fn consecutive_aggregates(steps: &[Operation]) -> Vec<(&str, AggregateFn)> {
    steps
        .iter()
        .map_while(|op| match op {
            Operation::Aggregate { column, function } => Some((column.as_str(), *function)),
            _ => None,
        })
        .collect()
}

fn mismatch(column: &Column, operation: &'static str, reason: impl Into<String>) -> ExecutionError {
    ExecutionError::TypeMismatch {
        column: column.name().to_string(),
        operation,
        found: column.column_type(),
        reason: reason.into(),
    }
}

// ---------------------------------------------------------------------------
// filter
// ---------------------------------------------------------------------------

fn filter(table: &Table, name: &str, predicate: Predicate, literal: &Literal) -> Result<Table, ExecutionError> {
    let column = table.resolve(name).ok_or_else(|| unknown(name))?;

    if predicate == Predicate::Contains && !column.column_type().is_textual() {
        return Err(mismatch(column, "filter", "contains applies to text columns only"));
    }

    let operands = match (predicate, literal) {
        (Predicate::In, Literal::List(items)) => items
            .iter()
            .map(|item| coerce(column, item))
            .collect::<Result<Vec<_>, _>>()?,
        (_, Literal::List(_)) => {
            return Err(mismatch(
                column,
                "filter",
                format!("'{}' takes a single value, not a list", predicate.as_str()),
            ))
        }
        (_, scalar) => vec![coerce(column, scalar)?],
    };

    let rows: Vec<usize> = column
        .values()
        .iter()
        .enumerate()
        .filter(|(_, cell)| satisfies(cell, predicate, &operands))
        .map(|(row, _)| row)
        .collect();
    Ok(table.select_rows(&rows))
}

fn coerce(column: &Column, literal: &Literal) -> Result<Value, ExecutionError> {
    match (column.column_type(), literal) {
        (ColumnType::Numeric, Literal::Number(n)) => Ok(Value::Number(*n)),
        (ColumnType::Numeric, Literal::Text(s)) => parse_number(s)
            .map(Value::Number)
            .ok_or_else(|| mismatch(column, "filter", format!("\"{s}\" is not a number"))),
        (ColumnType::Datetime, Literal::Text(s)) => parse_datetime(s)
            .map(Value::DateTime)
            .ok_or_else(|| mismatch(column, "filter", format!("\"{s}\" is not a date"))),
        (ColumnType::Datetime, Literal::Number(n)) => Err(mismatch(
            column,
            "filter",
            format!("{} is not a date", format_number(*n)),
        )),
        (ColumnType::Categorical | ColumnType::Text, Literal::Number(n)) => Ok(Value::Text(format_number(*n))),
        (ColumnType::Categorical | ColumnType::Text, Literal::Text(s)) => Ok(Value::Text(s.clone())),
        (_, Literal::List(_)) => Err(mismatch(column, "filter", "nested lists are not allowed")),
    }
}

fn satisfies(cell: &Value, predicate: Predicate, operands: &[Value]) -> bool {
    if cell.is_null() {
        return predicate == Predicate::Ne;
    }
    let Some(first) = operands.first() else {
        return false;
    };
    let ordering = cell.compare(first);
    match predicate {
        Predicate::Eq => ordering == Ordering::Equal,
        Predicate::Ne => ordering != Ordering::Equal,
        Predicate::Gt => ordering == Ordering::Greater,
        Predicate::Ge => ordering != Ordering::Less,
        Predicate::Lt => ordering == Ordering::Less,
        Predicate::Le => ordering != Ordering::Greater,
        Predicate::In => operands.iter().any(|op| cell.compare(op) == Ordering::Equal),
        Predicate::Contains => match (cell.as_text(), first.as_text()) {
            (Some(haystack), Some(needle)) => haystack.contains(needle),
            _ => false,
        },
    }
}

// ---------------------------------------------------------------------------
// sort
// ---------------------------------------------------------------------------

fn sort(table: &Table, name: &str, direction: SortDirection) -> Result<Table, ExecutionError> {
    let values = table.resolve(name).ok_or_else(|| unknown(name))?.values();
    let mut rows: Vec<usize> = (0..table.row_count()).collect();

    // slice::sort_by is stable; nulls go last in either direction
    rows.sort_by(|&a, &b| match (values[a].is_null(), values[b].is_null()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => {
            let ordering = values[a].compare(&values[b]);
            match direction {
                SortDirection::Asc => ordering,
                SortDirection::Desc => ordering.reverse(),
            }
        }
    });
    Ok(table.select_rows(&rows))
}

// ---------------------------------------------------------------------------
// group_by / aggregate
// ---------------------------------------------------------------------------

fn group(table: &Table, keys: &[String], aggregates: &[(&str, AggregateFn)]) -> Result<Table, ExecutionError> {
    let mut key_columns: Vec<&Column> = Vec::with_capacity(keys.len());
    for key in keys {
        let column = table.resolve(key).ok_or_else(|| unknown(key))?;
        if !key_columns.iter().any(|c| c.name() == column.name()) {
            key_columns.push(column);
        }
    }

    let inputs: Vec<(&Column, AggregateFn)> = aggregates
        .iter()
        .map(|&(name, function)| {
            let column = table.resolve(name).ok_or_else(|| unknown(name))?;
            check_aggregate(column, function)?;
            Ok((column, function))
        })
        .collect::<Result<_, ExecutionError>>()?;

    let groups: Vec<Vec<usize>> = if key_columns.is_empty() {
        if table.is_empty() {
            Vec::new()
        } else {
            vec![(0..table.row_count()).collect()]
        }
    } else {
        let mut by_key: IndexMap<Vec<ValueKey>, Vec<usize>> = IndexMap::new();
        for row in 0..table.row_count() {
            let key = key_columns.iter().map(|c| c.values()[row].key()).collect();
            by_key.entry(key).or_default().push(row);
        }
        by_key.into_values().collect()
    };

    let mut used: HashSet<String> = key_columns.iter().map(|c| c.name().to_string()).collect();
    let mut columns: Vec<Column> = key_columns
        .iter()
        .map(|c| {
            let values = groups.iter().map(|rows| c.values()[rows[0]].clone()).collect();
            let mut out = Column::new(c.name(), c.column_type(), values);
            if let Some(lineage) = c.lineage() {
                out = out.with_lineage(lineage.clone());
            }
            out
        })
        .collect();

    if inputs.is_empty() {
        let name = unique_name(&mut used, "count".to_string(), || "row_count".to_string());
        let counts = groups.iter().map(|rows| Value::Number(rows.len() as f64)).collect();
        columns.push(Column::new(name, ColumnType::Numeric, counts));
    }

    for (column, function) in inputs {
        let preferred = match function {
            AggregateFn::Count => format!("count_{}", column.name()),
            _ => column.name().to_string(),
        };
        let name = unique_name(&mut used, preferred, || format!("{function}_{}", column.name()));
        let values = groups
            .iter()
            .map(|rows| reduce(column.values(), rows, function))
            .collect();
        let output_type = match function {
            AggregateFn::Min | AggregateFn::Max => column.column_type(),
            _ => ColumnType::Numeric,
        };
        columns.push(Column::new(name, output_type, values).with_lineage(Lineage {
            source_column: column.name().to_string(),
            function,
        }));
    }

    Ok(Table::from_parts(columns, groups.len()))
}

fn check_aggregate(column: &Column, function: AggregateFn) -> Result<(), ExecutionError> {
    let ok = match function {
        AggregateFn::Sum | AggregateFn::Mean => column.column_type() == ColumnType::Numeric,
        AggregateFn::Min | AggregateFn::Max => {
            matches!(column.column_type(), ColumnType::Numeric | ColumnType::Datetime)
        }
        AggregateFn::Count => true,
    };
    if ok {
        Ok(())
    } else {
        let needs = match function {
            AggregateFn::Min | AggregateFn::Max => "a numeric or datetime column",
            _ => "a numeric column",
        };
        Err(mismatch(column, "aggregate", format!("{function} needs {needs}")))
    }
}

fn unique_name(used: &mut HashSet<String>, preferred: String, fallback: impl FnOnce() -> String) -> String {
    let name = if used.contains(&preferred) {
        let base = fallback();
        let mut candidate = base.clone();
        let mut n = 2;
        while used.contains(&candidate) {
            candidate = format!("{base}_{n}");
            n += 1;
        }
        candidate
    } else {
        preferred
    };
    used.insert(name.clone());
    name
}

fn reduce(values: &[Value], rows: &[usize], function: AggregateFn) -> Value {
    let present = rows.iter().map(|&r| &values[r]).filter(|v| !v.is_null());
    match function {
        AggregateFn::Count => Value::Number(present.count() as f64),
        AggregateFn::Sum => {
            let numbers: Vec<f64> = present.filter_map(Value::as_f64).collect();
            if numbers.is_empty() {
                Value::Null
            } else {
                Value::Number(numbers.iter().sum())
            }
        }
        AggregateFn::Mean => {
            let numbers: Vec<f64> = present.filter_map(Value::as_f64).collect();
            if numbers.is_empty() {
                Value::Null
            } else {
                Value::Number(numbers.iter().sum::<f64>() / numbers.len() as f64)
            }
        }
        AggregateFn::Min => present.min_by(|a, b| a.compare(b)).cloned().unwrap_or(Value::Null),
        AggregateFn::Max => present.max_by(|a, b| a.compare(b)).cloned().unwrap_or(Value::Null),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::{ChartOp, ChartType};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn sales() -> Dataset {
        Dataset::from_records(&[
            json!({"cust_id": "C1", "qty": 2, "amt": 10.0, "dt": "2024-01-01", "region": "West"}),
            json!({"cust_id": "C2", "qty": 1, "amt": 5.5, "dt": "2024-01-02", "region": "East"}),
            json!({"cust_id": "C1", "qty": 4, "amt": 20.0, "dt": "2024-01-03", "region": "West"}),
            json!({"cust_id": "C3", "qty": 3, "amt": null, "dt": "2024-01-04", "region": "North"}),
            json!({"cust_id": "C2", "qty": 5, "amt": 7.5, "dt": "2024-01-05", "region": "East"}),
        ])
        .unwrap()
    }

    fn chart(chart_type: ChartType, x: &str, y: &str) -> Operation {
        Operation::Chart(ChartOp {
            chart_type,
            x: x.into(),
            y: y.into(),
            series: None,
            title: None,
        })
    }

    fn run(ops: Vec<Operation>) -> Result<ExecutionResult, ExecutionError> {
        PlanExecutor::new().execute(&sales(), &OperationPlan::new(ops).unwrap())
    }

    fn column<'a>(result: &'a ExecutionResult, name: &str) -> &'a [Value] {
        result.table.column(name).unwrap().values()
    }

    #[test]
    fn total_amount_by_customer() {
        let result = run(vec![
            Operation::GroupBy {
                columns: vec!["cust_id".into()],
            },
            Operation::Aggregate {
                column: "amt".into(),
                function: AggregateFn::Sum,
            },
            chart(ChartType::Bar, "cust_id", "amt"),
        ])
        .unwrap();

        assert_eq!(result.table.row_count(), 3);
        assert_eq!(
            column(&result, "cust_id"),
            &[Value::Text("C1".into()), Value::Text("C2".into()), Value::Text("C3".into())]
        );
        assert_eq!(
            column(&result, "amt"),
            &[Value::Number(30.0), Value::Number(13.0), Value::Null]
        );
        assert_eq!(result.chart.y.column, "amt");
    }

    #[test]
    fn group_by_without_aggregate_counts_rows() {
        let result = run(vec![
            Operation::GroupBy {
                columns: vec!["region".into()],
            },
            chart(ChartType::Pie, "region", "count"),
        ])
        .unwrap();
        assert_eq!(
            column(&result, "count"),
            &[Value::Number(2.0), Value::Number(2.0), Value::Number(1.0)]
        );
    }

    #[test]
    fn colliding_aggregates_get_prefixed_names() {
        let result = run(vec![
            Operation::GroupBy {
                columns: vec!["region".into()],
            },
            Operation::Aggregate {
                column: "amt".into(),
                function: AggregateFn::Sum,
            },
            Operation::Aggregate {
                column: "amt".into(),
                function: AggregateFn::Mean,
            },
            Operation::Aggregate {
                column: "amt".into(),
                function: AggregateFn::Count,
            },
            chart(ChartType::Table, "region", "mean_amt"),
        ])
        .unwrap();

        let names: Vec<&str> = result.table.column_names().collect();
        assert_eq!(names, vec!["region", "amt", "mean_amt", "count_amt"]);
        assert_eq!(column(&result, "count_amt")[2], Value::Number(0.0));
        assert_eq!(column(&result, "mean_amt")[2], Value::Null);
    }

    #[test]
    fn whole_table_reduction() {
        let result = run(vec![
            Operation::Aggregate {
                column: "qty".into(),
                function: AggregateFn::Max,
            },
            chart(ChartType::Table, "qty", "qty"),
        ])
        .unwrap();
        assert_eq!(result.table.row_count(), 1);
        assert_eq!(column(&result, "qty"), &[Value::Number(5.0)]);
    }

    #[test]
    fn reduction_of_empty_table_emits_no_row() {
        let result = run(vec![
            Operation::Filter {
                column: "region".into(),
                predicate: Predicate::Eq,
                value: Literal::Text("South".into()),
            },
            Operation::Aggregate {
                column: "amt".into(),
                function: AggregateFn::Sum,
            },
            chart(ChartType::Table, "amt", "amt"),
        ])
        .unwrap();
        assert!(result.table.is_empty());
    }

    #[test]
    fn sum_of_text_is_type_mismatch() {
        let err = run(vec![
            Operation::Aggregate {
                column: "region".into(),
                function: AggregateFn::Sum,
            },
            chart(ChartType::Table, "region", "region"),
        ])
        .unwrap_err();
        assert!(matches!(err, ExecutionError::TypeMismatch { operation: "aggregate", .. }));
        assert!(err.is_plan_fixable());
    }

    #[test]
    fn max_of_dates_keeps_datetime_type() {
        let result = run(vec![
            Operation::GroupBy {
                columns: vec!["region".into()],
            },
            Operation::Aggregate {
                column: "dt".into(),
                function: AggregateFn::Max,
            },
            chart(ChartType::Table, "region", "dt"),
        ])
        .unwrap();
        assert_eq!(result.table.column("dt").unwrap().column_type(), ColumnType::Datetime);
    }

    #[test]
    fn filters_coerce_operands() {
        let result = run(vec![
            Operation::Filter {
                column: "qty".into(),
                predicate: Predicate::Ge,
                value: Literal::Text("3".into()),
            },
            Operation::Filter {
                column: "dt".into(),
                predicate: Predicate::Lt,
                value: Literal::Text("2024-01-05".into()),
            },
            chart(ChartType::Table, "cust_id", "qty"),
        ])
        .unwrap();
        assert_eq!(column(&result, "qty"), &[Value::Number(4.0), Value::Number(3.0)]);
        assert_eq!(result.table.column_count(), 5);
    }

    #[test]
    fn filter_in_and_contains() {
        let result = run(vec![
            Operation::Filter {
                column: "region".into(),
                predicate: Predicate::In,
                value: Literal::List(vec![Literal::Text("East".into()), Literal::Text("North".into())]),
            },
            Operation::Filter {
                column: "cust_id".into(),
                predicate: Predicate::Contains,
                value: Literal::Text("2".into()),
            },
            chart(ChartType::Table, "cust_id", "amt"),
        ])
        .unwrap();
        assert_eq!(result.table.row_count(), 2);
    }

    #[test]
    fn null_cells_only_match_not_equal() {
        let keep = run(vec![
            Operation::Filter {
                column: "amt".into(),
                predicate: Predicate::Ne,
                value: Literal::Number(10.0),
            },
            chart(ChartType::Table, "cust_id", "amt"),
        ])
        .unwrap();
        assert_eq!(keep.table.row_count(), 4);

        let drop = run(vec![
            Operation::Filter {
                column: "amt".into(),
                predicate: Predicate::Le,
                value: Literal::Number(100.0),
            },
            chart(ChartType::Table, "cust_id", "amt"),
        ])
        .unwrap();
        assert_eq!(drop.table.row_count(), 4);
    }

    #[test]
    fn uncoercible_filter_value_is_type_mismatch() {
        let err = run(vec![
            Operation::Filter {
                column: "amt".into(),
                predicate: Predicate::Gt,
                value: Literal::Text("lots".into()),
            },
            chart(ChartType::Table, "cust_id", "amt"),
        ])
        .unwrap_err();
        assert!(matches!(err, ExecutionError::TypeMismatch { operation: "filter", .. }));

        let err = run(vec![
            Operation::Filter {
                column: "qty".into(),
                predicate: Predicate::Contains,
                value: Literal::Text("1".into()),
            },
            chart(ChartType::Table, "cust_id", "qty"),
        ])
        .unwrap_err();
        assert!(matches!(err, ExecutionError::TypeMismatch { .. }));
    }

    #[test]
    fn sort_is_stable_with_nulls_last() {
        let result = run(vec![
            Operation::Sort {
                column: "region".into(),
                direction: SortDirection::Asc,
            },
            Operation::Sort {
                column: "amt".into(),
                direction: SortDirection::Desc,
            },
            chart(ChartType::Table, "cust_id", "amt"),
        ])
        .unwrap();
        assert_eq!(
            column(&result, "amt"),
            &[
                Value::Number(20.0),
                Value::Number(10.0),
                Value::Number(7.5),
                Value::Number(5.5),
                Value::Null
            ]
        );

        let tied = run(vec![
            Operation::Sort {
                column: "region".into(),
                direction: SortDirection::Asc,
            },
            chart(ChartType::Table, "region", "qty"),
        ])
        .unwrap();
        // East rows keep their original relative order (qty 1 then 5)
        assert_eq!(&column(&tied, "qty")[..2], &[Value::Number(1.0), Value::Number(5.0)]);
    }

    #[test]
    fn chart_on_a_column_dropped_by_grouping_is_a_binding_error() {
        let err = run(vec![
            Operation::GroupBy {
                columns: vec!["region".into()],
            },
            Operation::Aggregate {
                column: "amt".into(),
                function: AggregateFn::Sum,
            },
            chart(ChartType::Bar, "cust_id", "amt"),
        ])
        .unwrap_err();
        assert_eq!(
            err,
            ExecutionError::ChartBinding {
                chart: ChartType::Bar,
                axis: "x",
                column: "cust_id".into(),
                reason: "the result table has no such column".into(),
            }
        );
        assert!(err.is_plan_fixable());
    }

    #[test]
    fn sort_on_a_dropped_column_is_plan_fixable() {
        let err = run(vec![
            Operation::GroupBy {
                columns: vec!["region".into()],
            },
            Operation::Sort {
                column: "amt".into(),
                direction: SortDirection::Desc,
            },
            chart(ChartType::Bar, "region", "count"),
        ])
        .unwrap_err();
        assert_eq!(err, ExecutionError::UnknownColumn { column: "amt".into() });
        assert!(err.is_plan_fixable());
        assert!(!ExecutionError::InvalidPlan(crate::PlanError::MissingChart).is_plan_fixable());
    }

    #[test]
    fn chart_binding_failure_surfaces() {
        let err = run(vec![chart(ChartType::Bar, "region", "cust_id")]).unwrap_err();
        assert!(matches!(err, ExecutionError::ChartBinding { axis: "y", .. }));
    }

    #[test]
    fn chart_resolves_source_names_through_lineage() {
        let result = run(vec![
            Operation::GroupBy {
                columns: vec!["region".into()],
            },
            Operation::Aggregate {
                column: "amt".into(),
                function: AggregateFn::Count,
            },
            chart(ChartType::Bar, "region", "amt"),
        ])
        .unwrap();
        assert_eq!(result.chart.y.column, "count_amt");
    }

    #[test]
    fn input_dataset_is_untouched() {
        let dataset = sales();
        let before = dataset.clone();
        let plan = OperationPlan::new(vec![
            Operation::Sort {
                column: "amt".into(),
                direction: SortDirection::Desc,
            },
            chart(ChartType::Table, "cust_id", "amt"),
        ])
        .unwrap();
        PlanExecutor::new().execute(&dataset, &plan).unwrap();
        assert_eq!(dataset, before);
    }
}
