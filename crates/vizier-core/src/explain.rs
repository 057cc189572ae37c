//! Plain-language presentation of a finished result
//!
//! Deterministic templating over the plan, the result table's lineage and
//! the schema mapping. No model call is involved.

use crate::mapping::SchemaMapping;
use crate::qa::QaVerdict;
use vizier_plan::{AggregateFn, ChartSpec, ChartType, ExecutionResult, Literal, OperationPlan, SortDirection, Table, Value};

/// Wording for an aggregate over a label
fn aggregate_phrase(function: AggregateFn) -> &'static str {
    match function {
        AggregateFn::Sum => "total",
        AggregateFn::Mean => "average",
        AggregateFn::Count => "number of",
        AggregateFn::Min => "minimum",
        AggregateFn::Max => "maximum",
    }
}

/// Display label for a result-table column
///
/// Aggregate outputs read as "total Amount"; the implicit group count reads
/// as "number of rows"; anything else takes its business label.
#[must_use]
pub fn axis_label(table: &Table, column: &str, mapping: &SchemaMapping) -> String {
    match table.column(column).and_then(|c| c.lineage()) {
        Some(lineage) => format!(
            "{} {}",
            aggregate_phrase(lineage.function),
            mapping.label(&lineage.source_column)
        ),
        None if mapping.get(column).is_none() && column == crate::interpreter::GROUP_COUNT_COLUMN => {
            "number of rows".to_string()
        }
        None => mapping.label(column).to_string(),
    }
}

/// Replace technical names on the chart with business wording
///
/// A title set by the plan is kept.
#[must_use]
pub fn label_chart(chart: ChartSpec, plan: &OperationPlan, table: &Table, mapping: &SchemaMapping) -> ChartSpec {
    let chart = chart.relabel(|column| Some(axis_label(table, column, mapping)));
    if plan.chart().title.is_some() {
        return chart;
    }
    let title = format!("{} by {}", capitalize(&chart.y.label), chart.x.label);
    chart.with_title(title)
}

/// Explain `result` in a few sentences
///
/// Expects the chart already passed through [`label_chart`].
#[must_use]
pub fn explain(plan: &OperationPlan, result: &ExecutionResult, mapping: &SchemaMapping, verdict: &QaVerdict) -> String {
    let chart = &result.chart;
    let mut sentences = Vec::new();

    let mut headline = format!("{} showing {} by {}", chart_noun(chart.chart_type), chart.y.label, chart.x.label);
    if let Some(series) = &chart.series {
        headline.push_str(&format!(", split by {}", series.label));
    }
    sentences.push(headline);

    let filters: Vec<String> = plan
        .filters()
        .map(|(column, predicate, value)| format!("{} {} {}", mapping.label(column), predicate.phrase(), literal(value)))
        .collect();
    if !filters.is_empty() {
        sentences.push(format!("Only rows where {} are included", filters.join(" and ")));
    }

    if let Some((column, direction)) = plan.final_sort() {
        let order = match direction {
            SortDirection::Asc => "ascending",
            SortDirection::Desc => "descending",
        };
        sentences.push(format!("Sorted by {} in {order} order", mapping.label(column)));
    }

    let rows = result.summary.rows;
    let mut shape = format!("The result has {rows} row{}", if rows == 1 { "" } else { "s" });
    if let Some(stats) = result.summary.numeric.get(&chart.y.column).filter(|_| rows > 1) {
        shape.push_str(&format!(
            ", with {} ranging from {} to {}",
            chart.y.label,
            number(stats.min),
            number(stats.max)
        ));
    }
    sentences.push(shape);

    let degraded: Vec<&str> = mapping.degraded().collect();
    if !degraded.is_empty() {
        sentences.push(format!(
            "No business name could be found for {}, so technical names are shown",
            degraded.join(", ")
        ));
    }

    for warning in verdict.warnings() {
        sentences.push(format!("Note: {warning}"));
    }

    let mut text = sentences.join(". ");
    text.push('.');
    text
}

fn chart_noun(chart_type: ChartType) -> &'static str {
    match chart_type {
        ChartType::Bar => "A bar chart",
        ChartType::Line => "A line chart",
        ChartType::Scatter => "A scatter plot",
        ChartType::Pie => "A pie chart",
        ChartType::Table => "A table",
    }
}

fn literal(value: &Literal) -> String {
    match value {
        Literal::Number(n) => number(*n),
        Literal::Text(s) => s.clone(),
        Literal::List(items) => items.iter().map(literal).collect::<Vec<_>>().join(", "),
    }
}

fn number(n: f64) -> String {
    Value::Number((n * 100.0).round() / 100.0).to_string()
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    chars
        .next()
        .map(|first| first.to_uppercase().chain(chars).collect())
        .unwrap_or_default()
}
