//! Declarative chart specifications
//!
//! A [`ChartSpec`] binds columns of a materialized result table to axes.
//! It never contains rendered output; renderers consume it together with
//! the table.

use crate::dataset::ColumnType;
use crate::error::ExecutionError;
use crate::plan::ChartType;
use crate::table::Column;
use serde::Serialize;

/// Column bound to one chart axis
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AxisBinding {
    /// Result-table column
    pub column: String,
    /// Type of that column
    pub column_type: ColumnType,
    /// Display label (business label when known)
    pub label: String,
}

impl AxisBinding {
    fn of(column: &Column) -> Self {
        Self {
            column: column.name().to_string(),
            column_type: column.column_type(),
            label: column.name().to_string(),
        }
    }
}

/// Renderer-agnostic chart description
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChartSpec {
    /// Chart type
    pub chart_type: ChartType,
    /// Title
    pub title: String,
    /// X axis (categories for pie)
    pub x: AxisBinding,
    /// Y axis (values for pie)
    pub y: AxisBinding,
    /// Series/color binding
    #[serde(skip_serializing_if = "Option::is_none")]
    pub series: Option<AxisBinding>,
}

impl ChartSpec {
    pub(crate) fn bind(
        chart_type: ChartType,
        x: &Column,
        y: &Column,
        series: Option<&Column>,
        title: Option<&str>,
    ) -> Result<Self, ExecutionError> {
        check_binding(chart_type, x, y, series)?;
        Ok(Self {
            chart_type,
            title: title.map_or_else(|| format!("{} by {}", y.name(), x.name()), str::to_string),
            x: AxisBinding::of(x),
            y: AxisBinding::of(y),
            series: series.map(AxisBinding::of),
        })
    }

    /// Result-table columns the chart reads
    #[must_use]
    pub fn bound_columns(&self) -> Vec<&str> {
        let mut columns = vec![self.x.column.as_str(), self.y.column.as_str()];
        columns.extend(self.series.as_ref().map(|s| s.column.as_str()));
        columns
    }

    /// With title
    #[inline]
    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    /// Replace axis labels wherever `label_for` knows a better name for the bound column
    #[must_use]
    pub fn relabel(mut self, label_for: impl Fn(&str) -> Option<String>) -> Self {
        for axis in [Some(&mut self.x), Some(&mut self.y), self.series.as_mut()]
            .into_iter()
            .flatten()
        {
            if let Some(label) = label_for(&axis.column) {
                axis.label = label;
            }
        }
        self
    }
}

fn check_binding(
    chart_type: ChartType,
    x: &Column,
    y: &Column,
    series: Option<&Column>,
) -> Result<(), ExecutionError> {
    let fail = |axis: &'static str, column: &Column, reason: &str| ExecutionError::ChartBinding {
        chart: chart_type,
        axis,
        column: column.name().to_string(),
        reason: reason.to_string(),
    };

    if let Some(series) = series {
        if chart_type == ChartType::Pie {
            return Err(fail("series", series, "pie charts take no series"));
        }
        if chart_type != ChartType::Table && !series.column_type().is_textual() {
            return Err(fail("series", series, "series must be categorical or text"));
        }
    }

    match chart_type {
        ChartType::Bar | ChartType::Pie => {
            if y.column_type() != ColumnType::Numeric {
                return Err(fail("y", y, "value axis must be numeric"));
            }
            if x.column_type() == ColumnType::Numeric
                && x.distinct_count() < x.values().iter().filter(|v| !v.is_null()).count()
            {
                return Err(fail(
                    "x",
                    x,
                    "category axis must be categorical, or numeric with one row per value",
                ));
            }
        }
        ChartType::Line => {
            if y.column_type() != ColumnType::Numeric {
                return Err(fail("y", y, "value axis must be numeric"));
            }
        }
        ChartType::Scatter => {
            if !matches!(x.column_type(), ColumnType::Numeric | ColumnType::Datetime) {
                return Err(fail("x", x, "x axis must be numeric or datetime"));
            }
            if y.column_type() != ColumnType::Numeric {
                return Err(fail("y", y, "y axis must be numeric"));
            }
        }
        ChartType::Table => {}
    }
    Ok(())
}
