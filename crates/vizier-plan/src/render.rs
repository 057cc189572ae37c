//! Rendering adapters
//!
//! A [`ChartRenderer`] turns a chart specification plus its result table
//! into a displayable document. [`VegaLiteRenderer`] emits a self-contained
//! Vega-Lite v5 JSON document with the table inlined as data.

use crate::chart::{AxisBinding, ChartSpec};
use crate::dataset::ColumnType;
use crate::error::RenderError;
use crate::plan::ChartType;
use crate::table::Table;
use serde::Serialize;
use serde_json::{json, Value as Json};

const VEGA_LITE_SCHEMA: &str = "https://vega.github.io/schema/vega-lite/v5.json";

/// Rendered chart document
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderedChart {
    /// Media type of `document`
    pub media_type: String,
    /// Document body
    pub document: Json,
}

/// Converts chart specifications into displayable documents
pub trait ChartRenderer: Send + Sync {
    /// Render `spec` over `table`
    ///
    /// # Errors
    /// `RenderError` when the spec binds columns the table does not have,
    /// or when the table cannot be written into the document
    fn render(&self, spec: &ChartSpec, table: &Table) -> Result<RenderedChart, RenderError>;
}

/// Vega-Lite JSON renderer
#[derive(Debug, Clone, Copy, Default)]
pub struct VegaLiteRenderer;

impl VegaLiteRenderer {
    /// Media type of the documents this renderer produces
    pub const MEDIA_TYPE: &'static str = "application/vnd.vegalite.v5+json";
}

impl ChartRenderer for VegaLiteRenderer {
    fn render(&self, spec: &ChartSpec, table: &Table) -> Result<RenderedChart, RenderError> {
        for column in spec.bound_columns() {
            if table.column(column).is_none() {
                return Err(RenderError::MissingColumn {
                    column: column.to_string(),
                });
            }
        }

        let data = serde_json::to_value(table.rows()).map_err(|e| RenderError::Data(e.to_string()))?;
        let mut document = json!({
            "$schema": VEGA_LITE_SCHEMA,
            "title": spec.title,
            "data": { "values": data },
        });

        let (mark, encoding) = match spec.chart_type {
            ChartType::Bar => ("bar", axes(spec)),
            ChartType::Line => ("line", axes(spec)),
            ChartType::Scatter => ("point", axes(spec)),
            ChartType::Pie => (
                "arc",
                json!({
                    "theta": channel(&spec.y),
                    "color": channel(&spec.x),
                }),
            ),
            ChartType::Table => (
                "text",
                json!({
                    "row": channel(&spec.x),
                    "text": channel(&spec.y),
                }),
            ),
        };
        document["mark"] = json!({ "type": mark, "tooltip": true });
        document["encoding"] = encoding;

        Ok(RenderedChart {
            media_type: Self::MEDIA_TYPE.to_string(),
            document,
        })
    }
}

fn axes(spec: &ChartSpec) -> Json {
    let mut encoding = json!({
        "x": channel(&spec.x),
        "y": channel(&spec.y),
    });
    if let Some(series) = &spec.series {
        encoding["color"] = channel(series);
    }
    encoding
}

fn channel(axis: &AxisBinding) -> Json {
    let kind = match axis.column_type {
        ColumnType::Numeric => "quantitative",
        ColumnType::Datetime => "temporal",
        ColumnType::Categorical | ColumnType::Text => "nominal",
    };
    json!({ "field": axis.column, "type": kind, "title": axis.label })
}
