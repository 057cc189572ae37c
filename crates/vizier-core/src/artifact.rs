//! Completed visualizations and their in-memory store

use crate::mapping::SchemaMapping;
use crate::qa::QaVerdict;
use crate::registry::FileId;
use chrono::{DateTime, Utc};
use moka::future::Cache;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use ulid::Ulid;
use vizier_plan::{ChartSpec, OperationPlan, RenderedChart, ResultSummary, Table};

/// Everything produced by a successful pipeline run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VisualizationArtifact {
    /// Identifier for later retrieval
    pub viz_id: Ulid,
    /// Source upload
    pub file_id: FileId,
    /// Request text
    pub requirement: String,
    /// Chart specification, labelled with business names
    pub chart_spec: ChartSpec,
    /// Plain-language explanation
    pub explanation: String,
    /// Result table
    pub table: Table,
    /// Statistics over `table`
    pub summary: ResultSummary,
    /// Plan that produced the result, over technical names
    pub plan: OperationPlan,
    /// Mapping used
    pub schema_mapping: SchemaMapping,
    /// Final QA verdict
    pub qa: QaVerdict,
    /// Renderer output, when a renderer is configured
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rendered: Option<RenderedChart>,
    /// Interpretations tried, including the successful one
    pub attempts: u32,
    /// Completion time
    pub created_at: DateTime<Utc>,
}

/// Bounded, expiring store of completed visualizations
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    inner: Cache<Ulid, Arc<VisualizationArtifact>>,
}

impl ArtifactStore {
    /// Store holding at most `max_capacity` artifacts
    #[inline]
    #[must_use]
    pub fn new(max_capacity: u64) -> Self {
        Self {
            inner: Cache::new(max_capacity),
        }
    }

    /// Store whose entries also expire after `ttl`
    #[inline]
    #[must_use]
    pub fn with_ttl(max_capacity: u64, ttl: Duration) -> Self {
        Self {
            inner: Cache::builder()
                .max_capacity(max_capacity)
                .time_to_live(ttl)
                .build(),
        }
    }

    /// Keep `artifact` under its `viz_id`
    pub async fn insert(&self, artifact: Arc<VisualizationArtifact>) {
        self.inner.insert(artifact.viz_id, artifact).await;
    }

    /// Artifact stored under `viz_id`
    pub async fn get(&self, viz_id: &Ulid) -> Option<Arc<VisualizationArtifact>> {
        self.inner.get(viz_id).await
    }

    /// Forget `viz_id`
    #[inline]
    pub async fn invalidate(&self, viz_id: &Ulid) {
        self.inner.invalidate(viz_id).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::qa::QaGate;
    use vizier_plan::{AggregateFn, ChartOp, ChartType, Operation, PlanExecutor};
    use vizier_test_utils::sales_dataset;

    fn artifact() -> Arc<VisualizationArtifact> {
        let dataset = sales_dataset();
        let plan = OperationPlan::new(vec![
            Operation::Aggregate {
                column: "amt".into(),
                function: AggregateFn::Sum,
            },
            Operation::Chart(ChartOp {
                chart_type: ChartType::Table,
                x: "amt".into(),
                y: "amt".into(),
                series: None,
                title: None,
            }),
        ])
        .unwrap();
        let result = PlanExecutor::new().execute(&dataset, &plan).unwrap();
        let qa = QaGate::default().evaluate("total amount", &plan, &result, &dataset);

        Arc::new(VisualizationArtifact {
            viz_id: Ulid::new(),
            file_id: FileId::new("upload"),
            requirement: "total amount".into(),
            chart_spec: result.chart,
            explanation: String::new(),
            table: result.table,
            summary: result.summary,
            plan,
            schema_mapping: SchemaMapping::new(),
            qa,
            rendered: None,
            attempts: 1,
            created_at: Utc::now(),
        })
    }

    #[tokio::test]
    async fn insert_then_get() {
        let store = ArtifactStore::new(8);
        let artifact = artifact();
        store.insert(Arc::clone(&artifact)).await;

        assert_eq!(store.get(&artifact.viz_id).await, Some(artifact.clone()));
        store.invalidate(&artifact.viz_id).await;
        assert!(store.get(&artifact.viz_id).await.is_none());
    }

    #[tokio::test]
    async fn unknown_id_is_none() {
        let store = ArtifactStore::with_ttl(8, Duration::from_secs(60));
        assert!(store.get(&Ulid::new()).await.is_none());
    }
}
