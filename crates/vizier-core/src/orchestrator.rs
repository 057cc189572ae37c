//! Pipeline driver
//!
//! ```text
//! MAPPING -> INTERPRETING -> EXECUTING -> VALIDATING -> DONE
//!                 ^              |             |
//!                 +--------------+-------------+   (bounded retries)
//! any stage -> FAILED
//! ```
//!
//! One [`PipelineSession`] per request; nothing is shared between
//! requests except the knowledge base and the artifact store. Retries
//! are sequential: a QA `fail` verdict, or an execution error the
//! interpreter could plausibly fix, sends the run back to interpretation
//! with the reason as feedback, until `max_retries` is spent.

use crate::artifact::{ArtifactStore, VisualizationArtifact};
use crate::config::PipelineConfig;
use crate::error::{PipelineError, PipelineFailure};
use crate::explain::{explain, label_chart};
use crate::interpreter::RequirementInterpreter;
use crate::mapping::{SchemaMapper, SchemaMapping};
use crate::qa::{QaGate, QaVerdict};
use crate::registry::{DatasetRegistry, FileId};
use crate::session::{PipelineSession, PipelineState};
use chrono::Utc;
use indexmap::IndexMap;
use serde::Serialize;
use std::sync::Arc;
use tracing::Instrument;
use ulid::Ulid;
use vizier_knowledge::KnowledgeBase;
use vizier_llm::LanguageModel;
use vizier_plan::{ChartRenderer, ColumnDescriptor, Dataset, PlanExecutor, Row};

/// Ingress from the web layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineRequest {
    /// Uploaded file to visualize
    pub file_id: FileId,
    /// Free-text requirement
    pub requirement: String,
    /// Business labels asserted by the user, by technical column name
    pub overrides: IndexMap<String, String>,
}

impl PipelineRequest {
    /// Request without overrides
    #[must_use]
    pub fn new(file_id: FileId, requirement: impl Into<String>) -> Self {
        Self {
            file_id,
            requirement: requirement.into(),
            overrides: IndexMap::new(),
        }
    }

    /// With a user-asserted label for `column`
    #[must_use]
    pub fn with_override(mut self, column: impl Into<String>, label: impl Into<String>) -> Self {
        self.overrides.insert(column.into(), label.into());
        self
    }
}

/// How one run went
#[derive(Debug, Clone)]
pub struct PipelineReport {
    /// Session identifier, as logged
    pub session_id: Ulid,
    /// States entered, in order
    pub history: Vec<PipelineState>,
    /// Re-interpretations made
    pub retries: u32,
    /// Artifact or structured failure
    pub outcome: Result<Arc<VisualizationArtifact>, PipelineFailure>,
}

impl PipelineReport {
    /// Final state of the run
    #[must_use]
    pub fn final_state(&self) -> PipelineState {
        self.history.last().copied().unwrap_or(PipelineState::Mapping)
    }
}

/// Schema information shown right after upload
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatasetOverview {
    /// Upload
    pub file_id: FileId,
    /// Row count
    pub rows: usize,
    /// Column names, types and example values
    pub columns: Vec<ColumnDescriptor>,
    /// Business labels
    pub schema_mapping: SchemaMapping,
    /// First rows
    pub sample: Vec<Row>,
}

/// Runs requests through mapping, interpretation, execution and QA
pub struct Orchestrator {
    config: PipelineConfig,
    knowledge: Arc<KnowledgeBase>,
    registry: Arc<dyn DatasetRegistry>,
    mapper: SchemaMapper,
    interpreter: RequirementInterpreter,
    executor: PlanExecutor,
    qa: QaGate,
    renderer: Option<Arc<dyn ChartRenderer>>,
    artifacts: ArtifactStore,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("config", &self.config)
            .field("mapper", &self.mapper)
            .field("interpreter", &self.interpreter)
            .field("renders", &self.renderer.is_some())
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    /// Wire up a pipeline
    #[must_use]
    pub fn new(
        config: PipelineConfig,
        knowledge: Arc<KnowledgeBase>,
        model: Arc<dyn LanguageModel>,
        registry: Arc<dyn DatasetRegistry>,
    ) -> Self {
        Self {
            mapper: SchemaMapper::new(Arc::clone(&knowledge), Arc::clone(&model), &config),
            interpreter: RequirementInterpreter::new(model, &config),
            executor: PlanExecutor::new(),
            qa: QaGate::new(config.qa.clone()),
            renderer: None,
            artifacts: ArtifactStore::with_ttl(config.artifact_capacity, config.artifact_ttl()),
            knowledge,
            registry,
            config,
        }
    }

    /// With a renderer applied to every completed chart
    #[must_use]
    pub fn with_renderer(mut self, renderer: Arc<dyn ChartRenderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    /// Configuration in effect
    #[inline]
    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Shared knowledge base
    #[inline]
    #[must_use]
    pub fn knowledge_base(&self) -> &Arc<KnowledgeBase> {
        &self.knowledge
    }

    /// Run `request` to a terminal state
    pub async fn execute(&self, request: PipelineRequest) -> PipelineReport {
        let mut session = PipelineSession::new();
        let span = tracing::info_span!("pipeline", session = %session.id(), file = %request.file_id);

        let outcome = async {
            match self.drive(&mut session, &request).await {
                Ok(artifact) => Ok(artifact),
                Err(err) => {
                    let failure = PipelineFailure::from(&err);
                    if !session.state().is_terminal() {
                        if let Err(e) = session.fail(failure.message.clone()) {
                            tracing::error!(error = %e, "could not record failure");
                        }
                    }
                    tracing::error!(kind = %failure.kind, reason = %failure.message, "pipeline failed");
                    Err(failure)
                }
            }
        }
        .instrument(span)
        .await;

        PipelineReport {
            session_id: session.id(),
            history: session.history().to_vec(),
            retries: session.retries(),
            outcome,
        }
    }

    /// Run `request`, returning only the outcome
    ///
    /// # Errors
    /// `PipelineFailure` describing the terminal failure.
    pub async fn handle(&self, request: PipelineRequest) -> Result<Arc<VisualizationArtifact>, PipelineFailure> {
        self.execute(request).await.outcome
    }

    /// Map a freshly uploaded dataset for display
    ///
    /// # Errors
    /// `PipelineFailure` for an unknown file or a knowledge base failure.
    pub async fn inspect(&self, file_id: &FileId) -> Result<DatasetOverview, PipelineFailure> {
        let overview = async {
            let dataset = self.dataset(file_id)?;
            let columns = dataset.descriptors(self.config.sample_size);
            let schema_mapping = self.mapper.map(&columns).await?;
            Ok::<_, PipelineError>(DatasetOverview {
                file_id: file_id.clone(),
                rows: dataset.row_count(),
                columns,
                schema_mapping,
                sample: dataset.sample(self.config.sample_size),
            })
        }
        .instrument(tracing::info_span!("inspect", file = %file_id))
        .await;
        overview.map_err(PipelineFailure::from)
    }

    /// Completed visualization by id
    pub async fn visualization(&self, viz_id: &Ulid) -> Option<Arc<VisualizationArtifact>> {
        self.artifacts.get(viz_id).await
    }

    fn dataset(&self, file_id: &FileId) -> Result<Arc<Dataset>, PipelineError> {
        self.registry
            .get(file_id)
            .ok_or_else(|| PipelineError::DatasetNotFound(file_id.to_string()))
    }

    async fn drive(
        &self,
        session: &mut PipelineSession,
        request: &PipelineRequest,
    ) -> Result<Arc<VisualizationArtifact>, PipelineError> {
        let dataset = self.dataset(&request.file_id)?;

        let columns = dataset.descriptors(self.config.sample_size);
        session.mapping = self.mapper.map(&columns).await?;
        self.mapper
            .apply_overrides(&mut session.mapping, &request.overrides)?;
        session.advance(PipelineState::Interpreting)?;

        let mut feedback: Option<String> = None;
        loop {
            let plan = self
                .interpreter
                .interpret(&request.requirement, &session.mapping, feedback.as_deref())
                .await?;
            session.advance(PipelineState::Executing)?;

            let result = match self.executor.execute(&dataset, &plan) {
                Ok(result) => result,
                Err(e) if e.is_plan_fixable() && session.retries() < self.config.max_retries => {
                    tracing::warn!(retry = session.retries() + 1, error = %e, "plan not executable, re-interpreting");
                    feedback = Some(e.to_string());
                    session.retry(e.to_string())?;
                    continue;
                }
                Err(e) => return Err(e.into()),
            };
            session.advance(PipelineState::Validating)?;

            let verdict = self
                .qa
                .evaluate(&request.requirement, &plan, &result, &dataset);
            session.plan = Some(plan);
            session.result = Some(result);

            if verdict.approved {
                session.advance(PipelineState::Done)?;
                return self.finish(session, request, verdict).await;
            }
            if session.retries() >= self.config.max_retries {
                return Err(PipelineError::QaRejected {
                    attempts: session.retries() + 1,
                    reason: verdict.reason,
                });
            }
            tracing::warn!(retry = session.retries() + 1, reason = %verdict.reason, "qa rejected, re-interpreting");
            feedback = Some(verdict.reason.clone());
            session.retry(verdict.reason)?;
        }
    }

    async fn finish(
        &self,
        session: &mut PipelineSession,
        request: &PipelineRequest,
        verdict: QaVerdict,
    ) -> Result<Arc<VisualizationArtifact>, PipelineError> {
        let (Some(plan), Some(mut result)) = (session.plan.take(), session.result.take()) else {
            return Err(PipelineError::Internal("validated run has no result"));
        };

        result.chart = label_chart(result.chart, &plan, &result.table, &session.mapping);
        let explanation = explain(&plan, &result, &session.mapping, &verdict);

        let rendered = self
            .renderer
            .as_ref()
            .and_then(|renderer| match renderer.render(&result.chart, &result.table) {
                Ok(rendered) => Some(rendered),
                Err(e) => {
                    tracing::warn!(error = %e, "rendering failed, returning the chart spec only");
                    None
                }
            });

        let artifact = Arc::new(VisualizationArtifact {
            viz_id: Ulid::new(),
            file_id: request.file_id.clone(),
            requirement: request.requirement.clone(),
            chart_spec: result.chart,
            explanation,
            table: result.table,
            summary: result.summary,
            plan,
            schema_mapping: session.mapping.clone(),
            qa: verdict,
            rendered,
            attempts: session.retries() + 1,
            created_at: Utc::now(),
        });
        self.artifacts.insert(Arc::clone(&artifact)).await;

        tracing::info!(
            viz = %artifact.viz_id,
            chart = %artifact.chart_spec.chart_type,
            rows = artifact.summary.rows,
            score = artifact.qa.quality_score,
            "visualization ready"
        );
        Ok(artifact)
    }
}
