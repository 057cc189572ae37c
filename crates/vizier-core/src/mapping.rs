//! Schema mapping: technical column names to business labels
//!
//! [`SchemaMapper`] consults the knowledge base first and batches every
//! miss into a single language-model call. Model trouble never aborts a
//! mapping: affected columns keep their technical name with confidence
//! 0.0 and are flagged `degraded`. The result is total over the input
//! columns.

use crate::config::PipelineConfig;
use crate::error::MappingError;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::sync::Arc;
use vizier_knowledge::{normalize, KnowledgeBase, MappingSource};
use vizier_llm::{infer_bounded, parse_json, InferenceConstraints, LanguageModel, ModelError, Prompt};
use vizier_plan::ColumnDescriptor;

/// Confidence assumed when the model omits one
pub const DEFAULT_MODEL_CONFIDENCE: f64 = 0.8;

const SYSTEM_PROMPT: &str = "You map technical column names from a tabular dataset to short, \
human-readable business labels (for example cust_id -> Customer ID). \
Use the column type and example values as evidence. \
Answer with JSON only, in the form \
{\"mappings\": [{\"column\": \"<technical name>\", \"label\": \"<business label>\", \"confidence\": <0.0-1.0>}]}. \
Include every column you were given, exactly once.";

/// Business meaning resolved for one column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnMapping {
    /// Human-readable label
    pub business_label: String,
    /// Trust in the label, in `[0, 1]`
    pub confidence: f64,
    /// Where the label came from
    pub source: MappingSource,
    /// The model could not label this column; the label is the technical name
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub degraded: bool,
}

impl ColumnMapping {
    /// Fallback for a column the model could not label
    #[must_use]
    pub fn degraded(technical_name: &str) -> Self {
        Self {
            business_label: technical_name.to_string(),
            confidence: 0.0,
            source: MappingSource::ModelInferred,
            degraded: true,
        }
    }

    /// Label asserted by the user
    #[must_use]
    pub fn user_override(label: impl Into<String>) -> Self {
        Self {
            business_label: label.into(),
            confidence: 1.0,
            source: MappingSource::UserOverride,
            degraded: false,
        }
    }
}

/// Column mappings in dataset column order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SchemaMapping {
    columns: IndexMap<String, ColumnMapping>,
}

impl SchemaMapping {
    /// Empty mapping
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the mapping for `column`, keeping its original position
    pub fn insert(&mut self, column: impl Into<String>, mapping: ColumnMapping) {
        self.columns.insert(column.into(), mapping);
    }

    /// Mapping for `column`
    #[must_use]
    pub fn get(&self, column: &str) -> Option<&ColumnMapping> {
        self.columns.get(column)
    }

    /// Business label for `column`, or the name itself when unmapped
    #[must_use]
    pub fn label<'a>(&'a self, column: &'a str) -> &'a str {
        self.columns
            .get(column)
            .map_or(column, |m| m.business_label.as_str())
    }

    /// `(technical name, mapping)` pairs
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ColumnMapping)> {
        self.columns.iter().map(|(name, mapping)| (name.as_str(), mapping))
    }

    /// Technical names
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }

    /// Mapped columns
    #[must_use]
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Whether nothing is mapped
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Columns whose labelling degraded
    pub fn degraded(&self) -> impl Iterator<Item = &str> {
        self.iter().filter(|(_, m)| m.degraded).map(|(name, _)| name)
    }

    /// Resolve a plan reference to a technical column name
    ///
    /// Tried in order: exact technical name, business label (case
    /// insensitive), technical name (case insensitive), then normalized
    /// key. The first column in dataset order wins a tie.
    #[must_use]
    pub fn resolve_reference(&self, reference: &str) -> Option<&str> {
        let wanted = reference.trim();
        if wanted.is_empty() {
            return None;
        }
        if let Some((name, _)) = self.columns.get_key_value(wanted) {
            return Some(name);
        }

        let by_label = self
            .iter()
            .find(|(_, m)| m.business_label.eq_ignore_ascii_case(wanted));
        let by_name = || self.columns().find(|name| name.eq_ignore_ascii_case(wanted));
        let by_key = || {
            let key = normalize(wanted);
            if key.is_empty() {
                return None;
            }
            self.iter()
                .find(|(name, m)| normalize(name) == key || normalize(&m.business_label) == key)
                .map(|(name, _)| name)
        };

        by_label.map(|(name, _)| name).or_else(by_name).or_else(by_key)
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum MappingReply {
    Wrapped { mappings: Vec<ProposedLabel> },
    Bare(Vec<ProposedLabel>),
}

impl MappingReply {
    fn into_labels(self) -> Vec<ProposedLabel> {
        match self {
            Self::Wrapped { mappings } | Self::Bare(mappings) => mappings,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ProposedLabel {
    column: String,
    #[serde(default, alias = "business_label")]
    label: Option<String>,
    #[serde(default)]
    confidence: Option<f64>,
}

/// Knowledge-base-first column labeller
pub struct SchemaMapper {
    knowledge: Arc<KnowledgeBase>,
    model: Arc<dyn LanguageModel>,
    threshold: f64,
    constraints: InferenceConstraints,
}

impl std::fmt::Debug for SchemaMapper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchemaMapper")
            .field("model", &self.model.name())
            .field("threshold", &self.threshold)
            .finish_non_exhaustive()
    }
}

impl SchemaMapper {
    /// Create a mapper
    #[must_use]
    pub fn new(knowledge: Arc<KnowledgeBase>, model: Arc<dyn LanguageModel>, config: &PipelineConfig) -> Self {
        Self {
            knowledge,
            model,
            threshold: config.acceptance_threshold,
            constraints: config.inference_constraints(),
        }
    }

    /// Map every column in `columns`
    ///
    /// # Errors
    /// `MappingError::Knowledge` when the knowledge base cannot be read or
    /// written. Model failures degrade columns instead.
    pub async fn map(&self, columns: &[ColumnDescriptor]) -> Result<SchemaMapping, MappingError> {
        let mut resolved: IndexMap<&str, ColumnMapping> = IndexMap::with_capacity(columns.len());
        let mut misses = Vec::new();

        for column in columns {
            match self.knowledge.lookup(&column.name)? {
                Some(entry) if entry.confidence >= self.threshold => {
                    let outcome = self.knowledge.upsert(
                        &column.name,
                        &entry.business_label,
                        entry.confidence,
                        MappingSource::KnowledgeBase,
                    )?;
                    let current = outcome.entry().unwrap_or(&entry);
                    tracing::debug!(column = %column.name, label = %current.business_label, "knowledge base hit");
                    resolved.insert(
                        &column.name,
                        ColumnMapping {
                            business_label: current.business_label.clone(),
                            confidence: current.confidence,
                            source: match current.source {
                                MappingSource::UserOverride => MappingSource::UserOverride,
                                _ => MappingSource::KnowledgeBase,
                            },
                            degraded: false,
                        },
                    );
                }
                _ => misses.push(column),
            }
        }

        if !misses.is_empty() {
            let proposals = match self.infer_labels(&misses).await {
                Ok(proposals) => proposals,
                Err(e) => {
                    tracing::warn!(error = %e, columns = misses.len(), "schema inference failed, degrading");
                    Vec::new()
                }
            };
            for column in misses {
                let mapping = self.accept(column, &proposals)?;
                resolved.insert(&column.name, mapping);
            }
        }

        let mut mapping = SchemaMapping::new();
        for column in columns {
            let entry = resolved
                .swap_remove(column.name.as_str())
                .unwrap_or_else(|| ColumnMapping::degraded(&column.name));
            mapping.insert(column.name.clone(), entry);
        }
        Ok(mapping)
    }

    /// Apply user-asserted labels and teach them to the knowledge base
    ///
    /// Overrides for columns not in `mapping` are ignored.
    ///
    /// # Errors
    /// `MappingError::Knowledge` when the knowledge base write fails.
    pub fn apply_overrides(
        &self,
        mapping: &mut SchemaMapping,
        overrides: &IndexMap<String, String>,
    ) -> Result<(), MappingError> {
        for (column, label) in overrides {
            let label = label.trim();
            if label.is_empty() || mapping.get(column).is_none() {
                tracing::debug!(column = %column, "override skipped");
                continue;
            }
            self.knowledge
                .upsert(column, label, 1.0, MappingSource::UserOverride)?;
            mapping.insert(column.clone(), ColumnMapping::user_override(label));
        }
        Ok(())
    }

    async fn infer_labels(&self, columns: &[&ColumnDescriptor]) -> Result<Vec<ProposedLabel>, ModelError> {
        let prompt = Prompt::new(SYSTEM_PROMPT, describe_columns(columns));
        let response = infer_bounded(self.model.as_ref(), &prompt, &self.constraints).await?;
        Ok(parse_json::<MappingReply>(&response)?.into_labels())
    }

    fn accept(&self, column: &ColumnDescriptor, proposals: &[ProposedLabel]) -> Result<ColumnMapping, MappingError> {
        let proposal = proposals
            .iter()
            .find(|p| p.column == column.name)
            .or_else(|| proposals.iter().find(|p| p.column.eq_ignore_ascii_case(&column.name)));

        let Some((label, confidence)) = proposal.and_then(|p| {
            let label = p.label.as_deref()?.trim();
            let confidence = p
                .confidence
                .filter(|c| c.is_finite())
                .unwrap_or(DEFAULT_MODEL_CONFIDENCE)
                .clamp(0.0, 1.0);
            (!label.is_empty()).then_some((label, confidence))
        }) else {
            tracing::warn!(column = %column.name, "no usable label, column mapped to itself");
            return Ok(ColumnMapping::degraded(&column.name));
        };

        if confidence >= self.threshold {
            self.knowledge
                .upsert(&column.name, label, confidence, MappingSource::ModelInferred)?;
        } else {
            tracing::debug!(column = %column.name, confidence, "label below threshold, not learned");
        }

        Ok(ColumnMapping {
            business_label: label.to_string(),
            confidence,
            source: MappingSource::ModelInferred,
            degraded: false,
        })
    }
}

fn describe_columns(columns: &[&ColumnDescriptor]) -> String {
    let mut text = String::from("Columns:\n");
    for column in columns {
        let _ = writeln!(
            text,
            "- {} ({}), examples: {}",
            column.name,
            column.column_type,
            if column.sample.is_empty() {
                "none".to_string()
            } else {
                column.sample.join(", ")
            }
        );
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use vizier_plan::ColumnType;
    use vizier_test_utils::{mapping_response, memory_knowledge_base, reply, ScriptedModel, Step, MAPPER_ROUTE};

    fn descriptor(name: &str, column_type: ColumnType) -> ColumnDescriptor {
        ColumnDescriptor {
            name: name.to_string(),
            column_type,
            sample: vec!["a".to_string()],
        }
    }

    fn columns() -> Vec<ColumnDescriptor> {
        vec![
            descriptor("cust_id", ColumnType::Categorical),
            descriptor("amt", ColumnType::Numeric),
        ]
    }

    fn mapper(kb: Arc<KnowledgeBase>, model: Arc<ScriptedModel>) -> SchemaMapper {
        SchemaMapper::new(kb, model, &PipelineConfig::default())
    }

    #[test]
    fn system_prompt_carries_route_marker() {
        assert!(SYSTEM_PROMPT.contains(MAPPER_ROUTE));
    }

    #[tokio::test]
    async fn misses_are_batched_into_one_call() {
        let kb = memory_knowledge_base();
        let model = Arc::new(ScriptedModel::new().mapping([reply(mapping_response(&[
            ("cust_id", "Customer ID", 0.95),
            ("amt", "Amount", 0.9),
        ]))]));

        let mapping = mapper(kb.clone(), model.clone()).map(&columns()).await.unwrap();

        assert_eq!(model.calls(), 1);
        assert_eq!(mapping.label("cust_id"), "Customer ID");
        assert_eq!(mapping.get("amt").unwrap().source, MappingSource::ModelInferred);
        assert_eq!(kb.lookup("amt").unwrap().unwrap().business_label, "Amount");
    }

    #[tokio::test]
    async fn knowledge_base_hit_skips_the_model() {
        let kb = memory_knowledge_base();
        kb.upsert("cust_id", "Customer ID", 0.9, MappingSource::ModelInferred).unwrap();
        kb.upsert("amt", "Amount", 0.9, MappingSource::ModelInferred).unwrap();
        let model = Arc::new(ScriptedModel::new());

        let mapping = mapper(kb.clone(), model.clone()).map(&columns()).await.unwrap();

        assert_eq!(model.calls(), 0);
        assert_eq!(mapping.get("cust_id").unwrap().source, MappingSource::KnowledgeBase);
        assert_eq!(kb.lookup("cust_id").unwrap().unwrap().hit_count, 2);
    }

    #[tokio::test]
    async fn low_confidence_entry_is_reinferred() {
        let kb = memory_knowledge_base();
        kb.feedback("amt", "Amount", true).unwrap();
        kb.feedback("amt", "Amount", false).unwrap();
        let model = Arc::new(
            ScriptedModel::new().mapping([reply(mapping_response(&[("cust_id", "Customer ID", 0.9), ("amt", "Sale Amount", 0.9)]))]),
        );

        let mapping = mapper(kb, model.clone()).map(&columns()).await.unwrap();

        assert_eq!(model.calls(), 1);
        assert_eq!(mapping.label("amt"), "Sale Amount");
    }

    #[tokio::test]
    async fn model_failure_degrades_every_miss() {
        let kb = memory_knowledge_base();
        kb.upsert("cust_id", "Customer ID", 0.9, MappingSource::ModelInferred).unwrap();
        let model = Arc::new(ScriptedModel::new().mapping([Step::Fail(ModelError::Transport("refused".into()))]));

        let mapping = mapper(kb, model).map(&columns()).await.unwrap();

        assert_eq!(mapping.len(), 2);
        assert_eq!(mapping.label("cust_id"), "Customer ID");
        let amt = mapping.get("amt").unwrap();
        assert!(amt.degraded);
        assert_eq!(amt.business_label, "amt");
        assert_eq!(amt.confidence, 0.0);
        assert_eq!(mapping.degraded().collect::<Vec<_>>(), vec!["amt"]);
    }

    #[tokio::test]
    async fn partial_reply_degrades_only_missing_columns() {
        let kb = memory_knowledge_base();
        let model = Arc::new(ScriptedModel::new().mapping([reply(
            r#"Sure! ```json
{"mappings": [{"column": "CUST_ID", "business_label": "Customer ID"}, {"column": "amt", "label": "  "}]}
```"#,
        )]));

        let mapping = mapper(kb, model).map(&columns()).await.unwrap();

        let cust = mapping.get("cust_id").unwrap();
        assert_eq!(cust.business_label, "Customer ID");
        assert_eq!(cust.confidence, DEFAULT_MODEL_CONFIDENCE);
        assert!(mapping.get("amt").unwrap().degraded);
    }

    #[tokio::test]
    async fn below_threshold_label_is_used_but_not_learned() {
        let kb = memory_knowledge_base();
        let model = Arc::new(ScriptedModel::new().mapping([reply(mapping_response(&[
            ("cust_id", "Customer ID", 0.3),
            ("amt", "Amount", 0.9),
        ]))]));

        let mapping = mapper(kb.clone(), model).map(&columns()).await.unwrap();

        assert_eq!(mapping.label("cust_id"), "Customer ID");
        assert!(kb.lookup("cust_id").unwrap().is_none());
    }

    #[tokio::test]
    async fn overrides_win_and_are_learned() {
        let kb = memory_knowledge_base();
        let model = Arc::new(ScriptedModel::new().mapping([reply(mapping_response(&[
            ("cust_id", "Customer ID", 0.9),
            ("amt", "Amount", 0.9),
        ]))]));
        let mapper = mapper(kb.clone(), model);
        let mut mapping = mapper.map(&columns()).await.unwrap();

        let overrides = IndexMap::from([
            ("amt".to_string(), "Net Sales".to_string()),
            ("unknown".to_string(), "Ignored".to_string()),
        ]);
        mapper.apply_overrides(&mut mapping, &overrides).unwrap();

        assert_eq!(mapping.get("amt"), Some(&ColumnMapping::user_override("Net Sales")));
        assert_eq!(mapping.len(), 2);
        assert_eq!(kb.lookup("amt").unwrap().unwrap().source, MappingSource::UserOverride);
    }

    #[test]
    fn references_resolve_by_label_name_or_key() {
        let mut mapping = SchemaMapping::new();
        mapping.insert("cust_id", ColumnMapping::user_override("Customer ID"));
        mapping.insert("qty", ColumnMapping::user_override("Units"));

        assert_eq!(mapping.resolve_reference("cust_id"), Some("cust_id"));
        assert_eq!(mapping.resolve_reference("customer id"), Some("cust_id"));
        assert_eq!(mapping.resolve_reference("QTY"), Some("qty"));
        assert_eq!(mapping.resolve_reference("quantity"), Some("qty"));
        assert_eq!(mapping.resolve_reference("spaceship class"), None);
        assert_eq!(mapping.resolve_reference(""), None);
    }
}
