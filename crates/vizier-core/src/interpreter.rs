//! Requirement interpretation
//!
//! Free text plus the business-label view of the schema goes to the
//! language model, which is asked for a plan in the closed operation
//! vocabulary. Nothing in the reply is trusted: every step is parsed by
//! hand, every column reference is resolved through the [`SchemaMapping`]
//! to a technical name, and the result must pass [`OperationPlan::new`].
//! An invalid reply earns a corrective re-prompt carrying the rejection
//! reason, up to the configured number of attempts.

use crate::config::PipelineConfig;
use crate::error::{InterpretError, PlanValidationError};
use crate::mapping::SchemaMapping;
use serde_json::{Map, Value as Json};
use std::fmt::Write as _;
use std::sync::Arc;
use vizier_llm::{infer_bounded, json_documents, InferenceConstraints, LanguageModel, ModelError, Prompt};
use vizier_plan::{AggregateFn, ChartOp, ChartType, Literal, Operation, OperationPlan, Predicate, SortDirection};

/// Column a `group_by` without aggregates adds to its output
pub const GROUP_COUNT_COLUMN: &str = "count";

fn system_prompt() -> String {
    let list = |items: Vec<&str>| items.join(", ");
    format!(
        "You translate visualization requests about a tabular dataset into an operation plan. \
Use only these operations, in order, ending with exactly one chart:\n\
- {{\"op\": \"filter\", \"column\": C, \"predicate\": P, \"value\": V}} with P one of {predicates}\n\
- {{\"op\": \"group_by\", \"columns\": [C, ...]}}\n\
- {{\"op\": \"aggregate\", \"column\": C, \"function\": F}} with F one of {functions}\n\
- {{\"op\": \"sort\", \"column\": C, \"direction\": \"asc\" | \"desc\"}}\n\
- {{\"op\": \"chart\", \"type\": T, \"x\": C, \"y\": C, \"series\": C (optional), \"title\": text (optional)}} with T one of {charts}\n\
Refer to columns by the business labels given. After aggregating, refer to the aggregated \
column by its original label. Answer with JSON only: {{\"operations\": [...]}}.",
        predicates = list(Predicate::ALL.iter().map(|p| p.as_str()).collect()),
        functions = list(AggregateFn::ALL.iter().map(|f| f.as_str()).collect()),
        charts = list(ChartType::ALL.iter().map(|c| c.as_str()).collect()),
    )
}

/// Turns requirement text into a validated operation plan
pub struct RequirementInterpreter {
    model: Arc<dyn LanguageModel>,
    constraints: InferenceConstraints,
    correction_attempts: u32,
    system: String,
}

impl std::fmt::Debug for RequirementInterpreter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequirementInterpreter")
            .field("model", &self.model.name())
            .field("correction_attempts", &self.correction_attempts)
            .finish_non_exhaustive()
    }
}

impl RequirementInterpreter {
    /// Create an interpreter
    #[must_use]
    pub fn new(model: Arc<dyn LanguageModel>, config: &PipelineConfig) -> Self {
        Self {
            model,
            constraints: config.inference_constraints(),
            correction_attempts: config.interpreter_correction_attempts,
            system: system_prompt(),
        }
    }

    /// Interpret `requirement` against `mapping`
    ///
    /// `feedback` carries the reason a previous plan was rejected
    /// downstream, so the model can avoid repeating it.
    ///
    /// # Errors
    /// `InterpretError` once every attempt has failed, carrying the last
    /// validation or model failure.
    pub async fn interpret(
        &self,
        requirement: &str,
        mapping: &SchemaMapping,
        feedback: Option<&str>,
    ) -> Result<OperationPlan, InterpretError> {
        let max_attempts = self.correction_attempts.saturating_add(1);
        let mut correction: Option<String> = None;
        let mut last_failure = None;

        for attempt in 1..=max_attempts {
            let prompt = Prompt::new(
                self.system.clone(),
                user_prompt(requirement, mapping, feedback, correction.as_deref()),
            );

            match infer_bounded(self.model.as_ref(), &prompt, &self.constraints).await {
                Ok(response) => match validate_plan(&response, mapping) {
                    Ok(plan) => {
                        tracing::debug!(attempt, plan = %plan, "plan accepted");
                        return Ok(plan);
                    }
                    Err(e) => {
                        tracing::warn!(attempt, error = %e, "plan rejected");
                        correction = Some(e.to_string());
                        last_failure = Some(Failure::Invalid(e));
                    }
                },
                Err(e) => {
                    tracing::warn!(attempt, error = %e, "interpretation call failed");
                    correction = None;
                    last_failure = Some(Failure::Model(e));
                }
            }
        }

        Err(match last_failure {
            Some(Failure::Invalid(source)) => InterpretError::Invalid {
                attempts: max_attempts,
                source,
            },
            Some(Failure::Model(source)) => InterpretError::Model {
                attempts: max_attempts,
                source,
            },
            None => InterpretError::Model {
                attempts: 0,
                source: ModelError::EmptyResponse,
            },
        })
    }
}

enum Failure {
    Invalid(PlanValidationError),
    Model(ModelError),
}

fn user_prompt(requirement: &str, mapping: &SchemaMapping, feedback: Option<&str>, correction: Option<&str>) -> String {
    let mut text = String::from("Columns (business label <- technical name):\n");
    for (column, m) in mapping.iter() {
        let _ = writeln!(text, "- {} <- {}", m.business_label, column);
    }
    let _ = write!(text, "\nRequest: {}\n", requirement.trim());
    if let Some(reason) = feedback {
        let _ = write!(text, "\nA previous plan for this request was rejected: {reason}\n");
    }
    if let Some(reason) = correction {
        let _ = write!(
            text,
            "\nYour last answer was invalid: {reason}\nUse only the listed columns and vocabulary.\n"
        );
    }
    text
}

/// Parse and validate a model reply into a plan over technical names
///
/// # Errors
/// `PlanValidationError` describing the first problem found.
pub fn validate_plan(response: &str, mapping: &SchemaMapping) -> Result<OperationPlan, PlanValidationError> {
    let mut documents = json_documents(response).peekable();
    if documents.peek().is_none() {
        return Err(PlanValidationError::Malformed("no JSON document".into()));
    }
    let document: Json = documents
        .filter_map(|json| serde_json::from_str::<Json>(json).ok())
        .find(|document| steps_of(document).is_some())
        .ok_or_else(|| PlanValidationError::Malformed("expected an \"operations\" array".into()))?;
    let steps = steps_of(&document).unwrap_or_default();

    let operations = steps.iter().map(parse_step).collect::<Result<Vec<_>, _>>()?;
    let first_group = operations.iter().position(|op| matches!(op, Operation::GroupBy { .. }));
    // after a group_by, `count` names the added group size column even when
    // a source column also answers to it
    let group_count = |index: usize, op: &Operation, reference: &str| {
        first_group.is_some_and(|g| index > g)
            && !matches!(op, Operation::GroupBy { .. } | Operation::Aggregate { .. })
            && reference.trim().eq_ignore_ascii_case(GROUP_COUNT_COLUMN)
    };

    for (index, op) in operations.iter().enumerate() {
        for reference in op.columns() {
            if !group_count(index, op, reference) && mapping.resolve_reference(reference).is_none() {
                return Err(PlanValidationError::UnknownColumn(reference.to_string()));
            }
        }
    }

    let resolved = operations
        .into_iter()
        .enumerate()
        .map(|(index, op)| {
            let synthetic: Vec<bool> = op.columns().into_iter().map(|r| group_count(index, &op, r)).collect();
            let mut position = 0;
            op.map_columns(|reference| {
                let keep = synthetic.get(position).copied().unwrap_or(false);
                position += 1;
                match mapping.resolve_reference(&reference) {
                    Some(column) if !keep => column.to_string(),
                    _ => GROUP_COUNT_COLUMN.to_string(),
                }
            })
        })
        .collect();

    Ok(OperationPlan::new(resolved)?)
}

fn steps_of(document: &Json) -> Option<&[Json]> {
    match document {
        Json::Array(steps) if !steps.is_empty() && steps.iter().all(Json::is_object) => Some(steps.as_slice()),
        Json::Object(object) => match object.get("operations").or_else(|| object.get("plan")) {
            Some(Json::Array(steps)) => Some(steps.as_slice()),
            _ => None,
        },
        _ => None,
    }
}

fn parse_step(step: &Json) -> Result<Operation, PlanValidationError> {
    let Json::Object(fields) = step else {
        return Err(PlanValidationError::Malformed(format!("step is not an object: {step}")));
    };
    let op = fields
        .get("op")
        .or_else(|| fields.get("operation"))
        .and_then(Json::as_str)
        .ok_or_else(|| PlanValidationError::MissingField {
            operation: "step".into(),
            field: "op",
        })?;
    let step = Step { op, fields };

    Ok(match op.trim().to_ascii_lowercase().as_str() {
        "filter" => Operation::Filter {
            column: step.text("column")?,
            predicate: step.text("predicate")?.parse()?,
            value: literal(step.field("value")?)
                .ok_or_else(|| PlanValidationError::Malformed("filter value must be a number, text or list".into()))?,
        },
        "group_by" => Operation::GroupBy {
            columns: match step.field("columns")? {
                Json::Array(items) => items
                    .iter()
                    .map(|item| item.as_str().map(str::to_string))
                    .collect::<Option<Vec<_>>>()
                    .ok_or_else(|| PlanValidationError::Malformed("group_by columns must be text".into()))?,
                Json::String(single) => vec![single.clone()],
                _ => return Err(PlanValidationError::Malformed("group_by columns must be a list".into())),
            },
        },
        "aggregate" => Operation::Aggregate {
            column: step.text("column")?,
            function: step.text("function")?.parse()?,
        },
        "sort" => Operation::Sort {
            column: step.text("column")?,
            direction: match fields.get("direction") {
                Some(_) => step.text("direction")?.parse()?,
                None => SortDirection::Asc,
            },
        },
        "chart" => Operation::Chart(ChartOp {
            chart_type: step.text("type").or_else(|_| step.text("chart_type"))?.parse()?,
            x: step.text("x")?,
            y: step.text("y")?,
            series: step.optional_text("series")?,
            title: step.optional_text("title")?,
        }),
        _ => return Err(PlanValidationError::UnknownOperation(op.to_string())),
    })
}

struct Step<'a> {
    op: &'a str,
    fields: &'a Map<String, Json>,
}

impl<'a> Step<'a> {
    fn field(&self, name: &'static str) -> Result<&'a Json, PlanValidationError> {
        self.fields
            .get(name)
            .filter(|v| !v.is_null())
            .ok_or_else(|| PlanValidationError::MissingField {
                operation: self.op.to_string(),
                field: name,
            })
    }

    fn text(&self, name: &'static str) -> Result<String, PlanValidationError> {
        match self.field(name)? {
            Json::String(s) => Ok(s.clone()),
            other => Err(PlanValidationError::Malformed(format!(
                "{} '{name}' must be text, found {other}",
                self.op
            ))),
        }
    }

    fn optional_text(&self, name: &'static str) -> Result<Option<String>, PlanValidationError> {
        match self.fields.get(name) {
            None | Some(Json::Null) => Ok(None),
            Some(Json::String(s)) if s.trim().is_empty() => Ok(None),
            Some(_) => self.text(name).map(Some),
        }
    }
}

fn literal(value: &Json) -> Option<Literal> {
    match value {
        Json::Number(n) => n.as_f64().map(Literal::Number),
        Json::String(s) => Some(Literal::Text(s.clone())),
        Json::Array(items) => items.iter().map(literal).collect::<Option<Vec<_>>>().map(Literal::List),
        _ => None,
    }
}
