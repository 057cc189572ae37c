//! Testing utilities for the Vizier workspace
//!
//! Scripted language model, dataset fixtures and canned model responses.

#![allow(missing_docs)]

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value as Json};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use vizier_knowledge::{KnowledgeBase, MemoryStore, MergePolicy};
use vizier_llm::{InferenceConstraints, LanguageModel, ModelError, Prompt};
use vizier_plan::Dataset;

/// Substring of the schema mapper's system prompt
pub const MAPPER_ROUTE: &str = "map technical column names";

/// Substring of the requirement interpreter's system prompt
pub const INTERPRETER_ROUTE: &str = "translate visualization requests";

/// One scripted model behavior
#[derive(Debug, Clone)]
pub enum Step {
    /// Answer with this text
    Reply(String),
    /// Fail with this error
    Fail(ModelError),
    /// Sleep, then answer `{}` (exceeds any short timeout)
    Stall(Duration),
}

#[derive(Debug)]
struct Route {
    marker: Option<String>,
    steps: VecDeque<Step>,
}

/// Language model that plays back a script
///
/// Calls are routed to the first queue whose marker appears in the
/// prompt's system text, falling back to the unmarked queue. An exhausted
/// script fails with `ModelError::Transport`.
#[derive(Debug, Default)]
pub struct ScriptedModel {
    routes: Mutex<Vec<Route>>,
    prompts: Mutex<Vec<Prompt>>,
}

impl ScriptedModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue steps for calls whose system prompt contains `marker`
    #[must_use]
    pub fn route(self, marker: &str, steps: impl IntoIterator<Item = Step>) -> Self {
        self.push(Some(marker.to_string()), steps);
        self
    }

    /// Queue steps for calls no marked route claims
    #[must_use]
    pub fn then(self, steps: impl IntoIterator<Item = Step>) -> Self {
        self.push(None, steps);
        self
    }

    /// Queue mapper replies
    #[must_use]
    pub fn mapping(self, steps: impl IntoIterator<Item = Step>) -> Self {
        self.route(MAPPER_ROUTE, steps)
    }

    /// Queue interpreter replies
    #[must_use]
    pub fn planning(self, steps: impl IntoIterator<Item = Step>) -> Self {
        self.route(INTERPRETER_ROUTE, steps)
    }

    fn push(&self, marker: Option<String>, steps: impl IntoIterator<Item = Step>) {
        let mut routes = self.routes.lock();
        match routes.iter_mut().find(|r| r.marker == marker) {
            Some(route) => route.steps.extend(steps),
            None => routes.push(Route {
                marker,
                steps: steps.into_iter().collect(),
            }),
        }
    }

    /// Every prompt received so far
    pub fn prompts(&self) -> Vec<Prompt> {
        self.prompts.lock().clone()
    }

    /// Prompts whose system text contains `marker`
    pub fn prompts_for(&self, marker: &str) -> Vec<Prompt> {
        self.prompts
            .lock()
            .iter()
            .filter(|p| p.system.contains(marker))
            .cloned()
            .collect()
    }

    /// Number of calls received
    pub fn calls(&self) -> usize {
        self.prompts.lock().len()
    }

    fn next_step(&self, prompt: &Prompt) -> Option<Step> {
        let mut routes = self.routes.lock();
        let marked = routes.iter_mut().find(|r| {
            r.marker
                .as_deref()
                .is_some_and(|m| prompt.system.contains(m) && !r.steps.is_empty())
        });
        if let Some(route) = marked {
            return route.steps.pop_front();
        }
        routes
            .iter_mut()
            .find(|r| r.marker.is_none())
            .and_then(|r| r.steps.pop_front())
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn infer(&self, prompt: &Prompt, _constraints: &InferenceConstraints) -> Result<String, ModelError> {
        self.prompts.lock().push(prompt.clone());
        match self.next_step(prompt) {
            Some(Step::Reply(text)) => Ok(text),
            Some(Step::Fail(err)) => Err(err),
            Some(Step::Stall(duration)) => {
                tokio::time::sleep(duration).await;
                Ok("{}".to_string())
            }
            None => Err(ModelError::Transport("script exhausted".to_string())),
        }
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Shorthand for [`Step::Reply`]
pub fn reply(text: impl Into<String>) -> Step {
    Step::Reply(text.into())
}

/// Sales rows: `cust_id, qty, amt, dt, region`
///
/// Three customers (C001 x3, C002 x3, C003 x2) across four regions.
pub fn sales_records() -> Vec<Json> {
    vec![
        json!({"cust_id": "C001", "qty": 2, "amt": 120.0, "dt": "2024-01-05", "region": "West"}),
        json!({"cust_id": "C002", "qty": 1, "amt": 45.5, "dt": "2024-01-09", "region": "East"}),
        json!({"cust_id": "C001", "qty": 5, "amt": 300.0, "dt": "2024-02-11", "region": "West"}),
        json!({"cust_id": "C003", "qty": 3, "amt": 99.9, "dt": "2024-02-14", "region": "North"}),
        json!({"cust_id": "C002", "qty": 4, "amt": 180.0, "dt": "2024-03-02", "region": "South"}),
        json!({"cust_id": "C003", "qty": 1, "amt": 20.0, "dt": "2024-03-18", "region": "North"}),
        json!({"cust_id": "C001", "qty": 2, "amt": 75.0, "dt": "2024-03-21", "region": "East"}),
        json!({"cust_id": "C002", "qty": 6, "amt": 240.0, "dt": "2024-04-01", "region": "West"}),
    ]
}

/// [`sales_records`] loaded as a dataset
pub fn sales_dataset() -> Dataset {
    Dataset::from_records(&sales_records()).unwrap()
}

/// Knowledge base over a fresh in-memory store
pub fn memory_knowledge_base() -> Arc<KnowledgeBase> {
    Arc::new(KnowledgeBase::new(Arc::new(MemoryStore::new()), MergePolicy::default()))
}

/// Mapper reply for `(column, label, confidence)` triples
pub fn mapping_response(mappings: &[(&str, &str, f64)]) -> String {
    let items: Vec<Json> = mappings
        .iter()
        .map(|(column, label, confidence)| json!({ "column": column, "label": label, "confidence": confidence }))
        .collect();
    json!({ "mappings": items }).to_string()
}

/// Mapper reply covering every sales column with confident labels
pub fn sales_mapping_response() -> String {
    mapping_response(&[
        ("cust_id", "Customer ID", 0.95),
        ("qty", "Quantity", 0.9),
        ("amt", "Amount", 0.92),
        ("dt", "Order Date", 0.88),
        ("region", "Region", 0.97),
    ])
}

/// Interpreter reply wrapping `operations`
pub fn plan_response(operations: Json) -> String {
    json!({ "operations": operations }).to_string()
}

/// "total amount by customer as a bar chart", written against business labels
pub fn total_by_customer_plan() -> String {
    plan_response(json!([
        { "op": "group_by", "columns": ["Customer ID"] },
        { "op": "aggregate", "column": "Amount", "function": "sum" },
        { "op": "chart", "type": "bar", "x": "Customer ID", "y": "Amount" }
    ]))
}
