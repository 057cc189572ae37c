//! Vizier Core
//!
//! Orchestration of the multi-agent visualization pipeline: a dataset and
//! a plain-language requirement go in, a labelled chart with an
//! explanation comes out, or a structured failure saying why not.
//!
//! # Core Concepts
//!
//! - [`SchemaMapper`]: knowledge-base-first business labels for every column
//! - [`RequirementInterpreter`]: model-drafted, locally validated [`OperationPlan`]s
//! - [`QaGate`]: deterministic checks over the executed result
//! - [`PipelineSession`]: per-request state machine with bounded retries
//! - [`Orchestrator`]: wires the stages together and stores finished artifacts
//!
//! The language model only ever proposes; every proposal is validated
//! before it touches data, and a model that is slow or unavailable
//! degrades mapping rather than failing the request.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use vizier_core::prelude::*;
//!
//! let registry = Arc::new(InMemoryRegistry::new());
//! let file_id = registry.register(Dataset::from_records(&records)?);
//!
//! let orchestrator = Orchestrator::new(config, knowledge, model, registry);
//! let artifact = orchestrator
//!     .handle(PipelineRequest::new(file_id, "total amount by customer as a bar chart"))
//!     .await?;
//! println!("{}", artifact.explanation);
//! ```
//!
//! [`OperationPlan`]: vizier_plan::OperationPlan

#![warn(unreachable_pub)]
#![warn(missing_docs)]

mod artifact;
mod config;
mod error;
mod explain;
mod interpreter;
mod mapping;
mod orchestrator;
mod qa;
mod registry;
mod session;

pub use artifact::{ArtifactStore, VisualizationArtifact};
pub use config::{ConfigError, ModelConfig, PipelineConfig, QaConfig};
pub use error::{FailureKind, InterpretError, MappingError, PipelineError, PipelineFailure, PlanValidationError};
pub use explain::{axis_label, explain, label_chart};
pub use interpreter::{validate_plan, RequirementInterpreter, GROUP_COUNT_COLUMN};
pub use mapping::{ColumnMapping, SchemaMapper, SchemaMapping, DEFAULT_MODEL_CONFIDENCE};
pub use orchestrator::{DatasetOverview, Orchestrator, PipelineReport, PipelineRequest};
pub use qa::{IssueLevel, QaCheck, QaGate, QaIssue, QaVerdict, Severity};
pub use registry::{DatasetRegistry, FileId, InMemoryRegistry};
pub use session::{allowed_transitions, validate_transition, PipelineSession, PipelineState};

/// Common imports for driving the pipeline
pub mod prelude {
    pub use crate::{
        DatasetRegistry, FailureKind, FileId, InMemoryRegistry, Orchestrator, PipelineConfig, PipelineFailure,
        PipelineRequest, PipelineState, VisualizationArtifact,
    };
    pub use vizier_knowledge::{JsonFileStore, KnowledgeBase, MemoryStore, MergePolicy};
    pub use vizier_llm::{LanguageModel, OllamaModel};
    pub use vizier_plan::{ChartRenderer, Dataset, VegaLiteRenderer};
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
