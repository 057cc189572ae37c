//! Vizier language-model collaborator
//!
//! The language model is an untrusted text generator behind a narrow
//! interface: [`LanguageModel::infer`] takes a prompt plus constraints and
//! returns raw text. Callers always parse and validate what comes back;
//! [`extract_json`] and [`parse_json`] help with the parsing half.
//!
//! Every call goes through [`infer_bounded`], which enforces the
//! per-call timeout and drops (cancels) the in-flight request on expiry.

#![warn(missing_docs)]
#![warn(unreachable_pub)]

mod error;
mod extract;
mod model;
mod ollama;

pub use error::ModelError;
pub use extract::{extract_json, json_documents, parse_json};
pub use model::{infer_bounded, InferenceConstraints, LanguageModel, Prompt, ResponseFormat};
pub use ollama::{OllamaConfig, OllamaModel};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
