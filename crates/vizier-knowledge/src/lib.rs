//! Vizier Knowledge Base
//!
//! Persistent, confidence-weighted store of learned mappings from
//! technical column names (`cust_id`) to business labels ("Customer ID").
//!
//! - [`normalize`]: deterministic rule-table normalization of column names
//! - [`merge`]: the conflict-resolution rule, testable without storage
//! - [`KeyValueStore`]: persistence collaborator (`get`/`put`)
//! - [`KnowledgeBase`]: concurrent read-through index over a store
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use vizier_knowledge::{KnowledgeBase, MappingSource, MemoryStore, MergePolicy};
//!
//! let kb = KnowledgeBase::new(Arc::new(MemoryStore::new()), MergePolicy::default());
//! kb.upsert("cust_id", "Customer ID", 0.9, MappingSource::ModelInferred)?;
//!
//! let entry = kb.lookup("CustID")?.unwrap();
//! assert_eq!(entry.business_label, "Customer ID");
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

mod entry;
mod error;
mod knowledge_base;
pub mod merge;
mod normalize;
mod store;

pub use entry::{KnowledgeBaseEntry, MappingSource};
pub use error::KnowledgeError;
pub use knowledge_base::KnowledgeBase;
pub use merge::{merge, MergeOutcome, MergePolicy, Observation};
pub use normalize::{normalize, NormalizedKey};
pub use store::{JsonFileStore, KeyValueStore, MemoryStore};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
