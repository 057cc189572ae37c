//! Concurrent knowledge base over a key-value store

use crate::entry::{KnowledgeBaseEntry, MappingSource};
use crate::error::KnowledgeError;
use crate::merge::{apply_feedback, merge, MergeOutcome, MergePolicy, Observation};
use crate::normalize::{normalize, NormalizedKey};
use crate::store::KeyValueStore;
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;

/// Shared, self-improving store of column mappings
///
/// The in-memory index is read-through: entries are loaded from the store
/// on first lookup. Updates to one key run merge and persist while holding
/// that key's map guard, so concurrent writers are serialized per key and
/// readers only ever clone a complete entry.
pub struct KnowledgeBase {
    /// Loaded entries
    entries: DashMap<NormalizedKey, KnowledgeBaseEntry>,
    /// Persistence collaborator
    store: Arc<dyn KeyValueStore>,
    /// Conflict-resolution tunables
    policy: MergePolicy,
}

impl std::fmt::Debug for KnowledgeBase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KnowledgeBase")
            .field("loaded", &self.entries.len())
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl KnowledgeBase {
    /// Create a knowledge base over `store`
    #[must_use]
    pub fn new(store: Arc<dyn KeyValueStore>, policy: MergePolicy) -> Self {
        Self {
            entries: DashMap::new(),
            store,
            policy,
        }
    }

    /// Normalize a technical name into its lookup key
    #[inline]
    #[must_use]
    pub fn normalize(technical_name: &str) -> NormalizedKey {
        normalize(technical_name)
    }

    /// Merge policy in effect
    #[inline]
    #[must_use]
    pub fn policy(&self) -> &MergePolicy {
        &self.policy
    }

    /// Look up the entry for `technical_name`
    ///
    /// # Errors
    /// Propagates store read failures.
    pub fn lookup(&self, technical_name: &str) -> Result<Option<KnowledgeBaseEntry>, KnowledgeError> {
        let key = normalize(technical_name);
        if let Some(entry) = self.entries.get(&key) {
            return Ok(Some(entry.value().clone()));
        }

        let Some(persisted) = self.store.get(&key)? else {
            return Ok(None);
        };
        let entry = self.entries.entry(key).or_insert(persisted);
        Ok(Some(entry.value().clone()))
    }

    /// Record an observation about `technical_name`
    ///
    /// # Errors
    /// Propagates store failures; on failure the in-memory entry is left
    /// unchanged.
    pub fn upsert(
        &self,
        technical_name: &str,
        business_label: &str,
        confidence: f64,
        source: MappingSource,
    ) -> Result<MergeOutcome, KnowledgeError> {
        let observation = Observation::new(business_label, confidence, source);
        self.update(technical_name, |existing, key| {
            merge(existing, key, &observation, &self.policy, Utc::now())
        })
    }

    /// Apply explicit user feedback on a mapping
    ///
    /// # Errors
    /// Propagates store failures.
    pub fn feedback(
        &self,
        technical_name: &str,
        business_label: &str,
        positive: bool,
    ) -> Result<MergeOutcome, KnowledgeError> {
        self.update(technical_name, |existing, key| {
            apply_feedback(existing, key, business_label, positive, &self.policy, Utc::now())
        })
    }

    /// Number of entries currently loaded in memory
    #[inline]
    #[must_use]
    pub fn loaded_len(&self) -> usize {
        self.entries.len()
    }

    fn update<F>(&self, technical_name: &str, apply: F) -> Result<MergeOutcome, KnowledgeError>
    where
        F: FnOnce(Option<&KnowledgeBaseEntry>, &NormalizedKey) -> MergeOutcome,
    {
        let key = normalize(technical_name);

        let outcome = match self.entries.entry(key.clone()) {
            Entry::Occupied(mut occupied) => {
                let outcome = apply(Some(occupied.get()), &key);
                if let (true, Some(entry)) = (outcome.changed(), outcome.entry()) {
                    self.store.put(&key, entry)?;
                    occupied.insert(entry.clone());
                }
                outcome
            }
            Entry::Vacant(vacant) => {
                let persisted = self.store.get(&key)?;
                let outcome = apply(persisted.as_ref(), &key);
                if let (true, Some(entry)) = (outcome.changed(), outcome.entry()) {
                    self.store.put(&key, entry)?;
                }
                if let Some(entry) = outcome.entry() {
                    vacant.insert(entry.clone());
                }
                outcome
            }
        };

        tracing::debug!(key = %key, outcome = outcome.kind(), "knowledge base updated");
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, MockKeyValueStore};
    use std::thread;

    fn kb() -> KnowledgeBase {
        KnowledgeBase::new(Arc::new(MemoryStore::new()), MergePolicy::default())
    }

    #[test]
    fn lookup_is_normalized() {
        let kb = kb();
        kb.upsert("cust_id", "Customer ID", 0.9, MappingSource::ModelInferred)
            .unwrap();

        let entry = kb.lookup("CustID").unwrap().unwrap();
        assert_eq!(entry.business_label, "Customer ID");
        assert!(kb.lookup("region").unwrap().is_none());
    }

    #[test]
    fn lookup_reads_through_to_store() {
        let store = Arc::new(MemoryStore::new());
        let key = normalize("qty");
        store
            .put(&key, &KnowledgeBaseEntry::new(key.as_str(), "Quantity", 0.8, MappingSource::ModelInferred))
            .unwrap();

        let kb = KnowledgeBase::new(store, MergePolicy::default());
        assert_eq!(kb.loaded_len(), 0);
        assert_eq!(kb.lookup("QTY").unwrap().unwrap().business_label, "Quantity");
        assert_eq!(kb.loaded_len(), 1);
    }

    #[test]
    fn upsert_merges_with_persisted_entry() {
        let store = Arc::new(MemoryStore::new());
        let key = normalize("amt");
        store
            .put(&key, &KnowledgeBaseEntry::new(key.as_str(), "Amount", 0.9, MappingSource::ModelInferred))
            .unwrap();

        let kb = KnowledgeBase::new(store.clone(), MergePolicy::default());
        let outcome = kb
            .upsert("amt", "Sale Value", 0.7, MappingSource::ModelInferred)
            .unwrap();

        assert!(matches!(outcome, MergeOutcome::Retained(_)));
        assert_eq!(store.get(&key).unwrap().unwrap().business_label, "Amount");
    }

    #[test]
    fn user_override_resets_confidence() {
        let kb = kb();
        kb.upsert("amt", "Amount", 0.7, MappingSource::ModelInferred).unwrap();
        kb.upsert("amt", "Net Sales", 0.2, MappingSource::UserOverride).unwrap();

        let entry = kb.lookup("amt").unwrap().unwrap();
        assert_eq!(entry.business_label, "Net Sales");
        assert_eq!(entry.confidence, 1.0);
        assert_eq!(entry.source, MappingSource::UserOverride);
    }

    #[test]
    fn store_failure_leaves_memory_untouched() {
        let mut store = MockKeyValueStore::new();
        store.expect_get().returning(|_| Ok(None));
        store
            .expect_put()
            .returning(|_, _| Err(KnowledgeError::Unavailable("disk full".to_string())));

        let kb = KnowledgeBase::new(Arc::new(store), MergePolicy::default());
        let err = kb
            .upsert("qty", "Quantity", 0.9, MappingSource::ModelInferred)
            .unwrap_err();

        assert!(matches!(err, KnowledgeError::Unavailable(_)));
        assert_eq!(kb.loaded_len(), 0);
    }

    #[test]
    fn feedback_adjusts_stored_label() {
        let kb = kb();
        kb.upsert("amt", "Amount", 0.7, MappingSource::ModelInferred).unwrap();
        kb.feedback("amt", "Amount", false).unwrap();

        let entry = kb.lookup("amt").unwrap().unwrap();
        assert!((entry.confidence - 0.6).abs() < 1e-9);
        assert_eq!(entry.hit_count, 2);
    }

    #[test]
    fn concurrent_reinforcement_counts_every_hit() {
        let kb = Arc::new(kb());
        kb.upsert("cust_id", "Customer ID", 0.8, MappingSource::ModelInferred)
            .unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let kb = Arc::clone(&kb);
                thread::spawn(move || {
                    for _ in 0..25 {
                        kb.upsert("cust_id", "Customer ID", 0.8, MappingSource::KnowledgeBase)
                            .unwrap();
                        let seen = kb.lookup("cust_id").unwrap().unwrap();
                        assert_eq!(seen.business_label, "Customer ID");
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let entry = kb.lookup("cust_id").unwrap().unwrap();
        assert_eq!(entry.hit_count, 201);
        assert!(entry.confidence <= 1.0);
    }
}
