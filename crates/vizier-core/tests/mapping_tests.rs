use proptest::prelude::*;
use serde_json::{Map, Value as Json};
use std::sync::Arc;
use vizier_core::{PipelineConfig, SchemaMapper};
use vizier_llm::ModelError;
use vizier_plan::Dataset;
use vizier_test_utils::{mapping_response, memory_knowledge_base, reply, ScriptedModel, Step};

fn dataset_with(columns: &[String]) -> Dataset {
    let row: Map<String, Json> = columns
        .iter()
        .enumerate()
        .map(|(i, name)| (name.clone(), Json::from(i as f64)))
        .collect();
    Dataset::from_records(&[Json::Object(row)]).unwrap()
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_partial_reply_degrades_only_missing_columns() {
    let model = ScriptedModel::new().mapping([reply(mapping_response(&[("cust_id", "Customer ID", 0.9)]))]);
    let mapper = SchemaMapper::new(memory_knowledge_base(), Arc::new(model), &PipelineConfig::default());
    let dataset = dataset_with(&["cust_id".to_string(), "zz_9".to_string()]);

    let mapping = mapper.map(&dataset.descriptors(3)).await.unwrap();

    assert_eq!(mapping.label("cust_id"), "Customer ID");
    assert_eq!(mapping.degraded().collect::<Vec<_>>(), vec!["zz_9"]);
}

#[tokio::test]
async fn test_low_confidence_label_is_used_but_not_learned() {
    let knowledge = memory_knowledge_base();
    let model = ScriptedModel::new().mapping([reply(mapping_response(&[("fx_rt", "Exchange Rate", 0.4)]))]);
    let mapper = SchemaMapper::new(Arc::clone(&knowledge), Arc::new(model), &PipelineConfig::default());
    let dataset = dataset_with(&["fx_rt".to_string()]);

    let mapping = mapper.map(&dataset.descriptors(3)).await.unwrap();

    assert_eq!(mapping.label("fx_rt"), "Exchange Rate");
    assert!(knowledge.lookup("fx_rt").unwrap().is_none());
}

proptest! {
    #[test]
    fn prop_mapping_is_total(
        columns in prop::collection::btree_set("[a-z]{1,6}(_[a-z0-9]{1,3})?", 1..8),
        answered in prop::collection::vec(any::<bool>(), 8),
        model_fails in any::<bool>(),
    ) {
        let columns: Vec<String> = columns.into_iter().collect();
        let dataset = dataset_with(&columns);

        let step = if model_fails {
            Step::Fail(ModelError::Transport("connection refused".into()))
        } else {
            let labels: Vec<(String, String)> = columns
                .iter()
                .zip(&answered)
                .filter(|(_, yes)| **yes)
                .map(|(c, _)| (c.clone(), format!("Label {c}")))
                .collect();
            let triples: Vec<(&str, &str, f64)> =
                labels.iter().map(|(c, l)| (c.as_str(), l.as_str(), 0.9)).collect();
            reply(mapping_response(&triples))
        };
        let model = ScriptedModel::new().mapping([step]);
        let mapper = SchemaMapper::new(memory_knowledge_base(), Arc::new(model), &PipelineConfig::default());

        let mapping = runtime().block_on(mapper.map(&dataset.descriptors(3))).unwrap();

        prop_assert_eq!(mapping.len(), columns.len());
        for column in &columns {
            let entry = mapping.get(column);
            prop_assert!(entry.is_some(), "{} missing", column);
            prop_assert!(!mapping.label(column).is_empty());
        }
        prop_assert_eq!(mapping.columns().collect::<Vec<_>>(), columns.iter().map(String::as_str).collect::<Vec<_>>());
    }
}
