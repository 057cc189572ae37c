use proptest::prelude::*;
use serde_json::json;
use vizier_plan::{
    AggregateFn, ChartOp, ChartType, Dataset, Operation, OperationPlan, PlanExecutor, SortDirection, Value,
};

const REGIONS: [&str; 4] = ["West", "East", "North", "South"];

fn dataset(rows: &[(usize, Option<i32>)]) -> Dataset {
    let records: Vec<_> = rows
        .iter()
        .enumerate()
        .map(|(i, (region, amt))| json!({ "seq": i, "region": REGIONS[*region], "amt": amt }))
        .collect();
    Dataset::from_records(&records).unwrap()
}

fn table_chart(x: &str, y: &str) -> Operation {
    Operation::Chart(ChartOp {
        chart_type: ChartType::Table,
        x: x.into(),
        y: y.into(),
        series: None,
        title: None,
    })
}

fn rows_strategy() -> impl Strategy<Value = Vec<(usize, Option<i32>)>> {
    prop::collection::vec((0..REGIONS.len(), prop::option::of(-1000..1000i32)), 1..40).prop_map(|mut rows| {
        // keep amt numeric: an all-null column would infer as categorical
        rows[0].1.get_or_insert(0);
        rows
    })
}

#[test]
fn test_empty_record_list_loads() {
    let ds = Dataset::from_records(&[]).unwrap();
    assert_eq!(ds.row_count(), 0);
}

proptest! {
    #[test]
    fn prop_execution_is_deterministic(rows in rows_strategy()) {
        let ds = dataset(&rows);
        let plan = OperationPlan::new(vec![
            Operation::GroupBy { columns: vec!["region".into()] },
            Operation::Aggregate { column: "amt".into(), function: AggregateFn::Mean },
            Operation::Sort { column: "amt".into(), direction: SortDirection::Desc },
            table_chart("region", "amt"),
        ]).unwrap();

        let executor = PlanExecutor::new();
        let first = executor.execute(&ds, &plan);
        let second = executor.execute(&ds, &plan);
        prop_assert_eq!(first, second);
    }

    #[test]
    fn prop_group_rows_never_exceed_distinct_keys(rows in rows_strategy()) {
        let ds = dataset(&rows);
        let plan = OperationPlan::new(vec![
            Operation::GroupBy { columns: vec!["region".into()] },
            Operation::Aggregate { column: "amt".into(), function: AggregateFn::Sum },
            table_chart("region", "amt"),
        ]).unwrap();

        let result = PlanExecutor::new().execute(&ds, &plan).unwrap();
        let distinct = ds.table().distinct_keys(&["region".to_string()]);
        prop_assert_eq!(result.table.row_count(), distinct);
    }

    #[test]
    fn prop_sort_is_stable_and_ordered(rows in rows_strategy()) {
        let ds = dataset(&rows);
        let plan = OperationPlan::new(vec![
            Operation::Sort { column: "amt".into(), direction: SortDirection::Asc },
            table_chart("seq", "amt"),
        ]).unwrap();

        let result = PlanExecutor::new().execute(&ds, &plan).unwrap();
        let amt = result.table.column("amt").unwrap().values();
        let seq = result.table.column("seq").unwrap().values();

        for i in 1..amt.len() {
            match (&amt[i - 1], &amt[i]) {
                (Value::Number(a), Value::Number(b)) => {
                    prop_assert!(a <= b);
                    if a == b {
                        prop_assert!(seq[i - 1].as_f64() < seq[i].as_f64());
                    }
                }
                (Value::Null, Value::Number(_)) => prop_assert!(false, "null sorted before a number"),
                (Value::Null, Value::Null) => {
                    prop_assert!(seq[i - 1].as_f64() < seq[i].as_f64());
                }
                _ => {}
            }
        }
    }

    #[test]
    fn prop_filter_never_removes_columns(rows in rows_strategy(), bound in -1000..1000i32) {
        let ds = dataset(&rows);
        let plan = OperationPlan::new(vec![
            Operation::Filter {
                column: "amt".into(),
                predicate: vizier_plan::Predicate::Gt,
                value: vizier_plan::Literal::Number(f64::from(bound)),
            },
            table_chart("seq", "amt"),
        ]).unwrap();

        let result = PlanExecutor::new().execute(&ds, &plan).unwrap();
        prop_assert_eq!(result.table.column_count(), ds.table().column_count());
        prop_assert!(result.table.row_count() <= ds.row_count());
    }
}
