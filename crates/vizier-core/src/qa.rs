//! Quality assurance gate
//!
//! Hard checks run in order and the first failure rejects the result:
//!
//! 1. the result table is not empty
//! 2. every chart binding names a column of the result table
//! 3. output cardinality matches the grouping
//! 4. aggregation intent words in the requirement match the plan
//!
//! Advisory checks never reject. Warnings are surfaced to the user with
//! an approved verdict; suggestions only lower the quality score.

use crate::config::QaConfig;
use serde::{Deserialize, Serialize};
use std::fmt;
use vizier_plan::{AggregateFn, ChartType, Dataset, ExecutionResult, OperationPlan};

/// Overall verdict severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Nothing to report
    Pass,
    /// Approved with caveats
    Warn,
    /// Rejected; triggers re-interpretation
    Fail,
}

/// Weight of a single finding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueLevel {
    /// Result must not be delivered
    Fail,
    /// Deliverable, but the user should know
    Warn,
    /// Possible improvement
    Suggestion,
}

impl IssueLevel {
    fn penalty(self) -> f64 {
        match self {
            Self::Fail => 2.0,
            Self::Warn => 1.0,
            Self::Suggestion => 0.5,
        }
    }
}

/// Which check produced an issue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QaCheck {
    /// Result has rows
    NonEmpty,
    /// Chart bindings exist in the result
    ChartColumns,
    /// Row count consistent with grouping
    Cardinality,
    /// Requirement wording matches the aggregation
    Intent,
    /// Chart readability
    Readability,
    /// Chart type fits the wording
    ChartFit,
}

/// One finding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QaIssue {
    /// Weight
    pub level: IssueLevel,
    /// Originating check
    pub check: QaCheck,
    /// Human-readable description
    pub message: String,
}

impl QaIssue {
    fn new(level: IssueLevel, check: QaCheck, message: impl Into<String>) -> Self {
        Self {
            level,
            check,
            message: message.into(),
        }
    }
}

/// Outcome of one QA evaluation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QaVerdict {
    /// Whether the result may be delivered
    pub approved: bool,
    /// Why; the failing check's message, the warnings, or a pass note
    pub reason: String,
    /// Overall severity
    pub severity: Severity,
    /// Every finding, in check order
    pub issues: Vec<QaIssue>,
    /// `10 - 2 x fail - 1 x warn - 0.5 x suggestion`, floored at 0
    pub quality_score: f64,
}

impl QaVerdict {
    /// Messages of warn-level issues
    pub fn warnings(&self) -> impl Iterator<Item = &str> {
        self.issues
            .iter()
            .filter(|i| i.level == IssueLevel::Warn)
            .map(|i| i.message.as_str())
    }

    fn from_issues(issues: Vec<QaIssue>) -> Self {
        let score = issues.iter().map(|i| i.level.penalty()).sum::<f64>();
        let quality_score = (10.0 - score).max(0.0);

        let (severity, reason) = if let Some(fail) = issues.iter().find(|i| i.level == IssueLevel::Fail) {
            (Severity::Fail, fail.message.clone())
        } else {
            let warnings: Vec<&str> = issues
                .iter()
                .filter(|i| i.level == IssueLevel::Warn)
                .map(|i| i.message.as_str())
                .collect();
            if warnings.is_empty() {
                (Severity::Pass, "all checks passed".to_string())
            } else {
                (Severity::Warn, warnings.join("; "))
            }
        };

        Self {
            approved: severity != Severity::Fail,
            reason,
            severity,
            issues,
            quality_score,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pass => "pass",
            Self::Warn => "warn",
            Self::Fail => "fail",
        })
    }
}

/// Plausibility checks over an execution result
///
/// Pure and synchronous; operates only on data already in memory.
#[derive(Debug, Clone, Default)]
pub struct QaGate {
    config: QaConfig,
}

impl QaGate {
    /// Gate with the given advisory thresholds
    #[must_use]
    pub fn new(config: QaConfig) -> Self {
        Self { config }
    }

    /// Evaluate `result`, produced by `plan` over `source`, against `requirement`
    #[must_use]
    pub fn evaluate(
        &self,
        requirement: &str,
        plan: &OperationPlan,
        result: &ExecutionResult,
        source: &Dataset,
    ) -> QaVerdict {
        let words = Words::new(requirement);
        let mut issues = Vec::new();

        let hard = check_non_empty(result)
            .or_else(|| check_chart_columns(result))
            .or_else(|| check_cardinality(plan, result, source))
            .or_else(|| check_intent(&words, plan));
        issues.extend(hard);
        if let Some(issue) = check_grouping_words(&words, plan) {
            issues.push(issue);
        }
        self.advise(&words, result, &mut issues);

        let verdict = QaVerdict::from_issues(issues);
        match verdict.severity {
            Severity::Fail => tracing::warn!(reason = %verdict.reason, "qa rejected result"),
            Severity::Warn => tracing::warn!(reason = %verdict.reason, "qa approved with warnings"),
            Severity::Pass => tracing::debug!(score = verdict.quality_score, "qa passed"),
        }
        verdict
    }

    fn advise(&self, words: &Words, result: &ExecutionResult, issues: &mut Vec<QaIssue>) {
        let chart = &result.chart;
        let categories = result
            .table
            .column(&chart.x.column)
            .map_or(0, |c| c.distinct_count());

        match chart.chart_type {
            ChartType::Pie if categories > self.config.pie_max_categories => issues.push(QaIssue::new(
                IssueLevel::Warn,
                QaCheck::Readability,
                format!("pie chart has {categories} categories; a bar chart may read better"),
            )),
            ChartType::Bar if categories > self.config.bar_max_categories => issues.push(QaIssue::new(
                IssueLevel::Warn,
                QaCheck::Readability,
                format!("bar chart has {categories} categories; consider filtering to the top ones"),
            )),
            ChartType::Scatter
                if chart.series.is_none() && result.table.row_count() > self.config.scatter_color_hint_rows =>
            {
                issues.push(QaIssue::new(
                    IssueLevel::Suggestion,
                    QaCheck::Readability,
                    "many points: a series column could reveal patterns",
                ));
            }
            _ => {}
        }

        if (words.has("trend") || words.has_phrase(&["over", "time"])) && chart.chart_type != ChartType::Line {
            issues.push(QaIssue::new(
                IssueLevel::Suggestion,
                QaCheck::ChartFit,
                "trends over time usually read best as a line chart",
            ));
        }
        if (words.has("correlation") || words.has("relationship")) && chart.chart_type != ChartType::Scatter {
            issues.push(QaIssue::new(
                IssueLevel::Suggestion,
                QaCheck::ChartFit,
                "relationships between two measures usually read best as a scatter plot",
            ));
        }
    }
}

fn check_non_empty(result: &ExecutionResult) -> Option<QaIssue> {
    result
        .table
        .is_empty()
        .then(|| QaIssue::new(IssueLevel::Fail, QaCheck::NonEmpty, "result table is empty"))
}

fn check_chart_columns(result: &ExecutionResult) -> Option<QaIssue> {
    result
        .chart
        .bound_columns()
        .into_iter()
        .find(|column| result.table.column(column).is_none())
        .map(|column| {
            QaIssue::new(
                IssueLevel::Fail,
                QaCheck::ChartColumns,
                format!("chart binds '{column}', which is not in the result table"),
            )
        })
}

fn check_cardinality(plan: &OperationPlan, result: &ExecutionResult, source: &Dataset) -> Option<QaIssue> {
    let rows = result.table.row_count();
    if let Some(keys) = plan.group_by() {
        let distinct = source.table().distinct_keys(keys);
        return (rows > distinct).then(|| {
            QaIssue::new(
                IssueLevel::Fail,
                QaCheck::Cardinality,
                format!(
                    "grouping by {} yields {rows} rows but the source has only {distinct} distinct keys",
                    keys.join(", ")
                ),
            )
        });
    }
    if plan.aggregates().next().is_some() && rows != 1 {
        return Some(QaIssue::new(
            IssueLevel::Fail,
            QaCheck::Cardinality,
            format!("whole-table aggregation yields {rows} rows instead of one"),
        ));
    }
    None
}

fn check_intent(words: &Words, plan: &OperationPlan) -> Option<QaIssue> {
    let counts = words.has("count") || words.has_phrase(&["how", "many"]) || words.has_phrase(&["number", "of"]);
    let implicit_count = plan.group_by().is_some() && plan.aggregates().next().is_none();

    let intents = [
        (counts, AggregateFn::Count, "a count"),
        (!counts && (words.has("total") || words.has("sum")), AggregateFn::Sum, "a total"),
        (
            words.has("average") || words.has("avg") || words.has("mean"),
            AggregateFn::Mean,
            "an average",
        ),
        (words.has("minimum"), AggregateFn::Min, "a minimum"),
        (words.has("maximum"), AggregateFn::Max, "a maximum"),
    ];

    intents
        .into_iter()
        .find(|(asked, function, _)| {
            *asked && !plan.uses(*function) && !(*function == AggregateFn::Count && implicit_count)
        })
        .map(|(_, function, wanted)| {
            QaIssue::new(
                IssueLevel::Fail,
                QaCheck::Intent,
                format!("the request asks for {wanted} but the plan never aggregates with {function}"),
            )
        })
}

fn check_grouping_words(words: &Words, plan: &OperationPlan) -> Option<QaIssue> {
    if plan.group_by().is_some() {
        return None;
    }
    let grouping = words.0.iter().enumerate().any(|(i, word)| {
        matches!(word.as_str(), "by" | "per" | "each")
            && !(i > 0 && matches!(words.0[i - 1].as_str(), "sort" | "sorted" | "order" | "ordered"))
    });
    grouping.then(|| {
        QaIssue::new(
            IssueLevel::Warn,
            QaCheck::Intent,
            "the request mentions a breakdown but the plan does not group",
        )
    })
}

/// Lowercased alphanumeric words of a requirement
struct Words(Vec<String>);

impl Words {
    fn new(text: &str) -> Self {
        Self(
            text.split(|c: char| !c.is_alphanumeric())
                .filter(|w| !w.is_empty())
                .map(str::to_lowercase)
                .collect(),
        )
    }

    fn has(&self, word: &str) -> bool {
        self.0.iter().any(|w| w == word)
    }

    fn has_phrase(&self, phrase: &[&str]) -> bool {
        self.0
            .windows(phrase.len())
            .any(|window| window.iter().zip(phrase).all(|(w, p)| w == p))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use vizier_plan::{ChartOp, Operation, PlanExecutor, SortDirection};
    use vizier_test_utils::sales_dataset;

    fn chart(chart_type: ChartType, x: &str, y: &str) -> Operation {
        Operation::Chart(ChartOp {
            chart_type,
            x: x.into(),
            y: y.into(),
            series: None,
            title: None,
        })
    }

    fn run(requirement: &str, ops: Vec<Operation>) -> QaVerdict {
        let dataset = sales_dataset();
        let plan = OperationPlan::new(ops).unwrap();
        let result = PlanExecutor::new().execute(&dataset, &plan).unwrap();
        QaGate::default().evaluate(requirement, &plan, &result, &dataset)
    }

    fn total_by(column: &str, chart_type: ChartType) -> Vec<Operation> {
        vec![
            Operation::GroupBy {
                columns: vec![column.into()],
            },
            Operation::Aggregate {
                column: "amt".into(),
                function: AggregateFn::Sum,
            },
            chart(chart_type, column, "amt"),
        ]
    }

    #[test]
    fn total_by_customer_passes() {
        let verdict = run("total amount by customer as a bar chart", total_by("cust_id", ChartType::Bar));
        assert!(verdict.approved);
        assert_eq!(verdict.severity, Severity::Pass);
        assert_eq!(verdict.quality_score, 10.0);
    }

    #[test]
    fn empty_result_fails_first() {
        let mut ops = vec![Operation::Filter {
            column: "amt".into(),
            predicate: vizier_plan::Predicate::Gt,
            value: vizier_plan::Literal::Number(1e9),
        }];
        ops.extend(total_by("cust_id", ChartType::Bar));
        let verdict = run("total amount by customer", ops);

        assert!(!verdict.approved);
        assert_eq!(verdict.severity, Severity::Fail);
        assert_eq!(verdict.reason, "result table is empty");
        assert_eq!(verdict.issues[0].check, QaCheck::NonEmpty);
    }

    #[test]
    fn missing_aggregation_intent_fails() {
        let verdict = run(
            "average amount by region",
            total_by("region", ChartType::Bar),
        );
        assert_eq!(verdict.severity, Severity::Fail);
        assert!(verdict.reason.contains("an average"), "{}", verdict.reason);
    }

    #[test]
    fn group_count_satisfies_number_of() {
        let verdict = run(
            "total number of orders per region",
            vec![
                Operation::GroupBy {
                    columns: vec!["region".into()],
                },
                chart(ChartType::Bar, "region", "count"),
            ],
        );
        assert!(verdict.approved, "{}", verdict.reason);
    }

    #[test]
    fn breakdown_without_grouping_warns() {
        let verdict = run(
            "amount by order date",
            vec![chart(ChartType::Line, "dt", "amt")],
        );
        assert!(verdict.approved);
        assert_eq!(verdict.severity, Severity::Warn);
        assert_eq!(verdict.warnings().count(), 1);
        assert_eq!(verdict.quality_score, 9.0);
    }

    #[test]
    fn sorted_by_is_not_a_breakdown() {
        let verdict = run(
            "amounts sorted by date",
            vec![
                Operation::Sort {
                    column: "dt".into(),
                    direction: SortDirection::Asc,
                },
                chart(ChartType::Line, "dt", "amt"),
            ],
        );
        assert_eq!(verdict.severity, Severity::Pass);
    }

    #[test]
    fn whole_table_aggregate_yields_one_row() {
        let verdict = run(
            "total amount",
            vec![
                Operation::Aggregate {
                    column: "amt".into(),
                    function: AggregateFn::Sum,
                },
                chart(ChartType::Table, "amt", "amt"),
            ],
        );
        assert!(verdict.approved, "{}", verdict.reason);
    }

    #[test]
    fn crowded_pie_warns_and_trend_suggests_line() {
        let records: Vec<_> = (0..10)
            .map(|i| json!({ "shop": format!("S{i}"), "amt": i }))
            .collect();
        let dataset = Dataset::from_records(&records).unwrap();
        let plan = OperationPlan::new(total_by("shop", ChartType::Pie)).unwrap();
        let result = PlanExecutor::new().execute(&dataset, &plan).unwrap();

        let verdict = QaGate::default().evaluate("sales trend by shop", &plan, &result, &dataset);

        assert_eq!(verdict.severity, Severity::Warn);
        let levels: Vec<_> = verdict.issues.iter().map(|i| (i.level, i.check)).collect();
        assert_eq!(
            levels,
            vec![
                (IssueLevel::Warn, QaCheck::Readability),
                (IssueLevel::Suggestion, QaCheck::ChartFit)
            ]
        );
        assert_eq!(verdict.quality_score, 8.5);
    }

    #[test]
    fn score_is_floored_at_zero() {
        let issues = (0..7)
            .map(|_| QaIssue::new(IssueLevel::Fail, QaCheck::Intent, "x"))
            .collect();
        assert_eq!(QaVerdict::from_issues(issues).quality_score, 0.0);
    }
}
