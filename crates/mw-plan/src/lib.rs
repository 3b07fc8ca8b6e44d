#![forbid(unsafe_code)]

use std::collections::BTreeSet;

use mw_expr::{Expr, ExprError, parse_expression};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Columns every series read must project.
pub const REQUIRED_COLUMNS: [&str; 3] = ["obs_time", "value", "internal_series_code"];

/// One `{datasetId, seriesCode}` entry from a run request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeclaredInput {
    #[serde(alias = "dataset_id")]
    pub dataset_id: String,
    #[serde(alias = "series_code")]
    pub series_code: String,
}

impl DeclaredInput {
    #[must_use]
    pub fn new(dataset_id: impl Into<String>, series_code: impl Into<String>) -> Self {
        Self {
            dataset_id: dataset_id.into(),
            series_code: series_code.into(),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum PlanError {
    #[error(transparent)]
    Expr(#[from] ExprError),
}

/// Dataset → series codes to fetch, in first-declared order.
///
/// Dataset attribution comes only from declared inputs. Series referenced
/// by the tree but never declared are tracked separately so callers can
/// report them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReadPlan {
    series_by_dataset: Vec<(String, Vec<String>)>,
    referenced: BTreeSet<String>,
}

impl ReadPlan {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a code to a dataset's list. Repeats are kept.
    pub fn add_series(&mut self, dataset_id: &str, series_code: &str) {
        match self
            .series_by_dataset
            .iter_mut()
            .find(|(dataset, _)| dataset == dataset_id)
        {
            Some((_, codes)) => codes.push(series_code.to_owned()),
            None => self
                .series_by_dataset
                .push((dataset_id.to_owned(), vec![series_code.to_owned()])),
        }
    }

    #[must_use]
    pub fn get_series_codes(&self, dataset_id: &str) -> &[String] {
        self.series_by_dataset
            .iter()
            .find(|(dataset, _)| dataset == dataset_id)
            .map(|(_, codes)| codes.as_slice())
            .unwrap_or(&[])
    }

    #[must_use]
    pub fn series_by_dataset(&self) -> &[(String, Vec<String>)] {
        &self.series_by_dataset
    }

    pub fn dataset_ids(&self) -> impl Iterator<Item = &str> {
        self.series_by_dataset
            .iter()
            .map(|(dataset, _)| dataset.as_str())
    }

    #[must_use]
    pub fn columns(&self) -> &'static [&'static str] {
        &REQUIRED_COLUMNS
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.series_by_dataset.is_empty()
    }

    /// Count of (dataset, code) entries, repeats included.
    #[must_use]
    pub fn total_series(&self) -> usize {
        self.series_by_dataset
            .iter()
            .map(|(_, codes)| codes.len())
            .sum()
    }

    #[must_use]
    pub fn declared_series(&self) -> BTreeSet<&str> {
        self.series_by_dataset
            .iter()
            .flat_map(|(_, codes)| codes.iter().map(String::as_str))
            .collect()
    }

    /// Leaf codes reachable in the expression tree.
    #[must_use]
    pub fn referenced_series(&self) -> &BTreeSet<String> {
        &self.referenced
    }

    /// Referenced codes with no declared input, sorted.
    #[must_use]
    pub fn undeclared_series(&self) -> Vec<&str> {
        let declared = self.declared_series();
        self.referenced
            .iter()
            .map(String::as_str)
            .filter(|code| !declared.contains(code))
            .collect()
    }

    fn note_references(&mut self, expr: &Expr) {
        self.referenced
            .extend(expr.leaf_codes().into_iter().map(str::to_owned));
    }
}

/// Build the read plan for a raw expression tree.
///
/// The tree goes through the same parser as evaluation, so a tree that would
/// fail to evaluate for structural reasons also fails to plan.
pub fn plan_reads(
    tree: &Value,
    expression_type: &str,
    inputs: &[DeclaredInput],
) -> Result<ReadPlan, PlanError> {
    let expr = parse_expression(tree, expression_type)?;
    Ok(plan_for_expr(&expr, inputs))
}

#[must_use]
pub fn plan_for_expr(expr: &Expr, inputs: &[DeclaredInput]) -> ReadPlan {
    let mut plan = ReadPlan::new();
    for input in inputs {
        plan.add_series(&input.dataset_id, &input.series_code);
    }
    plan.note_references(expr);
    plan
}

#[cfg(test)]
mod tests {
    use mw_expr::ExprError;
    use serde_json::json;

    use super::{DeclaredInput, PlanError, REQUIRED_COLUMNS, ReadPlan, plan_reads};

    #[test]
    fn sma_over_declared_series() {
        let tree = json!({"op": "sma", "series": {"series_code": "A"}, "window": 5});
        let plan = plan_reads(&tree, "window_op", &[DeclaredInput::new("ds1", "A")]).expect("plan");

        assert_eq!(plan.series_by_dataset(), &[("ds1".to_owned(), vec!["A".to_owned()])]);
        assert_eq!(plan.get_series_codes("ds1"), &["A".to_owned()]);
        assert!(plan.get_series_codes("other").is_empty());
        assert_eq!(plan.columns(), &REQUIRED_COLUMNS);
        assert!(plan.undeclared_series().is_empty());
    }

    #[test]
    fn datasets_keep_insertion_order_and_repeats() {
        let tree = json!({
            "op": "add",
            "left": {"series_code": "A"},
            "right": {"series_code": "B"}
        });
        let inputs = [
            DeclaredInput::new("zeta", "A"),
            DeclaredInput::new("alpha", "B"),
            DeclaredInput::new("zeta", "A"),
        ];
        let plan = plan_reads(&tree, "series_math", &inputs).expect("plan");

        assert_eq!(plan.dataset_ids().collect::<Vec<_>>(), vec!["zeta", "alpha"]);
        assert_eq!(plan.get_series_codes("zeta"), &["A".to_owned(), "A".to_owned()]);
        assert_eq!(plan.total_series(), 3);
    }

    #[test]
    fn nested_references_are_tracked_without_dataset_attribution() {
        let tree = json!({
            "op": "sum",
            "operands": [
                {"series_code": "A"},
                {"op": "lag", "series": {"seriesCode": "B"}, "window": 1},
                {"op": "ratio", "left": {"series_code": "C"}, "right": {"series_code": "A"}}
            ]
        });
        let plan = plan_reads(&tree, "composite", &[DeclaredInput::new("ds1", "A")]).expect("plan");

        assert_eq!(plan.series_by_dataset().len(), 1);
        assert_eq!(
            plan.referenced_series().iter().map(String::as_str).collect::<Vec<_>>(),
            vec!["A", "B", "C"]
        );
        assert_eq!(plan.undeclared_series(), vec!["B", "C"]);
    }

    #[test]
    fn invalid_trees_fail_to_plan() {
        let tree = json!({"op": "sum", "operands": [{"series_code": "A"}]});
        let err = plan_reads(&tree, "composite", &[]).expect_err("one operand");
        assert_eq!(err, PlanError::Expr(ExprError::TooFewOperands { found: 1 }));
    }

    #[test]
    fn declared_input_accepts_both_spellings() {
        let camel: DeclaredInput =
            serde_json::from_value(json!({"datasetId": "d", "seriesCode": "s"})).expect("camel");
        let snake: DeclaredInput =
            serde_json::from_value(json!({"dataset_id": "d", "series_code": "s"})).expect("snake");
        assert_eq!(camel, snake);
        assert_eq!(
            serde_json::to_value(&camel).expect("serialize"),
            json!({"datasetId": "d", "seriesCode": "s"})
        );
    }

    #[test]
    fn empty_plan() {
        let plan = ReadPlan::new();
        assert!(plan.is_empty());
        assert_eq!(plan.total_series(), 0);
    }
}
