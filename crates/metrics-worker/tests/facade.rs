use chrono::{NaiveDate, TimeDelta};
use metrics_worker::{
    DeclaredInput, EvalContext, ExpressionType, TimeSeries, evaluate, parse_expression,
    plan_reads,
};
use serde_json::json;

fn daily(code: &str, values: &[f64]) -> TimeSeries {
    let start = NaiveDate::from_ymd_opt(2024, 1, 1)
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .expect("valid date");
    TimeSeries::from_pairs(
        code,
        values
            .iter()
            .enumerate()
            .map(|(offset, value)| (start + TimeDelta::days(offset as i64), *value)),
    )
    .expect("series")
}

#[test]
fn plan_then_evaluate_nested_tree() {
    let tree = json!({
        "op": "add",
        "left": {"op": "multiply", "left": {"series_code": "A"}, "right": {"series_code": "B"}},
        "right": {"series_code": "C"}
    });
    let inputs = [
        DeclaredInput::new("ds1", "A"),
        DeclaredInput::new("ds1", "B"),
        DeclaredInput::new("ds2", "C"),
    ];

    let plan = plan_reads(&tree, "series_math", &inputs).expect("plan");
    assert_eq!(plan.dataset_ids().collect::<Vec<_>>(), vec!["ds1", "ds2"]);

    let expr = parse_expression(&tree, "series_math").expect("parse");
    assert_eq!(expr.kind(), Some(ExpressionType::SeriesMath));

    let ctx = [
        daily("A", &[10.0, 20.0, 30.0]),
        daily("B", &[2.0, 4.0, 6.0]),
        daily("C", &[1.0, 2.0, 3.0]),
    ]
    .into_iter()
    .collect::<EvalContext>();
    let out = evaluate(&expr, &ctx).expect("evaluate");
    assert_eq!(out.values(), &[21.0, 82.0, 183.0]);
}
