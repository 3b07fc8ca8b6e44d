use chrono::{NaiveDate, TimeDelta};
use mw_expr::{EvalContext, ExprError, ExprErrorKind, evaluate_json, parse_expression};
use mw_series::TimeSeries;
use mw_types::{ObsTime, values_semantic_eq};
use serde_json::json;

fn start() -> ObsTime {
    NaiveDate::from_ymd_opt(2024, 2, 1)
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .expect("valid date")
}

fn daily(code: &str, values: &[f64]) -> TimeSeries {
    TimeSeries::from_pairs(
        code,
        values
            .iter()
            .enumerate()
            .map(|(offset, value)| (start() + TimeDelta::days(offset as i64), *value)),
    )
    .expect("series")
}

#[test]
fn lag_over_daily_series_is_calendar_based() {
    let mut ctx = EvalContext::new();
    ctx.insert_series(daily("GDP", &[1.0, 2.0, 3.0, 4.0, 5.0]));

    let tree = json!({"op": "lag", "series": {"seriesCode": "GDP"}, "window": 2});
    let out = evaluate_json(&tree, "window_op", &ctx).expect("lag");
    assert!(values_semantic_eq(
        out.values(),
        &[f64::NAN, f64::NAN, 1.0, 2.0, 3.0]
    ));
}

#[test]
fn window_op_sorts_unordered_input() {
    let stamps = (0..4)
        .map(|offset| start() + TimeDelta::days(offset))
        .collect::<Vec<_>>();
    let shuffled = TimeSeries::from_pairs(
        "CPI",
        [
            (stamps[3], 4.0),
            (stamps[0], 1.0),
            (stamps[2], 3.0),
            (stamps[1], 2.0),
        ],
    )
    .expect("series");
    let mut ctx = EvalContext::new();
    ctx.insert_series(shuffled);

    let tree = json!({"op": "sma", "series": {"series_code": "CPI"}, "window": 2});
    let out = evaluate_json(&tree, "window_op", &ctx).expect("sma");
    assert_eq!(out.stamps(), stamps.as_slice());
    assert!(values_semantic_eq(out.values(), &[f64::NAN, 1.5, 2.5, 3.5]));
}

#[test]
fn ema_of_nested_ratio_has_no_nan() {
    let mut ctx = EvalContext::new();
    ctx.insert_series(daily("NUM", &[10.0, 12.0, 9.0, 15.0]));
    ctx.insert_series(daily("DEN", &[2.0, 3.0, 3.0, 5.0]));

    let tree = json!({
        "op": "ema",
        "window": 3,
        "series": {"op": "ratio", "left": {"series_code": "NUM"}, "right": {"series_code": "DEN"}}
    });
    let out = evaluate_json(&tree, "window_op", &ctx).expect("ema");
    assert_eq!(out.len(), 4);
    assert!(out.values().iter().all(|value| value.is_finite()));
    assert_eq!(out.values()[0], 5.0);
}

#[test]
fn composite_over_staggered_series_keeps_union_axis() {
    let mut ctx = EvalContext::new();
    ctx.insert_series(daily("A", &[1.0, 2.0, 3.0]));
    ctx.insert_series(
        TimeSeries::from_pairs(
            "B",
            [
                (start() + TimeDelta::days(2), 10.0),
                (start() + TimeDelta::days(3), 20.0),
            ],
        )
        .expect("series"),
    );

    let tree = json!({"op": "max", "operands": [{"series_code": "A"}, {"series_code": "B"}]});
    let out = evaluate_json(&tree, "composite", &ctx).expect("max");
    assert_eq!(out.len(), 4);
    assert_eq!(out.values(), &[1.0, 2.0, 10.0, 20.0]);
}

#[test]
fn every_reported_error_is_classified() {
    let ctx = EvalContext::new();
    let cases = [
        (
            json!({"op": "sma", "series": {"series_code": "A"}, "window": 2}),
            "window_op",
            ExprErrorKind::SeriesNotFound,
        ),
        (
            json!({"op": "sma", "series": {"series_code": "A"}, "window": 0}),
            "window_op",
            ExprErrorKind::InvalidExpression,
        ),
        (
            json!({"op": "sum", "operands": [{"series_code": "A"}]}),
            "composite",
            ExprErrorKind::InvalidExpression,
        ),
        (
            json!({"op": "pow", "left": {}, "right": {}}),
            "series_math",
            ExprErrorKind::InvalidExpression,
        ),
        (json!({"op": "add"}), "unknown_kind", ExprErrorKind::InvalidExpression),
    ];

    for (tree, kind, expected) in cases {
        let err = evaluate_json(&tree, kind, &ctx).expect_err("must fail");
        assert_eq!(err.kind(), expected, "{tree} -> {err}");
    }
}

#[test]
fn nested_unknown_operation_names_the_operator() {
    let tree = json!({
        "op": "add",
        "left": {"op": "median", "series": {"series_code": "A"}, "window": 3},
        "right": {"series_code": "B"}
    });
    let err = parse_expression(&tree, "series_math").expect_err("unknown nested op");
    assert_eq!(err, ExprError::UnknownOperation("median".to_owned()));
    assert_eq!(err.to_string(), "unknown operation: median");
}
