#![no_main]

use libfuzzer_sys::fuzz_target;
use mw_expr::{EvalContext, evaluate, parse_expression};
use serde_json::Value;

const KINDS: [&str; 4] = ["series_math", "window_op", "composite", "unknown"];

fuzz_target!(|data: &[u8]| {
    let Some((&selector, body)) = data.split_first() else {
        return;
    };
    let Ok(tree) = serde_json::from_slice::<Value>(body) else {
        return;
    };

    let kind = KINDS[usize::from(selector) % KINDS.len()];
    if let Ok(expr) = parse_expression(&tree, kind) {
        assert!(expr.depth() >= 1);
        let _ = expr.to_string();
        // Every leaf is missing from an empty context.
        assert!(evaluate(&expr, &EvalContext::new()).is_err());
    }
});
