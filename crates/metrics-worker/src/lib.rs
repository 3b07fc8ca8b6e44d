#![forbid(unsafe_code)]

//! Umbrella crate for the metrics worker.
//!
//! Each layer lives in its own crate and is re-exported here under a short
//! module name; the most common entry points are also available at the root.

pub use mw_align as align;
pub use mw_expr as expr;
pub use mw_index as index;
pub use mw_io as io;
pub use mw_plan as plan;
pub use mw_runtime as runtime;
pub use mw_series as series;
pub use mw_types as types;
pub use mw_window as window;

pub use mw_expr::{
    EvalContext, Expr, ExprError, ExprErrorKind, evaluate, evaluate_json, parse_expression,
};
pub use mw_plan::{DeclaredInput, ReadPlan, plan_reads};
pub use mw_runtime::{RunOutcome, RunRequest, Worker, WorkerConfig, handle_run_request};
pub use mw_series::TimeSeries;
pub use mw_types::{CompositeOp, ExpressionType, ObsTime, SeriesMathOp, WindowOp};
