#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::fmt;

use mw_align::{AlignError, align_many, align_two};
use mw_series::{SeriesError, TimeSeries};
use mw_types::{CompositeOp, ExpressionType, SeriesMathOp, WindowOp};
use mw_window::{WindowError, apply_to_series};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Name carried by every evaluated (non-leaf) result.
pub const RESULT_NAME: &str = "value";

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SeriesRef(pub String);

impl fmt::Display for SeriesRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Parsed metric expression. Built once per request from the JSON tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Expr {
    Series {
        code: SeriesRef,
    },
    SeriesMath {
        op: SeriesMathOp,
        left: Box<Expr>,
        right: Box<Expr>,
        scale: Option<f64>,
    },
    Window {
        op: WindowOp,
        series: Box<Expr>,
        window: usize,
    },
    Composite {
        op: CompositeOp,
        operands: Vec<Expr>,
    },
}

impl Expr {
    #[must_use]
    pub fn series(code: impl Into<String>) -> Self {
        Self::Series {
            code: SeriesRef(code.into()),
        }
    }

    /// Expression kind of this node; `None` for a leaf reference.
    #[must_use]
    pub fn kind(&self) -> Option<ExpressionType> {
        match self {
            Self::Series { .. } => None,
            Self::SeriesMath { .. } => Some(ExpressionType::SeriesMath),
            Self::Window { .. } => Some(ExpressionType::WindowOp),
            Self::Composite { .. } => Some(ExpressionType::Composite),
        }
    }

    /// Leaf series codes in depth-first, left-to-right order, repeats included.
    #[must_use]
    pub fn leaf_codes(&self) -> Vec<&str> {
        let mut out = Vec::new();
        collect_leaves(self, &mut out);
        out
    }

    #[must_use]
    pub fn referenced_series(&self) -> BTreeSet<SeriesRef> {
        self.leaf_codes()
            .into_iter()
            .map(|code| SeriesRef(code.to_owned()))
            .collect()
    }

    #[must_use]
    pub fn depth(&self) -> usize {
        match self {
            Self::Series { .. } => 1,
            Self::SeriesMath { left, right, .. } => 1 + left.depth().max(right.depth()),
            Self::Window { series, .. } => 1 + series.depth(),
            Self::Composite { operands, .. } => {
                1 + operands.iter().map(Self::depth).max().unwrap_or(0)
            }
        }
    }
}

fn collect_leaves<'a>(expr: &'a Expr, out: &mut Vec<&'a str>) {
    match expr {
        Expr::Series { code } => out.push(&code.0),
        Expr::SeriesMath { left, right, .. } => {
            collect_leaves(left, out);
            collect_leaves(right, out);
        }
        Expr::Window { series, .. } => collect_leaves(series, out),
        Expr::Composite { operands, .. } => {
            for operand in operands {
                collect_leaves(operand, out);
            }
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Series { code } => write!(f, "{code}"),
            Self::SeriesMath {
                op,
                left,
                right,
                scale,
            } => {
                write!(f, "{op}({left}, {right})")?;
                if let Some(factor) = scale {
                    write!(f, " * {factor}")?;
                }
                Ok(())
            }
            Self::Window { op, series, window } => write!(f, "{op}({series}, {window})"),
            Self::Composite { op, operands } => {
                write!(f, "{op}(")?;
                for (pos, operand) in operands.iter().enumerate() {
                    if pos > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{operand}")?;
                }
                f.write_str(")")
            }
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct EvalContext {
    series: BTreeMap<String, TimeSeries>,
}

impl EvalContext {
    #[must_use]
    pub fn new() -> Self {
        Self {
            series: BTreeMap::new(),
        }
    }

    /// Register a series under its own name.
    pub fn insert_series(&mut self, series: TimeSeries) {
        self.series.insert(series.name().to_owned(), series);
    }

    pub fn insert(&mut self, code: impl Into<String>, series: TimeSeries) {
        self.series.insert(code.into(), series);
    }

    #[must_use]
    pub fn get_series(&self, code: &str) -> Option<&TimeSeries> {
        self.series.get(code)
    }

    #[must_use]
    pub fn contains(&self, code: &str) -> bool {
        self.series.contains_key(code)
    }

    pub fn codes(&self) -> impl Iterator<Item = &str> {
        self.series.keys().map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.series.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }
}

impl FromIterator<TimeSeries> for EvalContext {
    fn from_iter<I: IntoIterator<Item = TimeSeries>>(iter: I) -> Self {
        let mut context = Self::new();
        for series in iter {
            context.insert_series(series);
        }
        context
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExprErrorKind {
    InvalidExpression,
    SeriesNotFound,
    Numeric,
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ExprError {
    #[error("unknown expression type: {0}")]
    UnknownExpressionType(String),
    #[error("unknown operation: {0}")]
    UnknownOperation(String),
    #[error("unknown {kind} op: {op}")]
    UnknownOperator { kind: ExpressionType, op: String },
    #[error("missing operation in {context}")]
    MissingOperation { context: &'static str },
    #[error("missing operand: {field}")]
    MissingOperand { field: &'static str },
    #[error("cannot resolve operand: {0}")]
    CannotResolveOperand(String),
    #[error("expression node must be a JSON object, got {0}")]
    NotAnObject(String),
    #[error("invalid window: {0}")]
    InvalidWindow(String),
    #[error("composite requires at least 2 operands, got {found}")]
    TooFewOperands { found: usize },
    #[error("invalid {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },
    #[error("series not found: {0}")]
    SeriesNotFound(String),
    #[error(transparent)]
    Window(#[from] WindowError),
    #[error(transparent)]
    Align(#[from] AlignError),
    #[error(transparent)]
    Series(#[from] SeriesError),
}

impl ExprError {
    #[must_use]
    pub fn kind(&self) -> ExprErrorKind {
        match self {
            Self::SeriesNotFound(_) => ExprErrorKind::SeriesNotFound,
            Self::Align(AlignError::EmptyInput) => ExprErrorKind::InvalidExpression,
            Self::Window(_) | Self::Align(_) | Self::Series(_) => ExprErrorKind::Numeric,
            _ => ExprErrorKind::InvalidExpression,
        }
    }
}

/// Decide which expression kind an operator belongs to.
///
/// `sum`, `max` and `min` exist as both window and composite operators, so
/// the node shape is consulted first: `series` + `window` means a window op,
/// `operands` means a composite, `left` + `right` means series math. Without
/// a matching shape the first vocabulary containing the operator wins, in
/// the order window, series math, composite.
pub fn resolve_kind(op: &str, node: &Map<String, Value>) -> Result<ExpressionType, ExprError> {
    let has = |field: &str| node.contains_key(field);

    if has("series") && has("window") && WindowOp::from_op(op).is_some() {
        return Ok(ExpressionType::WindowOp);
    }
    if has("operands") && CompositeOp::from_op(op).is_some() {
        return Ok(ExpressionType::Composite);
    }
    if has("left") && has("right") && SeriesMathOp::from_op(op).is_some() {
        return Ok(ExpressionType::SeriesMath);
    }

    if WindowOp::from_op(op).is_some() {
        Ok(ExpressionType::WindowOp)
    } else if SeriesMathOp::from_op(op).is_some() {
        Ok(ExpressionType::SeriesMath)
    } else if CompositeOp::from_op(op).is_some() {
        Ok(ExpressionType::Composite)
    } else {
        Err(ExprError::UnknownOperation(op.to_owned()))
    }
}

/// Parse a JSON expression tree whose root has the given expression type.
///
/// The type tag is matched exactly (`series_math`, `window_op`,
/// `composite`). Nested operands are either leaf references
/// (`series_code` / `seriesCode`) or nodes whose kind is found with
/// [`resolve_kind`].
pub fn parse_expression(tree: &Value, expression_type: &str) -> Result<Expr, ExprError> {
    let kind = expression_type
        .parse::<ExpressionType>()
        .map_err(|_| ExprError::UnknownExpressionType(expression_type.to_owned()))?;
    let node = tree
        .as_object()
        .ok_or_else(|| ExprError::NotAnObject(tree.to_string()))?;
    parse_node(kind, node)
}

fn root_context(kind: ExpressionType) -> &'static str {
    match kind {
        ExpressionType::SeriesMath => "series_math expression",
        ExpressionType::WindowOp => "window_op expression",
        ExpressionType::Composite => "composite expression",
    }
}

/// A present, non-empty operator string. Absent, null, `false` and `""`
/// all count as missing; any other non-string is reported verbatim.
fn op_text(node: &Map<String, Value>) -> Option<String> {
    match node.get("op")? {
        Value::Null | Value::Bool(false) => None,
        Value::String(op) if op.is_empty() => None,
        Value::String(op) => Some(op.clone()),
        other => Some(other.to_string()),
    }
}

fn parse_node(kind: ExpressionType, node: &Map<String, Value>) -> Result<Expr, ExprError> {
    let op = op_text(node).ok_or(ExprError::MissingOperation {
        context: root_context(kind),
    })?;
    let unknown = || ExprError::UnknownOperator {
        kind,
        op: op.clone(),
    };

    match kind {
        ExpressionType::SeriesMath => {
            let op = SeriesMathOp::from_op(&op).ok_or_else(unknown)?;
            let left = parse_operand(node.get("left"), "left")?;
            let right = parse_operand(node.get("right"), "right")?;
            let scale = parse_scale(node.get("scale"))?;
            Ok(Expr::SeriesMath {
                op,
                left: Box::new(left),
                right: Box::new(right),
                scale,
            })
        }
        ExpressionType::WindowOp => {
            let op = WindowOp::from_op(&op).ok_or_else(unknown)?;
            let window = parse_window(node.get("window"))?;
            let series = parse_operand(node.get("series"), "series")?;
            Ok(Expr::Window {
                op,
                series: Box::new(series),
                window,
            })
        }
        ExpressionType::Composite => {
            let op = CompositeOp::from_op(&op).ok_or_else(unknown)?;
            let operands = match node.get("operands") {
                None | Some(Value::Null) => &[][..],
                Some(Value::Array(items)) => items.as_slice(),
                Some(other) => {
                    return Err(ExprError::InvalidField {
                        field: "operands",
                        reason: format!("expected an array, got {other}"),
                    });
                }
            };
            if operands.len() < 2 {
                return Err(ExprError::TooFewOperands {
                    found: operands.len(),
                });
            }
            let operands = operands
                .iter()
                .map(|operand| parse_operand(Some(operand), "operands"))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Expr::Composite { op, operands })
        }
    }
}

fn parse_window(raw: Option<&Value>) -> Result<usize, ExprError> {
    raw.and_then(Value::as_u64)
        .filter(|window| *window >= 1)
        .and_then(|window| usize::try_from(window).ok())
        .ok_or_else(|| {
            ExprError::InvalidWindow(raw.map_or_else(|| "null".to_owned(), Value::to_string))
        })
}

fn parse_scale(raw: Option<&Value>) -> Result<Option<f64>, ExprError> {
    match raw {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(number)) => number.as_f64().map(Some).ok_or_else(|| {
            ExprError::InvalidField {
                field: "scale",
                reason: format!("{number} is not representable as f64"),
            }
        }),
        Some(other) => Err(ExprError::InvalidField {
            field: "scale",
            reason: format!("expected a number, got {other}"),
        }),
    }
}

fn leaf_code(node: &Map<String, Value>) -> Option<&str> {
    ["series_code", "seriesCode"]
        .into_iter()
        .filter_map(|key| node.get(key).and_then(Value::as_str))
        .find(|code| !code.is_empty())
}

fn parse_operand(raw: Option<&Value>, field: &'static str) -> Result<Expr, ExprError> {
    let node = match raw {
        None | Some(Value::Null) => return Err(ExprError::MissingOperand { field }),
        Some(Value::Object(node)) => node,
        Some(other) => return Err(ExprError::CannotResolveOperand(other.to_string())),
    };

    if let Some(code) = leaf_code(node) {
        return Ok(Expr::series(code));
    }

    if node.contains_key("op") {
        let op = op_text(node).ok_or(ExprError::MissingOperation { context: "operand" })?;
        let kind = resolve_kind(&op, node)?;
        return parse_node(kind, node);
    }

    Err(ExprError::CannotResolveOperand(Value::Object(node.clone()).to_string()))
}

/// Evaluate a parsed expression against the loaded series.
///
/// Series math aligns both sides on the sorted union of their timestamps,
/// window ops sort their input by time first, and composites align every
/// operand before reducing each row.
pub fn evaluate(expr: &Expr, context: &EvalContext) -> Result<TimeSeries, ExprError> {
    let out = match expr {
        Expr::Series { code } => context
            .get_series(&code.0)
            .cloned()
            .ok_or_else(|| ExprError::SeriesNotFound(code.0.clone()))?,
        Expr::SeriesMath {
            op,
            left,
            right,
            scale,
        } => {
            let lhs = evaluate(left, context)?;
            let rhs = evaluate(right, context)?;
            let combined = align_two(&lhs, &rhs)?.combine(*op, RESULT_NAME)?;
            match scale {
                Some(factor) => combined.scale(*factor),
                None => combined,
            }
        }
        Expr::Window { op, series, window } => {
            if *window < 1 {
                return Err(ExprError::InvalidWindow(window.to_string()));
            }
            let input = evaluate(series, context)?;
            apply_to_series(*op, input, *window)?.with_name(RESULT_NAME)
        }
        Expr::Composite { op, operands } => {
            if operands.len() < 2 {
                return Err(ExprError::TooFewOperands {
                    found: operands.len(),
                });
            }
            let resolved = operands
                .iter()
                .map(|operand| evaluate(operand, context))
                .collect::<Result<Vec<_>, _>>()?;
            let frame = align_many(&resolved)?;
            TimeSeries::new(RESULT_NAME, frame.index().clone(), frame.reduce_rows(*op))?
        }
    };

    #[cfg(feature = "tracing")]
    tracing::trace!(node = %expr, rows = out.len(), "expression_node_evaluated");

    Ok(out)
}

/// Parse and evaluate in one step.
pub fn evaluate_json(
    tree: &Value,
    expression_type: &str,
    context: &EvalContext,
) -> Result<TimeSeries, ExprError> {
    let expr = parse_expression(tree, expression_type)?;
    evaluate(&expr, context)
}
