#![forbid(unsafe_code)]

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Observation timestamp. Series data carries naive (zone-less) times.
pub type ObsTime = NaiveDateTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpressionType {
    SeriesMath,
    WindowOp,
    Composite,
}

impl ExpressionType {
    pub const ALL: [Self; 3] = [Self::SeriesMath, Self::WindowOp, Self::Composite];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SeriesMath => "series_math",
            Self::WindowOp => "window_op",
            Self::Composite => "composite",
        }
    }
}

impl fmt::Display for ExpressionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExpressionType {
    type Err = TypeError;

    /// Exact, case-sensitive match against the three wire names.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == value)
            .ok_or_else(|| TypeError::UnknownExpressionType(value.to_owned()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeriesMathOp {
    Add,
    Subtract,
    Multiply,
    Ratio,
}

impl SeriesMathOp {
    pub const ALL: [Self; 4] = [Self::Add, Self::Subtract, Self::Multiply, Self::Ratio];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Subtract => "subtract",
            Self::Multiply => "multiply",
            Self::Ratio => "ratio",
        }
    }

    #[must_use]
    pub fn from_op(op: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|candidate| candidate.as_str() == op)
    }

    /// Elementwise application. `Ratio` is plain IEEE division: x/0 is ±inf, 0/0 is NaN.
    #[must_use]
    pub fn apply(self, lhs: f64, rhs: f64) -> f64 {
        match self {
            Self::Add => lhs + rhs,
            Self::Subtract => lhs - rhs,
            Self::Multiply => lhs * rhs,
            Self::Ratio => lhs / rhs,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowOp {
    Sma,
    Ema,
    Sum,
    Max,
    Min,
    Lag,
}

impl WindowOp {
    pub const ALL: [Self; 6] = [
        Self::Sma,
        Self::Ema,
        Self::Sum,
        Self::Max,
        Self::Min,
        Self::Lag,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sma => "sma",
            Self::Ema => "ema",
            Self::Sum => "sum",
            Self::Max => "max",
            Self::Min => "min",
            Self::Lag => "lag",
        }
    }

    #[must_use]
    pub fn from_op(op: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|candidate| candidate.as_str() == op)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompositeOp {
    Sum,
    Avg,
    Max,
    Min,
}

impl CompositeOp {
    pub const ALL: [Self; 4] = [Self::Sum, Self::Avg, Self::Max, Self::Min];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sum => "sum",
            Self::Avg => "avg",
            Self::Max => "max",
            Self::Min => "min",
        }
    }

    #[must_use]
    pub fn from_op(op: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|candidate| candidate.as_str() == op)
    }

    /// Row reduction with NaN-skip semantics. A row whose every value is
    /// NaN (or an empty row) reduces to NaN for all four aggregations.
    #[must_use]
    pub fn reduce(self, row: &[f64]) -> f64 {
        let mut present = row.iter().copied().filter(|value| !value.is_nan());
        let Some(first) = present.next() else {
            return f64::NAN;
        };

        match self {
            Self::Sum => present.fold(first, |acc, value| acc + value),
            Self::Avg => {
                let (sum, count) = present.fold((first, 1_usize), |(sum, count), value| {
                    (sum + value, count + 1)
                });
                sum / count as f64
            }
            Self::Max => present.fold(first, f64::max),
            Self::Min => present.fold(first, f64::min),
        }
    }
}

macro_rules! impl_op_display {
    ($($ty:ty),+) => {
        $(impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        })+
    };
}

impl_op_display!(SeriesMathOp, WindowOp, CompositeOp);

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TypeError {
    #[error("unknown expression type: {0}")]
    UnknownExpressionType(String),
    #[error("unparseable observation timestamp: {0:?}")]
    InvalidTimestamp(String),
}

const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// Parse an observation timestamp.
///
/// Accepts RFC 3339 (offsets are normalized to UTC and dropped),
/// `YYYY-MM-DDTHH:MM:SS[.f]`, `YYYY-MM-DD HH:MM:SS[.f]` and bare dates,
/// which land on midnight.
pub fn parse_obs_time(raw: &str) -> Result<ObsTime, TypeError> {
    let trimmed = raw.trim();

    if let Ok(value) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(value.naive_utc());
    }
    for format in NAIVE_FORMATS {
        if let Ok(value) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Ok(value);
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        return Ok(date.and_time(NaiveTime::MIN));
    }

    Err(TypeError::InvalidTimestamp(raw.to_owned()))
}

/// ISO-8601 rendering without offset; fractional seconds only when non-zero.
#[must_use]
pub fn format_obs_time(ts: ObsTime) -> String {
    ts.format("%Y-%m-%dT%H:%M:%S%.f").to_string()
}

/// NaN-aware equality: two NaNs compare equal.
#[must_use]
pub fn semantic_eq(left: f64, right: f64) -> bool {
    (left.is_nan() && right.is_nan()) || left == right
}

#[must_use]
pub fn values_semantic_eq(left: &[f64], right: &[f64]) -> bool {
    left.len() == right.len()
        && left
            .iter()
            .zip(right)
            .all(|(l, r)| semantic_eq(*l, *r))
}
