#![forbid(unsafe_code)]

use mw_index::{IndexError, TimeIndex};
use mw_types::{ObsTime, SeriesMathOp};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SeriesError {
    #[error("index length ({index_len}) does not match value length ({value_len})")]
    LengthMismatch { index_len: usize, value_len: usize },
    #[error("value vector length mismatch: left={left}, right={right}")]
    ValueLengthMismatch { left: usize, right: usize },
    #[error(transparent)]
    Index(#[from] IndexError),
}

/// A named, time-indexed `f64` sequence with unique timestamps.
///
/// Input order is preserved as given; callers that need chronological order
/// call [`TimeSeries::sort_by_time`]. Missing observations are `NaN`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSeries {
    name: String,
    index: TimeIndex,
    values: Vec<f64>,
}

impl TimeSeries {
    pub fn new(
        name: impl Into<String>,
        index: TimeIndex,
        values: Vec<f64>,
    ) -> Result<Self, SeriesError> {
        if index.len() != values.len() {
            return Err(SeriesError::LengthMismatch {
                index_len: index.len(),
                value_len: values.len(),
            });
        }
        if let Some(stamp) = index.first_duplicate() {
            return Err(IndexError::DuplicateTimestamp(stamp).into());
        }

        Ok(Self {
            name: name.into(),
            index,
            values,
        })
    }

    pub fn from_pairs(
        name: impl Into<String>,
        pairs: impl IntoIterator<Item = (ObsTime, f64)>,
    ) -> Result<Self, SeriesError> {
        let (stamps, values): (Vec<_>, Vec<_>) = pairs.into_iter().unzip();
        Self::new(name, TimeIndex::new(stamps), values)
    }

    #[must_use]
    pub fn empty(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            index: TimeIndex::default(),
            values: Vec::new(),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn index(&self) -> &TimeIndex {
        &self.index
    }

    #[must_use]
    pub fn stamps(&self) -> &[ObsTime] {
        self.index.stamps()
    }

    #[must_use]
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ObsTime, f64)> + '_ {
        self.index
            .stamps()
            .iter()
            .copied()
            .zip(self.values.iter().copied())
    }

    #[must_use]
    pub fn is_sorted_by_time(&self) -> bool {
        self.index.is_monotonic_increasing()
    }

    /// Chronologically ordered copy. Already-sorted input is returned as is.
    #[must_use]
    pub fn sort_by_time(self) -> Self {
        if self.is_sorted_by_time() {
            return self;
        }
        let order = self.index.sort_order();
        let values = order.iter().map(|&pos| self.values[pos]).collect();
        Self {
            name: self.name,
            index: self.index.take(&order),
            values,
        }
    }

    /// Values laid out along an alignment axis; `None` slots become `NaN`.
    #[must_use]
    pub fn reindex_by_positions(&self, positions: &[Option<usize>]) -> Vec<f64> {
        positions
            .iter()
            .map(|slot| {
                slot.and_then(|pos| self.values.get(pos).copied())
                    .unwrap_or(f64::NAN)
            })
            .collect()
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Same index, new values. Length must match the index.
    pub fn with_values(&self, values: Vec<f64>) -> Result<Self, SeriesError> {
        if values.len() != self.index.len() {
            return Err(SeriesError::LengthMismatch {
                index_len: self.index.len(),
                value_len: values.len(),
            });
        }
        Ok(Self {
            name: self.name.clone(),
            index: self.index.clone(),
            values,
        })
    }

    #[must_use]
    pub fn map_values(mut self, func: impl Fn(f64) -> f64) -> Self {
        for value in &mut self.values {
            *value = func(*value);
        }
        self
    }

    #[must_use]
    pub fn scale(self, factor: f64) -> Self {
        self.map_values(|value| value * factor)
    }
}

/// Elementwise arithmetic over two equally long value vectors.
pub fn binary_values(
    left: &[f64],
    right: &[f64],
    op: SeriesMathOp,
) -> Result<Vec<f64>, SeriesError> {
    if left.len() != right.len() {
        return Err(SeriesError::ValueLengthMismatch {
            left: left.len(),
            right: right.len(),
        });
    }

    Ok(left
        .iter()
        .zip(right)
        .map(|(lhs, rhs)| op.apply(*lhs, *rhs))
        .collect())
}
