#![forbid(unsafe_code)]

use mw_index::{IndexError, TimeIndex, align_union, validate_alignment_plan};
use mw_series::{SeriesError, TimeSeries, binary_values};
use mw_types::{CompositeOp, SeriesMathOp};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum AlignError {
    #[error("cannot align an empty series list")]
    EmptyInput,
    #[error(transparent)]
    Index(#[from] IndexError),
    #[error(transparent)]
    Series(#[from] SeriesError),
}

/// Two series laid out on their sorted outer-union axis.
#[derive(Debug, Clone, PartialEq)]
pub struct AlignedPair {
    pub index: TimeIndex,
    pub left_values: Vec<f64>,
    pub right_values: Vec<f64>,
}

impl AlignedPair {
    #[must_use]
    pub fn len(&self) -> usize {
        self.index.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn combine(self, op: SeriesMathOp, name: &str) -> Result<TimeSeries, AlignError> {
        let values = binary_values(&self.left_values, &self.right_values, op)?;
        Ok(TimeSeries::new(name, self.index, values)?)
    }
}

pub fn align_two(left: &TimeSeries, right: &TimeSeries) -> Result<AlignedPair, AlignError> {
    let plan = align_union(left.index(), right.index());
    validate_alignment_plan(&plan)?;

    Ok(AlignedPair {
        left_values: left.reindex_by_positions(&plan.left_positions),
        right_values: right.reindex_by_positions(&plan.right_positions),
        index: plan.union_index,
    })
}

/// N series on a shared axis. Column `i` holds input `i`, named `value_{i}`.
#[derive(Debug, Clone, PartialEq)]
pub struct AlignedFrame {
    index: TimeIndex,
    columns: Vec<Vec<f64>>,
}

impl AlignedFrame {
    #[must_use]
    pub fn index(&self) -> &TimeIndex {
        &self.index
    }

    #[must_use]
    pub fn columns(&self) -> &[Vec<f64>] {
        &self.columns
    }

    #[must_use]
    pub fn column(&self, position: usize) -> Option<&[f64]> {
        self.columns.get(position).map(Vec::as_slice)
    }

    #[must_use]
    pub fn column_name(position: usize) -> String {
        format!("value_{position}")
    }

    #[must_use]
    pub fn row_count(&self) -> usize {
        self.index.len()
    }

    #[must_use]
    pub fn row(&self, row: usize) -> Vec<f64> {
        self.columns
            .iter()
            .map(|column| column.get(row).copied().unwrap_or(f64::NAN))
            .collect()
    }

    #[must_use]
    pub fn reduce_rows(&self, op: CompositeOp) -> Vec<f64> {
        (0..self.row_count())
            .map(|row| op.reduce(&self.row(row)))
            .collect()
    }
}

/// Repeated outer-join accumulation; the first series seeds the axis.
pub fn align_many(series_list: &[TimeSeries]) -> Result<AlignedFrame, AlignError> {
    let Some((first, rest)) = series_list.split_first() else {
        return Err(AlignError::EmptyInput);
    };

    let seed = align_union(first.index(), &TimeIndex::default());
    validate_alignment_plan(&seed)?;
    let mut union_index = seed.union_index;
    let mut columns = vec![first.reindex_by_positions(&seed.left_positions)];

    for series in rest {
        let plan = align_union(&union_index, series.index());
        validate_alignment_plan(&plan)?;

        for column in &mut columns {
            *column = plan
                .left_positions
                .iter()
                .map(|slot| slot.and_then(|pos| column.get(pos).copied()).unwrap_or(f64::NAN))
                .collect();
        }
        columns.push(series.reindex_by_positions(&plan.right_positions));
        union_index = plan.union_index;
    }

    Ok(AlignedFrame {
        index: union_index,
        columns,
    })
}
