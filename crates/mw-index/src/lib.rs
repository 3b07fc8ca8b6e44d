#![forbid(unsafe_code)]

use std::collections::{BTreeMap, HashSet};

use mw_types::ObsTime;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TimeIndex {
    stamps: Vec<ObsTime>,
}

impl TimeIndex {
    #[must_use]
    pub fn new(stamps: Vec<ObsTime>) -> Self {
        Self { stamps }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.stamps.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stamps.is_empty()
    }

    #[must_use]
    pub fn stamps(&self) -> &[ObsTime] {
        &self.stamps
    }

    #[must_use]
    pub fn first_duplicate(&self) -> Option<ObsTime> {
        let mut seen = HashSet::<&ObsTime>::with_capacity(self.stamps.len());
        self.stamps
            .iter()
            .find(|stamp| !seen.insert(*stamp))
            .copied()
    }

    #[must_use]
    pub fn has_duplicates(&self) -> bool {
        self.first_duplicate().is_some()
    }

    #[must_use]
    pub fn is_monotonic_increasing(&self) -> bool {
        self.stamps.windows(2).all(|pair| pair[0] <= pair[1])
    }

    #[must_use]
    pub fn position(&self, needle: &ObsTime) -> Option<usize> {
        self.stamps.iter().position(|stamp| stamp == needle)
    }

    /// Stable ascending order of positions; ties keep input order.
    #[must_use]
    pub fn sort_order(&self) -> Vec<usize> {
        let mut order = (0..self.stamps.len()).collect::<Vec<_>>();
        order.sort_by_key(|&pos| self.stamps[pos]);
        order
    }

    #[must_use]
    pub fn take(&self, positions: &[usize]) -> Self {
        Self::new(
            positions
                .iter()
                .filter_map(|&pos| self.stamps.get(pos).copied())
                .collect(),
        )
    }
}

impl From<Vec<ObsTime>> for TimeIndex {
    fn from(stamps: Vec<ObsTime>) -> Self {
        Self::new(stamps)
    }
}

/// Positions into the left/right inputs for every stamp of the union axis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlignmentPlan {
    pub union_index: TimeIndex,
    pub left_positions: Vec<Option<usize>>,
    pub right_positions: Vec<Option<usize>>,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IndexError {
    #[error("alignment vectors must have equal lengths")]
    InvalidAlignmentVectors,
    #[error("duplicate observation timestamp {0} is not allowed within one series")]
    DuplicateTimestamp(ObsTime),
}

/// Full outer union of two indexes, sorted ascending by timestamp.
///
/// When a stamp repeats inside one input the first occurrence wins; series
/// construction rejects duplicates so this only matters for raw indexes.
#[must_use]
pub fn align_union(left: &TimeIndex, right: &TimeIndex) -> AlignmentPlan {
    let mut slots = BTreeMap::<ObsTime, (Option<usize>, Option<usize>)>::new();

    for (pos, stamp) in left.stamps.iter().enumerate() {
        let slot = slots.entry(*stamp).or_default();
        slot.0.get_or_insert(pos);
    }
    for (pos, stamp) in right.stamps.iter().enumerate() {
        let slot = slots.entry(*stamp).or_default();
        slot.1.get_or_insert(pos);
    }

    let mut union_stamps = Vec::with_capacity(slots.len());
    let mut left_positions = Vec::with_capacity(slots.len());
    let mut right_positions = Vec::with_capacity(slots.len());
    for (stamp, (left_pos, right_pos)) in slots {
        union_stamps.push(stamp);
        left_positions.push(left_pos);
        right_positions.push(right_pos);
    }

    AlignmentPlan {
        union_index: TimeIndex::new(union_stamps),
        left_positions,
        right_positions,
    }
}

pub fn validate_alignment_plan(plan: &AlignmentPlan) -> Result<(), IndexError> {
    if plan.left_positions.len() != plan.right_positions.len()
        || plan.left_positions.len() != plan.union_index.len()
    {
        return Err(IndexError::InvalidAlignmentVectors);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use mw_types::ObsTime;

    use super::{TimeIndex, align_union, validate_alignment_plan};

    fn day(d: u32) -> ObsTime {
        NaiveDate::from_ymd_opt(2024, 1, d)
            .and_then(|date| date.and_hms_opt(0, 0, 0))
            .expect("valid date")
    }

    #[test]
    fn union_alignment_is_sorted_by_time() {
        let left = TimeIndex::new(vec![day(4), day(1), day(2)]);
        let right = TimeIndex::new(vec![day(3), day(2)]);

        let plan = align_union(&left, &right);
        assert_eq!(
            plan.union_index.stamps(),
            &[day(1), day(2), day(3), day(4)]
        );
        assert_eq!(plan.left_positions, vec![Some(1), Some(2), None, Some(0)]);
        assert_eq!(plan.right_positions, vec![None, Some(1), Some(0), None]);
        validate_alignment_plan(&plan).expect("plan must be valid");
    }

    #[test]
    fn duplicate_detection_reports_first_repeat() {
        let index = TimeIndex::new(vec![day(1), day(2), day(1)]);
        assert!(index.has_duplicates());
        assert_eq!(index.first_duplicate(), Some(day(1)));

        let unique = TimeIndex::new(vec![day(1), day(2), day(3)]);
        assert_eq!(unique.first_duplicate(), None);
    }

    #[test]
    fn sort_order_is_stable_and_take_reorders() {
        let index = TimeIndex::new(vec![day(3), day(1), day(2)]);
        assert!(!index.is_monotonic_increasing());
        let order = index.sort_order();
        assert_eq!(order, vec![1, 2, 0]);
        let sorted = index.take(&order);
        assert!(sorted.is_monotonic_increasing());
        assert_eq!(sorted.position(&day(3)), Some(2));
    }
}
