#![forbid(unsafe_code)]

use chrono::TimeDelta;
use mw_series::{SeriesError, TimeSeries};
use mw_types::{ObsTime, WindowOp};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum WindowError {
    #[error("window must be >= 1, got {window}")]
    InvalidWindow { window: usize },
    #[error("timestamp count ({stamps}) does not match value count ({values})")]
    LengthMismatch { stamps: usize, values: usize },
    #[error("lag requires timestamps in ascending order")]
    UnsortedIndex,
    #[error(transparent)]
    Series(#[from] SeriesError),
}

fn check_window(window: usize) -> Result<(), WindowError> {
    if window < 1 {
        return Err(WindowError::InvalidWindow { window });
    }
    Ok(())
}

/// Trailing fixed-size window. A slot is NaN until `window` values are
/// available, and NaN whenever the window contains a NaN.
fn rolling(values: &[f64], window: usize, reduce: impl Fn(&[f64]) -> f64) -> Vec<f64> {
    let mut out = vec![f64::NAN; values.len()];
    if values.len() < window {
        return out;
    }
    for (offset, frame) in values.windows(window).enumerate() {
        if frame.iter().any(|value| value.is_nan()) {
            continue;
        }
        out[offset + window - 1] = reduce(frame);
    }
    out
}

pub fn sma(values: &[f64], window: usize) -> Result<Vec<f64>, WindowError> {
    check_window(window)?;
    Ok(rolling(values, window, |frame| {
        frame.iter().sum::<f64>() / frame.len() as f64
    }))
}

pub fn window_sum(values: &[f64], window: usize) -> Result<Vec<f64>, WindowError> {
    check_window(window)?;
    Ok(rolling(values, window, |frame| frame.iter().sum()))
}

pub fn window_max(values: &[f64], window: usize) -> Result<Vec<f64>, WindowError> {
    check_window(window)?;
    Ok(rolling(values, window, |frame| {
        frame.iter().copied().fold(f64::NEG_INFINITY, f64::max)
    }))
}

pub fn window_min(values: &[f64], window: usize) -> Result<Vec<f64>, WindowError> {
    check_window(window)?;
    Ok(rolling(values, window, |frame| {
        frame.iter().copied().fold(f64::INFINITY, f64::min)
    }))
}

/// Exponential moving average with span `window` (alpha = 2 / (window + 1)),
/// seeded at the first observation with no bias adjustment.
///
/// Missing inputs keep the previous average and decay the weight of the
/// history, so the next observation counts for more. Positions before the
/// first observation stay NaN; finite input therefore never yields NaN.
pub fn ema(values: &[f64], window: usize) -> Result<Vec<f64>, WindowError> {
    check_window(window)?;

    let alpha = 2.0 / (window as f64 + 1.0);
    let decay = 1.0 - alpha;
    let mut out = Vec::with_capacity(values.len());
    let mut weighted = f64::NAN;
    let mut old_weight = 1.0;

    for &current in values {
        let observed = !current.is_nan();
        if weighted.is_nan() {
            if observed {
                weighted = current;
            }
        } else {
            old_weight *= decay;
            if observed {
                if weighted != current {
                    weighted = (old_weight * weighted + alpha * current) / (old_weight + alpha);
                }
                old_weight = 1.0;
            }
        }
        out.push(weighted);
    }

    Ok(out)
}

/// Positional shift by `periods` entries; the first `periods` slots are NaN.
pub fn shift(values: &[f64], periods: usize) -> Result<Vec<f64>, WindowError> {
    check_window(periods)?;
    Ok((0..values.len())
        .map(|pos| {
            pos.checked_sub(periods)
                .map_or(f64::NAN, |source| values[source])
        })
        .collect())
}

/// Calendar lag: for each stamp `t`, the value at the latest stamp that is
/// `<= t - window_days`, or NaN when no such stamp exists.
pub fn lag(
    stamps: &[ObsTime],
    values: &[f64],
    window_days: usize,
) -> Result<Vec<f64>, WindowError> {
    check_window(window_days)?;
    if stamps.len() != values.len() {
        return Err(WindowError::LengthMismatch {
            stamps: stamps.len(),
            values: values.len(),
        });
    }
    if stamps.windows(2).any(|pair| pair[0] > pair[1]) {
        return Err(WindowError::UnsortedIndex);
    }

    let Some(offset) = i64::try_from(window_days)
        .ok()
        .and_then(TimeDelta::try_days)
    else {
        return Ok(vec![f64::NAN; values.len()]);
    };

    Ok(stamps
        .iter()
        .map(|stamp| {
            let Some(target) = stamp.checked_sub_signed(offset) else {
                return f64::NAN;
            };
            match stamps.partition_point(|candidate| *candidate <= target) {
                0 => f64::NAN,
                found => values[found - 1],
            }
        })
        .collect())
}

/// Dispatch one window operator over time-sorted stamps and values.
pub fn apply(
    op: WindowOp,
    stamps: &[ObsTime],
    values: &[f64],
    window: usize,
) -> Result<Vec<f64>, WindowError> {
    match op {
        WindowOp::Sma => sma(values, window),
        WindowOp::Ema => ema(values, window),
        WindowOp::Sum => window_sum(values, window),
        WindowOp::Max => window_max(values, window),
        WindowOp::Min => window_min(values, window),
        WindowOp::Lag => lag(stamps, values, window),
    }
}

/// Sort `series` by time and apply `op`; the result keeps the sorted index.
pub fn apply_to_series(
    op: WindowOp,
    series: TimeSeries,
    window: usize,
) -> Result<TimeSeries, WindowError> {
    let sorted = series.sort_by_time();
    let values = apply(op, sorted.stamps(), sorted.values(), window)?;
    Ok(sorted.with_values(values)?)
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, TimeDelta};
    use mw_series::TimeSeries;
    use mw_types::{ObsTime, WindowOp, values_semantic_eq};
    use proptest::prelude::*;

    use super::{
        WindowError, apply, apply_to_series, ema, lag, shift, sma, window_max, window_min,
        window_sum,
    };

    const NAN: f64 = f64::NAN;

    fn daily(count: usize) -> Vec<ObsTime> {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1)
            .and_then(|date| date.and_hms_opt(0, 0, 0))
            .expect("valid date");
        (0..count)
            .map(|offset| start + TimeDelta::days(offset as i64))
            .collect()
    }

    #[test]
    fn sma_matches_trailing_mean() {
        let out = sma(&[1.0, 2.0, 3.0, 4.0, 5.0], 3).expect("sma");
        assert!(values_semantic_eq(&out, &[NAN, NAN, 2.0, 3.0, 4.0]));
    }

    #[test]
    fn window_sum_matches_trailing_sum() {
        let out = window_sum(&[1.0, 2.0, 3.0, 4.0, 5.0], 3).expect("sum");
        assert!(values_semantic_eq(&out, &[NAN, NAN, 6.0, 9.0, 12.0]));
    }

    #[test]
    fn window_extrema() {
        let values = [3.0, 1.0, 4.0, 1.0, 5.0];
        let max = window_max(&values, 2).expect("max");
        let min = window_min(&values, 2).expect("min");
        assert!(values_semantic_eq(&max, &[NAN, 3.0, 4.0, 4.0, 5.0]));
        assert!(values_semantic_eq(&min, &[NAN, 1.0, 1.0, 1.0, 1.0]));
    }

    #[test]
    fn short_input_is_all_nan() {
        let values = [1.0, 2.0];
        for out in [
            sma(&values, 3),
            window_sum(&values, 3),
            window_max(&values, 3),
            window_min(&values, 3),
        ] {
            let out = out.expect("window fn");
            assert_eq!(out.len(), 2);
            assert!(out.iter().all(|value| value.is_nan()));
        }
    }

    #[test]
    fn nan_inside_window_yields_nan() {
        let out = window_sum(&[1.0, NAN, 3.0, 4.0], 2).expect("sum");
        assert!(values_semantic_eq(&out, &[NAN, NAN, NAN, 7.0]));
    }

    #[test]
    fn zero_window_is_rejected_everywhere() {
        let stamps = daily(2);
        let values = [1.0, 2.0];
        for op in WindowOp::ALL {
            assert_eq!(
                apply(op, &stamps, &values, 0).expect_err("window 0"),
                WindowError::InvalidWindow { window: 0 },
                "{op}"
            );
        }
        assert!(shift(&values, 0).is_err());
    }

    #[test]
    fn ema_is_seeded_at_first_value() {
        let out = ema(&[1.0, 2.0, 3.0], 3).expect("ema");
        assert_eq!(out, vec![1.0, 1.5, 2.25]);
    }

    #[test]
    fn ema_carries_through_missing_values() {
        let out = ema(&[NAN, 2.0, NAN, 4.0], 3).expect("ema");
        assert!(out[0].is_nan());
        assert_eq!(out[1], 2.0);
        assert_eq!(out[2], 2.0);
        // history weight decayed to 0.25 across the gap
        assert!((out[3] - (0.25 * 2.0 + 0.5 * 4.0) / 0.75).abs() < 1e-12);
    }

    #[test]
    fn lag_uses_calendar_days() {
        let out = lag(&daily(5), &[1.0, 2.0, 3.0, 4.0, 5.0], 2).expect("lag");
        assert!(values_semantic_eq(&out, &[NAN, NAN, 1.0, 2.0, 3.0]));
    }

    #[test]
    fn lag_picks_latest_prior_observation_on_gaps() {
        let days = daily(10);
        let stamps = vec![days[0], days[1], days[5], days[9]];
        let out = lag(&stamps, &[10.0, 20.0, 30.0, 40.0], 3).expect("lag");
        // day 5 looks back to day 2 -> latest is day 1; day 9 -> day 6 -> day 5
        assert!(values_semantic_eq(&out, &[NAN, NAN, 20.0, 30.0]));
    }

    #[test]
    fn lag_validates_shape_and_order() {
        let stamps = daily(3);
        assert_eq!(
            lag(&stamps, &[1.0], 1).expect_err("mismatch"),
            WindowError::LengthMismatch {
                stamps: 3,
                values: 1
            }
        );
        let reversed = stamps.iter().rev().copied().collect::<Vec<_>>();
        assert_eq!(
            lag(&reversed, &[1.0, 2.0, 3.0], 1).expect_err("unsorted"),
            WindowError::UnsortedIndex
        );
    }

    #[test]
    fn huge_lag_window_is_all_nan() {
        let out = lag(&daily(3), &[1.0, 2.0, 3.0], usize::MAX).expect("lag");
        assert!(out.iter().all(|value| value.is_nan()));
    }

    #[test]
    fn shift_is_positional() {
        let out = shift(&[1.0, 2.0, 3.0], 1).expect("shift");
        assert!(values_semantic_eq(&out, &[NAN, 1.0, 2.0]));
    }

    #[test]
    fn apply_to_series_sorts_before_windowing() {
        let stamps = daily(3);
        let series = TimeSeries::from_pairs(
            "A",
            [(stamps[2], 3.0), (stamps[0], 1.0), (stamps[1], 2.0)],
        )
        .expect("series");
        let out = apply_to_series(WindowOp::Sum, series, 2).expect("apply");
        assert_eq!(out.stamps(), stamps.as_slice());
        assert!(values_semantic_eq(out.values(), &[NAN, 3.0, 5.0]));
    }

    proptest! {
        #[test]
        fn rolling_prefix_is_nan(
            values in proptest::collection::vec(-1e6_f64..1e6, 0..40),
            window in 1_usize..10,
        ) {
            let out = sma(&values, window).expect("sma");
            prop_assert_eq!(out.len(), values.len());
            for (pos, value) in out.iter().enumerate() {
                prop_assert_eq!(value.is_nan(), pos + 1 < window);
            }
        }

        #[test]
        fn ema_is_finite_for_finite_input(
            values in proptest::collection::vec(-1e6_f64..1e6, 1..40),
            window in 1_usize..20,
        ) {
            let out = ema(&values, window).expect("ema");
            prop_assert_eq!(out.len(), values.len());
            prop_assert!(out.iter().all(|value| value.is_finite()));
        }
    }
}
