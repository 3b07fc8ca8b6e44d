#![forbid(unsafe_code)]

use std::collections::BTreeSet;
use std::path::Path;

use csv::{ReaderBuilder, StringRecord, WriterBuilder};
use mw_series::{SeriesError, TimeSeries};
use mw_types::{ObsTime, TypeError, format_obs_time, parse_obs_time};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const OBS_TIME_COLUMN: &str = "obs_time";
pub const VALUE_COLUMN: &str = "value";
pub const SERIES_CODE_COLUMN: &str = "internal_series_code";

#[derive(Debug, Error)]
pub enum IoError {
    #[error("no data files provided for series {0}")]
    NoInputs(String),
    #[error("csv input is missing required column {0:?}")]
    MissingColumn(&'static str),
    #[error("series not found: {code} (available series: {})", format_available(.available))]
    SeriesNotFound {
        code: String,
        available: Vec<String>,
    },
    /// `row` counts data rows from 1; the header is not counted.
    #[error("row {row}: {source}")]
    Timestamp { row: usize, source: TypeError },
    #[error("row {row}: value {raw:?} is not numeric")]
    InvalidValue { row: usize, raw: String },
    #[error(transparent)]
    Csv(#[from] csv::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Utf8(#[from] std::string::FromUtf8Error),
    #[error(transparent)]
    Series(#[from] SeriesError),
}

fn format_available(available: &[String]) -> String {
    if available.is_empty() {
        return "none found".to_owned();
    }
    available
        .iter()
        .take(20)
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

struct ColumnPositions {
    obs_time: usize,
    value: usize,
    code: usize,
}

impl ColumnPositions {
    fn from_headers(headers: &StringRecord) -> Result<Self, IoError> {
        let find = |name: &'static str| {
            headers
                .iter()
                .position(|header| header.trim() == name)
                .ok_or(IoError::MissingColumn(name))
        };
        Ok(Self {
            obs_time: find(OBS_TIME_COLUMN)?,
            value: find(VALUE_COLUMN)?,
            code: find(SERIES_CODE_COLUMN)?,
        })
    }
}

fn parse_value(raw: &str, row: usize) -> Result<f64, IoError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(f64::NAN);
    }
    trimmed.parse::<f64>().map_err(|_| IoError::InvalidValue {
        row,
        raw: raw.to_owned(),
    })
}

/// Rows matching `series_code` from one CSV document. Only the three
/// required columns are inspected; every code seen goes into `available`.
fn collect_rows(
    input: &str,
    series_code: &str,
    rows: &mut Vec<(ObsTime, f64)>,
    available: &mut BTreeSet<String>,
) -> Result<(), IoError> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::Fields)
        .from_reader(input.as_bytes());

    let headers = reader.headers().cloned().map_err(IoError::from)?;
    let positions = ColumnPositions::from_headers(&headers)?;

    for (index, record) in reader.records().enumerate() {
        let record = record?;
        let row = index + 1;
        let code = record.get(positions.code).unwrap_or_default();
        if !code.is_empty() && !available.contains(code) {
            available.insert(code.to_owned());
        }
        if code != series_code {
            continue;
        }

        let stamp = parse_obs_time(record.get(positions.obs_time).unwrap_or_default())
            .map_err(|source| IoError::Timestamp { row, source })?;
        let value = parse_value(record.get(positions.value).unwrap_or_default(), row)?;
        rows.push((stamp, value));
    }

    Ok(())
}

/// Read one series out of several CSV documents with the
/// `obs_time,value,internal_series_code` layout.
///
/// Empty values become NaN and the result is sorted by time. When no row
/// carries `series_code` the error lists the codes that were present.
pub fn read_series_csv_inputs<S: AsRef<str>>(
    inputs: &[S],
    series_code: &str,
) -> Result<TimeSeries, IoError> {
    if inputs.is_empty() {
        return Err(IoError::NoInputs(series_code.to_owned()));
    }

    let mut rows = Vec::new();
    let mut available = BTreeSet::new();
    for input in inputs {
        collect_rows(input.as_ref(), series_code, &mut rows, &mut available)?;
    }

    if rows.is_empty() {
        return Err(IoError::SeriesNotFound {
            code: series_code.to_owned(),
            available: available.into_iter().collect(),
        });
    }

    Ok(TimeSeries::from_pairs(series_code, rows)?.sort_by_time())
}

pub fn read_series_csv_str(input: &str, series_code: &str) -> Result<TimeSeries, IoError> {
    read_series_csv_inputs(&[input], series_code)
}

pub fn read_series_csv_files<P: AsRef<Path>>(
    paths: &[P],
    series_code: &str,
) -> Result<TimeSeries, IoError> {
    let contents = paths
        .iter()
        .map(std::fs::read_to_string)
        .collect::<Result<Vec<_>, _>>()?;
    read_series_csv_inputs(contents.as_slice(), series_code)
}

/// CSV rendering in the reader's layout. NaN values become empty fields.
pub fn write_series_csv_string(series: &TimeSeries, series_code: &str) -> Result<String, IoError> {
    let mut writer = WriterBuilder::new().from_writer(Vec::new());
    writer.write_record([OBS_TIME_COLUMN, VALUE_COLUMN, SERIES_CODE_COLUMN])?;

    for (stamp, value) in series.iter() {
        let value = if value.is_nan() {
            String::new()
        } else {
            value.to_string()
        };
        writer.write_record([format_obs_time(stamp).as_str(), value.as_str(), series_code])?;
    }

    let bytes = writer.into_inner().map_err(|err| err.into_error())?;
    Ok(String::from_utf8(bytes)?)
}

/// One output line: `{"obs_time": "...", "value": number|null}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonlRow {
    pub obs_time: String,
    pub value: Option<f64>,
}

/// Metric output as newline-delimited JSON. Non-finite values are written as
/// `null`.
pub fn write_jsonl_string(series: &TimeSeries) -> Result<String, IoError> {
    let mut out = String::new();
    for (stamp, value) in series.iter() {
        let row = JsonlRow {
            obs_time: format_obs_time(stamp),
            value: value.is_finite().then_some(value),
        };
        out.push_str(&serde_json::to_string(&row)?);
        out.push('\n');
    }
    Ok(out)
}

pub fn read_jsonl_str(input: &str) -> Result<Vec<JsonlRow>, IoError> {
    input
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| serde_json::from_str(line).map_err(IoError::from))
        .collect()
}
