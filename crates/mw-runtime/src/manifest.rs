use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    #[serde(default)]
    pub min_obs_time: Option<String>,
    #[serde(default)]
    pub max_obs_time: Option<String>,
}

/// Metadata for one dataset version, written by the ingestion side.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetManifest {
    pub version_id: String,
    pub dataset_id: String,
    pub created_at: String,
    pub collection_date: Option<String>,
    pub data_points_count: u64,
    pub series_count: u64,
    pub series_codes: Vec<String>,
    pub date_range: DateRange,
    #[serde(alias = "parquet_files")]
    pub data_files: Vec<String>,
    pub partitions: Vec<String>,
    pub partition_strategy: Option<String>,
}

impl DatasetManifest {
    /// Data files whose name contains `series_code`, in manifest order.
    pub fn files_for_series<'a>(&'a self, series_code: &'a str) -> impl Iterator<Item = &'a str> {
        self.data_files
            .iter()
            .map(String::as_str)
            .filter(move |file| file.contains(series_code))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputFiles {
    pub data_prefix: String,
    pub files: Vec<String>,
}

/// Written next to each metric version and to `current/manifest.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricOutputManifest {
    pub run_id: String,
    pub metric_code: String,
    pub version_ts: String,
    pub created_at: String,
    pub row_count: usize,
    pub outputs: OutputFiles,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ManifestValidationError {
    #[error("run_id mismatch: expected {expected}, found {found}")]
    RunIdMismatch { expected: String, found: String },
    #[error("metric_code mismatch: expected {expected}, found {found}")]
    MetricCodeMismatch { expected: String, found: String },
    #[error("version_ts must be non-empty")]
    MissingVersionTs,
    #[error("outputs.data_prefix must be non-empty")]
    MissingDataPrefix,
    #[error("outputs.files must list at least one file")]
    MissingFiles,
}

#[must_use]
pub fn build_output_manifest(
    run_id: &str,
    metric_code: &str,
    version_ts: &str,
    created_at: String,
    row_count: usize,
    data_prefix: String,
    files: Vec<String>,
) -> MetricOutputManifest {
    MetricOutputManifest {
        run_id: run_id.to_owned(),
        metric_code: metric_code.to_owned(),
        version_ts: version_ts.to_owned(),
        created_at,
        row_count,
        outputs: OutputFiles { data_prefix, files },
    }
}

pub fn validate_output_manifest(
    manifest: &MetricOutputManifest,
    run_id: &str,
    metric_code: &str,
) -> Result<(), ManifestValidationError> {
    if manifest.run_id != run_id {
        return Err(ManifestValidationError::RunIdMismatch {
            expected: run_id.to_owned(),
            found: manifest.run_id.clone(),
        });
    }
    if manifest.metric_code != metric_code {
        return Err(ManifestValidationError::MetricCodeMismatch {
            expected: metric_code.to_owned(),
            found: manifest.metric_code.clone(),
        });
    }
    if manifest.version_ts.is_empty() {
        return Err(ManifestValidationError::MissingVersionTs);
    }
    if manifest.outputs.data_prefix.is_empty() {
        return Err(ManifestValidationError::MissingDataPrefix);
    }
    if manifest.outputs.files.is_empty() {
        return Err(ManifestValidationError::MissingFiles);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{
        DatasetManifest, ManifestValidationError, build_output_manifest, validate_output_manifest,
    };

    #[test]
    fn dataset_manifest_accepts_legacy_file_key() {
        let manifest: DatasetManifest = serde_json::from_value(json!({
            "version_id": "v1",
            "dataset_id": "ds1",
            "series_codes": ["GDP", "CPI"],
            "parquet_files": ["part-GDP-0.csv", "part-CPI-0.csv", "part-GDP-1.csv"],
            "date_range": {"min_obs_time": "2024-01-01"}
        }))
        .expect("manifest");

        assert_eq!(
            manifest.files_for_series("GDP").collect::<Vec<_>>(),
            vec!["part-GDP-0.csv", "part-GDP-1.csv"]
        );
        assert_eq!(manifest.files_for_series("UNEMP").count(), 0);
        assert_eq!(manifest.date_range.max_obs_time, None);
    }

    #[test]
    fn output_manifest_validation() {
        let good = build_output_manifest(
            "run-1",
            "gdp_growth",
            "2024-03-05T14-30-00",
            "2024-03-05T14:30:00Z".to_owned(),
            3,
            "metrics/gdp/2024-03-05T14-30-00/data".to_owned(),
            vec!["metrics.jsonl".to_owned()],
        );
        validate_output_manifest(&good, "run-1", "gdp_growth").expect("valid");

        assert!(matches!(
            validate_output_manifest(&good, "run-2", "gdp_growth"),
            Err(ManifestValidationError::RunIdMismatch { .. })
        ));
        assert!(matches!(
            validate_output_manifest(&good, "run-1", "cpi"),
            Err(ManifestValidationError::MetricCodeMismatch { .. })
        ));

        let mut no_files = good.clone();
        no_files.outputs.files.clear();
        assert_eq!(
            validate_output_manifest(&no_files, "run-1", "gdp_growth"),
            Err(ManifestValidationError::MissingFiles)
        );

        let mut no_prefix = good;
        no_prefix.outputs.data_prefix.clear();
        assert_eq!(
            validate_output_manifest(&no_prefix, "run-1", "gdp_growth"),
            Err(ManifestValidationError::MissingDataPrefix)
        );
    }
}
