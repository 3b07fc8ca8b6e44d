use std::collections::{BTreeMap, BTreeSet};

use mw_expr::{EvalContext, evaluate, parse_expression};
use mw_plan::{ReadPlan, plan_for_expr};
use mw_series::TimeSeries;
use rayon::prelude::*;
use tracing::{error, info, warn};

use crate::clock::{Clock, iso_utc};
use crate::error::{ErrorCode, RuntimeError};
use crate::events::{CompletedEvent, EventBus, EventError};
use crate::manifest::{
    DatasetManifest, MetricOutputManifest, build_output_manifest, validate_output_manifest,
};
use crate::object_path;
use crate::request::{Catalog, CatalogEntry, RunRequest};
use crate::store::SeriesStore;

/// Progress reported once every input series has been read.
pub const HEARTBEAT_PROGRESS: f64 = 0.5;
pub const DATA_FILE_NAME: &str = "metrics.jsonl";
pub const MANIFEST_FILE_NAME: &str = "manifest.json";

/// Object keys for one metric version, all under `normalize(basePath)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputPaths {
    pub data_path: String,
    pub manifest_path: String,
    pub current_manifest_path: String,
    pub marker_path: String,
    pub manifest_relative_path: String,
}

impl OutputPaths {
    #[must_use]
    pub fn new(base_path: &str, version_ts: &str, run_id: &str) -> Self {
        let prefix = object_path::normalize(base_path);
        let manifest_path = object_path::join(&[&prefix, version_ts, MANIFEST_FILE_NAME]);
        Self {
            data_path: object_path::join(&[&prefix, version_ts, "data", DATA_FILE_NAME]),
            current_manifest_path: object_path::join(&[&prefix, "current", MANIFEST_FILE_NAME]),
            marker_path: Self::marker_for(base_path, run_id),
            manifest_relative_path: manifest_path.clone(),
            manifest_path,
        }
    }

    /// Marker written after a successful run and checked before starting one.
    #[must_use]
    pub fn marker_for(base_path: &str, run_id: &str) -> String {
        let prefix = object_path::normalize(base_path);
        object_path::join(&[&prefix, "runs", &format!("{run_id}.ok")])
    }

    #[must_use]
    pub fn data_prefix(&self) -> &str {
        object_path::parent(&self.manifest_path)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    Succeeded {
        version_ts: String,
        output_manifest: String,
        row_count: usize,
    },
    Failed {
        code: ErrorCode,
        message: String,
    },
}

impl RunOutcome {
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded { .. })
    }
}

/// The collaborators a run talks to.
#[derive(Clone, Copy)]
pub struct RunContext<'a> {
    pub store: &'a dyn SeriesStore,
    pub events: &'a dyn EventBus,
    pub clock: &'a dyn Clock,
}

/// Execute one run request end to end.
///
/// Every pipeline failure is reported through a `metric_run_completed`
/// failure event and returned as [`RunOutcome::Failed`]. The only error
/// surfaced to the caller is a failure to publish that event.
pub fn handle_run_request(
    request: &RunRequest,
    ctx: &RunContext<'_>,
) -> Result<RunOutcome, EventError> {
    let run_id = request.run_id.as_str();
    let metric_code = request.metric_code.as_str();
    info!(run_id, metric_code, "processing_run");

    match execute(request, ctx) {
        Ok(outcome) => Ok(outcome),
        Err(err) => {
            let code = err.code();
            let message = err.to_string();
            error!(
                run_id,
                metric_code,
                error_code = code.as_str(),
                error_message = %message,
                "run_failed"
            );
            ctx.events
                .publish_completed(CompletedEvent::failure(run_id, metric_code, code, &message))?;
            Ok(RunOutcome::Failed { code, message })
        }
    }
}

fn execute(request: &RunRequest, ctx: &RunContext<'_>) -> Result<RunOutcome, RuntimeError> {
    let run_id = request.run_id.as_str();
    let metric_code = request.metric_code.as_str();

    ctx.events
        .publish_started(run_id, metric_code, iso_utc(ctx.clock.now()))?;

    let expr = parse_expression(&request.expression_json, &request.expression_type)?;
    let plan = plan_for_expr(&expr, &request.inputs);
    info!(
        run_id,
        datasets = plan.series_by_dataset().len(),
        series = plan.total_series(),
        "read_plan_built"
    );
    let undeclared = plan.undeclared_series();
    if !undeclared.is_empty() {
        warn!(run_id, series = ?undeclared, "undeclared_series");
    }

    let series = read_all_series(&plan, &request.catalog, ctx.store)?;

    ctx.events.publish_heartbeat(
        run_id,
        metric_code,
        HEARTBEAT_PROGRESS,
        iso_utc(ctx.clock.now()),
    )?;

    let result = evaluate(&expr, &series)?;
    let row_count = result.len();
    info!(run_id, row_count, "expression_evaluated");

    let version_ts = ctx.clock.version_ts();
    let paths = OutputPaths::new(&request.output.base_path, &version_ts, run_id);
    let manifest = write_output(request, &result, &version_ts, &paths, ctx)?;
    validate_output_manifest(&manifest, run_id, metric_code)?;
    ctx.store
        .create_run_marker(&paths.marker_path)
        .map_err(RuntimeError::Write)?;

    ctx.events.publish_completed(CompletedEvent::success(
        run_id,
        metric_code,
        version_ts.clone(),
        paths.manifest_relative_path.clone(),
        row_count,
    ))?;
    info!(run_id, status = "SUCCESS", row_count, "run_completed");

    Ok(RunOutcome::Succeeded {
        version_ts,
        output_manifest: paths.manifest_relative_path,
        row_count,
    })
}

fn write_output(
    request: &RunRequest,
    result: &TimeSeries,
    version_ts: &str,
    paths: &OutputPaths,
    ctx: &RunContext<'_>,
) -> Result<MetricOutputManifest, RuntimeError> {
    let files = ctx
        .store
        .write_jsonl(result, &paths.data_path)
        .map_err(RuntimeError::Write)?;

    let manifest = build_output_manifest(
        &request.run_id,
        &request.metric_code,
        version_ts,
        iso_utc(ctx.clock.now()),
        result.len(),
        paths.data_prefix().to_owned(),
        files,
    );

    for path in [&paths.manifest_path, &paths.current_manifest_path] {
        ctx.store
            .write_manifest(&manifest, path)
            .map_err(RuntimeError::Write)?;
    }
    Ok(manifest)
}

/// Fetch every planned series. Manifests are loaded once per dataset and
/// series are read in parallel; the first failure aborts the phase.
pub fn read_all_series(
    plan: &ReadPlan,
    catalog: &Catalog,
    store: &dyn SeriesStore,
) -> Result<EvalContext, RuntimeError> {
    let entries = plan
        .dataset_ids()
        .map(|dataset_id| {
            catalog
                .dataset(dataset_id)
                .map(|entry| (dataset_id, entry))
                .ok_or_else(|| RuntimeError::UnknownDataset(dataset_id.to_owned()))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let manifests = entries
        .par_iter()
        .map(|(dataset_id, entry)| {
            store
                .get_dataset_manifest(&entry.manifest_path)
                .map(|manifest| (*dataset_id, manifest))
                .map_err(RuntimeError::Read)
        })
        .collect::<Result<BTreeMap<&str, DatasetManifest>, _>>()?;

    let mut seen = BTreeSet::new();
    let tasks = entries
        .iter()
        .flat_map(|(dataset_id, entry)| {
            plan.get_series_codes(dataset_id)
                .iter()
                .map(move |code| (*dataset_id, *entry, code.as_str()))
        })
        .filter(|(dataset_id, _, code)| seen.insert((*dataset_id, *code)))
        .collect::<Vec<_>>();

    let series = tasks
        .par_iter()
        .map(|(dataset_id, entry, code)| {
            let manifest = manifests
                .get(dataset_id)
                .ok_or_else(|| RuntimeError::UnknownDataset((*dataset_id).to_owned()))?;
            read_single_series(dataset_id, code, entry, manifest, store)
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(series.into_iter().collect())
}

fn read_single_series(
    dataset_id: &str,
    series_code: &str,
    entry: &CatalogEntry,
    manifest: &DatasetManifest,
    store: &dyn SeriesStore,
) -> Result<TimeSeries, RuntimeError> {
    let paths = manifest
        .files_for_series(series_code)
        .map(|file| object_path::join(&[&entry.projections_path, file]))
        .collect::<Vec<_>>();
    if paths.is_empty() {
        return Err(RuntimeError::NoSeriesFiles {
            series_code: series_code.to_owned(),
            dataset_id: dataset_id.to_owned(),
        });
    }

    let series = store.read_series(&paths, series_code).map_err(|err| {
        warn!(
            series_code,
            dataset_id,
            projections_path = %entry.projections_path,
            error = %err,
            "failed_to_read_series"
        );
        RuntimeError::Read(err)
    })?;
    info!(
        series_code,
        dataset_id,
        row_count = series.len(),
        files = paths.len(),
        "series_read_success"
    );
    Ok(series)
}
