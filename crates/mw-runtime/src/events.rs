use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::ErrorCode;

#[derive(Debug, Error)]
pub enum EventError {
    #[error("heartbeat progress must be within [0, 1], got {0}")]
    InvalidProgress(f64),
    #[error("cannot write event to {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error("event bus lock poisoned")]
    LockPoisoned,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RunStatus {
    Success,
    Failure,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartedEvent {
    pub run_id: String,
    pub metric_code: String,
    pub started_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatEvent {
    pub run_id: String,
    pub metric_code: String,
    pub progress: f64,
    pub ts: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletedEvent {
    pub run_id: String,
    pub metric_code: String,
    pub status: RunStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version_ts: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_manifest: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub row_count: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CompletedEvent {
    #[must_use]
    pub fn success(
        run_id: &str,
        metric_code: &str,
        version_ts: String,
        output_manifest: String,
        row_count: usize,
    ) -> Self {
        Self {
            run_id: run_id.to_owned(),
            metric_code: metric_code.to_owned(),
            status: RunStatus::Success,
            version_ts: Some(version_ts),
            output_manifest: Some(output_manifest),
            row_count: Some(row_count),
            error: None,
        }
    }

    /// Failure carrying `"<CODE>: <message>"`.
    #[must_use]
    pub fn failure(run_id: &str, metric_code: &str, code: ErrorCode, message: &str) -> Self {
        Self {
            run_id: run_id.to_owned(),
            metric_code: metric_code.to_owned(),
            status: RunStatus::Failure,
            version_ts: None,
            output_manifest: None,
            row_count: None,
            error: Some(format!("{code}: {message}")),
        }
    }
}

/// Everything the worker publishes, tagged by `type` on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum RunEvent {
    #[serde(rename = "metric_run_started")]
    Started(StartedEvent),
    #[serde(rename = "metric_run_heartbeat")]
    Heartbeat(HeartbeatEvent),
    #[serde(rename = "metric_run_completed")]
    Completed(CompletedEvent),
}

impl RunEvent {
    #[must_use]
    pub fn run_id(&self) -> &str {
        match self {
            Self::Started(event) => &event.run_id,
            Self::Heartbeat(event) => &event.run_id,
            Self::Completed(event) => &event.run_id,
        }
    }

    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Started(_) => "metric_run_started",
            Self::Heartbeat(_) => "metric_run_heartbeat",
            Self::Completed(_) => "metric_run_completed",
        }
    }
}

pub trait EventBus: Send + Sync {
    fn publish(&self, event: RunEvent) -> Result<(), EventError>;

    fn publish_started(
        &self,
        run_id: &str,
        metric_code: &str,
        started_at: String,
    ) -> Result<(), EventError> {
        self.publish(RunEvent::Started(StartedEvent {
            run_id: run_id.to_owned(),
            metric_code: metric_code.to_owned(),
            started_at,
        }))
    }

    fn publish_heartbeat(
        &self,
        run_id: &str,
        metric_code: &str,
        progress: f64,
        ts: String,
    ) -> Result<(), EventError> {
        if !(0.0..=1.0).contains(&progress) {
            return Err(EventError::InvalidProgress(progress));
        }
        self.publish(RunEvent::Heartbeat(HeartbeatEvent {
            run_id: run_id.to_owned(),
            metric_code: metric_code.to_owned(),
            progress,
            ts,
        }))
    }

    fn publish_completed(&self, event: CompletedEvent) -> Result<(), EventError> {
        self.publish(RunEvent::Completed(event))
    }
}

/// Keeps every published event in memory; clones share the same log.
#[derive(Debug, Clone, Default)]
pub struct InMemoryEventBus {
    events: Arc<Mutex<Vec<RunEvent>>>,
}

impl InMemoryEventBus {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Result<Vec<RunEvent>, EventError> {
        let events = self.events.lock().map_err(|_| EventError::LockPoisoned)?;
        Ok(events.clone())
    }
}

impl EventBus for InMemoryEventBus {
    fn publish(&self, event: RunEvent) -> Result<(), EventError> {
        self.events
            .lock()
            .map_err(|_| EventError::LockPoisoned)?
            .push(event);
        Ok(())
    }
}

/// Appends one JSON object per event to a file.
#[derive(Debug)]
pub struct JsonlEventBus {
    path: PathBuf,
    file: Mutex<File>,
}

impl JsonlEventBus {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, EventError> {
        let path = path.as_ref().to_path_buf();
        let io_err = |source| EventError::Io {
            path: path.clone(),
            source,
        };
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(io_err)?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl EventBus for JsonlEventBus {
    fn publish(&self, event: RunEvent) -> Result<(), EventError> {
        let mut line = serde_json::to_string(&event)?;
        line.push('\n');
        let mut file = self.file.lock().map_err(|_| EventError::LockPoisoned)?;
        file.write_all(line.as_bytes())
            .and_then(|()| file.flush())
            .map_err(|source| EventError::Io {
                path: self.path.clone(),
                source,
            })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{CompletedEvent, EventBus, EventError, InMemoryEventBus, JsonlEventBus, RunEvent};
    use crate::error::ErrorCode;

    #[test]
    fn wire_format_is_tagged_camel_case() {
        let event = RunEvent::Completed(CompletedEvent::success(
            "run-1",
            "gdp",
            "2024-03-05T14-30-00".to_owned(),
            "metrics/gdp/2024-03-05T14-30-00/manifest.json".to_owned(),
            3,
        ));
        assert_eq!(
            serde_json::to_value(&event).expect("serialize"),
            json!({
                "type": "metric_run_completed",
                "runId": "run-1",
                "metricCode": "gdp",
                "status": "SUCCESS",
                "versionTs": "2024-03-05T14-30-00",
                "outputManifest": "metrics/gdp/2024-03-05T14-30-00/manifest.json",
                "rowCount": 3
            })
        );

        let failure =
            CompletedEvent::failure("run-2", "gdp", ErrorCode::InputRead, "series not found: X");
        let value = serde_json::to_value(RunEvent::Completed(failure)).expect("serialize");
        assert_eq!(value["status"], "FAILURE");
        assert_eq!(value["error"], "INPUT_READ_ERROR: series not found: X");
        assert!(value.get("rowCount").is_none());
    }

    #[test]
    fn heartbeat_progress_is_bounded() {
        let bus = InMemoryEventBus::new();
        bus.publish_heartbeat("r", "m", 0.5, "2024-01-01T00:00:00Z".to_owned())
            .expect("valid progress");
        assert!(matches!(
            bus.publish_heartbeat("r", "m", 1.5, String::new()),
            Err(EventError::InvalidProgress(_))
        ));
        assert!(bus.publish_heartbeat("r", "m", f64::NAN, String::new()).is_err());
        assert_eq!(bus.events().expect("events").len(), 1);
    }

    #[test]
    fn jsonl_bus_appends_lines() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("out").join("events.jsonl");
        let bus = JsonlEventBus::open(&path).expect("open");
        bus.publish_started("run-1", "gdp", "2024-01-01T00:00:00Z".to_owned())
            .expect("started");
        bus.publish_completed(CompletedEvent::failure("run-1", "gdp", ErrorCode::Internal, "boom"))
            .expect("completed");

        let text = std::fs::read_to_string(bus.path()).expect("read");
        let events = text
            .lines()
            .map(|line| serde_json::from_str::<RunEvent>(line).expect("event"))
            .collect::<Vec<_>>();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].type_name(), "metric_run_started");
        assert_eq!(events[1].run_id(), "run-1");
    }
}
