#![forbid(unsafe_code)]

pub mod clock;
pub mod config;
pub mod error;
pub mod events;
pub mod manifest;
pub mod object_path;
pub mod queue;
pub mod request;
pub mod run;
pub mod store;
pub mod worker;

pub use clock::{Clock, FixedClock, SystemClock, format_version_ts, iso_utc};
pub use config::{ConfigError, LogFormat, WorkerConfig};
pub use error::{ErrorCode, RuntimeError};
pub use events::{
    CompletedEvent, EventBus, EventError, HeartbeatEvent, InMemoryEventBus, JsonlEventBus,
    RunEvent, RunStatus, StartedEvent,
};
pub use manifest::{
    DatasetManifest, DateRange, ManifestValidationError, MetricOutputManifest, OutputFiles,
    build_output_manifest, validate_output_manifest,
};
pub use queue::{Delivery, DirectoryQueue, InMemoryQueue, QueueError, RunQueue};
pub use request::{
    Catalog, CatalogEntry, OutputTarget, RUN_REQUESTED, RequestError, RunRequest,
    parse_request_message,
};
pub use run::{
    HEARTBEAT_PROGRESS, OutputPaths, RunContext, RunOutcome, handle_run_request, read_all_series,
};
pub use store::{InMemoryStore, LocalFsStore, ObjectStore, SeriesStore, StoreError};
pub use worker::Worker;
