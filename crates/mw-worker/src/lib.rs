#![forbid(unsafe_code)]

mod logging;

use std::path::PathBuf;

use mw_runtime::{ConfigError, LogFormat, WorkerConfig};
use thiserror::Error;

pub use logging::{LoggingError, init_logging};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CliError {
    #[error("{0} requires a value")]
    MissingValue(&'static str),
    #[error("unknown argument: {0}")]
    UnknownArgument(String),
}

/// Command-line overrides. Anything left unset falls back to the config
/// file, then the environment, then defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CliOptions {
    pub config_path: Option<PathBuf>,
    pub storage_root: Option<PathBuf>,
    pub queue_dir: Option<PathBuf>,
    pub events_path: Option<PathBuf>,
    pub stop_file: Option<PathBuf>,
    pub drain: bool,
    pub log_json: bool,
    pub help: bool,
}

pub fn parse_args<I>(args: I) -> Result<CliOptions, CliError>
where
    I: IntoIterator<Item = String>,
{
    let mut options = CliOptions::default();
    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        let mut value = |flag: &'static str| {
            args.next()
                .map(PathBuf::from)
                .ok_or(CliError::MissingValue(flag))
        };
        match arg.as_str() {
            "--config" => options.config_path = Some(value("--config")?),
            "--root" => options.storage_root = Some(value("--root")?),
            "--queue" => options.queue_dir = Some(value("--queue")?),
            "--events" => options.events_path = Some(value("--events")?),
            "--stop-file" => options.stop_file = Some(value("--stop-file")?),
            "--drain" => options.drain = true,
            "--log-json" => options.log_json = true,
            "--help" | "-h" => options.help = true,
            other => return Err(CliError::UnknownArgument(other.to_owned())),
        }
    }
    Ok(options)
}

/// Config file (or defaults), then environment overrides, then flags.
pub fn resolve_config(
    options: &CliOptions,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<WorkerConfig, ConfigError> {
    let base = match &options.config_path {
        Some(path) => WorkerConfig::from_json_file(path)?,
        None => WorkerConfig::default(),
    };
    let mut config = base.overlay(lookup)?;

    if let Some(root) = &options.storage_root {
        config = config.with_storage_root(root);
    }
    if let Some(queue) = &options.queue_dir {
        config = config.with_queue_dir(queue);
    }
    if let Some(events) = &options.events_path {
        config = config.with_events_path(events);
    }
    if options.log_json {
        config = config.with_log_format(LogFormat::Json);
    }
    config.validate()?;
    Ok(config)
}

pub fn help_text() -> &'static str {
    "metrics-worker\n\
     Usage:\n\
     \tmetrics-worker [--config worker.json] [--root DIR] [--queue DIR] [--events FILE] [--drain]\n\
     Options:\n\
     \t--config <file>     JSON config file (environment variables still override it)\n\
     \t--root <dir>        Storage root holding catalogs, projections and metric outputs\n\
     \t--queue <dir>       Directory of pending *.json run requests\n\
     \t--events <file>     JSONL file receiving lifecycle events\n\
     \t--stop-file <file>  Stop polling once this file exists\n\
     \t--drain             Process queued requests and exit when the queue is empty\n\
     \t--log-json          Emit logs as JSON lines\n\
     \t-h, --help          Show this help"
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use mw_runtime::{ConfigError, LogFormat};

    use super::{CliError, CliOptions, parse_args, resolve_config};

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|arg| (*arg).to_owned()).collect()
    }

    #[test]
    fn parses_flags_and_values() {
        let options =
            parse_args(args(&["--root", "/data", "--drain", "--log-json"])).expect("parse");
        assert_eq!(options.storage_root, Some(PathBuf::from("/data")));
        assert!(options.drain);
        assert!(options.log_json);
        assert!(!options.help);
    }

    #[test]
    fn rejects_bad_arguments() {
        assert_eq!(
            parse_args(args(&["--queue"])),
            Err(CliError::MissingValue("--queue"))
        );
        assert_eq!(
            parse_args(args(&["--verbose"])),
            Err(CliError::UnknownArgument("--verbose".to_owned()))
        );
    }

    #[test]
    fn flags_override_environment() {
        let options = CliOptions {
            queue_dir: Some(PathBuf::from("/cli/queue")),
            log_json: true,
            ..CliOptions::default()
        };
        let config = resolve_config(&options, |key| match key {
            "METRICS_QUEUE_DIR" => Some("/env/queue".to_owned()),
            "METRICS_STORAGE_ROOT" => Some("/env/root".to_owned()),
            _ => None,
        })
        .expect("config");

        assert_eq!(config.queue_dir, PathBuf::from("/cli/queue"));
        assert_eq!(config.storage_root, PathBuf::from("/env/root"));
        assert_eq!(config.log_format, LogFormat::Json);
    }

    #[test]
    fn config_file_then_environment() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("worker.json");
        std::fs::write(&path, r#"{"poll_interval_ms": 50, "events_path": "/file/events.jsonl"}"#)
            .expect("write");

        let options = CliOptions {
            config_path: Some(path),
            ..CliOptions::default()
        };
        let config = resolve_config(&options, |key| {
            (key == "METRICS_EVENTS_PATH").then(|| "/env/events.jsonl".to_owned())
        })
        .expect("config");
        assert_eq!(config.poll_interval_ms, 50);
        assert_eq!(config.events_path, PathBuf::from("/env/events.jsonl"));

        let invalid = resolve_config(&options, |key| {
            (key == "METRICS_POLL_INTERVAL_MS").then(|| "0".to_owned())
        });
        assert!(matches!(invalid, Err(ConfigError::Invalid(_))));
    }
}
