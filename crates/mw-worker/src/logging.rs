use mw_runtime::{LogFormat, WorkerConfig};
use thiserror::Error;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::{EnvFilter, Registry, fmt};

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("invalid log filter {filter:?}: {reason}")]
    Filter { filter: String, reason: String },
    #[error(transparent)]
    Init(#[from] TryInitError),
}

/// Install the global subscriber: `log_filter` directives plus a text or
/// JSON formatter on stderr.
pub fn init_logging(config: &WorkerConfig) -> Result<(), LoggingError> {
    let env_filter =
        EnvFilter::try_new(&config.log_filter).map_err(|err| LoggingError::Filter {
            filter: config.log_filter.clone(),
            reason: err.to_string(),
        })?;

    match config.log_format {
        LogFormat::Json => Registry::default()
            .with(env_filter)
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_writer(std::io::stderr),
            )
            .try_init()?,
        LogFormat::Text => Registry::default()
            .with(env_filter)
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_writer(std::io::stderr),
            )
            .try_init()?,
    }
    Ok(())
}
