use std::fmt;

use mw_expr::{ExprError, ExprErrorKind};
use thiserror::Error;

use crate::config::ConfigError;
use crate::events::EventError;
use crate::manifest::ManifestValidationError;
use crate::queue::QueueError;
use crate::store::StoreError;

/// Failure category reported in `metric_run_completed` events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    InputRead,
    ExpressionEval,
    ManifestValidation,
    OutputWrite,
    Internal,
}

impl ErrorCode {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InputRead => "INPUT_READ_ERROR",
            Self::ExpressionEval => "EXPRESSION_EVAL_ERROR",
            Self::ManifestValidation => "MANIFEST_VALIDATION_ERROR",
            Self::OutputWrite => "OUTPUT_WRITE_ERROR",
            Self::Internal => "INTERNAL_ERROR",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Expression(#[from] ExprError),
    #[error("dataset {0} is not listed in the request catalog")]
    UnknownDataset(String),
    #[error("no data files found for series {series_code} in dataset {dataset_id}")]
    NoSeriesFiles {
        series_code: String,
        dataset_id: String,
    },
    #[error(transparent)]
    Read(StoreError),
    #[error(transparent)]
    Write(StoreError),
    #[error(transparent)]
    Manifest(#[from] ManifestValidationError),
    #[error(transparent)]
    Event(#[from] EventError),
    #[error(transparent)]
    Queue(#[from] QueueError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl RuntimeError {
    /// Category by variant. A missing series during evaluation counts as an
    /// input failure, like a missing series during the read phase.
    #[must_use]
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::UnknownDataset(_) | Self::NoSeriesFiles { .. } | Self::Read(_) => {
                ErrorCode::InputRead
            }
            Self::Expression(err) => match err.kind() {
                ExprErrorKind::SeriesNotFound => ErrorCode::InputRead,
                ExprErrorKind::InvalidExpression | ExprErrorKind::Numeric => {
                    ErrorCode::ExpressionEval
                }
            },
            Self::Manifest(_) => ErrorCode::ManifestValidation,
            Self::Write(_) => ErrorCode::OutputWrite,
            Self::Event(_) | Self::Queue(_) | Self::Config(_) => ErrorCode::Internal,
        }
    }

    /// `"<CODE>: <message>"` as carried by failure events.
    #[must_use]
    pub fn event_message(&self) -> String {
        format!("{}: {self}", self.code())
    }
}
