use std::collections::BTreeMap;

use mw_plan::DeclaredInput;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub const RUN_REQUESTED: &str = "metric_run_requested";

#[derive(Debug, Error)]
pub enum RequestError {
    #[error("malformed run request: {0}")]
    Json(#[from] serde_json::Error),
    #[error("notification envelope has no Message string")]
    MissingMessage,
    #[error("unexpected event type: {0}")]
    UnexpectedType(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogEntry {
    #[serde(alias = "manifest_path")]
    pub manifest_path: String,
    #[serde(default, alias = "projections_path")]
    pub projections_path: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Catalog {
    #[serde(default)]
    pub datasets: BTreeMap<String, CatalogEntry>,
}

impl Catalog {
    #[must_use]
    pub fn dataset(&self, dataset_id: &str) -> Option<&CatalogEntry> {
        self.datasets.get(dataset_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputTarget {
    #[serde(alias = "base_path")]
    pub base_path: String,
}

/// A `metric_run_requested` message.
///
/// `expression_type` stays a string here; an unknown tag is reported when
/// the run is handled, so the requester still receives a completion event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRequest {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(alias = "run_id")]
    pub run_id: String,
    #[serde(alias = "metric_code")]
    pub metric_code: String,
    #[serde(alias = "expression_type")]
    pub expression_type: String,
    #[serde(alias = "expression_json")]
    pub expression_json: Value,
    #[serde(default)]
    pub inputs: Vec<DeclaredInput>,
    #[serde(default)]
    pub catalog: Catalog,
    pub output: OutputTarget,
}

/// Parse a queue message body. Both bare requests and SNS notification
/// envelopes are accepted; in an envelope, the `type` and `metricCode`
/// message attributes override the inner message.
pub fn parse_request_message(body: &str) -> Result<RunRequest, RequestError> {
    let envelope: Value = serde_json::from_str(body)?;

    let request_value = if envelope.get("Type").and_then(Value::as_str) == Some("Notification") {
        let message = envelope
            .get("Message")
            .and_then(Value::as_str)
            .ok_or(RequestError::MissingMessage)?;
        let mut inner: Value = serde_json::from_str(message)?;
        apply_message_attributes(&mut inner, envelope.get("MessageAttributes"));
        inner
    } else {
        envelope
    };

    let request: RunRequest = serde_json::from_value(request_value)?;
    if request.event_type != RUN_REQUESTED {
        return Err(RequestError::UnexpectedType(request.event_type));
    }
    Ok(request)
}

fn apply_message_attributes(inner: &mut Value, attributes: Option<&Value>) {
    let (Some(attributes), Some(fields)) = (attributes, inner.as_object_mut()) else {
        return;
    };
    for (attribute, field) in [("type", "type"), ("metricCode", "metricCode")] {
        let value = attributes
            .get(attribute)
            .and_then(|attr| attr.get("Value"))
            .and_then(Value::as_str)
            .filter(|value| !value.is_empty());
        if let Some(value) = value {
            if field == "metricCode" {
                fields.remove("metric_code");
            }
            fields.insert(field.to_owned(), Value::String(value.to_owned()));
        }
    }
}
