//! Partition key functions
//!
//! A partition key function maps an event to the name of the partition it
//! belongs to. Equal keys always route to the same live writer.

use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;
use time::OffsetDateTime;
use time::macros::format_description;

use crate::config::{PartitionConfig, PartitionStrategy};

#[derive(Debug, Error)]
pub enum PartitionKeyError {
    #[error("event is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("event is not a JSON object")]
    NotAnObject,

    #[error("field '{0}' is missing")]
    MissingField(String),

    #[error("field '{0}' is not a scalar value")]
    NotScalar(String),

    #[error("field '{0}' is empty")]
    EmptyKey(String),

    #[error("failed to format date prefix: {0}")]
    DateFormat(#[from] time::error::Format),

    #[error("{0}")]
    Custom(String),
}

/// Event bytes -> partition key
pub type PartitionKeyFn =
    Arc<dyn Fn(&[u8]) -> Result<String, PartitionKeyError> + Send + Sync>;

/// Route every event to a single partition
pub fn static_key(key: impl Into<String>) -> PartitionKeyFn {
    let key = key.into();
    Arc::new(move |_event: &[u8]| Ok(key.clone()))
}

/// Route by the value of a top-level field of a JSON object event
///
/// Strings are used as-is, numbers and booleans by their JSON rendering.
/// With `date_prefix` the key becomes `YYYY/MM/DD/<value>` using the current
/// UTC date.
pub fn json_field(field: impl Into<String>, date_prefix: bool) -> PartitionKeyFn {
    let field = field.into();
    Arc::new(move |event: &[u8]| {
        let value = extract_field(event, &field)?;
        if date_prefix {
            Ok(format!("{}/{}", today_prefix()?, value))
        } else {
            Ok(value)
        }
    })
}

/// Build the key function described by the `[partition]` config section
pub fn from_config(config: &PartitionConfig) -> PartitionKeyFn {
    match config.strategy {
        PartitionStrategy::Static => static_key(config.key.clone().unwrap_or_default()),
        PartitionStrategy::JsonField => {
            json_field(config.field.clone().unwrap_or_default(), config.date_prefix)
        }
    }
}

fn extract_field(event: &[u8], field: &str) -> Result<String, PartitionKeyError> {
    let parsed: Value = serde_json::from_slice(event)?;
    let object = parsed.as_object().ok_or(PartitionKeyError::NotAnObject)?;

    let key = match object.get(field) {
        None | Some(Value::Null) => return Err(PartitionKeyError::MissingField(field.to_string())),
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        Some(_) => return Err(PartitionKeyError::NotScalar(field.to_string())),
    };

    if key.trim().is_empty() {
        return Err(PartitionKeyError::EmptyKey(field.to_string()));
    }

    Ok(key)
}

fn today_prefix() -> Result<String, PartitionKeyError> {
    let format = format_description!("[year]/[month]/[day]");
    Ok(OffsetDateTime::now_utc().format(&format)?)
}
