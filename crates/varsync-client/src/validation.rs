//! Shape validation for payloads returned by the Varsync backend.
//!
//! Every response is checked against a fixed contract before it may reach the
//! [`ConfigStore`](crate::store::ConfigStore). The checks are pure: they walk
//! the decoded JSON, reject anything that is not a string or boolean value,
//! and convert the accepted payload into typed structures.

use std::fmt;
use std::time::Duration;

use serde_json::{Map, Value};
use thiserror::Error;

use crate::snapshot::{ConfigSnapshot, ConfigValue};

const FIELD_CONFIG: &str = "config";
const FIELD_POLL_INTERVAL: &str = "pollIntervalInMs";
const FIELD_IS_VALID: &str = "isValid";
const FIELD_PLAN: &str = "plan";
const FIELD_ERROR: &str = "error";

/// Reasons a payload fails the response contract.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// Payload was not valid JSON at all.
    #[error("malformed json: {0}")]
    Json(#[from] serde_json::Error),
    /// A mapping was expected but another JSON type was found.
    #[error("expected an object for {context}, found {found}")]
    NotAnObject {
        context: &'static str,
        found: &'static str,
    },
    /// A configuration value had a type other than string or boolean.
    #[error("config key {key:?} has unsupported type {found}")]
    UnsupportedValue { key: String, found: &'static str },
    /// A required field was absent.
    #[error("missing field {0}")]
    MissingField(&'static str),
    /// A field was present but carried the wrong type or an out-of-range value.
    #[error("field {field} must be {expected}")]
    InvalidField {
        field: &'static str,
        expected: &'static str,
    },
}

/// Subscription plan returned by the handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Plan {
    /// Polling only.
    Free,
    /// Entitled to server-push updates.
    Pro,
}

impl Plan {
    /// Returns `true` when the plan may use the push channel.
    pub fn streams_updates(self) -> bool {
        matches!(self, Plan::Pro)
    }

    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "free" => Some(Plan::Free),
            "pro" => Some(Plan::Pro),
            _ => None,
        }
    }
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Plan::Free => f.write_str("free"),
            Plan::Pro => f.write_str("pro"),
        }
    }
}

/// Decoded response of the token-only bootstrap endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct BootstrapResponse {
    /// Full configuration snapshot.
    pub config: ConfigSnapshot,
    /// Server-controlled delay before the next poll.
    pub poll_interval: Duration,
}

/// Decoded handshake response.
#[derive(Debug, Clone, PartialEq)]
pub enum InitResponse {
    /// Credentials accepted.
    Valid {
        plan: Plan,
        config: ConfigSnapshot,
    },
    /// Credentials rejected; `error` is the backend's explanation.
    Invalid { error: String },
}

/// Validates a configuration mapping, accepting only string and boolean values.
pub fn validate_snapshot(value: &Value) -> Result<ConfigSnapshot, ValidationError> {
    let object = as_object(value, FIELD_CONFIG)?;
    object
        .iter()
        .map(|(key, raw)| {
            let value = match raw {
                Value::String(text) => ConfigValue::String(text.clone()),
                Value::Bool(flag) => ConfigValue::Bool(*flag),
                other => {
                    return Err(ValidationError::UnsupportedValue {
                        key: key.clone(),
                        found: json_type_name(other),
                    })
                }
            };
            Ok((key.clone(), value))
        })
        .collect()
}

/// Validates the `{ config, pollIntervalInMs }` bootstrap response.
pub fn validate_bootstrap_response(value: &Value) -> Result<BootstrapResponse, ValidationError> {
    let object = as_object(value, "bootstrap response")?;
    let config = validate_snapshot(required(object, FIELD_CONFIG)?)?;
    let poll_interval = required(object, FIELD_POLL_INTERVAL)?
        .as_f64()
        .and_then(|ms| Duration::try_from_secs_f64(ms / 1000.0).ok())
        .ok_or(ValidationError::InvalidField {
            field: FIELD_POLL_INTERVAL,
            expected: "a non-negative number",
        })?;
    Ok(BootstrapResponse {
        config,
        poll_interval,
    })
}

/// Validates the handshake response, discriminated on `isValid`.
pub fn validate_init_response(value: &Value) -> Result<InitResponse, ValidationError> {
    let object = as_object(value, "init response")?;
    let is_valid = required(object, FIELD_IS_VALID)?
        .as_bool()
        .ok_or(ValidationError::InvalidField {
            field: FIELD_IS_VALID,
            expected: "a boolean",
        })?;

    if !is_valid {
        let error = required(object, FIELD_ERROR)?
            .as_str()
            .ok_or(ValidationError::InvalidField {
                field: FIELD_ERROR,
                expected: "a string",
            })?;
        return Ok(InitResponse::Invalid {
            error: error.to_owned(),
        });
    }

    let plan = required(object, FIELD_PLAN)?
        .as_str()
        .and_then(Plan::parse)
        .ok_or(ValidationError::InvalidField {
            field: FIELD_PLAN,
            expected: "one of \"free\" or \"pro\"",
        })?;
    let config = validate_snapshot(required(object, FIELD_CONFIG)?)?;
    Ok(InitResponse::Valid { plan, config })
}

/// Parses and validates the JSON payload of a push message.
pub fn parse_snapshot_message(raw: &str) -> Result<ConfigSnapshot, ValidationError> {
    let value: Value = serde_json::from_str(raw)?;
    validate_snapshot(&value)
}

fn as_object<'a>(
    value: &'a Value,
    context: &'static str,
) -> Result<&'a Map<String, Value>, ValidationError> {
    value.as_object().ok_or(ValidationError::NotAnObject {
        context,
        found: json_type_name(value),
    })
}

fn required<'a>(
    object: &'a Map<String, Value>,
    field: &'static str,
) -> Result<&'a Value, ValidationError> {
    object.get(field).ok_or(ValidationError::MissingField(field))
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
