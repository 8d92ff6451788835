//! services/study/src/adapters/failure.rs
//!
//! Normalizes the knowledge service's heterogeneous failure payloads into a
//! single human-readable message. Every non-success response, from any
//! endpoint, is routed through here before it can reach a controller.

use serde::Deserialize;
use serde_json::Value;

/// The fixed message used when a failure payload carries nothing usable.
pub const GENERIC_FAILURE: &str = "Request failed";

/// The service's failure body. Only `detail` matters; everything else in the
/// payload is ignored.
#[derive(Debug, Deserialize)]
struct FailureBody {
    #[serde(default)]
    detail: Option<ErrorDetail>,
}

/// The three shapes `detail` is known to take: a plain message, a list of
/// validation errors each carrying a `msg`, or an arbitrary structured value.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ErrorDetail {
    Text(String),
    Fields(Vec<FieldError>),
    Other(Value),
}

#[derive(Debug, Deserialize)]
struct FieldError {
    msg: String,
}

/// Turns a failure payload into a display message. Pure and total: malformed
/// or empty payloads fall back to [`GENERIC_FAILURE`], never an error.
pub fn normalize_failure(body: Value) -> String {
    let detail = match serde_json::from_value::<FailureBody>(body) {
        Ok(FailureBody { detail }) => detail,
        Err(_) => None,
    };

    match detail {
        Some(ErrorDetail::Text(message)) => message,
        Some(ErrorDetail::Fields(fields)) => match fields.first() {
            Some(first) => first.msg.clone(),
            None => GENERIC_FAILURE.to_string(),
        },
        Some(ErrorDetail::Other(value)) if !is_empty_value(&value) => value.to_string(),
        _ => GENERIC_FAILURE.to_string(),
    }
}

fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Array(items) => items.is_empty(),
        Value::Object(fields) => fields.is_empty(),
        _ => false,
    }
}
