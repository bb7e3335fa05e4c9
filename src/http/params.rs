use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde_json::{Number, Value as JsonValue};

use crate::driver::BackendError;
use crate::types::{Params, Value};

/// Convert bound parameters into the Data API `args` array.
///
/// # Errors
///
/// Returns `BackendError::NotSupported` for named parameters; the API binds `?`
/// placeholders positionally.
pub fn convert_params(params: Params) -> Result<Vec<JsonValue>, BackendError> {
    match params {
        Params::Positional(values) => Ok(values.into_iter().map(to_json_arg).collect()),
        Params::Named(_) => Err(BackendError::NotSupported(
            "named parameters are not supported by the HTTP API".to_string(),
        )),
    }
}

/// One argument as JSON. Byte strings travel base64-encoded.
#[must_use]
pub fn to_json_arg(value: Value) -> JsonValue {
    match value {
        Value::Null => JsonValue::Null,
        Value::Bool(b) => JsonValue::Bool(b),
        Value::Int(i) => JsonValue::Number(i.into()),
        Value::UInt(u) => JsonValue::Number(u.into()),
        Value::Float(f) => Number::from_f64(f).map_or(JsonValue::Null, JsonValue::Number),
        Value::Text(s) => JsonValue::String(s),
        Value::Bytes(b) => JsonValue::String(STANDARD.encode(b)),
        other => other.to_sql_text().map_or(JsonValue::Null, JsonValue::String),
    }
}
