//! Message records at the core's boundary.
//!
//! Messages are plain JSON objects with a well-known `message_type` key and
//! protocol-specific field keys. Bit-range keys such as `"bits[0:5]"` are
//! ordinary opaque strings here.

use serde_json::{Map, Value};

/// An inbound or outbound message record.
pub type Message = Map<String, Value>;

/// Key naming the message type in every record.
pub const MESSAGE_TYPE_KEY: &str = "message_type";

/// The message's type, if present and a string.
pub fn message_type(message: &Message) -> Option<&str> {
    message.get(MESSAGE_TYPE_KEY).and_then(Value::as_str)
}

/// Numeric view of a JSON value. Booleans are not numbers.
pub fn as_number(value: &Value) -> Option<f64> {
    value.as_f64()
}

/// Whether the value is a JSON integer.
pub fn is_integer(value: &Value) -> bool {
    value.is_i64() || value.is_u64()
}

/// JSON value for a float; non-finite values become `null`.
pub fn number(value: f64) -> Value {
    Value::from(value)
}

/// JSON value for a float rounded to the nearest integer.
pub fn integer(value: f64) -> Value {
    if value.is_finite() {
        Value::from(value.round() as i64)
    } else {
        Value::Null
    }
}

/// String key used for enum-table lookups.
pub fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Short type name used in diagnostics.
pub fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_f64() => "float",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Equality with a relative tolerance for numbers.
pub fn values_match(expected: &Value, actual: &Value, tolerance: f64) -> bool {
    match (as_number(expected), as_number(actual)) {
        (Some(e), Some(a)) => (e - a).abs() <= tolerance * e.abs().max(a.abs()).max(1.0),
        _ => expected == actual,
    }
}
