//! Value codec.
//!
//! Both backends hold plain strings. Structured values (arrays, objects and
//! null) are stored as JSON text; strings are stored as-is; booleans and
//! numbers are stored as their JSON literal. Decoding tries JSON first and
//! falls back to the raw string, so it never fails.
//!
//! The fallback makes string round trips loose: a string that happens to be
//! valid JSON (`"3"`, `"true"`, `"[1]"`) comes back as the parsed value.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use strata_core::EncodingError;

/// Deepest array/object nesting `encode` accepts.
///
/// serde_json refuses to parse beyond 128 levels; anything stored deeper than
/// that would silently decode as a plain string.
pub const MAX_NESTING_DEPTH: usize = 100;

/// Encode any serializable value to its stored form.
pub fn encode<T: Serialize + ?Sized>(value: &T) -> Result<String, EncodingError> {
    let value = serde_json::to_value(value).map_err(|e| EncodingError::Serialize {
        reason: e.to_string(),
    })?;
    encode_value(&value)
}

/// Encode an already-built JSON value.
pub fn encode_value(value: &Value) -> Result<String, EncodingError> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => {
            check_depth(value)?;
            serde_json::to_string(value).map_err(|e| EncodingError::Serialize {
                reason: e.to_string(),
            })
        }
    }
}

/// Decode a stored string. Total: text that is not JSON comes back as a string.
pub fn decode(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

/// Decode a stored string into a concrete type.
///
/// When the JSON reading does not fit `T`, the raw text is tried as a plain
/// string, so a stored `"3"` can still be read back as a `String`.
pub fn decode_as<T: DeserializeOwned>(raw: &str) -> Result<T, EncodingError> {
    let decoded = decode(raw);
    let is_string = decoded.is_string();
    match serde_json::from_value(decoded) {
        Ok(value) => Ok(value),
        Err(_) if !is_string => serde_json::from_value(Value::String(raw.to_string()))
            .map_err(|e| EncodingError::Deserialize {
                reason: e.to_string(),
            }),
        Err(e) => Err(EncodingError::Deserialize {
            reason: e.to_string(),
        }),
    }
}

fn check_depth(value: &Value) -> Result<(), EncodingError> {
    let mut stack = vec![(value, 0usize)];
    while let Some((value, depth)) = stack.pop() {
        if !(value.is_array() || value.is_object()) {
            continue;
        }
        let depth = depth + 1;
        if depth > MAX_NESTING_DEPTH {
            return Err(EncodingError::NestingTooDeep {
                max_depth: MAX_NESTING_DEPTH,
            });
        }
        match value {
            Value::Array(items) => stack.extend(items.iter().map(|child| (child, depth))),
            Value::Object(map) => stack.extend(map.values().map(|child| (child, depth))),
            _ => {}
        }
    }
    Ok(())
}
