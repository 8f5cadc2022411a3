use serde_json::Value as JsonValue;

/// Human-readable form of a JSON value: strings without quotes, everything
/// else as compact JSON.
pub fn plain(value: &JsonValue) -> String {
    match value {
        JsonValue::String(s) => s.clone(),
        other => other.to_string(),
    }
}
