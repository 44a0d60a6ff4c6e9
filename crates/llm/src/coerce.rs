//! Defensive parsing of model output.
//!
//! Every response is treated as untrusted: content may arrive wrapped in a
//! triple-backtick fence (optionally labeled `json`), fields may be missing,
//! and values may be the wrong type. Nothing in this module ever fails the
//! pipeline — callers get a default instead.

use serde_json::Value;

/// Strip a single outer triple-backtick fence, optionally labeled `json`.
///
/// Returns the inner body trimmed, or the trimmed input when no fence is
/// present. Only one fence level is removed; nested fences stay intact.
pub fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop an optional language label up to the first newline.
    let body = match rest.split_once('\n') {
        Some((label, body)) if label.trim().len() <= 8 => body,
        _ => rest,
    };
    match body.rfind("```") {
        Some(end) => body[..end].trim(),
        None => body.trim(),
    }
}

/// Extract the first JSON object from a model response.
///
/// Two strategies, in order:
/// 1. a fenced ```json ... ``` block;
/// 2. a bare object spanning the first `{` to the last `}`.
///
/// Returns `None` when neither yields valid JSON.
pub fn extract_json_value(response: &str) -> Option<Value> {
    // Strategy 1: fenced block.
    if let Some(fence_start) = response.find("```") {
        let candidate = strip_code_fence(&response[fence_start..]);
        if let Ok(val) = serde_json::from_str::<Value>(candidate) {
            return Some(val);
        }
    }

    // Strategy 2: bare object.
    let trimmed = response.trim();
    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    if end > start {
        if let Ok(val) = serde_json::from_str::<Value>(&trimmed[start..=end]) {
            return Some(val);
        }
    }
    None
}

/// Deserialize the first JSON object in a response into `T`.
///
/// Missing fields fall back through `#[serde(default)]` on the target type;
/// a response with no parseable object at all yields `None`.
pub fn extract_json_output<T: serde::de::DeserializeOwned>(response: &str) -> Option<T> {
    extract_json_value(response).and_then(|v| serde_json::from_value(v).ok())
}

// ── Field coercion helpers ────────────────────────────────────────────────────

/// String field, or `None` when absent, null, or not a string.
pub fn opt_str(value: &Value, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// String field with an empty-string default.
pub fn str_or_empty(value: &Value, key: &str) -> String {
    opt_str(value, key).unwrap_or_default()
}

/// Numeric field clamped to `[0, 1]`, tolerating numbers-as-strings.
pub fn unit_score(value: &Value, key: &str, default: f32) -> f32 {
    let raw = match value.get(key) {
        Some(Value::Number(n)) => n.as_f64().map(|f| f as f32),
        Some(Value::String(s)) => s.trim().parse::<f32>().ok(),
        _ => None,
    };
    raw.unwrap_or(default).clamp(0.0, 1.0)
}

/// Array field as an owned vec, empty when absent or mistyped.
pub fn array_of(value: &Value, key: &str) -> Vec<Value> {
    value
        .get(key)
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default()
}
