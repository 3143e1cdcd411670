//! JSON scalar coercions.

use serde_json::Value;

/// Text form of a JSON value; `null` becomes `None`.
#[must_use]
pub fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Array(_) | Value::Object(_) => Some(value.to_string()),
    }
}

/// Whole seconds from an int, float (truncated), or numeric string.
/// Anything negative, null, or unparseable is `0`.
#[must_use]
pub fn coerce_duration(value: Option<&Value>) -> i64 {
    let parsed = match value {
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().and_then(truncate_f64)),
        Some(Value::String(s)) => parse_integer(s),
        _ => None,
    };
    parsed.filter(|v| *v >= 0).unwrap_or(0)
}

/// Integer from text, accepting a fractional part (truncated).
#[must_use]
pub fn parse_integer(s: &str) -> Option<i64> {
    let s = s.trim();
    s.parse::<i64>()
        .ok()
        .or_else(|| s.parse::<f64>().ok().and_then(truncate_f64))
}

#[allow(clippy::cast_possible_truncation)]
fn truncate_f64(f: f64) -> Option<i64> {
    // i64::MAX as f64 rounds up to 2^63, so the upper bound is exclusive
    if f.is_finite() && f >= i64::MIN as f64 && f < i64::MAX as f64 {
        Some(f.trunc() as i64)
    } else {
        None
    }
}
