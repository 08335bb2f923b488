use ingest_core::{Instant, PayloadError};
use serde_json::Value as Json;

/// Parses a timestamp field that may be a unix-epoch number or an RFC 3339
/// string (vendors are inconsistent here; spec §6.2 shows both shapes).
/// Falls back to `default` when the field is absent or unparsable.
pub fn time_field(obj: &Json, field: &str, default: Instant) -> Instant {
    match obj.get(field) {
        Some(Json::Number(n)) => n.as_i64().and_then(Instant::from_unix).unwrap_or(default),
        Some(Json::String(s)) => s.parse().unwrap_or(default),
        _ => default,
    }
}

pub fn required_f64(obj: &Json, field: &str) -> Result<f64, PayloadError> {
    obj.get(field)
        .and_then(Json::as_f64)
        .ok_or_else(|| PayloadError::SchemaViolation { field: field.to_string() })
}

pub fn optional_f64(obj: &Json, field: &str) -> Option<f64> {
    obj.get(field).and_then(Json::as_f64)
}

pub fn required_str<'a>(obj: &'a Json, field: &str) -> Result<&'a str, PayloadError> {
    obj.get(field)
        .and_then(Json::as_str)
        .ok_or_else(|| PayloadError::SchemaViolation { field: field.to_string() })
}

pub fn optional_str<'a>(obj: &'a Json, field: &str) -> Option<&'a str> {
    obj.get(field).and_then(Json::as_str)
}

pub fn required_object<'a>(obj: &'a Json, field: &str) -> Result<&'a Json, PayloadError> {
    obj.get(field)
        .filter(|v| v.is_object())
        .ok_or_else(|| PayloadError::SchemaViolation { field: field.to_string() })
}
