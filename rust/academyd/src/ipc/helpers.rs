use rusqlite::Connection;
use serde_json::Value as JsonValue;

use super::error::ApiError;
use super::types::{AppState, Request};

pub fn db_conn<'a>(state: &'a AppState) -> Result<&'a Connection, ApiError> {
    state.db.as_ref().ok_or(ApiError::NoWorkspace)
}

/// Present and non-null; `null` is treated like an absent key.
pub fn param<'a>(req: &'a Request, key: &str) -> Option<&'a JsonValue> {
    req.params.get(key).filter(|v| !v.is_null())
}

pub fn required_str(req: &Request, key: &str) -> Result<String, ApiError> {
    param(req, key)
        .and_then(|v| v.as_str())
        .map(|v| v.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ApiError::bad_params(format!("missing {}", key)))
}

pub fn opt_str(req: &Request, key: &str) -> Result<Option<String>, ApiError> {
    match param(req, key) {
        None => Ok(None),
        Some(v) => v
            .as_str()
            .map(|s| Some(s.trim().to_string()))
            .ok_or_else(|| ApiError::bad_params(format!("{} must be a string", key))),
    }
}

/// Integers arrive either as JSON numbers or as numeric strings from form inputs.
pub fn as_i64(v: &JsonValue) -> Option<i64> {
    match v {
        JsonValue::Number(n) => n.as_i64(),
        JsonValue::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}

pub fn opt_i64(req: &Request, key: &str) -> Result<Option<i64>, ApiError> {
    match param(req, key) {
        None => Ok(None),
        Some(v) => as_i64(v)
            .map(Some)
            .ok_or_else(|| ApiError::bad_params(format!("{} must be an integer", key))),
    }
}

pub fn required_i64(req: &Request, key: &str) -> Result<i64, ApiError> {
    opt_i64(req, key)?.ok_or_else(|| ApiError::bad_params(format!("missing {}", key)))
}

pub fn check_len(field: &str, value: &str, max: usize) -> Result<(), ApiError> {
    if value.chars().count() > max {
        return Err(ApiError::field(
            field,
            format!("Ensure this field has no more than {} characters.", max),
        ));
    }
    Ok(())
}

pub fn check_non_negative(field: &str, value: i64) -> Result<(), ApiError> {
    if value < 0 {
        return Err(ApiError::field(
            field,
            "Ensure this value is greater than or equal to 0.",
        ));
    }
    Ok(())
}

pub fn now_ts() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
}
