/**
 * Routes Module
 * API route handlers
 */

pub mod activity;
pub mod auth;
pub mod blog;
pub mod comments;
pub mod cv;
pub mod events;
pub mod health;
pub mod profile;
pub mod projects;
pub mod quotes;
pub mod upload;
pub mod visitors;

use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::error::{ApiError, ApiResult};

/// `{ "ok": true }`
#[derive(Debug, Serialize, Deserialize)]
pub struct OkResponse {
    pub ok: bool,
}

impl OkResponse {
    pub fn ok() -> Self {
        Self { ok: true }
    }
}

/// Parses a JSON body that may be absent; an empty body yields `T::default()`.
pub fn parse_optional_json<T: DeserializeOwned + Default>(body: &[u8]) -> ApiResult<T> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body).map_err(|_| ApiError::bad_request("Invalid JSON body"))
}

/// Numeric path id, 400 otherwise.
pub fn parse_id(raw: &str) -> ApiResult<i64> {
    raw.parse::<i64>()
        .ok()
        .filter(|id| *id > 0)
        .ok_or_else(|| ApiError::bad_request("Invalid id"))
}

/// Trimmed, non-empty string or `None`.
pub fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
