//! Route handlers, grouped by concern.
//!
//! Every JSON reply uses the `{ok: true, ...}` / `{ok: false, error}`
//! envelope.

pub(crate) mod auth;
pub(crate) mod chat;
pub(crate) mod health;
pub(crate) mod tools;
pub(crate) mod voice;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

/// `{ok: false, error}` with an explicit status code.
pub(crate) fn fail(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(serde_json::json!({ "ok": false, "error": message.into() })),
    )
        .into_response()
}
