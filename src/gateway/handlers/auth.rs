use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Redirect, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{error, info};

use super::fail;
use crate::connections::Service;
use crate::gateway::AppState;
use crate::provider::is_missing_account_error;

/// `GET /api/auth/status`
///
/// Per-service connectivity plus the raw ACTIVE connection objects so
/// the client can show account details.
pub(crate) async fn api_auth_status(State(state): State<AppState>) -> Response {
    let items = match state.provider.list_connections().await {
        Ok(items) => items,
        Err(e) => {
            error!(error = %e, "auth status listing failed");
            return fail(StatusCode::INTERNAL_SERVER_ERROR, e.to_string());
        }
    };

    let mut accounts = Map::new();
    for service in Service::ALL {
        let active: Vec<Value> = items
            .iter()
            .filter(|c| c.is_active() && c.slug() == service.slug())
            .filter_map(|c| serde_json::to_value(c).ok())
            .collect();
        accounts.insert(service.slug().to_string(), json!(!active.is_empty()));
        accounts.insert(format!("{}Connections", service.slug()), json!(active));
    }
    accounts.insert("totalConnections".to_string(), json!(items.len()));

    Json(json!({ "ok": true, "connectedAccounts": accounts })).into_response()
}

/// `POST /api/auth/gmail/start`
pub(crate) async fn api_gmail_start(State(state): State<AppState>) -> Response {
    let (auth_config_id, callback_url) = match (
        state.auth.gmail_auth_config_id.as_deref(),
        state.auth.gmail_callback_url.as_deref(),
    ) {
        (Some(id), Some(cb)) => (id, cb),
        _ => {
            return fail(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Gmail auth not configured. Set provider.gmail_auth_config_id and \
                 provider.gmail_callback_url in config.yaml.",
            )
        }
    };

    match state
        .provider
        .initiate_link(&state.auth.default_user_id, auth_config_id, callback_url)
        .await
    {
        Ok(link) => {
            info!("gmail link flow started");
            Json(json!({ "ok": true, "url": link.redirect_url })).into_response()
        }
        Err(e) => fail(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

#[derive(Deserialize)]
pub(crate) struct CallbackParams {
    error: Option<String>,
    status: Option<String>,
    connected_account_id: Option<String>,
}

fn oauth_callback(params: CallbackParams, success_flag: &str) -> Response {
    if let Some(error) = params.error {
        return fail(
            StatusCode::BAD_REQUEST,
            format!("Authentication failed: {error}"),
        );
    }
    match (params.status.as_deref(), params.connected_account_id) {
        (Some("success"), Some(account_id)) => {
            info!(account = %account_id, "auth callback succeeded");
            Redirect::to(&format!("/?auth={success_flag}&account_id={account_id}"))
                .into_response()
        }
        (_, None) => fail(StatusCode::BAD_REQUEST, "Missing account ID"),
        (_, Some(_)) => Redirect::to(&format!("/?auth={success_flag}")).into_response(),
    }
}

/// `GET /api/auth/gmail/callback`
pub(crate) async fn api_gmail_callback(Query(params): Query<CallbackParams>) -> Response {
    oauth_callback(params, "success")
}

/// `GET /api/auth/canvas/callback`
pub(crate) async fn api_canvas_callback(Query(params): Query<CallbackParams>) -> Response {
    oauth_callback(params, "canvas_success")
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CanvasStartBody {
    api_key: Option<String>,
    base_url: Option<String>,
}

/// `POST /api/auth/canvas/start`
///
/// Canvas uses an API-key flow instead of an OAuth redirect; the key
/// comes from the request body or from config.
pub(crate) async fn api_canvas_start(
    State(state): State<AppState>,
    body: Option<Json<CanvasStartBody>>,
) -> Response {
    let Some(auth_config_id) = state.auth.canvas_auth_config_id.as_deref() else {
        return fail(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Canvas auth not configured. Set provider.canvas_auth_config_id in config.yaml.",
        );
    };

    let body = body.map(|Json(b)| b).unwrap_or_default();
    let api_key = body
        .api_key
        .filter(|k| !k.is_empty())
        .unwrap_or_else(|| state.auth.canvas_api_key.clone());
    let base_url = body
        .base_url
        .or_else(|| state.auth.canvas_base_url.clone())
        .unwrap_or_default();
    if api_key.is_empty() {
        return fail(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Canvas API key not configured. Set CANVAS_API_KEY or provider.canvas_api_key \
             in config.yaml, or pass apiKey in the request body.",
        );
    }

    let fields = json!({
        "api_key": api_key,
        "generic_api_key": api_key,
        "full": base_url,
        "base_url": base_url,
    });
    match state
        .provider
        .initiate_api_key(&state.auth.default_user_id, auth_config_id, &fields)
        .await
    {
        Ok(data) => {
            info!("canvas connection initiated");
            Json(json!({ "ok": true, "data": data })).into_response()
        }
        Err(e) => fail(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

/// `POST /api/auth/gmail/unlink`
///
/// Removes every ACTIVE Gmail connection. A provider that reports no
/// connected account at all is treated as nothing to remove.
pub(crate) async fn api_gmail_unlink(State(state): State<AppState>) -> Response {
    let items = match state.provider.list_connections().await {
        Ok(items) => items,
        Err(e) if is_missing_account_error(&e) => {
            return Json(json!({ "ok": true, "removed": 0 })).into_response();
        }
        Err(e) => return fail(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    };

    let gmail: Vec<String> = items
        .iter()
        .filter(|c| c.is_active() && c.slug() == Service::Gmail.slug())
        .filter_map(|c| c.id.clone())
        .collect();

    let mut removed = 0usize;
    for id in &gmail {
        match state.provider.unlink(&state.auth.default_user_id, id).await {
            Ok(()) => removed += 1,
            Err(e) => return fail(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
        }
    }

    info!(removed, "gmail connections unlinked");
    Json(json!({ "ok": true, "removed": removed })).into_response()
}
