use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use super::fail;
use crate::gateway::AppState;
use crate::provider::{ToolDescriptor, ToolQuery};

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CountParams {
    user_id: Option<String>,
}

/// `GET /api/tools`
///
/// Per-toolkit tool counts, a quick connectivity diagnostic.
pub(crate) async fn api_tools_count(
    State(state): State<AppState>,
    Query(params): Query<CountParams>,
) -> Response {
    let user = params
        .user_id
        .unwrap_or_else(|| state.auth.default_user_id.clone());

    let gmail = match state.provider.get_tools(&user, &ToolQuery::toolkit("GMAIL")).await {
        Ok(t) => t,
        Err(e) => return fail(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    };
    let canvas = match state.provider.get_tools(&user, &ToolQuery::toolkit("CANVAS")).await {
        Ok(t) => t,
        Err(e) => return fail(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    };

    let names = |tools: &[ToolDescriptor]| -> Vec<String> {
        tools.iter().map(|t| t.name.clone()).collect()
    };
    Json(json!({
        "ok": true,
        "toolCounts": {
            "gmail": gmail.len(),
            "canvas": canvas.len(),
            "total": gmail.len() + canvas.len(),
        },
        "tools": {
            "gmail": names(&gmail),
            "canvas": names(&canvas),
        },
    }))
    .into_response()
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SearchParams {
    query: Option<String>,
    toolkit: Option<String>,
    limit: Option<u32>,
    user_id: Option<String>,
}

async fn search(state: &AppState, params: SearchParams, toolkit: String, example: &str) -> Response {
    let Some(query) = params.query.filter(|q| !q.is_empty()) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({
                "ok": false,
                "error": "Query parameter is required",
                "example": example,
            })),
        )
            .into_response();
    };
    let user = params
        .user_id
        .unwrap_or_else(|| state.auth.default_user_id.clone());

    let tool_query = ToolQuery {
        search: Some(query.clone()),
        toolkits: vec![toolkit.clone()],
        limit: Some(params.limit.unwrap_or(10)),
        ..Default::default()
    };
    match state.provider.get_tools(&user, &tool_query).await {
        Ok(tools) => Json(json!({
            "ok": true,
            "query": query,
            "toolkit": toolkit,
            "toolCount": tools.len(),
            "tools": tools
                .iter()
                .map(|t| json!({
                    "name": t.name,
                    "description": t.description,
                    "parameters": t.input_schema,
                }))
                .collect::<Vec<_>>(),
        }))
        .into_response(),
        Err(e) => fail(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

/// `GET /api/tools/search`
pub(crate) async fn api_tools_search(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Response {
    let toolkit = params
        .toolkit
        .clone()
        .unwrap_or_else(|| "GMAIL".to_string())
        .to_uppercase();
    search(
        &state,
        params,
        toolkit,
        "/api/tools/search?query=send%20email&toolkit=GMAIL&limit=5",
    )
    .await
}

/// `GET /api/tools/canvas/search`
pub(crate) async fn api_canvas_tools_search(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Response {
    search(
        &state,
        params,
        "CANVAS".to_string(),
        "/api/tools/canvas/search?query=assignment&limit=5",
    )
    .await
}
