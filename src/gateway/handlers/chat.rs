use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value};
use tracing::{error, info};

use super::fail;
use crate::gateway::AppState;
use crate::model::{is_prompt_too_long_error, ModelMessage};
use crate::orchestrator::ChatRequest;

/// `POST /api/chat`
///
/// Body: `{userId?, userMessage, conversationHistory?}`. Input is
/// validated before any external call; credential problems answer 500
/// with a remediation hint rather than a failed upstream call.
pub(crate) async fn api_chat(State(state): State<AppState>, Json(body): Json<Value>) -> Response {
    if !state.credentials.provider_key {
        return fail(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Provider API key not configured. Set COMPOSIO_API_KEY or provider.api_key \
             in config.yaml.",
        );
    }
    if !state.credentials.model_key {
        return fail(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Model API key not configured. Set ANTHROPIC_API_KEY or model.api_key \
             in config.yaml.",
        );
    }

    let user_message = match body.get("userMessage").and_then(Value::as_str) {
        Some(s) if !s.trim().is_empty() => s.to_string(),
        _ => return fail(StatusCode::BAD_REQUEST, "Invalid user message"),
    };
    let conversation_history: Vec<ModelMessage> = match body.get("conversationHistory") {
        None | Some(Value::Null) => Vec::new(),
        Some(v) => match serde_json::from_value(v.clone()) {
            Ok(h) => h,
            Err(_) => return fail(StatusCode::BAD_REQUEST, "Invalid conversation history"),
        },
    };
    let user_id = body
        .get("userId")
        .and_then(Value::as_str)
        .map(str::to_string);

    info!(
        history = conversation_history.len(),
        has_user_id = user_id.is_some(),
        "chat turn received"
    );

    let request = ChatRequest {
        user_id,
        user_message,
        conversation_history,
    };

    match state.orchestrator.run_turn(&request).await {
        Ok(outcome) => Json(json!({
            "ok": true,
            "result": outcome.result,
            "toolResults": outcome.tool_results,
            "connectionStatus": outcome.connection_status,
            "noData": outcome.no_data,
        }))
        .into_response(),
        Err(e) if is_prompt_too_long_error(&e) => fail(
            StatusCode::BAD_REQUEST,
            "The request contains too much data. Please try asking for more specific \
             information or fewer assignments at once.",
        ),
        Err(e) => {
            error!(error = %e, "chat turn failed");
            fail(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Chat turn failed: {e}"),
            )
        }
    }
}
