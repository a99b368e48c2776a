use axum::extract::{Multipart, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value};
use tracing::{error, info};

use super::fail;
use crate::gateway::AppState;

const UNCONFIGURED: &str =
    "Speech API not configured. Set FISH_API_KEY and the voice section in config.yaml.";

/// `POST /api/tts`
///
/// Body: `{text}`. Replies with raw MP3 bytes.
pub(crate) async fn api_tts(State(state): State<AppState>, Json(body): Json<Value>) -> Response {
    let Some(speech) = state.speech.as_ref() else {
        return fail(StatusCode::INTERNAL_SERVER_ERROR, UNCONFIGURED);
    };
    let text = match body.get("text").and_then(Value::as_str) {
        Some(t) if !t.trim().is_empty() => t,
        _ => return fail(StatusCode::BAD_REQUEST, "Missing text"),
    };

    match speech.text_to_speech(text).await {
        Ok(bytes) => {
            info!(bytes = bytes.len(), "speech synthesized");
            ([(header::CONTENT_TYPE, "audio/mpeg")], bytes).into_response()
        }
        Err(e) => {
            error!(error = %e, "tts failed");
            fail(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

/// `POST /api/asr`
///
/// Multipart upload with an `audio` part and an optional `language`
/// field. Replies `{ok, text}`.
pub(crate) async fn api_asr(State(state): State<AppState>, mut multipart: Multipart) -> Response {
    let Some(speech) = state.speech.as_ref() else {
        return fail(StatusCode::INTERNAL_SERVER_ERROR, UNCONFIGURED);
    };

    let mut audio: Option<Vec<u8>> = None;
    let mut language: Option<String> = None;
    loop {
        match multipart.next_field().await {
            Ok(Some(field)) => {
                let name = field.name().map(str::to_string);
                match name.as_deref() {
                    Some("audio") => match field.bytes().await {
                        Ok(b) => audio = Some(b.to_vec()),
                        Err(e) => return fail(StatusCode::BAD_REQUEST, e.to_string()),
                    },
                    Some("language") => {
                        language = field.text().await.ok().filter(|s| !s.is_empty());
                    }
                    _ => {}
                }
            }
            Ok(None) => break,
            Err(e) => return fail(StatusCode::BAD_REQUEST, e.to_string()),
        }
    }

    let Some(audio) = audio.filter(|a| !a.is_empty()) else {
        return fail(StatusCode::BAD_REQUEST, "Missing audio");
    };

    match speech.speech_to_text(audio, language.as_deref()).await {
        Ok(transcript) => {
            info!(chars = transcript.text.len(), "speech transcribed");
            Json(json!({ "ok": true, "text": transcript.text })).into_response()
        }
        Err(e) => {
            error!(error = %e, "asr failed");
            fail(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}
