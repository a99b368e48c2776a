//! HTTP gateway.
//!
//! Serves the chat endpoint, auth and tool diagnostics, the voice
//! wrappers, and the static client UI as the fallback service.

mod handlers;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tracing::{error, info};

use crate::orchestrator::Orchestrator;
use crate::provider::CapabilityProvider;
use crate::voice::SpeechClient;

/// Settings the auth handlers need from config.
pub struct AuthSettings {
    pub default_user_id: String,
    pub gmail_auth_config_id: Option<String>,
    pub gmail_callback_url: Option<String>,
    pub canvas_auth_config_id: Option<String>,
    pub canvas_base_url: Option<String>,
    /// Resolved Canvas API key; may be empty.
    pub canvas_api_key: String,
}

/// Which credentials resolved to non-empty values at startup. Checked
/// per request so the error message points at the missing key instead
/// of a failed upstream call.
#[derive(Clone, Copy)]
pub struct CredentialPresence {
    pub model_key: bool,
    pub provider_key: bool,
}

/// Shared state injected into axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub provider: Arc<dyn CapabilityProvider>,
    pub speech: Option<Arc<SpeechClient>>,
    pub auth: Arc<AuthSettings>,
    pub credentials: CredentialPresence,
}

/// Handle returned by [`start_gateway`].
pub struct Gateway {
    /// Server task handle.
    pub handle: JoinHandle<()>,
    /// The address the server is actually listening on.
    pub addr: SocketAddr,
}

/// Start the gateway HTTP server on `addr`.
pub async fn start_gateway(addr: SocketAddr, state: AppState) -> std::io::Result<Gateway> {
    let _ = handlers::health::STARTUP_TIME.set(std::time::Instant::now());

    let api_router = Router::new()
        .route("/status", get(handlers::health::status_handler))
        .route("/health", get(handlers::health::api_health))
        .route("/chat", post(handlers::chat::api_chat))
        // Auth
        .route("/auth/status", get(handlers::auth::api_auth_status))
        .route("/auth/gmail/start", post(handlers::auth::api_gmail_start))
        .route("/auth/gmail/callback", get(handlers::auth::api_gmail_callback))
        .route("/auth/gmail/unlink", post(handlers::auth::api_gmail_unlink))
        .route("/auth/canvas/start", post(handlers::auth::api_canvas_start))
        .route("/auth/canvas/callback", get(handlers::auth::api_canvas_callback))
        // Tool diagnostics
        .route("/tools", get(handlers::tools::api_tools_count))
        .route("/tools/search", get(handlers::tools::api_tools_search))
        .route(
            "/tools/canvas/search",
            get(handlers::tools::api_canvas_tools_search),
        )
        // Voice
        .route("/tts", post(handlers::voice::api_tts))
        .route("/asr", post(handlers::voice::api_asr));

    let app = Router::new()
        .nest("/api", api_router)
        .with_state(state)
        .layer(CorsLayer::permissive())
        .fallback_service(ServeDir::new("static"));

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let bound_addr = listener.local_addr()?;

    let handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("gateway server error: {e}");
        }
    });

    info!(%bound_addr, "gateway started");

    Ok(Gateway {
        handle,
        addr: bound_addr,
    })
}
