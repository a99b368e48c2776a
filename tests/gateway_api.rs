//! End-to-end tests of the HTTP surface: envelopes, status codes, and
//! the auth status shape, against an in-process gateway with mock
//! clients.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};

use satchel::gateway::{
    start_gateway, AppState, AuthSettings, CredentialPresence, Gateway,
};
use satchel::intent::CourseMap;
use satchel::model::{CompletionRequest, ModelClient, ModelResponse};
use satchel::orchestrator::{Orchestrator, OrchestratorSettings, ToolRouting};
use satchel::provider::{
    CapabilityProvider, LinkRequest, ServiceConnection, ToolDescriptor, ToolQuery,
};

struct ScriptedModel {
    responses: Mutex<VecDeque<Result<ModelResponse, String>>>,
}

#[async_trait]
impl ModelClient for ScriptedModel {
    async fn complete(&self, _request: &CompletionRequest) -> anyhow::Result<ModelResponse> {
        match self.responses.lock().unwrap().pop_front() {
            Some(Ok(r)) => Ok(r),
            Some(Err(msg)) => anyhow::bail!("{msg}"),
            None => Ok(ModelResponse::from_text("scripted default")),
        }
    }
}

struct StaticProvider {
    connections: Vec<ServiceConnection>,
}

#[async_trait]
impl CapabilityProvider for StaticProvider {
    async fn list_connections(&self) -> anyhow::Result<Vec<ServiceConnection>> {
        Ok(self.connections.clone())
    }

    async fn get_tools(
        &self,
        _user_id: &str,
        query: &ToolQuery,
    ) -> anyhow::Result<Vec<ToolDescriptor>> {
        Ok(query
            .tools
            .iter()
            .map(|name| ToolDescriptor {
                name: name.clone(),
                description: String::new(),
                input_schema: json!({"type": "object"}),
            })
            .collect())
    }

    async fn execute_tool(
        &self,
        _user_id: &str,
        _name: &str,
        _arguments: &Value,
    ) -> anyhow::Result<Value> {
        Ok(json!({ "data": "ok" }))
    }

    async fn initiate_link(
        &self,
        _user_id: &str,
        _auth_config_id: &str,
        _callback_url: &str,
    ) -> anyhow::Result<LinkRequest> {
        Ok(serde_json::from_value(json!({ "redirect_url": "https://link.example/1" })).unwrap())
    }

    async fn initiate_api_key(
        &self,
        _user_id: &str,
        _auth_config_id: &str,
        _fields: &Value,
    ) -> anyhow::Result<Value> {
        Ok(json!({ "id": "ac_new", "status": "ACTIVE" }))
    }

    async fn unlink(&self, _user_id: &str, _connection_id: &str) -> anyhow::Result<()> {
        Ok(())
    }
}

fn conn(slug: &str) -> ServiceConnection {
    serde_json::from_value(json!({
        "id": format!("ac_{slug}"),
        "toolkit": { "slug": slug },
        "status": "ACTIVE",
        "external_user_id": "u1"
    }))
    .unwrap()
}

async fn gateway_with(
    responses: Vec<Result<ModelResponse, String>>,
    connections: Vec<ServiceConnection>,
    credentials: CredentialPresence,
) -> Gateway {
    let model = Arc::new(ScriptedModel {
        responses: Mutex::new(responses.into()),
    });
    let provider = Arc::new(StaticProvider { connections });
    let orchestrator = Arc::new(Orchestrator::new(
        model,
        provider.clone(),
        CourseMap::builtin(),
        OrchestratorSettings {
            model_name: "test-model".to_string(),
            max_tokens: 200,
            followup_max_tokens: 300,
            default_user_id: "default".to_string(),
            timezone: chrono_tz::UTC,
            routing: ToolRouting::Capability,
        },
    ));
    let state = AppState {
        orchestrator,
        provider,
        speech: None,
        auth: Arc::new(AuthSettings {
            default_user_id: "default".to_string(),
            gmail_auth_config_id: Some("ac_gmail".to_string()),
            gmail_callback_url: Some("http://localhost/cb".to_string()),
            canvas_auth_config_id: Some("ac_canvas".to_string()),
            canvas_base_url: Some("https://canvas.example".to_string()),
            canvas_api_key: "canvas-key".to_string(),
        }),
        credentials,
    };
    start_gateway("127.0.0.1:0".parse().unwrap(), state)
        .await
        .unwrap()
}

fn all_credentials() -> CredentialPresence {
    CredentialPresence {
        model_key: true,
        provider_key: true,
    }
}

#[tokio::test]
async fn status_endpoint_answers_ok() {
    let gw = gateway_with(vec![], vec![], all_credentials()).await;
    let body: Value = reqwest::get(format!("http://{}/api/status", gw.addr))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn chat_rejects_missing_message() {
    let gw = gateway_with(vec![], vec![], all_credentials()).await;
    let client = reqwest::Client::new();
    let resp = client
        .post(format!("http://{}/api/chat", gw.addr))
        .json(&json!({ "userId": "u1" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["ok"], false);
    assert_eq!(body["error"], "Invalid user message");
}

#[tokio::test]
async fn chat_rejects_non_string_message() {
    let gw = gateway_with(vec![], vec![], all_credentials()).await;
    let client = reqwest::Client::new();
    let resp = client
        .post(format!("http://{}/api/chat", gw.addr))
        .json(&json!({ "userMessage": 42 }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn chat_requires_credentials() {
    let gw = gateway_with(
        vec![],
        vec![],
        CredentialPresence {
            model_key: true,
            provider_key: false,
        },
    )
    .await;
    let client = reqwest::Client::new();
    let resp = client
        .post(format!("http://{}/api/chat", gw.addr))
        .json(&json!({ "userMessage": "hello" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 500);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["ok"], false);
    assert!(body["error"].as_str().unwrap().contains("COMPOSIO_API_KEY"));
}

#[tokio::test]
async fn chat_fallback_envelope_shape() {
    // No connections: the deterministic fallback still returns the full
    // envelope with connection status.
    let gw = gateway_with(
        vec![Ok(ModelResponse::from_text("discarded"))],
        vec![],
        all_credentials(),
    )
    .await;
    let client = reqwest::Client::new();
    let resp = client
        .post(format!("http://{}/api/chat", gw.addr))
        .json(&json!({ "userId": "u1", "userMessage": "What's due this week?" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["ok"], true);
    assert_eq!(body["connectionStatus"]["canvas"], false);
    assert_eq!(body["connectionStatus"]["gmail"], false);
    let text = body["result"]["content"][0]["text"].as_str().unwrap();
    assert!(text.starts_with("Looks like I need access first:"));
}

#[tokio::test]
async fn chat_maps_prompt_too_long_to_400() {
    let gw = gateway_with(
        vec![Err("model API returned 400: prompt is too long".to_string())],
        vec![conn("gmail")],
        all_credentials(),
    )
    .await;
    let client = reqwest::Client::new();
    let resp = client
        .post(format!("http://{}/api/chat", gw.addr))
        .json(&json!({ "userId": "u1", "userMessage": "summarize everything" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert!(body["error"]
        .as_str()
        .unwrap()
        .contains("too much data"));
}

#[tokio::test]
async fn auth_status_shape() {
    let gw = gateway_with(vec![], vec![conn("gmail"), conn("canvas")], all_credentials()).await;
    let body: Value = reqwest::get(format!("http://{}/api/auth/status", gw.addr))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["ok"], true);
    let accounts = &body["connectedAccounts"];
    assert_eq!(accounts["gmail"], true);
    assert_eq!(accounts["canvas"], true);
    assert_eq!(accounts["zoom"], false);
    assert_eq!(accounts["gmailConnections"].as_array().unwrap().len(), 1);
    assert_eq!(accounts["totalConnections"], 2);
}

#[tokio::test]
async fn gmail_start_returns_link_url() {
    let gw = gateway_with(vec![], vec![], all_credentials()).await;
    let client = reqwest::Client::new();
    let body: Value = client
        .post(format!("http://{}/api/auth/gmail/start", gw.addr))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["ok"], true);
    assert_eq!(body["url"], "https://link.example/1");
}

#[tokio::test]
async fn gmail_unlink_reports_removed_count() {
    let gw = gateway_with(vec![], vec![conn("gmail")], all_credentials()).await;
    let client = reqwest::Client::new();
    let body: Value = client
        .post(format!("http://{}/api/auth/gmail/unlink", gw.addr))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["ok"], true);
    assert_eq!(body["removed"], 1);
}

#[tokio::test]
async fn tts_unconfigured_answers_500_with_hint() {
    let gw = gateway_with(vec![], vec![], all_credentials()).await;
    let client = reqwest::Client::new();
    let resp = client
        .post(format!("http://{}/api/tts", gw.addr))
        .json(&json!({ "text": "hello" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 500);
    let body: Value = resp.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("FISH_API_KEY"));
}

#[tokio::test]
async fn tools_search_requires_query() {
    let gw = gateway_with(vec![], vec![], all_credentials()).await;
    let resp = reqwest::get(format!("http://{}/api/tools/search", gw.addr))
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["ok"], false);
    assert!(body["example"].as_str().unwrap().contains("/api/tools/search"));
}
