//! HTTP implementation of [`CapabilityProvider`].

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use super::{
    CapabilityProvider, LinkRequest, ServiceConnection, ToolDescriptor, ToolQuery,
};

/// Client for the capability provider's REST API.
pub struct HttpCapabilityProvider {
    api_key: String,
    base_url: String,
    client: Client,
}

impl HttpCapabilityProvider {
    /// Create a new provider client. `base_url` must not end with `/`.
    pub fn new(api_key: String, base_url: String) -> Self {
        Self {
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            client: Client::builder()
                .timeout(Duration::from_secs(90))
                .connect_timeout(Duration::from_secs(10))
                .build()
                .expect("failed to build HTTP client"),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// POST a JSON body and parse the JSON reply, mapping non-2xx to an
    /// error carrying the status and body text (error classification
    /// elsewhere matches on these message signatures).
    async fn post_json(&self, path: &str, body: &Value) -> anyhow::Result<Value> {
        let resp = self
            .client
            .post(self.url(path))
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            anyhow::bail!("provider API returned {status}: {text}");
        }
        Ok(resp.json().await?)
    }

    async fn get_json(&self, path: &str) -> anyhow::Result<Value> {
        let resp = self
            .client
            .get(self.url(path))
            .bearer_auth(&self.api_key)
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            anyhow::bail!("provider API returned {status}: {text}");
        }
        Ok(resp.json().await?)
    }
}

#[async_trait]
impl CapabilityProvider for HttpCapabilityProvider {
    async fn list_connections(&self) -> anyhow::Result<Vec<ServiceConnection>> {
        let v = self.get_json("/connected_accounts").await?;
        let items = v
            .get("items")
            .cloned()
            .unwrap_or_else(|| Value::Array(Vec::new()));
        Ok(serde_json::from_value(items)?)
    }

    async fn get_tools(
        &self,
        user_id: &str,
        query: &ToolQuery,
    ) -> anyhow::Result<Vec<ToolDescriptor>> {
        let mut body = serde_json::to_value(query)?;
        body["user_id"] = json!(user_id);
        let v = self.post_json("/tools/query", &body).await?;
        let items = v
            .get("items")
            .cloned()
            .unwrap_or_else(|| Value::Array(Vec::new()));
        Ok(serde_json::from_value(items)?)
    }

    async fn execute_tool(
        &self,
        user_id: &str,
        name: &str,
        arguments: &Value,
    ) -> anyhow::Result<Value> {
        let body = json!({ "user_id": user_id, "arguments": arguments });
        let v = self
            .post_json(&format!("/tools/execute/{name}"), &body)
            .await?;
        // The execute endpoint wraps failures in a 200 envelope.
        if v.get("successful").and_then(Value::as_bool) == Some(false) {
            let err = v
                .get("error")
                .and_then(Value::as_str)
                .unwrap_or("unknown tool error");
            anyhow::bail!("tool {name} failed: {err}");
        }
        Ok(v.get("data").cloned().unwrap_or(v))
    }

    async fn initiate_link(
        &self,
        user_id: &str,
        auth_config_id: &str,
        callback_url: &str,
    ) -> anyhow::Result<LinkRequest> {
        let body = json!({
            "user_id": user_id,
            "auth_config_id": auth_config_id,
            "callback_url": callback_url,
        });
        let v = self.post_json("/connected_accounts/link", &body).await?;
        Ok(serde_json::from_value(v)?)
    }

    async fn initiate_api_key(
        &self,
        user_id: &str,
        auth_config_id: &str,
        fields: &Value,
    ) -> anyhow::Result<Value> {
        let body = json!({
            "user_id": user_id,
            "auth_config_id": auth_config_id,
            "config": fields,
        });
        self.post_json("/connected_accounts/initiate", &body).await
    }

    async fn unlink(&self, user_id: &str, connection_id: &str) -> anyhow::Result<()> {
        let body = json!({ "user_id": user_id });
        self.post_json(&format!("/connected_accounts/{connection_id}/unlink"), &body)
            .await?;
        Ok(())
    }
}
