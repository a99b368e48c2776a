//! Capability provider abstractions.
//!
//! The provider is the opaque external system that lists connected
//! accounts, resolves tool descriptors, and executes tool invocations.
//! Defines the [`CapabilityProvider`] trait plus the concrete
//! [`HttpCapabilityProvider`].

pub mod http;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::model::{ContentBlock, ModelMessage, ModelResponse, ToolDefinition};

pub use http::HttpCapabilityProvider;

// ---------------------------------------------------------------------------
// ServiceConnection — tolerant account listing entry
// ---------------------------------------------------------------------------

/// Toolkit reference as returned by the provider. Historical payloads use
/// either a nested object or a flat string, so both are accepted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ToolkitRef {
    Object { slug: String },
    Slug(String),
}

/// One link between an external user and one service.
///
/// Field names have drifted across provider versions; deserialization
/// tolerates the known aliases rather than failing the whole listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConnection {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default, alias = "toolkit_slug")]
    pub toolkit: Option<ToolkitRef>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default, alias = "externalUserId", alias = "external_userID")]
    pub external_user_id: Option<String>,
}

impl ServiceConnection {
    /// Normalized lowercase toolkit slug, or `""` when absent.
    pub fn slug(&self) -> String {
        match &self.toolkit {
            Some(ToolkitRef::Object { slug }) => slug.to_lowercase(),
            Some(ToolkitRef::Slug(s)) => s.to_lowercase(),
            None => String::new(),
        }
    }

    /// Whether this connection is usable.
    pub fn is_active(&self) -> bool {
        self.status
            .as_deref()
            .map(|s| s.eq_ignore_ascii_case("ACTIVE"))
            .unwrap_or(false)
    }

    /// Whether the recorded owner matches `user_id`. Connections created
    /// by auth flows that never tagged a user have no owner and never match.
    pub fn matches_user(&self, user_id: &str) -> bool {
        self.external_user_id.as_deref() == Some(user_id)
    }
}

// ---------------------------------------------------------------------------
// Tool descriptors and queries
// ---------------------------------------------------------------------------

/// A named, parameterized capability bound to one service. Requested
/// fresh per turn; never cached across turns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, alias = "input_parameters")]
    pub input_schema: Value,
}

impl ToolDescriptor {
    /// Convert into the definition shape handed to the model.
    pub fn into_definition(self) -> ToolDefinition {
        ToolDefinition {
            name: self.name,
            description: self.description,
            input_schema: self.input_schema,
        }
    }
}

/// Query for tool descriptors: either an explicit tool-name list or a
/// toolkit-scoped search.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ToolQuery {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub toolkits: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
}

impl ToolQuery {
    /// Query for an explicit list of tool names.
    pub fn named<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tools: names.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    /// Query for everything a toolkit exposes.
    pub fn toolkit(slug: impl Into<String>) -> Self {
        Self {
            toolkits: vec![slug.into()],
            ..Default::default()
        }
    }
}

/// Redirect handle returned when starting an OAuth link flow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkRequest {
    #[serde(alias = "linkUrl", alias = "redirectUrl")]
    pub redirect_url: String,
}

// ---------------------------------------------------------------------------
// CapabilityProvider trait
// ---------------------------------------------------------------------------

/// The fixed contract the orchestrator consumes.
#[async_trait]
pub trait CapabilityProvider: Send + Sync {
    /// List every connected account the provider knows about.
    async fn list_connections(&self) -> anyhow::Result<Vec<ServiceConnection>>;

    /// Resolve tool descriptors for a user.
    async fn get_tools(
        &self,
        user_id: &str,
        query: &ToolQuery,
    ) -> anyhow::Result<Vec<ToolDescriptor>>;

    /// Execute one named tool with arguments under a user identity.
    async fn execute_tool(
        &self,
        user_id: &str,
        name: &str,
        arguments: &Value,
    ) -> anyhow::Result<Value>;

    /// Start an OAuth link flow; returns the redirect URL.
    async fn initiate_link(
        &self,
        user_id: &str,
        auth_config_id: &str,
        callback_url: &str,
    ) -> anyhow::Result<LinkRequest>;

    /// Start an API-key connection (e.g. Canvas personal token).
    async fn initiate_api_key(
        &self,
        user_id: &str,
        auth_config_id: &str,
        fields: &Value,
    ) -> anyhow::Result<Value>;

    /// Remove one connected account.
    async fn unlink(&self, user_id: &str, connection_id: &str) -> anyhow::Result<()>;
}

// ---------------------------------------------------------------------------
// Tool-call execution helper
// ---------------------------------------------------------------------------

/// Execute every `tool_use` block in a model response and shape the
/// outputs as `user`-role messages carrying `tool_result` blocks, ready
/// to fold into the follow-up model call.
///
/// Errors abort the batch and propagate — the orchestrator owns the
/// fallback-identity retry, so partial results are never returned here.
pub async fn execute_tool_calls(
    provider: &dyn CapabilityProvider,
    user_id: &str,
    response: &ModelResponse,
) -> anyhow::Result<Vec<ModelMessage>> {
    let mut results = Vec::new();
    for (id, name, input) in response.tool_uses() {
        debug!(tool = name, user = user_id, "executing tool call");
        let output = provider.execute_tool(user_id, name, input).await?;
        results.push(ModelMessage::user_blocks(vec![ContentBlock::ToolResult {
            tool_use_id: id.to_string(),
            content: output,
        }]));
    }
    Ok(results)
}

/// Check if an error carries the provider's "account not found" signature.
///
/// This is the one tool-execution failure that earns a single retry under
/// the configured default identity.
pub fn is_missing_account_error(err: &anyhow::Error) -> bool {
    let msg = err.to_string();
    msg.contains("Connected account not found") || msg.contains("No connected account found")
}
