//! Model client abstractions.
//!
//! Defines the content-block message contract the orchestrator relies on
//! ([`ContentBlock`], [`ModelMessage`], [`ModelResponse`]), the
//! [`ModelClient`] trait, and the concrete [`AnthropicClient`].

pub mod anthropic;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use anthropic::AnthropicClient;

// ---------------------------------------------------------------------------
// ContentBlock — the unit of model input/output
// ---------------------------------------------------------------------------

/// A single block within a message or response.
///
/// The model emits `text` and `tool_use` blocks; the orchestrator feeds
/// executed tool outputs back as `tool_result` blocks.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    ToolResult {
        tool_use_id: String,
        content: Value,
    },
}

// ---------------------------------------------------------------------------
// ModelMessage — shared message representation
// ---------------------------------------------------------------------------

/// Message content: plain text from the UI, or structured blocks once
/// tool calls enter the conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

/// A single chat message with a role and content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelMessage {
    pub role: String,
    pub content: MessageContent,
}

impl ModelMessage {
    /// Convenience constructor for a plain user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: MessageContent::Text(content.into()),
        }
    }

    /// Convenience constructor for a plain assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: MessageContent::Text(content.into()),
        }
    }

    /// An assistant turn carrying structured blocks (e.g. tool_use).
    pub fn assistant_blocks(blocks: Vec<ContentBlock>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: MessageContent::Blocks(blocks),
        }
    }

    /// A user turn carrying structured blocks (e.g. tool_result).
    pub fn user_blocks(blocks: Vec<ContentBlock>) -> Self {
        Self {
            role: "user".to_string(),
            content: MessageContent::Blocks(blocks),
        }
    }

    /// Plain-text view of the content, joining text blocks.
    pub fn text(&self) -> String {
        match &self.content {
            MessageContent::Text(t) => t.clone(),
            MessageContent::Blocks(blocks) => blocks
                .iter()
                .filter_map(|b| match b {
                    ContentBlock::Text { text } => Some(text.as_str()),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

// ---------------------------------------------------------------------------
// Request / response envelopes
// ---------------------------------------------------------------------------

/// A tool definition handed to the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub input_schema: Value,
}

/// Request for one model completion.
///
/// `tools` is skipped entirely when empty — an empty tool array is never
/// sent, so the model cannot hallucinate compliance with absent tools.
#[derive(Debug, Clone, Serialize)]
pub struct CompletionRequest {
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    pub messages: Vec<ModelMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDefinition>,
    pub max_tokens: u32,
}

/// Response from one model completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelResponse {
    pub content: Vec<ContentBlock>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<String>,
}

impl ModelResponse {
    /// Build a response holding a single text block (used for the
    /// orchestrator's deterministic fallbacks).
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            content: vec![ContentBlock::Text { text: text.into() }],
            stop_reason: None,
        }
    }

    /// Whether the response contains any `tool_use` block.
    pub fn has_tool_use(&self) -> bool {
        self.content
            .iter()
            .any(|b| matches!(b, ContentBlock::ToolUse { .. }))
    }

    /// The first text block's content, or `""` when there is none.
    pub fn first_text(&self) -> &str {
        self.content
            .iter()
            .find_map(|b| match b {
                ContentBlock::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .unwrap_or("")
    }

    /// Iterator over `(id, name, input)` of every tool_use block.
    pub fn tool_uses(&self) -> impl Iterator<Item = (&str, &str, &Value)> {
        self.content.iter().filter_map(|b| match b {
            ContentBlock::ToolUse { id, name, input } => {
                Some((id.as_str(), name.as_str(), input))
            }
            _ => None,
        })
    }
}

// ---------------------------------------------------------------------------
// ModelClient trait
// ---------------------------------------------------------------------------

/// Trait implemented by every LLM backend.
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Run one completion and return the response envelope.
    async fn complete(&self, request: &CompletionRequest) -> anyhow::Result<ModelResponse>;
}

/// Check if an error carries the model API's oversized-context signature.
///
/// Mapped to HTTP 400 by the gateway so the user is asked to narrow the
/// request instead of seeing a server error.
pub fn is_prompt_too_long_error(err: &anyhow::Error) -> bool {
    err.to_string().contains("prompt is too long")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn tools_skipped_when_empty() {
        let req = CompletionRequest {
            model: "test-model".into(),
            system: None,
            messages: vec![ModelMessage::user("hi")],
            tools: Vec::new(),
            max_tokens: 100,
        };
        let v = serde_json::to_value(&req).unwrap();
        assert!(v.get("tools").is_none(), "empty tools must not be serialized");
        assert!(v.get("system").is_none());
    }

    #[test]
    fn tools_present_when_non_empty() {
        let req = CompletionRequest {
            model: "test-model".into(),
            system: Some("sys".into()),
            messages: vec![ModelMessage::user("hi")],
            tools: vec![ToolDefinition {
                name: "GMAIL_SEND_EMAIL".into(),
                description: "send".into(),
                input_schema: json!({"type": "object"}),
            }],
            max_tokens: 100,
        };
        let v = serde_json::to_value(&req).unwrap();
        assert_eq!(v["tools"].as_array().unwrap().len(), 1);
        assert_eq!(v["system"], "sys");
    }

    #[test]
    fn response_detects_tool_use() {
        let resp: ModelResponse = serde_json::from_value(json!({
            "content": [
                { "type": "text", "text": "Let me check." },
                { "type": "tool_use", "id": "tu_1", "name": "CANVAS_LIST_COURSES", "input": {} }
            ],
            "stop_reason": "tool_use"
        }))
        .unwrap();
        assert!(resp.has_tool_use());
        assert_eq!(resp.first_text(), "Let me check.");
        let uses: Vec<_> = resp.tool_uses().collect();
        assert_eq!(uses.len(), 1);
        assert_eq!(uses[0].1, "CANVAS_LIST_COURSES");
    }

    #[test]
    fn response_without_tool_use() {
        let resp = ModelResponse::from_text("Hello!");
        assert!(!resp.has_tool_use());
        assert_eq!(resp.first_text(), "Hello!");
    }

    #[test]
    fn message_content_untagged_roundtrip() {
        // History entries from the UI come in as plain strings.
        let m: ModelMessage =
            serde_json::from_value(json!({ "role": "user", "content": "what's due?" })).unwrap();
        assert_eq!(m.text(), "what's due?");

        // Structured assistant turns carry blocks.
        let m: ModelMessage = serde_json::from_value(json!({
            "role": "assistant",
            "content": [{ "type": "text", "text": "Nothing today." }]
        }))
        .unwrap();
        assert_eq!(m.text(), "Nothing today.");
    }

    #[test]
    fn prompt_too_long_signature() {
        let err = anyhow::anyhow!("model API returned 400: prompt is too long: 210000 tokens");
        assert!(is_prompt_too_long_error(&err));
        let err = anyhow::anyhow!("model API returned 500: internal");
        assert!(!is_prompt_too_long_error(&err));
    }
}
