// Unified request/response types for LLM providers
//
// These abstract over provider-specific wire formats so the tool-call
// loop can work with a single interface.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::tools::ToolDefinition;

/// One role-tagged conversation message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,

    /// Tool calls requested by the assistant (assistant messages only)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallRequest>,

    /// Which requested call this message answers (tool messages only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self::plain("system", content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::plain("user", content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::plain("assistant", content)
    }

    pub fn assistant_with_tools(content: impl Into<String>, tool_calls: Vec<ToolCallRequest>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
            tool_calls,
            tool_call_id: None,
        }
    }

    pub fn tool_response(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: "tool".to_string(),
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: Some(tool_call_id.into()),
        }
    }

    fn plain(role: &str, content: impl Into<String>) -> Self {
        Self {
            role: role.to_string(),
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }
}

/// One tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

/// Request to an LLM provider.
#[derive(Debug, Clone, Serialize)]
pub struct ProviderRequest {
    pub messages: Vec<ChatMessage>,
    pub model: String,
    pub max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ToolDefinition>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

impl ProviderRequest {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            model: String::new(),
            max_tokens: 4096,
            tools: None,
            temperature: None,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tools = Some(tools);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

/// Token usage counters, when the provider reports them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

/// Response from an LLM provider.
#[derive(Debug, Clone)]
pub struct ProviderResponse {
    pub content: String,
    /// Requested tool calls, in the order the model issued them. May be
    /// empty.
    pub tool_calls: Vec<ToolCallRequest>,
    pub usage: Option<Usage>,
}

impl ProviderResponse {
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

/// Trait for LLM providers.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// Send the conversation and wait for a complete response.
    async fn complete(&self, request: &ProviderRequest) -> Result<ProviderResponse>;

    /// Provider name (e.g. "openai")
    fn name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_tool_response_message() {
        let message = ChatMessage::tool_response("call_1", "42");
        assert_eq!(message.role, "tool");
        assert_eq!(message.tool_call_id.as_deref(), Some("call_1"));
        assert_eq!(message.content, "42");
    }

    #[test]
    fn test_plain_message_serialization_omits_tool_fields() {
        let text = serde_json::to_string(&ChatMessage::user("hi")).unwrap();
        assert!(!text.contains("tool_calls"));
        assert!(!text.contains("tool_call_id"));
    }

    #[test]
    fn test_request_builder() {
        let request = ProviderRequest::new(vec![ChatMessage::user("hi")])
            .with_model("gpt-4o")
            .with_temperature(0.2);
        assert_eq!(request.model, "gpt-4o");
        assert_eq!(request.temperature, Some(0.2));
        assert!(request.tools.is_none());
    }

    #[test]
    fn test_has_tool_calls() {
        let response = ProviderResponse {
            content: String::new(),
            tool_calls: vec![ToolCallRequest {
                id: "call_1".to_string(),
                name: "evaluate".to_string(),
                arguments: json!({"expression": "1+1"}),
            }],
            usage: None,
        };
        assert!(response.has_tool_calls());
    }
}
