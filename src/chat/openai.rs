// OpenAI-compatible provider implementation
//
// Works against any endpoint speaking the chat-completions wire format.
// The base URL is configurable so tests can point it at a local mock and
// deployments at self-hosted model servers.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::provider::{
    ChatMessage, ChatProvider, ProviderRequest, ProviderResponse, ToolCallRequest, Usage,
};

const DEFAULT_BASE_URL: &str = "https://api.openai.com";

pub struct OpenAiProvider {
    client: Client,
    api_key: String,
    base_url: String,
    default_model: String,
}

impl OpenAiProvider {
    pub fn new(api_key: String, request_timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .context("failed to create HTTP client")?;
        Ok(Self {
            client,
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
            default_model: "gpt-4o".to_string(),
        })
    }

    /// Point the provider at a different endpoint (mock server, vLLM, ...).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_default_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = model.into();
        self
    }

    fn to_wire_request(&self, request: &ProviderRequest) -> WireRequest {
        let model = if request.model.is_empty() {
            self.default_model.clone()
        } else {
            request.model.clone()
        };

        let messages = request.messages.iter().map(to_wire_message).collect();

        let tools = request.tools.as_ref().map(|definitions| {
            definitions
                .iter()
                .map(|tool| WireTool {
                    tool_type: "function".to_string(),
                    function: WireFunction {
                        name: tool.name.clone(),
                        description: tool.description.clone(),
                        parameters: serde_json::to_value(&tool.input_schema)
                            .unwrap_or_else(|_| serde_json::json!({})),
                    },
                })
                .collect()
        });

        WireRequest {
            model,
            messages,
            max_tokens: Some(request.max_tokens),
            temperature: request.temperature,
            tools,
        }
    }
}

#[async_trait]
impl ChatProvider for OpenAiProvider {
    async fn complete(&self, request: &ProviderRequest) -> Result<ProviderResponse> {
        let wire_request = self.to_wire_request(request);
        let url = format!("{}/v1/chat/completions", self.base_url);

        tracing::debug!(model = %wire_request.model, "sending chat-completions request");

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("content-type", "application/json")
            .json(&wire_request)
            .send()
            .await
            .context("failed to send request to the LLM provider")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!(
                "LLM provider request failed\n\nStatus: {}\nBody: {}",
                status,
                body
            );
        }

        let wire_response: WireResponse = response
            .json()
            .await
            .context("failed to parse the LLM provider response")?;

        from_wire_response(wire_response)
    }

    fn name(&self) -> &str {
        "openai"
    }
}

fn to_wire_message(message: &ChatMessage) -> WireMessage {
    let tool_calls = if message.tool_calls.is_empty() {
        None
    } else {
        Some(
            message
                .tool_calls
                .iter()
                .map(|call| WireToolCall {
                    id: call.id.clone(),
                    tool_type: "function".to_string(),
                    function: WireCallFunction {
                        name: call.name.clone(),
                        arguments: call.arguments.to_string(),
                    },
                })
                .collect(),
        )
    };

    WireMessage {
        role: message.role.clone(),
        content: Some(message.content.clone()),
        tool_calls,
        tool_call_id: message.tool_call_id.clone(),
    }
}

fn from_wire_response(response: WireResponse) -> Result<ProviderResponse> {
    let choice = response
        .choices
        .into_iter()
        .next()
        .context("LLM provider returned no choices")?;

    let content = choice.message.content.unwrap_or_default();

    let tool_calls = choice
        .message
        .tool_calls
        .unwrap_or_default()
        .into_iter()
        .filter(|call| call.tool_type == "function")
        .map(|call| {
            // Arguments arrive as a JSON string; a malformed payload
            // becomes an empty object rather than a transport failure
            let arguments = serde_json::from_str(&call.function.arguments)
                .unwrap_or_else(|_| serde_json::json!({}));
            ToolCallRequest {
                id: call.id,
                name: call.function.name,
                arguments,
            }
        })
        .collect();

    Ok(ProviderResponse {
        content,
        tool_calls,
        usage: response.usage,
    })
}

// OpenAI wire types

#[derive(Debug, Clone, Serialize)]
struct WireRequest {
    model: String,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<WireTool>>,
}

#[derive(Debug, Clone, Serialize)]
struct WireMessage {
    role: String,
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<WireToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
struct WireTool {
    #[serde(rename = "type")]
    tool_type: String,
    function: WireFunction,
}

#[derive(Debug, Clone, Serialize)]
struct WireFunction {
    name: String,
    description: String,
    parameters: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct WireToolCall {
    id: String,
    #[serde(rename = "type")]
    tool_type: String,
    function: WireCallFunction,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct WireCallFunction {
    name: String,
    arguments: String, // JSON string
}

#[derive(Debug, Clone, Deserialize)]
struct WireResponse {
    choices: Vec<WireChoice>,
    usage: Option<Usage>,
}

#[derive(Debug, Clone, Deserialize)]
struct WireChoice {
    message: WireResponseMessage,
}

#[derive(Debug, Clone, Deserialize)]
struct WireResponseMessage {
    content: Option<String>,
    tool_calls: Option<Vec<WireToolCall>>,
}
