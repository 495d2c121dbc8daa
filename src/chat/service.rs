// Chat service: the tool-call loop controller
//
// One `chat` call walks the states awaiting-model -> processing-tool-calls
// -> done: send the conversation, dispatch every requested tool call,
// append the results, and repeat. The round bound caps how long a provider
// that keeps requesting tools can grow the conversation.

use std::sync::Arc;

use anyhow::{Context, Result};
use futures::future::join_all;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::config::Settings;
use crate::tools::Toolbox;

use super::provider::{ChatMessage, ChatProvider, ProviderRequest, Usage};

/// System prompt for the math-assistant persona.
pub const SYSTEM_PROMPT: &str = "\
You are an expert mathematics assistant.

Rules:
1. Always render math using LaTeX (wrap inline math in $...$ and display math in $$...$$).
2. When you write code, use fenced code blocks with the language tag.
3. You have access to computational tools (parse_expression, simplify, solve,
   differentiate, integrate, evaluate, exec_script, compare_answers, and more).
   Use them for verified computation instead of doing arithmetic yourself.
4. When you use exec_script, include the code in your response inside a fenced
   code block so the user can see what was computed.
5. After using a tool, incorporate its result naturally into your response.
6. If a problem is ambiguous, state your assumptions clearly.
7. Be concise but thorough. Show key steps in your mathematical reasoning.
";

/// Incoming conversation turn.
#[derive(Debug, Clone)]
pub struct ChatTurn {
    pub messages: Vec<ChatMessage>,
    pub use_tools: bool,
}

impl ChatTurn {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            use_tools: true,
        }
    }
}

/// Final answer plus the observability list of executed tool calls.
#[derive(Debug, Clone, Serialize)]
pub struct ChatReply {
    pub id: String,
    pub content: String,
    pub tool_calls: Vec<ToolCallRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

/// One executed tool call, recorded regardless of success or failure.
#[derive(Debug, Clone, Serialize)]
pub struct ToolCallRecord {
    pub name: String,
    pub arguments: Value,
    pub result: String,
}

/// Drives the conversation with the LLM provider.
pub struct ChatService {
    provider: Arc<dyn ChatProvider>,
    toolbox: Arc<Toolbox>,
    model: String,
    max_tool_rounds: usize,
}

impl ChatService {
    pub fn new(provider: Arc<dyn ChatProvider>, toolbox: Arc<Toolbox>, settings: &Settings) -> Self {
        Self {
            provider,
            toolbox,
            model: settings.model.clone(),
            max_tool_rounds: settings.max_tool_rounds,
        }
    }

    /// Run one conversation turn to completion.
    ///
    /// Only provider transport failures propagate as errors; every tool
    /// failure is reported back into the conversation as a structured
    /// result.
    #[instrument(skip_all, fields(provider = %self.provider.name()))]
    pub async fn chat(&self, turn: ChatTurn) -> Result<ChatReply> {
        let mut messages = vec![ChatMessage::system(SYSTEM_PROMPT)];
        messages.extend(turn.messages);

        let tools = turn
            .use_tools
            .then(|| self.toolbox.definitions());

        let mut records: Vec<ToolCallRecord> = Vec::new();
        let mut last_content = String::new();
        let mut usage: Option<Usage> = None;

        for round in 0..self.max_tool_rounds {
            let mut request =
                ProviderRequest::new(messages.clone()).with_model(self.model.clone());
            if let Some(tools) = tools.clone() {
                request = request.with_tools(tools);
            }

            let response = self
                .provider
                .complete(&request)
                .await
                .context("LLM provider request failed")?;

            last_content = response.content.clone();
            if response.usage.is_some() {
                usage = response.usage.clone();
            }

            if !response.has_tool_calls() {
                return Ok(self.reply(last_content, records, usage));
            }

            debug!(round, count = response.tool_calls.len(), "processing tool calls");
            messages.push(ChatMessage::assistant_with_tools(
                &response.content,
                response.tool_calls.clone(),
            ));

            // Dispatch concurrently; join_all preserves request order, so
            // results are appended exactly as the calls were issued.
            let outcomes = join_all(
                response
                    .tool_calls
                    .iter()
                    .map(|call| self.toolbox.dispatch(&call.name, &call.arguments)),
            )
            .await;

            for (call, outcome) in response.tool_calls.iter().zip(outcomes) {
                let rendered = outcome.render();
                records.push(ToolCallRecord {
                    name: call.name.clone(),
                    arguments: call.arguments.clone(),
                    result: rendered.clone(),
                });
                messages.push(ChatMessage::tool_response(&call.id, rendered));
            }
        }

        warn!(
            rounds = self.max_tool_rounds,
            "tool-call loop hit the round limit; returning last available content"
        );
        Ok(self.reply(last_content, records, usage))
    }

    fn reply(
        &self,
        content: String,
        tool_calls: Vec<ToolCallRecord>,
        usage: Option<Usage>,
    ) -> ChatReply {
        ChatReply {
            id: Uuid::new_v4().to_string(),
            content,
            tool_calls,
            usage,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::provider::{ProviderResponse, ToolCallRequest};
    use anyhow::bail;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    fn service(provider: Arc<dyn ChatProvider>) -> ChatService {
        let settings = Settings::default();
        let toolbox = Arc::new(Toolbox::new(settings.clone()).expect("toolbox"));
        ChatService::new(provider, toolbox, &settings)
    }

    /// Stub that replays a scripted sequence of responses and records every
    /// request it sees.
    struct ScriptedProvider {
        responses: Mutex<Vec<ProviderResponse>>,
        requests: Mutex<Vec<ProviderRequest>>,
        calls: AtomicUsize,
    }

    impl ScriptedProvider {
        fn new(mut responses: Vec<ProviderResponse>) -> Self {
            responses.reverse();
            Self {
                responses: Mutex::new(responses),
                requests: Mutex::new(Vec::new()),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl ChatProvider for ScriptedProvider {
        async fn complete(&self, request: &ProviderRequest) -> Result<ProviderResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.requests.lock().unwrap().push(request.clone());
            match self.responses.lock().unwrap().pop() {
                Some(response) => Ok(response),
                None => Ok(ProviderResponse {
                    content: "done".to_string(),
                    tool_calls: Vec::new(),
                    usage: None,
                }),
            }
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    fn tool_call(id: &str, name: &str, arguments: Value) -> ToolCallRequest {
        ToolCallRequest {
            id: id.to_string(),
            name: name.to_string(),
            arguments,
        }
    }

    fn tool_round(calls: Vec<ToolCallRequest>) -> ProviderResponse {
        ProviderResponse {
            content: String::new(),
            tool_calls: calls,
            usage: None,
        }
    }

    #[tokio::test]
    async fn test_no_tool_calls_returns_immediately() {
        let provider = Arc::new(ScriptedProvider::new(vec![ProviderResponse {
            content: "just an answer".to_string(),
            tool_calls: Vec::new(),
            usage: Some(Usage {
                prompt_tokens: 1,
                completion_tokens: 2,
                total_tokens: 3,
            }),
        }]));
        let reply = service(provider.clone())
            .chat(ChatTurn::new(vec![ChatMessage::user("hi")]))
            .await
            .unwrap();

        assert_eq!(reply.content, "just an answer");
        assert!(reply.tool_calls.is_empty());
        assert_eq!(reply.usage.unwrap().total_tokens, 3);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_tool_round_then_answer() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            tool_round(vec![tool_call(
                "call_1",
                "evaluate",
                json!({"expression": "2+2"}),
            )]),
            ProviderResponse {
                content: "the result is 4".to_string(),
                tool_calls: Vec::new(),
                usage: None,
            },
        ]));
        let reply = service(provider.clone())
            .chat(ChatTurn::new(vec![ChatMessage::user("2+2?")]))
            .await
            .unwrap();

        assert_eq!(reply.content, "the result is 4");
        assert_eq!(reply.tool_calls.len(), 1);
        assert_eq!(reply.tool_calls[0].name, "evaluate");
        assert!(reply.tool_calls[0].result.contains('4'));

        // The second request must carry the tool response message
        let requests = provider.requests.lock().unwrap();
        let last = &requests[1].messages;
        let tool_message = last.iter().find(|m| m.role == "tool").unwrap();
        assert_eq!(tool_message.tool_call_id.as_deref(), Some("call_1"));
    }

    #[tokio::test]
    async fn test_loop_terminates_at_round_bound() {
        // A provider that requests a tool call every single round
        let rounds: Vec<ProviderResponse> = (0..20)
            .map(|i| {
                tool_round(vec![tool_call(
                    &format!("call_{}", i),
                    "evaluate",
                    json!({"expression": "1+1"}),
                )])
            })
            .collect();
        let provider = Arc::new(ScriptedProvider::new(rounds));

        let reply = service(provider.clone())
            .chat(ChatTurn::new(vec![ChatMessage::user("loop!")]))
            .await
            .unwrap();

        let expected_rounds = Settings::default().max_tool_rounds;
        assert_eq!(provider.calls.load(Ordering::SeqCst), expected_rounds);
        assert_eq!(reply.tool_calls.len(), expected_rounds);
        // Last available content (empty here) rather than an error
        assert_eq!(reply.content, "");
    }

    #[tokio::test]
    async fn test_results_appended_in_request_order() {
        let provider = Arc::new(ScriptedProvider::new(vec![tool_round(vec![
            tool_call("call_a", "evaluate", json!({"expression": "1+1"})),
            tool_call("call_b", "evaluate", json!({"expression": "2+2"})),
            tool_call("call_c", "__nonexistent__", json!({})),
            tool_call("call_d", "evaluate", json!({"expression": "3+3"})),
        ])]));

        let reply = service(provider.clone())
            .chat(ChatTurn::new(vec![ChatMessage::user("go")]))
            .await
            .unwrap();

        let names: Vec<&str> = reply.tool_calls.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["evaluate", "evaluate", "__nonexistent__", "evaluate"]
        );
        assert!(reply.tool_calls[2].result.contains("unknown tool"));

        // Conversation order matches request order
        let requests = provider.requests.lock().unwrap();
        let tool_ids: Vec<String> = requests[1]
            .messages
            .iter()
            .filter(|m| m.role == "tool")
            .filter_map(|m| m.tool_call_id.clone())
            .collect();
        assert_eq!(tool_ids, vec!["call_a", "call_b", "call_c", "call_d"]);
    }

    #[tokio::test]
    async fn test_failed_tool_call_is_recorded() {
        let provider = Arc::new(ScriptedProvider::new(vec![tool_round(vec![tool_call(
            "call_1",
            "solve",
            json!({"expression": "x^2 + 1 = 0"}),
        )])]));

        let reply = service(provider)
            .chat(ChatTurn::new(vec![ChatMessage::user("solve it")]))
            .await
            .unwrap();

        assert_eq!(reply.tool_calls.len(), 1);
        assert!(reply.tool_calls[0].result.starts_with("Error:"));
    }

    struct FailingProvider;

    #[async_trait]
    impl ChatProvider for FailingProvider {
        async fn complete(&self, _request: &ProviderRequest) -> Result<ProviderResponse> {
            bail!("connection refused")
        }

        fn name(&self) -> &str {
            "failing"
        }
    }

    #[tokio::test]
    async fn test_provider_failure_propagates() {
        let reply = service(Arc::new(FailingProvider))
            .chat(ChatTurn::new(vec![ChatMessage::user("hi")]))
            .await;
        assert!(reply.is_err());
    }

    #[tokio::test]
    async fn test_tools_disabled_sends_no_schema() {
        let provider = Arc::new(ScriptedProvider::new(vec![ProviderResponse {
            content: "ok".to_string(),
            tool_calls: Vec::new(),
            usage: None,
        }]));
        let mut turn = ChatTurn::new(vec![ChatMessage::user("hi")]);
        turn.use_tools = false;

        service(provider.clone()).chat(turn).await.unwrap();
        let requests = provider.requests.lock().unwrap();
        assert!(requests[0].tools.is_none());
    }
}
