// Integration test for the full tool-call loop
//
// Drives the real HTTP provider against a mock server: the model first
// requests a tool call, the dispatcher executes it, and the follow-up
// request carries the tool result back to the model.

use std::sync::Arc;
use std::time::Duration;

use mockito::Matcher;
use serde_json::json;

use mentat::chat::{ChatMessage, ChatService, ChatTurn, OpenAiProvider};
use mentat::config::Settings;
use mentat::tools::Toolbox;

#[tokio::test]
async fn test_tool_call_loop_against_mock_provider() {
    let mut server = mockito::Server::new_async().await;

    // Mocks match newest-first: the generic mock answers the first
    // request, the tool-result matcher answers the follow-up.
    let first = server
        .mock("POST", "/v1/chat/completions")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "choices": [{"message": {
                    "content": null,
                    "tool_calls": [{
                        "id": "call_1",
                        "type": "function",
                        "function": {
                            "name": "evaluate",
                            "arguments": "{\"expression\": \"6 * 7\"}"
                        }
                    }]
                }}]
            })
            .to_string(),
        )
        .create_async()
        .await;

    let second = server
        .mock("POST", "/v1/chat/completions")
        .match_body(Matcher::Regex("\"role\":\"tool\"".to_string()))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "choices": [{"message": {"content": "The product is 42."}}],
                "usage": {"prompt_tokens": 20, "completion_tokens": 6, "total_tokens": 26}
            })
            .to_string(),
        )
        .create_async()
        .await;

    let settings = Settings::default();
    let provider = OpenAiProvider::new("test-key".to_string(), Duration::from_secs(5))
        .expect("provider")
        .with_base_url(server.url());
    let toolbox = Arc::new(Toolbox::new(settings.clone()).expect("toolbox"));
    let service = ChatService::new(Arc::new(provider), toolbox, &settings);

    let reply = service
        .chat(ChatTurn::new(vec![ChatMessage::user("What is 6 times 7?")]))
        .await
        .expect("chat turn failed");

    first.assert_async().await;
    second.assert_async().await;

    assert_eq!(reply.content, "The product is 42.");
    assert_eq!(reply.tool_calls.len(), 1);
    assert_eq!(reply.tool_calls[0].name, "evaluate");
    assert!(reply.tool_calls[0].result.contains("42"));
    assert_eq!(reply.usage.expect("usage").total_tokens, 26);
}
