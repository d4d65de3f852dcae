use glove::errors::ProviderError;
use glove::models::message::Message;
use glove::providers::base::{Adapter, PromptRequest, PromptResponse, ProviderEvent};
use glove::providers::configs::OpenAiProviderConfig;
use glove::providers::factory::create_adapter;
use glove::providers::openai::OpenAiProvider;
use glove::providers::registry;
use serde_json::json;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Test harness driving a provider through the public adapter surface.
struct AdapterTester {
    adapter: Adapter,
}

impl AdapterTester {
    fn openai(host: String, streaming: bool) -> Self {
        let config = OpenAiProviderConfig::new(
            "OpenAI".to_string(),
            host,
            "test_api_key".to_string(),
            "gpt-4o-mini".to_string(),
        );
        let provider = OpenAiProvider::new(config).unwrap();
        let adapter = Adapter::new(
            registry::find("openai"),
            "gpt-4o-mini".to_string(),
            Box::new(provider),
            streaming,
            true,
        );
        Self { adapter }
    }

    async fn prompt(&self, request: PromptRequest) -> (PromptResponse, Vec<ProviderEvent>) {
        let mut events: Vec<ProviderEvent> = Vec::new();
        let mut notify = |event: ProviderEvent| events.push(event);
        let response = self
            .adapter
            .prompt(request, &mut notify, None)
            .await
            .expect("prompt should succeed");
        (response, events)
    }
}

#[tokio::test]
async fn test_sync_prompt_notifies_model_response() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{
                "message": { "role": "assistant", "content": "Here are your tables." }
            }],
            "usage": { "prompt_tokens": 8, "completion_tokens": 5, "total_tokens": 13 }
        })))
        .mount(&mock_server)
        .await;

    let tester = AdapterTester::openai(mock_server.uri(), false);
    let request = PromptRequest::new(vec![Message::user().with_text("Show me the schema")]);
    let (response, events) = tester.prompt(request).await;

    assert_eq!(response.message.text(), "Here are your tables.");
    assert_eq!(response.usage.total_tokens, Some(13));
    assert_eq!(events.len(), 1);
    assert!(matches!(events[0], ProviderEvent::ModelResponse { .. }));
}

#[tokio::test]
async fn test_streaming_prompt_delivers_deltas_then_completion() {
    let sse = concat!(
        "data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\"lo\"}}]}\n\n",
        "data: {\"choices\":[{\"delta\":{},\"finish_reason\":\"stop\"}],",
        "\"usage\":{\"prompt_tokens\":4,\"completion_tokens\":2}}\n\n",
        "data: [DONE]\n\n",
    );

    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(sse, "text/event-stream"))
        .mount(&mock_server)
        .await;

    let tester = AdapterTester::openai(mock_server.uri(), true);
    let request = PromptRequest::new(vec![Message::user().with_text("hi")]);
    let (response, events) = tester.prompt(request).await;

    let deltas: Vec<&str> = events
        .iter()
        .filter_map(|event| match event {
            ProviderEvent::TextDelta { text } => Some(text.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(deltas.join(""), "Hello");
    assert!(matches!(
        events.last(),
        Some(ProviderEvent::ModelResponseComplete { .. })
    ));
    assert_eq!(response.message.text(), "Hello");
    assert_eq!(response.usage.input_tokens, Some(4));
}

#[tokio::test]
async fn test_system_prompt_is_consulted_on_next_prompt() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_string_contains("You are Glove, a database assistant."))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{ "message": { "content": "ok" } }],
            "usage": { "prompt_tokens": 1, "completion_tokens": 1 }
        })))
        .mount(&mock_server)
        .await;

    let tester = AdapterTester::openai(mock_server.uri(), false);
    tester
        .adapter
        .set_system_prompt("You are Glove, a database assistant.");

    let (response, _) = tester
        .prompt(PromptRequest::new(vec![Message::user().with_text("hi")]))
        .await;
    assert_eq!(response.message.text(), "ok");
}

#[tokio::test]
async fn test_prompt_without_api_key_fails_before_network() {
    let adapter = create_adapter("openai", "", None, None, true).unwrap();

    let mut events: Vec<ProviderEvent> = Vec::new();
    let mut notify = |event: ProviderEvent| events.push(event);
    let result = adapter
        .prompt(
            PromptRequest::new(vec![Message::user().with_text("hi")]),
            &mut notify,
            None,
        )
        .await;

    match result {
        Err(ProviderError::MissingApiKey(provider)) => assert_eq!(provider, "OpenAI"),
        other => panic!("Expected MissingApiKey, got {:?}", other.map(|r| r.message)),
    }
    assert!(events.is_empty());
}
