use httpmock::prelude::*;
use serde_json::json;
use weft_ai::{
    ChatRequest, GoogleClient, GoogleConfig, LlmClient, Message, OpenAiClient, OpenAiConfig,
    WeftAiError,
};

fn google_config(base_url: String, max_retries: usize) -> GoogleConfig {
    GoogleConfig {
        api_base: base_url,
        api_key: "test-google-key".to_string(),
        request_timeout_ms: 5_000,
        max_retries,
        retry_budget_ms: 0,
        retry_jitter: false,
    }
}

#[tokio::test]
async fn google_client_sends_expected_http_request() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(POST)
            .path("/v1beta/models/gemini-pro:generateContent")
            .query_param("key", "test-google-key")
            .header_exists("x-weft-request-id")
            .header("x-weft-retry-attempt", "0")
            .json_body_includes(
                json!({
                    "contents": [{"role": "user", "parts": [{"text": "Your Role: billing"}]}]
                })
                .to_string(),
            );
        then.status(200).json_body(json!({
            "candidates": [{
                "content": {"parts": [{"text": "  refund approved  "}]},
                "finishReason": "STOP"
            }],
            "usageMetadata": {"promptTokenCount": 5, "candidatesTokenCount": 2, "totalTokenCount": 7}
        }));
    });

    let client = GoogleClient::new(google_config(format!("{}/v1beta", server.base_url()), 2))
        .expect("google client should be created");
    let response = client
        .complete(ChatRequest::single_prompt("gemini-pro", "Your Role: billing"))
        .await
        .expect("google completion should succeed");

    mock.assert();
    assert_eq!(response.text(), "  refund approved  ");
    assert_eq!(response.usage.total_tokens, 7);
}

#[tokio::test]
async fn integration_google_client_retries_transient_status_until_exhausted() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(POST)
            .path("/v1beta/models/gemini-pro:generateContent");
        then.status(503).body("overloaded");
    });

    let client = GoogleClient::new(google_config(format!("{}/v1beta", server.base_url()), 2))
        .expect("google client should be created");
    let error = client
        .complete(ChatRequest::single_prompt("gemini-pro", "hello"))
        .await
        .expect_err("persistent 503 must fail");

    mock.assert_hits(3);
    match error {
        WeftAiError::HttpStatus { status, body } => {
            assert_eq!(status, 503);
            assert_eq!(body, "overloaded");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn regression_google_client_does_not_retry_client_errors() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(POST)
            .path("/v1beta/models/gemini-pro:generateContent");
        then.status(400).body("bad request");
    });

    let client = GoogleClient::new(google_config(format!("{}/v1beta", server.base_url()), 3))
        .expect("google client should be created");
    let error = client
        .complete(ChatRequest::single_prompt("gemini-pro", "hello"))
        .await
        .expect_err("400 must fail");

    mock.assert_hits(1);
    assert!(matches!(error, WeftAiError::HttpStatus { status: 400, .. }));
}

#[test]
fn unit_clients_reject_blank_api_keys() {
    let google = GoogleClient::new(GoogleConfig {
        api_key: "   ".to_string(),
        ..google_config("http://localhost".to_string(), 0)
    });
    assert!(matches!(google, Err(WeftAiError::MissingApiKey)));

    let openai = OpenAiClient::new(OpenAiConfig {
        api_base: "http://localhost".to_string(),
        api_key: String::new(),
        organization: None,
        request_timeout_ms: 1_000,
        max_retries: 0,
        retry_budget_ms: 0,
        retry_jitter: false,
    });
    assert!(matches!(openai, Err(WeftAiError::MissingApiKey)));
}

#[tokio::test]
async fn openai_client_sends_bearer_auth_and_messages() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(POST)
            .path("/v1/chat/completions")
            .header("authorization", "Bearer test-openai-key")
            .header_exists("x-weft-request-id")
            .json_body_includes(
                json!({
                    "model": "gpt-4o-mini",
                    "messages": [{"role": "system"}, {"role": "user"}]
                })
                .to_string(),
            );
        then.status(200).json_body(json!({
            "choices": [{"message": {"content": "openai ok"}, "finish_reason": "stop"}],
            "usage": {"prompt_tokens": 5, "completion_tokens": 3, "total_tokens": 8}
        }));
    });

    let client = OpenAiClient::new(OpenAiConfig {
        api_base: format!("{}/v1", server.base_url()),
        api_key: "test-openai-key".to_string(),
        organization: None,
        request_timeout_ms: 5_000,
        max_retries: 0,
        retry_budget_ms: 0,
        retry_jitter: false,
    })
    .expect("openai client should be created");

    let request = ChatRequest {
        model: "gpt-4o-mini".to_string(),
        messages: vec![Message::system("system"), Message::user("hello")],
        max_tokens: Some(128),
        temperature: Some(0.0),
    };
    let response = client
        .complete(request)
        .await
        .expect("openai completion should succeed");

    mock.assert();
    assert_eq!(response.text(), "openai ok");
    assert_eq!(response.usage.total_tokens, 8);
}
