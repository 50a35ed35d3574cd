use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::transport::{post_json_with_retries, RetryPolicy};
use crate::{ChatRequest, ChatResponse, ChatUsage, LlmClient, Message, MessageRole, WeftAiError};

#[derive(Debug, Clone)]
/// Connection and retry settings for the Gemini `generateContent` API.
pub struct GoogleConfig {
    pub api_base: String,
    pub api_key: String,
    pub request_timeout_ms: u64,
    pub max_retries: usize,
    pub retry_budget_ms: u64,
    pub retry_jitter: bool,
}

#[derive(Debug, Clone)]
/// `LlmClient` backed by Google Gemini.
pub struct GoogleClient {
    client: reqwest::Client,
    config: GoogleConfig,
}

impl GoogleClient {
    pub fn new(config: GoogleConfig) -> Result<Self, WeftAiError> {
        if config.api_key.trim().is_empty() {
            return Err(WeftAiError::MissingApiKey);
        }

        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_millis(
                config.request_timeout_ms.max(1),
            ))
            .build()?;

        Ok(Self { client, config })
    }

    fn generate_content_url(&self, model: &str) -> String {
        let base = self.config.api_base.trim_end_matches('/');
        if base.contains(":generateContent") {
            return base.replace("{model}", model);
        }

        format!("{base}/models/{model}:generateContent")
    }

    fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.config.max_retries,
            retry_budget_ms: self.config.retry_budget_ms,
            retry_jitter: self.config.retry_jitter,
        }
    }
}

#[async_trait]
impl LlmClient for GoogleClient {
    #[tracing::instrument(
        name = "weft_ai.google.complete",
        skip(self, request),
        fields(model = %request.model, messages = request.messages.len())
    )]
    async fn complete(&self, request: ChatRequest) -> Result<ChatResponse, WeftAiError> {
        let body = build_generate_content_body(&request);
        let url = self.generate_content_url(&request.model);
        let raw = post_json_with_retries(
            &self.client,
            &url,
            &[("key", self.config.api_key.trim())],
            &body,
            self.retry_policy(),
        )
        .await?;
        parse_generate_content_response(&raw)
    }
}

fn build_generate_content_body(request: &ChatRequest) -> Value {
    let system = request
        .messages
        .iter()
        .filter(|message| message.role == MessageRole::System)
        .map(|message| message.content.as_str())
        .filter(|text| !text.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n\n");
    let contents = request
        .messages
        .iter()
        .filter(|message| !message.content.trim().is_empty())
        .filter_map(|message| {
            let role = match message.role {
                MessageRole::System => return None,
                MessageRole::User => "user",
                MessageRole::Assistant => "model",
            };
            Some(json!({
                "role": role,
                "parts": [{ "text": message.content }],
            }))
        })
        .collect::<Vec<_>>();

    let mut body = json!({
        "contents": contents,
    });

    if !system.is_empty() {
        body["systemInstruction"] = json!({
            "parts": [{ "text": system }],
        });
    }

    if request.temperature.is_some() || request.max_tokens.is_some() {
        let mut generation_config = json!({});
        if let Some(temperature) = request.temperature {
            generation_config["temperature"] = json!(temperature);
        }
        if let Some(max_tokens) = request.max_tokens {
            generation_config["maxOutputTokens"] = json!(max_tokens);
        }
        body["generationConfig"] = generation_config;
    }

    body
}

fn parse_generate_content_response(raw: &str) -> Result<ChatResponse, WeftAiError> {
    let parsed: GenerateContentResponse = serde_json::from_str(raw)?;
    let candidate = parsed
        .candidates
        .and_then(|candidates| candidates.into_iter().next())
        .ok_or_else(|| {
            WeftAiError::InvalidResponse("response contained no candidates".to_string())
        })?;

    let text = candidate
        .content
        .and_then(|content| content.parts)
        .unwrap_or_default()
        .into_iter()
        .filter_map(|part| part.text)
        .collect::<String>();

    let usage = parsed
        .usage_metadata
        .map(|usage| ChatUsage {
            input_tokens: usage.prompt_token_count.unwrap_or(0),
            output_tokens: usage.candidates_token_count.unwrap_or(0),
            total_tokens: usage.total_token_count.unwrap_or(0),
        })
        .unwrap_or_default();

    Ok(ChatResponse {
        message: Message::assistant(text),
        finish_reason: candidate.finish_reason,
        usage,
    })
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    candidates: Option<Vec<GenerateContentCandidate>>,
    #[serde(rename = "usageMetadata")]
    usage_metadata: Option<GenerateContentUsage>,
}

#[derive(Debug, Deserialize)]
struct GenerateContentCandidate {
    content: Option<GenerateContentBody>,
    #[serde(rename = "finishReason")]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GenerateContentBody {
    parts: Option<Vec<GenerateContentPart>>,
}

#[derive(Debug, Deserialize)]
struct GenerateContentPart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GenerateContentUsage {
    #[serde(rename = "promptTokenCount")]
    prompt_token_count: Option<u64>,
    #[serde(rename = "candidatesTokenCount")]
    candidates_token_count: Option<u64>,
    #[serde(rename = "totalTokenCount")]
    total_token_count: Option<u64>,
}
