use std::sync::Arc;

use async_trait::async_trait;
use weft_ai::{ChatRequest, LlmClient};

/// Text embedded in a partial result when generation fails.
pub const GENERATION_FAILED_MARKER: &str = "[Error: LLM call failed.]";

#[derive(Debug, Clone, PartialEq, Eq)]
/// Result of one generation call as seen by the fabric.
pub enum GenerationOutcome {
    Ok(String),
    Failed(String),
}

impl GenerationOutcome {
    /// Collapses the outcome into the text an agent contributes.
    pub fn into_text(self) -> String {
        match self {
            Self::Ok(text) => text,
            Self::Failed(_) => GENERATION_FAILED_MARKER.to_string(),
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

#[async_trait]
/// Opaque text generation collaborator used by agents.
pub trait Generator: Send + Sync {
    async fn generate(&self, prompt: &str) -> GenerationOutcome;
}

/// `Generator` backed by any `LlmClient`.
pub struct LlmGenerator {
    client: Arc<dyn LlmClient>,
    model: String,
    max_tokens: Option<u32>,
    temperature: Option<f32>,
}

impl LlmGenerator {
    pub fn new(client: Arc<dyn LlmClient>, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
            max_tokens: None,
            temperature: None,
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: Option<u32>) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: Option<f32>) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl Generator for LlmGenerator {
    #[tracing::instrument(
        name = "weft_fabric.generator.generate",
        skip(self, prompt),
        fields(model = %self.model, prompt_chars = prompt.chars().count())
    )]
    async fn generate(&self, prompt: &str) -> GenerationOutcome {
        let mut request = ChatRequest::single_prompt(self.model.as_str(), prompt);
        request.max_tokens = self.max_tokens;
        request.temperature = self.temperature;

        match self.client.complete(request).await {
            Ok(response) => GenerationOutcome::Ok(response.text().trim().to_string()),
            Err(error) => {
                tracing::warn!(model = %self.model, error = %error, "generation failed");
                GenerationOutcome::Failed(error.to_string())
            }
        }
    }
}
