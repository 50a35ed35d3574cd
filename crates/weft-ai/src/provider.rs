use std::{fmt, str::FromStr};

use thiserror::Error;

pub const DEFAULT_GOOGLE_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_OPENAI_API_BASE: &str = "https://api.openai.com/v1";
pub const DEFAULT_OPENROUTER_API_BASE: &str = "https://openrouter.ai/api/v1";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Generation backends understood by the CLI model flag.
pub enum Provider {
    OpenAi,
    OpenRouter,
    Google,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::OpenAi => "openai",
            Provider::OpenRouter => "openrouter",
            Provider::Google => "google",
        }
    }

    /// Default API base used when no explicit override is configured.
    pub fn default_api_base(&self) -> &'static str {
        match self {
            Provider::OpenAi => DEFAULT_OPENAI_API_BASE,
            Provider::OpenRouter => DEFAULT_OPENROUTER_API_BASE,
            Provider::Google => DEFAULT_GOOGLE_API_BASE,
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ModelRefParseError {
    #[error("missing model identifier")]
    MissingModel,
    #[error("unsupported provider '{0}'. Supported providers: google (gemini alias), openai, openrouter")]
    UnsupportedProvider(String),
}

impl FromStr for Provider {
    type Err = ModelRefParseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "openai" => Ok(Provider::OpenAi),
            "openrouter" => Ok(Provider::OpenRouter),
            "google" | "gemini" => Ok(Provider::Google),
            _ => Err(ModelRefParseError::UnsupportedProvider(value.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// A `provider/model` pair such as `google/gemini-pro`.
pub struct ModelRef {
    pub provider: Provider,
    pub model: String,
}

impl ModelRef {
    /// Parses `provider/model`; a bare model name is treated as a Google model.
    pub fn parse(input: &str) -> Result<Self, ModelRefParseError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(ModelRefParseError::MissingModel);
        }

        if let Some((provider, model)) = trimmed.split_once('/') {
            let model = model.trim();
            if model.is_empty() {
                return Err(ModelRefParseError::MissingModel);
            }

            return Ok(Self {
                provider: Provider::from_str(provider)?,
                model: model.to_string(),
            });
        }

        Ok(Self {
            provider: Provider::Google,
            model: trimmed.to_string(),
        })
    }
}
