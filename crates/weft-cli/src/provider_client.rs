use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use weft_ai::{
    GoogleClient, GoogleConfig, LlmClient, ModelRef, OpenAiClient, OpenAiConfig, Provider,
};

use crate::cli_args::Cli;

pub(crate) fn provider_api_key_candidates(
    provider: Provider,
    api_key: Option<String>,
) -> Vec<(&'static str, Option<String>)> {
    let mut candidates = vec![("--api-key", api_key)];
    let env_names: &[&'static str] = match provider {
        Provider::Google => &["GEMINI_API_KEY", "GOOGLE_API_KEY"],
        Provider::OpenAi => &["OPENAI_API_KEY"],
        Provider::OpenRouter => &["OPENROUTER_API_KEY", "OPENAI_API_KEY"],
    };
    for &name in env_names {
        candidates.push((name, std::env::var(name).ok()));
    }
    candidates
}

/// Returns the first candidate that is set and not blank, with its source label.
pub(crate) fn resolve_api_key(
    candidates: Vec<(&'static str, Option<String>)>,
) -> Option<(&'static str, String)> {
    candidates.into_iter().find_map(|(source, value)| {
        value
            .filter(|value| !value.trim().is_empty())
            .map(|value| (source, value))
    })
}

pub(crate) fn build_provider_client(cli: &Cli, model_ref: &ModelRef) -> Result<Arc<dyn LlmClient>> {
    let provider = model_ref.provider;
    let (auth_source, api_key) =
        resolve_api_key(provider_api_key_candidates(provider, cli.api_key.clone())).ok_or_else(
            || {
                anyhow!(
                    "missing API key for provider '{}' (set --api-key or WEFT_API_KEY)",
                    provider.as_str()
                )
            },
        )?;
    let api_base = cli
        .api_base
        .clone()
        .unwrap_or_else(|| provider.default_api_base().to_string());
    tracing::debug!(
        provider = provider.as_str(),
        model = %model_ref.model,
        auth_source,
        api_base = %api_base,
        "building provider client"
    );

    match provider {
        Provider::Google => {
            let client = GoogleClient::new(GoogleConfig {
                api_base,
                api_key,
                request_timeout_ms: cli.request_timeout_ms.max(1),
                max_retries: cli.max_retries,
                retry_budget_ms: cli.retry_budget_ms,
                retry_jitter: cli.retry_jitter,
            })
            .context("failed to build google client")?;
            Ok(Arc::new(client))
        }
        Provider::OpenAi | Provider::OpenRouter => {
            let client = OpenAiClient::new(OpenAiConfig {
                api_base,
                api_key,
                organization: None,
                request_timeout_ms: cli.request_timeout_ms.max(1),
                max_retries: cli.max_retries,
                retry_budget_ms: cli.retry_budget_ms,
                retry_jitter: cli.retry_jitter,
            })
            .with_context(|| format!("failed to build {} client", provider.as_str()))?;
            Ok(Arc::new(client))
        }
    }
}
