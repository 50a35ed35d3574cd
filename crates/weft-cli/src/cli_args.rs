use std::path::PathBuf;

use clap::{ArgAction, Parser};

fn parse_positive_u64(value: &str) -> Result<u64, String> {
    let parsed = value
        .parse::<u64>()
        .map_err(|error| format!("failed to parse integer: {error}"))?;
    if parsed == 0 {
        return Err("value must be greater than 0".to_string());
    }
    Ok(parsed)
}

fn parse_temperature(value: &str) -> Result<f32, String> {
    let parsed = value
        .parse::<f32>()
        .map_err(|error| format!("failed to parse float: {error}"))?;
    if !parsed.is_finite() || !(0.0..=2.0).contains(&parsed) {
        return Err("value must be a finite number in range 0.0..=2.0".to_string());
    }
    Ok(parsed)
}

#[derive(Debug, Parser)]
#[command(
    name = "weft",
    about = "Route a query through an agent fabric and print the joined answer",
    version
)]
pub(crate) struct Cli {
    #[arg(
        long,
        env = "WEFT_MANIFEST",
        help = "Fabric manifest (JSON) declaring vaults, agents, and selection rules"
    )]
    pub(crate) manifest: PathBuf,

    #[arg(long, help = "Natural-language query to route through the fabric")]
    pub(crate) query: String,

    #[arg(
        long,
        env = "WEFT_MODEL",
        default_value = "google/gemini-pro",
        help = "Model in provider/model format. Supported providers: google (gemini alias), openai, openrouter."
    )]
    pub(crate) model: String,

    #[arg(
        long,
        env = "WEFT_API_KEY",
        hide_env_values = true,
        help = "API key for the selected provider; falls back to the provider's usual environment variable"
    )]
    pub(crate) api_key: Option<String>,

    #[arg(
        long,
        env = "WEFT_API_BASE",
        help = "Override the provider API base URL"
    )]
    pub(crate) api_base: Option<String>,

    #[arg(
        long = "request-timeout-ms",
        default_value_t = 120_000,
        value_parser = parse_positive_u64,
        help = "HTTP timeout for one generation request in milliseconds"
    )]
    pub(crate) request_timeout_ms: u64,

    #[arg(
        long = "max-retries",
        default_value_t = 2,
        help = "Retries for retryable provider failures (408/409/425/429/5xx, transport errors)"
    )]
    pub(crate) max_retries: usize,

    #[arg(
        long = "retry-budget-ms",
        default_value_t = 0,
        help = "Total retry wait budget in milliseconds (0 = unbounded)"
    )]
    pub(crate) retry_budget_ms: u64,

    #[arg(
        long = "retry-jitter",
        default_value_t = true,
        action = ArgAction::Set,
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "true",
        help = "Apply jitter to retry backoff"
    )]
    pub(crate) retry_jitter: bool,

    #[arg(long = "max-tokens", help = "Optional output token cap per agent")]
    pub(crate) max_tokens: Option<u32>,

    #[arg(
        long,
        value_parser = parse_temperature,
        help = "Optional sampling temperature per agent"
    )]
    pub(crate) temperature: Option<f32>,

    #[arg(
        long,
        default_value_t = false,
        help = "Run selected agents concurrently; output order is unchanged"
    )]
    pub(crate) concurrent: bool,

    #[arg(long = "trace-json", help = "Write the full request trace as JSON to this path")]
    pub(crate) trace_json: Option<PathBuf>,

    #[arg(
        long = "trace-log",
        env = "WEFT_TRACE_LOG",
        help = "Append one JSONL summary record per request to this path"
    )]
    pub(crate) trace_log: Option<PathBuf>,

    #[arg(
        long = "visualize-dir",
        help = "Write a Graphviz DOT diagram of the request into this directory"
    )]
    pub(crate) visualize_dir: Option<PathBuf>,

    #[arg(
        long,
        default_value_t = false,
        help = "Print {response, trace} as JSON instead of the plain response"
    )]
    pub(crate) json: bool,
}
