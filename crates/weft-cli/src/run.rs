use std::sync::Arc;

use anyhow::{bail, Context, Result};
use weft_ai::ModelRef;
use weft_core::{write_artifact, ArtifactKind};
use weft_fabric::{load_fabric_manifest, FabricResponse, Generator, LlmGenerator, TraceLogger};
use weft_viz::write_trace_dot;

use crate::cli_args::Cli;
use crate::provider_client::build_provider_client;

pub(crate) async fn run_cli(cli: Cli) -> Result<()> {
    let model_ref = ModelRef::parse(&cli.model)
        .with_context(|| format!("invalid --model '{}'", cli.model))?;
    let client = build_provider_client(&cli, &model_ref)?;
    let generator = LlmGenerator::new(client, model_ref.model.clone())
        .with_max_tokens(cli.max_tokens)
        .with_temperature(cli.temperature);
    let output = run_query(&cli, Arc::new(generator)).await?;
    println!("{output}");
    Ok(())
}

/// Loads the manifest, handles the query, writes requested artifacts, and renders stdout.
pub(crate) async fn run_query(cli: &Cli, generator: Arc<dyn Generator>) -> Result<String> {
    if cli.query.trim().is_empty() {
        bail!("--query cannot be empty");
    }
    let manifest = load_fabric_manifest(&cli.manifest)?;
    let fabric = manifest.build_fabric(generator);

    let result = if cli.concurrent {
        fabric.handle_request_concurrent(&cli.query).await
    } else {
        fabric.handle_request(&cli.query).await
    };

    if let Some(path) = &cli.trace_log {
        let logged =
            TraceLogger::open(path.clone()).and_then(|logger| logger.log_trace(&result.trace));
        if let Err(error) = logged {
            eprintln!("warning: failed to append fabric trace log: {error:#}");
        }
    }

    if let Some(path) = &cli.trace_json {
        let payload = serde_json::to_string_pretty(&result.trace)
            .context("failed to encode fabric trace")?;
        write_artifact(ArtifactKind::TraceJson, path, &payload)?;
    }

    if let Some(dir) = &cli.visualize_dir {
        let path = write_trace_dot(dir, fabric.agents(), fabric.vaults(), &result.trace)?;
        tracing::info!(path = %path.display(), "wrote trace diagram");
    }

    render_output(&result, cli.json)
}

fn render_output(result: &FabricResponse, json: bool) -> Result<String> {
    if json {
        return serde_json::to_string_pretty(result).context("failed to encode fabric response");
    }
    Ok(result.response.clone())
}
