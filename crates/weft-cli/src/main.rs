mod cli_args;
mod logging;
mod provider_client;
mod run;

use anyhow::Result;
use clap::Parser;

use crate::cli_args::Cli;
use crate::logging::install_stderr_logging;
use crate::run::run_cli;

#[tokio::main]
async fn main() -> Result<()> {
    install_stderr_logging();
    run_cli(Cli::parse()).await
}
