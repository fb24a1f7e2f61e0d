mod cli;
mod compile;
mod replay;

use anyhow::Result;
use clap::Parser;
use tracing::info;

use watchpost_core::config::{load_dotenv, Config};

use crate::cli::{CliArgs, Command};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let args = CliArgs::parse();
    load_dotenv();
    let config = Config::from_env();
    config.log_summary();

    let mut stdout = std::io::stdout().lock();
    match &args.command {
        Command::Match(match_args) => {
            let summary = replay::run(match_args, &config, &mut stdout).await?;
            info!(alerts = summary.alerts, "done");
        }
        Command::Compile(compile_args) => {
            let compiled = compile::run(compile_args, &mut stdout)?;
            if !compiled.is_complete() {
                info!(dropped = compiled.dropped.len(), "some conditions could not be compiled");
            }
        }
    }
    Ok(())
}
