use anyhow::Result;
use clap::Parser;
use compute_cli::{execute_command, Args};
use compute_orchestrator::{ComputeClient, ComputeConfig, EnvCredentials};
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // Keep the guard alive so buffered file logs are flushed on exit.
    let _log_guard = compute_logging::init_subscriber();

    let args = Args::parse();

    let config = match &args.config {
        Some(path) => ComputeConfig::load(path)?,
        None => ComputeConfig::from_env(),
    };
    info!(
        control_plane = %config.control_plane_url,
        bulk_concurrency = config.bulk_concurrency,
        "configuration loaded"
    );

    let credentials = Arc::new(EnvCredentials::from_env());
    let client = ComputeClient::from_config(&config, credentials)?;

    let mut stdout = std::io::stdout();
    execute_command(&args.command, &client, args.json, &mut stdout).await
}
