//! Main entry point for the report-segment-downloader CLI

use anyhow::Context;
use clap::Parser;
use report_segment_downloader::cli::{Cli, CliError};
use report_segment_downloader::shutdown::ShutdownCoordinator;
use tracing::error;
use tracing_subscriber::EnvFilter;

/// Initialize tracing subscriber with optional JSON formatting
fn init_tracing() {
    let json_format = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("report_segment_downloader=info"));

    if json_format {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let cli = Cli::parse();

    let shutdown = ShutdownCoordinator::shared();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Ctrl+C received - finishing in-flight segments...");
                shutdown.request_shutdown();
            }
        }
    });

    if let Err(e) = cli.execute(shutdown).await {
        error!("Command failed: {}", e);
        if let Some(hint) = e.hint() {
            eprintln!("hint: {hint}");
        }
        let code = match e {
            CliError::Incomplete { .. } => 2,
            _ => 1,
        };
        std::process::exit(code);
    }

    std::io::Write::flush(&mut std::io::stdout()).context("failed to flush stdout")?;
    Ok(())
}
