// src/main.rs

//! # previewcast entry point
//!
//! Loads the options, initializes logging, starts the sync orchestrator and
//! keeps it running until Ctrl-C.

use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use previewcast::config::{CliArgs, ProviderOptions};
use previewcast::error::ConfigError;
use previewcast::orchestrator::SyncOrchestrator;
use previewcast::transformer::{CommandTransformer, DocumentTransformer, JsonFileTransformer};

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    let options = match ProviderOptions::load(&cli_args) {
        Ok(options) => options,
        Err(ConfigError::Invalid(errors)) => {
            eprintln!("Options did not pass validation:");
            for error in errors {
                eprintln!("  {}", error);
            }
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("Error loading configuration: {}", e);
            std::process::exit(1);
        }
    };

    // RUST_LOG wins over the verbose flag.
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(options.log_level()))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_max_level(tracing::Level::TRACE)
        .with_writer(std::io::stderr) // Log to stderr
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    tracing::debug!("previewcast starting with options: {:?}", options);

    let transformer: Arc<dyn DocumentTransformer> = match &cli_args.transformer {
        Some(program) => {
            tracing::info!("Using external transformer: {}", program);
            Arc::new(CommandTransformer::new(
                program.clone(),
                cli_args.transformer_args.clone(),
            ))
        }
        None => Arc::new(JsonFileTransformer),
    };

    let mut orchestrator = SyncOrchestrator::new(options, transformer);
    let port = orchestrator.start().await?;
    println!("Web socket server is running on port: {}", port);

    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Ctrl-C received, initiating shutdown...");
        }
        Err(err) => {
            tracing::error!("Failed to listen for Ctrl-C signal: {}", err);
        }
    }

    orchestrator.stop().await;
    tracing::info!("previewcast shut down gracefully.");
    Ok(())
}
