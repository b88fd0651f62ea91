//!
//! # dirdigest binary
//!
//! Parses CLI flags, loads the TOML config, merges flags over it, and runs
//! the ingestion pipeline against stdout or the requested output file.

use std::path::PathBuf;

use clap::Parser;
use dirdigest::cli::Cli;
use dirdigest::error::DigestError;
use dirdigest::orchestrator;
use dirdigest::writer::Sink;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> Result<(), DigestError> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let settings = dirdigest::config::load(&cli.config)?;
    let settings = cli.apply(settings);

    let sink: Sink = match &cli.output_file {
        Some(path) => Box::new(open_output_file(path).await?),
        None => Box::new(tokio::io::stdout()),
    };

    let cancel = CancellationToken::new();
    let ctrl_c_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, cancelling run");
            ctrl_c_cancel.cancel();
        }
    });

    let stats = orchestrator::run(settings, cli.source_dir.clone(), cli.format, sink, cancel).await?;
    tracing::info!(files_written = stats.files_written, "run complete");
    Ok(())
}

async fn open_output_file(path: &PathBuf) -> Result<tokio::fs::File, DigestError> {
    tokio::fs::File::create(path).await.map_err(|e| DigestError::Io {
        path: Some(path.clone()),
        message: "failed to create output file".to_string(),
        cause: Some(e),
    })
}
