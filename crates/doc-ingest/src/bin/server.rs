//! Ingestion server binary
//!
//! Run with: cargo run -p doc-ingest --bin doc-ingest-server -- --data-dir ./data

use clap::Parser;
use doc_ingest::{IngestConfig, IngestServer};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "doc-ingest-server", version, about = "Document ingestion HTTP server")]
struct Args {
    /// TOML configuration file; missing settings use defaults
    #[arg(long)]
    config: Option<PathBuf>,

    /// Root for raw/, processed/ and uploads/tmp/
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Address to bind
    #[arg(long)]
    host: Option<String>,

    /// Port to listen on
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "doc_ingest=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    // Load configuration
    let mut config = match &args.config {
        Some(path) => IngestConfig::from_file(path)?,
        None => IngestConfig::default(),
    };
    if let Some(data_dir) = args.data_dir {
        config.storage.data_dir = data_dir;
    }
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    config.validate()?;

    tracing::info!("Configuration loaded");
    tracing::info!("  - Data directory: {}", config.storage.data_dir.display());
    tracing::info!(
        "  - Chunk size: {} (overlap {})",
        config.chunking.chunk_size,
        config.chunking.chunk_overlap
    );
    tracing::info!("  - Workers: {}", config.processing.worker_count());
    tracing::info!(
        "  - Whole-file limit: {} bytes",
        config.server.max_whole_file_bytes
    );

    // Create and start server
    let server = IngestServer::new(config).await?;

    tracing::info!("Health: http://{}/health", server.address());
    tracing::info!("API Info: http://{}/api/info", server.address());

    server.start().await?;

    Ok(())
}
