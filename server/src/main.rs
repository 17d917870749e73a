use anyhow::Result;
use axum::Router;
use clap::Parser;
use kopi_core::{EmbeddingBackend, EngineConfig, SegmentKeywords};
use server::{build_app, Settings};
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio::net::TcpListener;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
struct Args {
    /// Index directory path
    #[arg(long, default_value = "./index")]
    index: PathBuf,
    /// Review CSV to build from when the index directory is empty
    #[arg(long)]
    dataset: Option<PathBuf>,
    /// Segmentation model directory
    #[arg(long)]
    models: Option<PathBuf>,
    /// Segment keyword table (JSON)
    #[arg(long)]
    segments: Option<PathBuf>,
    /// Engine configuration (JSON)
    #[arg(long)]
    config: Option<PathBuf>,
    /// Override embedding.backend: hash | fastembed
    #[arg(long)]
    embedder: Option<String>,
    /// Host to bind
    #[arg(long, default_value = "0.0.0.0")]
    host: String,
    /// Port to bind
    #[arg(long, default_value_t = 8080)]
    port: u16,
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let args = Args::parse();
    let mut engine = match &args.config {
        Some(p) => EngineConfig::from_json_file(p)?,
        None => EngineConfig::default(),
    };
    if let Some(backend) = &args.embedder {
        engine.embedding.backend = backend.parse::<EmbeddingBackend>()?;
    }
    let settings = Settings {
        index_dir: Some(args.index),
        dataset: args.dataset,
        models_dir: args.models,
        segments: match &args.segments {
            Some(p) => SegmentKeywords::from_json_file(p)?,
            None => SegmentKeywords::default(),
        },
        engine,
    };
    let app: Router = build_app(settings)?;

    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "server listening");
    axum::serve(listener, app).await?;
    Ok(())
}
