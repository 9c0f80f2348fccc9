use std::{
    path::PathBuf,
    sync::{Arc, Mutex},
};

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod routes;
mod storage;
mod store;
mod upstream;
mod views;

use routes::AppState;
use storage::{FileBackend, MemoryBackend, StorageBackend};
use store::ActivityStore;
use upstream::UpstreamClient;

#[derive(Debug, Parser)]
#[command(
    name = "nonton",
    about = "Server-rendered front-end for anime streaming.",
    version
)]
struct Cli {
    /// Listen address, e.g. 127.0.0.1:3000.
    #[arg(long, default_value = "127.0.0.1:3000")]
    listen: String,

    /// Override the upstream API base URL.
    #[arg(long, value_name = "URL")]
    upstream: Option<String>,

    /// Override the directory holding history and bookmark data.
    #[arg(long, value_name = "DIR")]
    data_dir: Option<PathBuf>,

    /// Keep history and bookmarks in memory only.
    #[arg(long)]
    ephemeral: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let result = run().await;
    if let Err(err) = &result {
        eprintln!("error: {err:?}");
    }
    result
}

async fn run() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("nonton=info")),
        )
        .init();

    let cli = Cli::parse();

    let upstream = match &cli.upstream {
        Some(base) => UpstreamClient::with_base(base)?,
        None => UpstreamClient::new()?,
    };

    let backend: Box<dyn StorageBackend> = if cli.ephemeral {
        Box::new(MemoryBackend::new())
    } else {
        let dir = match cli.data_dir {
            Some(dir) => dir,
            None => FileBackend::default_dir()?,
        };
        Box::new(FileBackend::new(dir))
    };

    let state = AppState {
        upstream: Arc::new(upstream),
        store: Arc::new(Mutex::new(ActivityStore::new(backend))),
    };
    let app = routes::router(state);

    let listener = tokio::net::TcpListener::bind(&cli.listen)
        .await
        .with_context(|| format!("failed to bind {}", cli.listen))?;
    info!("listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}
