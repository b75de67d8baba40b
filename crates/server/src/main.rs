use anyhow::Context;
use chrono::Utc;
use techbooks_core::{open_store, OpenMode, QueryService, Settings, VectorStore};
use techbooks_mcp::{Handlers, McpServer, SERVER_NAME};
use tokio::io::BufReader;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let settings = Settings::from_env().context("invalid configuration")?;

    // stdout carries the protocol, logs go to stderr
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_new(&settings.log_level).unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    info!(
        server = SERVER_NAME,
        version = env!("CARGO_PKG_VERSION"),
        started_at = %Utc::now().to_rfc3339(),
        "starting MCP server"
    );

    let store = match open_store(&settings, OpenMode::Existing).await {
        Ok(store) => store,
        Err(e) => {
            error!("Failed to open collection {}: {}", settings.collection, e);
            error!("Run: index-books --pdf-dir /path/to/pdfs");
            return Err(e.into());
        }
    };
    info!(chunks = store.count(None).await?, "connected to collection");

    let server = McpServer::new(Handlers::new(QueryService::new(store)));
    server
        .run(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
        .await
}
