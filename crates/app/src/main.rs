use anyhow::Context;
use chrono::Utc;
use clap::Parser;
use std::path::PathBuf;
use techbooks_core::{open_store, Indexer, IndexReport, OpenMode, Settings};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// How many failed files the summary lists before collapsing the rest.
const FAILED_FILES_SHOWN: usize = 10;

#[derive(Parser)]
#[command(
    name = "index-books",
    version,
    about = "Index PDF books for the technical knowledge base"
)]
struct Cli {
    /// Directory containing PDF files (searched recursively).
    #[arg(long)]
    pdf_dir: PathBuf,

    /// Clear the existing collection and index from scratch.
    #[arg(long, default_value_t = false)]
    reindex: bool,

    /// Path to the vector store directory.
    #[arg(long, env = "CHROMA_DB_PATH")]
    chroma_path: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let mut settings = Settings::from_env().context("invalid configuration")?;
    if let Some(path) = cli.chroma_path {
        settings.db_path = path;
    }

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_new(&settings.log_level).unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(fmt::layer())
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        started_at = %Utc::now().to_rfc3339(),
        "index-books boot"
    );

    if !cli.pdf_dir.is_dir() {
        error!(path = %cli.pdf_dir.display(), "pdf directory not found");
        anyhow::bail!("pdf directory not found: {}", cli.pdf_dir.display());
    }

    let store = open_store(&settings, OpenMode::GetOrCreate)
        .await
        .context("failed to open the vector store")?;
    info!(
        chunk_size = settings.chunking.chunk_size,
        overlap = settings.chunking.overlap,
        embedding_model = %settings.embedding_model,
        "indexing"
    );

    let indexer = Indexer::with_lopdf(store, settings.chunking);
    let report = indexer
        .index(&cli.pdf_dir, cli.reindex)
        .await
        .context("indexing aborted")?;

    print!("{}", render_summary(&report));
    Ok(())
}

fn render_summary(report: &IndexReport) -> String {
    let mut lines = vec![
        "Indexing complete".to_string(),
        format!(
            "Successfully indexed: {}/{} books",
            report.successful, report.total_files
        ),
        format!("Total chunks: {}", report.total_chunks),
        format!(
            "Average chunks per book: {}",
            report.average_chunks_per_book()
        ),
    ];

    if !report.failed.is_empty() {
        lines.push(format!("Failed files ({}):", report.failed.len()));
        for failed in report.failed.iter().take(FAILED_FILES_SHOWN) {
            lines.push(format!("  - {} ({})", failed.filename, failed.reason));
        }
        if report.failed.len() > FAILED_FILES_SHOWN {
            lines.push(format!(
                "  ... and {} more",
                report.failed.len() - FAILED_FILES_SHOWN
            ));
        }
    }

    let mut output = lines.join("\n");
    output.push('\n');
    output
}
