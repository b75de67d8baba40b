use crate::chunking::{chunk_text, ChunkingConfig};
use crate::extractor::{LopdfExtractor, PdfExtractor};
use crate::models::{Chunk, FailedFile, IndexReport};
use crate::store::VectorStore;
use crate::{IngestError, SearchError};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};
use walkdir::WalkDir;

/// Chunks sent to the store per upsert call.
pub const BATCH_SIZE: usize = 100;

pub fn discover_pdf_files(folder: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for entry in WalkDir::new(folder)
        .into_iter()
        .filter_map(|item| item.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }

        let is_pdf = entry
            .path()
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));

        if is_pdf {
            files.push(entry.path().to_path_buf());
        }
    }

    files.sort_unstable();
    files
}

#[derive(Debug, Error)]
enum FileFailure {
    #[error("{0}")]
    Extraction(#[from] IngestError),

    #[error("no text extracted")]
    NoText,

    #[error("no chunks created")]
    NoChunks,

    #[error("duplicate source {stem}, already indexed from {first}")]
    DuplicateSource { stem: String, first: String },

    #[error("batch {batch} upsert failed: {source}")]
    Upsert { batch: usize, source: SearchError },
}

/// Walks a directory of PDFs and writes their chunks into a vector store.
pub struct Indexer<S, X = LopdfExtractor> {
    store: S,
    extractor: X,
    chunking: ChunkingConfig,
}

impl<S> Indexer<S, LopdfExtractor>
where
    S: VectorStore,
{
    pub fn with_lopdf(store: S, chunking: ChunkingConfig) -> Self {
        Self::new(store, LopdfExtractor, chunking)
    }
}

impl<S, X> Indexer<S, X>
where
    S: VectorStore,
    X: PdfExtractor,
{
    pub fn new(store: S, extractor: X, chunking: ChunkingConfig) -> Self {
        Self {
            store,
            extractor,
            chunking,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Indexes every PDF under `directory`.
    ///
    /// Per-file problems end up in the report; only store setup failures are returned as
    /// errors. With `reindex` the collection is dropped first and everything previously
    /// indexed is lost.
    pub async fn index(&self, directory: &Path, reindex: bool) -> Result<IndexReport, SearchError> {
        if reindex {
            info!("reindexing: clearing existing collection");
            self.store.delete_collection().await?;
        }
        self.store.ensure_collection().await?;

        let files = discover_pdf_files(directory);
        let mut report = IndexReport {
            total_files: files.len(),
            ..IndexReport::default()
        };

        if files.is_empty() {
            warn!(directory = %directory.display(), "no pdf files found");
            return Ok(report);
        }
        info!(count = files.len(), directory = %directory.display(), "found pdf files");

        // Chunk ids derive from the file stem, so two files sharing a stem would overwrite
        // each other. The first one in discovery order wins.
        let mut claimed: HashMap<String, PathBuf> = HashMap::new();

        for (position, path) in files.iter().enumerate() {
            let filename = path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string());
            info!("[{}/{}] processing {}", position + 1, files.len(), filename);

            match self.claim_and_index(path, &mut claimed).await {
                Ok(chunk_count) => {
                    report.successful += 1;
                    report.total_chunks += chunk_count;
                    info!(file = %filename, chunks = chunk_count, "indexed");
                }
                Err(failure) => {
                    warn!(file = %filename, reason = %failure, "skipping file");
                    report.failed.push(FailedFile {
                        filename,
                        reason: failure.to_string(),
                    });
                }
            }
        }

        info!(
            successful = report.successful,
            total = report.total_files,
            total_chunks = report.total_chunks,
            average_per_book = report.average_chunks_per_book(),
            "indexing complete"
        );
        Ok(report)
    }

    async fn claim_and_index(
        &self,
        path: &Path,
        claimed: &mut HashMap<String, PathBuf>,
    ) -> Result<usize, FileFailure> {
        let source = path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .ok_or_else(|| IngestError::MissingFileName(path.display().to_string()))?;

        if let Some(first) = claimed.get(source) {
            return Err(FileFailure::DuplicateSource {
                stem: source.to_string(),
                first: first.display().to_string(),
            });
        }
        claimed.insert(source.to_string(), path.to_path_buf());

        self.index_file(path, source).await
    }

    /// Returns the number of chunks produced for the file, before blank re-validation.
    async fn index_file(&self, path: &Path, source: &str) -> Result<usize, FileFailure> {
        let text = self.extractor.extract_text(path)?;
        if text.trim().is_empty() {
            return Err(FileFailure::NoText);
        }

        let chunks = chunk_text(&text, source, &self.chunking);
        if chunks.is_empty() {
            return Err(FileFailure::NoChunks);
        }

        // Earlier batches stay written if a later one fails.
        for (batch, slice) in chunks.chunks(BATCH_SIZE).enumerate() {
            let valid: Vec<Chunk> = slice
                .iter()
                .filter(|chunk| !chunk.text.trim().is_empty())
                .cloned()
                .collect();
            if valid.is_empty() {
                continue;
            }

            self.store
                .upsert(&valid)
                .await
                .map_err(|source| FileFailure::Upsert {
                    batch: batch + 1,
                    source,
                })?;
        }

        Ok(chunks.len())
    }
}
