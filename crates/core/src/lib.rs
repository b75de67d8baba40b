pub mod chunking;
pub mod config;
pub mod embeddings;
pub mod error;
pub mod extractor;
pub mod models;
pub mod pipeline;
pub mod query;
pub mod store;
pub mod stores;

pub use chunking::{chunk_text, ChunkingConfig, DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE};
pub use config::Settings;
pub use embeddings::{
    build_embedder, CharacterNgramEmbedder, Embedder, HttpEmbedder, DEFAULT_EMBEDDING_DIMENSIONS,
};
pub use error::{ConfigError, IngestError, SearchError};
pub use extractor::{LopdfExtractor, PdfExtractor};
pub use models::{
    BookSummary, Chunk, FailedFile, IndexReport, MetadataFilter, QueryHit, ScoredResult,
    SearchOutcome, StoredRecord,
};
pub use pipeline::{discover_pdf_files, Indexer, BATCH_SIZE};
pub use query::{
    render_book_list, QueryService, SearchRequest, DEFAULT_MAX_RESULTS, MAX_RESULTS_LIMIT,
};
pub use store::VectorStore;
pub use stores::{open_store, ChromaStore, LocalStore, OpenMode};
