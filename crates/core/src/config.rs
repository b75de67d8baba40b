use crate::chunking::{ChunkingConfig, DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE};
use crate::error::ConfigError;
use std::path::PathBuf;

pub const DEFAULT_DB_PATH: &str = "./chroma_db";
pub const DEFAULT_COLLECTION: &str = "technical_books";
pub const DEFAULT_EMBEDDING_MODEL: &str = "sentence-transformers/all-MiniLM-L6-v2";
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Runtime settings shared by the indexer and the server.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub db_path: PathBuf,
    pub chroma_url: Option<String>,
    pub collection: String,
    pub chunking: ChunkingConfig,
    pub embedding_model: String,
    pub embedding_url: Option<String>,
    pub log_level: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from(DEFAULT_DB_PATH),
            chroma_url: None,
            collection: DEFAULT_COLLECTION.to_string(),
            chunking: ChunkingConfig::default(),
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            embedding_url: None,
            log_level: DEFAULT_LOG_LEVEL.to_string(),
        }
    }
}

impl Settings {
    /// Reads settings from the process environment. Call `dotenvy::dotenv()` first to pick up
    /// a `.env` file.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let chunk_size = parse_number(non_empty("CHUNK_SIZE"), "CHUNK_SIZE", DEFAULT_CHUNK_SIZE)?;
        let overlap = parse_number(
            non_empty("CHUNK_OVERLAP"),
            "CHUNK_OVERLAP",
            DEFAULT_CHUNK_OVERLAP,
        )?;

        Ok(Self {
            db_path: non_empty("CHROMA_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DB_PATH)),
            chroma_url: non_empty("CHROMA_URL"),
            collection: non_empty("COLLECTION_NAME")
                .unwrap_or_else(|| DEFAULT_COLLECTION.to_string()),
            chunking: ChunkingConfig::new(chunk_size, overlap)?,
            embedding_model: non_empty("EMBEDDING_MODEL")
                .unwrap_or_else(|| DEFAULT_EMBEDDING_MODEL.to_string()),
            embedding_url: non_empty("EMBEDDING_URL"),
            log_level: non_empty("LOG_LEVEL").unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string()),
        })
    }
}

fn parse_number(
    raw: Option<String>,
    key: &'static str,
    default: usize,
) -> Result<usize, ConfigError> {
    match raw {
        None => Ok(default),
        Some(value) => value
            .parse()
            .map_err(|_| ConfigError::InvalidNumber { key, value }),
    }
}
