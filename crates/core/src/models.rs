use serde::{Deserialize, Serialize};

/// A bounded slice of a book's text, the unit of embedding and storage.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Chunk {
    pub id: String,
    pub text: String,
    pub source: String,
}

impl Chunk {
    pub fn make_id(source: &str, sequence: u64) -> String {
        format!("{source}_chunk_{sequence}")
    }
}

/// A chunk as read back from the store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoredRecord {
    pub id: String,
    pub text: String,
    pub source: String,
}

/// Nearest-neighbour hit in store order. `distance` is whatever metric the store uses.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueryHit {
    pub id: String,
    pub text: String,
    pub source: String,
    pub distance: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum MetadataFilter {
    SourceEquals(String),
    SourceContains(String),
}

impl MetadataFilter {
    pub fn matches(&self, source: &str) -> bool {
        match self {
            Self::SourceEquals(expected) => source == expected,
            Self::SourceContains(needle) => source.contains(needle.as_str()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoredResult {
    pub rank: usize,
    pub text: String,
    pub source: String,
    pub relevance: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum SearchOutcome {
    NoResults { query: String },
    Results { query: String, results: Vec<ScoredResult> },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BookSummary {
    pub source: String,
    pub chunk_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FailedFile {
    pub filename: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct IndexReport {
    pub total_files: usize,
    pub successful: usize,
    pub total_chunks: usize,
    pub failed: Vec<FailedFile>,
}

impl IndexReport {
    pub fn failed_filenames(&self) -> Vec<&str> {
        self.failed.iter().map(|file| file.filename.as_str()).collect()
    }

    /// Truncating average; zero when no file succeeded.
    pub fn average_chunks_per_book(&self) -> usize {
        if self.successful == 0 {
            0
        } else {
            self.total_chunks / self.successful
        }
    }
}
