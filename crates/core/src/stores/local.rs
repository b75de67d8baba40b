//! SQLite-backed vector store kept under a directory, one row per chunk.
//!
//! Embeddings are stored as little-endian `f32` blobs. Search is brute-force cosine distance
//! over the rows that pass the metadata filter, which is fine for a personal library of a few
//! hundred books.

use crate::embeddings::Embedder;
use crate::models::{Chunk, MetadataFilter, QueryHit, StoredRecord};
use crate::store::VectorStore;
use crate::SearchError;
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// File name of the database inside the configured directory.
pub const DATABASE_FILE: &str = "techbooks.sqlite3";

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS collections (
        name TEXT PRIMARY KEY,
        embedding_model TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS chunks (
        collection TEXT NOT NULL,
        id TEXT NOT NULL,
        source TEXT NOT NULL,
        text TEXT NOT NULL,
        embedding BLOB NOT NULL,
        PRIMARY KEY (collection, id)
    );

    CREATE INDEX IF NOT EXISTS idx_chunks_source ON chunks(collection, source);
"#;

pub struct LocalStore {
    db_path: Option<PathBuf>,
    collection: String,
    embedder: Arc<dyn Embedder>,
    conn: Mutex<Connection>,
}

impl LocalStore {
    /// Opens the collection under `dir`, creating it when absent.
    pub async fn open(
        dir: impl AsRef<Path>,
        collection: impl Into<String>,
        embedder: Arc<dyn Embedder>,
    ) -> Result<Self, SearchError> {
        let store = Self::load(dir.as_ref(), collection.into(), embedder).await?;
        store.ensure_collection().await?;
        Ok(store)
    }

    /// Opens a collection that must already exist on disk.
    pub async fn open_existing(
        dir: impl AsRef<Path>,
        collection: impl Into<String>,
        embedder: Arc<dyn Embedder>,
    ) -> Result<Self, SearchError> {
        let store = Self::load(dir.as_ref(), collection.into(), embedder).await?;
        let exists = {
            let conn = store.conn.lock().await;
            stored_model(&conn, &store.collection)?.is_some()
        };
        if !exists {
            return Err(SearchError::NotReady(format!(
                "collection {} does not exist under {}",
                store.collection,
                dir.as_ref().display()
            )));
        }
        Ok(store)
    }

    /// A collection that lives only as long as the store value.
    pub fn in_memory(
        collection: impl Into<String>,
        embedder: Arc<dyn Embedder>,
    ) -> Result<Self, SearchError> {
        let collection = collection.into();
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        create_collection(&conn, &collection, embedder.model_id())?;
        Ok(Self {
            db_path: None,
            collection,
            embedder,
            conn: Mutex::new(conn),
        })
    }

    pub fn collection_name(&self) -> &str {
        &self.collection
    }

    /// Location of the database file, `None` for in-memory stores.
    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    async fn load(
        dir: &Path,
        collection: String,
        embedder: Arc<dyn Embedder>,
    ) -> Result<Self, SearchError> {
        tokio::fs::create_dir_all(dir).await?;
        let db_path = dir.join(DATABASE_FILE);

        let conn = Connection::open(&db_path)?;
        conn.execute_batch(SCHEMA)?;

        if let Some(model) = stored_model(&conn, &collection)? {
            if model != embedder.model_id() {
                warn!(
                    collection = %collection,
                    stored = %model,
                    configured = embedder.model_id(),
                    "collection was indexed with a different embedding model"
                );
            }
            info!(
                collection = %collection,
                chunks = count_rows(&conn, &collection, None)?,
                path = %db_path.display(),
                "loaded local collection"
            );
        }

        Ok(Self {
            db_path: Some(db_path),
            collection,
            embedder,
            conn: Mutex::new(conn),
        })
    }

    fn require_collection(&self, conn: &Connection) -> Result<(), SearchError> {
        match stored_model(conn, &self.collection)? {
            Some(_) => Ok(()),
            None => Err(SearchError::NotReady(format!(
                "collection {} does not exist",
                self.collection
            ))),
        }
    }
}

#[async_trait]
impl VectorStore for LocalStore {
    async fn ensure_collection(&self) -> Result<(), SearchError> {
        let conn = self.conn.lock().await;
        if stored_model(&conn, &self.collection)?.is_none() {
            create_collection(&conn, &self.collection, self.embedder.model_id())?;
            info!(collection = %self.collection, "created collection");
        }
        Ok(())
    }

    async fn delete_collection(&self) -> Result<(), SearchError> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM chunks WHERE collection = ?1",
            params![self.collection],
        )?;
        tx.execute(
            "DELETE FROM collections WHERE name = ?1",
            params![self.collection],
        )?;
        tx.commit()?;
        info!(collection = %self.collection, "deleted collection");
        Ok(())
    }

    async fn upsert(&self, chunks: &[Chunk]) -> Result<(), SearchError> {
        if chunks.is_empty() {
            return Ok(());
        }

        let texts: Vec<String> = chunks.iter().map(|chunk| chunk.text.clone()).collect();
        let embeddings = self.embedder.embed_batch(&texts).await?;
        if embeddings.len() != chunks.len() {
            return Err(SearchError::Request(format!(
                "embedding count {} doesn't match chunk count {}",
                embeddings.len(),
                chunks.len()
            )));
        }

        let mut conn = self.conn.lock().await;
        self.require_collection(&conn)?;
        write_batch(&mut conn, &self.collection, chunks, &embeddings)?;
        debug!(collection = %self.collection, chunks = chunks.len(), "upserted batch");
        Ok(())
    }

    async fn query(
        &self,
        text: &str,
        n_results: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<QueryHit>, SearchError> {
        let query_vector = self
            .embedder
            .embed_batch(&[text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| SearchError::Request("embedder returned no vector".to_string()))?;

        let conn = self.conn.lock().await;
        self.require_collection(&conn)?;
        nearest(&conn, &self.collection, &query_vector, n_results, filter)
    }

    async fn get(&self, filter: Option<&MetadataFilter>) -> Result<Vec<StoredRecord>, SearchError> {
        let conn = self.conn.lock().await;
        self.require_collection(&conn)?;
        read_records(&conn, &self.collection, filter)
    }

    async fn count(&self, filter: Option<&MetadataFilter>) -> Result<usize, SearchError> {
        let conn = self.conn.lock().await;
        self.require_collection(&conn)?;
        count_rows(&conn, &self.collection, filter)
    }
}

fn stored_model(conn: &Connection, collection: &str) -> Result<Option<String>, SearchError> {
    Ok(conn
        .query_row(
            "SELECT embedding_model FROM collections WHERE name = ?1",
            params![collection],
            |row| row.get::<_, String>(0),
        )
        .optional()?)
}

fn create_collection(
    conn: &Connection,
    collection: &str,
    embedding_model: &str,
) -> Result<(), SearchError> {
    conn.execute(
        "INSERT OR IGNORE INTO collections (name, embedding_model, updated_at) \
         VALUES (?1, ?2, ?3)",
        params![collection, embedding_model, Utc::now().to_rfc3339()],
    )?;
    Ok(())
}

fn write_batch(
    conn: &mut Connection,
    collection: &str,
    chunks: &[Chunk],
    embeddings: &[Vec<f32>],
) -> Result<(), SearchError> {
    let tx = conn.transaction()?;
    {
        let mut insert = tx.prepare(
            "INSERT OR REPLACE INTO chunks (collection, id, source, text, embedding) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )?;
        for (chunk, embedding) in chunks.iter().zip(embeddings) {
            insert.execute(params![
                collection,
                chunk.id,
                chunk.source,
                chunk.text,
                encode_embedding(embedding),
            ])?;
        }
    }
    tx.execute(
        "UPDATE collections SET updated_at = ?2 WHERE name = ?1",
        params![collection, Utc::now().to_rfc3339()],
    )?;
    tx.commit()?;
    Ok(())
}

/// SQL condition and bound arguments for a collection plus an optional filter.
fn where_clause(collection: &str, filter: Option<&MetadataFilter>) -> (&'static str, Vec<String>) {
    match filter {
        None => ("collection = ?1", vec![collection.to_string()]),
        Some(MetadataFilter::SourceEquals(source)) => (
            "collection = ?1 AND source = ?2",
            vec![collection.to_string(), source.clone()],
        ),
        Some(MetadataFilter::SourceContains(needle)) => (
            "collection = ?1 AND instr(source, ?2) > 0",
            vec![collection.to_string(), needle.clone()],
        ),
    }
}

fn count_rows(
    conn: &Connection,
    collection: &str,
    filter: Option<&MetadataFilter>,
) -> Result<usize, SearchError> {
    let (condition, args) = where_clause(collection, filter);
    let count: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM chunks WHERE {condition}"),
        params_from_iter(args.iter()),
        |row| row.get(0),
    )?;
    Ok(usize::try_from(count).unwrap_or_default())
}

fn read_records(
    conn: &Connection,
    collection: &str,
    filter: Option<&MetadataFilter>,
) -> Result<Vec<StoredRecord>, SearchError> {
    let (condition, args) = where_clause(collection, filter);
    let mut statement = conn.prepare(&format!(
        "SELECT id, text, source FROM chunks WHERE {condition} ORDER BY rowid"
    ))?;
    let records = statement
        .query_map(params_from_iter(args.iter()), |row| {
            Ok(StoredRecord {
                id: row.get(0)?,
                text: row.get(1)?,
                source: row.get(2)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(records)
}

/// Scores every matching row, then loads text only for the `n_results` closest ones.
fn nearest(
    conn: &Connection,
    collection: &str,
    query_vector: &[f32],
    n_results: usize,
    filter: Option<&MetadataFilter>,
) -> Result<Vec<QueryHit>, SearchError> {
    let (condition, args) = where_clause(collection, filter);
    let mut statement = conn.prepare(&format!(
        "SELECT rowid, embedding FROM chunks WHERE {condition} ORDER BY rowid"
    ))?;
    let mut rows = statement.query(params_from_iter(args.iter()))?;

    let mut scored: Vec<(f64, i64)> = Vec::new();
    while let Some(row) = rows.next()? {
        let rowid: i64 = row.get(0)?;
        let blob: Vec<u8> = row.get(1)?;
        scored.push((cosine_distance(query_vector, &decode_embedding(&blob)), rowid));
    }
    scored.sort_by(|left, right| left.0.total_cmp(&right.0));
    scored.truncate(n_results);

    let mut lookup = conn.prepare("SELECT id, text, source FROM chunks WHERE rowid = ?1")?;
    scored
        .into_iter()
        .map(|(distance, rowid)| {
            lookup
                .query_row(params![rowid], |row| {
                    Ok(QueryHit {
                        id: row.get(0)?,
                        text: row.get(1)?,
                        source: row.get(2)?,
                        distance,
                    })
                })
                .map_err(SearchError::from)
        })
        .collect()
}

fn encode_embedding(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|value| value.to_le_bytes()).collect()
}

fn decode_embedding(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// `1 - cos(a, b)`; vectors with no magnitude are maximally distant.
fn cosine_distance(left: &[f32], right: &[f32]) -> f64 {
    let mut dot = 0f64;
    let mut left_norm = 0f64;
    let mut right_norm = 0f64;
    for (a, b) in left.iter().zip(right.iter()) {
        let (a, b) = (f64::from(*a), f64::from(*b));
        dot += a * b;
        left_norm += a * a;
        right_norm += b * b;
    }

    if left_norm == 0.0 || right_norm == 0.0 {
        return 1.0;
    }
    1.0 - dot / (left_norm.sqrt() * right_norm.sqrt())
}
