use crate::embeddings::Embedder;
use crate::models::{Chunk, MetadataFilter, QueryHit, StoredRecord};
use crate::store::VectorStore;
use crate::SearchError;
use async_trait::async_trait;
use reqwest::{Client, Response};
use serde_json::{json, Value};
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};
use url::Url;
use uuid::Uuid;

const BACKEND: &str = "chroma";

/// Client for a Chroma server speaking the v1 REST API.
///
/// Vectors are computed client-side with the configured embedder, so the server never needs
/// an embedding function of its own.
pub struct ChromaStore {
    client: Client,
    base: Url,
    collection: String,
    embedder: Arc<dyn Embedder>,
    collection_id: RwLock<Option<Uuid>>,
}

enum WhereClause {
    Everything,
    Matching(Value),
    Nothing,
}

impl ChromaStore {
    pub fn new(
        endpoint: &str,
        collection: impl Into<String>,
        embedder: Arc<dyn Embedder>,
    ) -> Result<Self, SearchError> {
        let mut base = Url::parse(endpoint)?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        Ok(Self {
            client: Client::new(),
            base,
            collection: collection.into(),
            embedder,
            collection_id: RwLock::new(None),
        })
    }

    /// Resolves the id of an already existing collection.
    pub async fn connect_existing(&self) -> Result<(), SearchError> {
        let response = self
            .client
            .get(self.url(&format!("api/v1/collections/{}", self.collection))?)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(SearchError::NotReady(format!(
                "collection {} is not available ({})",
                self.collection,
                response.status()
            )));
        }

        let body: Value = response.json().await?;
        let id = parse_collection_id(&body)?;
        *self.collection_id.write().await = Some(id);
        info!(collection = %self.collection, %id, "connected to chroma collection");
        Ok(())
    }

    fn url(&self, path: &str) -> Result<Url, SearchError> {
        Ok(self.base.join(path)?)
    }

    async fn id(&self) -> Result<Uuid, SearchError> {
        let id = *self.collection_id.read().await;
        id.ok_or_else(|| {
            SearchError::NotReady(format!("collection {} is not open", self.collection))
        })
    }

    async fn post(&self, action: &str, body: Value) -> Result<Value, SearchError> {
        let id = self.id().await?;
        let response = self
            .client
            .post(self.url(&format!("api/v1/collections/{id}/{action}"))?)
            .json(&body)
            .send()
            .await?;
        checked(response).await?.json().await.map_err(Into::into)
    }

    /// Chroma has no substring operator for metadata, so `SourceContains` is resolved to the
    /// concrete set of matching sources first.
    async fn where_clause(
        &self,
        filter: Option<&MetadataFilter>,
    ) -> Result<WhereClause, SearchError> {
        match filter {
            None => Ok(WhereClause::Everything),
            Some(MetadataFilter::SourceEquals(source)) => {
                Ok(WhereClause::Matching(json!({ "source": { "$eq": source } })))
            }
            Some(contains @ MetadataFilter::SourceContains(_)) => {
                let listing = self.post("get", json!({ "include": ["metadatas"] })).await?;
                let sources: BTreeSet<String> = sources_in(&listing)
                    .into_iter()
                    .filter(|source| contains.matches(source))
                    .collect();
                debug!(?sources, "resolved source filter");

                if sources.is_empty() {
                    Ok(WhereClause::Nothing)
                } else {
                    Ok(WhereClause::Matching(json!({ "source": { "$in": sources } })))
                }
            }
        }
    }

    async fn fetch(&self, clause: Option<Value>) -> Result<Vec<StoredRecord>, SearchError> {
        let mut body = json!({ "include": ["documents", "metadatas"] });
        if let Some(clause) = clause {
            body["where"] = clause;
        }

        let parsed = self.post("get", body).await?;
        let ids = parsed
            .pointer("/ids")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        Ok(ids
            .iter()
            .enumerate()
            .map(|(position, id)| StoredRecord {
                id: id.as_str().unwrap_or_default().to_string(),
                text: parsed
                    .pointer(&format!("/documents/{position}"))
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                source: parsed
                    .pointer(&format!("/metadatas/{position}/source"))
                    .and_then(Value::as_str)
                    .unwrap_or("Unknown")
                    .to_string(),
            })
            .collect())
    }
}

#[async_trait]
impl VectorStore for ChromaStore {
    async fn ensure_collection(&self) -> Result<(), SearchError> {
        let response = self
            .client
            .post(self.url("api/v1/collections")?)
            .json(&json!({
                "name": self.collection,
                "get_or_create": true,
                "metadata": { "hnsw:space": "cosine" },
            }))
            .send()
            .await?;

        let body: Value = checked(response).await?.json().await?;
        let id = parse_collection_id(&body)?;
        *self.collection_id.write().await = Some(id);
        info!(collection = %self.collection, %id, "chroma collection ready");
        Ok(())
    }

    async fn delete_collection(&self) -> Result<(), SearchError> {
        let response = self
            .client
            .delete(self.url(&format!("api/v1/collections/{}", self.collection))?)
            .send()
            .await?;

        // deleting a collection that never existed is not an error for reindexing
        if !response.status().is_success() && !response.status().is_client_error() {
            return Err(SearchError::BackendResponse {
                backend: BACKEND.to_string(),
                details: response.status().to_string(),
            });
        }

        *self.collection_id.write().await = None;
        info!(collection = %self.collection, "deleted chroma collection");
        Ok(())
    }

    async fn upsert(&self, chunks: &[Chunk]) -> Result<(), SearchError> {
        if chunks.is_empty() {
            return Ok(());
        }

        let documents: Vec<String> = chunks.iter().map(|chunk| chunk.text.clone()).collect();
        let embeddings = self.embedder.embed_batch(&documents).await?;
        if embeddings.len() != chunks.len() {
            return Err(SearchError::Request(format!(
                "embedding count {} doesn't match chunk count {}",
                embeddings.len(),
                chunks.len()
            )));
        }

        let ids: Vec<&str> = chunks.iter().map(|chunk| chunk.id.as_str()).collect();
        let metadatas: Vec<Value> = chunks
            .iter()
            .map(|chunk| json!({ "source": chunk.source }))
            .collect();

        self.post(
            "upsert",
            json!({
                "ids": ids,
                "embeddings": embeddings,
                "documents": documents,
                "metadatas": metadatas,
            }),
        )
        .await?;
        Ok(())
    }

    async fn query(
        &self,
        text: &str,
        n_results: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<QueryHit>, SearchError> {
        let clause = match self.where_clause(filter).await? {
            WhereClause::Nothing => return Ok(Vec::new()),
            WhereClause::Everything => None,
            WhereClause::Matching(clause) => Some(clause),
        };

        let query_vector = self.embedder.embed_batch(&[text.to_string()]).await?;
        let mut body = json!({
            "query_embeddings": query_vector,
            "n_results": n_results,
            "include": ["documents", "metadatas", "distances"],
        });
        if let Some(clause) = clause {
            body["where"] = clause;
        }

        let parsed = self.post("query", body).await?;
        let ids = parsed
            .pointer("/ids/0")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        let mut hits = Vec::with_capacity(ids.len());
        for (position, id) in ids.iter().enumerate() {
            let distance = parsed
                .pointer(&format!("/distances/0/{position}"))
                .and_then(Value::as_f64)
                .ok_or_else(|| SearchError::BackendResponse {
                    backend: BACKEND.to_string(),
                    details: format!("missing distance for result {position}"),
                })?;

            hits.push(QueryHit {
                id: id.as_str().unwrap_or_default().to_string(),
                text: parsed
                    .pointer(&format!("/documents/0/{position}"))
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                source: parsed
                    .pointer(&format!("/metadatas/0/{position}/source"))
                    .and_then(Value::as_str)
                    .unwrap_or("Unknown")
                    .to_string(),
                distance,
            });
        }

        Ok(hits)
    }

    async fn get(&self, filter: Option<&MetadataFilter>) -> Result<Vec<StoredRecord>, SearchError> {
        match self.where_clause(filter).await? {
            WhereClause::Nothing => Ok(Vec::new()),
            WhereClause::Everything => self.fetch(None).await,
            WhereClause::Matching(clause) => self.fetch(Some(clause)).await,
        }
    }

    async fn count(&self, filter: Option<&MetadataFilter>) -> Result<usize, SearchError> {
        if filter.is_some() {
            return Ok(self.get(filter).await?.len());
        }

        let id = self.id().await?;
        let response = self
            .client
            .get(self.url(&format!("api/v1/collections/{id}/count"))?)
            .send()
            .await?;
        let count: Value = checked(response).await?.json().await?;
        count
            .as_u64()
            .map(|count| count as usize)
            .ok_or_else(|| SearchError::BackendResponse {
                backend: BACKEND.to_string(),
                details: format!("unexpected count payload: {count}"),
            })
    }
}

async fn checked(response: Response) -> Result<Response, SearchError> {
    if response.status().is_success() {
        return Ok(response);
    }

    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    Err(SearchError::BackendResponse {
        backend: BACKEND.to_string(),
        details: format!("{status}: {body}"),
    })
}

/// Distinct `source` metadata values in a `get` response.
fn sources_in(listing: &Value) -> BTreeSet<String> {
    listing
        .pointer("/metadatas")
        .and_then(Value::as_array)
        .map(|metadatas| {
            metadatas
                .iter()
                .filter_map(|metadata| metadata.pointer("/source").and_then(Value::as_str))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn parse_collection_id(body: &Value) -> Result<Uuid, SearchError> {
    body.pointer("/id")
        .and_then(Value::as_str)
        .and_then(|id| Uuid::parse_str(id).ok())
        .ok_or_else(|| SearchError::BackendResponse {
            backend: BACKEND.to_string(),
            details: format!("collection payload without a valid id: {body}"),
        })
}
