use crate::models::{Chunk, MetadataFilter, QueryHit, StoredRecord};
use crate::SearchError;
use async_trait::async_trait;

/// The narrow slice of a vector database the pipeline and query service rely on.
///
/// Implementations own embedding: callers hand over text and get distances back.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Creates the collection if it does not exist yet.
    async fn ensure_collection(&self) -> Result<(), SearchError>;

    /// Drops the collection and everything in it.
    async fn delete_collection(&self) -> Result<(), SearchError>;

    /// Inserts or replaces chunks by id.
    async fn upsert(&self, chunks: &[Chunk]) -> Result<(), SearchError>;

    /// Nearest neighbours of `text`, ascending by distance.
    async fn query(
        &self,
        text: &str,
        n_results: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<QueryHit>, SearchError>;

    async fn get(&self, filter: Option<&MetadataFilter>) -> Result<Vec<StoredRecord>, SearchError>;

    async fn count(&self, filter: Option<&MetadataFilter>) -> Result<usize, SearchError>;
}

#[async_trait]
impl<S: VectorStore + ?Sized> VectorStore for Box<S> {
    async fn ensure_collection(&self) -> Result<(), SearchError> {
        (**self).ensure_collection().await
    }

    async fn delete_collection(&self) -> Result<(), SearchError> {
        (**self).delete_collection().await
    }

    async fn upsert(&self, chunks: &[Chunk]) -> Result<(), SearchError> {
        (**self).upsert(chunks).await
    }

    async fn query(
        &self,
        text: &str,
        n_results: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<QueryHit>, SearchError> {
        (**self).query(text, n_results, filter).await
    }

    async fn get(&self, filter: Option<&MetadataFilter>) -> Result<Vec<StoredRecord>, SearchError> {
        (**self).get(filter).await
    }

    async fn count(&self, filter: Option<&MetadataFilter>) -> Result<usize, SearchError> {
        (**self).count(filter).await
    }
}
