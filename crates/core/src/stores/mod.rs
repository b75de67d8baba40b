pub mod chroma;
pub mod local;

pub use chroma::ChromaStore;
pub use local::LocalStore;

use crate::config::Settings;
use crate::embeddings::build_embedder;
use crate::store::VectorStore;
use crate::SearchError;
use tracing::info;

/// How a binary wants the collection opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// Create the collection when it is missing (indexing).
    GetOrCreate,
    /// Fail when the collection is missing (serving).
    Existing,
}

/// Opens the configured backend: a Chroma server when `CHROMA_URL` is set, otherwise the
/// local store under `CHROMA_DB_PATH`.
pub async fn open_store(
    settings: &Settings,
    mode: OpenMode,
) -> Result<Box<dyn VectorStore>, SearchError> {
    let embedder = build_embedder(settings);

    match &settings.chroma_url {
        Some(url) => {
            info!(url = %url, collection = %settings.collection, "using chroma server");
            let store = ChromaStore::new(url, settings.collection.clone(), embedder)?;
            match mode {
                OpenMode::GetOrCreate => store.ensure_collection().await?,
                OpenMode::Existing => store.connect_existing().await?,
            }
            Ok(Box::new(store))
        }
        None => {
            info!(
                path = %settings.db_path.display(),
                collection = %settings.collection,
                "using local store"
            );
            let store = match mode {
                OpenMode::GetOrCreate => {
                    LocalStore::open(&settings.db_path, settings.collection.clone(), embedder)
                        .await?
                }
                OpenMode::Existing => {
                    LocalStore::open_existing(
                        &settings.db_path,
                        settings.collection.clone(),
                        embedder,
                    )
                    .await?
                }
            };
            Ok(Box::new(store))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn serving_needs_an_indexed_collection() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let settings = Settings {
            db_path: dir.path().join("chroma_db"),
            ..Settings::default()
        };

        let missing = open_store(&settings, OpenMode::Existing).await;
        assert!(matches!(missing, Err(SearchError::NotReady(_))));

        let created = open_store(&settings, OpenMode::GetOrCreate).await?;
        assert_eq!(created.count(None).await?, 0);

        let reopened = open_store(&settings, OpenMode::Existing).await?;
        assert_eq!(reopened.count(None).await?, 0);
        Ok(())
    }
}
