use crate::models::{BookSummary, MetadataFilter, ScoredResult, SearchOutcome};
use crate::store::VectorStore;
use crate::SearchError;
use std::collections::BTreeSet;
use std::fmt::Write as _;
use tracing::{debug, info};

pub const DEFAULT_MAX_RESULTS: usize = 5;
pub const MAX_RESULTS_LIMIT: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    pub query: String,
    pub max_results: usize,
    pub filter_topic: Option<String>,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            max_results: DEFAULT_MAX_RESULTS,
            filter_topic: None,
        }
    }

    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = max_results;
        self
    }

    pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
        self.filter_topic = Some(topic.into());
        self
    }

    fn validate(&self) -> Result<(), SearchError> {
        if self.query.trim().is_empty() {
            return Err(SearchError::InvalidArgument("query is empty".to_string()));
        }
        if !(1..=MAX_RESULTS_LIMIT).contains(&self.max_results) {
            return Err(SearchError::InvalidArgument(format!(
                "max_results must be between 1 and {MAX_RESULTS_LIMIT}, got {}",
                self.max_results
            )));
        }
        Ok(())
    }

    /// Blank topics count as no filter.
    fn topic_filter(&self) -> Option<MetadataFilter> {
        self.filter_topic
            .as_deref()
            .map(str::trim)
            .filter(|topic| !topic.is_empty())
            .map(|topic| MetadataFilter::SourceContains(topic.to_lowercase()))
    }
}

/// Answers search and catalog requests against an indexed collection.
pub struct QueryService<S> {
    store: S,
}

impl<S> QueryService<S>
where
    S: VectorStore,
{
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Results come back in the store's order (nearest first) with `relevance = 1 - distance`.
    pub async fn search(&self, request: &SearchRequest) -> Result<SearchOutcome, SearchError> {
        request.validate()?;
        let filter = request.topic_filter();
        info!(query = %request.query, max_results = request.max_results, ?filter, "searching");

        let hits = self
            .store
            .query(&request.query, request.max_results, filter.as_ref())
            .await?;

        let results: Vec<ScoredResult> = hits
            .into_iter()
            .filter(|hit| filter.as_ref().map_or(true, |filter| filter.matches(&hit.source)))
            .take(request.max_results)
            .enumerate()
            .map(|(position, hit)| ScoredResult {
                rank: position + 1,
                text: hit.text,
                source: hit.source,
                relevance: 1.0 - hit.distance,
            })
            .collect();

        debug!(count = results.len(), "search finished");
        if results.is_empty() {
            Ok(SearchOutcome::NoResults {
                query: request.query.clone(),
            })
        } else {
            Ok(SearchOutcome::Results {
                query: request.query.clone(),
                results,
            })
        }
    }

    /// Every indexed source in ascending order with its chunk count.
    ///
    /// Issues one count per distinct source, which is only reasonable while the catalog
    /// stays small.
    pub async fn list_books(&self) -> Result<Vec<BookSummary>, SearchError> {
        let sources: BTreeSet<String> = self
            .store
            .get(None)
            .await?
            .into_iter()
            .map(|record| record.source)
            .collect();

        let mut books = Vec::with_capacity(sources.len());
        for source in sources {
            let chunk_count = self
                .store
                .count(Some(&MetadataFilter::SourceEquals(source.clone())))
                .await?;
            books.push(BookSummary {
                source,
                chunk_count,
            });
        }

        Ok(books)
    }
}

impl SearchOutcome {
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::NoResults { .. })
    }

    /// Markdown report handed back to tool callers.
    pub fn render(&self) -> String {
        match self {
            Self::NoResults { query } => format!("No results found for: '{query}'"),
            Self::Results { query, results } => {
                let mut output = format!("Found {} results for: '{}'\n\n", results.len(), query);
                for result in results {
                    let _ = write!(
                        output,
                        "### Result {} (Relevance: {:.2})\n**Source:** {}\n**Content:**\n{}\n\n---\n\n",
                        result.rank, result.relevance, result.source, result.text
                    );
                }
                output
            }
        }
    }
}

pub fn render_book_list(books: &[BookSummary]) -> String {
    let mut output = format!("# Available Books\n\nTotal books indexed: {}\n\n", books.len());
    for (position, book) in books.iter().enumerate() {
        let _ = writeln!(
            output,
            "{}. **{}** - {} indexed chunks",
            position + 1,
            book.source,
            book.chunk_count
        );
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::CharacterNgramEmbedder;
    use crate::models::{Chunk, QueryHit, StoredRecord};
    use crate::stores::LocalStore;
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};

    /// Returns fixed hits and remembers the filter it was queried with.
    #[derive(Default)]
    struct ScriptedStore {
        hits: Vec<QueryHit>,
        seen_filter: Mutex<Option<MetadataFilter>>,
    }

    #[async_trait]
    impl VectorStore for ScriptedStore {
        async fn ensure_collection(&self) -> Result<(), SearchError> {
            Ok(())
        }

        async fn delete_collection(&self) -> Result<(), SearchError> {
            Ok(())
        }

        async fn upsert(&self, _chunks: &[Chunk]) -> Result<(), SearchError> {
            Ok(())
        }

        async fn query(
            &self,
            _text: &str,
            n_results: usize,
            filter: Option<&MetadataFilter>,
        ) -> Result<Vec<QueryHit>, SearchError> {
            if let Ok(mut seen) = self.seen_filter.lock() {
                *seen = filter.cloned();
            }
            Ok(self.hits.iter().take(n_results).cloned().collect())
        }

        async fn get(
            &self,
            _filter: Option<&MetadataFilter>,
        ) -> Result<Vec<StoredRecord>, SearchError> {
            Ok(Vec::new())
        }

        async fn count(&self, _filter: Option<&MetadataFilter>) -> Result<usize, SearchError> {
            Ok(0)
        }
    }

    fn hit(source: &str, text: &str, distance: f64) -> QueryHit {
        QueryHit {
            id: format!("{source}_chunk_0"),
            text: text.to_string(),
            source: source.to_string(),
            distance,
        }
    }

    fn chunk(source: &str, sequence: u64, text: &str) -> Chunk {
        Chunk {
            id: Chunk::make_id(source, sequence),
            text: text.to_string(),
            source: source.to_string(),
        }
    }

    #[tokio::test]
    async fn distances_become_relevance_in_store_order() -> Result<(), SearchError> {
        let store = ScriptedStore {
            hits: vec![
                hit("tableau_book", "LOD expressions", 0.25),
                hit("sql_book", "window functions", 0.5),
            ],
            ..ScriptedStore::default()
        };
        let service = QueryService::new(store);

        let outcome = service.search(&SearchRequest::new("LOD calculations")).await?;
        let SearchOutcome::Results { results, .. } = &outcome else {
            panic!("expected results, got {outcome:?}");
        };

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].rank, 1);
        assert_eq!(results[0].source, "tableau_book");
        assert!((results[0].relevance - 0.75).abs() < 1e-9);
        assert!((results[1].relevance - 0.5).abs() < 1e-9);

        let report = outcome.render();
        assert!(report.starts_with("Found 2 results for: 'LOD calculations'"));
        assert!(report.contains(
            "### Result 1 (Relevance: 0.75)\n**Source:** tableau_book\n**Content:**\nLOD expressions"
        ));
        assert!(report.contains("### Result 2 (Relevance: 0.50)"));
        Ok(())
    }

    #[tokio::test]
    async fn empty_hits_give_explicit_no_results() -> Result<(), SearchError> {
        let service = QueryService::new(ScriptedStore::default());

        let outcome = service.search(&SearchRequest::new("quantum basket weaving")).await?;
        assert!(outcome.is_empty());
        assert_eq!(
            outcome.render(),
            "No results found for: 'quantum basket weaving'"
        );
        Ok(())
    }

    #[tokio::test]
    async fn topic_is_lowercased_and_enforced_client_side() -> Result<(), SearchError> {
        let store = ScriptedStore {
            hits: vec![
                hit("python_cookbook", "decorators", 0.1),
                hit("sql_book", "decorators in sql?", 0.2),
            ],
            ..ScriptedStore::default()
        };
        let service = QueryService::new(store);

        let outcome = service
            .search(&SearchRequest::new("decorators").with_topic("Python"))
            .await?;

        let seen = service
            .store()
            .seen_filter
            .lock()
            .map(|seen| seen.clone())
            .unwrap_or_default();
        assert_eq!(
            seen,
            Some(MetadataFilter::SourceContains("python".to_string()))
        );

        let SearchOutcome::Results { results, .. } = outcome else {
            panic!("expected results");
        };
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].source, "python_cookbook");
        Ok(())
    }

    #[tokio::test]
    async fn blank_topic_means_no_filter() -> Result<(), SearchError> {
        let service = QueryService::new(ScriptedStore::default());
        service
            .search(&SearchRequest::new("joins").with_topic("   "))
            .await?;

        let seen = service
            .store()
            .seen_filter
            .lock()
            .map(|seen| seen.clone())
            .unwrap_or_default();
        assert_eq!(seen, None);
        Ok(())
    }

    #[tokio::test]
    async fn invalid_requests_are_rejected() {
        let service = QueryService::new(ScriptedStore::default());

        for request in [
            SearchRequest::new("   "),
            SearchRequest::new("joins").with_max_results(0),
            SearchRequest::new("joins").with_max_results(11),
        ] {
            let result = service.search(&request).await;
            assert!(
                matches!(result, Err(SearchError::InvalidArgument(_))),
                "{request:?} should be rejected"
            );
        }
    }

    #[tokio::test]
    async fn books_are_sorted_with_accurate_counts() -> Result<(), SearchError> {
        let store =
            LocalStore::in_memory("technical_books", Arc::new(CharacterNgramEmbedder::new(64)))?;
        store
            .upsert(&[
                chunk("tableau_desktop", 0, "dashboards"),
                chunk("pandas_guide", 0, "dataframes"),
                chunk("tableau_desktop", 1, "calculated fields"),
                chunk("sql_basics", 0, "joins"),
                chunk("tableau_desktop", 2, "parameters"),
            ])
            .await?;
        let service = QueryService::new(store);

        let books = service.list_books().await?;
        assert_eq!(
            books,
            vec![
                BookSummary {
                    source: "pandas_guide".to_string(),
                    chunk_count: 1,
                },
                BookSummary {
                    source: "sql_basics".to_string(),
                    chunk_count: 1,
                },
                BookSummary {
                    source: "tableau_desktop".to_string(),
                    chunk_count: 3,
                },
            ]
        );

        let listing = render_book_list(&books);
        assert!(listing.starts_with("# Available Books\n\nTotal books indexed: 3\n\n"));
        assert!(listing.contains("1. **pandas_guide** - 1 indexed chunks\n"));
        assert!(listing.contains("3. **tableau_desktop** - 3 indexed chunks\n"));
        Ok(())
    }

    #[tokio::test]
    async fn search_over_local_store_finds_matching_book() -> Result<(), SearchError> {
        let store =
            LocalStore::in_memory("technical_books", Arc::new(CharacterNgramEmbedder::new(256)))?;
        store
            .upsert(&[
                chunk("pandas_guide", 0, "use pandas merge to join two dataframes on a key column"),
                chunk("tableau_desktop", 0, "fixed level of detail expressions in tableau"),
            ])
            .await?;
        let service = QueryService::new(store);

        let outcome = service
            .search(&SearchRequest::new("merge dataframes").with_topic("TABLEAU"))
            .await?;
        let SearchOutcome::Results { results, .. } = outcome else {
            panic!("expected results");
        };
        assert!(results.iter().all(|result| result.source == "tableau_desktop"));
        Ok(())
    }
}
