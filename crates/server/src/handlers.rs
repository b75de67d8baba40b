//! Request dispatch and the two tool implementations.
//!
//! Tool failures never become JSON-RPC errors: they are reported as text content with
//! `isError: true` so the serving loop keeps going.

use serde::Deserialize;
use serde_json::{json, Value};
use techbooks_core::{
    render_book_list, QueryService, SearchRequest, VectorStore, DEFAULT_MAX_RESULTS,
};
use tracing::{debug, error, info, warn};

use crate::protocol::{
    error_codes, methods, JsonRpcId, JsonRpcRequest, JsonRpcResponse, JSONRPC_VERSION,
    PROTOCOL_VERSION,
};
use crate::tools::{get_tool_definitions, tool_names};

pub const SERVER_NAME: &str = "technical-knowledge-base";

#[derive(Debug, Deserialize)]
struct SearchArguments {
    query: Option<String>,
    max_results: Option<i64>,
    filter_topic: Option<String>,
}

pub struct Handlers<S> {
    service: QueryService<S>,
}

impl<S> Handlers<S>
where
    S: VectorStore,
{
    pub fn new(service: QueryService<S>) -> Self {
        Self { service }
    }

    /// Parses one line of input and produces the response to write back, if any.
    pub async fn handle_line(&self, input: &str) -> Option<JsonRpcResponse> {
        let request: JsonRpcRequest = match serde_json::from_str(input) {
            Ok(request) => request,
            Err(e) => {
                warn!("Failed to parse request: {}", e);
                return Some(JsonRpcResponse::error(
                    None,
                    error_codes::PARSE_ERROR,
                    format!("Parse error: {e}"),
                ));
            }
        };

        if request.jsonrpc != JSONRPC_VERSION {
            return Some(JsonRpcResponse::error(
                request.id,
                error_codes::INVALID_REQUEST,
                "Invalid JSON-RPC version",
            ));
        }

        self.dispatch(request).await
    }

    /// Notifications (requests without an id) get no response.
    pub async fn dispatch(&self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        let JsonRpcRequest {
            id, method, params, ..
        } = request;
        debug!(method = %method, "dispatching");

        if id.is_none() {
            if method != methods::INITIALIZED {
                debug!(method = %method, "ignoring notification");
            }
            return None;
        }

        let response = match method.as_str() {
            methods::INITIALIZE => self.handle_initialize(id),
            methods::PING => JsonRpcResponse::success(id, json!({})),
            methods::TOOLS_LIST => {
                JsonRpcResponse::success(id, json!({ "tools": get_tool_definitions() }))
            }
            methods::TOOLS_CALL => self.handle_tools_call(id, params).await,
            _ => JsonRpcResponse::error(
                id,
                error_codes::METHOD_NOT_FOUND,
                format!("Method not found: {method}"),
            ),
        };
        Some(response)
    }

    fn handle_initialize(&self, id: Option<JsonRpcId>) -> JsonRpcResponse {
        info!("client initialized session");
        JsonRpcResponse::success(
            id,
            json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": { "tools": { "listChanged": false } },
                "serverInfo": {
                    "name": SERVER_NAME,
                    "version": env!("CARGO_PKG_VERSION"),
                }
            }),
        )
    }

    async fn handle_tools_call(
        &self,
        id: Option<JsonRpcId>,
        params: Option<Value>,
    ) -> JsonRpcResponse {
        let Some(params) = params else {
            return JsonRpcResponse::error(
                id,
                error_codes::INVALID_PARAMS,
                "Missing params for tools/call",
            );
        };

        let Some(tool_name) = params.get("name").and_then(Value::as_str) else {
            return JsonRpcResponse::error(
                id,
                error_codes::INVALID_PARAMS,
                "Missing 'name' parameter in tools/call",
            );
        };

        let arguments = params.get("arguments").cloned().unwrap_or_else(|| json!({}));
        let (text, is_error) = match tool_name {
            tool_names::SEARCH_TECHNICAL_BOOKS => self.search_technical_books(arguments).await,
            tool_names::LIST_AVAILABLE_BOOKS => self.list_available_books().await,
            unknown => (format!("Unknown tool: {unknown}"), true),
        };

        JsonRpcResponse::success(id, tool_result(text, is_error))
    }

    async fn search_technical_books(&self, arguments: Value) -> (String, bool) {
        let request = match search_request(arguments) {
            Ok(request) => request,
            Err(message) => return (format!("Error searching books: {message}"), true),
        };

        info!(query = %request.query, "Searching for");
        match self.service.search(&request).await {
            Ok(outcome) => (outcome.render(), false),
            Err(e) => {
                error!("Search error: {}", e);
                (format!("Error searching books: {e}"), true)
            }
        }
    }

    async fn list_available_books(&self) -> (String, bool) {
        match self.service.list_books().await {
            Ok(books) => (render_book_list(&books), false),
            Err(e) => {
                error!("List books error: {}", e);
                (format!("Error listing books: {e}"), true)
            }
        }
    }
}

fn search_request(arguments: Value) -> Result<SearchRequest, String> {
    let arguments: SearchArguments =
        serde_json::from_value(arguments).map_err(|e| format!("invalid arguments: {e}"))?;

    let query = arguments
        .query
        .ok_or_else(|| "invalid arguments: query is required".to_string())?;
    let max_results = match arguments.max_results {
        None => DEFAULT_MAX_RESULTS,
        // out-of-range values are rejected by the query service
        Some(value) => usize::try_from(value).unwrap_or(0),
    };

    let mut request = SearchRequest::new(query).with_max_results(max_results);
    request.filter_topic = arguments.filter_topic;
    Ok(request)
}

fn tool_result(text: String, is_error: bool) -> Value {
    json!({
        "content": [{ "type": "text", "text": text }],
        "isError": is_error,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Arc;
    use techbooks_core::{
        CharacterNgramEmbedder, Chunk, LocalStore, MetadataFilter, QueryHit, SearchError,
        StoredRecord,
    };

    /// Every call fails, as if the store went away after startup.
    struct UnreachableStore;

    #[async_trait]
    impl VectorStore for UnreachableStore {
        async fn ensure_collection(&self) -> Result<(), SearchError> {
            Err(SearchError::NotReady("gone".to_string()))
        }

        async fn delete_collection(&self) -> Result<(), SearchError> {
            Err(SearchError::NotReady("gone".to_string()))
        }

        async fn upsert(&self, _chunks: &[Chunk]) -> Result<(), SearchError> {
            Err(SearchError::NotReady("gone".to_string()))
        }

        async fn query(
            &self,
            _text: &str,
            _n_results: usize,
            _filter: Option<&MetadataFilter>,
        ) -> Result<Vec<QueryHit>, SearchError> {
            Err(SearchError::NotReady("gone".to_string()))
        }

        async fn get(
            &self,
            _filter: Option<&MetadataFilter>,
        ) -> Result<Vec<StoredRecord>, SearchError> {
            Err(SearchError::NotReady("gone".to_string()))
        }

        async fn count(&self, _filter: Option<&MetadataFilter>) -> Result<usize, SearchError> {
            Err(SearchError::NotReady("gone".to_string()))
        }
    }

    async fn seeded_handlers() -> Handlers<LocalStore> {
        let store = LocalStore::in_memory(
            "technical_books",
            Arc::new(CharacterNgramEmbedder::new(128)),
        )
        .expect("in-memory database");
        store
            .upsert(&[
                Chunk {
                    id: "sql_basics_chunk_0".to_string(),
                    text: "An inner join returns rows with matching keys.".to_string(),
                    source: "sql_basics".to_string(),
                },
                Chunk {
                    id: "python_cookbook_chunk_0".to_string(),
                    text: "Use a list comprehension to build lists.".to_string(),
                    source: "python_cookbook".to_string(),
                },
            ])
            .await
            .expect("in-memory upsert");
        Handlers::new(QueryService::new(store))
    }

    async fn call(handlers: &Handlers<impl VectorStore>, body: Value) -> Value {
        let response = handlers
            .handle_line(&body.to_string())
            .await
            .expect("requests with an id get a response");
        serde_json::to_value(response).expect("serializable response")
    }

    fn text_of(response: &Value) -> &str {
        response["result"]["content"][0]["text"]
            .as_str()
            .unwrap_or_default()
    }

    #[tokio::test]
    async fn initialize_reports_server_info() {
        let handlers = seeded_handlers().await;
        let response = call(
            &handlers,
            json!({"jsonrpc": "2.0", "id": 1, "method": "initialize", "params": {}}),
        )
        .await;

        assert_eq!(response["result"]["serverInfo"]["name"], SERVER_NAME);
        assert_eq!(response["result"]["protocolVersion"], PROTOCOL_VERSION);
    }

    #[tokio::test]
    async fn notifications_get_no_response() {
        let handlers = seeded_handlers().await;
        let line = json!({"jsonrpc": "2.0", "method": "notifications/initialized"}).to_string();
        assert!(handlers.handle_line(&line).await.is_none());
    }

    #[tokio::test]
    async fn protocol_errors_use_jsonrpc_codes() {
        let handlers = seeded_handlers().await;

        let parse = handlers.handle_line("{not json").await.expect("error response");
        assert_eq!(parse.error.map(|e| e.code), Some(error_codes::PARSE_ERROR));

        let version = call(&handlers, json!({"jsonrpc": "1.0", "id": 1, "method": "ping"})).await;
        assert_eq!(version["error"]["code"], error_codes::INVALID_REQUEST);

        let unknown = call(
            &handlers,
            json!({"jsonrpc": "2.0", "id": 2, "method": "resources/list"}),
        )
        .await;
        assert_eq!(unknown["error"]["code"], error_codes::METHOD_NOT_FOUND);

        let nameless = call(
            &handlers,
            json!({"jsonrpc": "2.0", "id": 3, "method": "tools/call", "params": {}}),
        )
        .await;
        assert_eq!(nameless["error"]["code"], error_codes::INVALID_PARAMS);
    }

    #[tokio::test]
    async fn tools_list_advertises_both_tools() {
        let handlers = seeded_handlers().await;
        let response = call(
            &handlers,
            json!({"jsonrpc": "2.0", "id": 1, "method": "tools/list"}),
        )
        .await;
        assert_eq!(response["result"]["tools"].as_array().map(Vec::len), Some(2));
    }

    #[tokio::test]
    async fn search_tool_returns_formatted_report() {
        let handlers = seeded_handlers().await;
        let response = call(
            &handlers,
            json!({
                "jsonrpc": "2.0",
                "id": 4,
                "method": "tools/call",
                "params": {
                    "name": "search_technical_books",
                    "arguments": {"query": "inner join", "max_results": 1, "filter_topic": "SQL"}
                }
            }),
        )
        .await;

        assert_eq!(response["result"]["isError"], false);
        let text = text_of(&response);
        assert!(text.starts_with("Found 1 results for: 'inner join'"), "{text}");
        assert!(text.contains("**Source:** sql_basics"));
    }

    #[tokio::test]
    async fn search_with_unmatched_topic_says_no_results() {
        let handlers = seeded_handlers().await;
        let response = call(
            &handlers,
            json!({
                "jsonrpc": "2.0",
                "id": 5,
                "method": "tools/call",
                "params": {
                    "name": "search_technical_books",
                    "arguments": {"query": "inner join", "filter_topic": "tableau"}
                }
            }),
        )
        .await;

        assert_eq!(response["result"]["isError"], false);
        assert_eq!(text_of(&response), "No results found for: 'inner join'");
    }

    #[tokio::test]
    async fn bad_arguments_are_reported_as_text() {
        let handlers = seeded_handlers().await;
        for arguments in [
            json!({}),
            json!({"query": "joins", "max_results": 50}),
            json!({"query": "joins", "max_results": -1}),
        ] {
            let response = call(
                &handlers,
                json!({
                    "jsonrpc": "2.0",
                    "id": 6,
                    "method": "tools/call",
                    "params": {"name": "search_technical_books", "arguments": arguments}
                }),
            )
            .await;

            assert_eq!(response["result"]["isError"], true);
            assert!(text_of(&response).starts_with("Error searching books:"));
        }
    }

    #[tokio::test]
    async fn list_tool_lists_books_alphabetically() {
        let handlers = seeded_handlers().await;
        let response = call(
            &handlers,
            json!({
                "jsonrpc": "2.0",
                "id": 7,
                "method": "tools/call",
                "params": {"name": "list_available_books"}
            }),
        )
        .await;

        let text = text_of(&response);
        assert!(text.contains("Total books indexed: 2"));
        let python = text.find("python_cookbook").expect("python listed");
        let sql = text.find("sql_basics").expect("sql listed");
        assert!(python < sql);
    }

    #[tokio::test]
    async fn store_failures_become_error_text() {
        let handlers = Handlers::new(QueryService::new(UnreachableStore));

        let search = call(
            &handlers,
            json!({
                "jsonrpc": "2.0",
                "id": 8,
                "method": "tools/call",
                "params": {"name": "search_technical_books", "arguments": {"query": "joins"}}
            }),
        )
        .await;
        assert_eq!(search["result"]["isError"], true);
        assert!(text_of(&search).starts_with("Error searching books: store not available yet"));

        let list = call(
            &handlers,
            json!({
                "jsonrpc": "2.0",
                "id": 9,
                "method": "tools/call",
                "params": {"name": "list_available_books"}
            }),
        )
        .await;
        assert!(text_of(&list).starts_with("Error listing books:"));
    }

    #[tokio::test]
    async fn unknown_tool_is_reported_as_text() {
        let handlers = seeded_handlers().await;
        let response = call(
            &handlers,
            json!({
                "jsonrpc": "2.0",
                "id": 10,
                "method": "tools/call",
                "params": {"name": "delete_everything"}
            }),
        )
        .await;

        assert_eq!(response["result"]["isError"], true);
        assert_eq!(text_of(&response), "Unknown tool: delete_everything");
    }
}
