//! Tool names and the JSON schemas advertised through `tools/list`.

use serde_json::{json, Value};
use techbooks_core::{DEFAULT_MAX_RESULTS, MAX_RESULTS_LIMIT};

pub mod tool_names {
    pub const SEARCH_TECHNICAL_BOOKS: &str = "search_technical_books";
    pub const LIST_AVAILABLE_BOOKS: &str = "list_available_books";
}

pub fn get_tool_definitions() -> Vec<Value> {
    vec![
        json!({
            "name": tool_names::SEARCH_TECHNICAL_BOOKS,
            "description": "Search across your technical book library for relevant information. \
                Use natural language queries to find content about programming, data science, \
                analytics, or any technical topic covered in your books.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "The search query (e.g., 'LOD calculations', 'pandas merge', 'SQL joins')"
                    },
                    "max_results": {
                        "type": "integer",
                        "description": "Maximum number of results to return (default: 5)",
                        "default": DEFAULT_MAX_RESULTS,
                        "minimum": 1,
                        "maximum": MAX_RESULTS_LIMIT
                    },
                    "filter_topic": {
                        "type": "string",
                        "description": "Optional filter by topic (e.g., 'tableau', 'python', 'sql')"
                    }
                },
                "required": ["query"]
            }
        }),
        json!({
            "name": tool_names::LIST_AVAILABLE_BOOKS,
            "description": "Get a list of all books in the knowledge base with their chunk counts",
            "inputSchema": {
                "type": "object",
                "properties": {}
            }
        }),
    ]
}
