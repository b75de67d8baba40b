//! MCP stdio server exposing `search_technical_books` and `list_available_books`.

pub mod handlers;
pub mod protocol;
pub mod server;
pub mod tools;

pub use handlers::{Handlers, SERVER_NAME};
pub use server::McpServer;
