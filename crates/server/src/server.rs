//! Newline-delimited JSON-RPC loop. One request is handled at a time.

use anyhow::Result;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, error, info, warn};

use techbooks_core::VectorStore;

use crate::handlers::Handlers;
use crate::protocol::{error_codes, JsonRpcResponse};

pub struct McpServer<S> {
    handlers: Handlers<S>,
}

impl<S> McpServer<S>
where
    S: VectorStore,
{
    pub fn new(handlers: Handlers<S>) -> Self {
        Self { handlers }
    }

    /// Serves requests until the reader reaches EOF.
    pub async fn run<R, W>(&self, mut reader: R, mut writer: W) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut buffer = Vec::new();
        info!("Server ready, waiting for requests");

        loop {
            buffer.clear();
            let bytes_read = reader.read_until(b'\n', &mut buffer).await.map_err(|e| {
                error!("Failed to read request: {}", e);
                anyhow::anyhow!("read error: {}", e)
            })?;

            if bytes_read == 0 {
                info!("input closed (EOF), shutting down");
                break;
            }

            let line = match std::str::from_utf8(&buffer) {
                Ok(line) => line,
                Err(e) => {
                    warn!("Request is not valid UTF-8: {}", e);
                    let response = JsonRpcResponse::error(
                        None,
                        error_codes::PARSE_ERROR,
                        format!("Parse error: request is not valid UTF-8 ({e})"),
                    );
                    write_response(&mut writer, &response).await?;
                    continue;
                }
            };

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            debug!("Received: {}", trimmed);

            let Some(response) = self.handlers.handle_line(trimmed).await else {
                debug!("Notification handled, no response needed");
                continue;
            };

            write_response(&mut writer, &response).await?;
        }

        Ok(())
    }
}

async fn write_response<W>(writer: &mut W, response: &JsonRpcResponse) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let response_json = serde_json::to_string(response)?;
    debug!("Sending: {}", response_json);
    writer.write_all(response_json.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await?;
    Ok(())
}
