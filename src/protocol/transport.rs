//! Newline-delimited JSON-RPC transport.

use crate::error::{McpError, ProtocolError, Result};
use crate::protocol::types::{JsonRpcResponse, Message};
use async_trait::async_trait;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader, Stdin, Stdout};
use tokio::sync::Mutex;
use tracing::{debug, error, trace};

#[async_trait]
pub trait Transport: Send + Sync {
    /// Next inbound message, or `None` at end of input.
    async fn read_message(&self) -> Result<Option<Message>>;
    async fn write_response(&self, response: &JsonRpcResponse) -> Result<()>;
}

/// One JSON message per line over any async reader/writer pair.
pub struct LineTransport<R, W> {
    reader: Mutex<R>,
    writer: Mutex<W>,
}

/// The transport the binary runs on; stdout is reserved for protocol traffic.
pub type StdioTransport = LineTransport<BufReader<Stdin>, Stdout>;

impl StdioTransport {
    pub fn stdio() -> Self {
        LineTransport::new(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
    }
}

impl<R, W> LineTransport<R, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader: Mutex::new(reader),
            writer: Mutex::new(writer),
        }
    }

    pub fn into_writer(self) -> W {
        self.writer.into_inner()
    }

    /// Skips blank lines; `None` only at end of input.
    async fn read_line(&self) -> Result<Option<String>> {
        let mut reader = self.reader.lock().await;
        loop {
            let mut line = String::new();
            let read = reader.read_line(&mut line).await.map_err(|e| {
                error!("Error reading from input: {}", e);
                McpError::Io(e)
            })?;
            if read == 0 {
                return Ok(None);
            }
            let line = line.trim();
            if !line.is_empty() {
                trace!("Received line: {}", line);
                return Ok(Some(line.to_string()));
            }
        }
    }

    async fn write_line(&self, content: &str) -> Result<()> {
        let mut writer = self.writer.lock().await;
        trace!("Sending line: {}", content);
        writer.write_all(content.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;
        Ok(())
    }
}

#[async_trait]
impl<R, W> Transport for LineTransport<R, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    async fn read_message(&self) -> Result<Option<Message>> {
        let Some(line) = self.read_line().await? else {
            return Ok(None);
        };

        match serde_json::from_str::<Message>(&line) {
            Ok(message) => {
                if let Message::Request(ref request) = message {
                    debug!("Received request: method={}", request.method);
                }
                Ok(Some(message))
            }
            Err(e) => {
                error!("Failed to parse message: {}", e);
                Err(McpError::Protocol(ProtocolError::ParseError))
            }
        }
    }

    async fn write_response(&self, response: &JsonRpcResponse) -> Result<()> {
        let json = serde_json::to_string(response)?;
        debug!("Sending response: id={:?}", response.id);
        self.write_line(&json).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::types::RequestId;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn test_reads_requests_and_skips_blank_lines() {
        let input = b"\n{\"jsonrpc\":\"2.0\",\"id\":7,\"method\":\"ping\"}\n\n".as_slice();
        let transport = LineTransport::new(input, Vec::new());

        let Some(Message::Request(request)) = transport.read_message().await.unwrap() else {
            panic!("expected a request");
        };
        assert_eq!(request.method, "ping");
        assert_eq!(request.id, Some(RequestId::Number(7)));
        assert!(transport.read_message().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_garbage_is_a_parse_error() {
        let transport = LineTransport::new(b"not json\n".as_slice(), Vec::new());
        let err = transport.read_message().await.unwrap_err();
        assert!(matches!(err, McpError::Protocol(ProtocolError::ParseError)));
    }

    #[tokio::test]
    async fn test_responses_are_written_one_per_line() {
        let (client, server) = tokio::io::duplex(1024);
        let transport = LineTransport::new(b"".as_slice(), server);

        transport
            .write_response(&JsonRpcResponse::success(Some(1.into()), serde_json::json!({})))
            .await
            .unwrap();
        drop(transport);

        let mut written = String::new();
        let mut client = client;
        client.read_to_string(&mut written).await.unwrap();
        assert_eq!(written, "{\"jsonrpc\":\"2.0\",\"id\":1,\"result\":{}}\n");
    }
}
