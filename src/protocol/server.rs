//! Request loop binding a [`Handler`] to a [`Transport`].

use crate::error::{McpError, ProtocolError, Result};
use crate::protocol::handler::{Dispatcher, Handler};
use crate::protocol::transport::{StdioTransport, Transport};
use crate::protocol::types::*;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Created,
    Initializing,
    Running,
    ShuttingDown,
    Stopped,
}

impl Lifecycle {
    fn advance(self, method: &str) -> Self {
        match (self, method) {
            (Self::Created, "initialize") => Self::Initializing,
            (Self::Initializing, "initialized" | "notifications/initialized") => Self::Running,
            (_, "shutdown") => Self::ShuttingDown,
            (state, _) => state,
        }
    }
}

pub struct McpServer<H: Handler> {
    name: String,
    handler: Arc<H>,
}

impl<H: Handler> McpServer<H> {
    pub fn new(name: impl Into<String>, handler: H) -> Self {
        Self {
            name: name.into(),
            handler: Arc::new(handler),
        }
    }

    pub fn handler(&self) -> &Arc<H> {
        &self.handler
    }

    /// Serves stdin/stdout until end of input or `shutdown`.
    #[instrument(skip(self), fields(server = %self.name))]
    pub async fn run(self) -> Result<()> {
        let transport = StdioTransport::stdio();
        self.run_with_transport(&transport).await.map(|_| ())
    }

    /// Serves `transport` and returns the lifecycle state it ended in.
    pub async fn run_with_transport<T: Transport>(&self, transport: &T) -> Result<Lifecycle> {
        info!("Starting MCP server: {}", self.name);
        let dispatcher = Dispatcher::new(Arc::clone(&self.handler));
        let mut state = Lifecycle::Created;

        while state != Lifecycle::ShuttingDown {
            let message = match transport.read_message().await {
                Ok(Some(message)) => message,
                Ok(None) => {
                    debug!("End of input, shutting down");
                    break;
                }
                Err(McpError::Protocol(ProtocolError::ParseError)) => {
                    let response = JsonRpcResponse::error(None, JsonRpcError::parse_error());
                    if let Err(e) = transport.write_response(&response).await {
                        error!("Failed to send error response: {}", e);
                    }
                    continue;
                }
                Err(e) => {
                    error!("Transport error: {}", e);
                    return Err(e);
                }
            };

            let request = match message {
                Message::Request(request) => request,
                Message::Response(response) => {
                    warn!("Unexpected response received: {:?}", response.id);
                    continue;
                }
            };

            let next = state.advance(&request.method);
            if next == Lifecycle::Running && state != Lifecycle::Running {
                info!("Client initialized");
            }
            state = next;

            let is_notification = request.is_notification();
            let response = dispatcher.dispatch(request).await;
            if !is_notification && let Err(e) = transport.write_response(&response).await {
                error!("Failed to send response: {}", e);
            }
        }

        info!("Server stopped");
        Ok(Lifecycle::Stopped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProtocolResult;
    use crate::protocol::transport::LineTransport;
    use async_trait::async_trait;

    struct EchoHandler;

    #[async_trait]
    impl Handler for EchoHandler {
        async fn initialize(&self, _params: InitializeParams) -> ProtocolResult<InitializeResult> {
            Ok(InitializeResult {
                protocol_version: MCP_VERSION.into(),
                capabilities: ServerCapabilities::default(),
                server_info: Implementation {
                    name: "echo".into(),
                    version: "0.0.0".into(),
                },
                instructions: None,
            })
        }

        async fn list_tools(&self) -> ProtocolResult<ListToolsResult> {
            Ok(ListToolsResult { tools: Vec::new() })
        }

        async fn call_tool(&self, params: CallToolParams) -> ProtocolResult<CallToolResult> {
            Ok(CallToolResult::text(params.name))
        }
    }

    fn output_lines(output: &[u8]) -> Vec<serde_json::Value> {
        String::from_utf8_lossy(output)
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    #[test]
    fn test_lifecycle_transitions() {
        let state = Lifecycle::Created.advance("ping");
        assert_eq!(state, Lifecycle::Created);
        let state = state.advance("initialize");
        assert_eq!(state, Lifecycle::Initializing);
        let state = state.advance("notifications/initialized");
        assert_eq!(state, Lifecycle::Running);
        assert_eq!(state.advance("shutdown"), Lifecycle::ShuttingDown);
    }

    #[tokio::test]
    async fn test_notifications_get_no_response() {
        let input = concat!(
            r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{"protocolVersion":"2024-11-05","capabilities":{},"clientInfo":{"name":"t","version":"1"}}}"#,
            "\n",
            r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#,
            "\n",
            r#"{"jsonrpc":"2.0","id":2,"method":"tools/call","params":{"name":"check_health"}}"#,
            "\n"
        );
        let transport = LineTransport::new(input.as_bytes(), Vec::new());

        let server = McpServer::new("echo", EchoHandler);
        let state = server.run_with_transport(&transport).await.unwrap();
        assert_eq!(state, Lifecycle::Stopped);

        let writer = transport.into_writer();
        let responses = output_lines(&writer);
        assert_eq!(responses.len(), 2);
        assert_eq!(responses[0]["id"], 1);
        assert_eq!(responses[1]["result"]["content"][0]["text"], "check_health");
    }

    #[tokio::test]
    async fn test_parse_error_does_not_stop_the_loop() {
        let input = "{oops\n{\"jsonrpc\":\"2.0\",\"id\":5,\"method\":\"ping\"}\n";
        let transport = LineTransport::new(input.as_bytes(), Vec::new());

        McpServer::new("echo", EchoHandler)
            .run_with_transport(&transport)
            .await
            .unwrap();

        let responses = output_lines(&transport.into_writer());
        assert_eq!(responses[0]["error"]["code"], -32700);
        assert_eq!(responses[1]["id"], 5);
    }

    #[tokio::test]
    async fn test_shutdown_stops_before_remaining_input() {
        let input = "{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"shutdown\"}\n{\"jsonrpc\":\"2.0\",\"id\":2,\"method\":\"ping\"}\n";
        let transport = LineTransport::new(input.as_bytes(), Vec::new());

        McpServer::new("echo", EchoHandler)
            .run_with_transport(&transport)
            .await
            .unwrap();

        let responses = output_lines(&transport.into_writer());
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0]["id"], 1);
    }
}
