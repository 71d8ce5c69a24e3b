//! MCP request handler backed by [`ServerState`].

use crate::error::ProtocolResult;
use crate::protocol::{
    CallToolParams, CallToolResult, Handler, Implementation, InitializeParams, InitializeResult,
    ListToolsResult, MCP_VERSION, ServerCapabilities, ToolsCapability,
};
use crate::server::state::ServerState;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, error, info};

const INSTRUCTIONS: &str = "Database and ticketing proxy. \
    Store credentials with store_db_credentials or store_sn_credentials; both return a uuid. \
    Call set_current_connection with a database uuid before running check_health, check_db_size, \
    check_log_space, check_blocking_sessions, check_index_fragmentation or change_password. \
    get_sn_users, get_sn_roles and get_sn_incidents take a ServiceNow uuid.";

pub struct McpHandler {
    state: Arc<ServerState>,
}

impl McpHandler {
    pub fn new(state: Arc<ServerState>) -> Self {
        Self { state }
    }

    pub fn state(&self) -> &Arc<ServerState> {
        &self.state
    }
}

#[async_trait]
impl Handler for McpHandler {
    async fn initialize(&self, params: InitializeParams) -> ProtocolResult<InitializeResult> {
        info!(
            "Initialize request from {} v{} (protocol {})",
            params.client_info.name, params.client_info.version, params.protocol_version
        );
        self.state.set_initialized(params.client_info);

        Ok(InitializeResult {
            protocol_version: MCP_VERSION.into(),
            capabilities: ServerCapabilities {
                tools: Some(ToolsCapability {
                    list_changed: Some(false),
                }),
            },
            server_info: Implementation {
                name: self.state.config.name.to_string(),
                version: self.state.config.version.to_string(),
            },
            instructions: Some(INSTRUCTIONS.into()),
        })
    }

    async fn shutdown(&self) -> ProtocolResult<()> {
        info!("Shutdown requested, closing current connection");
        self.state.current.close().await;
        Ok(())
    }

    async fn list_tools(&self) -> ProtocolResult<ListToolsResult> {
        let tools = self.state.tools.list();
        debug!("Listing {} tools", tools.len());
        Ok(ListToolsResult { tools })
    }

    async fn call_tool(&self, params: CallToolParams) -> ProtocolResult<CallToolResult> {
        let call = self.state.record_tool_call();
        debug!(call, "Tool call: {}", params.name);

        match self.state.tools.execute(params).await {
            Ok(result) => Ok(result),
            Err(e) => {
                error!("Tool execution error: {}", e);
                Ok(CallToolResult::error(e.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::QueryCatalog;
    use crate::config::ProxyConfig;
    use serde_json::json;
    use tempfile::TempDir;

    fn handler(dir: &TempDir) -> McpHandler {
        let config = ProxyConfig::builder()
            .db_credentials_path(dir.path().join("db.jsonl"))
            .servicenow_credentials_path(dir.path().join("sn.jsonl"))
            .build()
            .unwrap();
        let state = ServerState::builder()
            .config(config)
            .catalog(QueryCatalog::new())
            .build()
            .unwrap();
        McpHandler::new(Arc::new(state))
    }

    #[tokio::test]
    async fn test_initialize_records_client() {
        let dir = TempDir::new().unwrap();
        let handler = handler(&dir);
        let params: InitializeParams = serde_json::from_value(json!({
            "protocolVersion": MCP_VERSION,
            "clientInfo": {"name": "desktop", "version": "0.9"}
        }))
        .unwrap();

        let result = handler.initialize(params).await.unwrap();
        assert_eq!(result.server_info.name, "dbproxy-mcp");
        assert!(result.capabilities.tools.is_some());
        assert_eq!(handler.state().client_info().unwrap().name, "desktop");
    }

    #[tokio::test]
    async fn test_tool_errors_become_error_results() {
        let dir = TempDir::new().unwrap();
        let handler = handler(&dir);

        let result = handler
            .call_tool(CallToolParams {
                name: "check_db_size".into(),
                arguments: json!({"db_name": "Orders"}),
            })
            .await
            .unwrap();

        assert!(result.is_error());
        assert!(result.joined_text().contains("set_current_connection"));
        assert_eq!(handler.state().tool_calls(), 1);
    }

    #[tokio::test]
    async fn test_unknown_tool() {
        let dir = TempDir::new().unwrap();
        let handler = handler(&dir);

        let result = handler
            .call_tool(CallToolParams {
                name: "execute_query".into(),
                arguments: json!({}),
            })
            .await
            .unwrap();
        assert!(result.is_error());
        assert!(result.joined_text().contains("Tool not found: execute_query"));
    }

    #[tokio::test]
    async fn test_store_then_delete_through_handler() {
        let dir = TempDir::new().unwrap();
        let handler = handler(&dir);

        let stored = handler
            .call_tool(CallToolParams {
                name: "store_sn_credentials".into(),
                arguments: json!({
                    "name": "dev",
                    "instance_url": "https://dev.service-now.com",
                    "username": "admin",
                    "password": "pw"
                }),
            })
            .await
            .unwrap();
        let uuid = stored.joined_text();

        let deleted = handler
            .call_tool(CallToolParams {
                name: "delete_credentials".into(),
                arguments: json!({"uuid": uuid, "type": "servicenow"}),
            })
            .await
            .unwrap();
        assert!(!deleted.is_error());
    }
}
