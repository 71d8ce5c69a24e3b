//! Process-wide state shared by the request handler and the tools.

use crate::catalog::QueryCatalog;
use crate::config::ProxyConfig;
use crate::credentials::{CredentialStore, Vault};
use crate::database::CurrentConnection;
use crate::diagnostics::DiagnosticRunner;
use crate::error::{ConfigError, Result};
use crate::protocol::Implementation;
use crate::ticketing::TicketingClient;
use crate::tools::ToolRegistry;
use parking_lot::RwLock;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

pub struct ServerState {
    pub config: ProxyConfig,
    pub credentials: Arc<CredentialStore>,
    pub current: CurrentConnection,
    pub tools: ToolRegistry,
    client_info: RwLock<Option<Implementation>>,
    tool_calls: AtomicU64,
}

impl ServerState {
    pub fn builder() -> ServerStateBuilder {
        ServerStateBuilder::default()
    }

    pub fn is_initialized(&self) -> bool {
        self.client_info.read().is_some()
    }

    pub fn set_initialized(&self, client_info: Implementation) {
        *self.client_info.write() = Some(client_info);
    }

    pub fn client_info(&self) -> Option<Implementation> {
        self.client_info.read().clone()
    }

    pub fn record_tool_call(&self) -> u64 {
        self.tool_calls.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn tool_calls(&self) -> u64 {
        self.tool_calls.load(Ordering::Relaxed)
    }
}

#[derive(Default)]
pub struct ServerStateBuilder {
    config: Option<ProxyConfig>,
    catalog: Option<QueryCatalog>,
    vault: Vault,
}

impl ServerStateBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(mut self, config: ProxyConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Templates to use instead of loading `config.queries_dir`.
    pub fn catalog(mut self, catalog: QueryCatalog) -> Self {
        self.catalog = Some(catalog);
        self
    }

    pub fn vault(mut self, vault: Vault) -> Self {
        self.vault = vault;
        self
    }

    pub fn build(self) -> Result<ServerState> {
        let config = self.config.ok_or(ConfigError::MissingField("config".into()))?;
        let catalog = match self.catalog {
            Some(catalog) => catalog,
            None => QueryCatalog::load(&config.queries_dir)?,
        };

        let credentials = Arc::new(CredentialStore::new(config.credentials.clone()));
        let current = CurrentConnection::new(config.connection.clone());
        let runner = Arc::new(DiagnosticRunner::new(Arc::new(catalog)));
        let ticketing = Arc::new(TicketingClient::new(&config.ticketing)?);

        let tools = crate::tools::create_registry(
            Arc::clone(&credentials),
            self.vault,
            current.clone(),
            runner,
            ticketing,
        );

        Ok(ServerState {
            config,
            credentials,
            current,
            tools,
            client_info: RwLock::new(None),
            tool_calls: AtomicU64::new(0),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::McpError;

    #[test]
    fn test_build_requires_config() {
        let result = ServerState::builder().catalog(QueryCatalog::new()).build();
        assert!(matches!(result, Err(McpError::Config(_))));
    }

    #[test]
    fn test_registers_every_tool() {
        let state = ServerState::builder()
            .config(ProxyConfig::default())
            .catalog(QueryCatalog::new())
            .build()
            .unwrap();

        assert_eq!(state.tools.len(), 16);
        assert!(!state.current.is_set());
        assert!(!state.is_initialized());
    }

    #[test]
    fn test_missing_queries_dir_fails() {
        let config = ProxyConfig::builder()
            .queries_dir("/nonexistent/proxy-queries")
            .build()
            .unwrap();
        let result = ServerState::builder().config(config).build();
        assert!(matches!(result, Err(McpError::Catalog(_))));
    }
}
