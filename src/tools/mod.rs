//! MCP tool definitions and registry.

pub mod connection;
pub mod credentials;
pub mod diagnostics;
pub mod registry;
pub mod ticketing;

pub use connection::{CloseConnectionTool, ConnectionInfoTool, SetCurrentConnectionTool};
pub use credentials::{
    DeleteCredentialsTool, ListVaultsTool, StoreDbCredentialsTool, StoreServiceNowCredentialsTool,
};
pub use diagnostics::DiagnosticTool;
pub use registry::{ToolHandler, ToolRegistry, parse_args};
pub use ticketing::TicketingTool;

use crate::credentials::{CredentialStore, Vault};
use crate::database::CurrentConnection;
use crate::diagnostics::{Diagnostic, DiagnosticRunner};
use crate::ticketing::{TicketingClient, TicketingTable};
use std::sync::Arc;

/// Create and register all tools.
pub fn create_registry(
    store: Arc<CredentialStore>,
    vault: Vault,
    current: CurrentConnection,
    runner: Arc<DiagnosticRunner>,
    ticketing: Arc<TicketingClient>,
) -> ToolRegistry {
    let registry = ToolRegistry::new();

    // Credentials
    registry.register(StoreDbCredentialsTool::new(Arc::clone(&store), vault));
    registry.register(StoreServiceNowCredentialsTool::new(Arc::clone(&store), vault));
    registry.register(DeleteCredentialsTool::new(Arc::clone(&store)));
    registry.register(ListVaultsTool::new(vault));

    // Connection
    registry.register(SetCurrentConnectionTool::new(Arc::clone(&store), current.clone()));
    registry.register(CloseConnectionTool::new(current.clone()));
    registry.register(ConnectionInfoTool::new(current.clone()));

    for diagnostic in Diagnostic::ALL {
        registry.register(DiagnosticTool::new(diagnostic, Arc::clone(&runner), current.clone()));
    }

    for table in [TicketingTable::Users, TicketingTable::Roles, TicketingTable::Incidents] {
        registry.register(TicketingTool::new(table, Arc::clone(&store), Arc::clone(&ticketing)));
    }

    registry
}
