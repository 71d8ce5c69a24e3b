//! MCP proxy for database diagnostics and ServiceNow lookups.
//!
//! Stores database and ServiceNow credentials locally, keeps one managed
//! database connection that reopens on demand and closes when idle, and runs a
//! fixed catalog of diagnostic queries against it.
//!
//! # Example
//!
//! ```no_run
//! use dbproxy_mcp::{
//!     config::ProxyConfig,
//!     protocol::McpServer,
//!     server::{McpHandler, ServerState},
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ProxyConfig::builder().from_env()?.build()?;
//!     let state = Arc::new(ServerState::builder().config(config).build()?);
//!
//!     McpServer::new("dbproxy-mcp", McpHandler::new(state)).run().await?;
//!     Ok(())
//! }
//! ```

pub mod catalog;
pub mod config;
pub mod credentials;
pub mod database;
pub mod diagnostics;
pub mod error;
pub mod protocol;
pub mod server;
pub mod ticketing;
pub mod tools;

pub use catalog::{QueryCatalog, QueryParams, QueryTemplate};
pub use config::{ProxyConfig, ProxyConfigBuilder, Vendor};
pub use credentials::{CredentialCategory, CredentialStore, DbCredentials, ServiceNowCredentials};
pub use database::{ConnectionDescriptor, CurrentConnection, ManagedConnection, build_descriptor};
pub use diagnostics::{Diagnostic, DiagnosticOutcome, DiagnosticRunner};
pub use error::{McpError, Result};
pub use protocol::McpServer;
pub use server::{McpHandler, ServerState, ServerStateBuilder};
pub use ticketing::TicketingClient;
