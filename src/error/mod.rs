//! Error types for the proxy.
//!
//! Uses `thiserror` for ergonomic error definitions with automatic `From` conversions.

use std::borrow::Cow;
use thiserror::Error;

/// Main error type for the proxy.
#[derive(Debug, Error)]
pub enum McpError {
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Credential error: {0}")]
    Credential(#[from] CredentialError),

    #[error("Query catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("Ticketing error: {0}")]
    Ticketing(#[from] TicketingError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {message}")]
    Internal { message: Cow<'static, str> },
}

/// JSON-RPC 2.0 and MCP protocol errors.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Parse error: invalid JSON")]
    ParseError,

    #[error("Invalid request: {0}")]
    InvalidRequest(Cow<'static, str>),

    #[error("Method not found: {0}")]
    MethodNotFound(String),

    #[error("Invalid params: {0}")]
    InvalidParams(Cow<'static, str>),

    #[error("Internal error: {0}")]
    InternalError(Cow<'static, str>),
}

impl ProtocolError {
    /// Returns the JSON-RPC 2.0 error code.
    pub fn code(&self) -> i32 {
        match self {
            Self::ParseError => -32700,
            Self::InvalidRequest(_) => -32600,
            Self::MethodNotFound(_) => -32601,
            Self::InvalidParams(_) => -32602,
            Self::InternalError(_) => -32603,
        }
    }
}

/// Database-related errors.
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Unsupported database type: {0}")]
    UnsupportedVendor(String),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// A single failed statement on the current session.
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// The statement failed again after the one permitted reconnect.
    #[error("Query execution failed after reconnect: {source}")]
    QueryExecution {
        #[source]
        source: Box<DatabaseError>,
    },

    #[error("Missing query parameter: {0}")]
    MissingParameter(String),

    #[error("No active database connection. Use the 'set_current_connection' tool first.")]
    NotConnected,

    #[error("No native driver available for {0}")]
    DriverUnavailable(String),
}

/// Credential store errors.
#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("Credential with uuid={id} and type={category} not found")]
    NotFound { id: String, category: String },

    #[error("Malformed credential record on line {line}: {reason}")]
    MalformedRecord { line: usize, reason: String },

    #[error("Credential record has unexpected shape: {0}")]
    UnexpectedValue(String),

    #[error("Credential file IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Credential serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Query catalog errors.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Query template not found: {0}")]
    TemplateNotFound(String),

    #[error("Failed to read query catalog at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Remote ticketing errors.
#[derive(Debug, Error)]
pub enum TicketingError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Ticketing instance answered with status {0}")]
    Status(u16),
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required field: {0}")]
    MissingField(Cow<'static, str>),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue {
        field: Cow<'static, str>,
        message: Cow<'static, str>,
    },
}

/// Tool execution errors.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("Execution failed: {0}")]
    ExecutionFailed(String),
}

/// Result type alias for McpError.
pub type Result<T> = std::result::Result<T, McpError>;

/// Result type alias for DatabaseError.
pub type DbResult<T> = std::result::Result<T, DatabaseError>;

/// Result type alias for CredentialError.
pub type CredentialResult<T> = std::result::Result<T, CredentialError>;

/// Result type alias for ProtocolError.
pub type ProtocolResult<T> = std::result::Result<T, ProtocolError>;
