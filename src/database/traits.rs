//! Backend session traits.

use crate::database::result::QueryOutcome;
use crate::error::DbResult;
use async_trait::async_trait;

/// Positional parameter syntax understood by a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaceholderStyle {
    /// `$1, $2, ...` (PostgreSQL)
    Dollar,
    /// `@P1, @P2, ...` (SQL Server)
    AtP,
    /// `?` per occurrence (MySQL, MariaDB, SQLite)
    Question,
}

/// One live backend session.
///
/// Implementations: [`PostgresSession`](crate::database::postgres::PostgresSession),
/// [`MssqlSession`](crate::database::mssql::MssqlSession),
/// [`MysqlSession`](crate::database::mysql::MysqlSession),
/// [`SqliteSession`](crate::database::sqlite::SqliteSession).
#[async_trait]
pub trait Session: Send + Sync {
    /// Executes one statement with positional text parameters.
    ///
    /// # Errors
    ///
    /// Returns [`DatabaseError::QueryFailed`](crate::error::DatabaseError::QueryFailed)
    /// for any failure, including a dropped network connection.
    async fn execute(&self, sql: &str, params: &[String]) -> DbResult<QueryOutcome>;

    /// Releases the session. Further use after close is a caller bug.
    async fn close(&self) -> DbResult<()>;
}

/// Opens fresh sessions against one fixed descriptor.
#[async_trait]
pub trait SessionFactory: Send + Sync {
    /// Returns the driver name (e.g., "mssql", "postgresql").
    fn name(&self) -> &'static str;

    fn placeholder_style(&self) -> PlaceholderStyle;

    /// Opens a brand-new session; never hands back a previously closed one.
    ///
    /// # Errors
    ///
    /// Returns [`DatabaseError::ConnectionFailed`](crate::error::DatabaseError::ConnectionFailed)
    /// if the backend cannot be reached or rejects the login.
    async fn open(&self) -> DbResult<Box<dyn Session>>;
}
