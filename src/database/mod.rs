//! Database abstraction layer.
//!
//! One [`ManagedConnection`] per target database, backed by a vendor-specific
//! [`SessionFactory`].
//!
//! # Feature Flags
//!
//! - `mssql` - Microsoft SQL Server via `tiberius` (enabled by default)
//! - `postgres` - PostgreSQL via `tokio-postgres` (enabled by default)
//! - `mysql` - MySQL and MariaDB via `mysql_async` (enabled by default)
//! - `sqlite` - SQLite via `rusqlite` (enabled by default)
//!
//! # Example
//!
//! ```toml
//! # Cargo.toml - Use only SQL Server
//! [dependencies]
//! dbproxy-mcp = { version = "0.1", default-features = false, features = ["mssql"] }
//! ```

pub mod connection;
pub mod connection_string;
pub mod current;
pub mod metrics;
#[cfg(test)]
pub(crate) mod mock;
#[cfg(feature = "mssql")]
pub mod mssql;
#[cfg(feature = "mysql")]
pub mod mysql;
#[cfg(feature = "postgres")]
pub mod postgres;
pub mod result;
#[cfg(feature = "sqlite")]
pub mod sqlite;
pub mod traits;
pub mod watchdog;

pub use connection::{ConnectionMetadata, DEFAULT_IDLE_TIMEOUT, ManagedConnection, ScopedConnection};
pub use connection_string::{ConnectionDescriptor, MSSQL_ODBC_DRIVER, build_descriptor};
pub use current::CurrentConnection;
pub use metrics::{ConnectionMetrics, MetricsSnapshot};
pub use result::*;
pub use traits::{PlaceholderStyle, Session, SessionFactory};
pub use watchdog::{IdleWatchdog, WatchdogTicket};

use crate::config::Vendor;
use crate::error::{DatabaseError, DbResult};
use std::sync::Arc;
use std::time::Duration;

/// Selects the session factory for a descriptor's vendor.
///
/// # Errors
///
/// Returns [`DatabaseError::DriverUnavailable`] for Oracle and for any vendor
/// whose feature is disabled.
pub fn open_factory(
    descriptor: &ConnectionDescriptor,
    connect_timeout: Duration,
) -> DbResult<Arc<dyn SessionFactory>> {
    #[cfg(not(all(feature = "mssql", feature = "postgres", feature = "mysql", feature = "sqlite")))]
    let _ = connect_timeout;

    match descriptor.vendor {
        #[cfg(feature = "mssql")]
        Vendor::Mssql => Ok(Arc::new(mssql::MssqlFactory::new(
            descriptor.clone(),
            connect_timeout,
        ))),

        #[cfg(feature = "postgres")]
        Vendor::Postgresql => Ok(Arc::new(postgres::PostgresFactory::new(
            descriptor.clone(),
            connect_timeout,
        ))),

        #[cfg(feature = "mysql")]
        Vendor::Mysql | Vendor::Mariadb => Ok(Arc::new(mysql::MysqlFactory::new(
            descriptor.clone(),
            connect_timeout,
        ))),

        #[cfg(feature = "sqlite")]
        Vendor::Sqlite => Ok(Arc::new(sqlite::SqliteFactory::new(&descriptor.database))),

        Vendor::Oracle => Err(DatabaseError::DriverUnavailable(Vendor::Oracle.to_string())),

        #[allow(unreachable_patterns)]
        other => Err(DatabaseError::DriverUnavailable(format!(
            "{} (enable the '{}' feature)",
            other,
            feature_for(other)
        ))),
    }
}

fn feature_for(vendor: Vendor) -> &'static str {
    match vendor {
        Vendor::Mssql => "mssql",
        Vendor::Postgresql => "postgres",
        Vendor::Mysql | Vendor::Mariadb => "mysql",
        Vendor::Sqlite => "sqlite",
        Vendor::Oracle => "oracle",
    }
}
