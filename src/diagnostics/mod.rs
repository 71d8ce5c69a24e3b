//! Diagnostic query runner.
//!
//! Each [`Diagnostic`] names one catalog template and the parameters it takes.
//! [`DiagnosticRunner::run`] is a failure boundary: errors are logged with the
//! diagnostic name and turned into [`DiagnosticOutcome::Unavailable`].

use crate::catalog::{QueryCatalog, QueryParams};
use crate::database::{ManagedConnection, QueryOutcome, Row};
use crate::error::Result;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tracing::{error, info, instrument};

/// Text returned when a statement produced no result columns.
pub const NO_ROWS_MARKER: &str = "Query executed successfully";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Diagnostic {
    HealthCheck,
    DbSize,
    LogSpace,
    BlockingSessions,
    IndexFragmentation,
    ChangePassword,
}

impl Diagnostic {
    pub const ALL: [Diagnostic; 6] = [
        Diagnostic::HealthCheck,
        Diagnostic::DbSize,
        Diagnostic::LogSpace,
        Diagnostic::BlockingSessions,
        Diagnostic::IndexFragmentation,
        Diagnostic::ChangePassword,
    ];

    /// Catalog template this diagnostic runs.
    pub fn template_name(&self) -> &'static str {
        match self {
            Self::HealthCheck => "health_check",
            Self::DbSize => "db_size",
            Self::LogSpace => "log_space",
            Self::BlockingSessions => "blocking_sessions",
            Self::IndexFragmentation => "index_frag",
            Self::ChangePassword => "change_pwd",
        }
    }

    pub fn parameter_names(&self) -> &'static [&'static str] {
        match self {
            Self::DbSize | Self::IndexFragmentation => &["db_name"],
            Self::ChangePassword => &["login_name", "new_password"],
            Self::HealthCheck | Self::LogSpace | Self::BlockingSessions => &[],
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::HealthCheck => "Health check",
            Self::DbSize => "DB size",
            Self::LogSpace => "Log space",
            Self::BlockingSessions => "Blocking sessions",
            Self::IndexFragmentation => "Index fragmentation",
            Self::ChangePassword => "Change password",
        })
    }
}

/// What a diagnostic hands back to its caller. Never an error.
#[derive(Debug, Clone, PartialEq)]
pub enum DiagnosticOutcome {
    /// Rows in backend order, columns in backend order.
    Rows(Vec<Row>),
    /// The statement ran and produced no result set.
    Executed,
    /// The diagnostic failed; the cause was logged.
    Unavailable,
}

impl DiagnosticOutcome {
    pub fn rows(&self) -> Option<&[Row]> {
        match self {
            Self::Rows(rows) => Some(rows),
            _ => None,
        }
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable)
    }

    /// Rows as a JSON array, [`NO_ROWS_MARKER`] as a string, failure as `[]`.
    pub fn to_json(&self) -> Value {
        match self {
            Self::Rows(rows) => serde_json::to_value(rows).unwrap_or_else(|_| Value::Array(Vec::new())),
            Self::Executed => Value::String(NO_ROWS_MARKER.to_string()),
            Self::Unavailable => Value::Array(Vec::new()),
        }
    }
}

impl From<QueryOutcome> for DiagnosticOutcome {
    fn from(outcome: QueryOutcome) -> Self {
        match outcome {
            QueryOutcome::Rows { rows, .. } => Self::Rows(rows),
            QueryOutcome::NoRows { .. } => Self::Executed,
        }
    }
}

pub struct DiagnosticRunner {
    catalog: Arc<QueryCatalog>,
}

impl DiagnosticRunner {
    pub fn new(catalog: Arc<QueryCatalog>) -> Self {
        Self { catalog }
    }

    pub fn catalog(&self) -> &QueryCatalog {
        &self.catalog
    }

    #[instrument(skip(self, connection, params), fields(diagnostic = diagnostic.template_name()))]
    pub async fn run(
        &self,
        connection: &ManagedConnection,
        diagnostic: Diagnostic,
        params: &QueryParams,
    ) -> DiagnosticOutcome {
        match self.try_run(connection, diagnostic, params).await {
            Ok(outcome) => {
                info!("{} query executed successfully", diagnostic);
                outcome
            }
            Err(e) => {
                error!("Error running {} query: {}", diagnostic, e);
                DiagnosticOutcome::Unavailable
            }
        }
    }

    async fn try_run(
        &self,
        connection: &ManagedConnection,
        diagnostic: Diagnostic,
        params: &QueryParams,
    ) -> Result<DiagnosticOutcome> {
        let template = self.catalog.lookup(diagnostic.template_name())?;
        let outcome = connection.execute(template, params).await?;
        Ok(outcome.into())
    }

    pub async fn check_health(&self, connection: &ManagedConnection) -> DiagnosticOutcome {
        self.run(connection, Diagnostic::HealthCheck, &QueryParams::new()).await
    }

    pub async fn check_db_size(&self, connection: &ManagedConnection, db_name: &str) -> DiagnosticOutcome {
        let params = single("db_name", db_name);
        self.run(connection, Diagnostic::DbSize, &params).await
    }

    pub async fn check_log_space(&self, connection: &ManagedConnection) -> DiagnosticOutcome {
        self.run(connection, Diagnostic::LogSpace, &QueryParams::new()).await
    }

    pub async fn check_blocking_sessions(&self, connection: &ManagedConnection) -> DiagnosticOutcome {
        self.run(connection, Diagnostic::BlockingSessions, &QueryParams::new())
            .await
    }

    pub async fn check_index_fragmentation(
        &self,
        connection: &ManagedConnection,
        db_name: &str,
    ) -> DiagnosticOutcome {
        let params = single("db_name", db_name);
        self.run(connection, Diagnostic::IndexFragmentation, &params).await
    }

    pub async fn change_password(
        &self,
        connection: &ManagedConnection,
        login_name: &str,
        new_password: &str,
    ) -> DiagnosticOutcome {
        let mut params = single("login_name", login_name);
        params.insert("new_password".into(), new_password.into());
        self.run(connection, Diagnostic::ChangePassword, &params).await
    }
}

fn single(name: &str, value: &str) -> QueryParams {
    let mut params = QueryParams::new();
    params.insert(name.into(), value.into());
    params
}
