//! SQLite sessions using `rusqlite` on the blocking thread pool.

use crate::database::result::{CellValue, QueryOutcome, Row};
use crate::database::traits::{PlaceholderStyle, Session, SessionFactory};
use crate::error::{DatabaseError, DbResult};
use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::Connection;
use rusqlite::types::ValueRef;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::task::spawn_blocking;
use tracing::debug;

/// Opens the database file named by the descriptor's `database` field.
pub struct SqliteFactory {
    path: PathBuf,
}

impl SqliteFactory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl SessionFactory for SqliteFactory {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn placeholder_style(&self) -> PlaceholderStyle {
        PlaceholderStyle::Question
    }

    async fn open(&self) -> DbResult<Box<dyn Session>> {
        let path = self.path.clone();
        let conn = spawn_blocking(move || Connection::open(path))
            .await
            .map_err(|e| DatabaseError::ConnectionFailed(e.to_string()))?
            .map_err(|e| DatabaseError::ConnectionFailed(e.to_string()))?;

        debug!(path = %self.path.display(), "SQLite session established");
        Ok(Box::new(SqliteSession {
            conn: Arc::new(Mutex::new(Some(conn))),
        }))
    }
}

pub struct SqliteSession {
    conn: Arc<Mutex<Option<Connection>>>,
}

#[async_trait]
impl Session for SqliteSession {
    async fn execute(&self, sql: &str, params: &[String]) -> DbResult<QueryOutcome> {
        let conn = Arc::clone(&self.conn);
        let sql = sql.to_string();
        let params = params.to_vec();

        spawn_blocking(move || {
            let guard = conn.lock();
            let conn = guard
                .as_ref()
                .ok_or_else(|| DatabaseError::QueryFailed("session already closed".into()))?;
            run_statement(conn, &sql, &params)
        })
        .await
        .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?
    }

    async fn close(&self) -> DbResult<()> {
        let conn = Arc::clone(&self.conn);
        spawn_blocking(move || match conn.lock().take() {
            Some(conn) => conn
                .close()
                .map_err(|(_, e)| DatabaseError::QueryFailed(e.to_string())),
            None => Ok(()),
        })
        .await
        .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?
    }
}

fn run_statement(conn: &Connection, sql: &str, params: &[String]) -> DbResult<QueryOutcome> {
    let mut statement = conn.prepare(sql).map_err(query_failed)?;
    let columns: Vec<String> = statement
        .column_names()
        .into_iter()
        .map(String::from)
        .collect();

    if columns.is_empty() {
        let affected = statement
            .execute(rusqlite::params_from_iter(params.iter()))
            .map_err(query_failed)?;
        return Ok(QueryOutcome::no_rows(Some(affected as u64)));
    }

    let mut cursor = statement
        .query(rusqlite::params_from_iter(params.iter()))
        .map_err(query_failed)?;
    let mut rows = Vec::new();
    while let Some(sqlite_row) = cursor.next().map_err(query_failed)? {
        let mut row = Row::with_capacity(columns.len());
        for (i, name) in columns.iter().enumerate() {
            let value = sqlite_row.get_ref(i).map_err(query_failed)?;
            row.insert(name.clone(), convert_value(value));
        }
        rows.push(row);
    }

    Ok(QueryOutcome::rows(columns, rows))
}

fn query_failed(e: rusqlite::Error) -> DatabaseError {
    DatabaseError::QueryFailed(e.to_string())
}

fn convert_value(value: ValueRef<'_>) -> CellValue {
    match value {
        ValueRef::Null => CellValue::Null,
        ValueRef::Integer(n) => CellValue::Int(n),
        ValueRef::Real(f) => CellValue::Float(f),
        ValueRef::Text(bytes) => CellValue::String(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => CellValue::Bytes(bytes.to_vec()),
    }
}
