//! SQL Server sessions using `tiberius` over a tokio TCP stream.

use crate::database::connection_string::ConnectionDescriptor;
use crate::database::result::{CellValue, QueryOutcome, Row};
use crate::database::traits::{PlaceholderStyle, Session, SessionFactory};
use crate::error::{DatabaseError, DbResult};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use std::time::Duration;
use tiberius::{AuthMethod, Client, Config, EncryptionLevel, Row as TiberiusRow, ToSql};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};
use tracing::{debug, instrument};

type TdsClient = Client<Compat<TcpStream>>;

/// Opens one TDS client per session.
///
/// Certificates are always trusted, mirroring `TrustServerCertificate=yes` in
/// the rendered descriptor.
pub struct MssqlFactory {
    descriptor: ConnectionDescriptor,
    connect_timeout: Duration,
}

impl MssqlFactory {
    pub fn new(descriptor: ConnectionDescriptor, connect_timeout: Duration) -> Self {
        Self {
            descriptor,
            connect_timeout,
        }
    }

    fn tiberius_config(&self) -> Config {
        let d = &self.descriptor;
        let mut config = Config::new();
        config.host(&d.host);
        config.port(d.port);
        config.database(&d.database);
        config.authentication(AuthMethod::sql_server(&d.username, d.password()));
        config.trust_cert();
        config.encryption(EncryptionLevel::On);
        config
    }
}

#[async_trait]
impl SessionFactory for MssqlFactory {
    fn name(&self) -> &'static str {
        "mssql"
    }

    fn placeholder_style(&self) -> PlaceholderStyle {
        PlaceholderStyle::AtP
    }

    #[instrument(skip(self), fields(host = %self.descriptor.host, database = %self.descriptor.database))]
    async fn open(&self) -> DbResult<Box<dyn Session>> {
        let config = self.tiberius_config();
        let connect = async move {
            let tcp = TcpStream::connect(config.get_addr())
                .await
                .map_err(|e| DatabaseError::ConnectionFailed(e.to_string()))?;
            tcp.set_nodelay(true)
                .map_err(|e| DatabaseError::ConnectionFailed(e.to_string()))?;
            Client::connect(config, tcp.compat_write())
                .await
                .map_err(|e| DatabaseError::ConnectionFailed(e.to_string()))
        };

        let client = timeout(self.connect_timeout, connect).await.map_err(|_| {
            DatabaseError::ConnectionFailed(format!(
                "timed out after {}s",
                self.connect_timeout.as_secs()
            ))
        })??;

        debug!("SQL Server session established");
        Ok(Box::new(MssqlSession {
            client: Mutex::new(Some(client)),
        }))
    }
}

/// `tiberius` needs `&mut Client` per statement, so statements on one session
/// are serialized by the mutex.
pub struct MssqlSession {
    client: Mutex<Option<TdsClient>>,
}

#[async_trait]
impl Session for MssqlSession {
    async fn execute(&self, sql: &str, params: &[String]) -> DbResult<QueryOutcome> {
        let mut guard = self.client.lock().await;
        let client = guard
            .as_mut()
            .ok_or_else(|| DatabaseError::QueryFailed("session already closed".into()))?;

        let values: Vec<&dyn ToSql> = params.iter().map(|p| p as &dyn ToSql).collect();
        let mut stream = client.query(sql, &values).await.map_err(query_failed)?;

        let columns: Option<Vec<String>> = stream
            .columns()
            .await
            .map_err(query_failed)?
            .map(|cols| cols.iter().map(|c| c.name().to_string()).collect());

        let tiberius_rows = stream.into_first_result().await.map_err(query_failed)?;

        let Some(columns) = columns.filter(|c| !c.is_empty()) else {
            return Ok(QueryOutcome::no_rows(None));
        };

        let rows = tiberius_rows
            .iter()
            .map(|t_row| {
                columns
                    .iter()
                    .enumerate()
                    .map(|(i, name)| (name.clone(), get_cell_value(t_row, i)))
                    .collect::<Row>()
            })
            .collect();

        Ok(QueryOutcome::rows(columns, rows))
    }

    async fn close(&self) -> DbResult<()> {
        if let Some(client) = self.client.lock().await.take() {
            client
                .close()
                .await
                .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;
        }
        Ok(())
    }
}

fn query_failed(e: tiberius::error::Error) -> DatabaseError {
    DatabaseError::QueryFailed(e.to_string())
}

/// Extract cell value from a Tiberius row by probing the supported types.
fn get_cell_value(row: &TiberiusRow, index: usize) -> CellValue {
    if let Some(val) = row.try_get::<i32, _>(index).ok().flatten() {
        return CellValue::Int(val.into());
    }
    if let Some(val) = row.try_get::<i64, _>(index).ok().flatten() {
        return CellValue::Int(val);
    }
    if let Some(val) = row.try_get::<i16, _>(index).ok().flatten() {
        return CellValue::Int(val.into());
    }
    if let Some(val) = row.try_get::<u8, _>(index).ok().flatten() {
        return CellValue::Int(val.into());
    }
    if let Some(val) = row.try_get::<f64, _>(index).ok().flatten() {
        return CellValue::Float(val);
    }
    if let Some(val) = row.try_get::<f32, _>(index).ok().flatten() {
        return CellValue::Float(val.into());
    }
    if let Some(val) = row.try_get::<bool, _>(index).ok().flatten() {
        return CellValue::Bool(val);
    }
    if let Some(val) = row.try_get::<&str, _>(index).ok().flatten() {
        return CellValue::String(val.to_string());
    }
    if let Some(val) = row.try_get::<Decimal, _>(index).ok().flatten() {
        return CellValue::Decimal(val);
    }
    if let Some(val) = row.try_get::<NaiveDateTime, _>(index).ok().flatten() {
        return CellValue::DateTime(DateTime::from_naive_utc_and_offset(val, Utc));
    }
    if let Some(val) = row.try_get::<DateTime<Utc>, _>(index).ok().flatten() {
        return CellValue::DateTime(val);
    }
    if let Some(val) = row.try_get::<&[u8], _>(index).ok().flatten() {
        return CellValue::Bytes(val.to_vec());
    }

    CellValue::Null
}
