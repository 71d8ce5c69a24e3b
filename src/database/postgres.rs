//! PostgreSQL sessions over a single `tokio-postgres` client.

use crate::database::connection_string::ConnectionDescriptor;
use crate::database::result::{CellValue, QueryOutcome, Row};
use crate::database::traits::{PlaceholderStyle, Session, SessionFactory};
use crate::error::{DatabaseError, DbResult};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_postgres::types::{FromSql, ToSql};
use tokio_postgres::{Client, Config, NoTls};
use tracing::{debug, instrument, warn};

/// Opens one `tokio-postgres` client per session.
pub struct PostgresFactory {
    descriptor: ConnectionDescriptor,
    connect_timeout: Duration,
}

impl PostgresFactory {
    pub fn new(descriptor: ConnectionDescriptor, connect_timeout: Duration) -> Self {
        Self {
            descriptor,
            connect_timeout,
        }
    }
}

#[async_trait]
impl SessionFactory for PostgresFactory {
    fn name(&self) -> &'static str {
        "postgresql"
    }

    fn placeholder_style(&self) -> PlaceholderStyle {
        PlaceholderStyle::Dollar
    }

    #[instrument(skip(self), fields(host = %self.descriptor.host, database = %self.descriptor.database))]
    async fn open(&self) -> DbResult<Box<dyn Session>> {
        let d = &self.descriptor;
        let mut config = Config::new();
        config
            .host(&d.host)
            .port(d.port)
            .dbname(&d.database)
            .user(&d.username)
            .password(d.password())
            .connect_timeout(self.connect_timeout);

        let (client, connection) = config
            .connect(NoTls)
            .await
            .map_err(|e| DatabaseError::ConnectionFailed(e.to_string()))?;

        let connection = tokio::spawn(async move {
            if let Err(e) = connection.await {
                warn!("PostgreSQL connection terminated: {}", e);
            }
        });

        debug!("PostgreSQL session established");
        Ok(Box::new(PostgresSession { client, connection }))
    }
}

pub struct PostgresSession {
    client: Client,
    connection: JoinHandle<()>,
}

#[async_trait]
impl Session for PostgresSession {
    async fn execute(&self, sql: &str, params: &[String]) -> DbResult<QueryOutcome> {
        let statement = self.client.prepare(sql).await.map_err(query_failed)?;
        let values: Vec<&(dyn ToSql + Sync)> =
            params.iter().map(|p| p as &(dyn ToSql + Sync)).collect();

        if statement.columns().is_empty() {
            let affected = self
                .client
                .execute(&statement, &values)
                .await
                .map_err(query_failed)?;
            return Ok(QueryOutcome::no_rows(Some(affected)));
        }

        let columns: Vec<String> = statement
            .columns()
            .iter()
            .map(|c| c.name().to_string())
            .collect();
        let type_names: Vec<&str> = statement
            .columns()
            .iter()
            .map(|c| c.type_().name())
            .collect();

        let pg_rows = self
            .client
            .query(&statement, &values)
            .await
            .map_err(query_failed)?;

        let rows = pg_rows
            .iter()
            .map(|pg_row| {
                columns
                    .iter()
                    .enumerate()
                    .map(|(i, name)| (name.clone(), get_cell_value(pg_row, i, type_names[i])))
                    .collect::<Row>()
            })
            .collect();

        Ok(QueryOutcome::rows(columns, rows))
    }

    async fn close(&self) -> DbResult<()> {
        self.connection.abort();
        Ok(())
    }
}

fn query_failed(e: tokio_postgres::Error) -> DatabaseError {
    DatabaseError::QueryFailed(e.to_string())
}

/// Decodes one cell by its PostgreSQL type name. Unknown types fall back to text.
fn get_cell_value(row: &tokio_postgres::Row, index: usize, type_name: &str) -> CellValue {
    fn get<'a, T: FromSql<'a>>(row: &'a tokio_postgres::Row, index: usize) -> Option<Option<T>> {
        row.try_get::<_, Option<T>>(index).ok()
    }

    let value = match type_name {
        "bool" => get::<bool>(row, index).map(|v| v.map(CellValue::Bool)),
        "int2" => get::<i16>(row, index).map(|v| v.map(|n| CellValue::Int(n.into()))),
        "int4" => get::<i32>(row, index).map(|v| v.map(|n| CellValue::Int(n.into()))),
        "int8" => get::<i64>(row, index).map(|v| v.map(CellValue::Int)),
        "oid" => get::<u32>(row, index).map(|v| v.map(|n| CellValue::Int(n.into()))),
        "float4" => get::<f32>(row, index).map(|v| v.map(|n| CellValue::Float(n.into()))),
        "float8" => get::<f64>(row, index).map(|v| v.map(CellValue::Float)),
        "numeric" => get::<Decimal>(row, index).map(|v| v.map(CellValue::Decimal)),
        "timestamptz" => get::<DateTime<Utc>>(row, index).map(|v| v.map(CellValue::DateTime)),
        "timestamp" => get::<NaiveDateTime>(row, index).map(|v| {
            v.map(|ts| CellValue::DateTime(DateTime::from_naive_utc_and_offset(ts, Utc)))
        }),
        "bytea" => get::<Vec<u8>>(row, index).map(|v| v.map(CellValue::Bytes)),
        _ => get::<String>(row, index).map(|v| v.map(CellValue::String)),
    };

    value.flatten().unwrap_or(CellValue::Null)
}
