//! MySQL and MariaDB sessions using `mysql_async`.

use crate::config::Vendor;
use crate::database::connection_string::ConnectionDescriptor;
use crate::database::result::{CellValue, QueryOutcome, Row};
use crate::database::traits::{PlaceholderStyle, Session, SessionFactory};
use crate::error::{DatabaseError, DbResult};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use mysql_async::prelude::Queryable;
use mysql_async::{Conn, OptsBuilder, Value};
use rust_decimal::Decimal;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{debug, instrument};

/// Opens one `mysql_async` connection per session. Serves both MySQL and MariaDB.
pub struct MysqlFactory {
    descriptor: ConnectionDescriptor,
    connect_timeout: Duration,
}

impl MysqlFactory {
    pub fn new(descriptor: ConnectionDescriptor, connect_timeout: Duration) -> Self {
        Self {
            descriptor,
            connect_timeout,
        }
    }
}

#[async_trait]
impl SessionFactory for MysqlFactory {
    fn name(&self) -> &'static str {
        match self.descriptor.vendor {
            Vendor::Mariadb => "mariadb",
            _ => "mysql",
        }
    }

    fn placeholder_style(&self) -> PlaceholderStyle {
        PlaceholderStyle::Question
    }

    #[instrument(skip(self), fields(host = %self.descriptor.host, database = %self.descriptor.database))]
    async fn open(&self) -> DbResult<Box<dyn Session>> {
        let d = &self.descriptor;
        let opts = OptsBuilder::default()
            .ip_or_hostname(d.host.clone())
            .tcp_port(d.port)
            .user(Some(d.username.clone()))
            .pass(Some(d.password().to_string()))
            .db_name(Some(d.database.clone()));

        let conn = timeout(self.connect_timeout, Conn::new(opts))
            .await
            .map_err(|_| {
                DatabaseError::ConnectionFailed(format!(
                    "timed out after {}s",
                    self.connect_timeout.as_secs()
                ))
            })?
            .map_err(|e| DatabaseError::ConnectionFailed(e.to_string()))?;

        debug!("{} session established", self.name());
        Ok(Box::new(MysqlSession {
            conn: Mutex::new(Some(conn)),
        }))
    }
}

pub struct MysqlSession {
    conn: Mutex<Option<Conn>>,
}

#[async_trait]
impl Session for MysqlSession {
    async fn execute(&self, sql: &str, params: &[String]) -> DbResult<QueryOutcome> {
        let mut guard = self.conn.lock().await;
        let conn = guard
            .as_mut()
            .ok_or_else(|| DatabaseError::QueryFailed("session already closed".into()))?;

        let values: Vec<Value> = params.iter().map(|p| Value::from(p.as_str())).collect();
        let mut result = conn.exec_iter(sql, values).await.map_err(query_failed)?;

        let columns: Vec<String> = result
            .columns()
            .map(|cols| cols.iter().map(|c| c.name_str().into_owned()).collect())
            .unwrap_or_default();
        let raw_rows: Vec<mysql_async::Row> = result.collect().await.map_err(query_failed)?;
        let affected = result.affected_rows();
        result.drop_result().await.map_err(query_failed)?;

        if columns.is_empty() {
            return Ok(QueryOutcome::no_rows(Some(affected)));
        }

        let rows = raw_rows
            .into_iter()
            .map(|raw| {
                columns
                    .iter()
                    .enumerate()
                    .map(|(i, name)| {
                        let value = raw.as_ref(i).cloned().map(convert_value);
                        (name.clone(), value.unwrap_or(CellValue::Null))
                    })
                    .collect::<Row>()
            })
            .collect();

        Ok(QueryOutcome::rows(columns, rows))
    }

    async fn close(&self) -> DbResult<()> {
        if let Some(conn) = self.conn.lock().await.take() {
            conn.disconnect().await.map_err(query_failed)?;
        }
        Ok(())
    }
}

fn query_failed(e: mysql_async::Error) -> DatabaseError {
    DatabaseError::QueryFailed(e.to_string())
}

fn convert_value(value: Value) -> CellValue {
    match value {
        Value::NULL => CellValue::Null,
        Value::Bytes(bytes) => match String::from_utf8(bytes) {
            Ok(text) => CellValue::String(text),
            Err(e) => CellValue::Bytes(e.into_bytes()),
        },
        Value::Int(n) => CellValue::Int(n),
        Value::UInt(n) => i64::try_from(n)
            .map(CellValue::Int)
            .unwrap_or_else(|_| CellValue::Decimal(Decimal::from(n))),
        Value::Float(n) => CellValue::Float(n.into()),
        Value::Double(n) => CellValue::Float(n),
        Value::Date(year, month, day, hour, minute, second, micros) => {
            NaiveDate::from_ymd_opt(year.into(), month.into(), day.into())
                .and_then(|date| {
                    date.and_hms_micro_opt(hour.into(), minute.into(), second.into(), micros)
                })
                .map(|ts| CellValue::DateTime(DateTime::from_naive_utc_and_offset(ts, Utc)))
                .unwrap_or(CellValue::Null)
        }
        Value::Time(negative, days, hours, minutes, seconds, micros) => {
            let total_hours = u64::from(days) * 24 + u64::from(hours);
            CellValue::String(format!(
                "{}{:02}:{:02}:{:02}.{:06}",
                if negative { "-" } else { "" },
                total_hours,
                minutes,
                seconds,
                micros
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_and_binary_bytes() {
        assert_eq!(
            convert_value(Value::Bytes(b"Orders".to_vec())),
            CellValue::String("Orders".into())
        );
        assert_eq!(
            convert_value(Value::Bytes(vec![0xff, 0xfe])),
            CellValue::Bytes(vec![0xff, 0xfe])
        );
    }

    #[test]
    fn test_large_unsigned_becomes_decimal() {
        assert_eq!(convert_value(Value::UInt(7)), CellValue::Int(7));
        assert!(matches!(
            convert_value(Value::UInt(u64::MAX)),
            CellValue::Decimal(_)
        ));
    }

    #[test]
    fn test_temporal_values() {
        let ts = convert_value(Value::Date(2024, 2, 29, 13, 5, 9, 0));
        assert!(matches!(ts, CellValue::DateTime(_)));
        assert_eq!(convert_value(Value::Date(2024, 2, 30, 0, 0, 0, 0)), CellValue::Null);
        assert_eq!(
            convert_value(Value::Time(true, 1, 2, 3, 4, 5)),
            CellValue::String("-26:03:04.000005".into())
        );
    }
}
