//! MySQL database backend implementation
//!
//! Wraps a single `mysql_async` connection. Statements always go through the
//! binary protocol so column values arrive typed.

use crate::core::config::{OrmConfig, DEFAULT_OPERATION_TIMEOUT};
use crate::core::database::{Database, ExecResult};
use crate::core::database_types::DatabaseType;
use crate::core::error::{DatabaseError, Result};
use crate::core::value::{DatabaseResult, DatabaseRow, DatabaseValue};
use async_trait::async_trait;
use chrono::{Datelike, NaiveDate, Timelike};
use mysql_async::prelude::Queryable;
use mysql_async::{Conn, Opts, Params, Row, Value};
use std::future::Future;
use std::time::Duration;
use tokio::sync::Mutex;

/// Session settings applied on every new connection
const SESSION_SETUP: &str = "SET time_zone = '+00:00'";

/// MySQL database implementation
pub struct MysqlDatabase {
    connection: Mutex<Option<Conn>>,
    in_transaction: Mutex<bool>,
    operation_timeout: Duration,
}

impl MysqlDatabase {
    /// Create a new MySQL database instance with the default timeout
    pub fn new() -> Self {
        Self::with_timeout(DEFAULT_OPERATION_TIMEOUT)
    }

    /// Create a new MySQL database instance with a custom operation timeout
    pub fn with_timeout(operation_timeout: Duration) -> Self {
        Self {
            connection: Mutex::new(None),
            in_transaction: Mutex::new(false),
            operation_timeout,
        }
    }

    async fn with_timeout_of<T>(
        &self,
        on_timeout: fn(u64) -> DatabaseError,
        fut: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        match tokio::time::timeout(self.operation_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(on_timeout(self.operation_timeout.as_millis() as u64)),
        }
    }

    fn value_from_mysql(value: &Value) -> DatabaseValue {
        match value {
            Value::NULL => DatabaseValue::Null,
            Value::Bytes(bytes) => match String::from_utf8(bytes.clone()) {
                Ok(text) => DatabaseValue::String(text),
                Err(e) => DatabaseValue::Bytes(e.into_bytes()),
            },
            Value::Int(v) => DatabaseValue::Long(*v),
            Value::UInt(v) => DatabaseValue::ULong(*v),
            Value::Float(v) => DatabaseValue::Float(*v),
            Value::Double(v) => DatabaseValue::Double(*v),
            Value::Date(year, month, day, hour, minute, second, micros) => {
                // zero dates have no chrono counterpart
                NaiveDate::from_ymd_opt(i32::from(*year), u32::from(*month), u32::from(*day))
                    .and_then(|date| {
                        date.and_hms_micro_opt(
                            u32::from(*hour),
                            u32::from(*minute),
                            u32::from(*second),
                            *micros,
                        )
                    })
                    .map(DatabaseValue::Timestamp)
                    .unwrap_or(DatabaseValue::Null)
            }
            Value::Time(negative, days, hours, minutes, seconds, micros) => {
                let hours = u64::from(*days) * 24 + u64::from(*hours);
                DatabaseValue::String(format!(
                    "{}{:02}:{:02}:{:02}.{:06}",
                    if *negative { "-" } else { "" },
                    hours,
                    minutes,
                    seconds,
                    micros
                ))
            }
        }
    }

    fn value_to_param(value: &DatabaseValue) -> Value {
        match value {
            DatabaseValue::Null => Value::NULL,
            DatabaseValue::Bool(v) => Value::Int(i64::from(*v)),
            DatabaseValue::Short(v) => Value::Int(i64::from(*v)),
            DatabaseValue::Int(v) => Value::Int(i64::from(*v)),
            DatabaseValue::Long(v) => Value::Int(*v),
            DatabaseValue::UShort(v) => Value::UInt(u64::from(*v)),
            DatabaseValue::UInt(v) => Value::UInt(u64::from(*v)),
            DatabaseValue::ULong(v) => Value::UInt(*v),
            DatabaseValue::Float(v) => Value::Float(*v),
            DatabaseValue::Double(v) => Value::Double(*v),
            DatabaseValue::String(v) => Value::Bytes(v.clone().into_bytes()),
            DatabaseValue::Bytes(v) => Value::Bytes(v.clone()),
            DatabaseValue::Timestamp(t) => Value::Date(
                t.year() as u16,
                t.month() as u8,
                t.day() as u8,
                t.hour() as u8,
                t.minute() as u8,
                t.second() as u8,
                t.nanosecond() / 1_000,
            ),
        }
    }

    fn params(params: &[DatabaseValue]) -> Params {
        if params.is_empty() {
            Params::Empty
        } else {
            Params::Positional(params.iter().map(Self::value_to_param).collect())
        }
    }

    fn row_to_database_row(row: &Row) -> DatabaseRow {
        let mut db_row = DatabaseRow::new();
        for (i, column) in row.columns_ref().iter().enumerate() {
            let value = row
                .as_ref(i)
                .map(Self::value_from_mysql)
                .unwrap_or(DatabaseValue::Null);
            db_row.insert(column.name_str().into_owned(), value);
        }
        db_row
    }

    fn not_connected() -> DatabaseError {
        DatabaseError::connection("Not connected to database")
    }

    async fn end_transaction(&self, sql: &'static str) -> Result<()> {
        let mut in_transaction = self.in_transaction.lock().await;
        let mut connection = self.connection.lock().await;
        let conn = connection.as_mut().ok_or_else(Self::not_connected)?;

        if !*in_transaction {
            return Err(DatabaseError::transaction("Not in a transaction"));
        }

        self.with_timeout_of(DatabaseError::query_timeout, async {
            conn.query_drop(sql).await?;
            Ok(())
        })
        .await?;
        *in_transaction = false;
        Ok(())
    }
}

impl Default for MysqlDatabase {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Database for MysqlDatabase {
    fn from_config(config: &OrmConfig) -> Self {
        Self::with_timeout(config.operation_timeout())
    }

    fn default_values_insert(table: &str) -> String {
        format!("INSERT INTO {} () VALUES ()", table)
    }

    fn database_type(&self) -> DatabaseType {
        DatabaseType::Mysql
    }

    async fn connect(&self, connection_string: &str) -> Result<()> {
        let previous = self.connection.lock().await.take();
        *self.in_transaction.lock().await = false;
        if let Some(conn) = previous {
            // the old session may already be gone; nothing to report
            let _ = conn.disconnect().await;
        }

        let opts = Opts::from_url(connection_string)?;
        let conn = self
            .with_timeout_of(DatabaseError::connection_timeout, async {
                let mut conn = Conn::new(opts).await?;
                conn.query_drop(SESSION_SETUP).await?;
                Ok(conn)
            })
            .await?;

        *self.connection.lock().await = Some(conn);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connection
            .try_lock()
            .map(|conn| conn.is_some())
            .unwrap_or(false)
    }

    async fn disconnect(&self) -> Result<()> {
        *self.in_transaction.lock().await = false;
        let conn = self.connection.lock().await.take();
        if let Some(conn) = conn {
            conn.disconnect().await?;
        }
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        let mut connection = self.connection.lock().await;
        let conn = connection.as_mut().ok_or_else(Self::not_connected)?;
        self.with_timeout_of(DatabaseError::connection_timeout, async {
            conn.ping().await?;
            Ok(())
        })
        .await
    }

    async fn execute(&self, query: &str) -> Result<u64> {
        let mut connection = self.connection.lock().await;
        let conn = connection.as_mut().ok_or_else(Self::not_connected)?;
        self.with_timeout_of(DatabaseError::query_timeout, async {
            conn.query_drop(query).await?;
            Ok(conn.affected_rows())
        })
        .await
    }

    async fn query(&self, query: &str) -> Result<DatabaseResult> {
        self.query_with_params(query, &[]).await
    }

    async fn query_with_params(
        &self,
        query: &str,
        params: &[DatabaseValue],
    ) -> Result<DatabaseResult> {
        let mut connection = self.connection.lock().await;
        let conn = connection.as_mut().ok_or_else(Self::not_connected)?;
        let params = Self::params(params);
        self.with_timeout_of(DatabaseError::query_timeout, async {
            let rows: Vec<Row> = conn.exec(query, params).await?;
            Ok(rows.iter().map(Self::row_to_database_row).collect())
        })
        .await
    }

    async fn execute_with_params(
        &self,
        query: &str,
        params: &[DatabaseValue],
    ) -> Result<ExecResult> {
        let mut connection = self.connection.lock().await;
        let conn = connection.as_mut().ok_or_else(Self::not_connected)?;
        let params = Self::params(params);
        self.with_timeout_of(DatabaseError::query_timeout, async {
            conn.exec_drop(query, params).await?;
            Ok(ExecResult {
                affected_rows: conn.affected_rows(),
                last_insert_id: conn.last_insert_id().filter(|id| *id > 0),
            })
        })
        .await
    }

    async fn begin_transaction(&self) -> Result<()> {
        let mut in_transaction = self.in_transaction.lock().await;
        let mut connection = self.connection.lock().await;
        let conn = connection.as_mut().ok_or_else(Self::not_connected)?;

        if *in_transaction {
            return Err(DatabaseError::transaction("Already in a transaction"));
        }

        self.with_timeout_of(DatabaseError::query_timeout, async {
            conn.query_drop("START TRANSACTION").await?;
            Ok(())
        })
        .await?;
        *in_transaction = true;
        Ok(())
    }

    async fn commit(&self) -> Result<()> {
        self.end_transaction("COMMIT").await
    }

    async fn rollback(&self) -> Result<()> {
        self.end_transaction("ROLLBACK").await
    }

    fn in_transaction(&self) -> bool {
        self.in_transaction
            .try_lock()
            .map(|guard| *guard)
            .unwrap_or(false)
    }
}
