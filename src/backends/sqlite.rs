//! SQLite database backend implementation
//!
//! rusqlite is synchronous, so every call runs on the blocking thread pool
//! and is abandoned after the configured operation timeout.

use crate::core::coerce::{parse_time_text, SQL_TIME_FORMAT};
use crate::core::config::{OrmConfig, DEFAULT_OPERATION_TIMEOUT};
use crate::core::database::{Database, ExecResult};
use crate::core::database_types::DatabaseType;
use crate::core::error::{DatabaseError, Result};
use crate::core::value::{DatabaseResult, DatabaseRow, DatabaseValue};
use async_trait::async_trait;
use chrono::DateTime;
use rusqlite::types::{Value, ValueRef};
use rusqlite::{params_from_iter, Connection, Row};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

type SharedConnection = Arc<Mutex<Option<Connection>>>;

/// SQLite database implementation
pub struct SqliteDatabase {
    connection: SharedConnection,
    in_transaction: Arc<Mutex<bool>>,
    operation_timeout: Duration,
}

impl SqliteDatabase {
    /// Create a new SQLite database instance with the default timeout
    pub fn new() -> Self {
        Self::with_timeout(DEFAULT_OPERATION_TIMEOUT)
    }

    /// Create a new SQLite database instance with a custom operation timeout
    pub fn with_timeout(operation_timeout: Duration) -> Self {
        Self {
            connection: Arc::new(Mutex::new(None)),
            in_transaction: Arc::new(Mutex::new(false)),
            operation_timeout,
        }
    }

    /// Run `f` on the blocking pool, giving up after the operation timeout
    async fn run_blocking<T, F>(&self, on_timeout: fn(u64) -> DatabaseError, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T> + Send + 'static,
    {
        let mut task = tokio::task::spawn_blocking(f);

        // Use select! to abort task on timeout, preventing resource leaks
        tokio::select! {
            result = &mut task => {
                result.map_err(|e| DatabaseError::other(format!("Task join error: {}", e)))?
            }
            _ = tokio::time::sleep(self.operation_timeout) => {
                task.abort();
                Err(on_timeout(self.operation_timeout.as_millis() as u64))
            }
        }
    }

    fn open(connection: &Option<Connection>) -> Result<&Connection> {
        connection
            .as_ref()
            .ok_or_else(|| DatabaseError::connection("Not connected to database"))
    }

    fn is_time_column(decl_type: Option<&str>) -> bool {
        decl_type.is_some_and(|decl| {
            let decl = decl.to_ascii_uppercase();
            decl.contains("DATE") || decl.contains("TIME")
        })
    }

    /// Convert a rusqlite Row to a DatabaseRow
    ///
    /// In a column declared as a date or time type, text that parses as a
    /// time and integers (Unix seconds) are read back as timestamps.
    fn row_to_database_row(row: &Row, time_columns: &[bool]) -> rusqlite::Result<DatabaseRow> {
        let mut db_row = DatabaseRow::new();
        let column_count = row.as_ref().column_count();

        for i in 0..column_count {
            let column_name = row.as_ref().column_name(i)?.to_string();
            let is_time = time_columns.get(i).copied().unwrap_or(false);
            let value = match row.get_ref(i)? {
                ValueRef::Null => DatabaseValue::Null,
                ValueRef::Integer(v) if is_time => match DateTime::from_timestamp(v, 0) {
                    Some(t) => DatabaseValue::Timestamp(t.naive_utc()),
                    None => DatabaseValue::Long(v),
                },
                ValueRef::Integer(v) => DatabaseValue::Long(v),
                ValueRef::Real(v) => DatabaseValue::Double(v),
                ValueRef::Text(v) => {
                    let text = String::from_utf8_lossy(v);
                    let timestamp = if is_time { parse_time_text(&text) } else { None };
                    match timestamp {
                        Some(t) => DatabaseValue::Timestamp(t),
                        None => DatabaseValue::String(text.into_owned()),
                    }
                }
                ValueRef::Blob(v) => DatabaseValue::Bytes(v.to_vec()),
            };
            db_row.insert(column_name, value);
        }

        Ok(db_row)
    }

    /// Convert DatabaseValue to a rusqlite parameter
    fn value_to_param(value: &DatabaseValue) -> Value {
        match value {
            DatabaseValue::Null => Value::Null,
            DatabaseValue::Bool(v) => Value::Integer(i64::from(*v)),
            DatabaseValue::Short(v) => Value::Integer(i64::from(*v)),
            DatabaseValue::UShort(v) => Value::Integer(i64::from(*v)),
            DatabaseValue::Int(v) => Value::Integer(i64::from(*v)),
            DatabaseValue::UInt(v) => Value::Integer(i64::from(*v)),
            DatabaseValue::Long(v) => Value::Integer(*v),
            DatabaseValue::ULong(v) => match i64::try_from(*v) {
                Ok(v) => Value::Integer(v),
                Err(_) => Value::Text(v.to_string()),
            },
            DatabaseValue::Float(v) => Value::Real(f64::from(*v)),
            DatabaseValue::Double(v) => Value::Real(*v),
            DatabaseValue::String(v) => Value::Text(v.clone()),
            DatabaseValue::Bytes(v) => Value::Blob(v.clone()),
            DatabaseValue::Timestamp(v) => Value::Text(v.format(SQL_TIME_FORMAT).to_string()),
        }
    }

    fn run_query(
        conn: &Connection,
        query: &str,
        params: &[DatabaseValue],
    ) -> Result<DatabaseResult> {
        let mut stmt = conn.prepare(query)?;
        let time_columns: Vec<bool> = stmt
            .columns()
            .iter()
            .map(|column| Self::is_time_column(column.decl_type()))
            .collect();
        let values: Vec<Value> = params.iter().map(Self::value_to_param).collect();

        let rows = stmt.query_map(params_from_iter(values.iter()), |row| {
            Self::row_to_database_row(row, &time_columns)
        })?;

        let mut results = Vec::new();
        for row_result in rows {
            results.push(row_result?);
        }
        Ok(results)
    }

    fn is_insert(query: &str) -> bool {
        query
            .trim_start()
            .get(..6)
            .is_some_and(|head| head.eq_ignore_ascii_case("insert"))
    }

    async fn end_transaction(&self, sql: &'static str) -> Result<()> {
        let connection_arc = Arc::clone(&self.connection);
        let in_transaction_arc = Arc::clone(&self.in_transaction);

        self.run_blocking(DatabaseError::query_timeout, move || {
            // Acquire both locks together to prevent race conditions
            let mut in_transaction = in_transaction_arc.blocking_lock();
            let connection = connection_arc.blocking_lock();
            let conn = Self::open(&connection)?;

            if !*in_transaction {
                return Err(DatabaseError::transaction("Not in a transaction"));
            }

            // Execute SQL first, only clear flag on success
            conn.execute(sql, [])?;
            *in_transaction = false;
            Ok(())
        })
        .await
    }
}

impl Default for SqliteDatabase {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Database for SqliteDatabase {
    fn from_config(config: &OrmConfig) -> Self {
        Self::with_timeout(config.operation_timeout())
    }

    fn database_type(&self) -> DatabaseType {
        DatabaseType::Sqlite
    }

    async fn connect(&self, connection_string: &str) -> Result<()> {
        // Clean up any existing connection first
        *self.connection.lock().await = None;
        // Reset transaction flag to handle failed/aborted attempts
        *self.in_transaction.lock().await = false;

        let connection_string = connection_string.to_string();
        let connection_arc = Arc::clone(&self.connection);

        self.run_blocking(DatabaseError::connection_timeout, move || {
            let conn = Connection::open(&connection_string)?;
            conn.execute("PRAGMA foreign_keys = ON", [])?;

            *connection_arc.blocking_lock() = Some(conn);
            Ok(())
        })
        .await
    }

    fn is_connected(&self) -> bool {
        self.connection
            .try_lock()
            .map(|conn| conn.is_some())
            .unwrap_or(false)
    }

    async fn disconnect(&self) -> Result<()> {
        // Clear transaction flag to prevent stale state after reconnect
        *self.in_transaction.lock().await = false;
        *self.connection.lock().await = None;
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        let connection_arc = Arc::clone(&self.connection);

        self.run_blocking(DatabaseError::connection_timeout, move || {
            let connection = connection_arc.blocking_lock();
            let conn = Self::open(&connection)?;
            conn.query_row("SELECT 1", [], |_| Ok(()))?;
            Ok(())
        })
        .await
    }

    async fn execute(&self, query: &str) -> Result<u64> {
        let query = query.to_string();
        let connection_arc = Arc::clone(&self.connection);

        self.run_blocking(DatabaseError::query_timeout, move || {
            let connection = connection_arc.blocking_lock();
            let conn = Self::open(&connection)?;
            let affected = conn.execute(&query, [])?;
            Ok(affected as u64)
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
        let query = query.to_string();
        let params = params.to_vec();
        let connection_arc = Arc::clone(&self.connection);

        self.run_blocking(DatabaseError::query_timeout, move || {
            let connection = connection_arc.blocking_lock();
            let conn = Self::open(&connection)?;
            Self::run_query(conn, &query, &params)
        })
        .await
    }

    async fn execute_with_params(
        &self,
        query: &str,
        params: &[DatabaseValue],
    ) -> Result<ExecResult> {
        let query = query.to_string();
        let params = params.to_vec();
        let connection_arc = Arc::clone(&self.connection);

        self.run_blocking(DatabaseError::query_timeout, move || {
            let connection = connection_arc.blocking_lock();
            let conn = Self::open(&connection)?;

            let values: Vec<Value> = params.iter().map(Self::value_to_param).collect();
            let mut stmt = conn.prepare(&query)?;
            let affected = stmt.execute(params_from_iter(values.iter()))?;

            let last_insert_id = if Self::is_insert(&query) && affected > 0 {
                u64::try_from(conn.last_insert_rowid()).ok().filter(|id| *id > 0)
            } else {
                None
            };

            Ok(ExecResult {
                affected_rows: affected as u64,
                last_insert_id,
            })
        })
        .await
    }

    async fn begin_transaction(&self) -> Result<()> {
        let connection_arc = Arc::clone(&self.connection);
        let in_transaction_arc = Arc::clone(&self.in_transaction);

        self.run_blocking(DatabaseError::query_timeout, move || {
            // Acquire both locks together to prevent race conditions
            let mut in_transaction = in_transaction_arc.blocking_lock();
            let connection = connection_arc.blocking_lock();
            let conn = Self::open(&connection)?;

            if *in_transaction {
                return Err(DatabaseError::transaction("Already in a transaction"));
            }

            // Execute SQL first, only set flag on success
            conn.execute("BEGIN TRANSACTION", [])?;
            *in_transaction = true;
            Ok(())
        })
        .await
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

impl Drop for SqliteDatabase {
    fn drop(&mut self) {
        // Best-effort rollback; Drop cannot be async
        if let Ok(in_trans) = self.in_transaction.try_lock() {
            if *in_trans {
                if let Ok(connection) = self.connection.try_lock() {
                    if let Some(conn) = connection.as_ref() {
                        let _ = conn.execute("ROLLBACK", []);
                    }
                }
            }
        }
    }
}
