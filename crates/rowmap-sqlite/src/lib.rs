//! SQLite driver for rowmap.
//!
//! Wraps a [`rusqlite::Connection`] behind the [`Driver`] trait. Statements
//! arrive already quoted and with `?` placeholders, which SQLite accepts
//! as-is.
//!
//! # Type mapping
//!
//! | rowmap `Value` | SQLite storage class |
//! |----------------|----------------------|
//! | `Null`         | NULL                 |
//! | `Bool`         | INTEGER (0/1)        |
//! | `Int`/`BigInt` | INTEGER              |
//! | `Double`       | REAL                 |
//! | `Text`         | TEXT                 |
//! | `Bytes`        | BLOB                 |
//! | `Timestamp`    | TEXT, `YYYY-MM-DD HH:MM:SS[.fff]` |
//!
//! Values read back carry the storage class: integers become `BigInt`,
//! timestamps come back as `Text`.

use rowmap_core::{Driver, Error, ExecResult, QueryError, Result, Row, Value};
use rusqlite::types::{Value as SqliteValue, ValueRef};
use std::path::Path;
use std::sync::Arc;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// A single SQLite connection.
pub struct SqliteDriver {
    conn: rusqlite::Connection,
}

impl SqliteDriver {
    pub fn open_in_memory() -> Result<Self> {
        let conn = rusqlite::Connection::open_in_memory().map_err(|e| driver_error(&e, None))?;
        tracing::debug!("opened in-memory sqlite database");
        Ok(Self { conn })
    }

    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let conn = rusqlite::Connection::open(path).map_err(|e| driver_error(&e, None))?;
        tracing::debug!(path = %path.display(), "opened sqlite database");
        Ok(Self { conn })
    }

    pub fn from_connection(conn: rusqlite::Connection) -> Self {
        Self { conn }
    }

    /// Run several `;`-separated statements without arguments, e.g. a schema.
    pub fn execute_batch(&self, sql: &str) -> Result<()> {
        self.conn
            .execute_batch(sql)
            .map_err(|e| driver_error(&e, Some(sql)))
    }

    pub fn connection(&self) -> &rusqlite::Connection {
        &self.conn
    }
}

impl Driver for SqliteDriver {
    fn execute(&self, sql: &str, args: &[Value]) -> Result<ExecResult> {
        let mut stmt = self
            .conn
            .prepare(sql)
            .map_err(|e| driver_error(&e, Some(sql)))?;
        let rows_affected = stmt
            .execute(rusqlite::params_from_iter(args.iter().map(to_sqlite)))
            .map_err(|e| driver_error(&e, Some(sql)))?;
        Ok(ExecResult {
            rows_affected: rows_affected as u64,
            last_insert_id: Some(self.conn.last_insert_rowid()).filter(|id| *id > 0),
        })
    }

    fn query(&self, sql: &str, args: &[Value]) -> Result<Vec<Row>> {
        let mut stmt = self
            .conn
            .prepare(sql)
            .map_err(|e| driver_error(&e, Some(sql)))?;
        let columns: Arc<Vec<String>> = Arc::new(
            stmt.column_names()
                .into_iter()
                .map(str::to_string)
                .collect(),
        );
        let column_count = columns.len();

        let mut rows = stmt
            .query(rusqlite::params_from_iter(args.iter().map(to_sqlite)))
            .map_err(|e| driver_error(&e, Some(sql)))?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().map_err(|e| driver_error(&e, Some(sql)))? {
            let mut values = Vec::with_capacity(column_count);
            for i in 0..column_count {
                let value = row.get_ref(i).map_err(|e| driver_error(&e, Some(sql)))?;
                values.push(from_sqlite(value));
            }
            out.push(Row::new(Arc::clone(&columns), values));
        }
        Ok(out)
    }
}

fn to_sqlite(value: &Value) -> SqliteValue {
    match value {
        Value::Null => SqliteValue::Null,
        Value::Bool(b) => SqliteValue::Integer(i64::from(*b)),
        Value::Int(v) => SqliteValue::Integer(i64::from(*v)),
        Value::BigInt(v) => SqliteValue::Integer(*v),
        Value::Double(v) => SqliteValue::Real(*v),
        Value::Text(s) => SqliteValue::Text(s.clone()),
        Value::Bytes(b) => SqliteValue::Blob(b.clone()),
        Value::Timestamp(ts) => SqliteValue::Text(ts.format(TIMESTAMP_FORMAT).to_string()),
    }
}

fn from_sqlite(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::BigInt(i),
        ValueRef::Real(f) => Value::Double(f),
        ValueRef::Text(s) => Value::Text(String::from_utf8_lossy(s).into_owned()),
        ValueRef::Blob(b) => Value::Bytes(b.to_vec()),
    }
}

fn driver_error(err: &rusqlite::Error, sql: Option<&str>) -> Error {
    let query = QueryError::new(err.to_string());
    Error::Query(match sql {
        Some(sql) => query.with_sql(sql),
        None => query,
    })
}
