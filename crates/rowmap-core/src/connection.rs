//! The driver contract.

use crate::error::Result;
use crate::row::Row;
use crate::value::Value;

/// Outcome of a statement that does not return rows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecResult {
    /// Rows inserted, updated or deleted.
    pub rows_affected: u64,
    /// Id generated by the last insert, when the engine reports one.
    pub last_insert_id: Option<i64>,
}

/// Executes generated SQL.
///
/// Placeholders have already been rewritten for the dialect when a driver
/// sees the text. Drivers are synchronous; blocking, timeouts and retries are
/// the driver's own business.
pub trait Driver {
    /// Run a statement and report the affected row count.
    fn execute(&self, sql: &str, args: &[Value]) -> Result<ExecResult>;

    /// Run a query and collect its rows.
    fn query(&self, sql: &str, args: &[Value]) -> Result<Vec<Row>>;
}

impl<D: Driver + ?Sized> Driver for &D {
    fn execute(&self, sql: &str, args: &[Value]) -> Result<ExecResult> {
        (**self).execute(sql, args)
    }

    fn query(&self, sql: &str, args: &[Value]) -> Result<Vec<Row>> {
        (**self).query(sql, args)
    }
}

impl<D: Driver + ?Sized> Driver for Box<D> {
    fn execute(&self, sql: &str, args: &[Value]) -> Result<ExecResult> {
        (**self).execute(sql, args)
    }

    fn query(&self, sql: &str, args: &[Value]) -> Result<Vec<Row>> {
        (**self).query(sql, args)
    }
}
