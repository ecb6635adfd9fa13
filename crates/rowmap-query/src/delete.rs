//! DELETE synthesis with soft-delete rewriting.

use crate::statement::Statement;
use chrono::NaiveDateTime;
use rowmap_core::{Error, Result, Value, Writer};

/// The statements produced for one delete.
#[derive(Debug, Clone, PartialEq)]
pub struct DeleteSql {
    /// The statement to execute: a DELETE, or an UPDATE of the soft-delete
    /// column.
    pub sql: String,
    /// The equivalent hard DELETE. Identical to `sql` without soft delete.
    pub hard_sql: String,
    /// Arguments for `sql`.
    pub args: Vec<Value>,
    /// The timestamp written by a soft delete.
    pub deleted_at: Option<NaiveDateTime>,
}

impl DeleteSql {
    pub fn is_soft(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Arguments for `hard_sql`.
    pub fn hard_args(&self) -> &[Value] {
        if self.is_soft() {
            &self.args[1..]
        } else {
            &self.args
        }
    }
}

impl Statement {
    /// Generate the delete for the current conditions.
    ///
    /// Refuses to run without a condition or a limit. When the bound table
    /// has a soft-delete column and the statement is scoped, the executed
    /// statement sets that column to `now` on rows where it is still NULL.
    pub fn gen_delete_sql(&self, now: NaiveDateTime) -> Result<DeleteSql> {
        self.check()?;
        if !self.cond.is_valid() && self.limit_n.is_none_or(|n| n == 0) {
            return Err(Error::NeedDeletedCond);
        }

        let table = self.quoted_table_name()?;
        let cond = self.effective_cond();

        let mut hard = Writer::new();
        hard.push_str("DELETE FROM ");
        hard.push_str(&table);
        self.write_target_rows(&mut hard, &cond, "delete")?;
        let (hard_sql, hard_args) = hard.into_parts();

        let Some(deleted) = self.soft_delete_column() else {
            return Ok(DeleteSql {
                sql: hard_sql.clone(),
                hard_sql,
                args: hard_args,
                deleted_at: None,
            });
        };

        let mut soft = Writer::new();
        soft.push_str("UPDATE ");
        soft.push_str(&table);
        soft.push_str(" SET ");
        soft.push_str(&self.quote(deleted)?);
        soft.push_str(" = ");
        soft.push_arg(Value::Timestamp(now));
        self.write_target_rows(&mut soft, &cond, "delete")?;
        let (sql, args) = soft.into_parts();

        Ok(DeleteSql {
            sql,
            hard_sql,
            args,
            deleted_at: Some(now),
        })
    }
}
