//! UPDATE synthesis, and the ordered/limited row targeting shared with
//! DELETE.

use crate::dialect::DbType;
use crate::statement::Statement;
use rowmap_core::{Cond, Error, Result, Value, Writer};

impl Statement {
    /// `UPDATE <table> SET col = ?, ... [WHERE ...]`.
    ///
    /// `set_expr` columns are appended as `col = <expr>`. The soft-delete
    /// scope applies, so soft-deleted rows are never updated unless the
    /// statement is unscoped.
    pub fn gen_update_sql(&self, assignments: &[(String, Value)]) -> Result<(String, Vec<Value>)> {
        self.check()?;
        if assignments.is_empty() && self.expr_columns.is_empty() {
            return Err(Error::NoColumnsToUpdate);
        }

        let mut w = Writer::new();
        w.push_str("UPDATE ");
        w.push_str(&self.quoted_table_name()?);
        w.push_str(" SET ");
        let mut first = true;
        for (column, value) in assignments {
            if !first {
                w.push_str(", ");
            }
            first = false;
            w.push_str(&self.quote(column)?);
            w.push_str(" = ");
            w.push_arg(value.clone());
        }
        for (column, expr) in &self.expr_columns {
            if !first {
                w.push_str(", ");
            }
            first = false;
            w.push_str(&self.quote(column)?);
            w.push_str(" = ");
            w.push_str(&self.replace_quote(expr));
        }

        self.write_target_rows(&mut w, &self.effective_cond(), "update")?;
        Ok(w.into_parts())
    }

    /// Whether ORDER BY or a positive LIMIT restricts the affected rows.
    pub(crate) fn is_row_limited(&self) -> bool {
        !self.order_str.is_empty() || self.limit_n.is_some_and(|n| n > 0)
    }

    fn write_order_limit(&self, w: &mut Writer) {
        self.write_order_by(w);
        if let Some(n) = self.limit_n.filter(|n| *n > 0) {
            w.push_str(&format!(" LIMIT {n}"));
        }
    }

    /// The WHERE clause of an UPDATE or DELETE.
    ///
    /// Ordered or limited writes are native on MySQL. SQLite and Postgres
    /// target the rows through `rowid`/`ctid IN (SELECT ... ORDER BY ...
    /// LIMIT n)`. Other engines cannot express them.
    pub(crate) fn write_target_rows(&self, w: &mut Writer, cond: &Cond, op: &str) -> Result<()> {
        if !self.is_row_limited() {
            return self.write_where(w, cond);
        }

        let row_id = match self.dialect.db_type() {
            DbType::Mysql => {
                self.write_where(w, cond)?;
                self.write_order_limit(w);
                return Ok(());
            }
            DbType::Postgres => "ctid",
            DbType::Sqlite => "rowid",
            other => {
                return Err(Error::not_implemented(format!(
                    "ordered or limited {op} on {other}"
                )));
            }
        };

        w.push_str(&format!(" WHERE {row_id} IN (SELECT {row_id} FROM "));
        w.push_str(&self.quoted_table_name()?);
        self.write_where(w, cond)?;
        self.write_order_limit(w);
        w.push(')');
        Ok(())
    }
}
