//! INSERT synthesis.
//!
//! Engine differences handled here:
//!
//! - an insert with no columns is `VALUES ()` on MySQL and `DEFAULT VALUES`
//!   on the other native engines; Oracle and Dameng have neither, so such an
//!   insert needs an auto-increment sequence to fill or it is refused;
//! - Oracle and Dameng feed an omitted auto-increment column from
//!   `SEQ_<TABLE>.nextval`;
//! - SQL Server returns the generated id through `OUTPUT Inserted.<col>`,
//!   Postgres through `RETURNING <col>`.
//!
//! A statement carrying conditions becomes `INSERT ... SELECT <values> FROM
//! <table> WHERE <cond>`, which inserts only when a matching row exists.

use crate::dialect::DbType;
use crate::statement::Statement;
use rowmap_core::{Error, Result, Value, Writer};
use std::collections::BTreeMap;

impl Statement {
    /// Insert one row with the given columns and values.
    pub fn gen_insert_sql<S: AsRef<str>>(
        &self,
        columns: &[S],
        args: Vec<Value>,
    ) -> Result<(String, Vec<Value>)> {
        self.check()?;
        let table_name = self.quoted_table_name()?;
        let columns: Vec<&str> = columns.iter().map(AsRef::as_ref).collect();

        let mut w = Writer::new();
        w.push_str("INSERT INTO ");
        w.push_str(&table_name);
        self.write_insert_values(&mut w, &columns, args, true)?;

        if let (DbType::Postgres, Some(auto)) = (self.dialect.db_type(), self.auto_increment()) {
            w.push_str(" RETURNING ");
            w.push_str(&self.quote(auto)?);
        }
        Ok(w.into_parts())
    }

    /// Insert one row from a column map. Columns are emitted in key order.
    pub fn gen_insert_map_sql(&self, row: &BTreeMap<String, Value>) -> Result<(String, Vec<Value>)> {
        self.check()?;
        let table_name = self.quoted_table_name()?;
        let columns: Vec<&str> = row.keys().map(String::as_str).collect();
        self.ensure_insert_columns(&columns)?;

        let mut w = Writer::new();
        w.push_str("INSERT INTO ");
        w.push_str(&table_name);
        w.push_str(" (");
        self.write_insert_columns(&mut w, &columns)?;
        w.push(')');
        let args = row.values().cloned().collect();
        self.write_insert_values_tail(&mut w, false, &columns, args, true)?;
        Ok(w.into_parts())
    }

    /// Insert several rows in one statement.
    ///
    /// The first row fixes the column set; a column missing from a later row
    /// is bound as NULL.
    pub fn gen_insert_multiple_map_sql(
        &self,
        rows: &[BTreeMap<String, Value>],
    ) -> Result<(String, Vec<Value>)> {
        self.check()?;
        if self.cond.is_valid() {
            return Err(Error::BatchInsertWithCondition);
        }
        let first = rows.first().ok_or(Error::EmptyBatch)?;
        let table_name = self.quoted_table_name()?;
        let columns: Vec<&str> = first.keys().map(String::as_str).collect();
        self.ensure_insert_columns(&columns)?;

        let mut w = Writer::new();
        w.push_str("INSERT INTO ");
        w.push_str(&table_name);
        w.push_str(" (");
        self.write_insert_columns(&mut w, &columns)?;
        w.push_str(") VALUES ");
        for (i, row) in rows.iter().enumerate() {
            if i > 0 {
                w.push(',');
            }
            w.push('(');
            w.push_args(
                columns
                    .iter()
                    .map(|c| row.get(*c).cloned().unwrap_or(Value::Null)),
            );
            self.write_expr_values(&mut w, true);
            w.push(')');
        }
        Ok(w.into_parts())
    }

    pub(crate) fn auto_increment(&self) -> Option<&'static str> {
        self.ref_table.as_ref().and_then(|t| t.auto_increment())
    }

    /// Whether the sequence must feed an auto-increment column the caller
    /// did not provide.
    fn include_auto_increment(&self, columns: &[&str]) -> bool {
        match self.auto_increment() {
            Some(auto) if self.dialect.uses_sequences() => {
                !columns.iter().any(|c| c.eq_ignore_ascii_case(auto))
            }
            _ => false,
        }
    }

    /// Map inserts always carry a column list, so an empty map has nothing
    /// to render.
    fn ensure_insert_columns(&self, columns: &[&str]) -> Result<()> {
        if columns.is_empty() && self.expr_columns.is_empty() {
            return Err(Error::NoColumnsToInsert {
                table: self.require_table_name()?.to_string(),
            });
        }
        Ok(())
    }

    /// `, <expr>, ...` for `set_expr` columns.
    fn write_expr_values(&self, w: &mut Writer, leading_comma: bool) {
        for (i, (_, expr)) in self.expr_columns.iter().enumerate() {
            if leading_comma || i > 0 {
                w.push(',');
            }
            w.push_str(&self.replace_quote(expr));
        }
    }

    fn write_insert_columns(&self, w: &mut Writer, columns: &[&str]) -> Result<()> {
        let mut all: Vec<&str> = columns.to_vec();
        all.extend(self.expr_columns.iter().map(|(c, _)| c.as_str()));
        let mut buf = String::new();
        self.dialect.quoter().join_write(&mut buf, &all, ",")?;
        w.push_str(&buf);
        Ok(())
    }

    fn write_insert_output(&self, w: &mut Writer) -> Result<()> {
        if let (DbType::Mssql, Some(auto)) = (self.dialect.db_type(), self.auto_increment()) {
            w.push_str(" OUTPUT Inserted.");
            w.push_str(&self.quote(auto)?);
        }
        Ok(())
    }

    /// Column list and VALUES clause. With `copy_from_existing`, a statement
    /// carrying conditions inserts through `SELECT ... WHERE`.
    pub(crate) fn write_insert_values(
        &self,
        w: &mut Writer,
        columns: &[&str],
        args: Vec<Value>,
        copy_from_existing: bool,
    ) -> Result<()> {
        let include_auto = self.include_auto_increment(columns);

        if columns.is_empty() && self.expr_columns.is_empty() && !self.dialect.uses_sequences() {
            if self.dialect.db_type() == DbType::Mysql {
                w.push_str(" VALUES ()");
                return Ok(());
            }
            self.write_insert_output(w)?;
            w.push_str(" DEFAULT VALUES");
            return Ok(());
        }
        if columns.is_empty() && self.expr_columns.is_empty() && !include_auto {
            return Err(Error::NoColumnsToInsert {
                table: self.require_table_name()?.to_string(),
            });
        }

        let mut all: Vec<&str> = columns.to_vec();
        if include_auto {
            if let Some(auto) = self.auto_increment() {
                all.push(auto);
            }
        }
        w.push_str(" (");
        self.write_insert_columns(w, &all)?;
        w.push(')');
        self.write_insert_output(w)?;
        self.write_insert_values_tail(w, include_auto, columns, args, copy_from_existing)
    }

    fn write_insert_values_tail(
        &self,
        w: &mut Writer,
        include_auto: bool,
        columns: &[&str],
        args: Vec<Value>,
        copy_from_existing: bool,
    ) -> Result<()> {
        let table_name = self.require_table_name()?;
        let has_args = !args.is_empty();
        let copy_from_existing = copy_from_existing && self.cond.is_valid();

        w.push_str(if copy_from_existing { " SELECT " } else { " VALUES (" });
        w.push_args(args);
        if include_auto {
            if has_args || !columns.is_empty() {
                w.push(',');
            }
            w.push_str(&self.dialect.seq_name(table_name));
            w.push_str(".nextval");
        }
        let wrote_any = has_args || include_auto;
        self.write_expr_values(w, wrote_any);

        if copy_from_existing {
            w.push_str(" FROM ");
            w.push_str(&self.quoted_table_name()?);
            w.push_str(" WHERE ");
            self.write_cond(w, &self.cond)?;
        } else {
            w.push(')');
        }
        Ok(())
    }
}
