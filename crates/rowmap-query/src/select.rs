//! SELECT synthesis.
//!
//! Every read operation funnels into [`Statement::write_select`], which lays
//! out
//!
//! ```text
//! SELECT [DISTINCT] [TOP n] <cols> FROM <table> [AS alias] [hints] <joins>
//!     [WHERE <cond> [AND <mssql offset exclusion>]]
//!     [GROUP BY ..] [HAVING ..] [ORDER BY ..] [<limit/offset>] [FOR UPDATE]
//! ```
//!
//! and then applies the dialect's pagination style: trailing `LIMIT/OFFSET`,
//! `TOP` plus a `NOT IN (SELECT TOP start ...)` exclusion for SQL Server, or
//! `ROWNUM`-bounded wrapping subqueries for Oracle.

use crate::dialect::{DbType, Pagination};
use crate::statement::Statement;
use rowmap_core::{Cond, Error, Result, Value, Writer};

/// MySQL has no offset-only form; this is its documented "no limit" value.
const MYSQL_NO_LIMIT: u64 = 18_446_744_073_709_551_615;

impl Statement {
    /// The query for `find`: raw SQL when set, else the full select.
    pub fn gen_query_sql(&self) -> Result<(String, Vec<Value>)> {
        if let Some(raw) = self.gen_raw_sql() {
            return Ok(raw);
        }
        self.gen_find_sql()
    }

    /// Select every matching row.
    pub fn gen_find_sql(&self) -> Result<(String, Vec<Value>)> {
        if let Some(raw) = self.gen_raw_sql() {
            return Ok(raw);
        }
        let columns = self.select_column_str()?;
        let mut w = Writer::new();
        self.write_select(&mut w, &columns, self.is_distinct, true)?;
        Ok(w.into_parts())
    }

    /// Select at most one row.
    pub fn gen_get_sql(&self) -> Result<(String, Vec<Value>)> {
        self.clone().limit(1).gen_find_sql()
    }

    /// Count matching rows.
    ///
    /// With a GROUP BY the grouped select is wrapped, so the result is the
    /// number of groups.
    pub fn gen_count_sql(&self) -> Result<(String, Vec<Value>)> {
        if let Some(raw) = self.gen_raw_sql() {
            return Ok(raw);
        }

        let select_sql = if !self.select_str.is_empty() {
            self.replace_quote(&self.select_str)
        } else if self.is_distinct {
            format!("count(DISTINCT {})", self.column_str()?)
        } else if !self.columns.is_empty() {
            format!("count({})", self.column_str()?)
        } else {
            "count(*)".to_string()
        };

        let mut w = Writer::new();
        if self.group_by_str.is_empty() {
            self.write_select(&mut w, &select_sql, false, false)?;
        } else {
            w.push_str("SELECT ");
            w.push_str(&select_sql);
            w.push_str(" FROM (");
            let group_cols = self.quoted_group_by()?;
            self.write_select(&mut w, &group_cols, false, false)?;
            w.push_str(") sub");
        }
        Ok(w.into_parts())
    }

    /// `COALESCE(sum(col),0)` for each column.
    ///
    /// Plain column names are quoted; expressions (anything with a space or
    /// a parenthesis) are only requoted.
    pub fn gen_sum_sql<S: AsRef<str>>(&self, columns: &[S]) -> Result<(String, Vec<Value>)> {
        if let Some(raw) = self.gen_raw_sql() {
            return Ok(raw);
        }

        let mut sums = Vec::with_capacity(columns.len());
        for column in columns {
            let column = column.as_ref();
            let expr = if column.contains(' ') || column.contains('(') {
                self.replace_quote(column)
            } else {
                self.quote(column)?
            };
            sums.push(format!("COALESCE(sum({expr}),0)"));
        }

        let mut w = Writer::new();
        self.write_select(&mut w, &sums.join(", "), false, true)?;
        Ok(w.into_parts())
    }

    /// The cheapest probe for "does any matching row exist".
    ///
    /// With bound table metadata this is a one-row get, which already
    /// selects an explicit column list.
    pub fn gen_exist_sql(&self) -> Result<(String, Vec<Value>)> {
        if let Some(raw) = self.gen_raw_sql() {
            return Ok(raw);
        }
        self.check()?;
        self.require_table_name()?;
        if self.ref_table.is_some() {
            return self.gen_get_sql();
        }

        let cond = self.effective_cond();
        let mut w = Writer::new();
        match self.dialect.db_type() {
            DbType::Mssql => {
                w.push_str("SELECT TOP 1 *");
                self.write_from(&mut w)?;
                self.write_where(&mut w, &cond)?;
            }
            DbType::Oracle => {
                w.push_str("SELECT *");
                self.write_from(&mut w)?;
                w.push_str(" WHERE ");
                if cond.is_valid() {
                    self.write_cond(&mut w, &cond)?;
                    w.push_str(" AND ");
                }
                w.push_str("ROWNUM=1");
            }
            _ => {
                w.push_str("SELECT 1");
                self.write_from(&mut w)?;
                self.write_where(&mut w, &cond)?;
                w.push_str(" LIMIT 1");
            }
        }
        Ok(w.into_parts())
    }

    /// The select list for find/get.
    ///
    /// Raw select, then explicit columns, then the group-by keys, then the
    /// bound table's columns. Joined queries without any of these select
    /// `*`.
    pub(crate) fn select_column_str(&self) -> Result<String> {
        if !self.select_str.is_empty() {
            return Ok(self.replace_quote(&self.select_str));
        }
        if !self.columns.is_empty() {
            return self.column_str();
        }
        if !self.group_by_str.is_empty() {
            return self.quoted_group_by();
        }
        match &self.ref_table {
            Some(table) if self.joins.is_empty() && !table.columns.is_empty() => {
                self.dialect.quoter().join(&table.column_names(), ", ")
            }
            _ => Ok("*".to_string()),
        }
    }

    pub(crate) fn write_where(&self, w: &mut Writer, cond: &Cond) -> Result<()> {
        if cond.is_valid() {
            w.push_str(" WHERE ");
            self.write_cond(w, cond)?;
        }
        Ok(())
    }

    pub(crate) fn write_select(
        &self,
        buf: &mut Writer,
        columns: &str,
        distinct: bool,
        need_limit: bool,
    ) -> Result<()> {
        self.check()?;
        self.require_table_name()?;
        if self.is_for_update && !self.dialect.supports_for_update() {
            return Err(Error::not_implemented(format!(
                "FOR UPDATE on {}",
                self.dialect.db_type()
            )));
        }

        let pagination = self.dialect.pagination();
        let cond = self.effective_cond();
        let mut w = Writer::new();

        w.push_str("SELECT");
        if distinct {
            w.push_str(" DISTINCT");
        }
        if let (Pagination::TopNotIn, true, Some(n)) = (pagination, need_limit, self.limit_n) {
            w.push_str(&format!(" TOP {n}"));
        }
        w.push(' ');
        w.push_str(columns);

        self.write_from(&mut w)?;
        self.write_where(&mut w, &cond)?;
        if need_limit && pagination == Pagination::TopNotIn {
            self.write_mssql_offset_cond(&mut w, &cond)?;
        }
        self.write_group_by(&mut w);
        self.write_having(&mut w);
        self.write_order_by(&mut w);

        if need_limit {
            match pagination {
                Pagination::LimitOffset => self.write_limit_offset(&mut w),
                Pagination::RowNum => w = self.wrap_rownum(w, columns),
                Pagination::TopNotIn => {}
            }
        }
        if self.is_for_update {
            w.push_str(" FOR UPDATE");
        }

        buf.extend(w);
        Ok(())
    }

    fn write_limit_offset(&self, w: &mut Writer) {
        match (self.limit_n, self.start) {
            (None, None) => {}
            (Some(n), None) => w.push_str(&format!(" LIMIT {n}")),
            (Some(n), Some(start)) => w.push_str(&format!(" LIMIT {n} OFFSET {start}")),
            (None, Some(start)) => match self.dialect.db_type() {
                DbType::Sqlite => w.push_str(&format!(" LIMIT -1 OFFSET {start}")),
                DbType::Mysql => {
                    w.push_str(&format!(" LIMIT {MYSQL_NO_LIMIT} OFFSET {start}"));
                }
                _ => w.push_str(&format!(" OFFSET {start}")),
            },
        }
    }

    fn wrap_rownum(&self, inner: Writer, columns: &str) -> Writer {
        if self.limit_n.is_none() && self.start.is_none() {
            return inner;
        }
        let start = self.start.unwrap_or(0);
        let (inner_sql, args) = inner.into_parts();
        let raw_columns = if columns == "*" { "at.*" } else { columns };

        let mut w = Writer::with_capacity(inner_sql.len() + 96);
        w.push_str(&format!(
            "SELECT {columns} FROM (SELECT {raw_columns},ROWNUM RN FROM ({inner_sql}) at"
        ));
        if let Some(n) = self.limit_n {
            w.push_str(&format!(" WHERE ROWNUM <= {}", start + n));
        }
        w.push_str(&format!(") aat WHERE RN > {start}"));
        w.append(args);
        w
    }

    /// `(<col> NOT IN (SELECT TOP <start> <col> FROM ...))`, keyed by the
    /// first primary key, else the first single-column index, else the
    /// first column.
    fn write_mssql_offset_cond(&self, w: &mut Writer, cond: &Cond) -> Result<()> {
        let start = match self.start {
            Some(start) if start > 0 => start,
            _ => return Ok(()),
        };
        let table = self.ref_table.as_ref().ok_or_else(|| {
            Error::not_implemented("query offset without a bound table on mssql")
        })?;

        let column = table
            .primary_keys()
            .first()
            .copied()
            .or_else(|| {
                table
                    .indexes
                    .iter()
                    .find(|i| i.columns.len() == 1)
                    .map(|i| i.columns[0])
            })
            .or_else(|| table.columns.first().map(|c| c.name))
            .ok_or_else(|| Error::not_implemented("query offset on a table without columns"))?;

        let column = match self.qualifier().filter(|_| self.need_table_name()) {
            Some(q) => self.quote(&format!("{q}.{column}"))?,
            None => self.quote(column)?,
        };

        w.push_str(if cond.is_valid() { " AND " } else { " WHERE " });
        w.push_str(&format!("({column} NOT IN (SELECT TOP {start} {column}"));
        self.write_from(w)?;
        self.write_where(w, cond)?;
        self.write_group_by(w);
        self.write_order_by(w);
        w.push_str("))");
        Ok(())
    }
}
