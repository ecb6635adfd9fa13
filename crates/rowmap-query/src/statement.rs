//! The statement builder.
//!
//! A [`Statement`] accumulates query state through by-value fluent calls and
//! then synthesizes SQL text plus positional arguments for one operation
//! kind. Generation lives in the sibling modules (`select`, `insert`,
//! `update`, `delete`, `upsert`); this module holds the state and the
//! fragments they share.
//!
//! Identifiers written in raw SQL fragments (conditions, ORDER BY, HAVING,
//! raw joins) use generic backtick quoting and are rewritten into the
//! dialect's marks at generation time.
//!
//! # Example
//!
//! ```ignore
//! let dialect = Arc::new(Dialect::postgres());
//! let (sql, args) = Statement::new(dialect)
//!     .table("employee")
//!     .filter(Cond::eq("`manager_id`", 1i64))
//!     .desc(&["id"])
//!     .limit(10)
//!     .gen_find_sql()?;
//! assert_eq!(
//!     sql,
//!     r#"SELECT * FROM "employee" WHERE "manager_id"=? ORDER BY "id" DESC LIMIT 10"#
//! );
//! ```

use crate::dialect::{DbType, Dialect};
use crate::index_hint::IndexHint;
use crate::join::{Join, JoinOn, JoinTarget};
use rowmap_core::{Cond, Error, Result, TableInfo, Value, Writer};
use std::sync::Arc;

/// Accumulated query-construction state.
///
/// Cloning is cheap for the shared parts (dialect and table metadata are
/// behind `Arc`). A statement is owned by one session and reset after each
/// operation.
#[derive(Debug, Clone)]
pub struct Statement {
    pub(crate) dialect: Arc<Dialect>,
    pub(crate) ref_table: Option<Arc<TableInfo>>,
    pub(crate) alt_table_name: Option<String>,
    pub(crate) table_alias: Option<String>,
    pub(crate) cond: Cond,
    pub(crate) joins: Vec<Join>,
    pub(crate) order_str: String,
    pub(crate) order_args: Vec<Value>,
    pub(crate) group_by_str: String,
    pub(crate) having_str: String,
    pub(crate) limit_n: Option<u64>,
    pub(crate) start: Option<u64>,
    pub(crate) select_str: String,
    pub(crate) columns: Vec<String>,
    pub(crate) is_distinct: bool,
    pub(crate) is_for_update: bool,
    pub(crate) unscoped: bool,
    pub(crate) index_hints: Vec<IndexHint>,
    pub(crate) expr_columns: Vec<(String, String)>,
    pub(crate) raw_sql: Option<String>,
    pub(crate) raw_args: Vec<Value>,
    pub(crate) last_error: Option<Error>,
}

impl Statement {
    /// Create an empty statement for `dialect`.
    pub fn new(dialect: Arc<Dialect>) -> Self {
        Self {
            dialect,
            ref_table: None,
            alt_table_name: None,
            table_alias: None,
            cond: Cond::Empty,
            joins: Vec::new(),
            order_str: String::new(),
            order_args: Vec::new(),
            group_by_str: String::new(),
            having_str: String::new(),
            limit_n: None,
            start: None,
            select_str: String::new(),
            columns: Vec::new(),
            is_distinct: false,
            is_for_update: false,
            unscoped: false,
            index_hints: Vec::new(),
            expr_columns: Vec::new(),
            raw_sql: None,
            raw_args: Vec::new(),
            last_error: None,
        }
    }

    /// A fresh statement sharing this one's dialect.
    #[must_use]
    pub fn reset(&self) -> Self {
        Self::new(Arc::clone(&self.dialect))
    }

    pub fn dialect(&self) -> &Dialect {
        &self.dialect
    }

    // ========================================================================
    // Table binding
    // ========================================================================

    /// Operate on an explicit table name, overriding any bound table's name.
    #[must_use]
    pub fn table(mut self, name: impl Into<String>) -> Self {
        self.alt_table_name = Some(name.into());
        self
    }

    /// Bind table metadata (columns, keys, markers).
    #[must_use]
    pub fn ref_table(mut self, table: Arc<TableInfo>) -> Self {
        self.ref_table = Some(table);
        self
    }

    #[must_use]
    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.table_alias = Some(alias.into());
        self
    }

    /// The explicit table name if one was given, else the bound table's.
    pub fn table_name(&self) -> Option<&str> {
        self.alt_table_name
            .as_deref()
            .or_else(|| self.ref_table.as_ref().map(|t| t.name))
    }

    pub fn table_info(&self) -> Option<&Arc<TableInfo>> {
        self.ref_table.as_ref()
    }

    pub fn alias_name(&self) -> Option<&str> {
        self.table_alias.as_deref()
    }

    // ========================================================================
    // Conditions
    // ========================================================================

    /// AND a condition onto the WHERE clause.
    #[must_use]
    pub fn filter(mut self, cond: Cond) -> Self {
        self.cond = std::mem::take(&mut self.cond).and(cond);
        self
    }

    /// OR a condition onto the WHERE clause.
    #[must_use]
    pub fn or_filter(mut self, cond: Cond) -> Self {
        self.cond = std::mem::take(&mut self.cond).or(cond);
        self
    }

    /// AND a raw SQL fragment with `?` placeholders.
    #[must_use]
    pub fn where_sql(self, sql: impl Into<String>, args: Vec<Value>) -> Self {
        self.filter(Cond::expr(sql, args))
    }

    pub fn conds(&self) -> &Cond {
        &self.cond
    }

    /// Include soft-deleted rows.
    #[must_use]
    pub const fn unscoped(mut self) -> Self {
        self.unscoped = true;
        self
    }

    pub const fn is_unscoped(&self) -> bool {
        self.unscoped
    }

    // ========================================================================
    // Column selection
    // ========================================================================

    /// Select only these columns.
    #[must_use]
    pub fn cols<S: AsRef<str>>(mut self, columns: &[S]) -> Self {
        self.columns
            .extend(columns.iter().map(|c| c.as_ref().trim().to_string()));
        self
    }

    /// Select these columns with `DISTINCT`.
    #[must_use]
    pub fn distinct<S: AsRef<str>>(mut self, columns: &[S]) -> Self {
        self.is_distinct = true;
        self.cols(columns)
    }

    /// Raw select list, used verbatim.
    #[must_use]
    pub fn select(mut self, select: impl Into<String>) -> Self {
        self.select_str = select.into();
        self
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Emit `col = <raw sql>` on insert and update instead of a placeholder.
    #[must_use]
    pub fn set_expr(mut self, column: impl Into<String>, expr: impl Into<String>) -> Self {
        self.expr_columns.push((column.into(), expr.into()));
        self
    }

    // ========================================================================
    // Grouping and pagination
    // ========================================================================

    #[must_use]
    pub fn group_by(mut self, keys: impl Into<String>) -> Self {
        self.group_by_str = keys.into();
        self
    }

    #[must_use]
    pub fn having(mut self, cond: impl Into<String>) -> Self {
        self.having_str = cond.into();
        self
    }

    #[must_use]
    pub const fn limit(mut self, n: u64) -> Self {
        self.limit_n = Some(n);
        self
    }

    #[must_use]
    pub const fn offset(mut self, start: u64) -> Self {
        self.start = Some(start);
        self
    }

    pub const fn limit_value(&self) -> Option<u64> {
        self.limit_n
    }

    pub const fn offset_value(&self) -> Option<u64> {
        self.start
    }

    #[must_use]
    pub const fn for_update(mut self) -> Self {
        self.is_for_update = true;
        self
    }

    // ========================================================================
    // Joins
    // ========================================================================

    /// Add a join. `op` is the join kind (`INNER`, `LEFT`, ...).
    #[must_use]
    pub fn join(mut self, op: &str, target: JoinTarget, on: JoinOn, args: Vec<Value>) -> Self {
        self.joins.push(Join {
            op: op.to_uppercase(),
            target,
            on,
            args,
        });
        self
    }

    #[must_use]
    pub fn inner_join(self, table: impl Into<String>, on: impl Into<String>) -> Self {
        self.join(
            "INNER",
            JoinTarget::Table(table.into()),
            JoinOn::Raw(on.into()),
            Vec::new(),
        )
    }

    #[must_use]
    pub fn left_join(self, table: impl Into<String>, on: impl Into<String>) -> Self {
        self.join(
            "LEFT",
            JoinTarget::Table(table.into()),
            JoinOn::Raw(on.into()),
            Vec::new(),
        )
    }

    // ========================================================================
    // Raw SQL
    // ========================================================================

    /// Use `sql` verbatim for query and exec.
    #[must_use]
    pub fn sql(mut self, sql: impl Into<String>, args: Vec<Value>) -> Self {
        self.raw_sql = Some(sql.into());
        self.raw_args = args;
        self
    }

    pub fn is_raw(&self) -> bool {
        self.raw_sql.is_some()
    }

    /// The raw SQL with generic quoting rewritten, and its arguments.
    pub fn gen_raw_sql(&self) -> Option<(String, Vec<Value>)> {
        self.raw_sql
            .as_ref()
            .map(|sql| (self.replace_quote(sql), self.raw_args.clone()))
    }

    // ========================================================================
    // Shared fragments
    // ========================================================================

    pub(crate) fn check(&self) -> Result<()> {
        match &self.last_error {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    pub(crate) fn set_error(&mut self, err: Error) {
        if self.last_error.is_none() {
            tracing::debug!(error = %err, "statement builder error deferred");
            self.last_error = Some(err);
        }
    }

    pub(crate) fn require_table_name(&self) -> Result<&str> {
        self.table_name()
            .filter(|n| !n.is_empty())
            .ok_or(Error::MissingTableName)
    }

    pub(crate) fn quote(&self, ident: &str) -> Result<String> {
        self.dialect.quoter().quote(ident)
    }

    pub(crate) fn replace_quote(&self, sql: &str) -> String {
        self.dialect.quoter().replace(sql)
    }

    /// The quoted table name; a parenthesized subquery is only requoted.
    pub(crate) fn quoted_table_name(&self) -> Result<String> {
        let name = self.require_table_name()?;
        if name.trim_start().starts_with('(') {
            Ok(self.replace_quote(name))
        } else {
            self.quote(name)
        }
    }

    /// Whether column references must be qualified by table.
    pub(crate) fn need_table_name(&self) -> bool {
        !self.joins.is_empty()
    }

    /// How columns of the main table are qualified when joins are present.
    pub(crate) fn qualifier(&self) -> Option<&str> {
        self.table_alias.as_deref().or_else(|| self.table_name())
    }

    /// Explicit columns, quoted and joined by `, `.
    pub(crate) fn column_str(&self) -> Result<String> {
        self.dialect.quoter().join(&self.columns, ", ")
    }

    /// Render a condition with generic quoting rewritten.
    pub(crate) fn write_cond(&self, w: &mut Writer, cond: &Cond) -> Result<()> {
        let mut tmp = Writer::new();
        cond.write_to(&mut tmp)?;
        let (sql, args) = tmp.into_parts();
        w.push_str(&self.replace_quote(&sql));
        w.append(args);
        Ok(())
    }

    /// A column reference in generic backtick quoting, qualified when joins
    /// are present.
    pub(crate) fn generic_column(&self, column: &str) -> String {
        match self.qualifier().filter(|_| self.need_table_name()) {
            Some(q) => format!("`{q}`.`{column}`"),
            None => format!("`{column}`"),
        }
    }

    /// The user's condition plus the soft-delete scope.
    pub(crate) fn effective_cond(&self) -> Cond {
        let cond = self.cond.clone();
        match self.soft_delete_column() {
            Some(deleted) => cond.and(Cond::is_null(self.generic_column(deleted))),
            None => cond,
        }
    }

    /// The soft-delete column, when soft delete applies to this statement.
    pub(crate) fn soft_delete_column(&self) -> Option<&'static str> {
        if self.unscoped {
            return None;
        }
        self.ref_table
            .as_ref()
            .and_then(|t| t.deleted_column())
            .map(|c| c.name)
    }

    pub(crate) fn write_alias(&self, w: &mut Writer) -> Result<()> {
        if let Some(alias) = &self.table_alias {
            match self.dialect.db_type() {
                DbType::Oracle | DbType::Dameng => w.push(' '),
                _ => w.push_str(" AS "),
            }
            w.push_str(&self.quote(alias)?);
        }
        Ok(())
    }

    /// ` FROM <table> [AS alias] [index hints] [joins]`
    pub(crate) fn write_from(&self, w: &mut Writer) -> Result<()> {
        w.push_str(" FROM ");
        w.push_str(&self.quoted_table_name()?);
        self.write_alias(w)?;
        self.write_index_hints(w)?;
        self.write_joins(w)
    }

    pub(crate) fn write_group_by(&self, w: &mut Writer) {
        if !self.group_by_str.is_empty() {
            w.push_str(" GROUP BY ");
            w.push_str(&self.replace_quote(&self.group_by_str));
        }
    }

    pub(crate) fn write_having(&self, w: &mut Writer) {
        if !self.having_str.is_empty() {
            w.push_str(" HAVING ");
            w.push_str(&self.replace_quote(&self.having_str));
        }
    }

    /// The group-by keys quoted as a select list.
    pub(crate) fn quoted_group_by(&self) -> Result<String> {
        let keys: Vec<&str> = self.group_by_str.split(',').map(str::trim).collect();
        if keys.iter().any(|k| k.contains('(') || k.contains(' ')) {
            return Ok(self.replace_quote(&self.group_by_str));
        }
        self.dialect.quoter().join(&keys, ", ")
    }
}
