//! Session, upserts and association preloading for rowmap.
//!
//! A [`Session`] owns a driver and one pending [`Statement`]. Fluent calls
//! accumulate query state; an operation (`find`, `insert`, `delete`, ...)
//! consumes it, runs the generated SQL through the driver and leaves a fresh
//! statement behind.
//!
//! # Design
//!
//! - **Synchronous**: the driver decides whether a call blocks.
//! - **One statement at a time**: a session is not shared between threads;
//!   the dialect and catalog it reads are shared read-only (`Arc`).
//! - **Batch preloading**: each preloaded association costs one query per
//!   tree level, whatever the number of owners.
//!
//! # Example
//!
//! ```ignore
//! let engine = Engine::new(Dialect::sqlite(), catalog);
//! let mut session = engine.session(driver);
//!
//! let employees = session
//!     .table("employee")
//!     .filter(Cond::eq("`id`", 3i64))
//!     .preload(Preload::new("Manager.Subordinates"))
//!     .find()?;
//!
//! let mut row = Record::new("one_unique").with("data", "x");
//! session.upsert(&mut row)?;
//! ```

pub mod association;
pub mod engine;
pub mod n1_detection;
pub mod preload;

pub use association::{JoinMap, get_cond, link, single_primary_key};
pub use engine::{Engine, EngineConfig};
pub use n1_detection::{LoadEvent, N1QueryTracker, N1Stats};
pub use preload::{Preload, PreloadTree, ValidatedPreloadTree};

use association::generic;
use chrono::NaiveDateTime;
use rowmap_core::{
    Catalog, Cond, Driver, Error, ExecResult, Model, Record, RecordSet, Result, Row, TableInfo,
    Value,
};
use rowmap_query::{DbType, Dialect, JoinOn, JoinTarget, Statement};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::Arc;

// ============================================================================
// Session Configuration
// ============================================================================

/// Clock used for soft-delete and created/updated timestamps.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeZone {
    #[default]
    Utc,
    Local,
}

impl TimeZone {
    pub fn now(self) -> NaiveDateTime {
        match self {
            TimeZone::Utc => chrono::Utc::now().naive_utc(),
            TimeZone::Local => chrono::Local::now().naive_local(),
        }
    }
}

/// Configuration for Session behavior.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Clock for generated timestamps.
    pub time_zone: TimeZone,
    /// Association fetches per `(table, association)` before warning.
    pub n1_threshold: usize,
    /// Whether to track association fetches at all.
    pub n1_detection: bool,
    /// Report MySQL's "2 rows affected" for an updating upsert as 1.
    pub normalize_upsert_affected: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            time_zone: TimeZone::Utc,
            n1_threshold: 3,
            n1_detection: true,
            normalize_upsert_affected: true,
        }
    }
}

// ============================================================================
// Session
// ============================================================================

/// A unit of work over one driver.
pub struct Session<D: Driver> {
    driver: D,
    dialect: Arc<Dialect>,
    catalog: Arc<Catalog>,
    /// State accumulated by fluent calls, consumed by the next operation.
    statement: Statement,
    preloads: Vec<Preload>,
    config: SessionConfig,
    n1_tracker: N1QueryTracker,
}

impl<D: Driver> Session<D> {
    pub fn new(driver: D, dialect: Arc<Dialect>, catalog: Arc<Catalog>) -> Self {
        Self::with_config(driver, dialect, catalog, SessionConfig::default())
    }

    pub fn with_config(
        driver: D,
        dialect: Arc<Dialect>,
        catalog: Arc<Catalog>,
        config: SessionConfig,
    ) -> Self {
        let mut n1_tracker = N1QueryTracker::new().with_threshold(config.n1_threshold);
        if !config.n1_detection {
            n1_tracker.disable();
        }
        Self {
            driver,
            statement: Statement::new(Arc::clone(&dialect)),
            dialect,
            catalog,
            preloads: Vec::new(),
            config,
            n1_tracker,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn dialect(&self) -> &Dialect {
        &self.dialect
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    pub fn into_driver(self) -> D {
        self.driver
    }

    /// The pending statement.
    pub fn statement(&self) -> &Statement {
        &self.statement
    }

    pub fn n1_tracker(&self) -> &N1QueryTracker {
        &self.n1_tracker
    }

    pub fn n1_tracker_mut(&mut self) -> &mut N1QueryTracker {
        &mut self.n1_tracker
    }

    /// Current time on the configured clock.
    pub fn now(&self) -> NaiveDateTime {
        self.config.time_zone.now()
    }

    // ========================================================================
    // Fluent statement state
    // ========================================================================

    fn apply(&mut self, f: impl FnOnce(Statement) -> Statement) -> &mut Self {
        let fresh = self.statement.reset();
        let st = std::mem::replace(&mut self.statement, fresh);
        self.statement = f(st);
        self
    }

    /// Operate on `name`, bound to its catalog entry when there is one.
    pub fn table(&mut self, name: &str) -> &mut Self {
        let info = self.catalog.table(name);
        let name = name.to_string();
        self.apply(|st| match info {
            Some(info) => st.ref_table(info),
            None => st.table(name),
        })
    }

    pub fn alias(&mut self, alias: &str) -> &mut Self {
        let alias = alias.to_string();
        self.apply(|st| st.alias(alias))
    }

    pub fn filter(&mut self, cond: Cond) -> &mut Self {
        self.apply(|st| st.filter(cond))
    }

    pub fn or_filter(&mut self, cond: Cond) -> &mut Self {
        self.apply(|st| st.or_filter(cond))
    }

    pub fn where_sql(&mut self, sql: &str, args: Vec<Value>) -> &mut Self {
        let sql = sql.to_string();
        self.apply(|st| st.where_sql(sql, args))
    }

    pub fn cols(&mut self, columns: &[&str]) -> &mut Self {
        self.apply(|st| st.cols(columns))
    }

    pub fn distinct(&mut self, columns: &[&str]) -> &mut Self {
        self.apply(|st| st.distinct(columns))
    }

    pub fn select(&mut self, select: &str) -> &mut Self {
        let select = select.to_string();
        self.apply(|st| st.select(select))
    }

    pub fn set_expr(&mut self, column: &str, expr: &str) -> &mut Self {
        let (column, expr) = (column.to_string(), expr.to_string());
        self.apply(|st| st.set_expr(column, expr))
    }

    pub fn group_by(&mut self, keys: &str) -> &mut Self {
        let keys = keys.to_string();
        self.apply(|st| st.group_by(keys))
    }

    pub fn having(&mut self, cond: &str) -> &mut Self {
        let cond = cond.to_string();
        self.apply(|st| st.having(cond))
    }

    pub fn limit(&mut self, n: u64) -> &mut Self {
        self.apply(|st| st.limit(n))
    }

    pub fn offset(&mut self, start: u64) -> &mut Self {
        self.apply(|st| st.offset(start))
    }

    pub fn order_by(&mut self, order: &str, args: Vec<Value>) -> &mut Self {
        self.apply(|st| st.order_by(order, args))
    }

    pub fn asc(&mut self, columns: &[&str]) -> &mut Self {
        self.apply(|st| st.asc(columns))
    }

    pub fn desc(&mut self, columns: &[&str]) -> &mut Self {
        self.apply(|st| st.desc(columns))
    }

    pub fn join(&mut self, op: &str, target: JoinTarget, on: JoinOn, args: Vec<Value>) -> &mut Self {
        self.apply(|st| st.join(op, target, on, args))
    }

    pub fn inner_join(&mut self, table: &str, on: &str) -> &mut Self {
        let (table, on) = (table.to_string(), on.to_string());
        self.apply(|st| st.inner_join(table, on))
    }

    pub fn left_join(&mut self, table: &str, on: &str) -> &mut Self {
        let (table, on) = (table.to_string(), on.to_string());
        self.apply(|st| st.left_join(table, on))
    }

    pub fn use_index(&mut self, index: &str) -> &mut Self {
        let index = index.to_string();
        self.apply(|st| st.use_index(index))
    }

    pub fn force_index(&mut self, index: &str) -> &mut Self {
        let index = index.to_string();
        self.apply(|st| st.force_index(index))
    }

    pub fn ignore_index(&mut self, index: &str) -> &mut Self {
        let index = index.to_string();
        self.apply(|st| st.ignore_index(index))
    }

    pub fn for_update(&mut self) -> &mut Self {
        self.apply(Statement::for_update)
    }

    /// Include soft-deleted rows in the next operation.
    pub fn unscoped(&mut self) -> &mut Self {
        self.apply(Statement::unscoped)
    }

    /// Run `sql` verbatim for the next `find`/`get`.
    pub fn sql(&mut self, sql: &str, args: Vec<Value>) -> &mut Self {
        let sql = sql.to_string();
        self.apply(|st| st.sql(sql, args))
    }

    /// Eagerly load an association path with the next `find`/`get`.
    pub fn preload(&mut self, preload: Preload) -> &mut Self {
        self.preloads.push(preload);
        self
    }

    /// Take the pending state, leaving a fresh statement behind.
    fn take_statement(&mut self) -> (Statement, Vec<Preload>) {
        let fresh = self.statement.reset();
        (
            std::mem::replace(&mut self.statement, fresh),
            std::mem::take(&mut self.preloads),
        )
    }

    fn bind_table(&self, st: Statement, name: &str) -> Statement {
        if st.table_name().is_some() || st.is_raw() {
            return st;
        }
        match self.catalog.table(name) {
            Some(info) => st.ref_table(info),
            None => st.table(name),
        }
    }

    fn bind_default_table(&mut self, name: &str) {
        if self.statement.table_name().is_none() && !self.statement.is_raw() {
            self.table(name);
        }
    }

    // ========================================================================
    // Driver access
    // ========================================================================

    pub(crate) fn new_statement(&self) -> Statement {
        Statement::new(Arc::clone(&self.dialect))
    }

    pub(crate) fn record_load(&mut self, event: LoadEvent) {
        self.n1_tracker.record_load(event);
    }

    pub(crate) fn fetch_rows(&self, sql: &str, args: &[Value]) -> Result<Vec<Row>> {
        let sql = self.dialect.filter_sql(sql);
        tracing::debug!(sql = %sql, args = args.len(), "query");
        self.driver
            .query(&sql, args)
            .map_err(|err| attach_sql(err, &sql))
    }

    fn execute_sql(&self, sql: &str, args: &[Value]) -> Result<ExecResult> {
        let sql = self.dialect.filter_sql(sql);
        tracing::debug!(sql = %sql, args = args.len(), "execute");
        self.driver
            .execute(&sql, args)
            .map_err(|err| attach_sql(err, &sql))
    }

    /// Run a write that may hand back the generated id as a result row.
    fn execute_returning_id(
        &self,
        sql: &str,
        args: &[Value],
        returns_rows: bool,
    ) -> Result<(u64, Option<i64>)> {
        if returns_rows {
            let rows = self.fetch_rows(sql, args)?;
            let id = rows.first().and_then(|r| r.get(0)).and_then(Value::as_i64);
            return Ok((rows.len() as u64, id));
        }
        let res = self.execute_sql(sql, args)?;
        Ok((res.rows_affected, res.last_insert_id))
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// Every matching record, with preloaded associations linked in.
    #[tracing::instrument(level = "debug", skip_all, fields(table = self.statement.table_name()))]
    pub fn find(&mut self) -> Result<Vec<Record>> {
        let (st, preloads) = self.take_statement();
        self.find_with(st, preloads)
    }

    pub fn find_as<M: Model>(&mut self) -> Result<Vec<M>> {
        self.bind_default_table(M::TABLE_NAME);
        self.find()?.iter().map(M::from_record).collect()
    }

    /// The first matching record.
    #[tracing::instrument(level = "debug", skip_all, fields(table = self.statement.table_name()))]
    pub fn get(&mut self) -> Result<Option<Record>> {
        let (st, preloads) = self.take_statement();
        let st = if st.is_raw() { st } else { st.limit(1) };
        Ok(self.find_with(st, preloads)?.into_iter().next())
    }

    pub fn get_as<M: Model>(&mut self) -> Result<Option<M>> {
        self.bind_default_table(M::TABLE_NAME);
        self.get()?.as_ref().map(M::from_record).transpose()
    }

    fn find_with(&mut self, st: Statement, preloads: Vec<Preload>) -> Result<Vec<Record>> {
        let (st, tree) = preload::prepare(&self.catalog, st, preloads)?;
        let (sql, args) = st.gen_query_sql()?;
        let table = st.table_name().unwrap_or_default();
        let records: Vec<Record> = self
            .fetch_rows(&sql, &args)?
            .iter()
            .map(|row| Record::from_row(table, row))
            .collect();

        let Some(tree) = tree else {
            return Ok(records);
        };
        let pk = single_primary_key(tree.root_table())?;
        let mut owners = RecordSet::from_records(vec![pk.to_string()], records);
        tree.compute(self, &mut owners)?;
        Ok(owners.into_records())
    }

    #[tracing::instrument(level = "debug", skip_all, fields(table = self.statement.table_name()))]
    pub fn count(&mut self) -> Result<i64> {
        let (st, _) = self.take_statement();
        let (sql, args) = st.gen_count_sql()?;
        let rows = self.fetch_rows(&sql, &args)?;
        Ok(first_value(&rows).and_then(Value::as_i64).unwrap_or(0))
    }

    /// `COALESCE(sum(col), 0)` for each column, in order.
    #[tracing::instrument(level = "debug", skip_all, fields(table = self.statement.table_name()))]
    pub fn sum(&mut self, columns: &[&str]) -> Result<Vec<f64>> {
        let (st, _) = self.take_statement();
        let (sql, args) = st.gen_sum_sql(columns)?;
        let rows = self.fetch_rows(&sql, &args)?;
        let Some(row) = rows.first() else {
            return Ok(vec![0.0; columns.len()]);
        };
        Ok((0..columns.len())
            .map(|i| row.get(i).and_then(Value::as_f64).unwrap_or(0.0))
            .collect())
    }

    #[tracing::instrument(level = "debug", skip_all, fields(table = self.statement.table_name()))]
    pub fn exist(&mut self) -> Result<bool> {
        let (st, _) = self.take_statement();
        let (sql, args) = st.gen_exist_sql()?;
        Ok(!self.fetch_rows(&sql, &args)?.is_empty())
    }

    // ========================================================================
    // Writes
    // ========================================================================

    /// Insert `record` into its table.
    ///
    /// Unset created/updated columns are filled with the current time and
    /// the generated id is written back into the record.
    #[tracing::instrument(level = "debug", skip_all, fields(table = record.table()))]
    pub fn insert(&mut self, record: &mut Record) -> Result<u64> {
        let (st, _) = self.take_statement();
        let st = self.bind_table(st, record.table());
        let info = st.table_info().cloned();
        if let Some(info) = &info {
            fill_timestamps(record, info, self.now());
        }

        let auto = info.as_ref().and_then(|t| t.auto_increment());
        let (columns, args) = insert_fields(record, auto);
        let (sql, args) = st.gen_insert_sql(&columns, args)?;
        let returns_rows =
            auto.is_some() && matches!(self.dialect.db_type(), DbType::Postgres | DbType::Mssql);
        let (affected, id) = self.execute_returning_id(&sql, &args, returns_rows)?;
        if let (Some(auto), Some(id)) = (auto, id) {
            record.set(auto, id);
        }
        Ok(affected)
    }

    pub fn insert_as<M: Model>(&mut self, model: &M) -> Result<u64> {
        let mut record = model.to_record();
        self.insert(&mut record)
    }

    #[tracing::instrument(level = "debug", skip_all, fields(table = %table))]
    pub fn insert_map(&mut self, table: &str, row: &BTreeMap<String, Value>) -> Result<u64> {
        let (st, _) = self.take_statement();
        let st = self.bind_table(st, table);
        let (sql, args) = st.gen_insert_map_sql(row)?;
        Ok(self.execute_sql(&sql, &args)?.rows_affected)
    }

    #[tracing::instrument(level = "debug", skip_all, fields(table = %table, rows = rows.len()))]
    pub fn insert_multiple_maps(
        &mut self,
        table: &str,
        rows: &[BTreeMap<String, Value>],
    ) -> Result<u64> {
        let (st, _) = self.take_statement();
        let st = self.bind_table(st, table);
        let (sql, args) = st.gen_insert_multiple_map_sql(rows)?;
        Ok(self.execute_sql(&sql, &args)?.rows_affected)
    }

    /// Update `record`'s row with every non-key column.
    ///
    /// Without pending conditions the row is matched by primary key.
    #[tracing::instrument(level = "debug", skip_all, fields(table = record.table()))]
    pub fn update(&mut self, record: &Record) -> Result<u64> {
        let (st, _) = self.take_statement();
        let mut st = self.bind_table(st, record.table());
        let info = st.table_info().cloned();
        let pks = info.as_ref().map(|t| t.primary_keys()).unwrap_or_default();

        let mut assignments: Vec<(String, Value)> = record
            .fields()
            .iter()
            .filter(|(c, _)| !pks.iter().any(|pk| *pk == c.as_str()))
            .cloned()
            .collect();
        if let Some(updated) = info.as_ref().and_then(|t| t.updated_column()) {
            set_assignment(&mut assignments, updated.name, Value::Timestamp(self.now()));
        }

        if !st.conds().is_valid() {
            for pk in &pks {
                if let Some(value) = record.get(pk) {
                    st = st.filter(Cond::eq(generic(pk), value.clone()));
                }
            }
        }
        let (sql, args) = st.gen_update_sql(&assignments)?;
        Ok(self.execute_sql(&sql, &args)?.rows_affected)
    }

    /// Update matching rows of `table` with the map's values.
    #[tracing::instrument(level = "debug", skip_all, fields(table = %table))]
    pub fn update_map(&mut self, table: &str, values: &BTreeMap<String, Value>) -> Result<u64> {
        let (st, _) = self.take_statement();
        let st = self.bind_table(st, table);
        let mut assignments: Vec<(String, Value)> =
            values.iter().map(|(c, v)| (c.clone(), v.clone())).collect();
        if let Some(updated) = st.table_info().and_then(|t| t.updated_column()) {
            set_assignment(&mut assignments, updated.name, Value::Timestamp(self.now()));
        }
        let (sql, args) = st.gen_update_sql(&assignments)?;
        Ok(self.execute_sql(&sql, &args)?.rows_affected)
    }

    /// Delete the rows matching the pending conditions; a soft delete on
    /// tables with a deleted column.
    #[tracing::instrument(level = "debug", skip_all, fields(table = self.statement.table_name()))]
    pub fn delete(&mut self) -> Result<u64> {
        let (st, _) = self.take_statement();
        self.delete_with(&st)
    }

    /// Delete the rows equal to every non-NULL value of `record`.
    #[tracing::instrument(level = "debug", skip_all, fields(table = record.table()))]
    pub fn delete_record(&mut self, record: &Record) -> Result<u64> {
        let (st, _) = self.take_statement();
        let st = record
            .fields()
            .iter()
            .filter(|(_, v)| !v.is_null())
            .fold(self.bind_table(st, record.table()), |st, (c, v)| {
                st.filter(Cond::eq(generic(c), v.clone()))
            });
        self.delete_with(&st)
    }

    fn delete_with(&self, st: &Statement) -> Result<u64> {
        let out = st.gen_delete_sql(self.now())?;
        if out.is_soft() {
            tracing::debug!(hard_sql = %out.hard_sql, "delete rewritten to soft delete");
        }
        Ok(self.execute_sql(&out.sql, &out.args)?.rows_affected)
    }

    // ========================================================================
    // Upserts
    // ========================================================================

    /// Insert `record`, or update the row it conflicts with.
    pub fn upsert(&mut self, record: &mut Record) -> Result<u64> {
        self.upsert_record(record, true)
    }

    /// Insert `record` unless it conflicts with an existing row.
    pub fn insert_on_conflict_do_nothing(&mut self, record: &mut Record) -> Result<u64> {
        self.upsert_record(record, false)
    }

    pub fn upsert_map(&mut self, table: &str, row: &BTreeMap<String, Value>) -> Result<u64> {
        self.upsert_map_with(table, row, true)
    }

    pub fn insert_map_on_conflict_do_nothing(
        &mut self,
        table: &str,
        row: &BTreeMap<String, Value>,
    ) -> Result<u64> {
        self.upsert_map_with(table, row, false)
    }

    #[tracing::instrument(level = "debug", skip_all, fields(table = record.table(), do_update = do_update))]
    fn upsert_record(&mut self, record: &mut Record, do_update: bool) -> Result<u64> {
        let (st, _) = self.take_statement();
        let st = self.bind_table(st, record.table());
        let info = st.table_info().cloned();
        if let Some(info) = &info {
            fill_timestamps(record, info, self.now());
        }

        let auto = info.as_ref().and_then(|t| t.auto_increment());
        let (columns, args) = insert_fields(record, auto);
        let add_output = auto.is_some();
        let (sql, args) = st.gen_upsert_sql(do_update, add_output, &columns, args)?;
        let returns_rows = add_output
            && (self.dialect.supports_returning() || self.dialect.db_type() == DbType::Mssql);

        let (affected, id) = self.execute_returning_id(&sql, &args, returns_rows)?;
        let affected = self.normalize_upsert_affected(affected);
        if affected > 0 {
            if let (Some(auto), Some(id)) = (auto, id.filter(|id| *id > 0)) {
                record.set(auto, id);
            }
        }
        Ok(affected)
    }

    #[tracing::instrument(level = "debug", skip_all, fields(table = %table, do_update = do_update))]
    fn upsert_map_with(
        &mut self,
        table: &str,
        row: &BTreeMap<String, Value>,
        do_update: bool,
    ) -> Result<u64> {
        let (st, _) = self.take_statement();
        let st = self.bind_table(st, table);
        let (sql, args) = st.gen_upsert_map_sql(do_update, row)?;
        let affected = self.execute_sql(&sql, &args)?.rows_affected;
        Ok(self.normalize_upsert_affected(affected))
    }

    /// MySQL counts an upsert that updated as two affected rows.
    fn normalize_upsert_affected(&self, affected: u64) -> u64 {
        if self.config.normalize_upsert_affected
            && self.dialect.db_type() == DbType::Mysql
            && affected == 2
        {
            tracing::debug!("normalized MySQL upsert-update count from 2 to 1");
            return 1;
        }
        affected
    }

    // ========================================================================
    // Raw SQL
    // ========================================================================

    /// Execute raw SQL. Backtick-quoted identifiers are rewritten for the
    /// dialect and `?` placeholders filtered.
    #[tracing::instrument(level = "debug", skip_all)]
    pub fn exec(&mut self, sql: &str, args: &[Value]) -> Result<ExecResult> {
        let sql = self.dialect.quoter().replace(sql);
        self.execute_sql(&sql, args)
    }

    /// Run a raw query and return its rows.
    #[tracing::instrument(level = "debug", skip_all)]
    pub fn query(&mut self, sql: &str, args: &[Value]) -> Result<Vec<Row>> {
        let sql = self.dialect.quoter().replace(sql);
        self.fetch_rows(&sql, args)
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn attach_sql(err: Error, sql: &str) -> Error {
    match err {
        Error::Query(q) if q.sql.is_none() => Error::Query(q.with_sql(sql)),
        other => other,
    }
}

fn first_value(rows: &[Row]) -> Option<&Value> {
    rows.first().and_then(|r| r.get(0))
}

/// Columns and values to insert; a NULL auto-increment column is left to
/// the database.
fn insert_fields(record: &Record, auto: Option<&str>) -> (Vec<String>, Vec<Value>) {
    record
        .fields()
        .iter()
        .filter(|(c, v)| !(v.is_null() && auto == Some(c.as_str())))
        .map(|(c, v)| (c.clone(), v.clone()))
        .unzip()
}

/// Fill unset created/updated columns with `now`.
fn fill_timestamps(record: &mut Record, table: &TableInfo, now: NaiveDateTime) {
    for column in [table.created_column(), table.updated_column()]
        .into_iter()
        .flatten()
    {
        if record.get(column.name).is_none_or(Value::is_null) {
            record.set(column.name, Value::Timestamp(now));
        }
    }
}

fn set_assignment(assignments: &mut Vec<(String, Value)>, column: &str, value: Value) {
    match assignments.iter_mut().find(|(c, _)| c == column) {
        Some((_, slot)) => *slot = value,
        None => assignments.push((column.to_string(), value)),
    }
}

// ============================================================================
// Test support
// ============================================================================

#[cfg(test)]
pub(crate) mod tests_support {
    use rowmap_core::{
        Association, Catalog, ColumnInfo, Driver, ExecResult, IndexInfo, JoinTableInfo, Result,
        Row, TableInfo, Value,
    };
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::sync::Arc;

    /// `employee(id, name, buddy_id, manager_id)` with every association
    /// kind, plus its many-to-many join table.
    pub fn employee_catalog() -> Catalog {
        let indications = JoinTableInfo::new("employee_indication", "indicator_id", "indicated_id");
        let indicated_by = JoinTableInfo::new("employee_indication", "indicated_id", "indicator_id");
        Catalog::new()
            .register(
                TableInfo::new("employee")
                    .column(ColumnInfo::new("id").primary_key(true).auto_increment(true))
                    .column(ColumnInfo::new("name"))
                    .column(ColumnInfo::new("buddy_id").nullable(true))
                    .column(ColumnInfo::new("manager_id").nullable(true))
                    .index(IndexInfo::unique("UQE_employee_buddy_id", &["buddy_id"]))
                    .association(Association::belongs_to("Buddy", "employee", "employee", "buddy_id"))
                    .association(Association::has_one("Apprentice", "employee", "employee", "buddy_id"))
                    .association(Association::belongs_to(
                        "Manager",
                        "employee",
                        "employee",
                        "manager_id",
                    ))
                    .association(Association::has_many(
                        "Subordinates",
                        "employee",
                        "employee",
                        "manager_id",
                    ))
                    .association(Association::many_to_many(
                        "Indications",
                        "employee",
                        "employee",
                        indications,
                    ))
                    .association(Association::many_to_many(
                        "IndicatedBy",
                        "employee",
                        "employee",
                        indicated_by,
                    )),
            )
            .register(
                TableInfo::new("employee_indication")
                    .column(ColumnInfo::new("indicator_id").primary_key(true))
                    .column(ColumnInfo::new("indicated_id").primary_key(true)),
            )
    }

    pub fn rows(columns: &[&str], values: Vec<Vec<Value>>) -> Vec<Row> {
        let columns = Arc::new(columns.iter().map(|c| (*c).to_string()).collect::<Vec<_>>());
        values
            .into_iter()
            .map(|v| Row::new(Arc::clone(&columns), v))
            .collect()
    }

    /// Records every statement and answers from queued results.
    #[derive(Default)]
    pub struct MockDriver {
        pub log: RefCell<Vec<(String, Vec<Value>)>>,
        queries: RefCell<VecDeque<Vec<Row>>>,
        executes: RefCell<VecDeque<ExecResult>>,
    }

    impl MockDriver {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn push_rows(&self, rows: Vec<Row>) {
            self.queries.borrow_mut().push_back(rows);
        }

        pub fn push_exec(&self, rows_affected: u64, last_insert_id: Option<i64>) {
            self.executes.borrow_mut().push_back(ExecResult {
                rows_affected,
                last_insert_id,
            });
        }

        pub fn statements(&self) -> Vec<String> {
            self.log.borrow().iter().map(|(sql, _)| sql.clone()).collect()
        }
    }

    impl Driver for MockDriver {
        fn execute(&self, sql: &str, args: &[Value]) -> Result<ExecResult> {
            self.log.borrow_mut().push((sql.to_string(), args.to_vec()));
            Ok(self.executes.borrow_mut().pop_front().unwrap_or(ExecResult {
                rows_affected: 1,
                last_insert_id: None,
            }))
        }

        fn query(&self, sql: &str, args: &[Value]) -> Result<Vec<Row>> {
            self.log.borrow_mut().push((sql.to_string(), args.to_vec()));
            Ok(self.queries.borrow_mut().pop_front().unwrap_or_default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::tests_support::{MockDriver, employee_catalog, rows};
    use super::*;
    use rowmap_core::{ColumnInfo, IndexInfo};

    fn session<'a>(driver: &'a MockDriver, dialect: Dialect) -> Session<&'a MockDriver> {
        Session::new(driver, Arc::new(dialect), Arc::new(employee_catalog()))
    }

    fn employee(id: i64, manager_id: Option<i64>) -> Vec<Value> {
        vec![
            Value::BigInt(id),
            Value::from(format!("e{id}")),
            Value::Null,
            Value::from(manager_id),
        ]
    }

    const EMPLOYEE_COLS: &[&str] = &["id", "name", "buddy_id", "manager_id"];

    #[test]
    fn test_session_config_defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.time_zone, TimeZone::Utc);
        assert_eq!(config.n1_threshold, 3);
        assert!(config.n1_detection);
        assert!(config.normalize_upsert_affected);
    }

    #[test]
    fn test_preload_manager_subordinates() {
        let driver = MockDriver::new();
        driver.push_rows(rows(EMPLOYEE_COLS, vec![employee(3, Some(1))]));
        driver.push_rows(rows(&["id"], vec![vec![Value::BigInt(1)]]));
        driver.push_rows(rows(
            EMPLOYEE_COLS,
            vec![employee(3, Some(1)), employee(5, Some(1))],
        ));

        let mut s = session(&driver, Dialect::sqlite());
        let found = s
            .table("employee")
            .filter(Cond::eq("`id`", 3i64))
            .preload(Preload::new("Manager.Subordinates"))
            .find()
            .unwrap();

        assert_eq!(
            driver.statements(),
            vec![
                "SELECT `id`, `name`, `buddy_id`, `manager_id` FROM `employee` WHERE `id`=?".to_string(),
                "SELECT `id` FROM `employee` WHERE `id` IN (?)".to_string(),
                "SELECT `id`, `name`, `buddy_id`, `manager_id` FROM `employee` WHERE `manager_id` IN (?)"
                    .to_string(),
            ]
        );
        assert_eq!(found.len(), 1);
        let manager = found[0].one("Manager").unwrap();
        assert_eq!(manager.get("id"), Some(&Value::BigInt(1)));
        let ids: Vec<_> = manager
            .many("Subordinates")
            .iter()
            .map(|r| r.get_i64("id").unwrap())
            .collect();
        assert_eq!(ids, vec![3, 5]);
        assert_eq!(s.n1_tracker().count_for("employee", "Manager"), 1);
        assert_eq!(s.n1_tracker().count_for("employee", "Subordinates"), 1);
    }

    #[test]
    fn test_unregistered_table_selects_star() {
        let driver = MockDriver::new();
        let mut s = session(&driver, Dialect::sqlite());
        s.table("audit_log")
            .filter(Cond::eq("`id`", 1i64))
            .find()
            .unwrap();
        s.table("employee").find().unwrap();
        assert_eq!(
            driver.statements(),
            vec![
                "SELECT * FROM `audit_log` WHERE `id`=?".to_string(),
                "SELECT `id`, `name`, `buddy_id`, `manager_id` FROM `employee`".to_string(),
            ]
        );
    }

    #[test]
    fn test_one_query_per_level_regardless_of_batch_size() {
        let driver = MockDriver::new();
        driver.push_rows(rows(
            EMPLOYEE_COLS,
            vec![
                employee(3, Some(1)),
                employee(4, Some(2)),
                employee(5, Some(1)),
                employee(6, Some(2)),
            ],
        ));
        driver.push_rows(rows(&["id"], vec![vec![Value::BigInt(1)], vec![Value::BigInt(2)]]));
        driver.push_rows(rows(
            EMPLOYEE_COLS,
            vec![
                employee(3, Some(1)),
                employee(4, Some(2)),
                employee(5, Some(1)),
                employee(6, Some(2)),
            ],
        ));

        let mut s = session(&driver, Dialect::sqlite());
        let found = s
            .table("employee")
            .preload(Preload::new("Manager.Subordinates"))
            .find()
            .unwrap();

        assert_eq!(driver.log.borrow().len(), 3);
        assert_eq!(driver.log.borrow()[1].1, vec![Value::BigInt(1), Value::BigInt(2)]);
        for record in &found {
            assert_eq!(record.one("Manager").unwrap().many("Subordinates").len(), 2);
        }
    }

    #[test]
    fn test_owner_without_matching_chain_is_pruned() {
        let driver = MockDriver::new();
        driver.push_rows(rows(EMPLOYEE_COLS, vec![employee(3, Some(1))]));
        driver.push_rows(rows(&["id"], vec![vec![Value::BigInt(1)]]));
        driver.push_rows(Vec::new());

        let mut s = session(&driver, Dialect::sqlite());
        let found = s
            .table("employee")
            .preload(Preload::new("Manager.Subordinates"))
            .find()
            .unwrap();
        assert!(found[0].one("Manager").is_none());
    }

    #[test]
    fn test_restricted_root_selects_link_columns() {
        let driver = MockDriver::new();
        let mut s = session(&driver, Dialect::sqlite());
        s.table("employee")
            .cols(&["name"])
            .preload(Preload::new("Manager"))
            .find()
            .unwrap();
        assert_eq!(
            driver.statements()[0],
            "SELECT `name`, `id`, `manager_id` FROM `employee`"
        );
    }

    #[test]
    fn test_many_to_many_runs_join_query() {
        let driver = MockDriver::new();
        driver.push_rows(rows(EMPLOYEE_COLS, vec![employee(2, None)]));
        driver.push_rows(rows(
            &["indicator_id", "indicated_id"],
            vec![
                vec![Value::BigInt(2), Value::BigInt(3)],
                vec![Value::BigInt(2), Value::BigInt(4)],
            ],
        ));
        driver.push_rows(rows(
            EMPLOYEE_COLS,
            vec![employee(3, Some(1)), employee(4, Some(2))],
        ));

        let mut s = session(&driver, Dialect::sqlite());
        let found = s
            .table("employee")
            .filter(Cond::eq("`id`", 2i64))
            .preload(Preload::new("Indications"))
            .get()
            .unwrap()
            .unwrap();

        let statements = driver.statements();
        assert_eq!(
            statements[1],
            "SELECT `indicator_id`, `indicated_id` FROM `employee_indication` WHERE `indicator_id` IN (?)"
        );
        assert_eq!(
            statements[2],
            "SELECT `id`, `name`, `buddy_id`, `manager_id` FROM `employee` WHERE `id` IN (?,?)"
        );
        assert_eq!(found.many("Indications").len(), 2);
    }

    #[test]
    fn test_insert_writes_back_returned_id_on_postgres() {
        let driver = MockDriver::new();
        driver.push_rows(rows(&["id"], vec![vec![Value::BigInt(9)]]));
        let mut s = session(&driver, Dialect::postgres());

        let mut record = Record::new("employee")
            .with("id", Value::Null)
            .with("name", "Ann");
        let affected = s.insert(&mut record).unwrap();
        assert_eq!(affected, 1);
        assert_eq!(record.get("id"), Some(&Value::BigInt(9)));
        assert_eq!(
            driver.statements()[0],
            r#"INSERT INTO "employee" ("name") VALUES ($1) RETURNING "id""#
        );
    }

    #[test]
    fn test_insert_uses_last_insert_id_on_sqlite() {
        let driver = MockDriver::new();
        driver.push_exec(1, Some(4));
        let mut s = session(&driver, Dialect::sqlite());
        let mut record = Record::new("employee").with("name", "Ann");
        s.insert(&mut record).unwrap();
        assert_eq!(record.get("id"), Some(&Value::BigInt(4)));
    }

    #[test]
    fn test_mysql_upsert_update_count_is_normalized() {
        let catalog = Catalog::new().register(
            TableInfo::new("one_unique")
                .column(ColumnInfo::new("id").primary_key(true).auto_increment(true))
                .column(ColumnInfo::new("data"))
                .column(ColumnInfo::new("other").nullable(true))
                .index(IndexInfo::unique("UQE_one_unique_data", &["data"])),
        );
        let driver = MockDriver::new();
        driver.push_exec(2, Some(7));
        let mut s = Session::new(&driver, Arc::new(Dialect::mysql()), Arc::new(catalog));

        let mut record = Record::new("one_unique").with("data", "x").with("other", "y");
        assert_eq!(s.upsert(&mut record).unwrap(), 1);
        assert_eq!(record.get("id"), Some(&Value::BigInt(7)));
        assert_eq!(
            driver.statements()[0],
            "INSERT INTO `one_unique` (`data`,`other`) VALUES (?,?) ON DUPLICATE KEY UPDATE `other` = VALUES(`other`), `id` = LAST_INSERT_ID(`id`)"
        );
    }

    #[test]
    fn test_update_matches_primary_key() {
        let driver = MockDriver::new();
        let mut s = session(&driver, Dialect::sqlite());
        let record = Record::new("employee").with("id", 3i64).with("name", "Zed");
        s.update(&record).unwrap();
        assert_eq!(
            driver.log.borrow()[0],
            (
                "UPDATE `employee` SET `name` = ? WHERE `id`=?".to_string(),
                vec![Value::from("Zed"), Value::BigInt(3)]
            )
        );
    }

    #[test]
    fn test_statement_resets_after_each_operation() {
        let driver = MockDriver::new();
        let mut s = session(&driver, Dialect::sqlite());
        s.table("employee").filter(Cond::eq("`id`", 1i64)).count().unwrap();
        assert!(s.statement().table_name().is_none());
        assert!(!s.statement().conds().is_valid());
        assert_eq!(
            driver.statements()[0],
            "SELECT count(*) FROM `employee` WHERE `id`=?"
        );
    }

    #[test]
    fn test_generation_error_runs_nothing() {
        let driver = MockDriver::new();
        let mut s = session(&driver, Dialect::sqlite());
        let err = s.table("employee").delete().unwrap_err();
        assert!(matches!(err, Error::NeedDeletedCond));
        assert!(driver.log.borrow().is_empty());
    }

    #[test]
    fn test_raw_exec_rewrites_quotes_and_placeholders() {
        let driver = MockDriver::new();
        let mut s = session(&driver, Dialect::postgres());
        s.exec("DELETE FROM `employee` WHERE `id` = ?", &[Value::BigInt(1)])
            .unwrap();
        assert_eq!(
            driver.statements()[0],
            r#"DELETE FROM "employee" WHERE "id" = $1"#
        );
    }
}
