//! Dialect descriptors.
//!
//! A [`Dialect`] is the per-engine strategy table the statement builder
//! consults: quoting, pagination style, upsert family, and a handful of
//! capability flags. It is created once when an engine is configured and
//! shared read-only (`Arc<Dialect>`) by every session.

use crate::filter;
use crate::quote::{Quoter, always_no_reserve, always_reserve};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Supported database engines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DbType {
    Mysql,
    Postgres,
    Sqlite,
    Mssql,
    Oracle,
    Dameng,
}

impl DbType {
    pub const fn as_str(self) -> &'static str {
        match self {
            DbType::Mysql => "mysql",
            DbType::Postgres => "postgres",
            DbType::Sqlite => "sqlite",
            DbType::Mssql => "mssql",
            DbType::Oracle => "oracle",
            DbType::Dameng => "dameng",
        }
    }
}

impl fmt::Display for DbType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How LIMIT/OFFSET is expressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pagination {
    /// `LIMIT n OFFSET m`
    LimitOffset,
    /// `SELECT TOP n` plus a `NOT IN (SELECT TOP m ...)` exclusion
    TopNotIn,
    /// Outer `ROWNUM`-bounded wrapping subqueries
    RowNum,
}

/// How insert-or-update is expressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertFamily {
    /// `ON CONFLICT ... DO UPDATE | DO NOTHING`
    OnConflict,
    /// `ON DUPLICATE KEY UPDATE` / `INSERT IGNORE`
    OnDuplicateKey,
    /// Synthesized `MERGE INTO ... USING ...`
    Merge,
}

/// Which words the dialect quoter wraps.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuotePolicy {
    #[default]
    Always,
    Never,
    /// Only the dialect's reserved words.
    Reserved,
}

/// Optional capabilities that may be switched off per engine instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Features {
    /// Whether upsert may update the conflicting row.
    pub upsert_update: bool,
}

impl Default for Features {
    fn default() -> Self {
        Self {
            upsert_update: true,
        }
    }
}

/// Per-engine SQL syntax profile.
#[derive(Debug, Clone)]
pub struct Dialect {
    db_type: DbType,
    quoter: Quoter,
    features: Features,
}

impl Dialect {
    /// A dialect that quotes every identifier.
    pub fn new(db_type: DbType) -> Self {
        let (prefix, suffix) = quote_marks(db_type);
        Self {
            db_type,
            quoter: Quoter::new(prefix, suffix, always_reserve),
            features: Features::default(),
        }
    }

    pub fn mysql() -> Self {
        Self::new(DbType::Mysql)
    }

    pub fn postgres() -> Self {
        Self::new(DbType::Postgres)
    }

    pub fn sqlite() -> Self {
        Self::new(DbType::Sqlite)
    }

    pub fn mssql() -> Self {
        Self::new(DbType::Mssql)
    }

    pub fn oracle() -> Self {
        Self::new(DbType::Oracle)
    }

    pub fn dameng() -> Self {
        Self::new(DbType::Dameng)
    }

    #[must_use]
    pub fn with_quote_policy(mut self, policy: QuotePolicy) -> Self {
        let is_reserved = match policy {
            QuotePolicy::Always => always_reserve,
            QuotePolicy::Never => always_no_reserve,
            QuotePolicy::Reserved => reserved_predicate(self.db_type),
        };
        self.quoter = self.quoter.with_reserved(is_reserved);
        self
    }

    #[must_use]
    pub fn with_features(mut self, features: Features) -> Self {
        self.features = features;
        self
    }

    pub const fn db_type(&self) -> DbType {
        self.db_type
    }

    pub const fn quoter(&self) -> &Quoter {
        &self.quoter
    }

    pub const fn features(&self) -> Features {
        self.features
    }

    pub const fn pagination(&self) -> Pagination {
        match self.db_type {
            DbType::Mssql => Pagination::TopNotIn,
            DbType::Oracle => Pagination::RowNum,
            _ => Pagination::LimitOffset,
        }
    }

    pub const fn upsert_family(&self) -> UpsertFamily {
        match self.db_type {
            DbType::Mysql => UpsertFamily::OnDuplicateKey,
            DbType::Postgres | DbType::Sqlite => UpsertFamily::OnConflict,
            DbType::Mssql | DbType::Oracle | DbType::Dameng => UpsertFamily::Merge,
        }
    }

    pub const fn supports_for_update(&self) -> bool {
        matches!(
            self.db_type,
            DbType::Mysql | DbType::Postgres | DbType::Oracle | DbType::Dameng
        )
    }

    pub const fn supports_index_hints(&self) -> bool {
        matches!(self.db_type, DbType::Mysql)
    }

    /// Whether the engine has `INSERT ... RETURNING`.
    pub const fn supports_returning(&self) -> bool {
        matches!(self.db_type, DbType::Postgres | DbType::Sqlite)
    }

    /// Oracle and Dameng feed auto-increment columns from a sequence.
    pub const fn uses_sequences(&self) -> bool {
        matches!(self.db_type, DbType::Oracle | DbType::Dameng)
    }

    /// Sequence feeding `table`'s auto-increment column.
    pub fn seq_name(&self, table: &str) -> String {
        format!("SEQ_{}", table.to_uppercase())
    }

    /// Rewrite `?` placeholders into the engine's native form.
    pub fn filter_sql(&self, sql: &str) -> String {
        match self.db_type {
            DbType::Postgres => filter::convert_question_marks(sql, "$", 1),
            DbType::Oracle => filter::convert_question_marks(sql, ":", 1),
            DbType::Mssql => filter::convert_question_marks(sql, "@p", 1),
            DbType::Mysql | DbType::Sqlite | DbType::Dameng => sql.to_string(),
        }
    }

    pub fn quote(&self, ident: &str) -> rowmap_core::Result<String> {
        self.quoter.quote(ident)
    }
}

const fn quote_marks(db_type: DbType) -> (char, char) {
    match db_type {
        DbType::Mysql | DbType::Sqlite => ('`', '`'),
        DbType::Postgres | DbType::Oracle | DbType::Dameng => ('"', '"'),
        DbType::Mssql => ('[', ']'),
    }
}

// ============================================================================
// Reserved words
// ============================================================================

const COMMON_RESERVED: &[&str] = &[
    "ADD", "ALL", "ALTER", "AND", "AS", "ASC", "BETWEEN", "BY", "CASE", "CHECK", "COLUMN",
    "CONSTRAINT", "CREATE", "CROSS", "DEFAULT", "DELETE", "DESC", "DISTINCT", "DROP", "ELSE",
    "END", "EXISTS", "FOREIGN", "FROM", "FULL", "GROUP", "HAVING", "IN", "INDEX", "INNER",
    "INSERT", "INTO", "IS", "JOIN", "KEY", "LEFT", "LIKE", "LIMIT", "NOT", "NULL", "ON", "OR",
    "ORDER", "OUTER", "PRIMARY", "REFERENCES", "RIGHT", "SELECT", "SET", "TABLE", "THEN", "TO",
    "UNION", "UNIQUE", "UPDATE", "USER", "USING", "VALUES", "WHEN", "WHERE", "WITH",
];

const MYSQL_RESERVED: &[&str] = &[
    "CHANGE", "DATABASE", "DATABASES", "DUAL", "FORCE", "IGNORE", "INTERVAL", "KEYS", "KILL",
    "LOCK", "MATCH", "OPTION", "READ", "REPLACE", "SCHEMA", "SHOW", "STATUS", "TRIGGER", "USE",
    "WRITE",
];

const POSTGRES_RESERVED: &[&str] = &[
    "ANALYSE", "ANALYZE", "ARRAY", "ASYMMETRIC", "BOTH", "CAST", "COLLATE", "CURRENT_DATE",
    "CURRENT_ROLE", "CURRENT_TIME", "CURRENT_TIMESTAMP", "CURRENT_USER", "DEFERRABLE", "DO",
    "EXCEPT", "FALSE", "FETCH", "FOR", "GRANT", "INITIALLY", "INTERSECT", "LATERAL", "LEADING",
    "LOCALTIME", "OFFSET", "ONLY", "PLACING", "RETURNING", "SESSION_USER", "SOME", "SYMMETRIC",
    "TRAILING", "TRUE", "VARIADIC", "WINDOW",
];

const SQLITE_RESERVED: &[&str] = &[
    "ABORT", "AFTER", "ATTACH", "AUTOINCREMENT", "CONFLICT", "DETACH", "EXCLUSIVE", "GLOB",
    "INDEXED", "ISNULL", "NOTNULL", "OFFSET", "PRAGMA", "RAISE", "REGEXP", "REINDEX", "RENAME",
    "ROWID", "TEMP", "VACUUM",
];

const MSSQL_RESERVED: &[&str] = &[
    "BACKUP", "BREAK", "BROWSE", "CLUSTERED", "COMPUTE", "CONTAINS", "CURSOR", "DENY", "DUMP",
    "EXEC", "EXECUTE", "FILE", "HOLDLOCK", "IDENTITY", "MERGE", "NOCHECK", "OUTPUT", "PERCENT",
    "PIVOT", "PROC", "READTEXT", "RULE", "TOP", "TRAN", "TRUNCATE",
];

const ORACLE_RESERVED: &[&str] = &[
    "ACCESS", "AUDIT", "CLUSTER", "COMMENT", "COMPRESS", "CONNECT", "FILE", "LEVEL", "LONG",
    "MINUS", "MODE", "NUMBER", "OFFLINE", "ONLINE", "PRIOR", "RAW", "RESOURCE", "ROW", "ROWID",
    "ROWNUM", "ROWS", "SESSION", "SIZE", "START", "SYNONYM", "SYSDATE", "UID", "VARCHAR2",
];

fn reserved_in(lists: &[&[&str]], word: &str) -> bool {
    lists
        .iter()
        .any(|list| list.iter().any(|w| w.eq_ignore_ascii_case(word)))
}

fn mysql_reserved(word: &str) -> bool {
    reserved_in(&[COMMON_RESERVED, MYSQL_RESERVED], word)
}

fn postgres_reserved(word: &str) -> bool {
    reserved_in(&[COMMON_RESERVED, POSTGRES_RESERVED], word)
}

fn sqlite_reserved(word: &str) -> bool {
    reserved_in(&[COMMON_RESERVED, SQLITE_RESERVED], word)
}

fn mssql_reserved(word: &str) -> bool {
    reserved_in(&[COMMON_RESERVED, MSSQL_RESERVED], word)
}

fn oracle_reserved(word: &str) -> bool {
    reserved_in(&[COMMON_RESERVED, ORACLE_RESERVED], word)
}

const fn reserved_predicate(db_type: DbType) -> fn(&str) -> bool {
    match db_type {
        DbType::Mysql => mysql_reserved,
        DbType::Postgres => postgres_reserved,
        DbType::Sqlite => sqlite_reserved,
        DbType::Mssql => mssql_reserved,
        DbType::Oracle | DbType::Dameng => oracle_reserved,
    }
}
