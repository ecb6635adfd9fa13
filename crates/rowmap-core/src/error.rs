//! Error types for rowmap.
//!
//! Every failure surfaced by statement synthesis, preload resolution, or a
//! driver is an [`Error`]. Generation errors are returned before any SQL is
//! handed to the driver; nothing is retried or downgraded to a log line.

use std::error::Error as StdError;
use std::fmt;

/// The primary error type for all rowmap operations.
#[derive(Debug, Clone)]
pub enum Error {
    /// The statement has neither an explicit table nor a bound table.
    MissingTableName,
    /// DELETE without any condition and without a limit.
    NeedDeletedCond,
    /// The dialect cannot express the requested operation.
    NotImplemented(String),
    /// Index hint operator other than USE, FORCE or IGNORE.
    InvalidIndexHintOperator(String),
    /// The identifier could not be parsed for quoting.
    Quote(String),
    /// Preload tree construction or validation failed.
    Preload(PreloadError),
    /// Upsert against a table without any unique index.
    NoUniqueConstraints { table: String },
    /// Upsert with update matched more than one unique constraint.
    MultipleUniqueConstraints { table: String, count: usize },
    /// A unique index column has neither a value nor a default.
    MissingUniqueValue { index: String, column: String },
    /// Batch inserts cannot be combined with conditions.
    BatchInsertWithCondition,
    /// Batch insert called with no rows.
    EmptyBatch,
    /// UPDATE without any assignment.
    NoColumnsToUpdate,
    /// INSERT with no column, expression or sequence to fill, on an engine
    /// without an empty-row form.
    NoColumnsToInsert { table: String },
    /// A column name that the bound table does not declare.
    UnknownColumn { column: String, table: String },
    /// Record to typed model conversion failed.
    Conversion(String),
    /// The driver rejected or failed to run a statement.
    Query(QueryError),
}

/// Preload tree errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PreloadError {
    /// The same dotted path was registered twice.
    DuplicatedPath(Vec<String>),
    /// The path segment names no field on the table.
    MissingField { field: String, table: String },
    /// The field exists but is not relation-valued.
    MissingAssociation { field: String },
    /// A restricted column does not exist on the referenced table.
    MissingColumn { column: String, table: String },
    /// A table named by an association is not registered in the catalog.
    UnknownTable(String),
    /// Linking requires a single-column primary key.
    CompositeKey { table: String },
}

/// Failure reported by a driver while executing generated SQL.
#[derive(Debug, Clone)]
pub struct QueryError {
    pub sql: Option<String>,
    pub message: String,
}

impl QueryError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            sql: None,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn with_sql(mut self, sql: impl Into<String>) -> Self {
        self.sql = Some(sql.into());
        self
    }
}

impl Error {
    /// Shorthand for a driver failure.
    pub fn query(message: impl Into<String>) -> Self {
        Error::Query(QueryError::new(message))
    }

    /// Shorthand for a capability error.
    pub fn not_implemented(what: impl Into<String>) -> Self {
        Error::NotImplemented(what.into())
    }

    /// Whether this error was raised before any SQL reached the driver.
    pub fn is_generation_error(&self) -> bool {
        !matches!(self, Error::Query(_) | Error::Conversion(_))
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::MissingTableName => write!(f, "no table name was given"),
            Error::NeedDeletedCond => write!(f, "Delete action needs at least one condition"),
            Error::NotImplemented(what) => write!(f, "Not implemented: {}", what),
            Error::InvalidIndexHintOperator(op) => {
                write!(f, "invalid index hint operator: {}", op)
            }
            Error::Quote(value) => write!(f, "unable to determine quoting for {:?}", value),
            Error::Preload(e) => write!(f, "{}", e),
            Error::NoUniqueConstraints { table } => {
                write!(f, "provided record of {} has no unique constraints", table)
            }
            Error::MultipleUniqueConstraints { table, count } => write!(
                f,
                "cannot upsert with update into {}: record matches multiple unique constraints ({})",
                table, count
            ),
            Error::MissingUniqueValue { index, column } => write!(
                f,
                "provided record does not provide a value for unique constraint {} column {}",
                index, column
            ),
            Error::BatchInsertWithCondition => write!(f, "batch insert don't support with where"),
            Error::EmptyBatch => write!(f, "batch insert needs at least one row"),
            Error::NoColumnsToUpdate => write!(f, "No content found to be updated"),
            Error::NoColumnsToInsert { table } => {
                write!(f, "no columns to insert into {}", table)
            }
            Error::UnknownColumn { column, table } => {
                write!(f, "column {} does not exist in table {}", column, table)
            }
            Error::Conversion(msg) => write!(f, "conversion error: {}", msg),
            Error::Query(e) => write!(f, "{}", e),
        }
    }
}

impl fmt::Display for PreloadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PreloadError::DuplicatedPath(path) => {
                write!(f, "preload: duplicated path: {}", path.join(","))
            }
            PreloadError::MissingField { field, table } => {
                write!(f, "preload: missing field {} in table {}", field, table)
            }
            PreloadError::MissingAssociation { field } => {
                write!(f, "preload: missing association in field {}", field)
            }
            PreloadError::MissingColumn { column, table } => {
                write!(f, "preload: missing col {} in table {}", column, table)
            }
            PreloadError::UnknownTable(table) => write!(f, "preload: unknown table {}", table),
            PreloadError::CompositeKey { table } => write!(
                f,
                "preload: table {} needs a single-column primary key to be linked",
                table
            ),
        }
    }
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.sql {
            Some(sql) => write!(f, "query error: {} (sql: {})", self.message, sql),
            None => write!(f, "query error: {}", self.message),
        }
    }
}

impl StdError for Error {}
impl StdError for PreloadError {}
impl StdError for QueryError {}

impl From<PreloadError> for Error {
    fn from(err: PreloadError) -> Self {
        Error::Preload(err)
    }
}

impl From<QueryError> for Error {
    fn from(err: QueryError) -> Self {
        Error::Query(err)
    }
}

/// Result type alias for rowmap operations.
pub type Result<T> = std::result::Result<T, Error>;
