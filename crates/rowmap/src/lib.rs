//! rowmap: dialect-aware SQL synthesis with batched association preloading.
//!
//! This crate re-exports the pieces most applications need:
//!
//! - [`rowmap_core`]: values, records, conditions, table metadata, errors
//! - [`rowmap_query`]: dialects, quoting and the [`Statement`] builder
//! - [`rowmap_session`]: [`Engine`], [`Session`], upserts and preloading
//! - `rowmap_sqlite` (feature `sqlite`, on by default): an embedded driver
//!
//! # Example
//!
//! ```ignore
//! use rowmap::prelude::*;
//!
//! let catalog = Catalog::new().register(
//!     TableInfo::new("employee")
//!         .column(ColumnInfo::new("id").primary_key(true).auto_increment(true))
//!         .column(ColumnInfo::new("name"))
//!         .column(ColumnInfo::new("manager_id").nullable(true))
//!         .association(Association::belongs_to("Manager", "employee", "employee", "manager_id"))
//!         .association(Association::has_many("Subordinates", "employee", "employee", "manager_id")),
//! );
//! let engine = Engine::new(Dialect::sqlite(), catalog);
//! let mut session = engine.session(SqliteDriver::open_in_memory()?);
//!
//! // Three queries, however many employees match.
//! let employees = session
//!     .table("employee")
//!     .preload(Preload::new("Manager.Subordinates").cols(&["name"]))
//!     .find()?;
//! ```

pub use rowmap_core::{
    Association, AssociationKind, AssociationLink, Catalog, ColumnInfo, ColumnRole, CompareOp, Cond,
    Driver, Error, ExecResult, IndexInfo, JoinTableInfo, Model, PreloadError, QueryError, Record,
    RecordKey, RecordSet, Relation, Result, Row, TableInfo, Value, Writer,
};
pub use rowmap_query::{
    DbType, DeleteSql, Dialect, Features, IndexHint, JoinOn, JoinTarget, Pagination, QuotePolicy,
    Quoter, Statement, UniqueColumns, UpsertFamily,
};
pub use rowmap_session::{
    Engine, EngineConfig, JoinMap, LoadEvent, N1QueryTracker, N1Stats, Preload, PreloadTree,
    Session, SessionConfig, TimeZone, ValidatedPreloadTree,
};

#[cfg(feature = "sqlite")]
pub use rowmap_sqlite::SqliteDriver;

pub use rowmap_core as core;
pub use rowmap_query as query;
pub use rowmap_session as session;

/// Everything needed to declare tables, build statements and run sessions.
pub mod prelude {
    pub use crate::{
        Association, Catalog, ColumnInfo, Cond, DbType, Dialect, Driver, Engine, EngineConfig,
        Error, IndexInfo, JoinTableInfo, Model, Preload, Record, Result, Row, Session,
        SessionConfig, Statement, TableInfo, Value,
    };

    #[cfg(feature = "sqlite")]
    pub use crate::SqliteDriver;
}
