//! Core types and traits for rowmap.
//!
//! `rowmap-core` is the **foundation layer**. It defines the contracts the
//! statement builder, the session and the drivers share.
//!
//! # Role In The Architecture
//!
//! - **Contract layer**: `Driver` is implemented by database drivers, `Model`
//!   by typed records.
//! - **Data model**: `Value`, `Row`, `Record`, `RecordKey` and `RecordSet`
//!   carry arguments, results and loaded object graphs.
//! - **Schema catalog**: `TableInfo`, `ColumnInfo`, `IndexInfo` and
//!   `Association` describe tables; `Catalog` registers them.
//! - **Conditions**: `Cond` renders WHERE fragments into a `Writer`.
//!
//! Most applications should use the `rowmap` facade; reach for `rowmap-core`
//! directly when writing drivers.

pub mod association;
pub mod cond;
pub mod connection;
pub mod error;
pub mod model;
pub mod record;
pub mod row;
pub mod schema;
pub mod value;
pub mod writer;

pub use association::{Association, AssociationKind, AssociationLink, JoinTableInfo};
pub use cond::{CompareOp, Cond};
pub use connection::{Driver, ExecResult};
pub use error::{Error, PreloadError, QueryError, Result};
pub use model::Model;
pub use record::{Record, RecordKey, RecordSet, Relation};
pub use row::Row;
pub use schema::{Catalog, ColumnInfo, ColumnRole, IndexInfo, TableInfo};
pub use value::Value;
pub use writer::Writer;
