//! Dialect-aware SQL statement synthesis for rowmap.
//!
//! `rowmap-query` turns accumulated query state into SQL text plus ordered
//! positional arguments, hiding per-engine differences:
//!
//! - identifier quoting ([`Quoter`]),
//! - pagination (`LIMIT/OFFSET`, `TOP` with a `NOT IN` exclusion, `ROWNUM`
//!   wrapping),
//! - soft-delete rewriting of DELETE into UPDATE,
//! - upsert strategy (`ON CONFLICT`, `ON DUPLICATE KEY`, synthesized `MERGE`).
//!
//! Generated SQL always uses `?` placeholders; [`Dialect::filter_sql`]
//! rewrites them to the engine's native form right before execution.
//!
//! # Example
//!
//! ```ignore
//! use rowmap_query::{Dialect, Statement};
//!
//! let dialect = Arc::new(Dialect::sqlite());
//! let out = Statement::new(dialect)
//!     .ref_table(catalog.table("note").unwrap())
//!     .filter(Cond::eq("`id`", 3i64))
//!     .gen_delete_sql(now)?;
//! // UPDATE `note` SET `deleted_at` = ? WHERE `id`=? AND `deleted_at` IS NULL
//! println!("{}", out.sql);
//! ```

pub mod delete;
pub mod dialect;
pub mod filter;
pub mod index_hint;
pub mod insert;
pub mod join;
pub mod order_by;
pub mod quote;
pub mod select;
pub mod statement;
pub mod update;
pub mod upsert;

pub use delete::DeleteSql;
pub use dialect::{DbType, Dialect, Features, Pagination, QuotePolicy, UpsertFamily};
pub use index_hint::IndexHint;
pub use join::{JoinOn, JoinTarget};
pub use quote::{Quoter, always_no_reserve, always_reserve};
pub use statement::Statement;
pub use upsert::{UniqueColumns, resolve_unique_columns};
