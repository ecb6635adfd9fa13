//! Schema catalog: table, column, index and association metadata.
//!
//! Table descriptions are built once at startup and registered in a
//! [`Catalog`], which is then shared read-only (typically behind an `Arc`) by
//! every session.
//!
//! # Example
//!
//! ```ignore
//! let employee = TableInfo::new("employee")
//!     .column(ColumnInfo::new("id").primary_key(true).auto_increment(true))
//!     .column(ColumnInfo::new("name"))
//!     .column(ColumnInfo::new("manager_id").nullable(true))
//!     .association(Association::belongs_to("Manager", "employee", "employee", "manager_id"))
//!     .association(Association::has_many("Subordinates", "employee", "employee", "manager_id"));
//!
//! let catalog = Catalog::new().register(employee);
//! ```

use crate::association::Association;
use crate::value::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Special meaning attached to a column.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ColumnRole {
    #[default]
    Data,
    /// Soft-delete timestamp; NULL while the row is live.
    Deleted,
    /// Filled with the current time on insert.
    Created,
    /// Filled with the current time on insert and update.
    Updated,
}

/// Metadata about one column.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnInfo {
    /// Database column name
    pub name: &'static str,
    /// Whether the column accepts NULL
    pub nullable: bool,
    /// Whether the column is (part of) the primary key
    pub primary_key: bool,
    /// Whether the database generates the value
    pub auto_increment: bool,
    /// Default value as an SQL literal (`'x'`, `0`, ...)
    pub default: Option<&'static str>,
    pub role: ColumnRole,
}

impl ColumnInfo {
    #[must_use]
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            nullable: false,
            primary_key: false,
            auto_increment: false,
            default: None,
            role: ColumnRole::Data,
        }
    }

    #[must_use]
    pub const fn nullable(mut self, value: bool) -> Self {
        self.nullable = value;
        self
    }

    #[must_use]
    pub const fn primary_key(mut self, value: bool) -> Self {
        self.primary_key = value;
        self
    }

    #[must_use]
    pub const fn auto_increment(mut self, value: bool) -> Self {
        self.auto_increment = value;
        self
    }

    #[must_use]
    pub const fn default(mut self, literal: &'static str) -> Self {
        self.default = Some(literal);
        self
    }

    #[must_use]
    pub const fn role(mut self, role: ColumnRole) -> Self {
        self.role = role;
        self
    }

    /// Shorthand for a nullable soft-delete column.
    #[must_use]
    pub const fn deleted(self) -> Self {
        self.nullable(true).role(ColumnRole::Deleted)
    }

    /// The default literal as a bindable value.
    ///
    /// `'abc'` becomes text, integers and floats become numbers, anything
    /// else is passed through as text.
    pub fn default_value(&self) -> Option<Value> {
        let raw = self.default?.trim();
        if raw.len() >= 2 && raw.starts_with('\'') && raw.ends_with('\'') {
            return Some(Value::Text(raw[1..raw.len() - 1].replace("''", "'")));
        }
        if raw.eq_ignore_ascii_case("null") {
            return Some(Value::Null);
        }
        if let Ok(i) = raw.parse::<i64>() {
            return Some(Value::BigInt(i));
        }
        if let Ok(f) = raw.parse::<f64>() {
            return Some(Value::Double(f));
        }
        Some(Value::Text(raw.to_string()))
    }
}

/// Metadata about an index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexInfo {
    pub name: &'static str,
    pub unique: bool,
    pub columns: Vec<&'static str>,
}

impl IndexInfo {
    pub fn unique(name: &'static str, columns: &[&'static str]) -> Self {
        Self {
            name,
            unique: true,
            columns: columns.to_vec(),
        }
    }

    pub fn regular(name: &'static str, columns: &[&'static str]) -> Self {
        Self {
            name,
            unique: false,
            columns: columns.to_vec(),
        }
    }
}

/// Metadata about one table: columns in declaration order, indexes and
/// relation-valued fields.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TableInfo {
    pub name: &'static str,
    pub columns: Vec<ColumnInfo>,
    pub indexes: Vec<IndexInfo>,
    pub associations: Vec<Association>,
}

impl TableInfo {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn column(mut self, column: ColumnInfo) -> Self {
        self.columns.push(column);
        self
    }

    #[must_use]
    pub fn index(mut self, index: IndexInfo) -> Self {
        self.indexes.push(index);
        self
    }

    #[must_use]
    pub fn association(mut self, association: Association) -> Self {
        self.associations.push(association);
        self
    }

    pub fn get_column(&self, name: &str) -> Option<&ColumnInfo> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn get_association(&self, field: &str) -> Option<&Association> {
        self.associations.iter().find(|a| a.name == field)
    }

    /// Whether `name` is a column or a relation-valued field.
    pub fn has_field(&self, name: &str) -> bool {
        self.get_column(name).is_some() || self.get_association(name).is_some()
    }

    pub fn column_names(&self) -> Vec<&'static str> {
        self.columns.iter().map(|c| c.name).collect()
    }

    pub fn primary_keys(&self) -> Vec<&'static str> {
        self.columns
            .iter()
            .filter(|c| c.primary_key)
            .map(|c| c.name)
            .collect()
    }

    pub fn auto_increment(&self) -> Option<&'static str> {
        self.columns.iter().find(|c| c.auto_increment).map(|c| c.name)
    }

    fn column_with_role(&self, role: ColumnRole) -> Option<&ColumnInfo> {
        self.columns.iter().find(|c| c.role == role)
    }

    pub fn deleted_column(&self) -> Option<&ColumnInfo> {
        self.column_with_role(ColumnRole::Deleted)
    }

    pub fn created_column(&self) -> Option<&ColumnInfo> {
        self.column_with_role(ColumnRole::Created)
    }

    pub fn updated_column(&self) -> Option<&ColumnInfo> {
        self.column_with_role(ColumnRole::Updated)
    }

    pub fn unique_indexes(&self) -> impl Iterator<Item = &IndexInfo> {
        self.indexes.iter().filter(|i| i.unique)
    }
}

/// Registry of table metadata keyed by table name.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    tables: HashMap<&'static str, Arc<TableInfo>>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a table, replacing any previous table of the same name.
    #[must_use]
    pub fn register(mut self, table: TableInfo) -> Self {
        self.insert(table);
        self
    }

    pub fn insert(&mut self, table: TableInfo) {
        self.tables.insert(table.name, Arc::new(table));
    }

    pub fn table(&self, name: &str) -> Option<Arc<TableInfo>> {
        self.tables.get(name).cloned()
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}
