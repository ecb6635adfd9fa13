//! The `Model` trait: conversion between typed structs and records.

use crate::error::Result;
use crate::record::Record;

/// A typed record mapped to one table.
///
/// Implementations convert to and from the untyped [`Record`] form used by
/// statement synthesis and preloading. Relation-valued fields read their
/// loaded records through [`Record::one`] and [`Record::many`].
///
/// # Example
///
/// ```ignore
/// struct Employee {
///     id: i64,
///     name: String,
///     manager_id: Option<i64>,
///     subordinates: Vec<Employee>,
/// }
///
/// impl Model for Employee {
///     const TABLE_NAME: &'static str = "employee";
///
///     fn to_record(&self) -> Record {
///         Record::new(Self::TABLE_NAME)
///             .with("id", self.id)
///             .with("name", self.name.as_str())
///             .with("manager_id", self.manager_id)
///     }
///
///     fn from_record(record: &Record) -> Result<Self> {
///         Ok(Self {
///             id: record.get_i64("id")?,
///             name: record.get_string("name")?,
///             manager_id: record.get_opt_i64("manager_id")?,
///             subordinates: record
///                 .many("Subordinates")
///                 .iter()
///                 .map(Employee::from_record)
///                 .collect::<Result<_>>()?,
///         })
///     }
/// }
/// ```
pub trait Model: Sized {
    /// The table this type is stored in.
    const TABLE_NAME: &'static str;

    /// Convert to a record, omitting columns the database should generate.
    fn to_record(&self) -> Record;

    /// Build from a fetched record, including any loaded relations.
    fn from_record(record: &Record) -> Result<Self>;
}
