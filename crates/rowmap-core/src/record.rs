//! Untyped records, record keys and keyed record sets.
//!
//! A [`Record`] is the runtime shape every typed model is converted to and
//! from: an ordered list of column values plus named relation slots filled by
//! the preload resolver. A [`RecordSet`] indexes records by an opaque
//! [`RecordKey`], which is how owner and referenced records are matched when
//! associations are linked.

use crate::error::{Error, Result};
use crate::row::Row;
use crate::value::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::hash::{Hash, Hasher};

// ============================================================================
// Record Key
// ============================================================================

/// An opaque, comparable key made of one or more column values.
///
/// Integer widths are normalized, so `Int(1)` and `BigInt(1)` are the same
/// key. This matters when a foreign key and the primary key it points at
/// come back from the driver with different integer types.
#[derive(Debug, Clone)]
pub struct RecordKey(Vec<Value>);

impl RecordKey {
    pub fn new(values: Vec<Value>) -> Self {
        Self(values)
    }

    pub fn single(value: Value) -> Self {
        Self(vec![value])
    }

    pub fn values(&self) -> &[Value] {
        &self.0
    }

    /// First component; the whole key for single-column keys.
    pub fn first(&self) -> Option<&Value> {
        self.0.first()
    }

    pub fn has_null(&self) -> bool {
        self.0.iter().any(Value::is_null)
    }
}

impl PartialEq for RecordKey {
    fn eq(&self, other: &Self) -> bool {
        self.0.len() == other.0.len()
            && self
                .0
                .iter()
                .zip(other.0.iter())
                .all(|(a, b)| key_value_eq(a, b))
    }
}

impl Eq for RecordKey {}

impl Hash for RecordKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.len().hash(state);
        for v in &self.0 {
            hash_value(v, state);
        }
    }
}

fn key_value_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Int(_) | Value::BigInt(_), Value::Int(_) | Value::BigInt(_)) => {
            a.as_i64() == b.as_i64()
        }
        (Value::Double(x), Value::Double(y)) => x.to_bits() == y.to_bits(),
        _ => a == b,
    }
}

/// Hash a single value, tagging by normalized variant.
fn hash_value(v: &Value, hasher: &mut impl Hasher) {
    match v {
        Value::Null => 0u8.hash(hasher),
        Value::Bool(b) => {
            1u8.hash(hasher);
            b.hash(hasher);
        }
        Value::Int(i) => {
            2u8.hash(hasher);
            i64::from(*i).hash(hasher);
        }
        Value::BigInt(i) => {
            2u8.hash(hasher);
            i.hash(hasher);
        }
        Value::Double(f) => {
            3u8.hash(hasher);
            f.to_bits().hash(hasher);
        }
        Value::Text(s) => {
            4u8.hash(hasher);
            s.hash(hasher);
        }
        Value::Bytes(b) => {
            5u8.hash(hasher);
            b.hash(hasher);
        }
        Value::Timestamp(ts) => {
            6u8.hash(hasher);
            ts.hash(hasher);
        }
    }
}

// ============================================================================
// Record
// ============================================================================

/// A relation slot on a record.
#[derive(Debug, Clone, PartialEq)]
pub enum Relation {
    /// belongs-to / has-one
    One(Box<Record>),
    /// has-many / many-to-many
    Many(Vec<Record>),
}

/// One row of a table, with its loaded relations.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Record {
    table: String,
    fields: Vec<(String, Value)>,
    relations: BTreeMap<String, Relation>,
}

impl Record {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            fields: Vec::new(),
            relations: BTreeMap::new(),
        }
    }

    /// Build a record from a driver row.
    pub fn from_row(table: impl Into<String>, row: &Row) -> Self {
        let mut record = Self::new(table);
        for (name, value) in row.iter() {
            record.fields.push((name.to_string(), value.clone()));
        }
        record
    }

    /// Builder form of [`Record::set`].
    #[must_use]
    pub fn with(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(column, value);
        self
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Set a column value, replacing an existing one in place.
    pub fn set(&mut self, column: impl Into<String>, value: impl Into<Value>) {
        let column = column.into();
        let value = value.into();
        match self.fields.iter_mut().find(|(c, _)| *c == column) {
            Some((_, slot)) => *slot = value,
            None => self.fields.push((column, value)),
        }
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|(c, _)| c == column)
            .map(|(_, v)| v)
    }

    pub fn contains(&self, column: &str) -> bool {
        self.fields.iter().any(|(c, _)| c == column)
    }

    pub fn remove(&mut self, column: &str) -> Option<Value> {
        let pos = self.fields.iter().position(|(c, _)| c == column)?;
        Some(self.fields.remove(pos).1)
    }

    /// Column values in insertion order.
    pub fn fields(&self) -> &[(String, Value)] {
        &self.fields
    }

    /// Key made from the given columns; `None` if any is missing or NULL.
    pub fn key(&self, columns: &[&str]) -> Option<RecordKey> {
        let mut values = Vec::with_capacity(columns.len());
        for col in columns {
            match self.get(col) {
                Some(v) if !v.is_null() => values.push(v.clone()),
                _ => return None,
            }
        }
        Some(RecordKey::new(values))
    }

    pub fn relation(&self, name: &str) -> Option<&Relation> {
        self.relations.get(name)
    }

    pub fn relations(&self) -> &BTreeMap<String, Relation> {
        &self.relations
    }

    pub fn set_relation(&mut self, name: impl Into<String>, relation: Relation) {
        self.relations.insert(name.into(), relation);
    }

    /// Append to a list relation, creating it on first use.
    pub fn push_related(&mut self, name: &str, record: Record) {
        match self.relations.get_mut(name) {
            Some(Relation::Many(list)) => list.push(record),
            _ => {
                self.relations
                    .insert(name.to_string(), Relation::Many(vec![record]));
            }
        }
    }

    /// The single related record, if loaded.
    pub fn one(&self, name: &str) -> Option<&Record> {
        match self.relations.get(name) {
            Some(Relation::One(r)) => Some(r),
            _ => None,
        }
    }

    /// The related list; empty when nothing was linked.
    pub fn many(&self, name: &str) -> &[Record] {
        match self.relations.get(name) {
            Some(Relation::Many(list)) => list,
            _ => &[],
        }
    }

    // ------------------------------------------------------------------------
    // Typed accessors used by `Model::from_record`
    // ------------------------------------------------------------------------

    pub fn get_i64(&self, column: &str) -> Result<i64> {
        self.get_opt_i64(column)?
            .ok_or_else(|| Error::Conversion(format!("{}.{} is NULL", self.table, column)))
    }

    pub fn get_opt_i64(&self, column: &str) -> Result<Option<i64>> {
        match self.get(column) {
            None | Some(Value::Null) => Ok(None),
            Some(v) => v.as_i64().map(Some).ok_or_else(|| {
                Error::Conversion(format!(
                    "{}.{}: expected integer, found {}",
                    self.table,
                    column,
                    v.type_name()
                ))
            }),
        }
    }

    pub fn get_string(&self, column: &str) -> Result<String> {
        self.get_opt_string(column)?
            .ok_or_else(|| Error::Conversion(format!("{}.{} is NULL", self.table, column)))
    }

    pub fn get_opt_string(&self, column: &str) -> Result<Option<String>> {
        match self.get(column) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Text(s)) => Ok(Some(s.clone())),
            Some(v) => Err(Error::Conversion(format!(
                "{}.{}: expected text, found {}",
                self.table,
                column,
                v.type_name()
            ))),
        }
    }

    /// Render the record and its relations as a JSON object.
    pub fn to_json(&self) -> serde_json::Value {
        let mut map = serde_json::Map::new();
        for (column, value) in &self.fields {
            map.insert(
                column.clone(),
                serde_json::to_value(value).unwrap_or(serde_json::Value::Null),
            );
        }
        for (name, relation) in &self.relations {
            let rendered = match relation {
                Relation::One(r) => r.to_json(),
                Relation::Many(list) => {
                    serde_json::Value::Array(list.iter().map(Record::to_json).collect())
                }
            };
            map.insert(name.clone(), rendered);
        }
        serde_json::Value::Object(map)
    }
}

// ============================================================================
// Record Set
// ============================================================================

/// Records indexed by a key made from `key_columns`.
///
/// Records whose key cannot be formed (missing or NULL key column) are kept
/// but are not reachable through the index.
#[derive(Debug, Clone, Default)]
pub struct RecordSet {
    key_columns: Vec<String>,
    records: Vec<Record>,
    index: HashMap<RecordKey, Vec<usize>>,
}

impl RecordSet {
    pub fn new(key_columns: Vec<String>) -> Self {
        Self {
            key_columns,
            records: Vec::new(),
            index: HashMap::new(),
        }
    }

    pub fn from_records(key_columns: Vec<String>, records: Vec<Record>) -> Self {
        let mut set = Self::new(key_columns);
        for record in records {
            set.push(record);
        }
        set
    }

    pub fn push(&mut self, record: Record) {
        let cols: Vec<&str> = self.key_columns.iter().map(String::as_str).collect();
        if let Some(key) = record.key(&cols) {
            self.index.entry(key).or_default().push(self.records.len());
        }
        self.records.push(record);
    }

    pub fn key_columns(&self) -> &[String] {
        &self.key_columns
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn records_mut(&mut self) -> &mut [Record] {
        &mut self.records
    }

    pub fn into_records(self) -> Vec<Record> {
        self.records
    }

    pub fn contains_key(&self, key: &RecordKey) -> bool {
        self.index.contains_key(key)
    }

    /// Distinct keys in order of first appearance.
    pub fn keys(&self) -> Vec<RecordKey> {
        let cols: Vec<&str> = self.key_columns.iter().map(String::as_str).collect();
        let mut seen = HashSet::new();
        self.records
            .iter()
            .filter_map(|r| r.key(&cols))
            .filter(|k| seen.insert(k.clone()))
            .collect()
    }

    /// First record stored under `key`.
    pub fn get(&self, key: &RecordKey) -> Option<&Record> {
        self.index
            .get(key)
            .and_then(|idx| idx.first())
            .and_then(|&i| self.records.get(i))
    }

    /// Apply `f` to every record stored under `key`; returns how many matched.
    pub fn update_each(&mut self, key: &RecordKey, mut f: impl FnMut(&mut Record)) -> usize {
        let Some(indexes) = self.index.get(key) else {
            return 0;
        };
        let mut n = 0;
        for &i in indexes {
            if let Some(record) = self.records.get_mut(i) {
                f(record);
                n += 1;
            }
        }
        n
    }

    /// Distinct non-NULL values of `column`, in order of first appearance.
    pub fn distinct_values(&self, column: &str) -> Vec<Value> {
        let mut seen = HashSet::new();
        self.records
            .iter()
            .filter_map(|r| r.get(column))
            .filter(|v| !v.is_null())
            .filter(|v| seen.insert(RecordKey::single((*v).clone())))
            .cloned()
            .collect()
    }

    /// Drop every record whose key is in `keys`.
    pub fn remove_keys(&mut self, keys: &HashSet<RecordKey>) {
        if keys.is_empty() {
            return;
        }
        let cols: Vec<String> = self.key_columns.clone();
        let records = std::mem::take(&mut self.records);
        self.index.clear();
        let col_refs: Vec<&str> = cols.iter().map(String::as_str).collect();
        for record in records {
            let drop = record.key(&col_refs).is_some_and(|k| keys.contains(&k));
            if !drop {
                self.push(record);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_key_normalizes_integer_width() {
        use std::collections::hash_map::DefaultHasher;

        let a = RecordKey::single(Value::Int(7));
        let b = RecordKey::single(Value::BigInt(7));
        assert_eq!(a, b);

        let mut ha = DefaultHasher::new();
        let mut hb = DefaultHasher::new();
        a.hash(&mut ha);
        b.hash(&mut hb);
        assert_eq!(ha.finish(), hb.finish());
    }

    #[test]
    fn test_record_key_composite() {
        let a = RecordKey::new(vec![Value::BigInt(1), Value::from("x")]);
        let b = RecordKey::new(vec![Value::BigInt(1), Value::from("y")]);
        assert_ne!(a, b);
        assert_ne!(a, RecordKey::single(Value::BigInt(1)));
    }

    #[test]
    fn test_record_set_and_replace() {
        let mut r = Record::new("employee").with("id", 1i64).with("name", "John");
        r.set("name", "Bob");
        assert_eq!(r.get("name"), Some(&Value::from("Bob")));
        assert_eq!(r.fields().len(), 2);
    }

    #[test]
    fn test_record_key_rejects_null() {
        let r = Record::new("employee").with("id", 1i64).with("buddy_id", Value::Null);
        assert!(r.key(&["id"]).is_some());
        assert!(r.key(&["buddy_id"]).is_none());
        assert!(r.key(&["missing"]).is_none());
    }

    #[test]
    fn test_push_related_accumulates() {
        let mut r = Record::new("employee").with("id", 1i64);
        r.push_related("Subordinates", Record::new("employee").with("id", 3i64));
        r.push_related("Subordinates", Record::new("employee").with("id", 5i64));
        assert_eq!(r.many("Subordinates").len(), 2);
        assert!(r.one("Subordinates").is_none());
        assert!(r.many("Other").is_empty());
    }

    #[test]
    fn test_record_set_index_and_remove() {
        let mut set = RecordSet::from_records(
            vec!["id".into()],
            vec![
                Record::new("t").with("id", 1i64),
                Record::new("t").with("id", 2i64),
                Record::new("t").with("id", 2i64),
                Record::new("t").with("id", Value::Null),
            ],
        );
        assert_eq!(set.len(), 4);
        assert_eq!(set.keys().len(), 2);
        let n = set.update_each(&RecordKey::single(Value::Int(2)), |r| r.set("seen", true));
        assert_eq!(n, 2);

        let mut drop = HashSet::new();
        drop.insert(RecordKey::single(Value::BigInt(2)));
        set.remove_keys(&drop);
        assert_eq!(set.len(), 2);
        assert!(set.get(&RecordKey::single(Value::BigInt(1))).is_some());
        assert!(!set.contains_key(&RecordKey::single(Value::BigInt(2))));
    }

    #[test]
    fn test_distinct_values_skip_null() {
        let set = RecordSet::from_records(
            vec!["id".into()],
            vec![
                Record::new("t").with("id", 1i64).with("manager_id", 1i64),
                Record::new("t").with("id", 2i64).with("manager_id", Value::Null),
                Record::new("t").with("id", 3i64).with("manager_id", 1i64),
                Record::new("t").with("id", 4i64).with("manager_id", 2i64),
            ],
        );
        assert_eq!(
            set.distinct_values("manager_id"),
            vec![Value::BigInt(1), Value::BigInt(2)]
        );
    }

    #[test]
    fn test_to_json_nests_relations() {
        let mut r = Record::new("employee").with("id", 3i64);
        r.set_relation(
            "Manager",
            Relation::One(Box::new(Record::new("employee").with("id", 1i64))),
        );
        let json = r.to_json();
        assert_eq!(json["id"], serde_json::json!(3));
        assert_eq!(json["Manager"]["id"], serde_json::json!(1));
    }

    #[test]
    fn test_typed_accessors() {
        let r = Record::new("employee")
            .with("id", 1i64)
            .with("name", "John")
            .with("buddy_id", Value::Null);
        assert_eq!(r.get_i64("id").unwrap(), 1);
        assert_eq!(r.get_string("name").unwrap(), "John");
        assert_eq!(r.get_opt_i64("buddy_id").unwrap(), None);
        assert!(matches!(r.get_i64("name"), Err(Error::Conversion(_))));
    }
}
