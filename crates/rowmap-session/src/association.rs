//! Batch conditions and in-memory linking for associations.
//!
//! [`get_cond`] builds the single predicate that fetches the referenced
//! records of a whole owner batch. [`link`] attaches fetched records to
//! their owners. Both work on [`RecordSet`]s keyed by primary key.
//!
//! Linking also maintains an optional prune set: every owner key that
//! received at least one record is removed from it, so whatever remains
//! afterwards names owners with no match.

use rowmap_core::{
    Association, AssociationLink, Cond, Error, PreloadError, Record, RecordKey, RecordSet, Relation,
    Result, TableInfo, Value,
};
use std::collections::{HashMap, HashSet};

/// Referenced key to the owner keys paired with it through a join table.
#[derive(Debug, Clone, Default)]
pub struct JoinMap {
    owners: HashMap<RecordKey, Vec<RecordKey>>,
    /// Referenced values in order of first appearance.
    ref_values: Vec<Value>,
}

impl JoinMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one join-table row.
    pub fn insert(&mut self, ref_value: Value, owner_value: Value) {
        let ref_key = RecordKey::single(ref_value.clone());
        let entry = self.owners.entry(ref_key).or_insert_with(|| {
            self.ref_values.push(ref_value);
            Vec::new()
        });
        entry.push(RecordKey::single(owner_value));
    }

    /// Owners paired with `ref_key`.
    pub fn owners_of(&self, ref_key: &RecordKey) -> &[RecordKey] {
        self.owners.get(ref_key).map_or(&[], Vec::as_slice)
    }

    /// Distinct referenced values.
    pub fn ref_values(&self) -> &[Value] {
        &self.ref_values
    }

    pub fn len(&self) -> usize {
        self.owners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.owners.is_empty()
    }
}

/// The single primary key column linking requires.
pub fn single_primary_key(table: &TableInfo) -> Result<&'static str> {
    match table.primary_keys().as_slice() {
        [pk] => Ok(*pk),
        _ => Err(Error::Preload(PreloadError::CompositeKey {
            table: table.name.to_string(),
        })),
    }
}

/// A column reference in generic quoting.
pub(crate) fn generic(column: &str) -> String {
    format!("`{column}`")
}

/// The predicate selecting every record referenced by `owners`.
///
/// - belongs-to: the referenced primary key IN the owners' distinct
///   non-NULL foreign keys;
/// - has-one/has-many: the referenced foreign key IN the owner keys;
/// - many-to-many: the join table's owner column IN the owner keys. The
///   caller runs this against the join table and then fetches the
///   referenced rows with [`JoinMap::ref_values`].
pub fn get_cond(association: &Association, owners: &RecordSet, ref_table: &TableInfo) -> Result<Cond> {
    let owner_keys = || owners.keys().into_iter().filter_map(|k| k.first().cloned());

    let cond = match association.link {
        AssociationLink::BelongsTo { source_col } => Cond::in_list(
            generic(single_primary_key(ref_table)?),
            owners.distinct_values(source_col),
        ),
        AssociationLink::HasOne { target_col } | AssociationLink::HasMany { target_col } => {
            Cond::in_list(generic(target_col), owner_keys())
        }
        AssociationLink::ManyToMany(join) => Cond::in_list(generic(join.source_column), owner_keys()),
    };
    Ok(cond)
}

/// Attach `refs` to their owners. Returns the number of links made.
///
/// Single-valued associations are set, list associations appended to.
/// Owner keys that received a record are removed from `prune`.
pub fn link(
    association: &Association,
    owners: &mut RecordSet,
    refs: &RecordSet,
    mut prune: Option<&mut HashSet<RecordKey>>,
    join_map: Option<&JoinMap>,
) -> usize {
    let name = association.name;
    let mut linked = 0;
    let mut keep = |key: &RecordKey| {
        if let Some(prune) = prune.as_deref_mut() {
            prune.remove(key);
        }
    };

    match association.link {
        AssociationLink::BelongsTo { source_col } => {
            let key_columns = owners.key_columns().to_vec();
            let key_columns: Vec<&str> = key_columns.iter().map(String::as_str).collect();
            for owner in owners.records_mut() {
                let Some(fk) = owner.get(source_col).filter(|v| !v.is_null()) else {
                    continue;
                };
                let Some(referenced) = refs.get(&RecordKey::single(fk.clone())) else {
                    continue;
                };
                owner.set_relation(name, Relation::One(Box::new(referenced.clone())));
                linked += 1;
                if let Some(key) = owner.key(&key_columns) {
                    keep(&key);
                }
            }
        }
        AssociationLink::HasOne { target_col } | AssociationLink::HasMany { target_col } => {
            let is_list = association.is_list();
            for referenced in refs.records() {
                let Some(fk) = referenced.get(target_col).filter(|v| !v.is_null()) else {
                    continue;
                };
                let key = RecordKey::single(fk.clone());
                let n = owners.update_each(&key, |owner| attach(owner, name, is_list, referenced));
                if n > 0 {
                    linked += n;
                    keep(&key);
                }
            }
        }
        AssociationLink::ManyToMany(_) => {
            let Some(join_map) = join_map else {
                return 0;
            };
            let ref_columns = refs.key_columns().to_vec();
            let ref_columns: Vec<&str> = ref_columns.iter().map(String::as_str).collect();
            for referenced in refs.records() {
                let Some(ref_key) = referenced.key(&ref_columns) else {
                    continue;
                };
                for owner_key in join_map.owners_of(&ref_key) {
                    let n = owners.update_each(owner_key, |owner| {
                        owner.push_related(name, referenced.clone());
                    });
                    if n > 0 {
                        linked += n;
                        keep(owner_key);
                    }
                }
            }
        }
    }
    linked
}

fn attach(owner: &mut Record, name: &str, is_list: bool, referenced: &Record) {
    if is_list {
        owner.push_related(name, referenced.clone());
    } else {
        owner.set_relation(name, Relation::One(Box::new(referenced.clone())));
    }
}
