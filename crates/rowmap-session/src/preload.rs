//! Association preloading.
//!
//! A [`Preload`] names a dotted association path (`"Manager.Subordinates"`)
//! with an optional column restriction and condition. The preloads of one
//! query are merged into a [`PreloadTree`], which goes through three stages:
//!
//! 1. **built**: paths are added, a path registered twice is an error;
//! 2. **validated**: every segment must name an association declared on
//!    its table, restricted columns must exist, and the auxiliary columns
//!    needed for linking are collected;
//! 3. **computed**: parent before children, each node issues one query
//!    covering every owner at its level, links the results, then hands the
//!    fetched records to its children as their owners.
//!
//! The first error aborts the whole preload.
//!
//! # Pruning
//!
//! A fetched record whose child associations all came back empty is dropped
//! before it is linked to its owner, so a loaded path means the whole chain
//! matched. Pruning is skipped when the node restricts its columns or is
//! marked [`Preload::no_prune`].

use crate::association::{JoinMap, generic, get_cond, link, single_primary_key};
use crate::n1_detection::LoadEvent;
use crate::Session;
use rowmap_core::{
    Association, Catalog, Cond, Driver, Error, PreloadError, Record, RecordKey, RecordSet, Result,
    TableInfo,
};
use rowmap_query::Statement;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

// ============================================================================
// Preload
// ============================================================================

/// One association path to load eagerly.
#[derive(Debug, Clone, PartialEq)]
pub struct Preload {
    path: Vec<String>,
    cols: Vec<String>,
    cond: Cond,
    no_prune: bool,
}

impl Preload {
    /// Preload the `.`-separated association path.
    pub fn new(path: &str) -> Self {
        Self {
            path: path.split('.').map(str::to_string).collect(),
            cols: Vec::new(),
            cond: Cond::Empty,
            no_prune: false,
        }
    }

    /// Load only these columns of the last association on the path.
    #[must_use]
    pub fn cols<S: AsRef<str>>(mut self, cols: &[S]) -> Self {
        self.cols.extend(cols.iter().map(|c| c.as_ref().to_string()));
        self
    }

    /// Restrict the referenced records; ANDed onto the batch condition.
    #[must_use]
    pub fn filter(mut self, cond: Cond) -> Self {
        self.cond = std::mem::take(&mut self.cond).and(cond);
        self
    }

    /// Keep fetched records even when their child associations are empty.
    #[must_use]
    pub fn no_prune(mut self) -> Self {
        self.no_prune = true;
        self
    }

    pub fn path(&self) -> &[String] {
        &self.path
    }

    pub fn columns(&self) -> &[String] {
        &self.cols
    }

    fn is_restricted(&self) -> bool {
        !self.cols.is_empty()
    }
}

// ============================================================================
// Preload Tree
// ============================================================================

#[derive(Debug, Default)]
struct PreloadNode {
    preload: Option<Preload>,
    children: BTreeMap<String, PreloadNode>,
    association: Option<Association>,
    ref_table: Option<Arc<TableInfo>>,
    /// Columns linking needs, selected even under a column restriction.
    extra_cols: Vec<&'static str>,
}

/// The merged preload paths of one query, before validation.
#[derive(Debug, Default)]
pub struct PreloadTree {
    root: PreloadNode,
}

/// A preload tree resolved against the catalog, ready to compute.
#[derive(Debug)]
pub struct ValidatedPreloadTree {
    root: PreloadNode,
    root_table: Arc<TableInfo>,
}

impl PreloadTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a tree from several preloads.
    pub fn from_preloads(preloads: impl IntoIterator<Item = Preload>) -> Result<Self> {
        let mut tree = Self::new();
        for preload in preloads {
            tree.add(preload)?;
        }
        Ok(tree)
    }

    /// Register a path. Intermediate segments may be shared between paths,
    /// but each full path can be registered once.
    pub fn add(&mut self, preload: Preload) -> Result<()> {
        let mut node = &mut self.root;
        for segment in &preload.path {
            node = node.children.entry(segment.clone()).or_default();
        }
        if node.preload.is_some() {
            return Err(PreloadError::DuplicatedPath(preload.path).into());
        }
        node.preload = Some(preload);
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.root.children.is_empty()
    }

    /// Resolve every path against `root` and the catalog.
    pub fn validate(mut self, catalog: &Catalog, root: &Arc<TableInfo>) -> Result<ValidatedPreloadTree> {
        single_primary_key(root)?;
        self.root.validate(catalog, root)?;
        Ok(ValidatedPreloadTree {
            root: self.root,
            root_table: Arc::clone(root),
        })
    }
}

impl ValidatedPreloadTree {
    /// Columns the root query must select for linking to work, starting
    /// with the root primary key.
    pub fn root_columns(&self) -> Vec<&'static str> {
        let mut cols = Vec::with_capacity(self.root.extra_cols.len() + 1);
        // validate() checked the root key
        if let Ok(pk) = single_primary_key(&self.root_table) {
            cols.push(pk);
        }
        for &col in &self.root.extra_cols {
            push_unique(&mut cols, col);
        }
        cols
    }

    pub fn root_table(&self) -> &Arc<TableInfo> {
        &self.root_table
    }

    /// Load every path for the `owners` batch.
    ///
    /// `owners` must be keyed by the root table's primary key.
    pub fn compute<D: Driver>(&self, session: &mut Session<D>, owners: &mut RecordSet) -> Result<()> {
        for (name, child) in &self.root.children {
            child.compute(name, session, owners, None, 1)?;
        }
        Ok(())
    }
}

impl PreloadNode {
    fn validate(&mut self, catalog: &Catalog, table: &TableInfo) -> Result<()> {
        if let Some(preload) = &self.preload {
            for col in &preload.cols {
                if table.get_column(col).is_none() {
                    return Err(PreloadError::MissingColumn {
                        column: col.clone(),
                        table: table.name.to_string(),
                    }
                    .into());
                }
            }
        }

        for (name, child) in &mut self.children {
            let Some(association) = table.get_association(name).copied() else {
                let err = if table.has_field(name) {
                    PreloadError::MissingAssociation { field: name.clone() }
                } else {
                    PreloadError::MissingField {
                        field: name.clone(),
                        table: table.name.to_string(),
                    }
                };
                return Err(err.into());
            };

            let is_join = association.join_table().is_some();
            if let (false, Some(source_col)) = (is_join, association.source_col()) {
                self.extra_cols.push(source_col);
            }
            if let Some(target_col) = association.target_col() {
                push_unique(&mut self.extra_cols, single_primary_key(table)?);
                if !is_join {
                    child.extra_cols.push(target_col);
                }
            }

            let ref_table = catalog
                .table(association.ref_table)
                .ok_or_else(|| PreloadError::UnknownTable(association.ref_table.to_string()))?;
            single_primary_key(&ref_table)?;

            child.association = Some(association);
            child.validate(catalog, &ref_table)?;
            child.ref_table = Some(ref_table);
        }
        Ok(())
    }

    /// Columns for this node's query; `None` selects every column.
    fn select_columns(&self, pk: &'static str) -> Option<Vec<String>> {
        let extra = || {
            let mut cols: Vec<String> = Vec::new();
            for col in std::iter::once(pk).chain(self.extra_cols.iter().copied()) {
                if !cols.iter().any(|c| c == col) {
                    cols.push(col.to_string());
                }
            }
            cols
        };
        match &self.preload {
            Some(preload) if preload.is_restricted() => {
                let mut cols = extra();
                for col in &preload.cols {
                    if !cols.contains(col) {
                        cols.push(col.clone());
                    }
                }
                Some(cols)
            }
            Some(_) => None,
            None if self.extra_cols.is_empty() => None,
            None => Some(extra()),
        }
    }

    fn should_prune(&self) -> bool {
        !self.children.is_empty()
            && !self
                .preload
                .as_ref()
                .is_some_and(|p| p.is_restricted() || p.no_prune)
    }

    fn compute<D: Driver>(
        &self,
        name: &str,
        session: &mut Session<D>,
        owners: &mut RecordSet,
        prune: Option<&mut HashSet<RecordKey>>,
        level: usize,
    ) -> Result<()> {
        let (Some(association), Some(ref_table)) = (&self.association, &self.ref_table) else {
            return Err(PreloadError::MissingAssociation {
                field: name.to_string(),
            }
            .into());
        };
        let pk = single_primary_key(ref_table)?;

        let mut cond = get_cond(association, owners, ref_table)?;
        let join_map = match association.join_table() {
            Some(join) => {
                let join_map = fetch_join_map(session, join.table_name, association, cond)?;
                cond = Cond::in_list(generic(pk), join_map.ref_values().iter().cloned());
                Some(join_map)
            }
            None => None,
        };

        let mut st = session
            .new_statement()
            .ref_table(Arc::clone(ref_table))
            .filter(cond);
        if let Some(cols) = self.select_columns(pk) {
            st = st.cols(&cols);
        }
        if let Some(preload) = &self.preload {
            st = st.filter(preload.cond.clone());
        }
        let (sql, args) = st.gen_find_sql()?;
        let records = session
            .fetch_rows(&sql, &args)?
            .iter()
            .map(|row| Record::from_row(ref_table.name, row))
            .collect();
        let mut refs = RecordSet::from_records(vec![pk.to_string()], records);

        tracing::info!(
            association = association.name,
            owner_table = association.own_table,
            level,
            owners = owners.len(),
            fetched = refs.len(),
            "preloaded association"
        );
        session.record_load(LoadEvent {
            owner_table: association.own_table,
            association: association.name,
            owners: owners.len(),
            fetched: refs.len(),
        });

        let mut ref_prune: Option<HashSet<RecordKey>> =
            self.should_prune().then(|| refs.keys().into_iter().collect());
        for (child_name, child) in &self.children {
            child.compute(child_name, session, &mut refs, ref_prune.as_mut(), level + 1)?;
        }
        if let Some(unmatched) = &ref_prune {
            if !unmatched.is_empty() {
                tracing::debug!(
                    association = association.name,
                    pruned = unmatched.len(),
                    "pruned records without matching children"
                );
            }
            refs.remove_keys(unmatched);
        }

        link(association, owners, &refs, prune, join_map.as_ref());
        Ok(())
    }
}

/// Fetch `(owner, referenced)` pairs from the join table.
fn fetch_join_map<D: Driver>(
    session: &mut Session<D>,
    join_table: &str,
    association: &Association,
    cond: Cond,
) -> Result<JoinMap> {
    let (Some(source), Some(target)) = (association.source_col(), association.target_col()) else {
        return Ok(JoinMap::new());
    };
    let (sql, args) = session
        .new_statement()
        .table(join_table)
        .cols(&[source, target])
        .filter(cond)
        .gen_find_sql()?;

    let mut join_map = JoinMap::new();
    for row in session.fetch_rows(&sql, &args)? {
        let (Some(owner), Some(referenced)) = (row.get_named(source), row.get_named(target)) else {
            continue;
        };
        if owner.is_null() || referenced.is_null() {
            continue;
        }
        join_map.insert(referenced.clone(), owner.clone());
    }
    Ok(join_map)
}

fn push_unique(cols: &mut Vec<&'static str>, col: &'static str) {
    if !cols.contains(&col) {
        cols.push(col);
    }
}

/// Validate `preloads` against the root table of `st`, and widen a
/// column-restricted root query with the columns linking needs.
pub(crate) fn prepare(
    catalog: &Catalog,
    st: Statement,
    preloads: Vec<Preload>,
) -> Result<(Statement, Option<ValidatedPreloadTree>)> {
    if preloads.is_empty() {
        return Ok((st, None));
    }
    let root = match st.table_info() {
        Some(info) => Arc::clone(info),
        None => {
            let name = st.table_name().ok_or(Error::MissingTableName)?;
            catalog
                .table(name)
                .ok_or_else(|| PreloadError::UnknownTable(name.to_string()))?
        }
    };
    let tree = PreloadTree::from_preloads(preloads)?.validate(catalog, &root)?;

    if st.columns().is_empty() {
        return Ok((st, Some(tree)));
    }
    let missing: Vec<&'static str> = tree
        .root_columns()
        .into_iter()
        .filter(|col| !st.columns().iter().any(|c| c.as_str() == *col))
        .collect();
    Ok((st.cols(&missing), Some(tree)))
}
