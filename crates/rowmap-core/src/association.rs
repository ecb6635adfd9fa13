//! Association metadata.
//!
//! An [`Association`] describes one relationship edge declared on a table:
//! the relation-valued field, the table it points to, and the columns used to
//! join the two sides. Associations are static metadata registered with the
//! [`Catalog`](crate::schema::Catalog); the preload resolver turns them into
//! batch conditions and links the fetched records back into their owners.

/// The kind of relationship an association represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssociationKind {
    /// The owner holds a foreign key to one referenced record.
    BelongsTo,
    /// One referenced record holds a foreign key to the owner.
    HasOne,
    /// Many referenced records hold a foreign key to the owner.
    HasMany,
    /// Owner and referenced records are paired through a join table.
    ManyToMany,
}

/// A join table for many-to-many associations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JoinTableInfo {
    /// The join table name (e.g., `"employee_indication"`).
    pub table_name: &'static str,

    /// Column pointing at the owner's primary key.
    pub source_column: &'static str,

    /// Column pointing at the referenced table's primary key.
    pub target_column: &'static str,
}

impl JoinTableInfo {
    #[must_use]
    pub const fn new(
        table_name: &'static str,
        source_column: &'static str,
        target_column: &'static str,
    ) -> Self {
        Self {
            table_name,
            source_column,
            target_column,
        }
    }
}

/// How the two sides of an association are joined.
///
/// Exactly one shape is active per association.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssociationLink {
    /// `source_col` lives on the owner table.
    BelongsTo { source_col: &'static str },
    /// `target_col` lives on the referenced table.
    HasOne { target_col: &'static str },
    /// `target_col` lives on the referenced table.
    HasMany { target_col: &'static str },
    ManyToMany(JoinTableInfo),
}

/// Metadata about a relation-valued field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Association {
    /// Name of the relation field (the preload path segment).
    pub name: &'static str,

    /// Table declaring the field.
    pub own_table: &'static str,

    /// Table the field points to.
    pub ref_table: &'static str,

    pub link: AssociationLink,
}

impl Association {
    /// The owner holds `source_col`, a foreign key to `ref_table`.
    #[must_use]
    pub const fn belongs_to(
        name: &'static str,
        own_table: &'static str,
        ref_table: &'static str,
        source_col: &'static str,
    ) -> Self {
        Self {
            name,
            own_table,
            ref_table,
            link: AssociationLink::BelongsTo { source_col },
        }
    }

    /// One `ref_table` row holds `target_col` pointing back at the owner.
    #[must_use]
    pub const fn has_one(
        name: &'static str,
        own_table: &'static str,
        ref_table: &'static str,
        target_col: &'static str,
    ) -> Self {
        Self {
            name,
            own_table,
            ref_table,
            link: AssociationLink::HasOne { target_col },
        }
    }

    /// Many `ref_table` rows hold `target_col` pointing back at the owner.
    #[must_use]
    pub const fn has_many(
        name: &'static str,
        own_table: &'static str,
        ref_table: &'static str,
        target_col: &'static str,
    ) -> Self {
        Self {
            name,
            own_table,
            ref_table,
            link: AssociationLink::HasMany { target_col },
        }
    }

    /// Owner and `ref_table` rows are paired through `join`.
    #[must_use]
    pub const fn many_to_many(
        name: &'static str,
        own_table: &'static str,
        ref_table: &'static str,
        join: JoinTableInfo,
    ) -> Self {
        Self {
            name,
            own_table,
            ref_table,
            link: AssociationLink::ManyToMany(join),
        }
    }

    pub const fn kind(&self) -> AssociationKind {
        match self.link {
            AssociationLink::BelongsTo { .. } => AssociationKind::BelongsTo,
            AssociationLink::HasOne { .. } => AssociationKind::HasOne,
            AssociationLink::HasMany { .. } => AssociationKind::HasMany,
            AssociationLink::ManyToMany(_) => AssociationKind::ManyToMany,
        }
    }

    /// Column referencing the owner side: the owner's foreign key for
    /// belongs-to, the join table's owner column for many-to-many.
    pub const fn source_col(&self) -> Option<&'static str> {
        match self.link {
            AssociationLink::BelongsTo { source_col } => Some(source_col),
            AssociationLink::ManyToMany(join) => Some(join.source_column),
            _ => None,
        }
    }

    /// Column referencing the other side: the referenced table's foreign key
    /// for has-one/has-many, the join table's target column for many-to-many.
    pub const fn target_col(&self) -> Option<&'static str> {
        match self.link {
            AssociationLink::HasOne { target_col } | AssociationLink::HasMany { target_col } => {
                Some(target_col)
            }
            AssociationLink::ManyToMany(join) => Some(join.target_column),
            AssociationLink::BelongsTo { .. } => None,
        }
    }

    pub const fn join_table(&self) -> Option<&JoinTableInfo> {
        match &self.link {
            AssociationLink::ManyToMany(join) => Some(join),
            _ => None,
        }
    }

    /// Whether the field holds a list of records.
    pub const fn is_list(&self) -> bool {
        matches!(
            self.link,
            AssociationLink::HasMany { .. } | AssociationLink::ManyToMany(_)
        )
    }
}
