//! UPSERT synthesis.
//!
//! Engines with native conflict handling get one INSERT plus a conflict
//! clause:
//!
//! | engine   | do nothing                      | do update                                   |
//! |----------|---------------------------------|---------------------------------------------|
//! | SQLite   | `ON CONFLICT DO NOTHING`        | `ON CONFLICT DO UPDATE SET c = excluded.c`  |
//! | Postgres | `ON CONFLICT DO NOTHING`        | `ON CONFLICT (u..) DO UPDATE SET c = excluded.c` |
//! | MySQL    | `INSERT IGNORE INTO`            | `ON DUPLICATE KEY UPDATE c = VALUES(c)`     |
//!
//! SQL Server, Oracle and Dameng get a synthesized `MERGE` whose source row
//! carries the unique values and whose match predicate ORs every tested
//! unique constraint.
//!
//! Columns of a matched unique constraint never appear in the update list.

use crate::dialect::{DbType, UpsertFamily};
use crate::statement::Statement;
use rowmap_core::{Error, Result, TableInfo, Value, Writer};
use std::collections::BTreeMap;

/// The unique constraints an upsert row is tested against.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UniqueColumns {
    /// Every column of every tested constraint, with the value it is tested
    /// with, in index order.
    pub values: Vec<(String, Value)>,
    /// Column lists of the tested constraints.
    pub constraints: Vec<Vec<String>>,
}

impl UniqueColumns {
    pub fn contains(&self, column: &str) -> bool {
        self.values.iter().any(|(c, _)| c == column)
    }
}

/// Work out which unique constraints the row `columns`/`args` is tested
/// against.
///
/// Each unique column takes the provided value, else the column default.
/// A constraint with an auto-increment column that has neither is not
/// tested, since the database will generate a fresh value.
pub fn resolve_unique_columns(
    table: &TableInfo,
    columns: &[&str],
    args: &[Value],
) -> Result<UniqueColumns> {
    let mut resolved = UniqueColumns::default();
    let mut any_unique = false;

    'index: for index in table.unique_indexes() {
        any_unique = true;
        let mut tested = Vec::with_capacity(index.columns.len());
        for &column in &index.columns {
            let provided = columns
                .iter()
                .position(|c| *c == column)
                .and_then(|i| args.get(i).cloned());
            let info = table.get_column(column);
            let value = provided.or_else(|| info.and_then(|c| c.default_value()));
            match value {
                Some(value) => tested.push((column.to_string(), value)),
                None if info.is_some_and(|c| c.auto_increment) => continue 'index,
                None => {
                    return Err(Error::MissingUniqueValue {
                        index: index.name.to_string(),
                        column: column.to_string(),
                    });
                }
            }
        }

        resolved
            .constraints
            .push(tested.iter().map(|(c, _)| c.clone()).collect());
        for (column, value) in tested {
            if !resolved.contains(&column) {
                resolved.values.push((column, value));
            }
        }
    }

    if !any_unique || resolved.constraints.is_empty() {
        return Err(Error::NoUniqueConstraints {
            table: table.name.to_string(),
        });
    }
    Ok(resolved)
}

impl Statement {
    /// Insert a row, or on a unique conflict update it (`do_update`) or
    /// leave the existing row alone.
    ///
    /// With `add_output`, the generated id is returned where the engine can
    /// (`RETURNING` on Postgres/SQLite, `OUTPUT` on SQL Server).
    pub fn gen_upsert_sql<S: AsRef<str>>(
        &self,
        do_update: bool,
        add_output: bool,
        columns: &[S],
        args: Vec<Value>,
    ) -> Result<(String, Vec<Value>)> {
        self.check()?;
        self.require_table_name()?;
        let table = self.ref_table.as_ref().ok_or(Error::MissingTableName)?;
        let columns: Vec<&str> = columns.iter().map(AsRef::as_ref).collect();

        if do_update && !self.dialect.features().upsert_update {
            return Err(Error::not_implemented(format!(
                "upsert with update on {}",
                self.dialect.db_type()
            )));
        }

        let unique = resolve_unique_columns(table, &columns, &args)?;
        if do_update && unique.constraints.len() > 1 {
            return Err(Error::MultipleUniqueConstraints {
                table: table.name.to_string(),
                count: unique.constraints.len(),
            });
        }

        if self.dialect.upsert_family() == UpsertFamily::Merge {
            return self.gen_merge_sql(do_update, add_output, &columns, args, &unique);
        }

        let update_columns: Vec<String> = if do_update {
            columns
                .iter()
                .filter(|c| !unique.contains(c))
                .map(|c| self.quote(c))
                .collect::<Result<_>>()?
        } else {
            Vec::new()
        };
        let do_update = do_update && !update_columns.is_empty();
        let db_type = self.dialect.db_type();

        let mut w = Writer::new();
        w.push_str(if db_type == DbType::Mysql && !do_update {
            "INSERT IGNORE INTO "
        } else {
            "INSERT INTO "
        });
        w.push_str(&self.quoted_table_name()?);
        self.write_insert_values(&mut w, &columns, args, false)?;

        match db_type {
            DbType::Sqlite => {
                w.push_str(" ON CONFLICT DO ");
                if do_update {
                    w.push_str("UPDATE SET ");
                    write_assignments(&mut w, &update_columns, |c| format!("{c} = excluded.{c}"));
                } else {
                    w.push_str("NOTHING");
                }
            }
            DbType::Postgres => {
                if do_update {
                    w.push_str(" ON CONFLICT (");
                    w.push_str(&self.dialect.quoter().join(&unique.constraints[0], ", ")?);
                    w.push_str(") DO UPDATE SET ");
                    write_assignments(&mut w, &update_columns, |c| format!("{c} = excluded.{c}"));
                } else {
                    w.push_str(" ON CONFLICT DO NOTHING");
                }
            }
            DbType::Mysql => {
                if do_update {
                    w.push_str(" ON DUPLICATE KEY UPDATE ");
                    write_assignments(&mut w, &update_columns, |c| format!("{c} = VALUES({c})"));
                    if let Some(auto) = table.auto_increment() {
                        let auto = self.quote(auto)?;
                        w.push_str(&format!(", {auto} = LAST_INSERT_ID({auto})"));
                    }
                }
            }
            other => {
                return Err(Error::not_implemented(format!("upsert on {other}")));
            }
        }

        if add_output && self.dialect.supports_returning() {
            if let Some(auto) = table.auto_increment() {
                w.push_str(" RETURNING ");
                w.push_str(&self.quote(auto)?);
            }
        }
        Ok(w.into_parts())
    }

    /// [`gen_upsert_sql`](Self::gen_upsert_sql) for a column map.
    pub fn gen_upsert_map_sql(
        &self,
        do_update: bool,
        row: &BTreeMap<String, Value>,
    ) -> Result<(String, Vec<Value>)> {
        let columns: Vec<&str> = row.keys().map(String::as_str).collect();
        self.gen_upsert_sql(do_update, false, &columns, row.values().cloned().collect())
    }

    fn gen_merge_sql(
        &self,
        do_update: bool,
        add_output: bool,
        columns: &[&str],
        args: Vec<Value>,
        unique: &UniqueColumns,
    ) -> Result<(String, Vec<Value>)> {
        let db_type = self.dialect.db_type();
        let table_alias_kw = if db_type == DbType::Mssql { " AS " } else { " " };

        let mut w = Writer::new();
        w.push_str("MERGE INTO ");
        w.push_str(&self.quoted_table_name()?);
        if db_type == DbType::Mssql {
            w.push_str(" WITH (HOLDLOCK)");
        }
        w.push_str(table_alias_kw);
        w.push_str("target USING (SELECT ");
        for (i, (column, value)) in unique.values.iter().enumerate() {
            if i > 0 {
                w.push_str(", ");
            }
            w.push_arg(value.clone());
            w.push_str(" AS ");
            w.push_str(&self.quote(column)?);
        }
        if db_type != DbType::Mssql {
            w.push_str(" FROM dual");
        }
        w.push(')');
        w.push_str(table_alias_kw);
        w.push_str("src ON (");
        for (i, constraint) in unique.constraints.iter().enumerate() {
            if i > 0 {
                w.push_str(" OR ");
            }
            w.push('(');
            for (j, column) in constraint.iter().enumerate() {
                if j > 0 {
                    w.push_str(" AND ");
                }
                let column = self.quote(column)?;
                w.push_str(&format!("src.{column} = target.{column}"));
            }
            w.push(')');
        }
        w.push(')');

        let updates: Vec<(String, Value)> = if do_update {
            columns
                .iter()
                .zip(args.iter())
                .filter(|(c, _)| !unique.contains(c))
                .map(|(c, v)| Ok((self.quote(c)?, v.clone())))
                .collect::<Result<_>>()?
        } else {
            Vec::new()
        };
        if !updates.is_empty() {
            w.push_str(" WHEN MATCHED THEN UPDATE SET ");
            for (i, (column, value)) in updates.into_iter().enumerate() {
                if i > 0 {
                    w.push_str(", ");
                }
                w.push_str(&format!("target.{column} = "));
                w.push_arg(value);
            }
        }

        w.push_str(" WHEN NOT MATCHED THEN INSERT ");
        let auto = self.auto_increment();
        let include_auto = self.dialect.uses_sequences()
            && auto.is_some_and(|a| !columns.iter().any(|c| c.eq_ignore_ascii_case(a)));
        if columns.is_empty() && db_type == DbType::Mssql {
            w.push_str("DEFAULT VALUES");
        } else {
            let mut all: Vec<&str> = columns.to_vec();
            if let (true, Some(auto)) = (include_auto, auto) {
                all.push(auto);
            }
            all.extend(self.expr_columns.iter().map(|(c, _)| c.as_str()));
            w.push('(');
            w.push_str(&self.dialect.quoter().join(&all, ",")?);
            w.push_str(") VALUES (");
            let has_args = !args.is_empty();
            w.push_args(args);
            if include_auto {
                if has_args {
                    w.push(',');
                }
                w.push_str(&self.dialect.seq_name(self.require_table_name()?));
                w.push_str(".nextval");
            }
            for (i, (_, expr)) in self.expr_columns.iter().enumerate() {
                if i > 0 || has_args || include_auto {
                    w.push(',');
                }
                w.push_str(&self.replace_quote(expr));
            }
            w.push(')');
        }

        if add_output {
            if let (DbType::Mssql, Some(auto)) = (db_type, auto) {
                w.push_str(" OUTPUT INSERTED.");
                w.push_str(&self.quote(auto)?);
            }
        }
        w.push(';');
        Ok(w.into_parts())
    }
}

fn write_assignments(w: &mut Writer, columns: &[String], assign: impl Fn(&str) -> String) {
    for (i, column) in columns.iter().enumerate() {
        if i > 0 {
            w.push_str(", ");
        }
        w.push_str(&assign(column));
    }
}
