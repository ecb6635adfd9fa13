//! JOIN clauses.

use crate::quote::Quoter;
use crate::statement::Statement;
use rowmap_core::{Cond, Result, Value, Writer};

/// What is being joined.
#[derive(Debug, Clone)]
pub enum JoinTarget {
    /// A table name, optionally `schema.table` or `table AS alias`.
    Table(String),
    /// A nested statement, emitted as `(<select>) <alias>`.
    ///
    /// The alias is the nested statement's own alias, or the last segment
    /// of its table name.
    SubQuery(Box<Statement>),
    /// A raw parenthesized subquery or identifier; only requoted.
    Raw(String),
}

/// The join predicate.
#[derive(Debug, Clone)]
pub enum JoinOn {
    Raw(String),
    Cond(Cond),
}

/// One registered join. Joins are emitted in registration order.
#[derive(Debug, Clone)]
pub struct Join {
    pub(crate) op: String,
    pub(crate) target: JoinTarget,
    pub(crate) on: JoinOn,
    pub(crate) args: Vec<Value>,
}

impl Statement {
    /// Join a nested statement.
    #[must_use]
    pub fn join_sub(self, op: &str, sub: Statement, on: impl Into<String>) -> Self {
        self.join(
            op,
            JoinTarget::SubQuery(Box::new(sub)),
            JoinOn::Raw(on.into()),
            Vec::new(),
        )
    }

    /// Join with a condition tree as the predicate.
    #[must_use]
    pub fn join_cond(self, op: &str, table: impl Into<String>, on: Cond) -> Self {
        self.join(op, JoinTarget::Table(table.into()), JoinOn::Cond(on), Vec::new())
    }

    pub(crate) fn write_joins(&self, w: &mut Writer) -> Result<()> {
        for join in &self.joins {
            self.write_join(w, join)?;
        }
        Ok(())
    }

    fn write_join(&self, w: &mut Writer, join: &Join) -> Result<()> {
        w.push(' ');
        w.push_str(&join.op);
        w.push_str(" JOIN ");

        match &join.target {
            JoinTarget::SubQuery(sub) => {
                let (sub_sql, sub_args) = sub.gen_find_sql()?;
                w.push('(');
                w.push_str(&sub_sql);
                w.push_str(") ");
                w.append(sub_args);
                w.push_str(&self.quote(&self.sub_query_alias(sub))?);
            }
            JoinTarget::Raw(raw) => w.push_str(&self.replace_quote(raw)),
            JoinTarget::Table(name) => {
                if name.trim_start().starts_with('(') {
                    w.push_str(&self.replace_quote(name));
                } else {
                    w.push_str(&self.quote(name)?);
                }
            }
        }

        w.push_str(" ON ");
        match &join.on {
            JoinOn::Raw(on) => w.push_str(&self.replace_quote(on)),
            JoinOn::Cond(cond) => self.write_cond(w, cond)?,
        }
        w.append(join.args.iter().cloned());
        Ok(())
    }

    fn sub_query_alias(&self, sub: &Statement) -> String {
        if let Some(alias) = sub.alias_name() {
            return alias.to_string();
        }
        let name = sub.table_name().unwrap_or_default();
        let last = name.rsplit('.').next().unwrap_or(name);
        Quoter::common().trim(&self.dialect.quoter().trim(last))
    }
}
