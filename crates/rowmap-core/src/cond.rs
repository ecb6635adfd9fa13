//! Composable WHERE-clause conditions.
//!
//! A [`Cond`] renders itself into a [`Writer`] as SQL text with `?`
//! placeholders and pushes the bound values in the same order. Column names
//! are written as given; callers that want dialect quoting write them with
//! backticks and let the statement builder rewrite them.
//!
//! # Example
//!
//! ```ignore
//! let cond = Cond::eq("name", "John").and(Cond::in_list("id", [1i64, 2, 3]));
//! let mut w = Writer::new();
//! cond.write_to(&mut w)?;
//! assert_eq!(w.sql(), "name=? AND id IN (?,?,?)");
//! ```

use crate::error::Result;
use crate::record::Record;
use crate::value::Value;
use crate::writer::Writer;

/// Comparison operator for [`Cond::Compare`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Neq,
    Lt,
    Lte,
    Gt,
    Gte,
}

impl CompareOp {
    pub const fn as_sql(self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::Neq => "<>",
            CompareOp::Lt => "<",
            CompareOp::Lte => "<=",
            CompareOp::Gt => ">",
            CompareOp::Gte => ">=",
        }
    }
}

/// A condition tree.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Cond {
    /// No condition; writes nothing and is not valid.
    #[default]
    Empty,
    Compare {
        column: String,
        op: CompareOp,
        value: Value,
    },
    In {
        column: String,
        values: Vec<Value>,
        negated: bool,
    },
    Null {
        column: String,
        negated: bool,
    },
    Like {
        column: String,
        pattern: String,
    },
    /// Raw SQL fragment with its own placeholders.
    Expr { sql: String, args: Vec<Value> },
    And(Vec<Cond>),
    Or(Vec<Cond>),
    Not(Box<Cond>),
}

impl Cond {
    fn compare(column: impl Into<String>, op: CompareOp, value: impl Into<Value>) -> Self {
        Cond::Compare {
            column: column.into(),
            op,
            value: value.into(),
        }
    }

    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(column, CompareOp::Eq, value)
    }

    pub fn neq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(column, CompareOp::Neq, value)
    }

    pub fn lt(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(column, CompareOp::Lt, value)
    }

    pub fn lte(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(column, CompareOp::Lte, value)
    }

    pub fn gt(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(column, CompareOp::Gt, value)
    }

    pub fn gte(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(column, CompareOp::Gte, value)
    }

    pub fn in_list<V: Into<Value>>(
        column: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        Cond::In {
            column: column.into(),
            values: values.into_iter().map(Into::into).collect(),
            negated: false,
        }
    }

    pub fn not_in<V: Into<Value>>(
        column: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        Cond::In {
            column: column.into(),
            values: values.into_iter().map(Into::into).collect(),
            negated: true,
        }
    }

    pub fn is_null(column: impl Into<String>) -> Self {
        Cond::Null {
            column: column.into(),
            negated: false,
        }
    }

    pub fn not_null(column: impl Into<String>) -> Self {
        Cond::Null {
            column: column.into(),
            negated: true,
        }
    }

    pub fn like(column: impl Into<String>, pattern: impl Into<String>) -> Self {
        Cond::Like {
            column: column.into(),
            pattern: pattern.into(),
        }
    }

    pub fn expr(sql: impl Into<String>, args: Vec<Value>) -> Self {
        Cond::Expr {
            sql: sql.into(),
            args,
        }
    }

    /// Equality on every non-NULL column of a record.
    pub fn from_record(record: &Record) -> Self {
        record
            .fields()
            .iter()
            .filter(|(_, v)| !v.is_null())
            .fold(Cond::Empty, |acc, (c, v)| acc.and(Cond::eq(c.clone(), v.clone())))
    }

    /// Combine with AND; an invalid side is dropped.
    #[must_use]
    pub fn and(self, other: Cond) -> Cond {
        match (self.is_valid(), other.is_valid()) {
            (false, _) => other,
            (_, false) => self,
            _ => match self {
                Cond::And(mut list) => {
                    list.push(other);
                    Cond::And(list)
                }
                first => Cond::And(vec![first, other]),
            },
        }
    }

    /// Combine with OR; an invalid side is dropped.
    #[must_use]
    pub fn or(self, other: Cond) -> Cond {
        match (self.is_valid(), other.is_valid()) {
            (false, _) => other,
            (_, false) => self,
            _ => match self {
                Cond::Or(mut list) => {
                    list.push(other);
                    Cond::Or(list)
                }
                first => Cond::Or(vec![first, other]),
            },
        }
    }

    #[must_use]
    pub fn not(self) -> Cond {
        if self.is_valid() {
            Cond::Not(Box::new(self))
        } else {
            self
        }
    }

    /// Whether writing this condition produces any SQL.
    pub fn is_valid(&self) -> bool {
        match self {
            Cond::Empty => false,
            Cond::Expr { sql, .. } => !sql.trim().is_empty(),
            Cond::And(list) | Cond::Or(list) => list.iter().any(Cond::is_valid),
            Cond::Not(inner) => inner.is_valid(),
            _ => true,
        }
    }

    /// Render into `w`.
    pub fn write_to(&self, w: &mut Writer) -> Result<()> {
        match self {
            Cond::Empty => {}
            Cond::Compare { column, op, value } => {
                if value.is_null() && matches!(op, CompareOp::Eq | CompareOp::Neq) {
                    w.push_str(column);
                    w.push_str(if *op == CompareOp::Eq {
                        " IS NULL"
                    } else {
                        " IS NOT NULL"
                    });
                } else {
                    w.push_str(column);
                    w.push_str(op.as_sql());
                    w.push_arg(value.clone());
                }
            }
            Cond::In {
                column,
                values,
                negated,
            } => {
                if values.is_empty() {
                    // IN () matches nothing, NOT IN () matches everything
                    w.push_str(if *negated { "0=0" } else { "0=1" });
                } else {
                    w.push_str(column);
                    w.push_str(if *negated { " NOT IN (" } else { " IN (" });
                    w.push_args(values.iter().cloned());
                    w.push(')');
                }
            }
            Cond::Null { column, negated } => {
                w.push_str(column);
                w.push_str(if *negated { " IS NOT NULL" } else { " IS NULL" });
            }
            Cond::Like { column, pattern } => {
                w.push_str(column);
                w.push_str(" LIKE ");
                w.push_arg(Value::Text(pattern.clone()));
            }
            Cond::Expr { sql, args } => {
                w.push_str(sql);
                w.append(args.iter().cloned());
            }
            Cond::And(list) => write_list(w, list, " AND ", |c| {
                matches!(c, Cond::Or(_) | Cond::Expr { .. })
            })?,
            Cond::Or(list) => write_list(w, list, " OR ", |c| {
                matches!(c, Cond::And(_) | Cond::Expr { .. })
            })?,
            Cond::Not(inner) => {
                w.push_str("NOT (");
                inner.write_to(w)?;
                w.push(')');
            }
        }
        Ok(())
    }
}

fn write_list(
    w: &mut Writer,
    list: &[Cond],
    sep: &str,
    needs_parens: impl Fn(&Cond) -> bool,
) -> Result<()> {
    let valid: Vec<&Cond> = list.iter().filter(|c| c.is_valid()).collect();
    let wrap_each = valid.len() > 1;
    for (i, cond) in valid.into_iter().enumerate() {
        if i > 0 {
            w.push_str(sep);
        }
        let wrap = wrap_each && needs_parens(cond);
        if wrap {
            w.push('(');
        }
        cond.write_to(w)?;
        if wrap {
            w.push(')');
        }
    }
    Ok(())
}
