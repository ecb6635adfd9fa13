//! MySQL index hints.

use crate::statement::Statement;
use rowmap_core::{Error, Result, Writer};

/// `USE`, `FORCE` or `IGNORE INDEX(name)` after the FROM table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexHint {
    pub op: String,
    pub index: String,
}

const OPERATORS: [&str; 3] = ["USE", "FORCE", "IGNORE"];

impl Statement {
    /// Add an index hint. `op` is matched case-insensitively.
    ///
    /// An unknown operator or a dialect without hints is reported by the
    /// next `gen_*` call.
    #[must_use]
    pub fn index_hint(mut self, op: &str, index: impl Into<String>) -> Self {
        let op = op.trim().to_uppercase();
        if !self.dialect.supports_index_hints() {
            self.set_error(Error::not_implemented(format!(
                "index hints on {}",
                self.dialect.db_type()
            )));
            return self;
        }
        if !OPERATORS.contains(&op.as_str()) {
            self.set_error(Error::InvalidIndexHintOperator(op));
            return self;
        }
        self.index_hints.push(IndexHint {
            op,
            index: index.into(),
        });
        self
    }

    #[must_use]
    pub fn use_index(self, index: impl Into<String>) -> Self {
        self.index_hint("USE", index)
    }

    #[must_use]
    pub fn force_index(self, index: impl Into<String>) -> Self {
        self.index_hint("FORCE", index)
    }

    #[must_use]
    pub fn ignore_index(self, index: impl Into<String>) -> Self {
        self.index_hint("IGNORE", index)
    }

    pub(crate) fn write_index_hints(&self, w: &mut Writer) -> Result<()> {
        for hint in &self.index_hints {
            w.push(' ');
            w.push_str(&hint.op);
            w.push_str(" INDEX(");
            w.push_str(&self.quote(&hint.index)?);
            w.push(')');
        }
        Ok(())
    }
}
