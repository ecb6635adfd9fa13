//! ORDER BY accumulation.
//!
//! Order terms are appended in call order and never deduplicated.

use crate::statement::Statement;
use rowmap_core::{Value, Writer};

impl Statement {
    /// Append a raw order expression, optionally with bound arguments.
    #[must_use]
    pub fn order_by(mut self, order: impl AsRef<str>, args: Vec<Value>) -> Self {
        let order = self.replace_quote(order.as_ref());
        self.push_order(&order);
        self.order_args.extend(args);
        self
    }

    /// Append `col ASC` for each column.
    #[must_use]
    pub fn asc<S: AsRef<str>>(self, columns: &[S]) -> Self {
        self.order_columns(columns, " ASC")
    }

    /// Append `col DESC` for each column.
    #[must_use]
    pub fn desc<S: AsRef<str>>(self, columns: &[S]) -> Self {
        self.order_columns(columns, " DESC")
    }

    fn order_columns<S: AsRef<str>>(mut self, columns: &[S], direction: &str) -> Self {
        let mut terms = Vec::with_capacity(columns.len());
        for column in columns {
            match self.quote(column.as_ref().trim()) {
                Ok(quoted) => terms.push(quoted + direction),
                Err(err) => {
                    self.set_error(err);
                    return self;
                }
            }
        }
        self.push_order(&terms.join(", "));
        self
    }

    fn push_order(&mut self, term: &str) {
        if term.is_empty() {
            return;
        }
        if !self.order_str.is_empty() {
            self.order_str.push_str(", ");
        }
        self.order_str.push_str(term);
    }

    pub fn has_order(&self) -> bool {
        !self.order_str.is_empty()
    }

    pub(crate) fn write_order_by(&self, w: &mut Writer) {
        if self.order_str.is_empty() {
            return;
        }
        w.push_str(" ORDER BY ");
        w.push_str(&self.order_str);
        w.append(self.order_args.iter().cloned());
    }
}
