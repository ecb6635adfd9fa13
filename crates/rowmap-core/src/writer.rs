//! Append-only SQL text and argument buffer.

use crate::value::Value;
use std::fmt;

/// Accumulates SQL text together with its positional arguments.
///
/// Every `?` written through [`Writer::push_arg`] has exactly one matching
/// entry in [`Writer::args`], in emission order.
#[derive(Debug, Clone, Default)]
pub struct Writer {
    sql: String,
    args: Vec<Value>,
}

impl Writer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            sql: String::with_capacity(capacity),
            args: Vec::new(),
        }
    }

    pub fn push_str(&mut self, s: &str) {
        self.sql.push_str(s);
    }

    pub fn push(&mut self, c: char) {
        self.sql.push(c);
    }

    /// Write a placeholder bound to `value`.
    pub fn push_arg(&mut self, value: Value) {
        self.sql.push('?');
        self.args.push(value);
    }

    /// Write comma-separated placeholders for `values`.
    pub fn push_args(&mut self, values: impl IntoIterator<Item = Value>) {
        for (i, v) in values.into_iter().enumerate() {
            if i > 0 {
                self.sql.push(',');
            }
            self.push_arg(v);
        }
    }

    /// Append arguments whose placeholders were written as raw text.
    pub fn append(&mut self, args: impl IntoIterator<Item = Value>) {
        self.args.extend(args);
    }

    /// Append another writer's text and arguments.
    pub fn extend(&mut self, other: Writer) {
        self.sql.push_str(&other.sql);
        self.args.extend(other.args);
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn args(&self) -> &[Value] {
        &self.args
    }

    pub fn is_empty(&self) -> bool {
        self.sql.is_empty()
    }

    pub fn len(&self) -> usize {
        self.sql.len()
    }

    pub fn into_parts(self) -> (String, Vec<Value>) {
        (self.sql, self.args)
    }
}

impl fmt::Write for Writer {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.sql.push_str(s);
        Ok(())
    }
}
