//! Identifier quoting.
//!
//! A [`Quoter`] wraps table and column identifiers in a dialect's quote
//! characters. It understands bare words, dotted `schema.table` pairs,
//! `AS alias` suffixes and MySQL-style `USE|FORCE INDEX (name)` suffixes,
//! and accepts input already quoted with backticks or with its own marks.
//!
//! # Example
//!
//! ```ignore
//! let q = Quoter::new('[', ']', always_reserve);
//! assert_eq!(q.quote("`message_user` AS `sender`")?, "[message_user] AS [sender]");
//! assert_eq!(q.trim("[schema].[table_name]"), "schema.table_name");
//! assert_eq!(q.replace("SELECT `a` FROM b WHERE c = '`x`'"), "SELECT [a] FROM b WHERE c = '`x`'");
//! ```

use regex::Regex;
use rowmap_core::{Error, Result};
use std::collections::HashMap;
use std::sync::{OnceLock, PoisonError, RwLock};

/// The generic quote mark accepted in any SQL fragment.
pub const COMMON_QUOTE_MARK: char = '`';

/// Predicate deciding whether a word must be quoted.
pub type IsReserved = fn(&str) -> bool;

/// Quote every word.
pub fn always_reserve(_: &str) -> bool {
    true
}

/// Quote no word.
pub fn always_no_reserve(_: &str) -> bool {
    false
}

// ============================================================================
// Pattern cache
// ============================================================================

/// Compiled identifier patterns keyed by quote marks.
///
/// Patterns are compiled lazily on first use and cached for the lifetime of
/// the program, so quoters stay `Copy`.
struct PatternCache {
    cache: RwLock<HashMap<Option<(char, char)>, Regex>>,
}

impl PatternCache {
    fn new() -> Self {
        Self {
            cache: RwLock::new(HashMap::new()),
        }
    }

    fn get_or_compile(&self, marks: Option<(char, char)>) -> Result<Regex> {
        {
            let cache = self.cache.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(regex) = cache.get(&marks) {
                return Ok(regex.clone());
            }
        }

        let regex = Regex::new(&identifier_pattern(marks))
            .map_err(|e| Error::Quote(format!("invalid quote marks: {e}")))?;
        {
            let mut cache = self.cache.write().unwrap_or_else(PoisonError::into_inner);
            cache.insert(marks, regex.clone());
        }
        Ok(regex)
    }
}

fn pattern_cache() -> &'static PatternCache {
    static CACHE: OnceLock<PatternCache> = OnceLock::new();
    CACHE.get_or_init(PatternCache::new)
}

fn identifier_pattern(marks: Option<(char, char)>) -> String {
    let mut word = String::from(r"[^.\s]+|`[^.\s]+`");
    if let Some((prefix, suffix)) = marks {
        word.push('|');
        word.push_str(&regex::escape(&prefix.to_string()));
        word.push_str(r"[^.\s]+");
        word.push_str(&regex::escape(&suffix.to_string()));
    }
    format!(
        r"(?i)^\s*({w})(?:\s*\.\s*({w}))?\s*?(?:\s+as\s+({w}))?(?:\s+(use|force)\s+index\s+\(({w})\))?\s*$",
        w = word
    )
}

// ============================================================================
// Quoter
// ============================================================================

/// Quotes identifiers for one dialect.
#[derive(Debug, Clone, Copy)]
pub struct Quoter {
    marks: Option<(char, char)>,
    is_reserved: IsReserved,
}

impl Quoter {
    #[must_use]
    pub const fn new(prefix: char, suffix: char, is_reserved: IsReserved) -> Self {
        Self {
            marks: Some((prefix, suffix)),
            is_reserved,
        }
    }

    /// A quoter without marks; words are written raw.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            marks: None,
            is_reserved: always_no_reserve,
        }
    }

    /// The default backtick quoter that quotes every word.
    #[must_use]
    pub const fn common() -> Self {
        Self::new(COMMON_QUOTE_MARK, COMMON_QUOTE_MARK, always_reserve)
    }

    /// Replace the reserved-word predicate.
    #[must_use]
    pub const fn with_reserved(mut self, is_reserved: IsReserved) -> Self {
        self.is_reserved = is_reserved;
        self
    }

    pub const fn is_empty(&self) -> bool {
        self.marks.is_none()
    }

    pub fn prefix(&self) -> Option<char> {
        self.marks.map(|(p, _)| p)
    }

    pub fn suffix(&self) -> Option<char> {
        self.marks.map(|(_, s)| s)
    }

    pub fn is_reserved(&self, word: &str) -> bool {
        (self.is_reserved)(word)
    }

    /// Quote an identifier.
    pub fn quote(&self, value: &str) -> Result<String> {
        let mut buf = String::with_capacity(value.len() + 4);
        self.quote_to(&mut buf, value)?;
        Ok(buf)
    }

    /// Quote an identifier into `buf`.
    ///
    /// Accepts `name`, `schema.name`, `name AS alias` and
    /// `name AS alias USE INDEX (idx)`, each word optionally pre-quoted.
    pub fn quote_to(&self, buf: &mut String, value: &str) -> Result<()> {
        let regex = pattern_cache().get_or_compile(self.marks)?;
        let caps = regex
            .captures(value)
            .ok_or_else(|| Error::Quote(value.to_string()))?;
        let group = |i: usize| caps.get(i).map_or("", |m| m.as_str());

        let (mut schema, mut table) = (group(1), group(2));
        let alias = group(3);
        let index_method = group(4);
        let index = group(5);
        if table.is_empty() {
            table = schema;
            schema = "";
        }

        if !schema.is_empty() {
            self.quote_word_to(buf, schema);
            buf.push('.');
        }
        self.quote_word_to(buf, table);
        if !alias.is_empty() {
            buf.push_str(" AS ");
            self.quote_word_to(buf, alias);
        }
        if !index.is_empty() {
            buf.push(' ');
            buf.push_str(index_method);
            buf.push_str(" index (");
            self.quote_word_to(buf, index);
            buf.push(')');
        }
        Ok(())
    }

    fn quote_word_to(&self, buf: &mut String, word: &str) {
        let real = strip_marks(word, COMMON_QUOTE_MARK, COMMON_QUOTE_MARK)
            .or_else(|| self.marks.and_then(|(p, s)| strip_marks(word, p, s)))
            .unwrap_or(word);

        let Some((prefix, suffix)) = self.marks else {
            buf.push_str(real);
            return;
        };

        let quoted = real != "*" && self.is_reserved(real);
        if quoted {
            buf.push(prefix);
        }
        buf.push_str(real);
        if quoted {
            buf.push(suffix);
        }
    }

    /// Quote every element.
    pub fn strings<S: AsRef<str>>(&self, values: &[S]) -> Result<Vec<String>> {
        values.iter().map(|v| self.quote(v.as_ref())).collect()
    }

    /// Quote each trimmed element and join with `sep`.
    pub fn join<S: AsRef<str>>(&self, values: &[S], sep: &str) -> Result<String> {
        let mut buf = String::new();
        self.join_write(&mut buf, values, sep)?;
        Ok(buf)
    }

    pub fn join_write<S: AsRef<str>>(&self, buf: &mut String, values: &[S], sep: &str) -> Result<()> {
        for (i, v) in values.iter().enumerate() {
            if i > 0 {
                buf.push_str(sep);
            }
            self.quote_to(buf, v.as_ref().trim())?;
        }
        Ok(())
    }

    /// Strip one layer of this quoter's marks, including around a `.`.
    pub fn trim(&self, s: &str) -> String {
        let Some((prefix, suffix)) = self.marks else {
            return s.to_string();
        };
        let chars: Vec<char> = s.chars().collect();
        if chars.len() < 2 {
            return s.to_string();
        }

        let last = chars.len() - 1;
        let mut out = String::with_capacity(s.len());
        for (i, &c) in chars.iter().enumerate() {
            let skip = (i == 0 && c == prefix)
                || (i == last && c == suffix)
                || (c == suffix && chars.get(i + 1) == Some(&'.'))
                || (c == prefix && i > 0 && chars[i - 1] == '.');
            if !skip {
                out.push(c);
            }
        }
        out
    }

    /// Rewrite backtick-quoted words in `sql` into this quoter's marks.
    ///
    /// Single-quoted string literals are copied untouched.
    pub fn replace(&self, sql: &str) -> String {
        let Some((prefix, suffix)) = self.marks else {
            return sql.to_string();
        };

        let mut out = String::with_capacity(sql.len());
        let mut in_literal = false;
        let mut rest = sql;
        while let Some(c) = rest.chars().next() {
            if !in_literal && c == COMMON_QUOTE_MARK {
                let body = &rest[c.len_utf8()..];
                let end = body.find(COMMON_QUOTE_MARK).unwrap_or(body.len());
                let word = &body[..end];
                let quoted = self.is_reserved(word);
                if quoted {
                    out.push(prefix);
                }
                out.push_str(word);
                if quoted {
                    out.push(suffix);
                }
                rest = body.get(end + 1..).unwrap_or("");
            } else {
                if c == '\'' {
                    in_literal = !in_literal;
                }
                out.push(c);
                rest = &rest[c.len_utf8()..];
            }
        }
        out
    }
}

impl Default for Quoter {
    fn default() -> Self {
        Self::common()
    }
}

fn strip_marks(word: &str, prefix: char, suffix: char) -> Option<&str> {
    let inner = word.strip_prefix(prefix)?;
    inner.strip_suffix(suffix)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn brackets() -> Quoter {
        Quoter::new('[', ']', always_reserve)
    }

    #[test]
    fn test_always_quote_to() {
        let q = brackets();
        let cases = [
            ("[mytable]", "mytable"),
            ("[mytable]", "`mytable`"),
            ("[mytable]", "[mytable]"),
            (r#"["mytable"]"#, r#""mytable""#),
            ("[mytable].*", "[mytable].*"),
            ("[myschema].[mytable]", "myschema.mytable"),
            ("[myschema].[mytable]", "`myschema`.mytable"),
            ("[myschema].[mytable]", "myschema.`mytable`"),
            ("[myschema].[mytable]", "`myschema`.`mytable`"),
            ("[myschema].[mytable]", "[myschema].mytable"),
            ("[myschema].[mytable]", "myschema.[mytable]"),
            ("[myschema].[mytable]", "[myschema].[mytable]"),
            (r#"["myschema].[mytable"]"#, r#""myschema.mytable""#),
            ("[message_user] AS [sender]", "`message_user` AS `sender`"),
            ("[myschema].[mytable] AS [table]", "myschema.mytable AS table"),
            ("[mytable]", " mytable"),
            ("[mytable]", "  mytable  "),
            (
                "[table] AS [t] use index ([myindex])",
                "`table` AS `t` use index (`myindex`)",
            ),
            (
                "[table] AS [t] use index ([myindex])",
                "`table` AS `t`    use    index    (`myindex`)    ",
            ),
            (
                "[table] AS [t] force index ([myindex])",
                "table AS t    force    index    (myindex)    ",
            ),
        ];
        for (expected, value) in cases {
            assert_eq!(q.quote(value).unwrap(), expected, "quoting {value:?}");
        }
    }

    #[test]
    fn test_reserved_only_quote_to() {
        let q = Quoter::new('[', ']', |w| w == "mytable");
        let cases = [
            ("[mytable]", "mytable"),
            ("[mytable]", "`mytable`"),
            ("[mytable].*", "[mytable].*"),
            (r#""mytable""#, r#""mytable""#),
            ("myschema.[mytable]", "myschema.mytable"),
            ("myschema.[mytable]", "[myschema].[mytable]"),
            ("message_user AS sender", "`message_user` AS `sender`"),
            ("myschema.[mytable] AS table", "myschema.mytable AS table"),
        ];
        for (expected, value) in cases {
            assert_eq!(q.quote(value).unwrap(), expected, "quoting {value:?}");
        }
    }

    #[test]
    fn test_never_quote_to() {
        let q = Quoter::new('[', ']', always_no_reserve);
        assert_eq!(q.quote("[mytable].*").unwrap(), "mytable.*");
        assert_eq!(q.quote("`myschema`.`mytable`").unwrap(), "myschema.mytable");
        assert_eq!(
            q.quote("`message_user` AS `sender`").unwrap(),
            "message_user AS sender"
        );
    }

    #[test]
    fn test_empty_quoter_writes_raw() {
        let q = Quoter::empty();
        assert_eq!(q.quote("`a`.b").unwrap(), "a.b");
        assert_eq!(q.replace("SELECT `a`"), "SELECT `a`");
        assert_eq!(q.trim("`a`"), "`a`");
    }

    #[test]
    fn test_unparsable_identifier_is_error() {
        let q = brackets();
        assert!(matches!(q.quote("a b c"), Err(Error::Quote(_))));
        assert!(matches!(q.quote(""), Err(Error::Quote(_))));
        assert!(matches!(q.quote("a.b.c"), Err(Error::Quote(_))));
    }

    #[test]
    fn test_join_and_strings() {
        let q = brackets();
        assert_eq!(q.join(&["a", " b"], ",").unwrap(), "[a],[b]");
        assert_eq!(q.join(&["a.*", " b.c"], ",").unwrap(), "[a].*,[b].[c]");
        assert_eq!(q.join(&["f1", "f2", "f3"], ", ").unwrap(), "[f1], [f2], [f3]");
        let q = q.with_reserved(always_no_reserve);
        assert_eq!(q.join(&["f1", "f2", "f3"], ", ").unwrap(), "f1, f2, f3");

        let quoted = brackets().strings(&["f1", "f2", "t3.f3", "t4.*"]).unwrap();
        assert_eq!(quoted, vec!["[f1]", "[f2]", "[t3].[f3]", "[t4].*"]);
    }

    #[test]
    fn test_trim() {
        let q = brackets();
        for (src, dst) in [
            ("[table_name]", "table_name"),
            ("[schema].[table_name]", "schema.table_name"),
        ] {
            assert_eq!(Quoter::common().trim(src), src);
            assert_eq!(q.trim(src), dst);
        }
        assert_eq!(q.trim("["), "[");
    }

    #[test]
    fn test_replace() {
        let q = brackets();
        let cases = [
            (
                "SELECT `COLUMN_NAME` FROM `INFORMATION_SCHEMA`.`COLUMNS` WHERE `TABLE_SCHEMA` = ? AND `TABLE_NAME` = ? AND `COLUMN_NAME` = ?",
                "SELECT [COLUMN_NAME] FROM [INFORMATION_SCHEMA].[COLUMNS] WHERE [TABLE_SCHEMA] = ? AND [TABLE_NAME] = ? AND [COLUMN_NAME] = ?",
            ),
            (
                "SELECT 'abc```test```''', `a` FROM b",
                "SELECT 'abc```test```''', [a] FROM b",
            ),
            (
                "UPDATE table SET `a` = ~ `a`, `b`='abc`'",
                "UPDATE table SET [a] = ~ [a], [b]='abc`'",
            ),
            (
                "INSERT INTO `insert_where` (`height`,`name`,`repo_id`,`width`,`index`) SELECT $1,$2,$3,$4,coalesce(MAX(`index`),0)+1 FROM `insert_where` WHERE (`repo_id`=$5)",
                "INSERT INTO [insert_where] ([height],[name],[repo_id],[width],[index]) SELECT $1,$2,$3,$4,coalesce(MAX([index]),0)+1 FROM [insert_where] WHERE ([repo_id]=$5)",
            ),
        ];
        for (source, expected) in cases {
            assert_eq!(q.replace(source), expected);
        }
    }

    #[test]
    fn test_replace_unterminated_backtick() {
        assert_eq!(brackets().replace("SELECT `a"), "SELECT [a]");
    }

    #[test]
    fn test_quote_trim_quote_is_idempotent() {
        let quoters = [
            brackets(),
            Quoter::common(),
            Quoter::new('"', '"', always_reserve),
            Quoter::new('"', '"', |w| w.eq_ignore_ascii_case("user")),
        ];
        let idents = ["mytable", "user", "myschema.mytable", "`a`.`b`", "t.*", "user.name"];
        for q in quoters {
            for ident in idents {
                let once = q.quote(ident).unwrap();
                let again = q.quote(&q.trim(&once)).unwrap();
                assert_eq!(again, once, "{ident:?} with {q:?}");
            }
        }
    }
}
