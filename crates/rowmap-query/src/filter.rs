//! Placeholder rewriting.

/// Replace every `?` outside single-quoted literals with `prefix` followed
/// by a running index starting at `start`.
pub fn convert_question_marks(sql: &str, prefix: &str, start: usize) -> String {
    let mut out = String::with_capacity(sql.len() + 8);
    let mut in_literal = false;
    let mut index = start;
    for c in sql.chars() {
        match c {
            '\'' => {
                in_literal = !in_literal;
                out.push(c);
            }
            '?' if !in_literal => {
                out.push_str(prefix);
                out.push_str(&index.to_string());
                index += 1;
            }
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escaped_quote_inside_literal() {
        let sql = "SELECT * FROM t WHERE a = 'it''s ?' AND b = ?";
        assert_eq!(
            convert_question_marks(sql, "$", 1),
            "SELECT * FROM t WHERE a = 'it''s ?' AND b = $1"
        );
    }

    #[test]
    fn test_custom_start() {
        assert_eq!(convert_question_marks("?,?", ":", 5), ":5,:6");
    }
}
