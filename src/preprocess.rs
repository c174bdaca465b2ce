// Raw query-text rewrites applied before SQL parsing

use crate::error::{ErrorKind, QueryError};

/// Rewrite double-quoted strings to backtick-quoted identifiers.
///
/// Single-quoted and backtick-quoted spans are copied verbatim. Inside a
/// double-quoted span, `\"` emits a literal quote without terminating the
/// span. A trailing backslash fails.
pub fn double_quotes_to_backticks(input: &str) -> Result<String, QueryError> {
    let chars: Vec<char> = input.chars().collect();
    let mut out = String::with_capacity(input.len());
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '\'' => {
                out.push('\'');
                i += 1;
                while i < chars.len() {
                    let ch = chars[i];
                    out.push(ch);
                    i += 1;
                    if ch == '\\' {
                        if i == chars.len() {
                            return Err(ErrorKind::ExpectationFailed
                                .extend("trailing backslash in string literal"));
                        }
                        out.push(chars[i]);
                        i += 1;
                        continue;
                    }
                    if ch == '\'' {
                        break;
                    }
                }
            }
            '`' => {
                out.push('`');
                i += 1;
                while i < chars.len() {
                    let ch = chars[i];
                    out.push(ch);
                    i += 1;
                    if ch == '`' {
                        break;
                    }
                }
            }
            '"' => {
                out.push('`');
                i += 1;
                while i < chars.len() {
                    let ch = chars[i];
                    if ch == '"' {
                        out.push('`');
                        i += 1;
                        break;
                    }
                    if ch == '\\' {
                        if i + 1 == chars.len() {
                            return Err(ErrorKind::ExpectationFailed
                                .extend("trailing backslash in quoted identifier"));
                        }
                        if chars[i + 1] == '"' {
                            out.push('"');
                            i += 2;
                            continue;
                        }
                    }
                    out.push(ch);
                    i += 1;
                }
            }
            ch => {
                out.push(ch);
                i += 1;
            }
        }
    }
    Ok(out)
}

/// Rewrite idiomatic array literals `[a, b, c]` to `MAKE_ARRAY(a, b, c)`
/// calls of the array-builder function (`ARRAY(...)` itself is reserved by
/// the SQL parser for array subqueries).
///
/// Brackets inside single-quoted, double-quoted or backtick-quoted spans are
/// ignored (backticks hold selector text, which uses `[..]` for dimensions).
/// Nested arrays rewrite inside-out; unbalanced brackets fail.
pub fn rewrite_idiomatic_arrays(input: &str) -> Result<String, QueryError> {
    let chars: Vec<char> = input.chars().collect();
    let mut out = String::with_capacity(input.len());
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            quote @ ('\'' | '"' | '`') => {
                out.push(chars[i]);
                i += 1;
                while i < chars.len() {
                    let ch = chars[i];
                    out.push(ch);
                    i += 1;
                    if ch == '\\' && quote != '`' {
                        if i == chars.len() {
                            return Err(ErrorKind::ExpectationFailed
                                .extend("trailing backslash in quoted span"));
                        }
                        out.push(chars[i]);
                        i += 1;
                        continue;
                    }
                    if ch == quote {
                        break;
                    }
                }
            }
            '[' => {
                let (body, next) = read_bracket_body(&chars, i)?;
                out.push_str("MAKE_ARRAY(");
                out.push_str(&rewrite_idiomatic_arrays(&body)?);
                out.push(')');
                i = next;
            }
            ']' => {
                return Err(ErrorKind::ExpectationFailed.extend("unmatched ] in query"));
            }
            ch => {
                out.push(ch);
                i += 1;
            }
        }
    }
    Ok(out)
}

/// Read the body of the bracket starting at `open`, honoring nesting and
/// quoted spans; returns the body and the index just past the closing `]`.
fn read_bracket_body(chars: &[char], open: usize) -> Result<(String, usize), QueryError> {
    let mut depth = 1;
    let mut i = open + 1;
    let mut body = String::new();
    while i < chars.len() {
        let ch = chars[i];
        match ch {
            quote @ ('\'' | '"' | '`') => {
                body.push(ch);
                i += 1;
                while i < chars.len() {
                    let inner = chars[i];
                    body.push(inner);
                    i += 1;
                    if inner == '\\' && quote != '`' {
                        if i == chars.len() {
                            return Err(ErrorKind::ExpectationFailed
                                .extend("trailing backslash in quoted span"));
                        }
                        body.push(chars[i]);
                        i += 1;
                        continue;
                    }
                    if inner == quote {
                        break;
                    }
                }
            }
            '[' => {
                depth += 1;
                body.push(ch);
                i += 1;
            }
            ']' => {
                depth -= 1;
                i += 1;
                if depth == 0 {
                    return Ok((body, i));
                }
                body.push(ch);
            }
            _ => {
                body.push(ch);
                i += 1;
            }
        }
    }
    Err(ErrorKind::ExpectationFailed.extend("unmatched [ in query"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_double_quotes_become_backticks() {
        assert_eq!(
            double_quotes_to_backticks(r#"He said, "Hello, World!""#).unwrap(),
            "He said, `Hello, World!`"
        );
        assert_eq!(double_quotes_to_backticks("").unwrap(), "");
    }

    #[test]
    fn test_single_quotes_pass_verbatim() {
        assert_eq!(
            double_quotes_to_backticks(r#"SELECT 'a "quoted" b' FROM "t""#).unwrap(),
            r#"SELECT 'a "quoted" b' FROM `t`"#
        );
    }

    #[test]
    fn test_backticks_pass_verbatim() {
        assert_eq!(
            double_quotes_to_backticks("SELECT `x` FROM t").unwrap(),
            "SELECT `x` FROM t"
        );
    }

    #[test]
    fn test_escaped_quote_inside_double_quotes() {
        assert_eq!(
            double_quotes_to_backticks(r#""a\"b""#).unwrap(),
            r#"`a"b`"#
        );
    }

    #[test]
    fn test_trailing_backslash_fails() {
        assert!(double_quotes_to_backticks("'abc\\").is_err());
    }

    #[test]
    fn test_idiomatic_array_rewrite() {
        assert_eq!(
            rewrite_idiomatic_arrays("some text [1,2,3] more text").unwrap(),
            "some text MAKE_ARRAY(1,2,3) more text"
        );
        assert_eq!(
            rewrite_idiomatic_arrays("some text without indices").unwrap(),
            "some text without indices"
        );
    }

    #[test]
    fn test_nested_arrays_rewrite_inside_out() {
        assert_eq!(
            rewrite_idiomatic_arrays("[1, [2, 3], 4]").unwrap(),
            "MAKE_ARRAY(1, MAKE_ARRAY(2, 3), 4)"
        );
        assert_eq!(
            rewrite_idiomatic_arrays("[[1, 2], [3, [4, 5]]]").unwrap(),
            "MAKE_ARRAY(MAKE_ARRAY(1, 2), MAKE_ARRAY(3, MAKE_ARRAY(4, 5)))"
        );
    }

    #[test]
    fn test_brackets_inside_quotes_are_ignored() {
        assert_eq!(
            rewrite_idiomatic_arrays("SELECT '[1,2]' FROM t").unwrap(),
            "SELECT '[1,2]' FROM t"
        );
        assert_eq!(
            rewrite_idiomatic_arrays("SELECT x FROM `data[0]`").unwrap(),
            "SELECT x FROM `data[0]`"
        );
    }

    #[test]
    fn test_unbalanced_brackets_fail() {
        assert!(rewrite_idiomatic_arrays("[1, 2]]").is_err());
        assert!(rewrite_idiomatic_arrays("[1, 2").is_err());
    }
}
