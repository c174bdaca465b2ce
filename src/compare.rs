// Cross-type comparison and LIKE pattern translation

use std::cmp::Ordering;

use regex::Regex;

use crate::error::{ErrorKind, QueryError};
use crate::value::Value;

/// Compare two values.
///
/// If either side is a number, both sides are coerced through their textual
/// form to 64-bit floats and compared numerically; when the other side does
/// not parse, comparison falls through to the textual forms.
pub fn compare(a: &Value, b: &Value) -> Ordering {
    if a.is_number() || b.is_number() {
        let left = a.to_text().parse::<f64>();
        let right = b.to_text().parse::<f64>();
        if let (Ok(left), Ok(right)) = (left, right) {
            if let Some(ordering) = left.partial_cmp(&right) {
                return ordering;
            }
        }
    }
    a.to_text().cmp(&b.to_text())
}

/// Evaluate a SQL LIKE pattern: `_` matches any single character, `%` any
/// run; both sides are lower-cased and the pattern is anchored.
pub fn like_match(value: &str, pattern: &str) -> Result<bool, QueryError> {
    let translated = pattern.to_lowercase().replace('_', ".").replace('%', ".*");
    let anchored = format!("^{}$", translated);
    let regex = Regex::new(&anchored).map_err(|e| {
        ErrorKind::ExpectationFailed.extend(format!("invalid LIKE pattern {}: {}", pattern, e))
    })?;
    Ok(regex.is_match(&value.to_lowercase()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_comparison() {
        assert_eq!(compare(&Value::from(1i64), &Value::from(2i64)), Ordering::Less);
        assert_eq!(compare(&Value::from(2.0), &Value::from(2i64)), Ordering::Equal);
        assert_eq!(compare(&Value::from(10i64), &Value::from(9i64)), Ordering::Greater);
    }

    #[test]
    fn test_number_against_numeric_text() {
        // A numeric string coerces: 10 > "9" numerically, not textually.
        assert_eq!(compare(&Value::from(10i64), &Value::from("9")), Ordering::Greater);
        assert_eq!(compare(&Value::from("2.5"), &Value::from(2.5)), Ordering::Equal);
    }

    #[test]
    fn test_number_against_plain_text_falls_back() {
        assert_eq!(compare(&Value::from(5i64), &Value::from("abc")), Ordering::Less);
    }

    #[test]
    fn test_textual_comparison() {
        assert_eq!(compare(&Value::from("a"), &Value::from("b")), Ordering::Less);
        assert_eq!(compare(&Value::from("b"), &Value::from("b")), Ordering::Equal);
        assert_eq!(
            compare(&Value::Bool(true), &Value::Bool(false)),
            Ordering::Greater
        );
        assert_eq!(compare(&Value::Null, &Value::Null), Ordering::Equal);
    }

    #[test]
    fn test_like_basics() {
        assert!(like_match("hello", "hello").unwrap());
        assert!(like_match("hello", "h_llo").unwrap());
        assert!(like_match("hello", "%llo").unwrap());
        assert!(like_match("hello", "he%").unwrap());
        assert!(like_match("hello", "%ell%").unwrap());
        assert!(!like_match("hello", "h_lo").unwrap());
    }

    #[test]
    fn test_like_is_case_insensitive() {
        assert!(like_match("HeLLo", "hello").unwrap());
        assert!(like_match("hello", "HEL%").unwrap());
    }

    #[test]
    fn test_like_is_anchored() {
        assert!(!like_match("hello world", "hello").unwrap());
        assert!(like_match("hello world", "hello%").unwrap());
    }

    #[test]
    fn test_like_wildcards_stay_wildcards() {
        // `%_%` requires at least one character and never consumes the
        // metacharacters literally.
        assert!(like_match("a", "%_%").unwrap());
        assert!(like_match("abc", "%_%").unwrap());
        assert!(!like_match("", "%_%").unwrap());
    }
}
