// Error taxonomy
// A closed set of kinds, each optionally extended with a detail message.

use thiserror::Error;

/// The closed set of error kinds surfaced by query evaluation.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    #[error("invalid cast")]
    InvalidCast,

    #[error("undefined operator")]
    UndefinedOperator,

    #[error("invalid function name")]
    InvalidFunction,

    #[error("invalid type")]
    InvalidType,

    #[error("unsupported operation")]
    UnsupportedCase,

    #[error("key not found")]
    KeyNotFound,

    #[error("expectation failed")]
    ExpectationFailed,
}

/// An evaluation error: a kind plus an optional extension message,
/// rendered as `<kind>. <message>`.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{kind}{}", .message.as_ref().map(|m| format!(". {}", m)).unwrap_or_default())]
pub struct QueryError {
    pub kind: ErrorKind,
    pub message: Option<String>,
}

impl QueryError {
    pub fn new(kind: ErrorKind) -> Self {
        QueryError {
            kind,
            message: None,
        }
    }

    /// Append a further detail to an existing error.
    pub fn extend(mut self, message: impl Into<String>) -> Self {
        let message = message.into();
        self.message = Some(match self.message.take() {
            Some(existing) => format!("{}. {}", existing, message),
            None => message,
        });
        self
    }
}

impl ErrorKind {
    /// Build an error of this kind carrying a detail message.
    pub fn extend(self, message: impl Into<String>) -> QueryError {
        QueryError {
            kind: self,
            message: Some(message.into()),
        }
    }
}

impl From<ErrorKind> for QueryError {
    fn from(kind: ErrorKind) -> Self {
        QueryError::new(kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_kind_display() {
        assert_eq!(
            QueryError::new(ErrorKind::InvalidCast).to_string(),
            "invalid cast"
        );
        assert_eq!(
            QueryError::new(ErrorKind::ExpectationFailed).to_string(),
            "expectation failed"
        );
    }

    #[test]
    fn test_extended_display() {
        let err = ErrorKind::InvalidFunction.extend("no function named foo");
        assert_eq!(err.to_string(), "invalid function name. no function named foo");
    }

    #[test]
    fn test_extend_chains() {
        let err = ErrorKind::ExpectationFailed
            .extend("failed to read index")
            .extend("invalid index -1");
        assert_eq!(
            err.to_string(),
            "expectation failed. failed to read index. invalid index -1"
        );
    }

    #[test]
    fn test_kind_preserved() {
        let err = ErrorKind::KeyNotFound.extend("nowhere");
        assert_eq!(err.kind, ErrorKind::KeyNotFound);
    }
}
