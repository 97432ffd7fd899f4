///
/// Engine error types.
///
/// One enum for every failure the engine reports: argument errors raised
/// before any driver call, driver failures carrying the driver's own
/// state/native code/message, lifecycle (context) errors, allocation
/// failures and configuration problems.
///

use thiserror::Error;

use crate::statement::StatementId;

#[derive(Debug, Error)]
pub enum OdbxError {
    #[error("Type error: expected {expected}, found {found}")]
    Type { expected: &'static str, found: String },

    #[error("Domain error: {found} is not a valid {domain}")]
    Domain { domain: &'static str, found: String },

    #[error("Existence error: no {kind} {name}")]
    Existence { kind: &'static str, name: String },

    #[error("Permission error: cannot {action} {kind} {name}")]
    Permission {
        action: &'static str,
        kind: &'static str,
        name: String,
    },

    #[error("Representation error: {0}")]
    Representation(&'static str),

    #[error("Resource error: {0}")]
    Resource(&'static str),

    #[error("Context error: {state}: {detail}")]
    Context { state: &'static str, detail: String },

    #[error("[{state}] ({native}) {message}")]
    Driver {
        state: String,
        native: i32,
        message: String,
    },

    #[error("Statement {0} was already freed")]
    AlreadyFreed(StatementId),

    #[error("Column count mismatch: {declared} types given, result has {actual} columns")]
    ColumnCountMismatch { declared: usize, actual: usize },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, OdbxError>;

impl OdbxError {
    pub(crate) fn type_error(expected: &'static str, found: impl std::fmt::Display) -> Self {
        OdbxError::Type {
            expected,
            found: found.to_string(),
        }
    }

    pub(crate) fn domain(domain: &'static str, found: impl std::fmt::Display) -> Self {
        OdbxError::Domain {
            domain,
            found: found.to_string(),
        }
    }

    pub(crate) fn context(state: &'static str, detail: impl std::fmt::Display) -> Self {
        OdbxError::Context {
            state,
            detail: detail.to_string(),
        }
    }

    /// The SQLSTATE of a driver error.
    pub fn sql_state(&self) -> Option<&str> {
        match self {
            OdbxError::Driver { state, .. } => Some(state),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_messages() {
        let err = OdbxError::type_error("32 bit integer", "12345678901");
        assert!(err.to_string().contains("expected 32 bit integer"));

        let err = OdbxError::Driver {
            state: "42S02".to_string(),
            native: 1,
            message: "no such table: t".to_string(),
        };
        assert_eq!(err.to_string(), "[42S02] (1) no such table: t");
        assert_eq!(err.sql_state(), Some("42S02"));

        let err = OdbxError::AlreadyFreed(StatementId(3));
        assert!(err.to_string().contains("already freed"));

        let err = OdbxError::ColumnCountMismatch { declared: 2, actual: 3 };
        assert!(err.to_string().contains("2 types given"));
    }
}
