//! Typed errors: registration problems, domain failures and the REJECT outcomes of a request.

use crate::service::validation::Violation;
use thiserror::Error;

/// Problems found while registering a resource. Raised once at startup, never per request.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("duplicate base path: {0}")]
    DuplicateBasePath(String),
    #[error("invalid base path '{0}': must start with '/' and not end with '/'")]
    InvalidBasePath(String),
    #[error("scope key '{key}' of {base_path} is marked as omitted")]
    OmittedScopeKey { base_path: String, key: String },
    #[error("scope key 'id' of {0} is reserved for the path id")]
    ReservedScopeKey(String),
    #[error("invalid pattern for field '{field}': {source}")]
    InvalidPattern {
        field: String,
        #[source]
        source: regex::Error,
    },
    #[error("invalid date format '{format}' for field '{field}'")]
    InvalidDateFormat { field: String, format: String },
    #[error("invalid declaration: {0}")]
    Declaration(String),
    #[error("config load: {0}")]
    Load(String),
}

/// Failures raised by guards or by the store. Every variant maps to an exception name that is
/// reported to the client as-is.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DomainError {
    #[error("Request body entity's id field is expected to be be null.")]
    BodyIdIsNotNull,
    #[error("Request body entity's id field is expected to be empty or to match id path parameter.")]
    BodyIdDoesNotMatchPath,
    #[error("No Rows Updated")]
    NoRowsUpdated,
    #[error("No Rows Deleted")]
    NoRowsDeleted,
    #[error("{message}")]
    Storage { code: String, message: String },
}

impl DomainError {
    /// Symbolic name reported in the `exception` field.
    pub fn kind(&self) -> &str {
        match self {
            DomainError::BodyIdIsNotNull => "BodyIdIsNotNullException",
            DomainError::BodyIdDoesNotMatchPath => "BodyIdDoesNotMatchPathException",
            DomainError::NoRowsUpdated => "NoRowsUpdatedError",
            DomainError::NoRowsDeleted => "NoRowsDeletedError",
            DomainError::Storage { code, .. } => code,
        }
    }

    pub fn storage(code: impl Into<String>, message: impl Into<String>) -> Self {
        DomainError::Storage {
            code: code.into(),
            message: message.into(),
        }
    }
}

impl From<sqlx::Error> for DomainError {
    fn from(e: sqlx::Error) -> Self {
        let code = match &e {
            sqlx::Error::Database(db) => db.code().map(|c| c.into_owned()),
            _ => None,
        };
        DomainError::Storage {
            code: code.unwrap_or_else(|| "DatabaseError".to_string()),
            message: e.to_string(),
        }
    }
}

/// Every way a request can end without a success body.
#[derive(Debug)]
pub enum Rejection {
    /// The operation is disabled for the resource. 403, empty body.
    Forbidden,
    /// Single-entity lookup matched nothing. 404, empty body.
    NotFound,
    /// Guard or store failure. 400, error body unless disabled by options.
    Domain(DomainError),
    /// Payload failed validation. 400, violations body.
    Invalid(Vec<Violation>),
}

impl From<DomainError> for Rejection {
    fn from(e: DomainError) -> Self {
        Rejection::Domain(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds() {
        assert_eq!("BodyIdIsNotNullException", DomainError::BodyIdIsNotNull.kind());
        assert_eq!("BodyIdDoesNotMatchPathException", DomainError::BodyIdDoesNotMatchPath.kind());
        assert_eq!("23503", DomainError::storage("23503", "fk violation").kind());
        assert_eq!("fk violation", DomainError::storage("23503", "fk violation").to_string());
    }
}
