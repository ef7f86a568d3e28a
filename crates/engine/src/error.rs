//! The module contains the error the engine can throw.
//!
//! The errors are:
//!
//! - [`NotFound`] thrown when an account, transaction or user does not exist.
//! - [`Forbidden`] thrown when the user has no (or not enough) access to an account.
//! - [`Validation`] thrown when a command carries invalid input.
//! - [`InsufficientBalance`] thrown when a debit exceeds the available balance.
//! - [`Database`] wraps any storage failure.
//!
//!  [`NotFound`]: EngineError::NotFound
//!  [`Forbidden`]: EngineError::Forbidden
//!  [`Validation`]: EngineError::Validation
//!  [`InsufficientBalance`]: EngineError::InsufficientBalance
//!  [`Database`]: EngineError::Database
use sea_orm::DbErr;
use thiserror::Error;

/// Engine custom errors.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("\"{0}\" not found!")]
    NotFound(String),
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error("Invalid input: {0}")]
    Validation(String),
    #[error("Insufficient balance: {0}")]
    InsufficientBalance(String),
    #[error(transparent)]
    Database(#[from] DbErr),
}

impl EngineError {
    /// HTTP-like status code for the error kind.
    #[must_use]
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::NotFound(_) => 404,
            Self::Forbidden(_) => 403,
            Self::Validation(_) => 400,
            Self::InsufficientBalance(_) => 422,
            Self::Database(_) => 500,
        }
    }

    /// Only storage failures (e.g. a locked database) are worth retrying.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Database(_))
    }
}

impl PartialEq for EngineError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::NotFound(a), Self::NotFound(b)) => a == b,
            (Self::Forbidden(a), Self::Forbidden(b)) => a == b,
            (Self::Validation(a), Self::Validation(b)) => a == b,
            (Self::InsufficientBalance(a), Self::InsufficientBalance(b)) => a == b,
            (Self::Database(a), Self::Database(b)) => a.to_string() == b.to_string(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_follow_error_kind() {
        assert_eq!(EngineError::NotFound("x".into()).status_code(), 404);
        assert_eq!(EngineError::Forbidden("x".into()).status_code(), 403);
        assert_eq!(EngineError::Validation("x".into()).status_code(), 400);
        assert_eq!(
            EngineError::InsufficientBalance("x".into()).status_code(),
            422
        );
        assert_eq!(
            EngineError::Database(DbErr::Custom("boom".into())).status_code(),
            500
        );
    }

    #[test]
    fn only_database_errors_are_retryable() {
        assert!(EngineError::Database(DbErr::Custom("locked".into())).is_retryable());
        assert!(!EngineError::InsufficientBalance("x".into()).is_retryable());
    }
}
