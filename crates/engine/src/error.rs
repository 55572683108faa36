//! The module contains the errors the engine can throw.
//!
//! Validation errors ([`KeyNotFound`], [`InsufficientFunds`], [`Forbidden`],
//! [`Overpayment`]) are raised before any write happens, so the surrounding
//! database transaction is dropped and nothing is persisted.
//!
//! [`Conflict`] is internal to the balance update path: the transaction macro
//! retries the unit of work when it sees it.
//!
//!  [`KeyNotFound`]: EngineError::KeyNotFound
//!  [`InsufficientFunds`]: EngineError::InsufficientFunds
//!  [`Forbidden`]: EngineError::Forbidden
//!  [`Overpayment`]: EngineError::Overpayment
//!  [`Conflict`]: EngineError::Conflict
use sea_orm::DbErr;
use thiserror::Error;

/// Engine custom errors.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("\"{0}\" key not found!")]
    KeyNotFound(String),
    #[error("Insufficient funds: {0}")]
    InsufficientFunds(String),
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error("Overpayment: {0}")]
    Overpayment(String),
    #[error("Classification failed: {0}")]
    ClassificationFailed(String),
    #[error("Referenced entity: {0}")]
    ReferencedEntity(String),
    #[error("Already transferred: {0}")]
    AlreadyTransferred(String),
    #[error("\"{0}\" already present!")]
    ExistingKey(String),
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),
    #[error("Invalid name: {0}")]
    InvalidName(String),
    #[error("Concurrent update: {0}")]
    Conflict(String),
    #[error(transparent)]
    Database(#[from] DbErr),
}

impl EngineError {
    /// Whether the unit of work that produced this error may be retried as a
    /// whole.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}

impl PartialEq for EngineError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::KeyNotFound(a), Self::KeyNotFound(b)) => a == b,
            (Self::InsufficientFunds(a), Self::InsufficientFunds(b)) => a == b,
            (Self::Forbidden(a), Self::Forbidden(b)) => a == b,
            (Self::Overpayment(a), Self::Overpayment(b)) => a == b,
            (Self::ClassificationFailed(a), Self::ClassificationFailed(b)) => a == b,
            (Self::ReferencedEntity(a), Self::ReferencedEntity(b)) => a == b,
            (Self::AlreadyTransferred(a), Self::AlreadyTransferred(b)) => a == b,
            (Self::ExistingKey(a), Self::ExistingKey(b)) => a == b,
            (Self::InvalidAmount(a), Self::InvalidAmount(b)) => a == b,
            (Self::InvalidName(a), Self::InvalidName(b)) => a == b,
            (Self::Conflict(a), Self::Conflict(b)) => a == b,
            (Self::Database(a), Self::Database(b)) => a.to_string() == b.to_string(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_conflicts_are_retryable() {
        assert!(EngineError::Conflict("fund".to_string()).is_retryable());
        assert!(!EngineError::InsufficientFunds("fund".to_string()).is_retryable());
        assert!(!EngineError::Database(DbErr::Custom("boom".to_string())).is_retryable());
    }

    #[test]
    fn database_errors_compare_by_message() {
        let a = EngineError::Database(DbErr::Custom("boom".to_string()));
        let b = EngineError::Database(DbErr::Custom("boom".to_string()));
        assert_eq!(a, b);
    }
}
