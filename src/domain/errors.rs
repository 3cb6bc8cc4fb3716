//! Domain error types
//!
//! These errors are framework-agnostic and represent business-level failures.
//! The HTTP mapping lives in `api::error`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DomainError {
    /// Resource not found (the payload names the resource)
    #[error("{0} not found")]
    NotFound(String),
    /// Bad or missing input
    #[error("Validation error: {0}")]
    Validation(String),
    /// Missing or invalid credentials
    #[error("Authentication required")]
    Unauthorized,
    /// Authenticated caller lacks the role or ownership for the action
    #[error("Forbidden: {0}")]
    Forbidden(String),
    /// Operation conflicts with existing records (duplicates, open loans, no copies)
    #[error("{0}")]
    Conflict(String),
    /// Borrowing status does not accept the requested action
    #[error("Cannot {action} a borrowing in status {status}")]
    InvalidTransition {
        action: &'static str,
        status: &'static str,
    },
    /// Database/persistence error
    #[error("Database error: {0}")]
    Database(String),
    /// External service error
    #[error("External service error: {0}")]
    External(String),
    /// Generic internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl DomainError {
    pub fn not_found(what: &str) -> Self {
        DomainError::NotFound(what.to_string())
    }
}

// Conversion from SeaORM errors (used in infrastructure and service layers)
impl From<sea_orm::DbErr> for DomainError {
    fn from(e: sea_orm::DbErr) -> Self {
        DomainError::Database(e.to_string())
    }
}
