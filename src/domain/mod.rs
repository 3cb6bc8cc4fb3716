//! Domain layer - Pure business abstractions
//!
//! This layer contains NO framework dependencies (no SeaORM entities, no Axum).
//! The borrowing state machine, roles, trait definitions and domain error types.

pub mod borrowing;
pub mod errors;
pub mod push;
pub mod repositories;
pub mod roles;

pub use borrowing::{BorrowingEvent, BorrowingStatus, CopyStatus, LoanPolicy};
pub use errors::DomainError;
pub use push::{PushMessage, PushReport, PushSender};
pub use repositories::*;
pub use roles::{Action, Role};
