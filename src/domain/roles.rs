//! Roles and the permission table

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::DomainError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Borrower,
    Librarian,
    Admin,
}

/// Everything a caller may attempt that is gated by role
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    RequestBorrowing,
    /// Also requires owning the record
    CancelOwnRequest,
    ManageOwnNotifications,
    /// Profile, password and favorite books
    ManageOwnAccount,
    ApproveBorrowing,
    RejectBorrowing,
    IssueBorrowing,
    ReturnBorrowing,
    MarkLost,
    ViewAllBorrowings,
    ManageCatalog,
    RunSweeps,
    ManageUsers,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Borrower => "borrower",
            Role::Librarian => "librarian",
            Role::Admin => "admin",
        }
    }

    pub fn is_staff(&self) -> bool {
        matches!(self, Role::Librarian | Role::Admin)
    }

    pub fn can(&self, action: Action) -> bool {
        use Action::*;

        match action {
            RequestBorrowing | CancelOwnRequest | ManageOwnNotifications | ManageOwnAccount => {
                true
            }
            ApproveBorrowing | RejectBorrowing | IssueBorrowing | ReturnBorrowing | MarkLost
            | ViewAllBorrowings | ManageCatalog | RunSweeps => self.is_staff(),
            ManageUsers => *self == Role::Admin,
        }
    }

    /// Permission check as a `Result` for use with `?`
    pub fn require(&self, action: Action) -> Result<(), DomainError> {
        if self.can(action) {
            Ok(())
        } else {
            Err(DomainError::Forbidden(format!(
                "role '{}' may not perform {:?}",
                self.as_str(),
                action
            )))
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "borrower" | "user" => Ok(Role::Borrower),
            "librarian" => Ok(Role::Librarian),
            "admin" => Ok(Role::Admin),
            other => Err(DomainError::Validation(format!("Unknown role '{}'", other))),
        }
    }
}
