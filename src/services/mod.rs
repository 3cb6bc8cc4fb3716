//! Services Layer
//!
//! Business logic that needs the database: the persisted borrowing workflow,
//! notifications and sweeps. Handlers and the CLI both call into these.

pub mod borrowing_service;
pub mod notification_service;
pub mod sweep_service;

pub use borrowing_service::{
    ApproveRequest, BorrowRequest, BorrowingDetails, BorrowingFilter, BorrowingService,
    IssueRequest, LibraryStats, RejectRequest,
};
pub use notification_service::{
    NotificationDraft, NotificationKind, NotificationService, UnreadCount,
};
pub use sweep_service::{SweepReport, SweepService};
