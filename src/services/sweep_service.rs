//! Sweeps - batch passes run from the CLI or by staff
//!
//! Both sweeps are idempotent per day: a borrowing gets at most one
//! `DUE_REMINDER` and one `OVERDUE_ALERT` per UTC date, however often they run.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use sea_orm::*;
use serde::Serialize;

use crate::domain::{Action, BorrowingEvent, BorrowingStatus, DomainError};
use crate::infrastructure::auth::CurrentUser;
use crate::models::borrowing::{self, Entity as Borrowing};
use crate::services::borrowing_service::{
    format_date, load_copy_with_book, status_change, update_if_status,
};
use crate::services::notification_service::{
    NotificationDraft, NotificationKind, NotificationService,
};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SweepReport {
    /// Borrowings that matched the sweep's criteria
    pub examined: usize,
    /// ACTIVE loans moved to OVERDUE
    pub marked_overdue: usize,
    /// Notifications recorded in this run
    pub notified: usize,
    /// Already notified today
    pub skipped: usize,
}

pub struct SweepService {
    db: DatabaseConnection,
    notifications: Arc<NotificationService>,
}

impl SweepService {
    pub fn new(db: DatabaseConnection, notifications: Arc<NotificationService>) -> Self {
        Self { db, notifications }
    }

    /// Staff-triggered variant of the CLI commands
    pub fn authorize(user: &CurrentUser) -> Result<(), DomainError> {
        user.require(Action::RunSweeps)
    }

    /// Remind borrowers of ACTIVE loans due between today and `days` from now.
    pub async fn send_due_reminders(
        &self,
        days: i64,
        now: DateTime<Utc>,
    ) -> Result<SweepReport, DomainError> {
        if days <= 0 {
            return Err(DomainError::Validation(
                "days must be a positive number".to_string(),
            ));
        }

        let today = now.date_naive();
        let window_end = today + Duration::days(days);

        let due = Borrowing::find()
            .filter(borrowing::Column::Status.eq(BorrowingStatus::Active.as_str()))
            .filter(borrowing::Column::DueDate.gte(format_date(today)))
            .filter(borrowing::Column::DueDate.lte(format_date(window_end)))
            .order_by_asc(borrowing::Column::DueDate)
            .all(&self.db)
            .await?;

        let mut report = SweepReport {
            examined: due.len(),
            ..Default::default()
        };

        for loan in due {
            let txn = self.db.begin().await?;

            if NotificationService::exists_today(&txn, loan.id, NotificationKind::DueReminder, today)
                .await?
            {
                report.skipped += 1;
                continue;
            }

            let (_, book) = load_copy_with_book(&txn, loan.book_copy_id).await?;
            let due_date = loan.due_date.clone().unwrap_or_default();
            let notification = NotificationService::record(
                &txn,
                NotificationDraft::for_borrowing(
                    loan.borrower_id,
                    loan.id,
                    NotificationKind::DueReminder,
                    "Return Reminder",
                    format!("'{}' is due back on {}.", book.title, due_date),
                ),
                now,
            )
            .await?;
            txn.commit().await?;

            report.notified += 1;
            self.notifications.deliver(vec![notification]);
        }

        tracing::info!(
            "Due reminders: {} loan(s) due within {} day(s), {} reminded, {} already reminded today",
            report.examined,
            days,
            report.notified,
            report.skipped
        );

        Ok(report)
    }

    /// Move ACTIVE loans past their due date to OVERDUE and alert every
    /// overdue borrower once per day.
    pub async fn sweep_overdue(&self, now: DateTime<Utc>) -> Result<SweepReport, DomainError> {
        let today = now.date_naive();

        let late = Borrowing::find()
            .filter(
                Condition::any()
                    .add(
                        Condition::all()
                            .add(borrowing::Column::Status.eq(BorrowingStatus::Active.as_str()))
                            .add(borrowing::Column::DueDate.lt(format_date(today))),
                    )
                    .add(borrowing::Column::Status.eq(BorrowingStatus::Overdue.as_str())),
            )
            .order_by_asc(borrowing::Column::DueDate)
            .all(&self.db)
            .await?;

        let mut report = SweepReport {
            examined: late.len(),
            ..Default::default()
        };

        for loan in late {
            let txn = self.db.begin().await?;
            let status = loan.borrowing_status()?;

            if status == BorrowingStatus::Active {
                let next = status.transition(BorrowingEvent::MarkOverdue)?;
                match update_if_status(&txn, loan.id, status, status_change(next, &now)).await {
                    Ok(_) => report.marked_overdue += 1,
                    Err(DomainError::Conflict(msg)) => {
                        tracing::debug!("Skipping borrowing {}: {}", loan.id, msg);
                        continue;
                    }
                    Err(e) => return Err(e),
                }
            }

            if NotificationService::exists_today(&txn, loan.id, NotificationKind::OverdueAlert, today)
                .await?
            {
                txn.commit().await?;
                report.skipped += 1;
                continue;
            }

            let (_, book) = load_copy_with_book(&txn, loan.book_copy_id).await?;
            let due_date = loan.due_date.clone().unwrap_or_default();
            let notification = NotificationService::record(
                &txn,
                NotificationDraft::for_borrowing(
                    loan.borrower_id,
                    loan.id,
                    NotificationKind::OverdueAlert,
                    "Book Overdue",
                    format!(
                        "'{}' was due on {}. Please return it as soon as possible.",
                        book.title, due_date
                    ),
                ),
                now,
            )
            .await?;
            txn.commit().await?;

            report.notified += 1;
            self.notifications.deliver(vec![notification]);
        }

        tracing::info!(
            "Overdue sweep: {} late loan(s), {} newly overdue, {} alerted, {} already alerted today",
            report.examined,
            report.marked_overdue,
            report.notified,
            report.skipped
        );

        Ok(report)
    }
}
