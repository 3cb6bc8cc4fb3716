//! Borrowing Service - persists the lifecycle defined in `domain::borrowing`
//!
//! Every transition is one transaction: the borrowing row is updated only if
//! it still has the status the transition was computed from, and a copy is
//! claimed only if it is still `Available`. The loser of a race sees zero
//! affected rows instead of double-lending a copy.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::*;
use serde::{Deserialize, Serialize};

use crate::domain::borrowing::{parse_date, parse_future_due_date, DATE_FORMAT};
use crate::domain::{
    Action, BorrowingEvent, BorrowingStatus, CopyStatus, DomainError, LoanPolicy,
};
use crate::infrastructure::auth::CurrentUser;
use crate::models::book::{self, Entity as Book};
use crate::models::borrowing::{self, open_status_values, Entity as Borrowing};
use crate::models::copy::{self, Entity as BookCopy};
use crate::models::user::{self, Entity as User};
use crate::services::notification_service::{
    NotificationDraft, NotificationKind, NotificationService,
};

/// Borrower's request for a title
#[derive(Debug, Clone, Deserialize)]
pub struct BorrowRequest {
    pub book_id: i32,
    /// Ask for a specific copy instead of the first free one
    pub copy_id: Option<i32>,
    /// `YYYY-MM-DD`, strictly after today
    pub due_date: Option<String>,
    pub notes: Option<String>,
}

/// Staff lending a copy over the desk
#[derive(Debug, Clone, Deserialize)]
pub struct IssueRequest {
    pub copy_id: i32,
    pub borrower_id: i32,
    pub due_date: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApproveRequest {
    pub due_date: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RejectRequest {
    pub reason: Option<String>,
}

/// Filter parameters for listing borrowings
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BorrowingFilter {
    pub status: Option<String>,
    pub user_id: Option<i32>,
    pub book_id: Option<i32>,
}

/// Borrowing with the book and borrower it refers to
#[derive(Debug, Clone, Serialize)]
pub struct BorrowingDetails {
    #[serde(flatten)]
    pub borrowing: borrowing::Model,
    pub book_id: Option<i32>,
    pub book_title: Option<String>,
    pub copy_code: Option<String>,
    pub borrower_username: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct LibraryStats {
    pub books: u64,
    pub copies: u64,
    pub available_copies: u64,
    pub requested: u64,
    pub active: u64,
    pub overdue: u64,
    pub total_fines: f64,
}

pub struct BorrowingService {
    db: DatabaseConnection,
    policy: LoanPolicy,
    notifications: Arc<NotificationService>,
}

pub(crate) fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

async fn load_borrowing<C: ConnectionTrait>(
    conn: &C,
    id: i32,
) -> Result<borrowing::Model, DomainError> {
    Borrowing::find_by_id(id)
        .one(conn)
        .await?
        .ok_or_else(|| DomainError::not_found("Borrowing"))
}

pub(crate) async fn load_copy_with_book<C: ConnectionTrait>(
    conn: &C,
    copy_id: i32,
) -> Result<(copy::Model, book::Model), DomainError> {
    match BookCopy::find_by_id(copy_id)
        .find_also_related(Book)
        .one(conn)
        .await?
    {
        Some((copy, Some(book))) => Ok((copy, book)),
        Some((copy, None)) => Err(DomainError::Internal(format!(
            "copy {} has no book",
            copy.id
        ))),
        None => Err(DomainError::not_found("Copy")),
    }
}

/// Write `changes` to the borrowing only if it is still in `from`.
///
/// Zero affected rows means another request resolved it first.
pub(crate) async fn update_if_status<C: ConnectionTrait>(
    conn: &C,
    id: i32,
    from: BorrowingStatus,
    changes: borrowing::ActiveModel,
) -> Result<borrowing::Model, DomainError> {
    let result = Borrowing::update_many()
        .set(changes)
        .filter(borrowing::Column::Id.eq(id))
        .filter(borrowing::Column::Status.eq(from.as_str()))
        .exec(conn)
        .await?;

    if result.rows_affected == 0 {
        return Err(DomainError::Conflict(format!(
            "Borrowing {} is no longer {}",
            id, from
        )));
    }

    load_borrowing(conn, id).await
}

pub(crate) fn status_change(next: BorrowingStatus, now: &DateTime<Utc>) -> borrowing::ActiveModel {
    borrowing::ActiveModel {
        status: Set(next.as_str().to_string()),
        updated_at: Set(now.to_rfc3339()),
        ..Default::default()
    }
}

/// `Available -> On Loan`, true if this call won the copy.
async fn claim_copy<C: ConnectionTrait>(
    conn: &C,
    copy_id: i32,
    now: &DateTime<Utc>,
) -> Result<bool, DomainError> {
    let result = BookCopy::update_many()
        .col_expr(copy::Column::Status, Expr::value(CopyStatus::OnLoan.as_str()))
        .col_expr(copy::Column::UpdatedAt, Expr::value(now.to_rfc3339()))
        .filter(copy::Column::Id.eq(copy_id))
        .filter(copy::Column::Status.eq(CopyStatus::Available.as_str()))
        .exec(conn)
        .await?;

    Ok(result.rows_affected == 1)
}

async fn set_copy_status<C: ConnectionTrait>(
    conn: &C,
    copy_id: i32,
    status: CopyStatus,
    now: &DateTime<Utc>,
) -> Result<(), DomainError> {
    BookCopy::update_many()
        .col_expr(copy::Column::Status, Expr::value(status.as_str()))
        .col_expr(copy::Column::UpdatedAt, Expr::value(now.to_rfc3339()))
        .filter(copy::Column::Id.eq(copy_id))
        .exec(conn)
        .await?;
    Ok(())
}

async fn count_loan<C: ConnectionTrait>(conn: &C, book_id: i32) -> Result<(), DomainError> {
    Book::update_many()
        .col_expr(
            book::Column::TotalBorrows,
            Expr::col(book::Column::TotalBorrows).add(1),
        )
        .filter(book::Column::Id.eq(book_id))
        .exec(conn)
        .await?;
    Ok(())
}

/// Open borrowings the user already holds for any copy of the book
async fn has_open_borrowing_for_book<C: ConnectionTrait>(
    conn: &C,
    borrower_id: i32,
    book_id: i32,
) -> Result<bool, DomainError> {
    let count = Borrowing::find()
        .inner_join(BookCopy)
        .filter(copy::Column::BookId.eq(book_id))
        .filter(borrowing::Column::BorrowerId.eq(borrower_id))
        .filter(borrowing::Column::Status.is_in(open_status_values()))
        .count(conn)
        .await?;
    Ok(count > 0)
}

async fn copy_has_open_borrowing<C: ConnectionTrait>(
    conn: &C,
    copy_id: i32,
) -> Result<bool, DomainError> {
    let count = Borrowing::find()
        .filter(borrowing::Column::BookCopyId.eq(copy_id))
        .filter(borrowing::Column::Status.is_in(open_status_values()))
        .count(conn)
        .await?;
    Ok(count > 0)
}

/// First Available copy of the book that no open borrowing points at
async fn find_free_copy<C: ConnectionTrait>(
    conn: &C,
    book_id: i32,
) -> Result<Option<copy::Model>, DomainError> {
    let held = Borrowing::find()
        .select_only()
        .column(borrowing::Column::BookCopyId)
        .filter(borrowing::Column::Status.is_in(open_status_values()))
        .into_query();

    Ok(BookCopy::find()
        .filter(copy::Column::BookId.eq(book_id))
        .filter(copy::Column::Status.eq(CopyStatus::Available.as_str()))
        .filter(copy::Column::Id.not_in_subquery(held))
        .order_by_asc(copy::Column::Id)
        .one(conn)
        .await?)
}

impl BorrowingService {
    pub fn new(
        db: DatabaseConnection,
        policy: LoanPolicy,
        notifications: Arc<NotificationService>,
    ) -> Self {
        Self {
            db,
            policy,
            notifications,
        }
    }

    /// Borrower asks for a book. The copy stays Available until approval.
    pub async fn request(
        &self,
        user: &CurrentUser,
        input: BorrowRequest,
        now: DateTime<Utc>,
    ) -> Result<borrowing::Model, DomainError> {
        user.require(Action::RequestBorrowing)?;
        let today = now.date_naive();
        let due_date = match input.due_date.as_deref() {
            Some(raw) => Some(parse_future_due_date(raw, today)?),
            None => None,
        };

        let txn = self.db.begin().await?;

        let book = Book::find_by_id(input.book_id)
            .one(&txn)
            .await?
            .ok_or_else(|| DomainError::not_found("Book"))?;

        if has_open_borrowing_for_book(&txn, user.id, book.id).await? {
            return Err(DomainError::Conflict(format!(
                "You already have an open borrowing for '{}'",
                book.title
            )));
        }

        let copy = match input.copy_id {
            Some(copy_id) => {
                let (copy, _) = load_copy_with_book(&txn, copy_id).await?;
                if copy.book_id != book.id {
                    return Err(DomainError::Validation(format!(
                        "Copy {} is not a copy of '{}'",
                        copy.copy_id, book.title
                    )));
                }
                if copy.copy_status()? != CopyStatus::Available
                    || copy_has_open_borrowing(&txn, copy.id).await?
                {
                    return Err(DomainError::Conflict(format!(
                        "Copy {} is not available",
                        copy.copy_id
                    )));
                }
                copy
            }
            None => find_free_copy(&txn, book.id).await?.ok_or_else(|| {
                tracing::warn!("Request for '{}' refused: no copies available", book.title);
                DomainError::Conflict("No copies available".to_string())
            })?,
        };

        let created = borrowing::ActiveModel {
            book_copy_id: Set(copy.id),
            borrower_id: Set(user.id),
            status: Set(BorrowingStatus::Requested.as_str().to_string()),
            request_date: Set(now.to_rfc3339()),
            issue_date: Set(None),
            due_date: Set(due_date.map(format_date)),
            return_date: Set(None),
            fine_amount: Set(0.0),
            rejection_reason: Set(None),
            notes: Set(input.notes),
            updated_at: Set(now.to_rfc3339()),
            ..Default::default()
        }
        .insert(&txn)
        .await?;

        let notification = NotificationService::record(
            &txn,
            NotificationDraft::for_borrowing(
                user.id,
                created.id,
                NotificationKind::BorrowRequested,
                "Borrow Request Received",
                format!(
                    "Your request to borrow '{}' is waiting for a librarian.",
                    book.title
                ),
            ),
            now,
        )
        .await?;

        txn.commit().await?;
        tracing::info!(
            "Borrowing {} requested by {} for copy {}",
            created.id,
            user.username,
            copy.copy_id
        );
        self.notifications.deliver(vec![notification]);

        Ok(created)
    }

    /// Staff lend a copy directly, skipping the request step.
    pub async fn issue(
        &self,
        user: &CurrentUser,
        input: IssueRequest,
        now: DateTime<Utc>,
    ) -> Result<borrowing::Model, DomainError> {
        user.require(Action::IssueBorrowing)?;
        let today = now.date_naive();
        let due_date = match input.due_date.as_deref() {
            Some(raw) => parse_future_due_date(raw, today)?,
            None => self.policy.default_due_date(today),
        };

        let txn = self.db.begin().await?;

        let borrower = User::find_by_id(input.borrower_id)
            .one(&txn)
            .await?
            .ok_or_else(|| DomainError::not_found("Borrower"))?;
        let (copy, book) = load_copy_with_book(&txn, input.copy_id).await?;

        if has_open_borrowing_for_book(&txn, borrower.id, book.id).await? {
            return Err(DomainError::Conflict(format!(
                "{} already has an open borrowing for '{}'",
                borrower.username, book.title
            )));
        }
        if copy_has_open_borrowing(&txn, copy.id).await? {
            return Err(DomainError::Conflict(format!(
                "Copy {} is held by another borrowing",
                copy.copy_id
            )));
        }
        if !claim_copy(&txn, copy.id, &now).await? {
            return Err(DomainError::Conflict(format!(
                "Copy {} is not available",
                copy.copy_id
            )));
        }

        let created = borrowing::ActiveModel {
            book_copy_id: Set(copy.id),
            borrower_id: Set(borrower.id),
            status: Set(BorrowingStatus::Active.as_str().to_string()),
            request_date: Set(now.to_rfc3339()),
            issue_date: Set(Some(now.to_rfc3339())),
            due_date: Set(Some(format_date(due_date))),
            return_date: Set(None),
            fine_amount: Set(0.0),
            rejection_reason: Set(None),
            notes: Set(input.notes),
            updated_at: Set(now.to_rfc3339()),
            ..Default::default()
        }
        .insert(&txn)
        .await?;
        count_loan(&txn, book.id).await?;

        let notification = NotificationService::record(
            &txn,
            NotificationDraft::for_borrowing(
                borrower.id,
                created.id,
                NotificationKind::BookIssued,
                "Book Issued",
                format!(
                    "'{}' has been issued to you. Please return it by {}.",
                    book.title,
                    format_date(due_date)
                ),
            ),
            now,
        )
        .await?;

        txn.commit().await?;
        tracing::info!(
            "Copy {} issued to {} by {} (due {})",
            copy.copy_id,
            borrower.username,
            user.username,
            due_date
        );
        self.notifications.deliver(vec![notification]);

        Ok(created)
    }

    /// Approve a request. When the copy was taken in the meantime the
    /// request is rejected instead and returned as such.
    pub async fn approve(
        &self,
        user: &CurrentUser,
        id: i32,
        input: ApproveRequest,
        now: DateTime<Utc>,
    ) -> Result<borrowing::Model, DomainError> {
        user.require(Action::ApproveBorrowing)?;
        let today = now.date_naive();
        let requested_due = match input.due_date.as_deref() {
            Some(raw) => Some(parse_future_due_date(raw, today)?),
            None => None,
        };

        let txn = self.db.begin().await?;

        let current = load_borrowing(&txn, id).await?;
        let from = current.borrowing_status()?;
        let next = from.transition(BorrowingEvent::Approve)?;
        let (copy, book) = load_copy_with_book(&txn, current.book_copy_id).await?;

        if !claim_copy(&txn, copy.id, &now).await? {
            let rejected = from.transition(BorrowingEvent::Reject)?;
            let reason = format!("Copy {} is no longer available", copy.copy_id);
            let mut changes = status_change(rejected, &now);
            changes.rejection_reason = Set(Some(reason.clone()));
            let updated = update_if_status(&txn, id, from, changes).await?;

            let notification = NotificationService::record(
                &txn,
                NotificationDraft::for_borrowing(
                    updated.borrower_id,
                    updated.id,
                    NotificationKind::BorrowRejected,
                    "Borrow Request Rejected",
                    format!(
                        "Your request to borrow '{}' was rejected: {}.",
                        book.title, reason
                    ),
                ),
                now,
            )
            .await?;

            txn.commit().await?;
            tracing::warn!("Borrowing {} auto-rejected: {}", id, reason);
            self.notifications.deliver(vec![notification]);
            return Ok(updated);
        }

        // A due date chosen at request time is kept unless it has passed
        let stored_due = match current.due_date.as_deref() {
            Some(raw) => Some(parse_date(raw)?).filter(|due| *due > today),
            None => None,
        };
        let due_date = requested_due
            .or(stored_due)
            .unwrap_or_else(|| self.policy.default_due_date(today));

        let mut changes = status_change(next, &now);
        changes.issue_date = Set(Some(now.to_rfc3339()));
        changes.due_date = Set(Some(format_date(due_date)));
        let updated = update_if_status(&txn, id, from, changes).await?;
        count_loan(&txn, book.id).await?;

        let notification = NotificationService::record(
            &txn,
            NotificationDraft::for_borrowing(
                updated.borrower_id,
                updated.id,
                NotificationKind::BorrowApproved,
                "Borrow Request Approved!",
                format!(
                    "Your request to borrow '{}' has been approved by the librarian. Due back {}.",
                    book.title,
                    format_date(due_date)
                ),
            ),
            now,
        )
        .await?;

        txn.commit().await?;
        tracing::info!(
            "Borrowing {} approved by {}, copy {} on loan until {}",
            id,
            user.username,
            copy.copy_id,
            due_date
        );
        self.notifications.deliver(vec![notification]);

        Ok(updated)
    }

    pub async fn reject(
        &self,
        user: &CurrentUser,
        id: i32,
        input: RejectRequest,
        now: DateTime<Utc>,
    ) -> Result<borrowing::Model, DomainError> {
        user.require(Action::RejectBorrowing)?;
        let reason = input
            .reason
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty());

        let txn = self.db.begin().await?;

        let current = load_borrowing(&txn, id).await?;
        let from = current.borrowing_status()?;
        let next = from.transition(BorrowingEvent::Reject)?;
        let (_, book) = load_copy_with_book(&txn, current.book_copy_id).await?;

        let mut changes = status_change(next, &now);
        changes.rejection_reason = Set(reason.clone());
        let updated = update_if_status(&txn, id, from, changes).await?;

        let message = match &reason {
            Some(reason) => format!(
                "Your request to borrow '{}' was rejected: {}.",
                book.title, reason
            ),
            None => format!("Your request to borrow '{}' was rejected.", book.title),
        };
        let notification = NotificationService::record(
            &txn,
            NotificationDraft::for_borrowing(
                updated.borrower_id,
                updated.id,
                NotificationKind::BorrowRejected,
                "Borrow Request Rejected",
                message,
            ),
            now,
        )
        .await?;

        txn.commit().await?;
        tracing::info!("Borrowing {} rejected by {}", id, user.username);
        self.notifications.deliver(vec![notification]);

        Ok(updated)
    }

    /// Only the borrower who made the request may withdraw it.
    pub async fn cancel(
        &self,
        user: &CurrentUser,
        id: i32,
        now: DateTime<Utc>,
    ) -> Result<borrowing::Model, DomainError> {
        user.require(Action::CancelOwnRequest)?;

        let txn = self.db.begin().await?;

        let current = load_borrowing(&txn, id).await?;
        if current.borrower_id != user.id {
            tracing::warn!(
                "{} tried to cancel borrowing {} owned by user {}",
                user.username,
                id,
                current.borrower_id
            );
            return Err(DomainError::Forbidden(
                "only the borrower who made the request can cancel it".to_string(),
            ));
        }

        let from = current.borrowing_status()?;
        let next = from.transition(BorrowingEvent::Cancel)?;
        let updated = update_if_status(&txn, id, from, status_change(next, &now)).await?;

        txn.commit().await?;
        tracing::info!("Borrowing {} cancelled by {}", id, user.username);

        Ok(updated)
    }

    /// Close a loan. Late returns are fined per whole overdue day.
    pub async fn return_borrowing(
        &self,
        user: &CurrentUser,
        id: i32,
        now: DateTime<Utc>,
    ) -> Result<borrowing::Model, DomainError> {
        user.require(Action::ReturnBorrowing)?;
        let today = now.date_naive();

        let txn = self.db.begin().await?;

        let current = load_borrowing(&txn, id).await?;
        let from = current.borrowing_status()?;
        let assessment = match current.due_date.as_deref() {
            Some(raw) => Some(self.policy.assess_return(parse_date(raw)?, today)),
            None => None,
        };
        let late = assessment.as_ref().is_some_and(|a| a.overdue_days > 0);
        let next = from.transition(BorrowingEvent::Return { late })?;
        let fine = assessment.as_ref().map_or(0.0, |a| a.fine_amount);
        let (copy, book) = load_copy_with_book(&txn, current.book_copy_id).await?;

        let mut changes = status_change(next, &now);
        changes.return_date = Set(Some(now.to_rfc3339()));
        changes.fine_amount = Set(fine);
        let updated = update_if_status(&txn, id, from, changes).await?;
        if let Some(status) = next.copy_status() {
            set_copy_status(&txn, copy.id, status, &now).await?;
        }

        let draft = if fine > 0.0 {
            let days = assessment.as_ref().map_or(0, |a| a.overdue_days);
            NotificationDraft::for_borrowing(
                updated.borrower_id,
                updated.id,
                NotificationKind::FineIssued,
                "Late Return Fine",
                format!(
                    "'{}' was returned {} day(s) late. A fine of {:.2} has been issued.",
                    book.title, days, fine
                ),
            )
        } else {
            NotificationDraft::for_borrowing(
                updated.borrower_id,
                updated.id,
                NotificationKind::ReturnConfirmed,
                "Return Confirmed",
                format!("Thank you for returning '{}'.", book.title),
            )
        };
        let notification = NotificationService::record(&txn, draft, now).await?;

        txn.commit().await?;
        tracing::info!(
            "Borrowing {} closed as {} (fine {:.2}), copy {} back on the shelf",
            id,
            next,
            fine,
            copy.copy_id
        );
        self.notifications.deliver(vec![notification]);

        Ok(updated)
    }

    pub async fn mark_lost(
        &self,
        user: &CurrentUser,
        id: i32,
        now: DateTime<Utc>,
    ) -> Result<borrowing::Model, DomainError> {
        user.require(Action::MarkLost)?;

        let txn = self.db.begin().await?;

        let current = load_borrowing(&txn, id).await?;
        let from = current.borrowing_status()?;
        let next = from.transition(BorrowingEvent::MarkLost)?;
        let (copy, book) = load_copy_with_book(&txn, current.book_copy_id).await?;
        let fine = self.policy.lost_book_fee;

        let mut changes = status_change(next, &now);
        changes.return_date = Set(Some(now.to_rfc3339()));
        changes.fine_amount = Set(fine);
        let updated = update_if_status(&txn, id, from, changes).await?;
        if let Some(status) = next.copy_status() {
            set_copy_status(&txn, copy.id, status, &now).await?;
        }

        let notification = NotificationService::record(
            &txn,
            NotificationDraft::for_borrowing(
                updated.borrower_id,
                updated.id,
                NotificationKind::FineIssued,
                "Lost Book Fee",
                format!(
                    "'{}' has been marked as lost. A fee of {:.2} has been issued.",
                    book.title, fine
                ),
            ),
            now,
        )
        .await?;

        txn.commit().await?;
        tracing::info!("Borrowing {} marked lost, copy {} written off", id, copy.copy_id);
        self.notifications.deliver(vec![notification]);

        Ok(updated)
    }

    /// Staff see every borrowing; borrowers only their own.
    pub async fn list(
        &self,
        user: &CurrentUser,
        filter: BorrowingFilter,
    ) -> Result<Vec<BorrowingDetails>, DomainError> {
        let mut condition = Condition::all();

        let user_id = if user.role.can(Action::ViewAllBorrowings) {
            filter.user_id
        } else {
            Some(user.id)
        };
        if let Some(user_id) = user_id {
            condition = condition.add(borrowing::Column::BorrowerId.eq(user_id));
        }

        if let Some(status) = filter.status.as_deref() {
            let status: BorrowingStatus = status.parse()?;
            condition = condition.add(borrowing::Column::Status.eq(status.as_str()));
        }

        if let Some(book_id) = filter.book_id {
            let copies = BookCopy::find()
                .select_only()
                .column(copy::Column::Id)
                .filter(copy::Column::BookId.eq(book_id))
                .into_query();
            condition = condition.add(borrowing::Column::BookCopyId.in_subquery(copies));
        }

        let borrowings = Borrowing::find()
            .filter(condition)
            .order_by_desc(borrowing::Column::RequestDate)
            .order_by_desc(borrowing::Column::Id)
            .all(&self.db)
            .await?;

        self.with_details(borrowings).await
    }

    pub async fn get(&self, user: &CurrentUser, id: i32) -> Result<BorrowingDetails, DomainError> {
        let found = load_borrowing(&self.db, id).await?;
        if found.borrower_id != user.id && !user.role.can(Action::ViewAllBorrowings) {
            return Err(DomainError::Forbidden(
                "borrowing belongs to another user".to_string(),
            ));
        }

        self.with_details(vec![found])
            .await?
            .pop()
            .ok_or_else(|| DomainError::not_found("Borrowing"))
    }

    async fn with_details(
        &self,
        borrowings: Vec<borrowing::Model>,
    ) -> Result<Vec<BorrowingDetails>, DomainError> {
        let copy_ids: Vec<i32> = borrowings.iter().map(|b| b.book_copy_id).collect();
        let user_ids: Vec<i32> = borrowings.iter().map(|b| b.borrower_id).collect();

        let mut copy_map: HashMap<i32, (copy::Model, Option<book::Model>)> = HashMap::new();
        let mut user_map: HashMap<i32, String> = HashMap::new();

        if !copy_ids.is_empty() {
            let copies = BookCopy::find()
                .filter(copy::Column::Id.is_in(copy_ids))
                .find_also_related(Book)
                .all(&self.db)
                .await?;
            for (copy, book) in copies {
                copy_map.insert(copy.id, (copy, book));
            }

            let users = User::find()
                .filter(user::Column::Id.is_in(user_ids))
                .all(&self.db)
                .await?;
            for u in users {
                user_map.insert(u.id, u.username);
            }
        }

        Ok(borrowings
            .into_iter()
            .map(|b| {
                let entry = copy_map.get(&b.book_copy_id);
                let book = entry.and_then(|(_, book)| book.as_ref());
                BorrowingDetails {
                    book_id: book.map(|bk| bk.id),
                    book_title: book.map(|bk| bk.title.clone()),
                    copy_code: entry.map(|(c, _)| c.copy_id.clone()),
                    borrower_username: user_map.get(&b.borrower_id).cloned(),
                    borrowing: b,
                }
            })
            .collect())
    }

    /// Circulation counters for the staff dashboard
    pub async fn stats(&self, user: &CurrentUser) -> Result<LibraryStats, DomainError> {
        user.require(Action::ViewAllBorrowings)?;

        let count_status = |status: BorrowingStatus| {
            Borrowing::find()
                .filter(borrowing::Column::Status.eq(status.as_str()))
                .count(&self.db)
        };

        let total_fines: Option<f64> = Borrowing::find()
            .select_only()
            .column_as(borrowing::Column::FineAmount.sum(), "total")
            .into_tuple()
            .one(&self.db)
            .await?
            .flatten();

        Ok(LibraryStats {
            books: Book::find().count(&self.db).await?,
            copies: BookCopy::find().count(&self.db).await?,
            available_copies: BookCopy::find()
                .filter(copy::Column::Status.eq(CopyStatus::Available.as_str()))
                .count(&self.db)
                .await?,
            requested: count_status(BorrowingStatus::Requested).await?,
            active: count_status(BorrowingStatus::Active).await?,
            overdue: count_status(BorrowingStatus::Overdue).await?,
            total_fines: total_fines.unwrap_or(0.0),
        })
    }
}
