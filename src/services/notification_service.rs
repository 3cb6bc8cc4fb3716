//! Notification Service - in-app notification rows plus best-effort push delivery
//!
//! Rows are written inside the caller's transaction so a notification exists
//! exactly when its transition committed. Delivery is spawned after commit
//! and never fails or delays the caller.

use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Duration, NaiveDate, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::*;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::task::JoinSet;

use crate::domain::borrowing::DATE_FORMAT;
use crate::domain::{DomainError, PushMessage, PushSender};
use crate::models::notification::{self, Entity as Notification};
use crate::models::user_device::{self, Entity as UserDevice};

/// Screen the mobile client opens when a borrowing push is tapped
const BORROWS_SCREEN: &str = "MyBorrowsScreen";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationKind {
    BorrowRequested,
    BorrowApproved,
    BorrowRejected,
    BookIssued,
    ReturnConfirmed,
    FineIssued,
    DueReminder,
    OverdueAlert,
}

impl NotificationKind {
    pub const ALL: [NotificationKind; 8] = [
        NotificationKind::BorrowRequested,
        NotificationKind::BorrowApproved,
        NotificationKind::BorrowRejected,
        NotificationKind::BookIssued,
        NotificationKind::ReturnConfirmed,
        NotificationKind::FineIssued,
        NotificationKind::DueReminder,
        NotificationKind::OverdueAlert,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::BorrowRequested => "BORROW_REQUESTED",
            NotificationKind::BorrowApproved => "BORROW_APPROVED",
            NotificationKind::BorrowRejected => "BORROW_REJECTED",
            NotificationKind::BookIssued => "BOOK_ISSUED",
            NotificationKind::ReturnConfirmed => "RETURN_CONFIRMED",
            NotificationKind::FineIssued => "FINE_ISSUED",
            NotificationKind::DueReminder => "DUE_REMINDER",
            NotificationKind::OverdueAlert => "OVERDUE_ALERT",
        }
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NotificationKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_uppercase();
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == wanted)
            .ok_or_else(|| DomainError::Validation(format!("Unknown notification kind '{}'", s)))
    }
}

/// A notification about to be recorded
#[derive(Debug, Clone)]
pub struct NotificationDraft {
    pub recipient_id: i32,
    pub borrowing_id: Option<i32>,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
}

impl NotificationDraft {
    pub fn for_borrowing(
        recipient_id: i32,
        borrowing_id: i32,
        kind: NotificationKind,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            recipient_id,
            borrowing_id: Some(borrowing_id),
            kind,
            title: title.into(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct UnreadCount {
    pub unread: u64,
}

/// Looks up device tokens and hands messages to the push provider
#[derive(Clone)]
struct PushDelivery {
    db: DatabaseConnection,
    sender: Arc<dyn PushSender>,
}

pub struct NotificationService {
    db: DatabaseConnection,
    push: PushDelivery,
    in_flight: Mutex<JoinSet<()>>,
}

impl NotificationService {
    pub fn new(db: DatabaseConnection, sender: Arc<dyn PushSender>) -> Self {
        Self {
            push: PushDelivery {
                db: db.clone(),
                sender,
            },
            db,
            in_flight: Mutex::new(JoinSet::new()),
        }
    }

    /// Append a notification row on `conn`, usually the transition's transaction.
    pub async fn record<C: ConnectionTrait>(
        conn: &C,
        draft: NotificationDraft,
        at: DateTime<Utc>,
    ) -> Result<notification::Model, DomainError> {
        let row = notification::ActiveModel {
            recipient_id: Set(draft.recipient_id),
            borrowing_id: Set(draft.borrowing_id),
            kind: Set(draft.kind.as_str().to_string()),
            title: Set(draft.title),
            message: Set(draft.message),
            is_read: Set(false),
            created_at: Set(at.to_rfc3339()),
            ..Default::default()
        };

        Ok(row.insert(conn).await?)
    }

    /// Whether `kind` was already recorded for the borrowing on `day` (UTC).
    pub async fn exists_today<C: ConnectionTrait>(
        conn: &C,
        borrowing_id: i32,
        kind: NotificationKind,
        day: NaiveDate,
    ) -> Result<bool, DomainError> {
        let start = day.format(DATE_FORMAT).to_string();
        let end = (day + Duration::days(1)).format(DATE_FORMAT).to_string();

        let count = Notification::find()
            .filter(notification::Column::BorrowingId.eq(borrowing_id))
            .filter(notification::Column::Kind.eq(kind.as_str()))
            .filter(notification::Column::CreatedAt.gte(start))
            .filter(notification::Column::CreatedAt.lt(end))
            .count(conn)
            .await?;

        Ok(count > 0)
    }

    fn in_flight(&self) -> MutexGuard<'_, JoinSet<()>> {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Push committed notifications in the background.
    ///
    /// Failures are logged and swallowed.
    pub fn deliver(&self, notifications: Vec<notification::Model>) {
        if notifications.is_empty() {
            return;
        }

        let push = self.push.clone();
        let mut in_flight = self.in_flight();
        while in_flight.try_join_next().is_some() {}
        in_flight.spawn(async move {
            for notification in &notifications {
                if let Err(e) = push.deliver_one(notification).await {
                    tracing::warn!(
                        "Push delivery for notification {} failed: {}",
                        notification.id,
                        e
                    );
                }
            }
        });
    }

    /// Wait for every delivery spawned so far.
    pub async fn flush(&self) {
        let mut pending = std::mem::take(&mut *self.in_flight());
        while let Some(result) = pending.join_next().await {
            if let Err(e) = result {
                tracing::error!("Push delivery task failed: {}", e);
            }
        }
    }

    pub async fn list_for_user(
        &self,
        user_id: i32,
        unread_only: bool,
    ) -> Result<Vec<notification::Model>, DomainError> {
        let mut query = Notification::find().filter(notification::Column::RecipientId.eq(user_id));
        if unread_only {
            query = query.filter(notification::Column::IsRead.eq(false));
        }

        Ok(query
            .order_by_desc(notification::Column::CreatedAt)
            .order_by_desc(notification::Column::Id)
            .all(&self.db)
            .await?)
    }

    /// Only the recipient may mark a notification; others see it as missing.
    pub async fn mark_read(
        &self,
        user_id: i32,
        notification_id: i32,
    ) -> Result<notification::Model, DomainError> {
        let existing = Notification::find_by_id(notification_id)
            .filter(notification::Column::RecipientId.eq(user_id))
            .one(&self.db)
            .await?
            .ok_or_else(|| DomainError::not_found("Notification"))?;

        if existing.is_read {
            return Ok(existing);
        }

        let mut active: notification::ActiveModel = existing.into();
        active.is_read = Set(true);
        Ok(active.update(&self.db).await?)
    }

    pub async fn mark_all_read(&self, user_id: i32) -> Result<u64, DomainError> {
        let result = Notification::update_many()
            .col_expr(notification::Column::IsRead, Expr::value(true))
            .filter(notification::Column::RecipientId.eq(user_id))
            .filter(notification::Column::IsRead.eq(false))
            .exec(&self.db)
            .await?;

        Ok(result.rows_affected)
    }

    pub async fn clear_all(&self, user_id: i32) -> Result<u64, DomainError> {
        let result = Notification::delete_many()
            .filter(notification::Column::RecipientId.eq(user_id))
            .exec(&self.db)
            .await?;

        Ok(result.rows_affected)
    }

    pub async fn unread_count(&self, user_id: i32) -> Result<UnreadCount, DomainError> {
        let unread = Notification::find()
            .filter(notification::Column::RecipientId.eq(user_id))
            .filter(notification::Column::IsRead.eq(false))
            .count(&self.db)
            .await?;

        Ok(UnreadCount { unread })
    }
}

impl PushDelivery {
    async fn deliver_one(&self, notification: &notification::Model) -> Result<(), DomainError> {
        let tokens: Vec<String> = UserDevice::find()
            .filter(user_device::Column::UserId.eq(notification.recipient_id))
            .filter(user_device::Column::IsActive.eq(true))
            .all(&self.db)
            .await?
            .into_iter()
            .map(|d| d.device_token)
            .collect();

        if tokens.is_empty() {
            tracing::debug!(
                "User {} has no active device, notification {} stays in-app",
                notification.recipient_id,
                notification.id
            );
            return Ok(());
        }

        let message = PushMessage {
            tokens,
            title: notification.title.clone(),
            body: notification.message.clone(),
            data: json!({
                "screen": BORROWS_SCREEN,
                "borrowId": notification.borrowing_id,
                "kind": notification.kind,
                "message": notification.message,
            }),
        };

        let report = self.sender.send(&message).await?;
        tracing::info!(
            "Notification {} ({}) pushed to {} device(s)",
            notification.id,
            notification.kind,
            report.accepted
        );

        if !report.invalid_tokens.is_empty() {
            let result = UserDevice::update_many()
                .col_expr(user_device::Column::IsActive, Expr::value(false))
                .filter(user_device::Column::DeviceToken.is_in(report.invalid_tokens))
                .exec(&self.db)
                .await?;
            tracing::info!("Deactivated {} unregistered device(s)", result.rows_affected);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_parse_from_their_wire_names() {
        for kind in NotificationKind::ALL {
            assert_eq!(kind.as_str().parse::<NotificationKind>().unwrap(), kind);
        }
        assert_eq!(
            "due_reminder".parse::<NotificationKind>().unwrap(),
            NotificationKind::DueReminder
        );
        assert!("PARTY".parse::<NotificationKind>().is_err());
    }
}
