#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use lms::auth::CurrentUser;
use lms::config::Config;
use lms::db;
use lms::domain::{CopyStatus, DomainError, PushMessage, PushReport, PushSender, Role};
use lms::infrastructure::AppState;
use lms::models::{book, copy, notification, user, user_device};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};

/// Records every message instead of talking to a provider
#[derive(Default)]
pub struct RecordingPushSender {
    pub sent: Mutex<Vec<PushMessage>>,
    pub fail: bool,
}

#[async_trait]
impl PushSender for RecordingPushSender {
    async fn send(&self, message: &PushMessage) -> Result<PushReport, DomainError> {
        self.sent.lock().unwrap().push(message.clone());
        if self.fail {
            return Err(DomainError::External("provider unreachable".to_string()));
        }
        Ok(PushReport {
            accepted: message.tokens.len(),
            invalid_tokens: Vec::new(),
        })
    }
}

pub struct TestApp {
    pub state: AppState,
    pub push: Arc<RecordingPushSender>,
}

impl TestApp {
    pub fn db(&self) -> &DatabaseConnection {
        self.state.db()
    }
}

pub async fn setup_test_app() -> TestApp {
    setup_with_sender(RecordingPushSender::default()).await
}

pub async fn setup_with_sender(sender: RecordingPushSender) -> TestApp {
    let db = db::init_db("sqlite::memory:")
        .await
        .expect("Failed to init DB");
    let push = Arc::new(sender);
    let config = Config {
        push_enabled: false,
        ..Config::default()
    };
    let state = AppState::with_push_sender(db, config, push.clone());

    TestApp { state, push }
}

/// Noon UTC on the given day
pub fn at(year: i32, month: u32, day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, 12, 0, 0).unwrap()
}

pub async fn create_user(db: &DatabaseConnection, username: &str, role: Role) -> CurrentUser {
    let now = Utc::now().to_rfc3339();
    let created = user::ActiveModel {
        username: Set(username.to_string()),
        password_hash: Set("not-a-real-hash".to_string()),
        role: Set(role.as_str().to_string()),
        created_at: Set(now.clone()),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(db)
    .await
    .expect("Failed to create user");

    CurrentUser {
        id: created.id,
        username: created.username,
        role,
    }
}

pub async fn register_device(db: &DatabaseConnection, user_id: i32, token: &str) {
    user_device::ActiveModel {
        user_id: Set(user_id),
        device_token: Set(token.to_string()),
        is_active: Set(true),
        created_at: Set(Utc::now().to_rfc3339()),
        ..Default::default()
    }
    .insert(db)
    .await
    .expect("Failed to register device");
}

/// A book with `copies` Available copies; returns (book id, copy ids)
pub async fn create_book_with_copies(
    db: &DatabaseConnection,
    title: &str,
    copies: usize,
) -> (i32, Vec<i32>) {
    let now = Utc::now().to_rfc3339();
    let created = book::ActiveModel {
        title: Set(title.to_string()),
        total_borrows: Set(0),
        created_at: Set(now.clone()),
        updated_at: Set(now.clone()),
        ..Default::default()
    }
    .insert(db)
    .await
    .expect("Failed to create book");

    let mut copy_ids = Vec::new();
    for n in 0..copies {
        let c = copy::ActiveModel {
            book_id: Set(created.id),
            copy_id: Set(format!("{}-{}", created.id, n)),
            status: Set(CopyStatus::Available.as_str().to_string()),
            created_at: Set(now.clone()),
            updated_at: Set(now.clone()),
            ..Default::default()
        }
        .insert(db)
        .await
        .expect("Failed to create copy");
        copy_ids.push(c.id);
    }

    (created.id, copy_ids)
}

pub async fn copy_status(db: &DatabaseConnection, copy_id: i32) -> String {
    copy::Entity::find_by_id(copy_id)
        .one(db)
        .await
        .unwrap()
        .expect("copy exists")
        .status
}

pub async fn total_borrows(db: &DatabaseConnection, book_id: i32) -> i32 {
    book::Entity::find_by_id(book_id)
        .one(db)
        .await
        .unwrap()
        .expect("book exists")
        .total_borrows
}

pub async fn notification_kinds(db: &DatabaseConnection, borrowing_id: i32) -> Vec<String> {
    notification::Entity::find()
        .filter(notification::Column::BorrowingId.eq(borrowing_id))
        .order_by_asc(notification::Column::Id)
        .all(db)
        .await
        .unwrap()
        .into_iter()
        .map(|n| n.kind)
        .collect()
}
