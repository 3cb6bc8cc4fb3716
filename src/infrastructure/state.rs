//! Application state containing repositories and shared resources

use sea_orm::DatabaseConnection;
use std::sync::Arc;

use crate::domain::{
    AuthorRepository, BookRepository, CategoryRepository, CopyRepository, DomainError, PushSender,
};
use crate::infrastructure::config::Config;
use crate::infrastructure::push::{DisabledPushSender, ExpoPushSender};
use crate::infrastructure::{
    SeaOrmAuthorRepository, SeaOrmBookRepository, SeaOrmCategoryRepository, SeaOrmCopyRepository,
};
use crate::services::{BorrowingService, NotificationService, SweepService};

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    db: DatabaseConnection,
    pub config: Arc<Config>,
    pub book_repo: Arc<dyn BookRepository>,
    pub author_repo: Arc<dyn AuthorRepository>,
    pub category_repo: Arc<dyn CategoryRepository>,
    pub copy_repo: Arc<dyn CopyRepository>,
    pub borrowings: Arc<BorrowingService>,
    pub notifications: Arc<NotificationService>,
    pub sweeps: Arc<SweepService>,
}

impl AppState {
    /// Create a new AppState, pushing through Expo unless `PUSH_ENABLED=false`
    pub fn new(db: DatabaseConnection, config: Config) -> Result<Self, DomainError> {
        let sender: Arc<dyn PushSender> = if config.push_enabled {
            Arc::new(ExpoPushSender::new(config.expo_push_url.clone())?)
        } else {
            Arc::new(DisabledPushSender)
        };

        Ok(Self::with_push_sender(db, config, sender))
    }

    /// Create an AppState with an explicit push sender
    pub fn with_push_sender(
        db: DatabaseConnection,
        config: Config,
        sender: Arc<dyn PushSender>,
    ) -> Self {
        let notifications = Arc::new(NotificationService::new(db.clone(), sender));
        let borrowings = Arc::new(BorrowingService::new(
            db.clone(),
            config.loan_policy(),
            notifications.clone(),
        ));
        let sweeps = Arc::new(SweepService::new(db.clone(), notifications.clone()));

        Self {
            book_repo: Arc::new(SeaOrmBookRepository::new(db.clone())),
            author_repo: Arc::new(SeaOrmAuthorRepository::new(db.clone())),
            category_repo: Arc::new(SeaOrmCategoryRepository::new(db.clone())),
            copy_repo: Arc::new(SeaOrmCopyRepository::new(db.clone())),
            borrowings,
            notifications,
            sweeps,
            config: Arc::new(config),
            db,
        }
    }

    pub fn db(&self) -> &DatabaseConnection {
        &self.db
    }
}

// Implement FromRef to allow extracting DatabaseConnection from AppState
impl axum::extract::FromRef<AppState> for DatabaseConnection {
    fn from_ref(state: &AppState) -> Self {
        state.db.clone()
    }
}
