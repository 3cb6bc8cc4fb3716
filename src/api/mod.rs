pub mod auth;
pub mod author;
pub mod books;
pub mod borrowing;
pub mod category;
pub mod copy;
pub mod error;
pub mod health;
pub mod notification;
pub mod user;

use axum::{
    Router,
    routing::{get, post, put},
};

use crate::infrastructure::AppState;

pub fn api_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/auth/login", post(auth::login))
        .route("/auth/register", post(auth::register))
        .route("/auth/me", get(auth::get_me).put(auth::update_me))
        .route("/auth/password", put(auth::change_password))
        .route("/auth/check-username", get(auth::check_username))
        .route("/auth/check-email", get(auth::check_email))
        .route("/users", get(user::list_users).post(user::create_user))
        .route("/devices", post(user::register_device))
        .route("/books", get(books::list_books).post(books::create_book))
        .route(
            "/books/:id",
            get(books::get_book)
                .put(books::update_book)
                .delete(books::delete_book),
        )
        .route(
            "/books/:id/favorite",
            post(books::add_favorite).delete(books::remove_favorite),
        )
        .route("/books/:id/copies", get(copy::get_book_copies))
        .route("/books/:id/copies/batch", post(copy::create_copies_batch))
        .route(
            "/authors",
            get(author::list_authors).post(author::create_author),
        )
        .route(
            "/authors/:id",
            get(author::get_author)
                .put(author::update_author)
                .delete(author::delete_author),
        )
        .route(
            "/categories",
            get(category::list_categories).post(category::create_category),
        )
        .route(
            "/categories/:id",
            get(category::get_category)
                .put(category::update_category)
                .delete(category::delete_category),
        )
        .route("/copies", get(copy::list_copies).post(copy::create_copy))
        .route(
            "/copies/:id",
            get(copy::get_copy)
                .put(copy::update_copy)
                .delete(copy::delete_copy),
        )
        .route(
            "/borrowings",
            get(borrowing::list_borrowings).post(borrowing::request_borrowing),
        )
        .route("/borrowings/issue", post(borrowing::issue_borrowing))
        .route("/borrowings/:id", get(borrowing::get_borrowing))
        .route("/borrowings/:id/approve", post(borrowing::approve_borrowing))
        .route("/borrowings/:id/reject", post(borrowing::reject_borrowing))
        .route("/borrowings/:id/cancel", post(borrowing::cancel_borrowing))
        .route("/borrowings/:id/return", post(borrowing::return_borrowing))
        .route("/borrowings/:id/lost", post(borrowing::mark_lost))
        .route("/sweeps/reminders", post(borrowing::send_reminders))
        .route("/sweeps/overdue", post(borrowing::sweep_overdue))
        .route("/stats", get(borrowing::get_stats))
        .route(
            "/notifications",
            get(notification::list_notifications).delete(notification::clear_all),
        )
        .route("/notifications/unread-count", get(notification::unread_count))
        .route("/notifications/read-all", post(notification::mark_all_read))
        .route("/notifications/:id/read", post(notification::mark_read))
        .with_state(state)
}
