//! Book API handlers using repository pattern
//!
//! Reads are public; writes need a staff role. Any signed-in user keeps
//! their own favorites.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde_json::json;

use crate::api::error::ApiResult;
use crate::auth::CurrentUser;
use crate::domain::{Action, BookFilter, BookInput, DomainError};
use crate::infrastructure::AppState;

#[utoipa::path(
    get,
    path = "/api/books",
    params(
        ("title" = Option<String>, Query, description = "Title contains"),
        ("author" = Option<String>, Query, description = "Author name contains"),
        ("category" = Option<String>, Query, description = "Category name contains"),
        ("publisher" = Option<String>, Query, description = "Publisher contains"),
        ("publication_year" = Option<i32>, Query, description = "Publication year"),
        ("isbn" = Option<String>, Query, description = "Exact ISBN"),
        ("q" = Option<String>, Query, description = "Free text over title, summary and ISBN"),
        ("is_favorite" = Option<bool>, Query, description = "Only the caller's favorites"),
        ("page" = Option<u64>, Query, description = "Zero-based page"),
        ("limit" = Option<u64>, Query, description = "Page size")
    ),
    responses(
        (status = 200, description = "Books with availability counts")
    )
)]
pub async fn list_books(
    State(state): State<AppState>,
    current: Option<CurrentUser>,
    Query(mut filter): Query<BookFilter>,
) -> ApiResult<impl IntoResponse> {
    filter.favorited_by = current.map(|user| user.id);
    let result = state.book_repo.find_all(filter).await?;

    Ok(Json(json!({
        "books": result.books,
        "total": result.total
    })))
}

#[utoipa::path(
    get,
    path = "/api/books/{id}",
    params(("id" = i32, Path, description = "Book id")),
    responses(
        (status = 200, description = "Book with availability counts"),
        (status = 404, description = "Book not found")
    )
)]
pub async fn get_book(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> ApiResult<impl IntoResponse> {
    let book = state
        .book_repo
        .find_by_id(id)
        .await?
        .ok_or_else(|| DomainError::not_found("Book"))?;

    Ok(Json(json!({ "book": book })))
}

#[utoipa::path(
    post,
    path = "/api/books",
    responses(
        (status = 201, description = "Book created"),
        (status = 400, description = "Invalid input"),
        (status = 409, description = "Duplicate ISBN")
    )
)]
pub async fn create_book(
    State(state): State<AppState>,
    current: CurrentUser,
    Json(input): Json<BookInput>,
) -> ApiResult<impl IntoResponse> {
    current.require(Action::ManageCatalog)?;

    let book = state.book_repo.create(input).await?;
    tracing::info!("Book {} '{}' created by {}", book.id, book.title, current.username);

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "book": book,
            "message": "Book created successfully"
        })),
    ))
}

#[utoipa::path(
    put,
    path = "/api/books/{id}",
    params(("id" = i32, Path, description = "Book id")),
    responses(
        (status = 200, description = "Book updated"),
        (status = 404, description = "Book not found")
    )
)]
pub async fn update_book(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<i32>,
    Json(input): Json<BookInput>,
) -> ApiResult<impl IntoResponse> {
    current.require(Action::ManageCatalog)?;

    let book = state.book_repo.update(id, input).await?;

    Ok(Json(json!({
        "book": book,
        "message": "Book updated successfully"
    })))
}

#[utoipa::path(
    delete,
    path = "/api/books/{id}",
    params(("id" = i32, Path, description = "Book id")),
    responses(
        (status = 200, description = "Book deleted"),
        (status = 404, description = "Book not found"),
        (status = 409, description = "Book has open borrowings")
    )
)]
pub async fn delete_book(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<i32>,
) -> ApiResult<impl IntoResponse> {
    current.require(Action::ManageCatalog)?;

    state.book_repo.delete(id).await?;
    tracing::info!("Book {} deleted by {}", id, current.username);

    Ok(Json(json!({ "message": "Book deleted successfully" })))
}

#[utoipa::path(
    post,
    path = "/api/books/{id}/favorite",
    params(("id" = i32, Path, description = "Book id")),
    responses(
        (status = 200, description = "Book added to the caller's favorites"),
        (status = 404, description = "Book not found")
    )
)]
pub async fn add_favorite(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<i32>,
) -> ApiResult<impl IntoResponse> {
    current.require(Action::ManageOwnAccount)?;

    let book = state.book_repo.add_favorite(id, current.id).await?;

    Ok(Json(json!({ "book": book })))
}

#[utoipa::path(
    delete,
    path = "/api/books/{id}/favorite",
    params(("id" = i32, Path, description = "Book id")),
    responses(
        (status = 204, description = "Book removed from the caller's favorites"),
        (status = 404, description = "Book not found")
    )
)]
pub async fn remove_favorite(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<i32>,
) -> ApiResult<impl IntoResponse> {
    current.require(Action::ManageOwnAccount)?;

    state.book_repo.remove_favorite(id, current.id).await?;

    Ok(StatusCode::NO_CONTENT)
}
