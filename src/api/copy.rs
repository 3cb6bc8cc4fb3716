//! Copy API handlers using repository pattern

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use serde_json::json;

use crate::api::error::ApiResult;
use crate::auth::CurrentUser;
use crate::domain::{
    Action, BatchCreateCopiesInput, CopyStatus, CreateCopyInput, DomainError, UpdateCopyInput,
};
use crate::infrastructure::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct CopyQuery {
    /// e.g. `Available`, `On Loan`
    pub status: Option<String>,
}

// List all copies with book details
pub async fn list_copies(
    State(state): State<AppState>,
    Query(query): Query<CopyQuery>,
) -> ApiResult<impl IntoResponse> {
    let status = match query.status.as_deref() {
        Some(raw) => Some(raw.parse::<CopyStatus>()?),
        None => None,
    };
    let result = state.copy_repo.find_all(status).await?;

    Ok(Json(json!({
        "copies": result.copies,
        "total": result.total
    })))
}

// Register a physical copy of a book
pub async fn create_copy(
    State(state): State<AppState>,
    current: CurrentUser,
    Json(input): Json<CreateCopyInput>,
) -> ApiResult<impl IntoResponse> {
    current.require(Action::ManageCatalog)?;

    let copy = state.copy_repo.create(input).await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "copy": copy,
            "message": "Copy created successfully"
        })),
    ))
}

// Register several copies of one book with generated ids
pub async fn create_copies_batch(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(book_id): Path<i32>,
    Json(input): Json<BatchCreateCopiesInput>,
) -> ApiResult<impl IntoResponse> {
    current.require(Action::ManageCatalog)?;

    let copies = state.copy_repo.create_batch(book_id, input).await?;
    let total = copies.len();

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "copies": copies,
            "total": total
        })),
    ))
}

pub async fn get_copy(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> ApiResult<impl IntoResponse> {
    let copy = state
        .copy_repo
        .find_by_id(id)
        .await?
        .ok_or_else(|| DomainError::not_found("Copy"))?;

    Ok(Json(json!({ "copy": copy })))
}

// Get copies of a specific book
pub async fn get_book_copies(
    State(state): State<AppState>,
    Path(book_id): Path<i32>,
) -> ApiResult<impl IntoResponse> {
    let result = state.copy_repo.find_by_book_id(book_id).await?;

    Ok(Json(json!({
        "copies": result.copies,
        "total": result.total
    })))
}

pub async fn update_copy(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<i32>,
    Json(input): Json<UpdateCopyInput>,
) -> ApiResult<impl IntoResponse> {
    current.require(Action::ManageCatalog)?;

    let copy = state.copy_repo.update(id, input).await?;

    Ok(Json(json!({
        "copy": copy,
        "message": "Copy updated successfully"
    })))
}

pub async fn delete_copy(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<i32>,
) -> ApiResult<impl IntoResponse> {
    current.require(Action::ManageCatalog)?;

    state.copy_repo.delete(id).await?;

    Ok(Json(json!({ "message": "Copy deleted successfully" })))
}
