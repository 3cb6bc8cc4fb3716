//! Author API handlers using repository pattern

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
use crate::domain::{Action, AuthorInput, DomainError};
use crate::infrastructure::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct AuthorQuery {
    /// Name contains
    pub search: Option<String>,
}

pub async fn list_authors(
    State(state): State<AppState>,
    Query(query): Query<AuthorQuery>,
) -> ApiResult<impl IntoResponse> {
    let authors = state.author_repo.find_all(query.search).await?;
    let total = authors.len();

    Ok(Json(json!({ "authors": authors, "total": total })))
}

pub async fn get_author(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> ApiResult<impl IntoResponse> {
    let author = state
        .author_repo
        .find_by_id(id)
        .await?
        .ok_or_else(|| DomainError::not_found("Author"))?;

    Ok(Json(json!({ "author": author })))
}

pub async fn create_author(
    State(state): State<AppState>,
    current: CurrentUser,
    Json(input): Json<AuthorInput>,
) -> ApiResult<impl IntoResponse> {
    current.require(Action::ManageCatalog)?;

    let author = state.author_repo.create(input).await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "author": author,
            "message": "Author created successfully"
        })),
    ))
}

pub async fn update_author(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<i32>,
    Json(input): Json<AuthorInput>,
) -> ApiResult<impl IntoResponse> {
    current.require(Action::ManageCatalog)?;

    let author = state.author_repo.update(id, input).await?;

    Ok(Json(json!({ "author": author })))
}

pub async fn delete_author(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<i32>,
) -> ApiResult<impl IntoResponse> {
    current.require(Action::ManageCatalog)?;

    state.author_repo.delete(id).await?;

    Ok(Json(json!({ "message": "Author deleted successfully" })))
}
