//! Category API handlers

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde_json::json;

use crate::api::error::ApiResult;
use crate::auth::CurrentUser;
use crate::domain::{Action, CategoryInput, DomainError};
use crate::infrastructure::AppState;

pub async fn list_categories(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let categories = state.category_repo.find_all().await?;
    let total = categories.len();

    Ok(Json(json!({ "categories": categories, "total": total })))
}

pub async fn get_category(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> ApiResult<impl IntoResponse> {
    let category = state
        .category_repo
        .find_by_id(id)
        .await?
        .ok_or_else(|| DomainError::not_found("Category"))?;

    Ok(Json(json!({ "category": category })))
}

pub async fn create_category(
    State(state): State<AppState>,
    current: CurrentUser,
    Json(input): Json<CategoryInput>,
) -> ApiResult<impl IntoResponse> {
    current.require(Action::ManageCatalog)?;

    let category = state.category_repo.create(input).await?;

    Ok((StatusCode::CREATED, Json(json!({ "category": category }))))
}

pub async fn update_category(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<i32>,
    Json(input): Json<CategoryInput>,
) -> ApiResult<impl IntoResponse> {
    current.require(Action::ManageCatalog)?;

    let category = state.category_repo.update(id, input).await?;

    Ok(Json(json!({ "category": category })))
}

pub async fn delete_category(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<i32>,
) -> ApiResult<impl IntoResponse> {
    current.require(Action::ManageCatalog)?;

    state.category_repo.delete(id).await?;

    Ok(Json(json!({ "message": "Category deleted successfully" })))
}
