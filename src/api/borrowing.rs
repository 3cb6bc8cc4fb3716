//! Borrowing API handlers
//!
//! Thin wrappers over `BorrowingService`: the caller's identity comes from
//! the bearer token and every permission check happens in the service.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;

use crate::api::error::ApiResult;
use crate::auth::CurrentUser;
use crate::infrastructure::AppState;
use crate::services::{
    ApproveRequest, BorrowRequest, BorrowingFilter, IssueRequest, RejectRequest, SweepService,
};

#[utoipa::path(
    get,
    path = "/api/borrowings",
    params(
        ("status" = Option<String>, Query, description = "Borrowing status, e.g. ACTIVE"),
        ("user_id" = Option<i32>, Query, description = "Borrower (staff only)"),
        ("book_id" = Option<i32>, Query, description = "Book")
    ),
    responses(
        (status = 200, description = "Borrowings visible to the caller"),
        (status = 401, description = "Missing or invalid token")
    )
)]
pub async fn list_borrowings(
    State(state): State<AppState>,
    current: CurrentUser,
    Query(filter): Query<BorrowingFilter>,
) -> ApiResult<impl IntoResponse> {
    let borrowings = state.borrowings.list(&current, filter).await?;
    let total = borrowings.len();

    Ok(Json(json!({ "borrowings": borrowings, "total": total })))
}

pub async fn get_borrowing(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<i32>,
) -> ApiResult<impl IntoResponse> {
    let borrowing = state.borrowings.get(&current, id).await?;

    Ok(Json(json!({ "borrowing": borrowing })))
}

#[utoipa::path(
    post,
    path = "/api/borrowings",
    responses(
        (status = 201, description = "Request recorded as REQUESTED"),
        (status = 400, description = "Invalid due date"),
        (status = 409, description = "No copies available or duplicate request")
    )
)]
pub async fn request_borrowing(
    State(state): State<AppState>,
    current: CurrentUser,
    Json(payload): Json<BorrowRequest>,
) -> ApiResult<impl IntoResponse> {
    let borrowing = state
        .borrowings
        .request(&current, payload, Utc::now())
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "borrowing": borrowing,
            "message": "Borrow request submitted"
        })),
    ))
}

#[utoipa::path(
    post,
    path = "/api/borrowings/issue",
    responses(
        (status = 201, description = "Copy issued, borrowing ACTIVE"),
        (status = 403, description = "Staff only"),
        (status = 409, description = "Copy not available")
    )
)]
pub async fn issue_borrowing(
    State(state): State<AppState>,
    current: CurrentUser,
    Json(payload): Json<IssueRequest>,
) -> ApiResult<impl IntoResponse> {
    let borrowing = state.borrowings.issue(&current, payload, Utc::now()).await?;

    Ok((StatusCode::CREATED, Json(json!({ "borrowing": borrowing }))))
}

#[utoipa::path(
    post,
    path = "/api/borrowings/{id}/approve",
    params(("id" = i32, Path, description = "Borrowing id")),
    responses(
        (status = 200, description = "ACTIVE, or REJECTED when the copy was taken meanwhile"),
        (status = 409, description = "Borrowing is not REQUESTED")
    )
)]
pub async fn approve_borrowing(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<i32>,
    payload: Option<Json<ApproveRequest>>,
) -> ApiResult<impl IntoResponse> {
    let input = payload.map(|Json(p)| p).unwrap_or_default();
    let borrowing = state
        .borrowings
        .approve(&current, id, input, Utc::now())
        .await?;

    Ok(Json(json!({ "borrowing": borrowing })))
}

#[utoipa::path(
    post,
    path = "/api/borrowings/{id}/reject",
    params(("id" = i32, Path, description = "Borrowing id")),
    responses(
        (status = 200, description = "Borrowing REJECTED"),
        (status = 409, description = "Borrowing is not REQUESTED")
    )
)]
pub async fn reject_borrowing(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<i32>,
    payload: Option<Json<RejectRequest>>,
) -> ApiResult<impl IntoResponse> {
    let input = payload.map(|Json(p)| p).unwrap_or_default();
    let borrowing = state
        .borrowings
        .reject(&current, id, input, Utc::now())
        .await?;

    Ok(Json(json!({ "borrowing": borrowing })))
}

#[utoipa::path(
    post,
    path = "/api/borrowings/{id}/cancel",
    params(("id" = i32, Path, description = "Borrowing id")),
    responses(
        (status = 200, description = "Borrowing CANCELLED"),
        (status = 403, description = "Not the borrower's own request"),
        (status = 409, description = "Borrowing is not REQUESTED")
    )
)]
pub async fn cancel_borrowing(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<i32>,
) -> ApiResult<impl IntoResponse> {
    let borrowing = state.borrowings.cancel(&current, id, Utc::now()).await?;

    Ok(Json(json!({ "borrowing": borrowing })))
}

#[utoipa::path(
    post,
    path = "/api/borrowings/{id}/return",
    params(("id" = i32, Path, description = "Borrowing id")),
    responses(
        (status = 200, description = "RETURNED or RETURNED_LATE with fine"),
        (status = 409, description = "Borrowing is not on loan")
    )
)]
pub async fn return_borrowing(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<i32>,
) -> ApiResult<impl IntoResponse> {
    let borrowing = state
        .borrowings
        .return_borrowing(&current, id, Utc::now())
        .await?;

    Ok(Json(json!({ "borrowing": borrowing })))
}

#[utoipa::path(
    post,
    path = "/api/borrowings/{id}/lost",
    params(("id" = i32, Path, description = "Borrowing id")),
    responses(
        (status = 200, description = "LOST_BY_BORROWER with lost-book fee"),
        (status = 409, description = "Borrowing is not on loan")
    )
)]
pub async fn mark_lost(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<i32>,
) -> ApiResult<impl IntoResponse> {
    let borrowing = state.borrowings.mark_lost(&current, id, Utc::now()).await?;

    Ok(Json(json!({ "borrowing": borrowing })))
}

#[derive(Debug, Default, Deserialize)]
pub struct ReminderQuery {
    pub days: Option<i64>,
}

pub async fn send_reminders(
    State(state): State<AppState>,
    current: CurrentUser,
    Query(query): Query<ReminderQuery>,
) -> ApiResult<impl IntoResponse> {
    SweepService::authorize(&current)?;

    let days = query.days.unwrap_or(state.config.reminder_days);
    let report = state.sweeps.send_due_reminders(days, Utc::now()).await?;

    Ok(Json(json!({ "report": report })))
}

pub async fn sweep_overdue(
    State(state): State<AppState>,
    current: CurrentUser,
) -> ApiResult<impl IntoResponse> {
    SweepService::authorize(&current)?;

    let report = state.sweeps.sweep_overdue(Utc::now()).await?;

    Ok(Json(json!({ "report": report })))
}

#[utoipa::path(
    get,
    path = "/api/stats",
    responses(
        (status = 200, description = "Circulation counters"),
        (status = 403, description = "Staff only")
    )
)]
pub async fn get_stats(
    State(state): State<AppState>,
    current: CurrentUser,
) -> ApiResult<impl IntoResponse> {
    let stats = state.borrowings.stats(&current).await?;

    Ok(Json(json!({ "stats": stats })))
}
