use crate::api::error::ApiResult;
use crate::api::user::{
    CreateUserRequest, check_password_length, create_account, email_taken, normalize_email,
    username_taken,
};
use crate::auth::{CurrentUser, create_jwt, hash_password, verify_password};
use crate::domain::{Action, DomainError, Role};
use crate::models::user::{self, Entity as User};
use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use sea_orm::*;
use serde::Deserialize;
use serde_json::json;

#[derive(Deserialize)]
pub struct LoginRequest {
    username: String,
    password: String,
}

#[derive(Deserialize)]
pub struct RegisterRequest {
    username: String,
    password: String,
    full_name: Option<String>,
    email: Option<String>,
}

pub async fn login(
    State(db): State<DatabaseConnection>,
    Json(payload): Json<LoginRequest>,
) -> ApiResult<impl IntoResponse> {
    tracing::info!("Login attempt for user: {}", payload.username);

    let user = match User::find()
        .filter(user::Column::Username.eq(&payload.username))
        .one(&db)
        .await?
    {
        Some(u) => u,
        None => {
            tracing::warn!("User not found: {}", payload.username);
            return Err(DomainError::Unauthorized);
        }
    };

    if !verify_password(&payload.password, &user.password_hash).unwrap_or(false) {
        tracing::warn!("Password verification failed for user: {}", user.username);
        return Err(DomainError::Unauthorized);
    }

    let role: Role = user.role.parse()?;
    let token = create_jwt(user.id, &user.username, role).map_err(DomainError::Internal)?;
    tracing::info!("Password verified successfully for user: {}", user.username);

    Ok(Json(json!({
        "token": token,
        "user": { "id": user.id, "username": user.username, "role": role }
    })))
}

/// Self-service sign-up; always creates a borrower
pub async fn register(
    State(db): State<DatabaseConnection>,
    Json(payload): Json<RegisterRequest>,
) -> ApiResult<impl IntoResponse> {
    let created = create_account(
        &db,
        CreateUserRequest {
            username: payload.username,
            password: payload.password,
            full_name: payload.full_name,
            email: payload.email,
            role: None,
        },
        Role::Borrower,
    )
    .await?;

    let token =
        create_jwt(created.id, &created.username, Role::Borrower).map_err(DomainError::Internal)?;

    Ok((
        StatusCode::CREATED,
        Json(json!({ "token": token, "user": created })),
    ))
}

pub async fn get_me(
    State(db): State<DatabaseConnection>,
    current: CurrentUser,
) -> ApiResult<impl IntoResponse> {
    let user = User::find_by_id(current.id)
        .one(&db)
        .await?
        .ok_or_else(|| DomainError::not_found("User"))?;

    Ok(Json(json!({ "user": user })))
}

#[derive(Deserialize)]
pub struct UpdateProfileRequest {
    full_name: Option<String>,
    email: Option<String>,
}

/// Update the caller's own name and email; username and role stay fixed
pub async fn update_me(
    State(db): State<DatabaseConnection>,
    current: CurrentUser,
    Json(payload): Json<UpdateProfileRequest>,
) -> ApiResult<impl IntoResponse> {
    current.require(Action::ManageOwnAccount)?;

    let existing = User::find_by_id(current.id)
        .one(&db)
        .await?
        .ok_or_else(|| DomainError::not_found("User"))?;

    let mut active: user::ActiveModel = existing.into();
    if let Some(full_name) = payload.full_name {
        let full_name = full_name.trim().to_string();
        active.full_name = Set(Some(full_name).filter(|n| !n.is_empty()));
    }
    if payload.email.is_some() {
        let email = normalize_email(payload.email)?;
        if let Some(email) = &email {
            if email_taken(&db, email, Some(current.id)).await? {
                return Err(DomainError::Conflict(format!(
                    "Email '{}' is already in use",
                    email
                )));
            }
        }
        active.email = Set(email);
    }
    active.updated_at = Set(chrono::Utc::now().to_rfc3339());
    let user = active.update(&db).await?;

    tracing::info!("Profile of {} updated", user.username);
    Ok(Json(json!({ "user": user })))
}

#[derive(Deserialize)]
pub struct ChangePasswordRequest {
    old_password: String,
    new_password: String,
}

pub async fn change_password(
    State(db): State<DatabaseConnection>,
    current: CurrentUser,
    Json(payload): Json<ChangePasswordRequest>,
) -> ApiResult<impl IntoResponse> {
    current.require(Action::ManageOwnAccount)?;

    let existing = User::find_by_id(current.id)
        .one(&db)
        .await?
        .ok_or_else(|| DomainError::not_found("User"))?;

    if !verify_password(&payload.old_password, &existing.password_hash).unwrap_or(false) {
        tracing::warn!("Password change for {} with a wrong old password", current.username);
        return Err(DomainError::Validation("Wrong password.".to_string()));
    }
    check_password_length(&payload.new_password)?;

    let password_hash = hash_password(&payload.new_password).map_err(DomainError::Internal)?;
    let mut active: user::ActiveModel = existing.into();
    active.password_hash = Set(password_hash);
    active.updated_at = Set(chrono::Utc::now().to_rfc3339());
    active.update(&db).await?;

    tracing::info!("Password changed for {}", current.username);
    Ok(Json(json!({ "message": "Password changed successfully." })))
}

#[derive(Deserialize)]
pub struct AvailabilityQuery {
    value: Option<String>,
}

fn required_value(query: AvailabilityQuery, field: &str) -> Result<String, DomainError> {
    query
        .value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| DomainError::Validation(format!("{} parameter missing", field)))
}

/// Sign-up form helper: `{"exists": true}` when the username is taken
pub async fn check_username(
    State(db): State<DatabaseConnection>,
    Query(query): Query<AvailabilityQuery>,
) -> ApiResult<impl IntoResponse> {
    let username = required_value(query, "Username")?;
    let exists = username_taken(&db, &username).await?;

    Ok(Json(json!({ "exists": exists })))
}

pub async fn check_email(
    State(db): State<DatabaseConnection>,
    Query(query): Query<AvailabilityQuery>,
) -> ApiResult<impl IntoResponse> {
    let email = required_value(query, "Email")?;
    let exists = email_taken(&db, &email, None).await?;

    Ok(Json(json!({ "exists": exists })))
}
