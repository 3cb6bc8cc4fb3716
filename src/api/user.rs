//! User administration (admin only), account validation helpers and
//! push-device registration

use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
};
use sea_orm::sea_query::{Expr, Func, SimpleExpr};
use sea_orm::*;
use serde::Deserialize;
use serde_json::json;

use crate::api::error::ApiResult;
use crate::auth::{CurrentUser, hash_password};
use crate::domain::{Action, DomainError, Role};
use crate::infrastructure::push::is_expo_token;
use crate::models::user::{self, Entity as User};
use crate::models::user_device::{self, Entity as UserDevice};

const MIN_PASSWORD_LEN: usize = 6;

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub username: String,
    pub password: String,
    pub full_name: Option<String>,
    pub email: Option<String>,
    /// Defaults to `borrower`
    pub role: Option<String>,
}

/// Validate and insert an account with the given role.
pub async fn create_account(
    db: &DatabaseConnection,
    payload: CreateUserRequest,
    role: Role,
) -> Result<user::Model, DomainError> {
    let username = payload.username.trim().to_string();
    if username.is_empty() {
        return Err(DomainError::Validation("Username is required".to_string()));
    }
    check_password_length(&payload.password)?;

    if username_taken(db, &username).await? {
        return Err(DomainError::Conflict(format!(
            "Username '{}' is already taken",
            username
        )));
    }
    let email = normalize_email(payload.email)?;
    if let Some(email) = &email {
        if email_taken(db, email, None).await? {
            return Err(DomainError::Conflict(format!(
                "Email '{}' is already in use",
                email
            )));
        }
    }

    let password_hash = hash_password(&payload.password).map_err(DomainError::Internal)?;
    let now = chrono::Utc::now().to_rfc3339();

    let created = user::ActiveModel {
        username: Set(username),
        password_hash: Set(password_hash),
        full_name: Set(payload.full_name),
        email: Set(email),
        role: Set(role.as_str().to_string()),
        created_at: Set(now.clone()),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(db)
    .await?;

    tracing::info!("Created {} account '{}'", role, created.username);
    Ok(created)
}

/// Case-insensitive match on a text column
fn equals_ignoring_case(column: user::Column, value: &str) -> SimpleExpr {
    Expr::expr(Func::lower(Expr::col(column))).eq(value.trim().to_lowercase())
}

pub async fn username_taken(db: &DatabaseConnection, username: &str) -> Result<bool, DomainError> {
    let count = User::find()
        .filter(equals_ignoring_case(user::Column::Username, username))
        .count(db)
        .await?;
    Ok(count > 0)
}

/// `except` skips the caller's own account when they keep their address
pub async fn email_taken(
    db: &DatabaseConnection,
    email: &str,
    except: Option<i32>,
) -> Result<bool, DomainError> {
    let mut query = User::find().filter(equals_ignoring_case(user::Column::Email, email));
    if let Some(id) = except {
        query = query.filter(user::Column::Id.ne(id));
    }
    Ok(query.count(db).await? > 0)
}

/// Blank addresses are stored as none
pub fn normalize_email(email: Option<String>) -> Result<Option<String>, DomainError> {
    let Some(email) = email.map(|e| e.trim().to_string()).filter(|e| !e.is_empty()) else {
        return Ok(None);
    };
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(Some(email)),
        _ => Err(DomainError::Validation(format!(
            "'{}' is not a valid email address",
            email
        ))),
    }
}

pub fn check_password_length(password: &str) -> Result<(), DomainError> {
    if password.len() < MIN_PASSWORD_LEN {
        return Err(DomainError::Validation(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }
    Ok(())
}

pub async fn create_user(
    State(db): State<DatabaseConnection>,
    current: CurrentUser,
    Json(payload): Json<CreateUserRequest>,
) -> ApiResult<impl IntoResponse> {
    current.require(Action::ManageUsers)?;

    let role = match payload.role.as_deref() {
        Some(raw) => raw.parse()?,
        None => Role::Borrower,
    };
    let created = create_account(&db, payload, role).await?;

    Ok((StatusCode::CREATED, Json(json!({ "user": created }))))
}

pub async fn list_users(
    State(db): State<DatabaseConnection>,
    current: CurrentUser,
) -> ApiResult<impl IntoResponse> {
    current.require(Action::ManageUsers)?;

    let users = User::find()
        .order_by_asc(user::Column::Username)
        .all(&db)
        .await?;
    let total = users.len();

    Ok(Json(json!({ "users": users, "total": total })))
}

#[derive(Debug, Deserialize)]
pub struct RegisterDeviceRequest {
    pub device_token: String,
}

/// Register (or re-activate) a push token for the caller.
///
/// A token moves to the caller when it was registered by another account.
pub async fn register_device(
    State(db): State<DatabaseConnection>,
    current: CurrentUser,
    Json(payload): Json<RegisterDeviceRequest>,
) -> ApiResult<impl IntoResponse> {
    let token = payload.device_token.trim().to_string();
    if !is_expo_token(&token) {
        return Err(DomainError::Validation(
            "device_token must be an ExponentPushToken[...]".to_string(),
        ));
    }

    let existing = UserDevice::find()
        .filter(user_device::Column::DeviceToken.eq(token.as_str()))
        .one(&db)
        .await?;

    let (device, status) = match existing {
        Some(device) => {
            let mut active: user_device::ActiveModel = device.into();
            active.user_id = Set(current.id);
            active.is_active = Set(true);
            (active.update(&db).await?, StatusCode::OK)
        }
        None => {
            let created = user_device::ActiveModel {
                user_id: Set(current.id),
                device_token: Set(token),
                is_active: Set(true),
                created_at: Set(chrono::Utc::now().to_rfc3339()),
                ..Default::default()
            }
            .insert(&db)
            .await?;
            (created, StatusCode::CREATED)
        }
    };

    tracing::info!("Device {} registered for {}", device.id, current.username);
    Ok((status, Json(json!({ "device": device }))))
}
