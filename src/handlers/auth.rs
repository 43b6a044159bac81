// src/handlers/auth.rs

use axum::{
    Extension, Json,
    extract::State,
    http::{StatusCode, header},
    response::IntoResponse,
};
use serde_json::json;
use sqlx::SqlitePool;
use validator::Validate;

use crate::{
    config::Config,
    db::ensure_exists,
    error::{AppError, is_unique_violation},
    models::user::{CreateUserRequest, LoginRequest, Role, USER_COLUMNS, User},
    utils::{
        hash::{hash_password, verify_password},
        jwt::{Claims, expired_session_cookie, session_cookie, sign_jwt},
    },
};

/// Inserts a user after checking the role/affiliation rules.
///
/// Students must belong to an existing group; a teacher's department is
/// optional but must exist when given.
pub(crate) async fn insert_user(pool: &SqlitePool, payload: &CreateUserRequest) -> Result<User, AppError> {
    payload.validate()?;

    match payload.role {
        Role::Student => {
            let group_id = payload
                .group_id
                .ok_or_else(|| AppError::BadRequest("Students must belong to a group".to_string()))?;
            ensure_exists(pool, "student_groups", group_id, "Group not found").await?;
        }
        Role::Teacher | Role::Admin => {
            if payload.group_id.is_some() {
                return Err(AppError::BadRequest("Only students belong to a group".to_string()));
            }
        }
    }
    if let Some(department_id) = payload.department_id {
        ensure_exists(pool, "departments", department_id, "Department not found").await?;
    }

    let hashed_password = hash_password(&payload.password)?;

    sqlx::query_as::<_, User>(&format!(
        "INSERT INTO users (username, password, first_name, last_name, role, group_id, department_id)
         VALUES ($1, $2, $3, $4, $5, $6, $7)
         RETURNING {USER_COLUMNS}"
    ))
    .bind(payload.username.trim())
    .bind(hashed_password)
    .bind(payload.first_name.trim())
    .bind(payload.last_name.trim())
    .bind(payload.role.as_str())
    .bind(payload.group_id)
    .bind(payload.department_id)
    .fetch_one(pool)
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            AppError::Conflict(format!("Username '{}' already exists", payload.username.trim()))
        } else {
            tracing::error!("Failed to insert user: {:?}", e);
            AppError::from(e)
        }
    })
}

/// Registers a new student or teacher.
///
/// Hashes the password using Argon2 before storing it.
/// Returns 201 Created and the user object (excluding password).
pub async fn register(
    State(pool): State<SqlitePool>,
    Json(payload): Json<CreateUserRequest>,
) -> Result<impl IntoResponse, AppError> {
    if payload.role == Role::Admin {
        return Err(AppError::Forbidden(
            "Admin accounts cannot be self-registered".to_string(),
        ));
    }

    let user = insert_user(&pool, &payload).await?;
    tracing::info!(user_id = user.id, role = %payload.role, "User registered");

    Ok((StatusCode::CREATED, Json(user)))
}

/// Authenticates a user and opens a session.
///
/// The signed token is returned in the body and as an HttpOnly cookie.
pub async fn login(
    State(pool): State<SqlitePool>,
    State(config): State<Config>,
    Json(payload): Json<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let user = sqlx::query_as::<_, User>(&format!(
        "SELECT {USER_COLUMNS} FROM users WHERE username = $1"
    ))
    .bind(payload.username.trim())
    .fetch_optional(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Login DB error: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    let invalid = || AppError::AuthError("Invalid username or password".to_string());
    let user = user.ok_or_else(invalid)?;

    if !verify_password(&payload.password, &user.password)? {
        return Err(invalid());
    }

    let token = sign_jwt(user.id, user.role(), &config.jwt_secret, config.jwt_expiration)?;
    let cookie = session_cookie(&token, config.jwt_expiration)?;

    tracing::info!(user_id = user.id, "User logged in");

    Ok((
        [(header::SET_COOKIE, cookie)],
        Json(json!({
            "token": token,
            "type": "Bearer",
            "user": user,
        })),
    ))
}

/// Drops the session cookie. Bearer tokens simply expire.
pub async fn logout() -> impl IntoResponse {
    (
        StatusCode::NO_CONTENT,
        [(header::SET_COOKIE, expired_session_cookie())],
    )
}

/// Returns the logged-in user.
pub async fn me(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let user = sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
        .bind(claims.user_id()?)
        .fetch_optional(&pool)
        .await?
        .ok_or(AppError::NotFound("User not found".to_string()))?;

    Ok(Json(user))
}
