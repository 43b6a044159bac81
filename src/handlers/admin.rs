// src/handlers/admin.rs

use axum::{
    Json,
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use validator::Validate;

use crate::{
    db::ensure_exists,
    error::{AppError, is_unique_violation},
    handlers::auth::insert_user,
    models::user::{CreateUserRequest, Role, USER_COLUMNS, UpdateUserRequest, User, UserListParams},
    utils::{hash::hash_password, jwt::Claims},
};

/// Lists users, optionally filtered by role and group.
/// Admin only.
pub async fn list_users(
    State(pool): State<SqlitePool>,
    Query(params): Query<UserListParams>,
) -> Result<impl IntoResponse, AppError> {
    let users = sqlx::query_as::<_, User>(&format!(
        "SELECT {USER_COLUMNS} FROM users
         WHERE ($1 IS NULL OR role = $1)
           AND ($2 IS NULL OR group_id = $2)
         ORDER BY last_name, first_name, id"
    ))
    .bind(params.role.map(|r| r.as_str()))
    .bind(params.group_id)
    .fetch_all(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to list users: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    Ok(Json(users))
}

/// Retrieves a single user.
/// Admin only.
pub async fn get_user(
    State(pool): State<SqlitePool>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(fetch_user(&pool, id).await?))
}

/// Creates a user with any role.
/// Admin only.
pub async fn create_user(
    State(pool): State<SqlitePool>,
    Json(payload): Json<CreateUserRequest>,
) -> Result<impl IntoResponse, AppError> {
    let user = insert_user(&pool, &payload).await?;
    tracing::info!(user_id = user.id, role = %payload.role, "User created by admin");

    Ok((StatusCode::CREATED, Json(user)))
}

/// Updates user information. Absent fields are left untouched.
/// Admin only.
pub async fn update_user(
    State(pool): State<SqlitePool>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateUserRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;
    let existing = fetch_user(&pool, id).await?;

    if let Some(group_id) = payload.group_id {
        ensure_exists(&pool, "student_groups", group_id, "Group not found").await?;
    }
    if let Some(department_id) = payload.department_id {
        ensure_exists(&pool, "departments", department_id, "Department not found").await?;
    }

    let role = payload.role.unwrap_or(existing.role());
    let group_id = payload.group_id.or(existing.group_id);
    if role == Role::Student && group_id.is_none() {
        return Err(AppError::BadRequest("Students must belong to a group".to_string()));
    }
    if role != Role::Student && payload.group_id.is_some() {
        return Err(AppError::BadRequest("Only students belong to a group".to_string()));
    }
    // Leaving the student role drops the group.
    let clear_group = role != Role::Student && existing.group_id.is_some();

    let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new("UPDATE users SET ");
    let mut separated = builder.separated(", ");
    let mut changed = false;

    if let Some(username) = &payload.username {
        separated.push("username = ");
        separated.push_bind_unseparated(username.trim().to_string());
        changed = true;
    }

    if let Some(password) = &payload.password {
        separated.push("password = ");
        separated.push_bind_unseparated(hash_password(password)?);
        changed = true;
    }

    if let Some(first_name) = &payload.first_name {
        separated.push("first_name = ");
        separated.push_bind_unseparated(first_name.trim().to_string());
        changed = true;
    }

    if let Some(last_name) = &payload.last_name {
        separated.push("last_name = ");
        separated.push_bind_unseparated(last_name.trim().to_string());
        changed = true;
    }

    if let Some(role) = payload.role {
        separated.push("role = ");
        separated.push_bind_unseparated(role.as_str());
        changed = true;
    }

    if let Some(group_id) = payload.group_id {
        separated.push("group_id = ");
        separated.push_bind_unseparated(group_id);
        changed = true;
    }

    if clear_group {
        separated.push("group_id = NULL");
        changed = true;
    }

    if let Some(department_id) = payload.department_id {
        separated.push("department_id = ");
        separated.push_bind_unseparated(department_id);
        changed = true;
    }

    if !changed {
        return Ok(Json(existing));
    }

    builder.push(" WHERE id = ");
    builder.push_bind(id);

    builder.build().execute(&pool).await.map_err(|e| {
        if is_unique_violation(&e) {
            AppError::Conflict("Username already exists".to_string())
        } else {
            tracing::error!("Failed to update user: {:?}", e);
            AppError::from(e)
        }
    })?;

    Ok(Json(fetch_user(&pool, id).await?))
}

/// Deletes a user by ID.
/// Admin only. Prevents deleting self; users with attendance or sessions are kept.
pub async fn delete_user(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    if id == claims.user_id()? {
        return Err(AppError::BadRequest("Cannot delete yourself".to_string()));
    }

    let result = sqlx::query("DELETE FROM users WHERE id = $1")
        .bind(id)
        .execute(&pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to delete user: {:?}", e);
            AppError::from(e)
        })?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("User not found".to_string()));
    }

    Ok(StatusCode::NO_CONTENT)
}

async fn fetch_user(pool: &SqlitePool, id: i64) -> Result<User, AppError> {
    sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or(AppError::NotFound("User not found".to_string()))
}
