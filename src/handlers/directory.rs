// src/handlers/directory.rs

//! Faculties, departments, groups and subjects.
//!
//! Listing is open to every signed-in user; writes are mounted under the
//! admin router.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde_json::json;
use sqlx::SqlitePool;
use validator::Validate;

use crate::{
    db::ensure_exists,
    error::{AppError, is_unique_violation},
    models::directory::{
        Department, DepartmentRequest, Faculty, FacultyRequest, Group, GroupRequest, Subject,
        SubjectRequest,
    },
    services::gamification::{ACHIEVEMENTS, LEVELS},
};

fn duplicate_name(e: sqlx::Error, what: &str) -> AppError {
    if is_unique_violation(&e) {
        AppError::Conflict(format!("{what} with this name already exists"))
    } else {
        AppError::from(e)
    }
}

/// Deletes one row, mapping "still referenced" to 409.
async fn delete_row(pool: &SqlitePool, table: &'static str, id: i64, what: &str) -> Result<StatusCode, AppError> {
    let result = sqlx::query(&format!("DELETE FROM {table} WHERE id = $1"))
        .bind(id)
        .execute(pool)
        .await
        .map_err(|e| match e.as_database_error() {
            Some(db_err) if db_err.is_foreign_key_violation() => {
                AppError::Conflict(format!("{what} is still in use"))
            }
            _ => AppError::from(e),
        })?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound(format!("{what} not found")));
    }

    Ok(StatusCode::NO_CONTENT)
}

// Faculties

pub async fn list_faculties(State(pool): State<SqlitePool>) -> Result<impl IntoResponse, AppError> {
    let faculties = sqlx::query_as::<_, Faculty>("SELECT id, name, created_at FROM faculties ORDER BY name")
        .fetch_all(&pool)
        .await?;

    Ok(Json(faculties))
}

pub async fn create_faculty(
    State(pool): State<SqlitePool>,
    Json(payload): Json<FacultyRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let faculty = sqlx::query_as::<_, Faculty>(
        "INSERT INTO faculties (name) VALUES ($1) RETURNING id, name, created_at",
    )
    .bind(payload.name.trim())
    .fetch_one(&pool)
    .await
    .map_err(|e| duplicate_name(e, "Faculty"))?;

    Ok((StatusCode::CREATED, Json(faculty)))
}

pub async fn update_faculty(
    State(pool): State<SqlitePool>,
    Path(id): Path<i64>,
    Json(payload): Json<FacultyRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let faculty = sqlx::query_as::<_, Faculty>(
        "UPDATE faculties SET name = $1 WHERE id = $2 RETURNING id, name, created_at",
    )
    .bind(payload.name.trim())
    .bind(id)
    .fetch_optional(&pool)
    .await
    .map_err(|e| duplicate_name(e, "Faculty"))?
    .ok_or(AppError::NotFound("Faculty not found".to_string()))?;

    Ok(Json(faculty))
}

pub async fn delete_faculty(
    State(pool): State<SqlitePool>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    delete_row(&pool, "faculties", id, "Faculty").await
}

// Departments

pub async fn list_departments(State(pool): State<SqlitePool>) -> Result<impl IntoResponse, AppError> {
    let departments = sqlx::query_as::<_, Department>(
        "SELECT id, name, faculty_id, created_at FROM departments ORDER BY name",
    )
    .fetch_all(&pool)
    .await?;

    Ok(Json(departments))
}

pub async fn create_department(
    State(pool): State<SqlitePool>,
    Json(payload): Json<DepartmentRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;
    ensure_exists(&pool, "faculties", payload.faculty_id, "Faculty not found").await?;

    let department = sqlx::query_as::<_, Department>(
        "INSERT INTO departments (name, faculty_id) VALUES ($1, $2)
         RETURNING id, name, faculty_id, created_at",
    )
    .bind(payload.name.trim())
    .bind(payload.faculty_id)
    .fetch_one(&pool)
    .await
    .map_err(|e| duplicate_name(e, "Department"))?;

    Ok((StatusCode::CREATED, Json(department)))
}

pub async fn update_department(
    State(pool): State<SqlitePool>,
    Path(id): Path<i64>,
    Json(payload): Json<DepartmentRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;
    ensure_exists(&pool, "faculties", payload.faculty_id, "Faculty not found").await?;

    let department = sqlx::query_as::<_, Department>(
        "UPDATE departments SET name = $1, faculty_id = $2 WHERE id = $3
         RETURNING id, name, faculty_id, created_at",
    )
    .bind(payload.name.trim())
    .bind(payload.faculty_id)
    .bind(id)
    .fetch_optional(&pool)
    .await
    .map_err(|e| duplicate_name(e, "Department"))?
    .ok_or(AppError::NotFound("Department not found".to_string()))?;

    Ok(Json(department))
}

pub async fn delete_department(
    State(pool): State<SqlitePool>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    delete_row(&pool, "departments", id, "Department").await
}

// Groups

pub async fn list_groups(State(pool): State<SqlitePool>) -> Result<impl IntoResponse, AppError> {
    let groups = sqlx::query_as::<_, Group>(
        "SELECT id, name, department_id, course_year, created_at FROM student_groups ORDER BY name",
    )
    .fetch_all(&pool)
    .await?;

    Ok(Json(groups))
}

pub async fn create_group(
    State(pool): State<SqlitePool>,
    Json(payload): Json<GroupRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;
    if let Some(department_id) = payload.department_id {
        ensure_exists(&pool, "departments", department_id, "Department not found").await?;
    }

    let group = sqlx::query_as::<_, Group>(
        "INSERT INTO student_groups (name, department_id, course_year) VALUES ($1, $2, $3)
         RETURNING id, name, department_id, course_year, created_at",
    )
    .bind(payload.name.trim())
    .bind(payload.department_id)
    .bind(payload.course_year)
    .fetch_one(&pool)
    .await
    .map_err(|e| duplicate_name(e, "Group"))?;

    Ok((StatusCode::CREATED, Json(group)))
}

pub async fn update_group(
    State(pool): State<SqlitePool>,
    Path(id): Path<i64>,
    Json(payload): Json<GroupRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;
    if let Some(department_id) = payload.department_id {
        ensure_exists(&pool, "departments", department_id, "Department not found").await?;
    }

    let group = sqlx::query_as::<_, Group>(
        "UPDATE student_groups SET name = $1, department_id = $2, course_year = $3 WHERE id = $4
         RETURNING id, name, department_id, course_year, created_at",
    )
    .bind(payload.name.trim())
    .bind(payload.department_id)
    .bind(payload.course_year)
    .bind(id)
    .fetch_optional(&pool)
    .await
    .map_err(|e| duplicate_name(e, "Group"))?
    .ok_or(AppError::NotFound("Group not found".to_string()))?;

    Ok(Json(group))
}

pub async fn delete_group(
    State(pool): State<SqlitePool>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    delete_row(&pool, "student_groups", id, "Group").await
}

// Subjects

pub async fn list_subjects(State(pool): State<SqlitePool>) -> Result<impl IntoResponse, AppError> {
    let subjects = sqlx::query_as::<_, Subject>(
        "SELECT id, name, code, department_id, created_at FROM subjects ORDER BY name",
    )
    .fetch_all(&pool)
    .await?;

    Ok(Json(subjects))
}

pub async fn create_subject(
    State(pool): State<SqlitePool>,
    Json(payload): Json<SubjectRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;
    if let Some(department_id) = payload.department_id {
        ensure_exists(&pool, "departments", department_id, "Department not found").await?;
    }

    let subject = sqlx::query_as::<_, Subject>(
        "INSERT INTO subjects (name, code, department_id) VALUES ($1, $2, $3)
         RETURNING id, name, code, department_id, created_at",
    )
    .bind(payload.name.trim())
    .bind(payload.code.as_deref().map(str::trim))
    .bind(payload.department_id)
    .fetch_one(&pool)
    .await
    .map_err(|e| duplicate_name(e, "Subject"))?;

    Ok((StatusCode::CREATED, Json(subject)))
}

pub async fn update_subject(
    State(pool): State<SqlitePool>,
    Path(id): Path<i64>,
    Json(payload): Json<SubjectRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;
    if let Some(department_id) = payload.department_id {
        ensure_exists(&pool, "departments", department_id, "Department not found").await?;
    }

    let subject = sqlx::query_as::<_, Subject>(
        "UPDATE subjects SET name = $1, code = $2, department_id = $3 WHERE id = $4
         RETURNING id, name, code, department_id, created_at",
    )
    .bind(payload.name.trim())
    .bind(payload.code.as_deref().map(str::trim))
    .bind(payload.department_id)
    .bind(id)
    .fetch_optional(&pool)
    .await
    .map_err(|e| duplicate_name(e, "Subject"))?
    .ok_or(AppError::NotFound("Subject not found".to_string()))?;

    Ok(Json(subject))
}

pub async fn delete_subject(
    State(pool): State<SqlitePool>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    delete_row(&pool, "subjects", id, "Subject").await
}

// Static catalogs

pub async fn list_levels() -> impl IntoResponse {
    let levels: Vec<_> = LEVELS
        .iter()
        .map(|level| {
            json!({
                "level": level.number,
                "name": level.name,
                "minPoints": level.min_points,
                "maxPoints": level.max_points,
            })
        })
        .collect();

    Json(levels)
}

pub async fn list_achievements() -> impl IntoResponse {
    let achievements: Vec<_> = ACHIEVEMENTS
        .iter()
        .map(|a| json!({ "id": a.id, "name": a.name, "description": a.description }))
        .collect();

    Json(achievements)
}
