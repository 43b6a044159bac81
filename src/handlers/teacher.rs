// src/handlers/teacher.rs

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use sqlx::SqlitePool;
use validator::Validate;

use crate::{
    config::Config,
    error::AppError,
    handlers::requester,
    models::{
        attendance::{RosterEntry, SessionAttendanceEntry},
        class_session::{
            CLASS_SESSION_COLUMNS, ClassSession, ClassSessionListParams, CreateClassSessionRequest,
            QrCodeResponse,
        },
        user::Role,
    },
    services::class_session::{create_session, end_session, generate_token, get_managed_session},
    utils::jwt::Claims,
};

/// Creates a class session for the calling teacher.
/// Admins may pass `teacherId` to act on a teacher's behalf.
pub async fn create_class(
    State(pool): State<SqlitePool>,
    State(config): State<Config>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<CreateClassSessionRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let session = create_session(&pool, requester(&claims)?, &payload, config.utc_offset).await?;

    Ok((StatusCode::CREATED, Json(session)))
}

/// Lists the caller's sessions, newest first. Admins see every session.
pub async fn list_classes(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Query(params): Query<ClassSessionListParams>,
) -> Result<impl IntoResponse, AppError> {
    let requester = requester(&claims)?;
    let teacher_filter = (requester.role != Role::Admin).then_some(requester.id);

    let sessions = sqlx::query_as::<_, ClassSession>(&format!(
        "SELECT {CLASS_SESSION_COLUMNS} FROM class_sessions
         WHERE ($1 IS NULL OR teacher_id = $1)
           AND ($2 IS NULL OR is_active = $2)
         ORDER BY start_time DESC, id DESC"
    ))
    .bind(teacher_filter)
    .bind(params.active)
    .fetch_all(&pool)
    .await?;

    Ok(Json(sessions))
}

/// Returns one session. Owner or admin only.
pub async fn get_class(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let session = get_managed_session(&pool, id, requester(&claims)?).await?;

    Ok(Json(session))
}

/// Mints (or replaces) the QR token of an active session.
pub async fn generate_qr(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let qr_code = generate_token(&pool, id, requester(&claims)?).await?;

    Ok(Json(QrCodeResponse { qr_code }))
}

/// Ends a session. Ending an already ended session succeeds unchanged.
pub async fn end_class(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let session = end_session(&pool, id, requester(&claims)?).await?;

    Ok(Json(session))
}

/// Attendance records of a session in check-in order.
pub async fn class_attendance(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let session = get_managed_session(&pool, id, requester(&claims)?).await?;

    let records = sqlx::query_as::<_, SessionAttendanceEntry>(
        "SELECT ar.id, ar.student_id, u.username, u.first_name, u.last_name, ar.timestamp, ar.status
         FROM attendance_records ar
         JOIN users u ON u.id = ar.student_id
         WHERE ar.class_session_id = $1
         ORDER BY ar.timestamp, ar.id",
    )
    .bind(session.id)
    .fetch_all(&pool)
    .await?;

    Ok(Json(records))
}

/// Every student of the session's group with their outcome.
/// Students without a record are absent once the session has ended, and
/// have no status while it is still open.
pub async fn class_roster(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let session = get_managed_session(&pool, id, requester(&claims)?).await?;

    let roster = sqlx::query_as::<_, RosterEntry>(
        "SELECT u.id AS student_id, u.username, u.first_name, u.last_name,
                CASE
                    WHEN ar.status IS NOT NULL THEN ar.status
                    WHEN $3 THEN NULL
                    ELSE 'absent'
                END AS status,
                ar.timestamp
         FROM users u
         LEFT JOIN attendance_records ar
                ON ar.student_id = u.id AND ar.class_session_id = $1
         WHERE u.role = 'student' AND u.group_id = $2
         UNION
         SELECT u.id, u.username, u.first_name, u.last_name, ar.status, ar.timestamp
         FROM attendance_records ar
         JOIN users u ON u.id = ar.student_id
         WHERE ar.class_session_id = $1 AND (u.group_id IS NOT $2)
         ORDER BY last_name, first_name",
    )
    .bind(session.id)
    .bind(session.group_id)
    .bind(session.is_active)
    .fetch_all(&pool)
    .await?;

    Ok(Json(roster))
}
