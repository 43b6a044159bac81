// src/services/class_session.rs

use chrono::FixedOffset;
use sqlx::SqlitePool;

use crate::{
    db::ensure_exists,
    error::AppError,
    models::{
        class_session::{CLASS_SESSION_COLUMNS, ClassSession, CreateClassSessionRequest},
        user::Role,
    },
    utils::qr::generate_qr_token,
};

/// Who is asking. Ownership checks compare against the session's teacher.
#[derive(Debug, Clone, Copy)]
pub struct Requester {
    pub id: i64,
    pub role: Role,
}

impl Requester {
    fn may_manage(&self, session: &ClassSession) -> bool {
        self.role == Role::Admin || self.id == session.teacher_id
    }
}

/// Creates an active session without a token.
///
/// Overlap with the teacher's other sessions is not checked.
pub async fn create_session(
    pool: &SqlitePool,
    requester: Requester,
    req: &CreateClassSessionRequest,
    utc_offset: FixedOffset,
) -> Result<ClassSession, AppError> {
    if req.end_time <= req.start_time {
        return Err(AppError::BadRequest(
            "End time must be after start time".to_string(),
        ));
    }

    let teacher_id = match (requester.role, req.teacher_id) {
        (Role::Admin, Some(teacher_id)) => teacher_id,
        _ => requester.id,
    };

    let teacher_role: Option<String> = sqlx::query_scalar("SELECT role FROM users WHERE id = $1")
        .bind(teacher_id)
        .fetch_optional(pool)
        .await?;
    match teacher_role.as_deref() {
        Some("teacher") => {}
        Some("admin") if teacher_id == requester.id => {}
        Some(_) => return Err(AppError::BadRequest("Session owner must be a teacher".to_string())),
        None => return Err(AppError::BadRequest("Teacher not found".to_string())),
    }

    ensure_exists(pool, "subjects", req.subject_id, "Subject not found").await?;
    ensure_exists(pool, "student_groups", req.group_id, "Group not found").await?;

    let date = req.start_time.with_timezone(&utc_offset).date_naive();

    let session = sqlx::query_as::<_, ClassSession>(&format!(
        "INSERT INTO class_sessions
            (teacher_id, subject_id, group_id, classroom, date, start_time, end_time, token, is_active)
         VALUES ($1, $2, $3, $4, $5, $6, $7, NULL, 1)
         RETURNING {CLASS_SESSION_COLUMNS}"
    ))
    .bind(teacher_id)
    .bind(req.subject_id)
    .bind(req.group_id)
    .bind(req.classroom.trim())
    .bind(date)
    .bind(req.start_time)
    .bind(req.end_time)
    .fetch_one(pool)
    .await?;

    tracing::info!(
        session_id = session.id,
        teacher_id,
        group_id = session.group_id,
        "Class session created"
    );

    Ok(session)
}

/// Loads a session the requester owns (or any session, for admins).
pub async fn get_managed_session(
    pool: &SqlitePool,
    session_id: i64,
    requester: Requester,
) -> Result<ClassSession, AppError> {
    let session = sqlx::query_as::<_, ClassSession>(&format!(
        "SELECT {CLASS_SESSION_COLUMNS} FROM class_sessions WHERE id = $1"
    ))
    .bind(session_id)
    .fetch_optional(pool)
    .await?
    .ok_or(AppError::NotFound("Class session not found".to_string()))?;

    if !requester.may_manage(&session) {
        return Err(AppError::Forbidden(
            "Only the session's teacher can manage it".to_string(),
        ));
    }

    Ok(session)
}

/// Mints a fresh check-in token, replacing any previous one.
pub async fn generate_token(
    pool: &SqlitePool,
    session_id: i64,
    requester: Requester,
) -> Result<String, AppError> {
    let session = get_managed_session(pool, session_id, requester).await?;

    if !session.is_active {
        return Err(AppError::BadRequest("Class session has ended".to_string()));
    }

    let token = generate_qr_token();

    let result = sqlx::query("UPDATE class_sessions SET token = $1 WHERE id = $2 AND is_active = 1")
        .bind(&token)
        .bind(session.id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::BadRequest("Class session has ended".to_string()));
    }

    tracing::info!(session_id = session.id, "QR token issued");

    Ok(token)
}

/// Deactivates the session and clears its token. Ending twice is a no-op.
pub async fn end_session(
    pool: &SqlitePool,
    session_id: i64,
    requester: Requester,
) -> Result<ClassSession, AppError> {
    let session = get_managed_session(pool, session_id, requester).await?;

    if !session.is_active {
        return Ok(session);
    }

    let ended = sqlx::query_as::<_, ClassSession>(&format!(
        "UPDATE class_sessions SET is_active = 0, token = NULL
         WHERE id = $1
         RETURNING {CLASS_SESSION_COLUMNS}"
    ))
    .bind(session.id)
    .fetch_one(pool)
    .await?;

    tracing::info!(session_id = ended.id, "Class session ended");

    Ok(ended)
}
