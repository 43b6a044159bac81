// src/handlers/student.rs

use axum::{Extension, Json, extract::State, http::StatusCode, response::IntoResponse};
use chrono::Utc;
use sqlx::SqlitePool;

use crate::{
    config::Config,
    error::AppError,
    models::{
        attendance::{CheckInRequest, StudentAttendanceEntry},
        class_session::StudentClassView,
        progress::{AchievementView, ProgressResponse},
    },
    services::{
        check_in::check_in,
        gamification::{ACHIEVEMENTS, level_for, load_achievements, load_progress, next_level},
    },
    utils::jwt::Claims,
};

/// Redeems a scanned QR code.
///
/// 201 with the record and updated progress, 404 for an unknown or ended
/// code, 403 for another group's class, 400 when already recorded.
pub async fn submit_attendance(
    State(pool): State<SqlitePool>,
    State(config): State<Config>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<CheckInRequest>,
) -> Result<impl IntoResponse, AppError> {
    let student_id = claims.user_id()?;

    let outcome = check_in(&pool, &config, &payload.qr_code, student_id, Utc::now()).await?;

    Ok((StatusCode::CREATED, Json(outcome)))
}

/// The caller's attendance history, newest first.
pub async fn list_my_attendance(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let records = sqlx::query_as::<_, StudentAttendanceEntry>(
        "SELECT ar.id, ar.class_session_id, s.name AS subject_name, cs.classroom,
                cs.start_time, ar.timestamp, ar.status
         FROM attendance_records ar
         JOIN class_sessions cs ON cs.id = ar.class_session_id
         JOIN subjects s ON s.id = cs.subject_id
         WHERE ar.student_id = $1
         ORDER BY ar.timestamp DESC, ar.id DESC",
    )
    .bind(claims.user_id()?)
    .fetch_all(&pool)
    .await?;

    Ok(Json(records))
}

/// Sessions scheduled for the caller's group, with the caller's status.
pub async fn list_my_classes(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let classes = sqlx::query_as::<_, StudentClassView>(
        "SELECT cs.id, cs.subject_id, s.name AS subject_name,
                t.last_name || ' ' || t.first_name AS teacher_name,
                cs.classroom, cs.date, cs.start_time, cs.end_time, cs.is_active,
                CASE
                    WHEN ar.status IS NOT NULL THEN ar.status
                    WHEN cs.is_active = 1 THEN NULL
                    ELSE 'absent'
                END AS status
         FROM users me
         JOIN class_sessions cs ON cs.group_id = me.group_id
         JOIN subjects s ON s.id = cs.subject_id
         JOIN users t ON t.id = cs.teacher_id
         LEFT JOIN attendance_records ar
                ON ar.class_session_id = cs.id AND ar.student_id = me.id
         WHERE me.id = $1
         ORDER BY cs.start_time DESC, cs.id DESC",
    )
    .bind(claims.user_id()?)
    .fetch_all(&pool)
    .await?;

    Ok(Json(classes))
}

/// Points, streak and level of the caller.
pub async fn get_my_progress(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let student_id = claims.user_id()?;
    let mut conn = pool.acquire().await?;

    let progress = load_progress(&mut conn, student_id).await?;
    let total_attendance: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM attendance_records WHERE student_id = $1")
            .bind(student_id)
            .fetch_one(&mut *conn)
            .await?;

    let level = level_for(progress.points);

    Ok(Json(ProgressResponse {
        points: progress.points,
        streak: progress.streak,
        level: progress.level,
        level_name: level.name,
        next_level_points: next_level(level.number).map(|next| next.min_points),
        last_attendance: progress.last_attendance,
        achievements: progress.achievements,
        total_attendance,
    }))
}

/// The achievement catalog, marked with what the caller has unlocked.
pub async fn get_my_achievements(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let mut conn = pool.acquire().await?;
    let unlocked = load_achievements(&mut conn, claims.user_id()?).await?;

    let achievements: Vec<AchievementView> = ACHIEVEMENTS
        .iter()
        .map(|a| {
            let unlocked_at = unlocked
                .iter()
                .find(|u| u.achievement_id == a.id)
                .map(|u| u.unlocked_at);
            AchievementView {
                id: a.id,
                name: a.name,
                description: a.description,
                unlocked: unlocked_at.is_some(),
                unlocked_at,
            }
        })
        .collect();

    Ok(Json(achievements))
}
