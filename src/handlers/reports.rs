// src/handlers/reports.rs

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::{StatusCode, header},
    response::IntoResponse,
};
use sqlx::SqlitePool;
use validator::Validate;

use crate::{
    db::ensure_exists,
    error::AppError,
    models::report::{CreateReportRequest, DownloadParams, Report},
    services::reports::{ReportFormat, attendance_summary, render_csv, render_json},
    utils::jwt::Claims,
};

const REPORT_COLUMNS: &str =
    "id, title, kind, group_id, subject_id, date_from, date_to, created_by, created_at";

pub async fn list_reports(State(pool): State<SqlitePool>) -> Result<impl IntoResponse, AppError> {
    let reports = sqlx::query_as::<_, Report>(&format!(
        "SELECT {REPORT_COLUMNS} FROM reports ORDER BY created_at DESC, id DESC"
    ))
    .fetch_all(&pool)
    .await?;

    Ok(Json(reports))
}

/// Saves an attendance report definition.
pub async fn create_report(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<CreateReportRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    if let (Some(from), Some(to)) = (payload.date_from, payload.date_to) {
        if from > to {
            return Err(AppError::BadRequest(
                "dateFrom must not be after dateTo".to_string(),
            ));
        }
    }
    if let Some(group_id) = payload.group_id {
        ensure_exists(&pool, "student_groups", group_id, "Group not found").await?;
    }
    if let Some(subject_id) = payload.subject_id {
        ensure_exists(&pool, "subjects", subject_id, "Subject not found").await?;
    }

    let report = sqlx::query_as::<_, Report>(&format!(
        "INSERT INTO reports (title, kind, group_id, subject_id, date_from, date_to, created_by)
         VALUES ($1, 'attendance', $2, $3, $4, $5, $6)
         RETURNING {REPORT_COLUMNS}"
    ))
    .bind(payload.title.trim())
    .bind(payload.group_id)
    .bind(payload.subject_id)
    .bind(payload.date_from)
    .bind(payload.date_to)
    .bind(claims.user_id()?)
    .fetch_one(&pool)
    .await?;

    tracing::info!(report_id = report.id, "Report created");

    Ok((StatusCode::CREATED, Json(report)))
}

pub async fn get_report(
    State(pool): State<SqlitePool>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(fetch_report(&pool, id).await?))
}

pub async fn delete_report(
    State(pool): State<SqlitePool>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let result = sqlx::query("DELETE FROM reports WHERE id = $1")
        .bind(id)
        .execute(&pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Report not found".to_string()));
    }

    Ok(StatusCode::NO_CONTENT)
}

/// Computes the report now and returns it as an attachment.
/// `?format=csv|json`, json by default.
pub async fn download_report(
    State(pool): State<SqlitePool>,
    Path(id): Path<i64>,
    Query(params): Query<DownloadParams>,
) -> Result<impl IntoResponse, AppError> {
    let format = ReportFormat::parse(params.format.as_deref())?;
    let report = fetch_report(&pool, id).await?;
    let rows = attendance_summary(&pool, &report).await?;

    let body = match format {
        ReportFormat::Csv => render_csv(&rows),
        ReportFormat::Json => render_json(&report, &rows)?,
    };
    let disposition = format!(
        "attachment; filename=\"report-{}.{}\"",
        report.id,
        format.extension()
    );

    Ok((
        [
            (header::CONTENT_TYPE, format.content_type().to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        body,
    ))
}

async fn fetch_report(pool: &SqlitePool, id: i64) -> Result<Report, AppError> {
    sqlx::query_as::<_, Report>(&format!("SELECT {REPORT_COLUMNS} FROM reports WHERE id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or(AppError::NotFound("Report not found".to_string()))
}
