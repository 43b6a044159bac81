// src/services/reports.rs

use std::fmt::Write;

use sqlx::SqlitePool;

use crate::{
    error::AppError,
    models::report::{AttendanceSummaryRow, Report},
};

/// Output formats a report can be downloaded in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportFormat {
    Csv,
    Json,
}

impl ReportFormat {
    pub fn parse(value: Option<&str>) -> Result<Self, AppError> {
        match value.map(str::to_ascii_lowercase).as_deref() {
            None | Some("json") => Ok(ReportFormat::Json),
            Some("csv") => Ok(ReportFormat::Csv),
            Some("pdf") | Some("xlsx") | Some("excel") => Err(AppError::BadRequest(
                "PDF and Excel exports are not available; use csv or json".to_string(),
            )),
            Some(other) => Err(AppError::BadRequest(format!("Unknown format '{other}'"))),
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            ReportFormat::Csv => "text/csv; charset=utf-8",
            ReportFormat::Json => "application/json",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            ReportFormat::Csv => "csv",
            ReportFormat::Json => "json",
        }
    }
}

/// Per-student attendance totals for the report's filters.
///
/// Only ended sessions count: `sessions_held` is every ended session of the
/// student's group in range, and absences are whatever is left after present
/// and late.
pub async fn attendance_summary(
    pool: &SqlitePool,
    report: &Report,
) -> Result<Vec<AttendanceSummaryRow>, AppError> {
    let rows = sqlx::query_as::<_, AttendanceSummaryRow>(
        r#"
        SELECT *, MAX(sessions_held - present - late, 0) AS absent
        FROM (
            SELECT
                u.id AS student_id,
                u.username,
                u.first_name,
                u.last_name,
                g.name AS group_name,
                (SELECT COUNT(*) FROM class_sessions cs
                  WHERE cs.group_id = u.group_id
                    AND cs.is_active = 0
                    AND ($2 IS NULL OR cs.subject_id = $2)
                    AND ($3 IS NULL OR cs.date >= $3)
                    AND ($4 IS NULL OR cs.date <= $4)) AS sessions_held,
                (SELECT COUNT(*) FROM attendance_records ar
                   JOIN class_sessions cs ON cs.id = ar.class_session_id
                  WHERE ar.student_id = u.id AND ar.status = 'present'
                    AND cs.group_id = u.group_id
                    AND cs.is_active = 0
                    AND ($2 IS NULL OR cs.subject_id = $2)
                    AND ($3 IS NULL OR cs.date >= $3)
                    AND ($4 IS NULL OR cs.date <= $4)) AS present,
                (SELECT COUNT(*) FROM attendance_records ar
                   JOIN class_sessions cs ON cs.id = ar.class_session_id
                  WHERE ar.student_id = u.id AND ar.status = 'late'
                    AND cs.group_id = u.group_id
                    AND cs.is_active = 0
                    AND ($2 IS NULL OR cs.subject_id = $2)
                    AND ($3 IS NULL OR cs.date >= $3)
                    AND ($4 IS NULL OR cs.date <= $4)) AS late
            FROM users u
            JOIN student_groups g ON g.id = u.group_id
            WHERE u.role = 'student'
              AND ($1 IS NULL OR u.group_id = $1)
        )
        ORDER BY group_name, last_name, first_name
        "#,
    )
    .bind(report.group_id)
    .bind(report.subject_id)
    .bind(report.date_from)
    .bind(report.date_to)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

fn csv_quote(s: &str) -> String {
    if s.contains(',') || s.contains('"') || s.contains('\n') || s.contains('\r') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

/// Renders rows as RFC 4180 CSV with a header line and CRLF line endings.
pub fn render_csv(rows: &[AttendanceSummaryRow]) -> String {
    let mut out = String::from(
        "student_id,username,last_name,first_name,group,sessions_held,present,late,absent,attendance_rate\r\n",
    );
    for row in rows {
        // Writing into a String cannot fail.
        let _ = write!(
            out,
            "{},{},{},{},{},{},{},{},{},{:.2}\r\n",
            row.student_id,
            csv_quote(&row.username),
            csv_quote(&row.last_name),
            csv_quote(&row.first_name),
            csv_quote(&row.group_name),
            row.sessions_held,
            row.present,
            row.late,
            row.absent,
            row.attendance_rate(),
        );
    }
    out
}

/// Renders the report and its rows as a JSON document.
pub fn render_json(report: &Report, rows: &[AttendanceSummaryRow]) -> Result<String, AppError> {
    let body = serde_json::json!({
        "report": report,
        "rows": rows
            .iter()
            .map(|row| {
                let mut value = serde_json::to_value(row)?;
                value["attendanceRate"] = serde_json::json!(row.attendance_rate());
                Ok(value)
            })
            .collect::<Result<Vec<_>, serde_json::Error>>()
            .map_err(|e| AppError::InternalServerError(e.to_string()))?,
    });
    serde_json::to_string_pretty(&body).map_err(|e| AppError::InternalServerError(e.to_string()))
}
