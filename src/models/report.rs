// src/models/report.rs

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

/// Represents the 'reports' table: a saved report definition.
/// The data is computed when the report is downloaded.
#[derive(Debug, Clone, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub id: i64,
    pub title: String,
    pub kind: String,
    pub group_id: Option<i64>,
    pub subject_id: Option<i64>,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    pub created_by: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateReportRequest {
    #[validate(length(min = 1, max = 200, message = "Title is required."))]
    pub title: String,
    pub group_id: Option<i64>,
    pub subject_id: Option<i64>,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
pub struct DownloadParams {
    pub format: Option<String>,
}

/// One student line of an attendance report.
#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceSummaryRow {
    pub student_id: i64,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub group_name: String,
    pub sessions_held: i64,
    pub present: i64,
    pub late: i64,
    pub absent: i64,
}

impl AttendanceSummaryRow {
    /// Share of held sessions attended (present or late), 0.0 when nothing was held.
    pub fn attendance_rate(&self) -> f64 {
        if self.sessions_held == 0 {
            return 0.0;
        }
        (self.present + self.late) as f64 / self.sessions_held as f64
    }
}
