// src/models/class_session.rs

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

/// Represents the 'class_sessions' table.
///
/// `token` is only ever set while `is_active` is true.
#[derive(Debug, Clone, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassSession {
    pub id: i64,
    pub teacher_id: i64,
    pub subject_id: i64,
    pub group_id: i64,
    pub classroom: String,
    /// Local calendar date of `start_time`.
    pub date: NaiveDate,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub token: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

pub const CLASS_SESSION_COLUMNS: &str = "id, teacher_id, subject_id, group_id, classroom, date, \
     start_time, end_time, token, is_active, created_at";

/// DTO for creating a class session.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateClassSessionRequest {
    pub subject_id: i64,
    pub group_id: i64,
    #[validate(length(min = 1, max = 50, message = "Classroom is required."))]
    pub classroom: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    /// Only honoured for admins creating a session on a teacher's behalf.
    pub teacher_id: Option<i64>,
}

/// Query parameters for listing a teacher's sessions.
#[derive(Debug, Default, Deserialize)]
pub struct ClassSessionListParams {
    pub active: Option<bool>,
}

/// Response of the QR minting endpoint.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QrCodeResponse {
    pub qr_code: String,
}

/// A session as shown to a student of its group, with the student's own outcome.
#[derive(Debug, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct StudentClassView {
    pub id: i64,
    pub subject_id: i64,
    pub subject_name: String,
    pub teacher_name: String,
    pub classroom: String,
    pub date: NaiveDate,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub is_active: bool,
    /// 'present', 'late', 'absent' once the session is over, or null while it can still be attended.
    pub status: Option<String>,
}
