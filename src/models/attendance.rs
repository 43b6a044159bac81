// src/models/attendance.rs

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Outcome of a check-in. Absence is never stored; it is the lack of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttendanceStatus {
    Present,
    Late,
}

impl AttendanceStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            AttendanceStatus::Present => "present",
            AttendanceStatus::Late => "late",
        }
    }
}

impl fmt::Display for AttendanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Represents the 'attendance_records' table. Immutable once written.
#[derive(Debug, Clone, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceRecord {
    pub id: i64,
    pub class_session_id: i64,
    pub student_id: i64,
    pub timestamp: DateTime<Utc>,
    pub status: String,
}

/// DTO for a student scanning a QR code.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckInRequest {
    pub qr_code: String,
}

/// One record of a session, joined with the student's name (teacher view).
#[derive(Debug, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct SessionAttendanceEntry {
    pub id: i64,
    pub student_id: i64,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub timestamp: DateTime<Utc>,
    pub status: String,
}

/// One record of the current student, joined with session details.
#[derive(Debug, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct StudentAttendanceEntry {
    pub id: i64,
    pub class_session_id: i64,
    pub subject_name: String,
    pub classroom: String,
    pub start_time: DateTime<Utc>,
    pub timestamp: DateTime<Utc>,
    pub status: String,
}

/// A member of the session's group and how they attended.
#[derive(Debug, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct RosterEntry {
    pub student_id: i64,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    /// 'present', 'late', 'absent' once the session is over, or null while it is open.
    pub status: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
}
