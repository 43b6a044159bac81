// src/models/progress.rs

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use sqlx::FromRow;

/// Gamification state of one student.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProgress {
    pub student_id: i64,
    pub points: i64,
    pub streak: i64,
    pub level: i64,
    pub last_attendance: Option<NaiveDate>,
    /// Unlocked achievement ids in unlock order. Append-only.
    pub achievements: Vec<i64>,
}

impl UserProgress {
    pub fn new(student_id: i64) -> Self {
        Self {
            student_id,
            points: 0,
            streak: 0,
            level: 1,
            last_attendance: None,
            achievements: Vec::new(),
        }
    }
}

/// Row of 'user_progress' without the achievement set.
#[derive(Debug, FromRow)]
pub struct ProgressRow {
    pub student_id: i64,
    pub points: i64,
    pub streak: i64,
    pub level: i64,
    pub last_attendance: Option<NaiveDate>,
}

#[derive(Debug, FromRow)]
pub struct UnlockedAchievement {
    pub achievement_id: i64,
    pub unlocked_at: DateTime<Utc>,
}

/// `GET /api/student/progress` payload.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressResponse {
    pub points: i64,
    pub streak: i64,
    pub level: i64,
    pub level_name: &'static str,
    /// Points needed for the next level, absent at the top level.
    pub next_level_points: Option<i64>,
    pub last_attendance: Option<NaiveDate>,
    pub achievements: Vec<i64>,
    pub total_attendance: i64,
}

/// Catalog entry annotated for one student.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AchievementView {
    pub id: i64,
    pub name: &'static str,
    pub description: &'static str,
    pub unlocked: bool,
    pub unlocked_at: Option<DateTime<Utc>>,
}
