// src/models/directory.rs

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

#[derive(Debug, Clone, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Faculty {
    pub id: i64,
    pub name: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Department {
    pub id: i64,
    pub name: String,
    pub faculty_id: i64,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// A student group (the unit a class session is scheduled for).
#[derive(Debug, Clone, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    pub id: i64,
    pub name: String,
    pub department_id: Option<i64>,
    pub course_year: Option<i64>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Subject {
    pub id: i64,
    pub name: String,
    pub code: Option<String>,
    pub department_id: Option<i64>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct FacultyRequest {
    #[validate(length(min = 1, max = 200, message = "Name is required."))]
    pub name: String,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct DepartmentRequest {
    #[validate(length(min = 1, max = 200, message = "Name is required."))]
    pub name: String,
    pub faculty_id: i64,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct GroupRequest {
    #[validate(length(min = 1, max = 100, message = "Name is required."))]
    pub name: String,
    pub department_id: Option<i64>,
    #[validate(range(min = 1, max = 8, message = "Course year must be between 1 and 8."))]
    pub course_year: Option<i64>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SubjectRequest {
    #[validate(length(min = 1, max = 200, message = "Name is required."))]
    pub name: String,
    #[validate(length(min = 1, max = 32))]
    pub code: Option<String>,
    pub department_id: Option<i64>,
}
