// src/models/user.rs

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

/// Account role. Stored as lowercase text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Student,
    Teacher,
    Admin,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Teacher => "teacher",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "student" => Ok(Role::Student),
            "teacher" => Ok(Role::Teacher),
            "admin" => Ok(Role::Admin),
            other => Err(format!("Unknown role '{other}'")),
        }
    }
}

/// Represents the 'users' table in the database.
#[derive(Debug, Clone, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: i64,

    /// Unique login name.
    pub username: String,

    /// Argon2 password hash.
    /// Skipped during serialization to prevent leaking sensitive data.
    #[serde(skip)]
    pub password: String,

    pub first_name: String,
    pub last_name: String,

    /// 'student', 'teacher' or 'admin'.
    pub role: String,

    /// Set for students; decides which class sessions they may check into.
    pub group_id: Option<i64>,

    /// Set for teachers.
    pub department_id: Option<i64>,

    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl User {
    pub fn role(&self) -> Role {
        // The CHECK constraint on users.role keeps this total.
        self.role.parse().unwrap_or(Role::Student)
    }
}

pub const USER_COLUMNS: &str =
    "id, username, password, first_name, last_name, role, group_id, department_id, created_at";

/// DTO for creating a user, either by self-registration or by an admin.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserRequest {
    #[validate(length(
        min = 3,
        max = 50,
        message = "Username length must be between 3 and 50 characters."
    ))]
    pub username: String,
    #[validate(length(
        min = 6,
        max = 128,
        message = "Password length must be between 6 and 128 characters."
    ))]
    pub password: String,
    #[validate(length(min = 1, max = 100, message = "First name is required."))]
    pub first_name: String,
    #[validate(length(min = 1, max = 100, message = "Last name is required."))]
    pub last_name: String,
    pub role: Role,
    pub group_id: Option<i64>,
    pub department_id: Option<i64>,
}

/// DTO for user login.
#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(length(min = 1, max = 50))]
    pub username: String,
    #[validate(length(min = 1, max = 128))]
    pub password: String,
}

/// DTO for updating a user. Fields are optional.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUserRequest {
    #[validate(length(min = 3, max = 50))]
    pub username: Option<String>,
    #[validate(length(min = 6, max = 128))]
    pub password: Option<String>,
    #[validate(length(min = 1, max = 100))]
    pub first_name: Option<String>,
    #[validate(length(min = 1, max = 100))]
    pub last_name: Option<String>,
    pub role: Option<Role>,
    pub group_id: Option<i64>,
    pub department_id: Option<i64>,
}

/// Query parameters for the admin user listing.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserListParams {
    pub role: Option<Role>,
    pub group_id: Option<i64>,
}
