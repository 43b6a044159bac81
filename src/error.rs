// src/error.rs

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;

/// Global Application Error Enum.
/// Centralizes error handling and mapping to HTTP responses.
#[derive(Debug)]
pub enum AppError {
    // 500 Internal Server Error
    InternalServerError(String),

    // 400 Bad Request (malformed or invalid input)
    BadRequest(String),

    // 401 Unauthorized
    AuthError(String),

    // 403 Forbidden (role or ownership mismatch)
    Forbidden(String),

    // 404 Not Found
    NotFound(String),

    // 409 Conflict (e.g., duplicate username, row still referenced)
    Conflict(String),

    // 404, deliberately indistinguishable from a missing session
    InvalidToken,

    // 403, student is not in the session's group
    NotEnrolled,

    // 400, a record for this (session, student) already exists
    DuplicateCheckIn,
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::InternalServerError(msg) => write!(f, "internal error: {msg}"),
            AppError::BadRequest(msg)
            | AppError::AuthError(msg)
            | AppError::Forbidden(msg)
            | AppError::NotFound(msg)
            | AppError::Conflict(msg) => f.write_str(msg),
            AppError::InvalidToken => f.write_str("QR code is invalid or the class has ended"),
            AppError::NotEnrolled => f.write_str("You are not enrolled in this class"),
            AppError::DuplicateCheckIn => {
                f.write_str("Attendance for this class has already been recorded")
            }
        }
    }
}

impl std::error::Error for AppError {}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::InternalServerError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::BadRequest(_) | AppError::DuplicateCheckIn => StatusCode::BAD_REQUEST,
            AppError::AuthError(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) | AppError::NotEnrolled => StatusCode::FORBIDDEN,
            AppError::NotFound(_) | AppError::InvalidToken => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
        }
    }
}

/// Implements `IntoResponse` for `AppError`.
/// Converts the error into a JSON response with appropriate HTTP status code.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let error_message = match &self {
            AppError::InternalServerError(msg) => {
                tracing::error!("Internal Server Error: {}", msg);
                "Internal Server Error".to_string()
            }
            other => other.to_string(),
        };
        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

/// Converts `sqlx::Error` into `AppError`.
/// Constraint violations become client errors, everything else is a 500.
impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        if let Some(db_err) = err.as_database_error() {
            if db_err.is_unique_violation() {
                return AppError::Conflict("Record already exists".to_string());
            }
            if db_err.is_foreign_key_violation() {
                return AppError::Conflict(
                    "Referenced record is missing or still in use".to_string(),
                );
            }
        }
        AppError::InternalServerError(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::BadRequest(err.to_string())
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::BadRequest(err.to_string())
    }
}

impl From<jsonwebtoken::errors::Error> for AppError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        AppError::InternalServerError(err.to_string())
    }
}

/// True when the error is a UNIQUE constraint violation reported by the database.
pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .is_some_and(|db_err| db_err.is_unique_violation())
}
