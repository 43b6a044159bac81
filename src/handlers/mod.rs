// src/handlers/mod.rs

pub mod admin;
pub mod auth;
pub mod directory;
pub mod reports;
pub mod student;
pub mod teacher;

use crate::{error::AppError, services::class_session::Requester, utils::jwt::Claims};

/// Identity of the caller as carried by the verified session.
pub(crate) fn requester(claims: &Claims) -> Result<Requester, AppError> {
    Ok(Requester {
        id: claims.user_id()?,
        role: claims.role()?,
    })
}
