// src/utils/jwt.rs

use std::time::{SystemTime, UNIX_EPOCH};

use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, HeaderValue, Request, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

use crate::{
    config::{Config, SESSION_COOKIE},
    error::AppError,
    models::user::Role,
};

/// JWT Claims structure.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Claims {
    /// Subject - Stores the User ID (as string).
    pub sub: String,
    /// User's role: 'student', 'teacher' or 'admin'.
    pub role: String,
    /// Expiration time as Unix timestamp.
    pub exp: usize,
}

impl Claims {
    pub fn user_id(&self) -> Result<i64, AppError> {
        self.sub
            .parse()
            .map_err(|_| AppError::AuthError("Malformed session".to_string()))
    }

    pub fn role(&self) -> Result<Role, AppError> {
        self.role
            .parse()
            .map_err(|_| AppError::AuthError("Malformed session".to_string()))
    }
}

/// Signs a new JWT binding the user id and role.
pub fn sign_jwt(id: i64, role: Role, secret: &str, expiration_seconds: u64) -> Result<String, AppError> {
    let expiration = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| AppError::InternalServerError(e.to_string()))?
        .as_secs() as usize
        + expiration_seconds as usize;

    let claims = Claims {
        sub: id.to_string(),
        role: role.as_str().to_owned(),
        exp: expiration,
    };

    Ok(encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?)
}

/// Verifies and decodes a JWT string.
pub fn verify_jwt(token: &str, secret: &str) -> Result<Claims, AppError> {
    let token_data = decode(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| AppError::AuthError("Invalid token".to_string()))?;

    Ok(token_data.claims)
}

/// `Set-Cookie` value carrying the session token.
pub fn session_cookie(token: &str, max_age_seconds: u64) -> Result<HeaderValue, AppError> {
    HeaderValue::from_str(&format!(
        "{SESSION_COOKIE}={token}; HttpOnly; SameSite=Lax; Path=/; Max-Age={max_age_seconds}"
    ))
    .map_err(|e| AppError::InternalServerError(e.to_string()))
}

/// `Set-Cookie` value that drops the session cookie.
pub fn expired_session_cookie() -> HeaderValue {
    HeaderValue::from_static("session=; HttpOnly; SameSite=Lax; Path=/; Max-Age=0")
}

/// Pulls the session token from `Authorization: Bearer` or, failing that, the session cookie.
fn extract_token(headers: &HeaderMap) -> Option<&str> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "));

    bearer.or_else(|| {
        headers
            .get_all(header::COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(|value| value.split(';'))
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(name, _)| *name == SESSION_COOKIE)
            .map(|(_, value)| value)
            .filter(|value| !value.is_empty())
    })
}

/// Axum Middleware: Authentication.
///
/// Validates the session token and injects `Claims` into the request
/// extensions for handlers to use. Returns 401 otherwise.
pub async fn auth_middleware(
    State(config): State<Config>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let token = extract_token(req.headers())
        .ok_or_else(|| AppError::AuthError("Authentication required".to_string()))?;

    let claims = verify_jwt(token, &config.jwt_secret)?;
    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}

async fn require_roles(allowed: &[Role], req: Request<Body>, next: Next) -> Response {
    let role = match req.extensions().get::<Claims>() {
        Some(claims) => claims.role(),
        None => Err(AppError::AuthError("Authentication required".to_string())),
    };

    match role {
        Ok(role) if allowed.contains(&role) => next.run(req).await,
        Ok(_) => AppError::Forbidden("Insufficient permissions".to_string()).into_response(),
        Err(e) => e.into_response(),
    }
}

/// Must be used AFTER `auth_middleware`. Admins only.
pub async fn admin_middleware(req: Request<Body>, next: Next) -> Response {
    require_roles(&[Role::Admin], req, next).await
}

/// Must be used AFTER `auth_middleware`. Teachers, and admins acting for them.
pub async fn teacher_middleware(req: Request<Body>, next: Next) -> Response {
    require_roles(&[Role::Teacher, Role::Admin], req, next).await
}

/// Must be used AFTER `auth_middleware`. Students only.
pub async fn student_middleware(req: Request<Body>, next: Next) -> Response {
    require_roles(&[Role::Student], req, next).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_and_verify_round_trip() {
        let token = sign_jwt(7, Role::Teacher, "secret", 60).unwrap();
        let claims = verify_jwt(&token, "secret").unwrap();
        assert_eq!(claims.user_id().unwrap(), 7);
        assert_eq!(claims.role().unwrap(), Role::Teacher);
        assert!(verify_jwt(&token, "other-secret").is_err());
    }

    #[test]
    fn token_from_bearer_header() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc.def"));
        assert_eq!(extract_token(&headers), Some("abc.def"));
    }

    #[test]
    fn token_from_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("theme=dark; session=abc.def; lang=ru"),
        );
        assert_eq!(extract_token(&headers), Some("abc.def"));
    }

    #[test]
    fn cleared_cookie_is_not_a_token() {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_static("session="));
        assert_eq!(extract_token(&headers), None);
    }
}
