// src/config.rs

use std::{env, fmt, net::SocketAddr, str::FromStr};

use chrono::FixedOffset;
use dotenvy::dotenv;

/// Minutes after a session's start during which a check-in still counts as present.
pub const GRACE_PERIOD_MINUTES: i64 = 15;

/// Points credited for every accepted check-in.
pub const ATTENDANCE_POINTS: i64 = 10;

/// Extra points for extending a streak into the next calendar day.
pub const STREAK_BONUS_POINTS: i64 = 5;

/// Name of the cookie carrying the signed session token.
pub const SESSION_COOKIE: &str = "session";

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    /// Token lifetime in seconds.
    pub jwt_expiration: u64,
    pub rust_log: String,
    pub bind_addr: SocketAddr,
    pub cors_origins: Vec<String>,
    pub admin_username: Option<String>,
    pub admin_password: Option<String>,
    /// Offset that defines the local calendar day for streaks.
    pub utc_offset: FixedOffset,
    /// Reject check-ins once `end_time` has passed even if the teacher never ended the session.
    pub enforce_session_end: bool,
}

#[derive(Debug)]
pub enum ConfigError {
    Missing(&'static str),
    Invalid { key: &'static str, value: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Missing(key) => write!(f, "{key} must be set"),
            ConfigError::Invalid { key, value } => write!(f, "{key} has invalid value '{value}'"),
        }
    }
}

impl std::error::Error for ConfigError {}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv().ok();

        let database_url = env::var("DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://attendance.db?mode=rwc".to_string());

        let jwt_secret = env::var("JWT_SECRET").map_err(|_| ConfigError::Missing("JWT_SECRET"))?;

        let jwt_expiration = parse_var("JWT_EXPIRATION", 86_400)?;

        let rust_log = env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

        let bind_addr = parse_var("BIND_ADDR", SocketAddr::from(([0, 0, 0, 0], 3000)))?;

        let cors_origins = env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:5173,http://127.0.0.1:5173".to_string())
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect();

        let utc_offset = parse_var(
            "UTC_OFFSET",
            FixedOffset::east_opt(0).ok_or(ConfigError::Missing("UTC_OFFSET"))?,
        )?;

        let enforce_session_end = parse_var("ENFORCE_SESSION_END", false)?;

        Ok(Self {
            database_url,
            jwt_secret,
            jwt_expiration,
            rust_log,
            bind_addr,
            cors_origins,
            admin_username: env::var("ADMIN_USERNAME").ok(),
            admin_password: env::var("ADMIN_PASSWORD").ok(),
            utc_offset,
            enforce_session_end,
        })
    }
}

fn parse_var<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value }),
        Err(_) => Ok(default),
    }
}
