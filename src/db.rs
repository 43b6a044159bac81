// src/db.rs

use std::{str::FromStr, time::Duration};

use sqlx::{
    SqlitePool,
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
};

use crate::{config::Config, error::AppError, utils::hash::hash_password};

/// Opens the SQLite pool.
///
/// In-memory databases live only as long as their connection, so they get a
/// single connection that is never recycled.
pub async fn connect(database_url: &str) -> Result<SqlitePool, sqlx::Error> {
    let in_memory = database_url.contains(":memory:") || database_url.contains("mode=memory");

    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .foreign_keys(true)
        .busy_timeout(Duration::from_secs(5));

    if in_memory {
        SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
    } else {
        SqlitePoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(3))
            .connect_with(options.journal_mode(SqliteJournalMode::Wal))
            .await
    }
}

/// Applies the embedded migrations.
pub async fn migrate(pool: &SqlitePool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}

/// Creates the configured admin account on first start.
pub async fn seed_admin_user(pool: &SqlitePool, config: &Config) -> Result<(), AppError> {
    let (Some(username), Some(password)) = (&config.admin_username, &config.admin_password) else {
        return Ok(());
    };

    let user_exists: Option<i64> = sqlx::query_scalar("SELECT id FROM users WHERE username = $1")
        .bind(username)
        .fetch_optional(pool)
        .await?;

    if user_exists.is_none() {
        tracing::info!("Seeding admin user: {}", username);
        let hashed_password = hash_password(password)?;

        sqlx::query(
            "INSERT INTO users (username, password, first_name, last_name, role)
             VALUES ($1, $2, 'System', 'Administrator', 'admin')",
        )
        .bind(username)
        .bind(hashed_password)
        .execute(pool)
        .await?;
        tracing::info!("Admin user created successfully.");
    }
    Ok(())
}

/// Fails with `BadRequest(message)` unless `table` has a row with this id.
pub async fn ensure_exists(
    pool: &SqlitePool,
    table: &'static str,
    id: i64,
    message: &str,
) -> Result<(), AppError> {
    let found: Option<i64> = sqlx::query_scalar(&format!("SELECT id FROM {table} WHERE id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await?;

    found
        .map(|_| ())
        .ok_or_else(|| AppError::BadRequest(message.to_string()))
}
