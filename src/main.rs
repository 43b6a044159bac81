// src/main.rs

use std::process::ExitCode;
use std::time::Duration;

use attendance::config::Config;
use attendance::state::AppState;
use attendance::{db, routes};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> ExitCode {
    // Load configuration from environment (and .env, if present)
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            return ExitCode::FAILURE;
        }
    };

    let file_appender = tracing_appender::rolling::daily("logs", "app.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    let env_filter = EnvFilter::new(&config.rust_log);
    let stdout_layer = fmt::layer().with_writer(std::io::stdout).with_target(false);
    let file_layer = fmt::layer().with_writer(non_blocking).with_ansi(false);

    // Initialize Tracing (Logging)
    tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .with(file_layer)
        .init();

    // Open the database, retrying while the file is locked or its volume is not mounted yet
    let mut retry_count = 0;
    let pool = loop {
        match db::connect(&config.database_url).await {
            Ok(pool) => break pool,
            Err(e) => {
                retry_count += 1;
                if retry_count > 5 {
                    tracing::error!("Failed to open database after 5 retries: {}", e);
                    return ExitCode::FAILURE;
                }
                tracing::warn!("Database not ready, retrying in 2s... (Attempt {})", retry_count);
                tokio::time::sleep(Duration::from_secs(2)).await;
            }
        }
    };

    tracing::info!("Database connected...");

    tracing::info!("Running migrations...");
    if let Err(e) = db::migrate(&pool).await {
        tracing::error!("Failed to run database migrations: {}", e);
        return ExitCode::FAILURE;
    }
    tracing::info!("Migrations applied successfully.");

    if let Err(e) = db::seed_admin_user(&pool, &config).await {
        tracing::error!("Failed to seed admin user: {:?}", e);
    }

    let addr = config.bind_addr;
    let state = AppState { pool, config };
    let app = routes::create_router(state);

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("Failed to bind {}: {}", addr, e);
            return ExitCode::FAILURE;
        }
    };
    tracing::info!("Listening on {}", addr);

    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!("Server error: {}", e);
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}
