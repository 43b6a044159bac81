// tests/common/mod.rs

#![allow(dead_code)]

use std::net::SocketAddr;

use attendance::{config::Config, db, routes, state::AppState};
use chrono::FixedOffset;
use serde_json::{Value, json};

pub const ADMIN_USERNAME: &str = "admin";
pub const ADMIN_PASSWORD: &str = "admin_password";

pub struct TestApp {
    pub address: String,
    pub client: reqwest::Client,
}

/// Spawns the app on a random port over a fresh in-memory database.
/// The configured admin account is seeded the same way `main` does it.
pub async fn spawn_app() -> TestApp {
    let database_url = "sqlite::memory:".to_string();

    let pool = db::connect(&database_url)
        .await
        .expect("Failed to open in-memory database");
    db::migrate(&pool).await.expect("Failed to migrate database");

    let config = Config {
        database_url,
        jwt_secret: "test_secret_for_integration_tests".to_string(),
        jwt_expiration: 600,
        rust_log: "error".to_string(),
        bind_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
        cors_origins: vec!["http://localhost:5173".to_string()],
        admin_username: Some(ADMIN_USERNAME.to_string()),
        admin_password: Some(ADMIN_PASSWORD.to_string()),
        utc_offset: FixedOffset::east_opt(0).unwrap(),
        enforce_session_end: false,
    };

    db::seed_admin_user(&pool, &config)
        .await
        .expect("Failed to seed admin");

    let app = routes::create_router(AppState { pool, config });

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind random port");
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestApp {
        address: format!("http://127.0.0.1:{}", port),
        client: reqwest::Client::new(),
    }
}

impl TestApp {
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.address, path)
    }

    /// Logs in and returns the bearer token.
    pub async fn login(&self, username: &str, password: &str) -> String {
        let response = self
            .client
            .post(self.url("/api/auth/login"))
            .json(&json!({ "username": username, "password": password }))
            .send()
            .await
            .expect("Failed to execute request");
        assert_eq!(response.status().as_u16(), 200, "login failed for {username}");

        let body: Value = response.json().await.unwrap();
        body["token"].as_str().unwrap().to_string()
    }

    pub async fn admin_token(&self) -> String {
        self.login(ADMIN_USERNAME, ADMIN_PASSWORD).await
    }

    /// POSTs `body` with a bearer token, asserts the status and returns the JSON body.
    pub async fn post_json(&self, token: &str, path: &str, body: Value, expected: u16) -> Value {
        let response = self
            .client
            .post(self.url(path))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .expect("Failed to execute request");
        assert_eq!(response.status().as_u16(), expected, "POST {path}");
        response.json().await.unwrap_or(Value::Null)
    }

    pub async fn get_json(&self, token: &str, path: &str, expected: u16) -> Value {
        let response = self
            .client
            .get(self.url(path))
            .bearer_auth(token)
            .send()
            .await
            .expect("Failed to execute request");
        assert_eq!(response.status().as_u16(), expected, "GET {path}");
        response.json().await.unwrap_or(Value::Null)
    }

    pub async fn put_json(&self, token: &str, path: &str, body: Value, expected: u16) -> Value {
        let response = self
            .client
            .put(self.url(path))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .expect("Failed to execute request");
        assert_eq!(response.status().as_u16(), expected, "PUT {path}");
        response.json().await.unwrap_or(Value::Null)
    }

    /// Creates faculty, department and group through the admin API.
    /// Returns the group id.
    pub async fn create_group(&self, admin: &str, name: &str) -> i64 {
        let faculty = self
            .post_json(admin, "/api/admin/faculties", json!({ "name": format!("Faculty {name}") }), 201)
            .await;
        let department = self
            .post_json(
                admin,
                "/api/admin/departments",
                json!({ "name": format!("Dept {name}"), "facultyId": faculty["id"] }),
                201,
            )
            .await;
        let group = self
            .post_json(
                admin,
                "/api/admin/groups",
                json!({ "name": name, "departmentId": department["id"], "courseYear": 2 }),
                201,
            )
            .await;
        group["id"].as_i64().unwrap()
    }

    /// Creates a user through the admin API and returns its id.
    pub async fn create_user(&self, admin: &str, username: &str, role: &str, group_id: Option<i64>) -> i64 {
        let user = self
            .post_json(
                admin,
                "/api/admin/users",
                json!({
                    "username": username,
                    "password": "password123",
                    "firstName": "Test",
                    "lastName": username,
                    "role": role,
                    "groupId": group_id,
                }),
                201,
            )
            .await;
        user["id"].as_i64().unwrap()
    }
}
