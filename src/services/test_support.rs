// src/services/test_support.rs

use std::{net::SocketAddr, path::PathBuf};

use chrono::{DateTime, Duration, FixedOffset, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::{config::Config, db, models::user::Role, services::class_session::Requester};

pub async fn memory_pool() -> SqlitePool {
    let pool = db::connect("sqlite::memory:").await.unwrap();
    db::migrate(&pool).await.unwrap();
    pool
}

/// A migrated database file with a multi-connection WAL pool, removed on drop.
pub struct FileDb {
    pub pool: SqlitePool,
    path: PathBuf,
}

impl FileDb {
    pub async fn create() -> Self {
        let path = std::env::temp_dir().join(format!("attendance-{}.db", Uuid::new_v4().simple()));
        let pool = db::connect(&format!("sqlite://{}?mode=rwc", path.display()))
            .await
            .unwrap();
        db::migrate(&pool).await.unwrap();
        Self { pool, path }
    }
}

impl Drop for FileDb {
    fn drop(&mut self) {
        for suffix in ["", "-wal", "-shm"] {
            let _ = std::fs::remove_file(format!("{}{suffix}", self.path.display()));
        }
    }
}

pub fn test_config() -> Config {
    Config {
        database_url: "sqlite::memory:".to_string(),
        jwt_secret: "unit_test_secret".to_string(),
        jwt_expiration: 600,
        rust_log: "error".to_string(),
        bind_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
        cors_origins: Vec::new(),
        admin_username: None,
        admin_password: None,
        utc_offset: FixedOffset::east_opt(0).unwrap(),
        enforce_session_end: false,
    }
}

pub fn minutes_from_now(minutes: i64) -> DateTime<Utc> {
    Utc::now() + Duration::minutes(minutes)
}

/// Two groups, one subject, two teachers, an admin and three students
/// (two in the first group, one outsider).
pub struct Fixture {
    pub group_id: i64,
    pub other_group_id: i64,
    pub subject_id: i64,
    pub teacher_id: i64,
    pub other_teacher_id: i64,
    pub admin_id: i64,
    pub student_id: i64,
    pub classmate_id: i64,
    pub outsider_id: i64,
}

impl Fixture {
    pub async fn seed(pool: &SqlitePool) -> Self {
        let faculty_id = insert(pool, "INSERT INTO faculties (name) VALUES ('Engineering') RETURNING id").await;
        let department_id: i64 =
            sqlx::query_scalar("INSERT INTO departments (name, faculty_id) VALUES ('CS', $1) RETURNING id")
                .bind(faculty_id)
                .fetch_one(pool)
                .await
                .unwrap();
        let group_id = insert(pool, "INSERT INTO student_groups (name) VALUES ('CS-21') RETURNING id").await;
        let other_group_id = insert(pool, "INSERT INTO student_groups (name) VALUES ('CS-22') RETURNING id").await;
        let subject_id = insert(pool, "INSERT INTO subjects (name) VALUES ('Algorithms') RETURNING id").await;

        Self {
            group_id,
            other_group_id,
            subject_id,
            teacher_id: user(pool, "teacher1", Role::Teacher, None, Some(department_id)).await,
            other_teacher_id: user(pool, "teacher2", Role::Teacher, None, Some(department_id)).await,
            admin_id: user(pool, "admin", Role::Admin, None, None).await,
            student_id: user(pool, "student1", Role::Student, Some(group_id), None).await,
            classmate_id: user(pool, "student2", Role::Student, Some(group_id), None).await,
            outsider_id: user(pool, "student3", Role::Student, Some(other_group_id), None).await,
        }
    }

    pub fn teacher(&self) -> Requester {
        Requester { id: self.teacher_id, role: Role::Teacher }
    }

    pub fn other_teacher(&self) -> Requester {
        Requester { id: self.other_teacher_id, role: Role::Teacher }
    }

    pub fn admin(&self) -> Requester {
        Requester { id: self.admin_id, role: Role::Admin }
    }
}

async fn insert(pool: &SqlitePool, sql: &str) -> i64 {
    sqlx::query_scalar(sql).fetch_one(pool).await.unwrap()
}

async fn user(
    pool: &SqlitePool,
    username: &str,
    role: Role,
    group_id: Option<i64>,
    department_id: Option<i64>,
) -> i64 {
    sqlx::query_scalar(
        "INSERT INTO users (username, password, first_name, last_name, role, group_id, department_id)
         VALUES ($1, 'unused', $1, 'Test', $2, $3, $4)
         RETURNING id",
    )
    .bind(username)
    .bind(role.as_str())
    .bind(group_id)
    .bind(department_id)
    .fetch_one(pool)
    .await
    .unwrap()
}
