// src/services/check_in.rs

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use sqlx::{SqliteConnection, SqlitePool};

use crate::{
    config::{Config, GRACE_PERIOD_MINUTES},
    error::{AppError, is_unique_violation},
    models::{
        attendance::{AttendanceRecord, AttendanceStatus},
        class_session::{CLASS_SESSION_COLUMNS, ClassSession},
        progress::UserProgress,
    },
    services::gamification,
    utils::qr::looks_like_qr_token,
};

/// Result of an accepted check-in.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckInOutcome {
    pub record: AttendanceRecord,
    pub progress: UserProgress,
}

/// `present` up to and including start + grace period, `late` afterwards.
pub fn classify(start_time: DateTime<Utc>, now: DateTime<Utc>) -> AttendanceStatus {
    if now <= start_time + Duration::minutes(GRACE_PERIOD_MINUTES) {
        AttendanceStatus::Present
    } else {
        AttendanceStatus::Late
    }
}

/// Redeems a QR token for `student_id` at instant `now`.
///
/// The record insert and the progress update share one transaction. The
/// UNIQUE (class_session_id, student_id) index is what settles concurrent
/// attempts by the same student; the loser gets `DuplicateCheckIn`.
pub async fn check_in(
    pool: &SqlitePool,
    config: &Config,
    token: &str,
    student_id: i64,
    now: DateTime<Utc>,
) -> Result<CheckInOutcome, AppError> {
    let token = token.trim();
    if !looks_like_qr_token(token) {
        tracing::debug!(student_id, "Rejected malformed QR token");
        return Err(AppError::InvalidToken);
    }

    let session = sqlx::query_as::<_, ClassSession>(&format!(
        "SELECT {CLASS_SESSION_COLUMNS} FROM class_sessions WHERE token = $1 AND is_active = 1"
    ))
    .bind(token)
    .fetch_optional(pool)
    .await?
    .ok_or(AppError::InvalidToken)?;

    if config.enforce_session_end && now > session.end_time {
        tracing::warn!(session_id = session.id, student_id, "Check-in after scheduled end");
        return Err(AppError::InvalidToken);
    }

    let group_id: Option<Option<i64>> =
        sqlx::query_scalar("SELECT group_id FROM users WHERE id = $1 AND role = 'student'")
            .bind(student_id)
            .fetch_optional(pool)
            .await?;
    let group_id = group_id.ok_or(AppError::NotFound("Student not found".to_string()))?;

    if group_id != Some(session.group_id) {
        tracing::warn!(session_id = session.id, student_id, "Check-in from outside the group");
        return Err(AppError::NotEnrolled);
    }

    let status = classify(session.start_time, now);

    let mut tx = pool.begin().await?;

    // Writing first takes the write lock up front.
    let record = insert_record(&mut *tx, session.id, student_id, token, now, status)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                tracing::debug!(session_id = session.id, student_id, "Duplicate check-in");
                AppError::DuplicateCheckIn
            } else {
                AppError::from(e)
            }
        })?
        .ok_or(AppError::InvalidToken)?;

    let check_in_date = now.with_timezone(&config.utc_offset).date_naive();
    let progress = gamification::record_progress(&mut *tx, student_id, check_in_date, now).await?;

    tx.commit().await?;

    tracing::info!(
        session_id = session.id,
        student_id,
        status = %status,
        points = progress.points,
        streak = progress.streak,
        "Check-in accepted"
    );

    Ok(CheckInOutcome { record, progress })
}

/// Inserts the record only while the session is still active under `token`,
/// so a session ended or a code rotated after the lookup yields `None`.
async fn insert_record(
    conn: &mut SqliteConnection,
    session_id: i64,
    student_id: i64,
    token: &str,
    now: DateTime<Utc>,
    status: AttendanceStatus,
) -> Result<Option<AttendanceRecord>, sqlx::Error> {
    sqlx::query_as::<_, AttendanceRecord>(
        "INSERT INTO attendance_records (class_session_id, student_id, timestamp, status)
         SELECT $1, $2, $3, $4
         WHERE EXISTS (
             SELECT 1 FROM class_sessions WHERE id = $1 AND is_active = 1 AND token = $5
         )
         RETURNING id, class_session_id, student_id, timestamp, status",
    )
    .bind(session_id)
    .bind(student_id)
    .bind(now)
    .bind(status.as_str())
    .bind(token)
    .fetch_optional(conn)
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::{
        class_session::{create_session, end_session, generate_token},
        test_support::{FileDb, Fixture, memory_pool, minutes_from_now, test_config},
    };
    use crate::models::class_session::CreateClassSessionRequest;
    use chrono::TimeZone;

    async fn open_session(pool: &SqlitePool, fx: &Fixture, start_offset_min: i64) -> (ClassSession, String) {
        let req = CreateClassSessionRequest {
            subject_id: fx.subject_id,
            group_id: fx.group_id,
            classroom: "B-204".to_string(),
            start_time: minutes_from_now(start_offset_min),
            end_time: minutes_from_now(start_offset_min + 90),
            teacher_id: None,
        };
        let config = test_config();
        let session = create_session(pool, fx.teacher(), &req, config.utc_offset).await.unwrap();
        let token = generate_token(pool, session.id, fx.teacher()).await.unwrap();
        (session, token)
    }

    #[test]
    fn grace_boundary_is_inclusive() {
        let start = Utc.with_ymd_and_hms(2025, 3, 3, 10, 0, 0).unwrap();
        assert_eq!(classify(start, start + Duration::minutes(10)), AttendanceStatus::Present);
        assert_eq!(classify(start, start + Duration::minutes(15)), AttendanceStatus::Present);
        assert_eq!(
            classify(start, start + Duration::minutes(15) + Duration::seconds(1)),
            AttendanceStatus::Late
        );
        assert_eq!(classify(start, start - Duration::minutes(5)), AttendanceStatus::Present);
        assert_eq!(classify(start, start + Duration::hours(5)), AttendanceStatus::Late);
    }

    #[tokio::test]
    async fn scenario_present_duplicate_then_late() {
        let pool = memory_pool().await;
        let fx = Fixture::seed(&pool).await;
        let config = test_config();
        let (session, token) = open_session(&pool, &fx, 0).await;

        let at_10 = session.start_time + Duration::minutes(10);
        let at_20 = session.start_time + Duration::minutes(20);

        let first = check_in(&pool, &config, &token, fx.student_id, at_10).await.unwrap();
        assert_eq!(first.record.status, "present");
        assert_eq!(first.progress.points, 10);

        let err = check_in(&pool, &config, &token, fx.student_id, at_20).await.unwrap_err();
        assert!(matches!(err, AppError::DuplicateCheckIn));

        let second = check_in(&pool, &config, &token, fx.classmate_id, at_20).await.unwrap();
        assert_eq!(second.record.status, "late");

        let stored: String = sqlx::query_scalar(
            "SELECT status FROM attendance_records WHERE class_session_id = $1 AND student_id = $2",
        )
        .bind(session.id)
        .bind(fx.student_id)
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(stored, "present");
    }

    #[tokio::test]
    async fn unknown_and_ended_tokens_are_invalid() {
        let pool = memory_pool().await;
        let fx = Fixture::seed(&pool).await;
        let config = test_config();
        let (session, token) = open_session(&pool, &fx, 0).await;

        let err = check_in(&pool, &config, "0123456789abcdef0123456789abcdef", fx.student_id, Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidToken));

        let err = check_in(&pool, &config, &session.id.to_string(), fx.student_id, Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidToken));

        end_session(&pool, session.id, fx.teacher()).await.unwrap();
        let err = check_in(&pool, &config, &token, fx.student_id, Utc::now()).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidToken));
    }

    #[tokio::test]
    async fn regenerated_token_invalidates_the_old_one() {
        let pool = memory_pool().await;
        let fx = Fixture::seed(&pool).await;
        let config = test_config();
        let (session, old_token) = open_session(&pool, &fx, 0).await;
        let new_token = generate_token(&pool, session.id, fx.teacher()).await.unwrap();

        let err = check_in(&pool, &config, &old_token, fx.student_id, Utc::now()).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidToken));
        check_in(&pool, &config, &new_token, fx.student_id, Utc::now()).await.unwrap();
    }

    #[tokio::test]
    async fn other_group_is_not_enrolled() {
        let pool = memory_pool().await;
        let fx = Fixture::seed(&pool).await;
        let config = test_config();
        let (_, token) = open_session(&pool, &fx, 0).await;

        let err = check_in(&pool, &config, &token, fx.outsider_id, Utc::now()).await.unwrap_err();
        assert!(matches!(err, AppError::NotEnrolled));

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM attendance_records")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn late_check_in_is_accepted_until_ended_by_default() {
        let pool = memory_pool().await;
        let fx = Fixture::seed(&pool).await;
        let config = test_config();
        let (session, token) = open_session(&pool, &fx, 0).await;

        let long_after = session.end_time + Duration::hours(3);
        let outcome = check_in(&pool, &config, &token, fx.student_id, long_after).await.unwrap();
        assert_eq!(outcome.record.status, "late");
    }

    #[tokio::test]
    async fn enforced_end_rejects_after_end_time() {
        let pool = memory_pool().await;
        let fx = Fixture::seed(&pool).await;
        let config = Config {
            enforce_session_end: true,
            ..test_config()
        };
        let (session, token) = open_session(&pool, &fx, 0).await;

        let err = check_in(&pool, &config, &token, fx.student_id, session.end_time + Duration::seconds(1))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidToken));

        check_in(&pool, &config, &token, fx.student_id, session.end_time).await.unwrap();
    }

    #[tokio::test]
    async fn concurrent_attempts_yield_one_record() {
        let pool = memory_pool().await;
        let fx = Fixture::seed(&pool).await;
        let config = test_config();
        let (_, token) = open_session(&pool, &fx, 0).await;

        let attempts = (0..8).map(|_| {
            let pool = pool.clone();
            let config = config.clone();
            let token = token.clone();
            let student_id = fx.student_id;
            tokio::spawn(async move { check_in(&pool, &config, &token, student_id, Utc::now()).await })
        });

        let mut accepted = 0;
        let mut duplicates = 0;
        for handle in attempts.collect::<Vec<_>>() {
            match handle.await.unwrap() {
                Ok(_) => accepted += 1,
                Err(AppError::DuplicateCheckIn) => duplicates += 1,
                Err(other) => panic!("unexpected error: {other}"),
            }
        }
        assert_eq!(accepted, 1);
        assert_eq!(duplicates, 7);

        let progress_points: i64 =
            sqlx::query_scalar("SELECT points FROM user_progress WHERE student_id = $1")
                .bind(fx.student_id)
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(progress_points, 10);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_attempts_on_file_database_yield_one_record() {
        let file_db = FileDb::create().await;
        let pool = file_db.pool.clone();
        let fx = Fixture::seed(&pool).await;
        let config = test_config();
        let (_, token) = open_session(&pool, &fx, 0).await;

        let attempts: Vec<_> = (0..16)
            .map(|_| {
                let pool = pool.clone();
                let config = config.clone();
                let token = token.clone();
                let student_id = fx.student_id;
                tokio::spawn(async move { check_in(&pool, &config, &token, student_id, Utc::now()).await })
            })
            .collect();

        let mut accepted = 0;
        for handle in attempts {
            match handle.await.unwrap() {
                Ok(_) => accepted += 1,
                Err(AppError::DuplicateCheckIn) => {}
                Err(other) => panic!("unexpected error: {other}"),
            }
        }
        assert_eq!(accepted, 1);

        let (records, points): (i64, i64) = sqlx::query_as(
            "SELECT (SELECT COUNT(*) FROM attendance_records WHERE student_id = $1),
                    (SELECT points FROM user_progress WHERE student_id = $1)",
        )
        .bind(fx.student_id)
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!((records, points), (1, 10));
    }

    #[tokio::test]
    async fn insert_is_refused_for_a_rotated_code() {
        let pool = memory_pool().await;
        let fx = Fixture::seed(&pool).await;
        let (session, old_token) = open_session(&pool, &fx, 0).await;
        let new_token = generate_token(&pool, session.id, fx.teacher()).await.unwrap();

        let mut conn = pool.acquire().await.unwrap();
        let stale = insert_record(&mut conn, session.id, fx.student_id, &old_token, Utc::now(), AttendanceStatus::Present)
            .await
            .unwrap();
        assert!(stale.is_none());

        let fresh = insert_record(&mut conn, session.id, fx.student_id, &new_token, Utc::now(), AttendanceStatus::Present)
            .await
            .unwrap();
        assert_eq!(fresh.map(|r| r.status).as_deref(), Some("present"));
    }

    #[tokio::test]
    async fn two_sessions_same_day_count_streak_once() {
        let pool = memory_pool().await;
        let fx = Fixture::seed(&pool).await;
        let config = test_config();
        let (_, first_token) = open_session(&pool, &fx, 0).await;
        let (_, second_token) = open_session(&pool, &fx, 0).await;

        let now = Utc.with_ymd_and_hms(2025, 3, 3, 9, 0, 0).unwrap();
        check_in(&pool, &config, &first_token, fx.student_id, now).await.unwrap();
        let outcome = check_in(&pool, &config, &second_token, fx.student_id, now + Duration::minutes(1))
            .await
            .unwrap();
        assert_eq!(outcome.progress.streak, 1);
        assert_eq!(outcome.progress.points, 20);
    }
}
