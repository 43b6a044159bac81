// src/services/gamification.rs

//! Points, streaks, levels and achievements.
//!
//! The state change for one check-in is the pure function [`apply_check_in`];
//! [`record_progress`] loads and stores around it inside the caller's
//! transaction so the attendance record and the progress move together.

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::SqliteConnection;

use crate::{
    config::{ATTENDANCE_POINTS, STREAK_BONUS_POINTS},
    error::AppError,
    models::progress::{ProgressRow, UnlockedAchievement, UserProgress},
};

/// A contiguous range of points. `max_points` is inclusive, `None` is open-ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Level {
    pub number: i64,
    pub name: &'static str,
    pub min_points: i64,
    pub max_points: Option<i64>,
}

impl Level {
    fn contains(&self, points: i64) -> bool {
        points >= self.min_points && self.max_points.is_none_or(|max| points <= max)
    }
}

/// Ascending, non-overlapping, covering [0, ∞).
pub const LEVELS: &[Level] = &[
    Level { number: 1, name: "Новичок", min_points: 0, max_points: Some(99) },
    Level { number: 2, name: "Участник", min_points: 100, max_points: Some(249) },
    Level { number: 3, name: "Активист", min_points: 250, max_points: Some(499) },
    Level { number: 4, name: "Знаток", min_points: 500, max_points: Some(999) },
    Level { number: 5, name: "Мастер", min_points: 1000, max_points: None },
];

/// What has to be true for an achievement to unlock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Criterion {
    /// Lifetime number of attendance records.
    Attendances(i64),
    /// Current streak length in days.
    Streak(i64),
    /// Total points.
    Points(i64),
}

impl Criterion {
    fn is_met(&self, progress: &UserProgress, total_attendance: i64) -> bool {
        match *self {
            Criterion::Attendances(n) => total_attendance >= n,
            Criterion::Streak(n) => progress.streak >= n,
            Criterion::Points(n) => progress.points >= n,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Achievement {
    pub id: i64,
    pub name: &'static str,
    pub description: &'static str,
    pub criterion: Criterion,
}

/// Evaluated in this order on every check-in.
pub const ACHIEVEMENTS: &[Achievement] = &[
    Achievement {
        id: 1,
        name: "Первый шаг",
        description: "Отметиться на первом занятии",
        criterion: Criterion::Attendances(1),
    },
    Achievement {
        id: 2,
        name: "Постоянство",
        description: "Посещать занятия 3 дня подряд",
        criterion: Criterion::Streak(3),
    },
    Achievement {
        id: 3,
        name: "Неделя без пропусков",
        description: "Посещать занятия 7 дней подряд",
        criterion: Criterion::Streak(7),
    },
    Achievement {
        id: 4,
        name: "Сотня",
        description: "Набрать 100 очков",
        criterion: Criterion::Points(100),
    },
    Achievement {
        id: 5,
        name: "Завсегдатай",
        description: "Посетить 25 занятий",
        criterion: Criterion::Attendances(25),
    },
    Achievement {
        id: 6,
        name: "Пятисотка",
        description: "Набрать 500 очков",
        criterion: Criterion::Points(500),
    },
    Achievement {
        id: 7,
        name: "Месяц дисциплины",
        description: "Посещать занятия 30 дней подряд",
        criterion: Criterion::Streak(30),
    },
];

/// Level whose range contains `points`. Negative totals fall back to the first level.
pub fn level_for(points: i64) -> &'static Level {
    LEVELS
        .iter()
        .find(|level| level.contains(points))
        .unwrap_or(&LEVELS[0])
}

/// The level after `number`, if any.
pub fn next_level(number: i64) -> Option<&'static Level> {
    LEVELS.iter().find(|level| level.number == number + 1)
}

/// One accepted check-in as seen by the progress engine.
#[derive(Debug, Clone, Copy)]
pub struct CheckInEvent {
    /// Local calendar date of the check-in.
    pub date: NaiveDate,
    /// Lifetime attendance count including this check-in.
    pub total_attendance: i64,
}

/// Computes the progress after one check-in.
///
/// Points only grow, the streak advances at most once per calendar day and
/// achievements are only ever appended.
pub fn apply_check_in(current: &UserProgress, event: &CheckInEvent) -> UserProgress {
    let mut next = current.clone();
    next.points += ATTENDANCE_POINTS;

    match current.last_attendance {
        Some(last) if last.succ_opt() == Some(event.date) => {
            next.streak += 1;
            next.points += STREAK_BONUS_POINTS;
            next.last_attendance = Some(event.date);
        }
        // Same day, or a date before the last one: the streak was already counted.
        Some(last) if last >= event.date => {}
        _ => {
            next.streak = 1;
            next.last_attendance = Some(event.date);
        }
    }

    next.level = level_for(next.points).number;

    for achievement in ACHIEVEMENTS {
        if !next.achievements.contains(&achievement.id)
            && achievement.criterion.is_met(&next, event.total_attendance)
        {
            next.achievements.push(achievement.id);
        }
    }

    next
}

/// Loads a student's progress, or the initial state if they never checked in.
pub async fn load_progress(
    conn: &mut SqliteConnection,
    student_id: i64,
) -> Result<UserProgress, AppError> {
    let row = sqlx::query_as::<_, ProgressRow>(
        "SELECT student_id, points, streak, level, last_attendance
         FROM user_progress WHERE student_id = $1",
    )
    .bind(student_id)
    .fetch_optional(&mut *conn)
    .await?;

    let achievements = load_achievements(conn, student_id)
        .await?
        .into_iter()
        .map(|a| a.achievement_id)
        .collect();

    Ok(match row {
        Some(row) => UserProgress {
            student_id: row.student_id,
            points: row.points,
            streak: row.streak,
            level: row.level,
            last_attendance: row.last_attendance,
            achievements,
        },
        None => UserProgress {
            achievements,
            ..UserProgress::new(student_id)
        },
    })
}

/// Unlocked achievements in unlock order.
pub async fn load_achievements(
    conn: &mut SqliteConnection,
    student_id: i64,
) -> Result<Vec<UnlockedAchievement>, AppError> {
    let unlocked = sqlx::query_as::<_, UnlockedAchievement>(
        "SELECT achievement_id, unlocked_at FROM user_achievements
         WHERE student_id = $1
         ORDER BY unlocked_at, rowid",
    )
    .bind(student_id)
    .fetch_all(conn)
    .await?;

    Ok(unlocked)
}

/// Applies one check-in to the stored progress.
///
/// Must run on the same transaction that inserted the attendance record: the
/// lifetime count read here already includes it.
pub async fn record_progress(
    conn: &mut SqliteConnection,
    student_id: i64,
    check_in_date: NaiveDate,
    now: DateTime<Utc>,
) -> Result<UserProgress, AppError> {
    let current = load_progress(&mut *conn, student_id).await?;

    let total_attendance: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM attendance_records WHERE student_id = $1")
            .bind(student_id)
            .fetch_one(&mut *conn)
            .await?;

    let event = CheckInEvent {
        date: check_in_date,
        total_attendance,
    };
    let next = apply_check_in(&current, &event);

    sqlx::query(
        "INSERT INTO user_progress (student_id, points, streak, level, last_attendance, updated_at)
         VALUES ($1, $2, $3, $4, $5, $6)
         ON CONFLICT(student_id) DO UPDATE SET
            points = excluded.points,
            streak = excluded.streak,
            level = excluded.level,
            last_attendance = excluded.last_attendance,
            updated_at = excluded.updated_at",
    )
    .bind(student_id)
    .bind(next.points)
    .bind(next.streak)
    .bind(next.level)
    .bind(next.last_attendance)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    for achievement_id in next.achievements.iter().skip(current.achievements.len()) {
        sqlx::query(
            "INSERT OR IGNORE INTO user_achievements (student_id, achievement_id, unlocked_at)
             VALUES ($1, $2, $3)",
        )
        .bind(student_id)
        .bind(*achievement_id)
        .bind(now)
        .execute(&mut *conn)
        .await?;

        tracing::info!(student_id, achievement_id, "Achievement unlocked");
    }

    if next.level > current.level {
        tracing::info!(student_id, level = next.level, "Level up");
    }

    Ok(next)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, d).unwrap()
    }

    fn event(d: u32, total_attendance: i64) -> CheckInEvent {
        CheckInEvent {
            date: day(d),
            total_attendance,
        }
    }

    #[test]
    fn level_table_covers_all_points() {
        assert_eq!(LEVELS[0].min_points, 0);
        for pair in LEVELS.windows(2) {
            assert_eq!(pair[0].max_points, Some(pair[1].min_points - 1));
        }
        assert_eq!(LEVELS.last().unwrap().max_points, None);

        assert_eq!(level_for(0).number, 1);
        assert_eq!(level_for(99).number, 1);
        assert_eq!(level_for(100).number, 2);
        assert_eq!(level_for(1_000_000).number, 5);
        assert_eq!(next_level(5), None);
        assert_eq!(next_level(1).unwrap().min_points, 100);
    }

    #[test]
    fn first_check_in_starts_streak() {
        let p = apply_check_in(&UserProgress::new(1), &event(10, 1));
        assert_eq!(p.points, 10);
        assert_eq!(p.streak, 1);
        assert_eq!(p.level, 1);
        assert_eq!(p.last_attendance, Some(day(10)));
        assert_eq!(p.achievements, vec![1]);
    }

    #[test]
    fn next_day_extends_streak_with_bonus() {
        let p = apply_check_in(&UserProgress::new(1), &event(10, 1));
        let p = apply_check_in(&p, &event(11, 2));
        assert_eq!(p.streak, 2);
        assert_eq!(p.points, 10 + 10 + 5);
        assert_eq!(p.last_attendance, Some(day(11)));
    }

    #[test]
    fn same_day_keeps_streak_and_skips_bonus() {
        let p = apply_check_in(&UserProgress::new(1), &event(10, 1));
        let p = apply_check_in(&p, &event(11, 2));
        let p = apply_check_in(&p, &event(11, 3));
        assert_eq!(p.streak, 2);
        assert_eq!(p.points, 35);
    }

    #[test]
    fn gap_resets_streak_to_one() {
        let p = apply_check_in(&UserProgress::new(1), &event(10, 1));
        let p = apply_check_in(&p, &event(11, 2));
        let p = apply_check_in(&p, &event(14, 3));
        assert_eq!(p.streak, 1);
        assert_eq!(p.last_attendance, Some(day(14)));
        assert_eq!(p.points, 35 + 10);
    }

    #[test]
    fn earlier_date_does_not_rewind() {
        let p = apply_check_in(&UserProgress::new(1), &event(10, 1));
        let p = apply_check_in(&p, &event(9, 2));
        assert_eq!(p.streak, 1);
        assert_eq!(p.last_attendance, Some(day(10)));
        assert_eq!(p.points, 20);
    }

    #[test]
    fn crossing_one_hundred_levels_up_and_unlocks_sotnya() {
        let current = UserProgress {
            student_id: 1,
            points: 95,
            streak: 1,
            level: 1,
            last_attendance: Some(day(1)),
            achievements: vec![1],
        };
        let p = apply_check_in(&current, &event(5, 9));
        assert_eq!(p.points, 105);
        assert_eq!(p.level, 2);
        assert_eq!(p.achievements, vec![1, 4]);
    }

    #[test]
    fn week_long_streak_unlocks_in_catalog_order() {
        let mut p = UserProgress::new(1);
        for d in 1..=7 {
            p = apply_check_in(&p, &event(d, d as i64));
        }
        assert_eq!(p.streak, 7);
        assert_eq!(p.points, 7 * 10 + 6 * 5);
        assert_eq!(p.achievements, vec![1, 2, 3, 4]);
    }

    #[test]
    fn reapplying_never_duplicates_or_drops_achievements() {
        let mut p = UserProgress::new(1);
        let mut seen = Vec::new();
        for i in 0..40 {
            p = apply_check_in(&p, &event(1 + (i % 3) as u32 * 10, i + 1));
            assert!(p.achievements.starts_with(&seen));
            let mut dedup = p.achievements.clone();
            dedup.sort_unstable();
            dedup.dedup();
            assert_eq!(dedup.len(), p.achievements.len());
            seen = p.achievements.clone();
        }
    }

    #[test]
    fn points_never_decrease() {
        let mut p = UserProgress::new(1);
        let dates = [3, 3, 4, 9, 8, 10, 11, 11, 20];
        for (i, d) in dates.into_iter().enumerate() {
            let before = p.points;
            p = apply_check_in(&p, &event(d, i as i64 + 1));
            assert!(p.points > before);
        }
    }
}
