// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Analytics routes: dashboard, daily history and weekly report.

use crate::error::Result;
use crate::middleware::auth::AuthUser;
use crate::models::{DailyProgress, TaskStatus};
use crate::routes::me::{ensure_profile, UserResponse};
use crate::time_utils::{format_utc_rfc3339, utc_day};
use crate::AppState;
use axum::{
    extract::{Query, State},
    routing::get,
    Extension, Json, Router,
};
use chrono::{Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/analytics/dashboard", get(dashboard))
        .route("/api/analytics/history", get(progress_history))
        .route("/api/analytics/weekly", get(weekly_report))
}

const DEFAULT_HISTORY_DAYS: u32 = 7;
const MAX_HISTORY_DAYS: u32 = 90;
const RECENT_ACHIEVEMENTS: usize = 5;
const WEEK_DAYS: u32 = 7;

#[derive(Debug, Default, Serialize, PartialEq, Eq)]
pub struct TaskCounts {
    pub pending: u32,
    pub in_progress: u32,
    pub completed: u32,
    pub archived: u32,
}

#[derive(Debug, Serialize)]
pub struct RecentAchievement {
    pub key: String,
    pub unlocked_at: String,
}

#[derive(Serialize)]
pub struct DashboardResponse {
    pub user: UserResponse,
    pub today: DailyProgress,
    pub today_average_focus_quality: Option<f64>,
    pub tasks: TaskCounts,
    pub recent_achievements: Vec<RecentAchievement>,
}

async fn dashboard(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<DashboardResponse>> {
    let now = Utc::now();
    let profile = ensure_profile(&state, &user, now).await?;
    let today = utc_day(now);

    let progress = state
        .db
        .get_daily_progress(&user.user_id, today)
        .await?
        .unwrap_or_else(|| DailyProgress::empty(&user.user_id, today));

    let tasks = state.db.list_tasks(&user.user_id, None).await?;
    let mut counts = TaskCounts::default();
    for task in tasks.iter().filter(|t| t.parent_task_id.is_none()) {
        match task.status {
            TaskStatus::Pending => counts.pending += 1,
            TaskStatus::InProgress => counts.in_progress += 1,
            TaskStatus::Completed => counts.completed += 1,
            TaskStatus::Archived => counts.archived += 1,
        }
    }

    let recent_achievements = state
        .db
        .list_user_achievements(&user.user_id)
        .await?
        .into_iter()
        .take(RECENT_ACHIEVEMENTS)
        .map(|u| RecentAchievement {
            key: u.achievement_key,
            unlocked_at: format_utc_rfc3339(u.unlocked_at),
        })
        .collect();

    Ok(Json(DashboardResponse {
        user: profile.into(),
        today_average_focus_quality: progress.average_focus_quality(),
        today: progress,
        tasks: counts,
        recent_achievements,
    }))
}

#[derive(Debug, Deserialize)]
struct HistoryQuery {
    days: Option<u32>,
}

/// One row per day for the last `days` days (today included), zero-filled.
fn fill_days(
    user_id: &str,
    rows: Vec<DailyProgress>,
    today: NaiveDate,
    days: u32,
) -> Vec<DailyProgress> {
    let start = today - Duration::days(i64::from(days) - 1);
    let mut rows = rows.into_iter().peekable();
    start
        .iter_days()
        .take(days as usize)
        .map(|date| {
            while rows.peek().is_some_and(|r| r.date < date) {
                rows.next();
            }
            rows.next_if(|r| r.date == date)
                .unwrap_or_else(|| DailyProgress::empty(user_id, date))
        })
        .collect()
}

async fn load_days(state: &AppState, user_id: &str, days: u32) -> Result<Vec<DailyProgress>> {
    let today = utc_day(Utc::now());
    let since = today - Duration::days(i64::from(days) - 1);
    let rows = state.db.list_daily_progress(user_id, since).await?;
    Ok(fill_days(user_id, rows, today, days))
}

async fn progress_history(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Query(params): Query<HistoryQuery>,
) -> Result<Json<Vec<DailyProgress>>> {
    let days = params
        .days
        .unwrap_or(DEFAULT_HISTORY_DAYS)
        .clamp(1, MAX_HISTORY_DAYS);
    Ok(Json(load_days(&state, &user.user_id, days).await?))
}

#[derive(Debug, Serialize, PartialEq)]
pub struct WeeklyReport {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub tasks_created: u32,
    pub tasks_completed: u32,
    pub focus_minutes: u32,
    pub focus_sessions: u32,
    pub points_earned: u64,
    /// Days with at least one completed task or focus session
    pub active_days: u32,
    pub average_tasks_per_day: f64,
    pub average_focus_minutes_per_day: f64,
    pub average_focus_quality: Option<f64>,
    pub days: Vec<DailyProgress>,
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

fn weekly_summary(days: Vec<DailyProgress>) -> Option<WeeklyReport> {
    let start_date = days.first()?.date;
    let end_date = days.last()?.date;

    let mut total = DailyProgress::empty("", start_date);
    for day in &days {
        total.tasks_created += day.tasks_created;
        total.tasks_completed += day.tasks_completed;
        total.focus_minutes += day.focus_minutes;
        total.focus_sessions += day.focus_sessions;
        total.focus_quality_total += day.focus_quality_total;
        total.rated_focus_sessions += day.rated_focus_sessions;
        total.points_earned += day.points_earned;
    }
    let active_days = days
        .iter()
        .filter(|d| d.tasks_completed > 0 || d.focus_sessions > 0)
        .count() as u32;
    let n = days.len() as f64;

    Some(WeeklyReport {
        start_date,
        end_date,
        tasks_created: total.tasks_created,
        tasks_completed: total.tasks_completed,
        focus_minutes: total.focus_minutes,
        focus_sessions: total.focus_sessions,
        points_earned: total.points_earned,
        active_days,
        average_tasks_per_day: round1(f64::from(total.tasks_completed) / n),
        average_focus_minutes_per_day: round1(f64::from(total.focus_minutes) / n),
        average_focus_quality: total.average_focus_quality(),
        days,
    })
}

/// Totals and daily averages over the last seven days.
async fn weekly_report(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<Option<WeeklyReport>>> {
    let days = load_days(&state, &user.user_id, WEEK_DAYS).await?;
    Ok(Json(weekly_summary(days)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(date: NaiveDate, completed: u32, minutes: u32) -> DailyProgress {
        DailyProgress {
            tasks_completed: completed,
            focus_minutes: minutes,
            focus_sessions: u32::from(minutes > 0),
            ..DailyProgress::empty("u1", date)
        }
    }

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, d).unwrap()
    }

    #[test]
    fn test_fill_days_zero_fills_gaps() {
        let rows = vec![day(date(1), 9, 0), day(date(3), 2, 30), day(date(5), 1, 0)];
        let filled = fill_days("u1", rows, date(5), 4);
        let dates: Vec<NaiveDate> = filled.iter().map(|d| d.date).collect();
        assert_eq!(dates, [date(2), date(3), date(4), date(5)]);
        assert_eq!(filled[0].tasks_completed, 0);
        assert_eq!(filled[1].focus_minutes, 30);
        assert_eq!(filled[2], DailyProgress::empty("u1", date(4)));
        assert_eq!(filled[3].tasks_completed, 1);
    }

    #[test]
    fn test_weekly_summary_totals() {
        let days = fill_days(
            "u1",
            vec![day(date(2), 3, 50), day(date(6), 4, 20)],
            date(7),
            7,
        );
        let report = weekly_summary(days).unwrap();
        assert_eq!(report.start_date, date(1));
        assert_eq!(report.end_date, date(7));
        assert_eq!(report.tasks_completed, 7);
        assert_eq!(report.focus_minutes, 70);
        assert_eq!(report.active_days, 2);
        assert_eq!(report.average_tasks_per_day, 1.0);
        assert_eq!(report.average_focus_minutes_per_day, 10.0);
        assert_eq!(report.average_focus_quality, None);
    }

    #[test]
    fn test_weekly_summary_empty() {
        assert!(weekly_summary(Vec::new()).is_none());
    }
}
