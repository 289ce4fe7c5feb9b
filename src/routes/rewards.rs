// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Reward routes: points, ledger, achievements and daily activity.

use crate::db::HistoryCursor;
use crate::error::{AppError, Result};
use crate::middleware::auth::AuthUser;
use crate::models::{Achievement, RewardHistory};
use crate::routes::me::ensure_profile;
use crate::services::achievements::{default_catalog, AchievementKey};
use crate::services::levels::{level_progress, LevelProgress};
use crate::services::progression::StreakSummary;
use crate::time_utils::format_utc_rfc3339;
use crate::AppState;
use axum::{
    extract::{Query, State},
    routing::{get, post},
    Extension, Json, Router,
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/rewards/stats", get(reward_stats))
        .route("/api/rewards/history", get(reward_history))
        .route("/api/rewards/achievements", get(unlocked_achievements))
        .route("/api/rewards/achievements/all", get(all_achievements))
        .route("/api/rewards/achievements/check", post(check_achievements))
        .route("/api/rewards/activity", post(record_activity))
}

// ─── Stats ───────────────────────────────────────────────────

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct RewardStatsResponse {
    #[cfg_attr(feature = "binding-generation", ts(type = "number"))]
    pub total_points: u64,
    pub level: LevelProgress,
    pub current_streak: u32,
    pub longest_streak: u32,
    pub tasks_completed: u32,
    pub focus_sessions_completed: u32,
    pub achievements_unlocked: u32,
    pub achievements_total: u32,
}

async fn reward_stats(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<RewardStatsResponse>> {
    let profile = ensure_profile(&state, &user, Utc::now()).await?;
    let unlocked = state.db.list_user_achievements(&user.user_id).await?.len() as u32;
    let total = load_catalog(&state).await?.len() as u32;

    Ok(Json(RewardStatsResponse {
        total_points: profile.total_points,
        level: level_progress(profile.total_points),
        current_streak: profile.current_streak,
        longest_streak: profile.longest_streak,
        tasks_completed: profile.tasks_completed,
        focus_sessions_completed: profile.focus_sessions_completed,
        achievements_unlocked: unlocked,
        achievements_total: total,
    }))
}

// ─── History ─────────────────────────────────────────────────

#[derive(Deserialize)]
struct HistoryQuery {
    cursor: Option<String>,
    #[serde(default = "default_limit")]
    limit: u32,
}

fn default_limit() -> u32 {
    50
}

const MAX_LIMIT: u32 = 100;
const CURSOR_SEPARATOR: char = '|';

fn parse_cursor(cursor: Option<&str>) -> Result<Option<HistoryCursor>> {
    cursor
        .map(|raw| {
            let invalid_cursor = || AppError::BadRequest("Invalid 'cursor' parameter".to_string());

            let decoded = URL_SAFE_NO_PAD.decode(raw).map_err(|_| invalid_cursor())?;
            let decoded_str = std::str::from_utf8(&decoded).map_err(|_| invalid_cursor())?;
            let (created_at, entry_id) = decoded_str
                .split_once(CURSOR_SEPARATOR)
                .ok_or_else(invalid_cursor)?;

            // Must be a timestamp we could have written
            let parsed = DateTime::parse_from_rfc3339(created_at).map_err(|_| invalid_cursor())?;
            if entry_id.is_empty() {
                return Err(invalid_cursor());
            }

            Ok(HistoryCursor {
                created_at: format_utc_rfc3339(parsed.with_timezone(&Utc)),
                entry_id: entry_id.to_string(),
            })
        })
        .transpose()
}

fn encode_cursor(entry: &RewardHistory) -> String {
    let payload = format!(
        "{}{}{}",
        format_utc_rfc3339(entry.created_at),
        CURSOR_SEPARATOR,
        entry.entry_id
    );
    URL_SAFE_NO_PAD.encode(payload)
}

#[derive(Serialize)]
pub struct RewardHistoryResponse {
    pub entries: Vec<RewardHistory>,
    pub next_cursor: Option<String>,
}

/// Ledger entries, newest first.
async fn reward_history(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Query(params): Query<HistoryQuery>,
) -> Result<Json<RewardHistoryResponse>> {
    if params.limit == 0 {
        return Err(AppError::BadRequest(
            "Limit must be greater than 0".to_string(),
        ));
    }
    let limit = params.limit.min(MAX_LIMIT);
    let cursor = parse_cursor(params.cursor.as_deref())?;

    tracing::debug!(user_id = %user.user_id, limit, cursor = ?cursor, "Fetching reward history");

    // Fetch one extra item to determine if another page is available.
    let mut entries = state
        .db
        .list_reward_history(&user.user_id, cursor, limit.saturating_add(1))
        .await?;
    let has_more = entries.len() > limit as usize;
    if has_more {
        entries.truncate(limit as usize);
    }
    let next_cursor = if has_more {
        entries.last().map(encode_cursor)
    } else {
        None
    };

    Ok(Json(RewardHistoryResponse {
        entries,
        next_cursor,
    }))
}

// ─── Achievements ────────────────────────────────────────────

/// The stored catalog, or the built-in one before seeding.
async fn load_catalog(state: &AppState) -> Result<Vec<Achievement>> {
    let catalog = state.db.list_achievements().await?;
    Ok(if catalog.is_empty() {
        default_catalog()
    } else {
        catalog
    })
}

#[derive(Serialize)]
pub struct UnlockedAchievement {
    #[serde(flatten)]
    pub achievement: Achievement,
    pub unlocked_at: String,
}

async fn unlocked_achievements(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<Vec<UnlockedAchievement>>> {
    let catalog: HashMap<String, Achievement> = load_catalog(&state)
        .await?
        .into_iter()
        .map(|a| (a.key.clone(), a))
        .collect();

    let unlocked = state
        .db
        .list_user_achievements(&user.user_id)
        .await?
        .into_iter()
        .filter_map(|u| {
            catalog.get(&u.achievement_key).map(|a| UnlockedAchievement {
                achievement: a.clone(),
                unlocked_at: format_utc_rfc3339(u.unlocked_at),
            })
        })
        .collect();
    Ok(Json(unlocked))
}

#[derive(Serialize)]
pub struct AchievementStatus {
    #[serde(flatten)]
    pub achievement: Achievement,
    pub unlocked: bool,
    pub unlocked_at: Option<String>,
    /// Current value of the gating statistic, capped at the threshold
    pub progress: u64,
    pub threshold: u64,
}

/// Whole catalog with the caller's unlock state and progress.
async fn all_achievements(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<Vec<AchievementStatus>>> {
    let profile = ensure_profile(&state, &user, Utc::now()).await?;
    let stats = state.progression.stats_snapshot(&profile).await?;
    let unlocked: HashMap<String, DateTime<Utc>> = state
        .db
        .list_user_achievements(&user.user_id)
        .await?
        .into_iter()
        .map(|u| (u.achievement_key, u.unlocked_at))
        .collect();

    let statuses = load_catalog(&state)
        .await?
        .into_iter()
        .map(|achievement| {
            let (progress, threshold) = match AchievementKey::from_str(&achievement.key) {
                Ok(key) => {
                    let (stat, threshold) = key.requirement();
                    (stats.get(stat).min(threshold), threshold)
                }
                Err(_) => (0, 0),
            };
            let unlocked_at = unlocked.get(&achievement.key).copied();
            AchievementStatus {
                unlocked: unlocked_at.is_some(),
                unlocked_at: unlocked_at.map(format_utc_rfc3339),
                progress,
                threshold,
                achievement,
            }
        })
        .collect();
    Ok(Json(statuses))
}

#[derive(Serialize)]
pub struct CheckAchievementsResponse {
    pub new_achievements: Vec<Achievement>,
}

async fn check_achievements(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<CheckAchievementsResponse>> {
    let now = Utc::now();
    ensure_profile(&state, &user, now).await?;
    let new_achievements = state
        .progression
        .evaluate_achievements(&user.user_id, now)
        .await?;
    Ok(Json(CheckAchievementsResponse { new_achievements }))
}

/// Record today's activity (streak + daily progress row).
async fn record_activity(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<StreakSummary>> {
    let now = Utc::now();
    ensure_profile(&state, &user, now).await?;
    let streak = state
        .progression
        .record_daily_activity(&user.user_id, now)
        .await?;
    Ok(Json(streak))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RewardReason;

    #[test]
    fn test_cursor_round_trip() {
        let entry = RewardHistory::new(
            "u1",
            RewardReason::TaskCompleted,
            18,
            serde_json::Value::Null,
            Utc::now(),
        );
        let cursor = parse_cursor(Some(&encode_cursor(&entry))).unwrap().unwrap();
        assert_eq!(cursor.created_at, format_utc_rfc3339(entry.created_at));
        assert_eq!(cursor.entry_id, entry.entry_id);
    }

    #[test]
    fn test_invalid_cursors_are_bad_requests() {
        for raw in [
            "not base64!",
            &URL_SAFE_NO_PAD.encode("no-separator"),
            &URL_SAFE_NO_PAD.encode("yesterday|abc"),
            &URL_SAFE_NO_PAD.encode("2026-10-01T00:00:00.000000Z|"),
        ] {
            assert!(matches!(
                parse_cursor(Some(raw)),
                Err(AppError::BadRequest(_))
            ));
        }
        assert!(parse_cursor(None).unwrap().is_none());
    }
}
