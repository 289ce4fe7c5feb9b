// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Focus session routes.

use crate::error::Result;
use crate::middleware::auth::AuthUser;
use crate::models::{FocusSession, SessionMetrics, SessionType};
use crate::routes::me::ensure_profile;
use crate::services::progression::{FocusCompletion, NewFocusSession};
use crate::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Extension, Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use validator::Validate;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/focus/sessions", post(start_session))
        .route("/api/focus/sessions/active", get(active_sessions))
        .route("/api/focus/sessions/history", get(session_history))
        .route("/api/focus/sessions/{id}/end", post(end_session))
        .route("/api/focus/statistics", get(focus_statistics))
}

const DEFAULT_HISTORY_LIMIT: usize = 20;
const MAX_HISTORY_LIMIT: usize = 100;

#[derive(Debug, Deserialize, Validate)]
pub struct StartSessionRequest {
    pub task_id: Option<String>,
    /// Minutes
    #[validate(range(min = 1, max = 480))]
    pub planned_duration: u32,
    #[serde(default)]
    pub session_type: SessionType,
}

#[derive(Debug, Deserialize, Validate)]
pub struct EndSessionRequest {
    /// Minutes
    #[validate(range(min = 1, max = 1440))]
    pub actual_duration: u32,
    #[serde(default)]
    pub distraction_count: u32,
    #[validate(range(min = 1, max = 5))]
    pub focus_quality: Option<u8>,
    #[serde(default)]
    pub completed_goal: bool,
}

#[derive(Debug, Deserialize)]
struct HistoryQuery {
    limit: Option<usize>,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct FocusStatistics {
    pub total_sessions: u32,
    pub total_minutes: u64,
    /// One decimal place
    pub total_hours: f64,
    /// Mean of rated sessions, one decimal place (0 when none are rated)
    pub average_focus_quality: f64,
    /// Share of ended sessions that met their goal (0-100, rounded)
    pub completion_rate: u32,
}

async fn start_session(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(req): Json<StartSessionRequest>,
) -> Result<(StatusCode, Json<FocusSession>)> {
    req.validate()?;

    let now = Utc::now();
    ensure_profile(&state, &user, now).await?;

    let session = state
        .progression
        .start_focus_session(
            &user.user_id,
            NewFocusSession {
                task_id: req.task_id,
                session_type: req.session_type,
                planned_duration: req.planned_duration,
            },
            now,
        )
        .await?;

    Ok((StatusCode::CREATED, Json(session)))
}

async fn end_session(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(session_id): Path<String>,
    Json(req): Json<EndSessionRequest>,
) -> Result<Json<FocusCompletion>> {
    req.validate()?;

    let metrics = SessionMetrics {
        actual_duration: req.actual_duration,
        distraction_count: req.distraction_count,
        focus_quality: req.focus_quality,
        completed_goal: req.completed_goal,
    };
    let completion = state
        .progression
        .end_focus_session(&user.user_id, &session_id, metrics, Utc::now())
        .await?;
    Ok(Json(completion))
}

async fn active_sessions(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<Vec<FocusSession>>> {
    let sessions = state
        .db
        .list_sessions(&user.user_id)
        .await?
        .into_iter()
        .filter(FocusSession::is_open)
        .collect();
    Ok(Json(sessions))
}

async fn session_history(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Query(params): Query<HistoryQuery>,
) -> Result<Json<Vec<FocusSession>>> {
    let limit = params
        .limit
        .unwrap_or(DEFAULT_HISTORY_LIMIT)
        .clamp(1, MAX_HISTORY_LIMIT);

    let sessions = state
        .db
        .list_sessions(&user.user_id)
        .await?
        .into_iter()
        .filter(|s| !s.is_open())
        .take(limit)
        .collect();
    Ok(Json(sessions))
}

async fn focus_statistics(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<FocusStatistics>> {
    let sessions = state.db.list_sessions(&user.user_id).await?;
    Ok(Json(compute_statistics(&sessions)))
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

fn compute_statistics(sessions: &[FocusSession]) -> FocusStatistics {
    let ended: Vec<&FocusSession> = sessions.iter().filter(|s| !s.is_open()).collect();
    let total_minutes: u64 = ended
        .iter()
        .map(|s| u64::from(s.actual_duration.unwrap_or(0)))
        .sum();

    let rated: Vec<u8> = ended.iter().filter_map(|s| s.focus_quality).collect();
    let average_focus_quality = if rated.is_empty() {
        0.0
    } else {
        rated.iter().map(|q| f64::from(*q)).sum::<f64>() / rated.len() as f64
    };

    let completion_rate = if ended.is_empty() {
        0
    } else {
        let met = ended.iter().filter(|s| s.completed_goal).count();
        (met as f64 / ended.len() as f64 * 100.0).round() as u32
    };

    FocusStatistics {
        total_sessions: ended.len() as u32,
        total_minutes,
        total_hours: round1(total_minutes as f64 / 60.0),
        average_focus_quality: round1(average_focus_quality),
        completion_rate,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(minutes: Option<u32>, quality: Option<u8>, goal: bool) -> FocusSession {
        let now = Utc::now();
        FocusSession {
            session_id: "s".to_string(),
            user_id: "u1".to_string(),
            task_id: None,
            session_type: SessionType::Pomodoro,
            planned_duration: 25,
            actual_duration: minutes,
            distraction_count: 0,
            focus_quality: quality,
            completed_goal: goal,
            points_earned: 0,
            started_at: now,
            ended_at: minutes.map(|_| now),
        }
    }

    #[test]
    fn test_statistics_ignore_open_sessions() {
        let stats = compute_statistics(&[
            session(Some(50), Some(4), true),
            session(Some(40), None, false),
            session(Some(30), Some(3), true),
            session(None, None, false),
        ]);
        assert_eq!(
            stats,
            FocusStatistics {
                total_sessions: 3,
                total_minutes: 120,
                total_hours: 2.0,
                average_focus_quality: 3.5,
                completion_rate: 67,
            }
        );
    }

    #[test]
    fn test_statistics_empty() {
        let stats = compute_statistics(&[]);
        assert_eq!(stats.total_sessions, 0);
        assert_eq!(stats.completion_rate, 0);
        assert_eq!(stats.average_focus_quality, 0.0);
    }
}
