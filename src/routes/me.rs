// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Profile routes.

use crate::error::{AppError, Result};
use crate::middleware::auth::AuthUser;
use crate::models::User;
use crate::services::levels::{level_progress, LevelProgress};
use crate::services::progression::with_retry;
use crate::time_utils::format_utc_rfc3339;
use crate::AppState;
use axum::{
    extract::State,
    routing::{get, put},
    Extension, Json, Router,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;
use validator::Validate;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/me", get(get_me).put(update_me))
        .route("/api/me/settings", put(update_settings))
}

/// Load the caller's profile, creating it on first use.
///
/// The username comes from the session token when present and free,
/// otherwise the user ID is used.
pub(crate) async fn ensure_profile(
    state: &AppState,
    auth: &AuthUser,
    now: DateTime<Utc>,
) -> Result<User> {
    if let Some(user) = state.db.get_user(&auth.user_id).await? {
        return Ok(user);
    }

    let wanted = auth
        .username
        .as_deref()
        .map(str::trim)
        .filter(|name| is_valid_username(name));
    for username in wanted.into_iter().chain([auth.user_id.as_str()]) {
        let user = User::new(&auth.user_id, username, now);
        if state.db.create_user(&user).await? {
            tracing::info!(user_id = %user.user_id, username = %user.username, "Created user profile");
            return Ok(user);
        }
        // Lost a creation race with a concurrent request
        if let Some(existing) = state.db.get_user(&auth.user_id).await? {
            return Ok(existing);
        }
        tracing::debug!(user_id = %auth.user_id, username, "Username taken at signup");
    }

    Err(AppError::Conflict(format!(
        "No free username for user {}",
        auth.user_id
    )))
}

fn is_valid_username(username: &str) -> bool {
    (3..=30).contains(&username.chars().count())
        && username
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Current user response.
#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct UserResponse {
    pub user_id: String,
    pub username: String,
    pub display_name: Option<String>,
    #[cfg_attr(feature = "binding-generation", ts(type = "number"))]
    pub total_points: u64,
    pub level: LevelProgress,
    pub current_streak: u32,
    pub longest_streak: u32,
    #[cfg_attr(feature = "binding-generation", ts(type = "string | null"))]
    pub last_active_date: Option<NaiveDate>,
    pub tasks_completed: u32,
    pub focus_sessions_completed: u32,
    pub quest_reset_day: u8,
    pub created_at: String,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            level: level_progress(user.total_points),
            user_id: user.user_id,
            username: user.username,
            display_name: user.display_name,
            total_points: user.total_points,
            current_streak: user.current_streak,
            longest_streak: user.longest_streak,
            last_active_date: user.last_active_date,
            tasks_completed: user.tasks_completed,
            focus_sessions_completed: user.focus_sessions_completed,
            quest_reset_day: user.quest_reset_day,
            created_at: format_utc_rfc3339(user.created_at),
        }
    }
}

/// Get current user profile.
async fn get_me(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<UserResponse>> {
    let profile = ensure_profile(&state, &user, Utc::now()).await?;
    Ok(Json(profile.into()))
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateProfileRequest {
    #[validate(length(min = 3, max = 30))]
    pub username: Option<String>,
    #[validate(length(max = 80))]
    pub display_name: Option<String>,
}

/// Update username and display name. Usernames are unique.
async fn update_me(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(req): Json<UpdateProfileRequest>,
) -> Result<Json<UserResponse>> {
    req.validate()?;
    let username = req.username.as_deref().map(str::trim);
    if let Some(name) = username {
        if !is_valid_username(name) {
            return Err(AppError::Validation(
                "Username may only contain letters, digits, '_' and '-'".to_string(),
            ));
        }
    }

    let mut profile = ensure_profile(&state, &user, Utc::now()).await?;
    let previous_username = profile.username.clone();

    if let Some(name) = username {
        profile.username = name.to_string();
    }
    if let Some(display_name) = req.display_name {
        let display_name = display_name.trim().to_string();
        profile.display_name = (!display_name.is_empty()).then_some(display_name);
    }

    let (db, profile_ref, previous) = (&state.db, &profile, previous_username.as_str());
    let saved = with_retry("update_profile", || async move {
        db.update_profile(profile_ref, previous).await
    })
    .await?;
    if !saved {
        return Err(AppError::Conflict(format!(
            "Username '{}' is already taken",
            profile.username
        )));
    }
    tracing::info!(user_id = %profile.user_id, "Profile updated");
    Ok(Json(profile.into()))
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateSettingsRequest {
    /// Weekday the weekly quest window starts on (0 = Sunday)
    #[validate(range(min = 0, max = 6))]
    pub quest_reset_day: u8,
}

/// Update user settings.
///
/// A new reset day applies to quests created afterwards; the active quest
/// keeps its window.
async fn update_settings(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(req): Json<UpdateSettingsRequest>,
) -> Result<Json<UserResponse>> {
    req.validate()?;

    let mut profile = ensure_profile(&state, &user, Utc::now()).await?;
    profile.quest_reset_day = req.quest_reset_day;
    state.db.update_user_settings(&profile).await?;

    tracing::info!(
        user_id = %profile.user_id,
        quest_reset_day = profile.quest_reset_day,
        "Settings updated"
    );
    Ok(Json(profile.into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_username_rules() {
        assert!(is_valid_username("ada_l"));
        assert!(is_valid_username("focus-fox-99"));
        assert!(!is_valid_username("ab"));
        assert!(!is_valid_username("has space"));
        assert!(!is_valid_username(&"x".repeat(31)));
    }

    #[test]
    fn test_settings_range() {
        assert!(UpdateSettingsRequest { quest_reset_day: 6 }.validate().is_ok());
        assert!(UpdateSettingsRequest { quest_reset_day: 7 }.validate().is_err());
    }
}
