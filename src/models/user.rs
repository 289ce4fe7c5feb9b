// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! User model for storage and API.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// User profile and progression counters stored in Firestore.
///
/// Point and counter fields are only ever changed through atomic increment
/// transforms, never by writing this struct back.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// Identity subject from the session token (also the document ID)
    pub user_id: String,
    pub username: String,
    pub display_name: Option<String>,
    /// Lifetime points/XP
    #[serde(default)]
    pub total_points: u64,
    #[serde(default)]
    pub current_streak: u32,
    #[serde(default)]
    pub longest_streak: u32,
    /// Last UTC day with a qualifying action
    #[serde(default)]
    pub last_active_date: Option<NaiveDate>,
    /// First day of the current streak
    #[serde(default)]
    pub streak_start_date: Option<NaiveDate>,
    #[serde(default)]
    pub tasks_completed: u32,
    #[serde(default)]
    pub focus_sessions_completed: u32,
    /// Weekday the weekly quest window starts on (0 = Sunday)
    #[serde(default = "default_reset_day")]
    pub quest_reset_day: u8,
    #[serde(with = "crate::time_utils::serde_utc")]
    pub created_at: DateTime<Utc>,
}

/// Ownership record for a username (document ID is the username).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UsernameClaim {
    pub username: String,
    pub user_id: String,
}

impl UsernameClaim {
    pub fn for_user(user: &User) -> Self {
        Self {
            username: user.username.clone(),
            user_id: user.user_id.clone(),
        }
    }
}

fn default_reset_day() -> u8 {
    1
}

impl User {
    /// A fresh profile with zeroed progression.
    pub fn new(user_id: &str, username: &str, now: DateTime<Utc>) -> Self {
        Self {
            user_id: user_id.to_string(),
            username: username.to_string(),
            display_name: None,
            total_points: 0,
            current_streak: 0,
            longest_streak: 0,
            last_active_date: None,
            streak_start_date: None,
            tasks_completed: 0,
            focus_sessions_completed: 0,
            quest_reset_day: default_reset_day(),
            created_at: now,
        }
    }

    pub fn streak_state(&self) -> crate::services::streak::StreakState {
        crate::services::streak::StreakState {
            current_streak: self.current_streak,
            longest_streak: self.longest_streak,
            last_active_date: self.last_active_date,
            streak_start_date: self.streak_start_date,
        }
    }
}
