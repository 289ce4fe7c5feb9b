// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Database layer (Firestore).

pub mod firestore;

pub use firestore::{FirestoreDb, HistoryCursor, UnitOfWork};

/// Collection names as constants.
pub mod collections {
    pub const USERS: &str = "users";
    /// Username claims, keyed by username
    pub const USERNAMES: &str = "usernames";
    pub const TASKS: &str = "tasks";
    pub const FOCUS_SESSIONS: &str = "focus_sessions";
    /// At most one per user, keyed by user ID
    pub const ACTIVE_FOCUS_SESSIONS: &str = "active_focus_sessions";
    /// Keyed `{user_id}_{YYYY-MM-DD}`
    pub const DAILY_PROGRESS: &str = "daily_progress";
    /// Achievement catalog (keyed by achievement key)
    pub const ACHIEVEMENTS: &str = "achievements";
    /// Keyed `{user_id}_{achievement_key}`
    pub const USER_ACHIEVEMENTS: &str = "user_achievements";
    pub const WEEKLY_QUESTS: &str = "weekly_quests";
    pub const WEEKLY_QUEST_TASKS: &str = "weekly_quest_tasks";
    /// Append-only points ledger
    pub const REWARD_HISTORY: &str = "reward_history";
    pub const STREAK_HISTORY: &str = "streak_history";
    /// Keyed by the ordered user pair
    pub const FRIENDSHIPS: &str = "friendships";
}
