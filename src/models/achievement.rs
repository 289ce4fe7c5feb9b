// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Achievement catalog and per-user unlock records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Achievement tier, used for ordering in the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AchievementTier {
    Bronze,
    Silver,
    Gold,
    Platinum,
}

/// Catalog entry stored in the `achievements` collection (document ID = `key`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Achievement {
    /// Stable identifier, e.g. `week_warrior`
    pub key: String,
    pub name: String,
    pub description: String,
    pub icon: String,
    pub category: String,
    pub tier: AchievementTier,
    pub xp_reward: u64,
    /// Requirement encoded as `{"<statistic>": <threshold>}`
    pub requirement: serde_json::Value,
}

/// Junction record: the first time a user satisfied an achievement.
///
/// Document ID is `{user_id}_{achievement_key}`, created with
/// insert-if-absent semantics so a pair can exist at most once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserAchievement {
    pub user_id: String,
    pub achievement_key: String,
    #[serde(with = "crate::time_utils::serde_utc")]
    pub unlocked_at: DateTime<Utc>,
}

impl UserAchievement {
    pub fn document_id(user_id: &str, achievement_key: &str) -> String {
        format!("{}_{}", user_id, achievement_key)
    }
}
