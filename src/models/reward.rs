// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Reward ledger and streak archive records.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Why points were credited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RewardReason {
    TaskCompleted,
    FocusSession,
    StreakBonus,
    AchievementUnlocked,
    QuestTask,
    QuestBonus,
}

impl RewardReason {
    pub fn as_str(self) -> &'static str {
        match self {
            RewardReason::TaskCompleted => "task_completed",
            RewardReason::FocusSession => "focus_session",
            RewardReason::StreakBonus => "streak_bonus",
            RewardReason::AchievementUnlocked => "achievement_unlocked",
            RewardReason::QuestTask => "quest_task",
            RewardReason::QuestBonus => "quest_bonus",
        }
    }
}

/// Append-only ledger entry. Never updated after insert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RewardHistory {
    /// Entry ID (also used as document ID)
    pub entry_id: String,
    pub user_id: String,
    pub reason: RewardReason,
    pub points: u64,
    /// Free-form context (task ID, streak length, ...)
    #[serde(default)]
    pub metadata: serde_json::Value,
    #[serde(with = "crate::time_utils::serde_utc")]
    pub created_at: DateTime<Utc>,
}

impl RewardHistory {
    pub fn new(
        user_id: &str,
        reason: RewardReason,
        points: u64,
        metadata: serde_json::Value,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            entry_id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            reason,
            points,
            metadata,
            created_at: now,
        }
    }
}

/// Archive of a streak that was broken.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreakHistory {
    pub user_id: String,
    /// Length of the broken streak in days
    pub streak_count: u32,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    /// Days skipped between the last activity and the reset (`gap - 1`)
    pub missed_days: u32,
}
