// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Weekly quest models.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Weekly commitment size chosen by the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "binding-generation", derive(ts_rs::TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub enum OverwhelmLevel {
    Light,
    Medium,
    Full,
}

impl OverwhelmLevel {
    /// Number of completed tasks needed to finish the quest.
    pub fn target_task_count(self) -> u32 {
        match self {
            OverwhelmLevel::Light => 5,
            OverwhelmLevel::Medium => 10,
            OverwhelmLevel::Full => 15,
        }
    }
}

/// Quest lifecycle. Everything except `Active` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "binding-generation", derive(ts_rs::TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub enum QuestStatus {
    Active,
    Completed,
    Failed,
    Abandoned,
}

impl QuestStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, QuestStatus::Active)
    }
}

/// Whether a quest task pointed at an existing task or was defined inline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "binding-generation", derive(ts_rs::TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub enum QuestTaskSource {
    Existing,
    New,
}

/// Stored weekly quest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeeklyQuest {
    /// Quest ID (also used as document ID)
    pub quest_id: String,
    pub user_id: String,
    pub overwhelm_level: OverwhelmLevel,
    pub week_start: NaiveDate,
    pub week_end: NaiveDate,
    pub target_task_count: u32,
    /// Cached count of completed child tasks
    #[serde(default)]
    pub completed_task_count: u32,
    pub xp_multiplier: f64,
    #[serde(default)]
    pub bonus_xp_earned: u64,
    pub status: QuestStatus,
    #[serde(with = "crate::time_utils::serde_utc")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "crate::time_utils::serde_utc")]
    pub updated_at: DateTime<Utc>,
    #[serde(default, with = "crate::time_utils::serde_utc_opt")]
    pub completed_at: Option<DateTime<Utc>>,
}

/// Stored quest task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeeklyQuestTask {
    /// Quest task ID (also used as document ID)
    pub quest_task_id: String,
    pub quest_id: String,
    /// Owner, denormalized for ownership checks
    pub user_id: String,
    pub task_id: Option<String>,
    pub title: String,
    pub description: Option<String>,
    pub xp: u32,
    pub source: QuestTaskSource,
    #[serde(default)]
    pub completed: bool,
    #[serde(default, with = "crate::time_utils::serde_utc_opt")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Set once the task's XP was credited; uncompleting does not clear it
    #[serde(default)]
    pub xp_awarded: bool,
}
