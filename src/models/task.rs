// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Task model for storage and API.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Task lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    Archived,
}

impl TaskStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Completed => "completed",
            TaskStatus::Archived => "archived",
        }
    }

    /// Sort rank used when listing: open work first.
    pub fn rank(self) -> u8 {
        match self {
            TaskStatus::InProgress => 0,
            TaskStatus::Pending => 1,
            TaskStatus::Completed => 2,
            TaskStatus::Archived => 3,
        }
    }

    /// Whether a task in this status may still be completed.
    pub fn is_open(self) -> bool {
        matches!(self, TaskStatus::Pending | TaskStatus::InProgress)
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TaskStatus::Pending),
            "in_progress" => Ok(TaskStatus::InProgress),
            "completed" => Ok(TaskStatus::Completed),
            "archived" => Ok(TaskStatus::Archived),
            other => Err(format!("unknown task status '{}'", other)),
        }
    }
}

/// Stored task record in Firestore.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Task ID (also used as document ID)
    pub task_id: String,
    /// Owner
    pub user_id: String,
    pub title: String,
    pub description: Option<String>,
    pub category: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    /// 1-5
    pub priority: u8,
    /// 1-5
    pub energy_required: u8,
    /// 1-5
    pub difficulty_level: u8,
    /// Minutes
    pub estimated_duration: Option<u32>,
    /// Minutes, recorded at completion
    pub actual_duration: Option<u32>,
    pub due_date: Option<NaiveDate>,
    /// Parent task for subtasks (one level deep)
    pub parent_task_id: Option<String>,
    pub status: TaskStatus,
    /// Base points computed at creation
    pub reward_points: u32,
    /// Streak bonus computed at completion
    #[serde(default)]
    pub bonus_points: u32,
    #[serde(with = "crate::time_utils::serde_utc")]
    pub created_at: DateTime<Utc>,
    #[serde(default, with = "crate::time_utils::serde_utc_opt")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, with = "crate::time_utils::serde_utc_opt")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Task {
    /// Reward-relevant attributes of this task.
    pub fn attributes(&self) -> crate::services::rewards::TaskAttributes {
        crate::services::rewards::TaskAttributes {
            difficulty: Some(self.difficulty_level),
            energy_required: Some(self.energy_required),
            estimated_duration: self.estimated_duration,
            priority: Some(self.priority),
        }
    }
}
