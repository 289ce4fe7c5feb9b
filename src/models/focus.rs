// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Focus session model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of focus block the user started.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionType {
    #[default]
    Pomodoro,
    DeepWork,
    QuickTask,
}

/// Stored focus session in Firestore.
///
/// Created on start; finalized exactly once when `ended_at` is set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FocusSession {
    /// Session ID (also used as document ID)
    pub session_id: String,
    pub user_id: String,
    pub task_id: Option<String>,
    #[serde(default)]
    pub session_type: SessionType,
    /// Minutes
    pub planned_duration: u32,
    /// Minutes
    pub actual_duration: Option<u32>,
    #[serde(default)]
    pub distraction_count: u32,
    /// 1-5
    pub focus_quality: Option<u8>,
    #[serde(default)]
    pub completed_goal: bool,
    #[serde(default)]
    pub points_earned: u32,
    #[serde(with = "crate::time_utils::serde_utc")]
    pub started_at: DateTime<Utc>,
    #[serde(default, with = "crate::time_utils::serde_utc_opt")]
    pub ended_at: Option<DateTime<Utc>>,
}

impl FocusSession {
    pub fn is_open(&self) -> bool {
        self.ended_at.is_none()
    }
}

/// Points at the single open session of a user.
///
/// Keyed by user ID; created together with the session and removed when it
/// ends, so a second start finds it and is refused.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ActiveSessionMarker {
    pub user_id: String,
    pub session_id: String,
    #[serde(with = "crate::time_utils::serde_utc")]
    pub started_at: DateTime<Utc>,
}

impl ActiveSessionMarker {
    pub fn for_session(session: &FocusSession) -> Self {
        Self {
            user_id: session.user_id.clone(),
            session_id: session.session_id.clone(),
            started_at: session.started_at,
        }
    }
}

/// Metrics reported by the client when a session ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionMetrics {
    /// Minutes actually focused
    pub actual_duration: u32,
    pub distraction_count: u32,
    /// 1-5, `None` when the user skipped the rating
    pub focus_quality: Option<u8>,
    pub completed_goal: bool,
}
