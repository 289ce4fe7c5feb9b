// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Per-day activity aggregates.
//!
//! One document per `(user, UTC date)`, keyed `{user_id}_{YYYY-MM-DD}`.
//! Counters are applied with increment transforms so concurrent actions on
//! the same day never lose updates.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Daily progress aggregate stored in Firestore.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DailyProgress {
    pub user_id: String,
    pub date: NaiveDate,
    #[serde(default)]
    pub tasks_created: u32,
    #[serde(default)]
    pub tasks_completed: u32,
    #[serde(default)]
    pub focus_minutes: u32,
    #[serde(default)]
    pub focus_sessions: u32,
    /// Sum of quality ratings of rated sessions
    #[serde(default)]
    pub focus_quality_total: u32,
    /// Sessions that carried a quality rating
    #[serde(default)]
    pub rated_focus_sessions: u32,
    #[serde(default)]
    pub points_earned: u64,
}

impl DailyProgress {
    pub fn document_id(user_id: &str, date: NaiveDate) -> String {
        format!("{}_{}", user_id, date.format("%Y-%m-%d"))
    }

    pub fn empty(user_id: &str, date: NaiveDate) -> Self {
        Self {
            user_id: user_id.to_string(),
            date,
            ..Default::default()
        }
    }

    /// Mean quality of rated sessions, one decimal place.
    pub fn average_focus_quality(&self) -> Option<f64> {
        if self.rated_focus_sessions == 0 {
            return None;
        }
        let avg = self.focus_quality_total as f64 / self.rated_focus_sessions as f64;
        Some((avg * 10.0).round() / 10.0)
    }

    /// Apply a delta in memory (mirrors the stored increments).
    pub fn apply(&mut self, delta: &ProgressDelta) {
        self.tasks_created += delta.tasks_created;
        self.tasks_completed += delta.tasks_completed;
        self.focus_minutes += delta.focus_minutes;
        self.focus_sessions += delta.focus_sessions;
        self.focus_quality_total += delta.focus_quality_total;
        self.rated_focus_sessions += delta.rated_focus_sessions;
        self.points_earned += delta.points_earned;
    }
}

/// Counter increments for one user action.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProgressDelta {
    pub tasks_created: u32,
    pub tasks_completed: u32,
    pub focus_minutes: u32,
    pub focus_sessions: u32,
    pub focus_quality_total: u32,
    pub rated_focus_sessions: u32,
    pub points_earned: u64,
}

impl ProgressDelta {
    pub fn task_created() -> Self {
        Self {
            tasks_created: 1,
            ..Default::default()
        }
    }

    pub fn task_completed(points: u64) -> Self {
        Self {
            tasks_completed: 1,
            points_earned: points,
            ..Default::default()
        }
    }

    pub fn focus_session(minutes: u32, quality: Option<u8>, points: u64) -> Self {
        Self {
            focus_minutes: minutes,
            focus_sessions: 1,
            focus_quality_total: quality.map(u32::from).unwrap_or(0),
            rated_focus_sessions: u32::from(quality.is_some()),
            points_earned: points,
            ..Default::default()
        }
    }

    pub fn points(points: u64) -> Self {
        Self {
            points_earned: points,
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Non-zero counters as `(field, amount)` pairs for increment transforms.
    pub fn increments(&self) -> Vec<(&'static str, i64)> {
        [
            ("tasks_created", i64::from(self.tasks_created)),
            ("tasks_completed", i64::from(self.tasks_completed)),
            ("focus_minutes", i64::from(self.focus_minutes)),
            ("focus_sessions", i64::from(self.focus_sessions)),
            ("focus_quality_total", i64::from(self.focus_quality_total)),
            ("rated_focus_sessions", i64::from(self.rated_focus_sessions)),
            (
                "points_earned",
                i64::try_from(self.points_earned).unwrap_or(i64::MAX),
            ),
        ]
        .into_iter()
        .filter(|(_, amount)| *amount != 0)
        .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 4, 2).unwrap()
    }

    #[test]
    fn test_document_id_is_keyed_by_user_and_day() {
        assert_eq!(DailyProgress::document_id("u1", day()), "u1_2026-04-02");
    }

    #[test]
    fn test_average_quality_ignores_unrated_sessions() {
        let mut progress = DailyProgress::empty("u1", day());
        assert_eq!(progress.average_focus_quality(), None);

        progress.apply(&ProgressDelta::focus_session(25, Some(4), 9));
        progress.apply(&ProgressDelta::focus_session(25, None, 5));
        progress.apply(&ProgressDelta::focus_session(25, Some(5), 12));

        assert_eq!(progress.focus_sessions, 3);
        assert_eq!(progress.focus_minutes, 75);
        assert_eq!(progress.average_focus_quality(), Some(4.5));
        assert_eq!(progress.points_earned, 26);
    }

    #[test]
    fn test_increments_skip_zero_fields() {
        let delta = ProgressDelta::task_completed(31);
        assert_eq!(
            delta.increments(),
            vec![("tasks_completed", 1), ("points_earned", 31)]
        );
        assert!(ProgressDelta::default().is_empty());
    }
}
