// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Reward calculator.
//!
//! Pure point formulas for task creation, task completion and focus
//! sessions. Rounding is half away from zero (`f64::round`) everywhere.

use crate::models::SessionMetrics;

pub const DEFAULT_DIFFICULTY: u8 = 3;
pub const DEFAULT_ENERGY: u8 = 3;
pub const DEFAULT_DURATION_MINUTES: u32 = 25;
pub const DEFAULT_PRIORITY: u8 = 2;

/// Share of base points paid as a bonus while a streak is active.
const STREAK_BONUS_RATE: f64 = 0.25;
/// Neutral focus quality on the 1-5 scale.
const NEUTRAL_FOCUS_QUALITY: u8 = 3;
const FOCUS_MINUTES_PER_POINT: f64 = 5.0;
const FOCUS_GOAL_BONUS: f64 = 10.0;
const POINTS_PER_DISTRACTION: f64 = 2.0;

/// Task attributes that influence its reward. Missing values use defaults.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TaskAttributes {
    pub difficulty: Option<u8>,
    pub energy_required: Option<u8>,
    /// Minutes
    pub estimated_duration: Option<u32>,
    pub priority: Option<u8>,
}

/// Base points fixed when a task is created. Always at least 1.
pub fn task_base_points(attrs: &TaskAttributes) -> u32 {
    let difficulty = f64::from(attrs.difficulty.unwrap_or(DEFAULT_DIFFICULTY));
    let energy = f64::from(attrs.energy_required.unwrap_or(DEFAULT_ENERGY));
    let duration = attrs
        .estimated_duration
        .unwrap_or(DEFAULT_DURATION_MINUTES);
    let priority = f64::from(attrs.priority.unwrap_or(DEFAULT_PRIORITY));

    let duration_points = f64::from(duration.div_ceil(10));
    let raw = difficulty * 2.0 + energy * 1.5 + duration_points + priority * 2.0;

    (raw.round() as u32).max(1)
}

/// Bonus paid on completion: a quarter of base points, only with an active streak.
pub fn completion_bonus(base_points: u32, current_streak: u32) -> u32 {
    if current_streak == 0 {
        return 0;
    }
    (f64::from(base_points) * STREAK_BONUS_RATE).round() as u32
}

/// Points for completing a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskReward {
    pub base_points: u32,
    pub bonus_points: u32,
}

impl TaskReward {
    pub fn total(&self) -> u32 {
        self.base_points + self.bonus_points
    }
}

/// Reward for completing a task whose base points were fixed at creation.
pub fn task_completion_reward(base_points: u32, current_streak: u32) -> TaskReward {
    TaskReward {
        base_points,
        bonus_points: completion_bonus(base_points, current_streak),
    }
}

/// Points for a finished focus session. Always at least 1.
pub fn focus_session_points(metrics: &SessionMetrics) -> u32 {
    let base = (f64::from(metrics.actual_duration) / FOCUS_MINUTES_PER_POINT).round();
    let quality = f64::from(metrics.focus_quality.unwrap_or(NEUTRAL_FOCUS_QUALITY));
    let goal_bonus = if metrics.completed_goal {
        FOCUS_GOAL_BONUS
    } else {
        0.0
    };
    let penalty =
        (f64::from(metrics.distraction_count) * POINTS_PER_DISTRACTION).min(base * 0.5);

    let points = (base * (quality / f64::from(NEUTRAL_FOCUS_QUALITY)) + goal_bonus - penalty)
        .round();

    if points < 1.0 {
        1
    } else {
        points as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attrs(difficulty: u8, energy: u8, duration: u32, priority: u8) -> TaskAttributes {
        TaskAttributes {
            difficulty: Some(difficulty),
            energy_required: Some(energy),
            estimated_duration: Some(duration),
            priority: Some(priority),
        }
    }

    fn metrics(duration: u32, quality: Option<u8>, goal: bool, distractions: u32) -> SessionMetrics {
        SessionMetrics {
            actual_duration: duration,
            distraction_count: distractions,
            focus_quality: quality,
            completed_goal: goal,
        }
    }

    #[test]
    fn test_hard_task_without_streak() {
        let base = task_base_points(&attrs(5, 5, 30, 5));
        assert_eq!(base, 31); // round(10 + 7.5 + 3 + 10)

        let reward = task_completion_reward(base, 0);
        assert_eq!(reward.bonus_points, 0);
        assert_eq!(reward.total(), 31);
    }

    #[test]
    fn test_hard_task_with_streak() {
        let reward = task_completion_reward(31, 5);
        assert_eq!(reward.bonus_points, 8); // round(7.75)
        assert_eq!(reward.total(), 39);
    }

    #[test]
    fn test_defaults_apply_to_missing_attributes() {
        // 6 + 4.5 + 3 + 4 = 17.5
        assert_eq!(task_base_points(&TaskAttributes::default()), 18);
        assert_eq!(
            task_base_points(&TaskAttributes::default()),
            task_base_points(&attrs(3, 3, 25, 2))
        );
    }

    #[test]
    fn test_base_points_positive_over_valid_range() {
        for d in 1..=5 {
            for e in 1..=5 {
                for p in 1..=5 {
                    for duration in [0, 1, 9, 10, 11, 240] {
                        let a = attrs(d, e, duration, p);
                        let first = task_base_points(&a);
                        assert!(first >= 1);
                        assert_eq!(first, task_base_points(&a));
                    }
                }
            }
        }
    }

    #[test]
    fn test_bonus_is_zero_without_streak() {
        for base in [1, 7, 31, 100] {
            assert_eq!(completion_bonus(base, 0), 0);
            assert_eq!(
                completion_bonus(base, 1),
                (f64::from(base) * 0.25).round() as u32
            );
        }
    }

    #[test]
    fn test_focus_session_scenario() {
        // base 10, 10 * 5/3 + 10 - 2 = 24.67
        assert_eq!(focus_session_points(&metrics(50, Some(5), true, 1)), 25);
    }

    #[test]
    fn test_focus_quality_defaults_to_neutral() {
        assert_eq!(focus_session_points(&metrics(25, None, false, 0)), 5);
        assert_eq!(focus_session_points(&metrics(25, Some(3), false, 0)), 5);
    }

    #[test]
    fn test_distraction_penalty_capped_at_half_base() {
        // base 12, penalty min(40, 6) = 6
        assert_eq!(focus_session_points(&metrics(60, Some(3), false, 20)), 6);
    }

    #[test]
    fn test_focus_points_floor_of_one() {
        assert_eq!(focus_session_points(&metrics(1, Some(1), false, 50)), 1);
        assert_eq!(focus_session_points(&metrics(5, Some(1), false, 10)), 1);
        for duration in [1, 2, 3, 7, 12] {
            for quality in 1..=5 {
                for distractions in [0, 1, 5, 100] {
                    let m = metrics(duration, Some(quality), false, distractions);
                    assert!(focus_session_points(&m) >= 1);
                }
            }
        }
    }
}
