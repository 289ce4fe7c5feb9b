// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Streak tracker.
//!
//! State machine over `(last_active_date, current_streak)` evaluated on UTC
//! calendar days:
//! - no prior activity: streak starts at 1
//! - same day: no change
//! - 1 or 2 days later: +1 (one skipped day is forgiven)
//! - 3+ days later: the old streak is archived and a new one starts at 1

use crate::time_utils::days_between;
use chrono::{Duration, NaiveDate};

/// Largest gap (in days) that still continues a streak.
const GRACE_GAP_DAYS: i64 = 2;
/// Bonus fires every this many streak days.
const BONUS_INTERVAL_DAYS: u32 = 7;
const BONUS_POINTS_PER_DAY: u32 = 5;

/// Streak fields of a user.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreakState {
    pub current_streak: u32,
    pub longest_streak: u32,
    pub last_active_date: Option<NaiveDate>,
    pub streak_start_date: Option<NaiveDate>,
}

/// What happened to the streak.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreakChange {
    Started,
    Unchanged,
    Continued,
    /// Continued across one skipped day
    Forgiven,
    Reset,
}

/// A streak that ended, to be archived.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BrokenStreak {
    pub streak_count: u32,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub missed_days: u32,
}

/// Result of recording activity on a day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreakUpdate {
    pub state: StreakState,
    pub change: StreakChange,
    pub broken: Option<BrokenStreak>,
    /// Weekly milestone bonus, if this update crossed one
    pub bonus_points: Option<u32>,
}

impl StreakUpdate {
    /// Whether the stored streak fields need to be written.
    pub fn is_noop(&self) -> bool {
        self.change == StreakChange::Unchanged
    }
}

/// Record qualifying activity on `today`.
pub fn record_activity(prev: StreakState, today: NaiveDate) -> StreakUpdate {
    let (current_streak, change, broken) = match prev.last_active_date {
        None => (1, StreakChange::Started, None),
        Some(last) => {
            let gap = days_between(last, today);
            if gap <= 0 {
                // Same day (or a clock behind the stored day): idempotent.
                return StreakUpdate {
                    state: prev,
                    change: StreakChange::Unchanged,
                    broken: None,
                    bonus_points: None,
                };
            } else if gap == 1 {
                (prev.current_streak + 1, StreakChange::Continued, None)
            } else if gap == GRACE_GAP_DAYS {
                (prev.current_streak + 1, StreakChange::Forgiven, None)
            } else {
                let broken = (prev.current_streak > 0).then(|| BrokenStreak {
                    streak_count: prev.current_streak,
                    start_date: prev.streak_start_date.unwrap_or_else(|| {
                        last - Duration::days(i64::from(prev.current_streak) - 1)
                    }),
                    end_date: last,
                    missed_days: u32::try_from(gap - 1).unwrap_or(u32::MAX),
                });
                (1, StreakChange::Reset, broken)
            }
        }
    };

    let streak_start_date = match change {
        StreakChange::Started | StreakChange::Reset => Some(today),
        _ => prev.streak_start_date.or(Some(today)),
    };

    let bonus_points = (current_streak > prev.current_streak
        && current_streak % BONUS_INTERVAL_DAYS == 0)
        .then_some(current_streak * BONUS_POINTS_PER_DAY);

    StreakUpdate {
        state: StreakState {
            current_streak,
            longest_streak: prev.longest_streak.max(current_streak),
            last_active_date: Some(today),
            streak_start_date,
        },
        change,
        broken,
        bonus_points,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(n: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 5, 1).unwrap() + Duration::days(i64::from(n))
    }

    fn state(current: u32, longest: u32, last: Option<NaiveDate>) -> StreakState {
        StreakState {
            current_streak: current,
            longest_streak: longest,
            last_active_date: last,
            streak_start_date: last.map(|l| l - Duration::days(i64::from(current.max(1)) - 1)),
        }
    }

    #[test]
    fn test_first_activity_starts_streak() {
        let update = record_activity(StreakState::default(), day(0));
        assert_eq!(update.change, StreakChange::Started);
        assert_eq!(update.state.current_streak, 1);
        assert_eq!(update.state.longest_streak, 1);
        assert_eq!(update.state.last_active_date, Some(day(0)));
        assert_eq!(update.state.streak_start_date, Some(day(0)));
    }

    #[test]
    fn test_same_day_is_idempotent() {
        let prev = state(4, 9, Some(day(3)));
        let first = record_activity(prev, day(3));
        let second = record_activity(first.state, day(3));
        assert!(first.is_noop() && second.is_noop());
        assert_eq!(second.state, prev);
        assert!(second.bonus_points.is_none());
    }

    #[test]
    fn test_next_day_and_grace_day_increment() {
        let prev = state(4, 4, Some(day(3)));

        let next = record_activity(prev, day(4));
        assert_eq!(next.change, StreakChange::Continued);
        assert_eq!(next.state.current_streak, 5);

        let grace = record_activity(prev, day(5));
        assert_eq!(grace.change, StreakChange::Forgiven);
        assert_eq!(grace.state.current_streak, 5);
        assert_eq!(grace.state.longest_streak, 5);
        assert!(grace.broken.is_none());
    }

    #[test]
    fn test_long_gap_resets_and_archives() {
        let prev = state(6, 10, Some(day(10)));
        let update = record_activity(prev, day(13));

        assert_eq!(update.change, StreakChange::Reset);
        assert_eq!(update.state.current_streak, 1);
        assert_eq!(update.state.longest_streak, 10);
        assert_eq!(
            update.broken,
            Some(BrokenStreak {
                streak_count: 6,
                start_date: day(5),
                end_date: day(10),
                missed_days: 2,
            })
        );
    }

    #[test]
    fn test_archived_range_covers_grace_days() {
        // Active on days 0, 2, 3: three active days spanning four calendar days
        let mut s = record_activity(StreakState::default(), day(0)).state;
        s = record_activity(s, day(2)).state;
        s = record_activity(s, day(3)).state;
        assert_eq!(s.current_streak, 3);

        let broken = record_activity(s, day(9)).broken.unwrap();
        assert_eq!(broken.streak_count, 3);
        assert_eq!(broken.start_date, day(0));
        assert_eq!(broken.end_date, day(3));
        assert_eq!(broken.missed_days, 5);
    }

    #[test]
    fn test_reset_from_zero_streak_archives_nothing() {
        let update = record_activity(state(0, 3, Some(day(0))), day(9));
        assert_eq!(update.state.current_streak, 1);
        assert!(update.broken.is_none());
    }

    #[test]
    fn test_weekly_bonus_fires_once() {
        let prev = state(6, 6, Some(day(6)));
        let update = record_activity(prev, day(7));
        assert_eq!(update.state.current_streak, 7);
        assert_eq!(update.bonus_points, Some(35));

        let again = record_activity(update.state, day(7));
        assert!(again.bonus_points.is_none());

        let fourteenth = record_activity(state(13, 13, Some(day(20))), day(21));
        assert_eq!(fourteenth.bonus_points, Some(70));
    }

    #[test]
    fn test_longest_streak_never_decreases() {
        let mut s = StreakState::default();
        let mut longest = 0;
        for d in [0, 1, 2, 4, 8, 9, 9, 10, 15, 16, 17, 18, 19] {
            s = record_activity(s, day(d)).state;
            assert!(s.longest_streak >= longest);
            assert!(s.longest_streak >= s.current_streak);
            longest = s.longest_streak;
        }
    }
}
