// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Achievement evaluator.
//!
//! Each achievement has a stable key mapped in code to a
//! `(statistic, threshold)` pair. Catalog entries whose key has no mapping
//! are skipped, so the stored catalog can run ahead of the code.

use crate::models::{Achievement, AchievementTier, QuestStatus};
use std::collections::HashSet;
use std::str::FromStr;

/// A user statistic an achievement can be gated on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Statistic {
    TasksCompleted,
    TotalXp,
    Streak,
    Friends,
    QuestsCompleted,
    FullQuestsCompleted,
    ConsecutiveQuestsCompleted,
}

impl Statistic {
    pub fn as_str(self) -> &'static str {
        match self {
            Statistic::TasksCompleted => "tasks_completed",
            Statistic::TotalXp => "total_xp",
            Statistic::Streak => "streak",
            Statistic::Friends => "friends",
            Statistic::QuestsCompleted => "quests_completed",
            Statistic::FullQuestsCompleted => "full_quests_completed",
            Statistic::ConsecutiveQuestsCompleted => "consecutive_quests_completed",
        }
    }
}

/// Snapshot of the statistics achievements are evaluated against.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UserStatsSnapshot {
    pub tasks_completed: u64,
    pub total_xp: u64,
    pub streak: u64,
    pub friends: u64,
    pub quests_completed: u64,
    pub full_quests_completed: u64,
    pub consecutive_quests_completed: u64,
}

impl UserStatsSnapshot {
    pub fn get(&self, stat: Statistic) -> u64 {
        match stat {
            Statistic::TasksCompleted => self.tasks_completed,
            Statistic::TotalXp => self.total_xp,
            Statistic::Streak => self.streak,
            Statistic::Friends => self.friends,
            Statistic::QuestsCompleted => self.quests_completed,
            Statistic::FullQuestsCompleted => self.full_quests_completed,
            Statistic::ConsecutiveQuestsCompleted => self.consecutive_quests_completed,
        }
    }
}

macro_rules! achievement_keys {
    ($(
        $variant:ident => $key:literal, $name:literal, $desc:literal, $icon:literal,
            $category:literal, $tier:ident, $xp:literal, $stat:ident >= $threshold:literal;
    )*) => {
        /// Stable achievement identifiers known to the evaluator.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum AchievementKey {
            $($variant,)*
        }

        impl AchievementKey {
            pub const ALL: &'static [AchievementKey] = &[$(AchievementKey::$variant,)*];

            pub fn as_str(self) -> &'static str {
                match self {
                    $(AchievementKey::$variant => $key,)*
                }
            }

            /// The statistic and threshold that unlock this achievement.
            pub fn requirement(self) -> (Statistic, u64) {
                match self {
                    $(AchievementKey::$variant => (Statistic::$stat, $threshold),)*
                }
            }

            /// Built-in catalog entry for this key.
            pub fn catalog_entry(self) -> Achievement {
                let (name, description, icon, category, tier, xp_reward) = match self {
                    $(AchievementKey::$variant => {
                        ($name, $desc, $icon, $category, AchievementTier::$tier, $xp)
                    })*
                };
                let (stat, threshold) = self.requirement();
                Achievement {
                    key: self.as_str().to_string(),
                    name: name.to_string(),
                    description: description.to_string(),
                    icon: icon.to_string(),
                    category: category.to_string(),
                    tier,
                    xp_reward,
                    requirement: serde_json::json!({ stat.as_str(): threshold }),
                }
            }
        }

        impl FromStr for AchievementKey {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($key => Ok(AchievementKey::$variant),)*
                    other => Err(format!("unknown achievement key '{}'", other)),
                }
            }
        }
    };
}

achievement_keys! {
    FirstTask => "first_task", "First Task", "Complete your first task", "👣",
        "tasks", Bronze, 10, TasksCompleted >= 1;
    GettingStarted => "getting_started", "Getting Started", "Complete 5 tasks", "🚀",
        "tasks", Bronze, 25, TasksCompleted >= 5;
    TaskMaster => "task_master", "Task Master", "Complete 10 tasks", "✅",
        "tasks", Silver, 50, TasksCompleted >= 10;
    ProductivityPro => "productivity_pro", "Productivity Pro", "Complete 25 tasks", "💪",
        "tasks", Silver, 100, TasksCompleted >= 25;
    TaskLegend => "task_legend", "Task Legend", "Complete 50 tasks", "🏆",
        "tasks", Gold, 200, TasksCompleted >= 50;
    CenturyClub => "century_club", "Century Club", "Complete 100 tasks", "💯",
        "tasks", Platinum, 500, TasksCompleted >= 100;
    XpBeginner => "xp_beginner", "XP Beginner", "Earn 100 XP", "⭐",
        "xp", Bronze, 10, TotalXp >= 100;
    XpCollector => "xp_collector", "XP Collector", "Earn 500 XP", "🌟",
        "xp", Silver, 25, TotalXp >= 500;
    XpHunter => "xp_hunter", "XP Hunter", "Earn 1,000 XP", "💫",
        "xp", Gold, 50, TotalXp >= 1000;
    XpMaster => "xp_master", "XP Master", "Earn 5,000 XP", "✨",
        "xp", Platinum, 100, TotalXp >= 5000;
    OnFire => "on_fire", "On Fire", "Maintain a 3-day streak", "🔥",
        "streak", Bronze, 15, Streak >= 3;
    WeekWarrior => "week_warrior", "Week Warrior", "Maintain a 7-day streak", "📅",
        "streak", Silver, 50, Streak >= 7;
    StreakMaster => "streak_master", "Streak Master", "Maintain a 14-day streak", "⚡",
        "streak", Gold, 100, Streak >= 14;
    MonthlyChampion => "monthly_champion", "Monthly Champion", "Maintain a 30-day streak", "👑",
        "streak", Platinum, 250, Streak >= 30;
    ItsYourYear => "its_your_year", "It's Your Year", "Keep a streak alive for 30 days", "🗓️",
        "streak", Platinum, 250, Streak >= 30;
    SocialButterfly => "social_butterfly", "Social Butterfly", "Add your first friend", "🦋",
        "social", Bronze, 10, Friends >= 1;
    Popular => "popular", "Popular", "Have 5 friends", "🤝",
        "social", Silver, 25, Friends >= 5;
    Influencer => "influencer", "Influencer", "Have 10 friends", "🌐",
        "social", Gold, 50, Friends >= 10;
    QuestBeginner => "quest_beginner", "Quest Beginner", "Complete your first Weekly Quest", "📜",
        "quests", Bronze, 50, QuestsCompleted >= 1;
    QuestVeteran => "quest_veteran", "Quest Veteran", "Complete 5 Weekly Quests", "⚔️",
        "quests", Silver, 100, QuestsCompleted >= 5;
    QuestMaster => "quest_master", "Quest Master", "Complete 10 Weekly Quests", "🗡️",
        "quests", Gold, 250, QuestsCompleted >= 10;
    FullThrottle => "full_throttle", "Full Throttle", "Complete a Full difficulty Weekly Quest", "💪",
        "quests", Silver, 75, FullQuestsCompleted >= 1;
    ConsistencyKing => "consistency_king", "Consistency King", "Complete 4 Weekly Quests in a row", "👑",
        "quests", Gold, 200, ConsecutiveQuestsCompleted >= 4;
}

/// The built-in catalog, seeded into the store at startup.
pub fn default_catalog() -> Vec<Achievement> {
    AchievementKey::ALL
        .iter()
        .map(|key| key.catalog_entry())
        .collect()
}

/// Catalog entries not in `earned` whose requirement `stats` now meets.
///
/// Entries with an unknown key are skipped.
pub fn evaluate<'a>(
    catalog: &'a [Achievement],
    earned: &HashSet<String>,
    stats: &UserStatsSnapshot,
) -> Vec<&'a Achievement> {
    catalog
        .iter()
        .filter(|a| !earned.contains(&a.key))
        .filter(|a| match AchievementKey::from_str(&a.key) {
            Ok(key) => {
                let (stat, threshold) = key.requirement();
                stats.get(stat) >= threshold
            }
            Err(_) => false,
        })
        .collect()
}

/// Length of the leading run of completed quests in a newest-first history.
///
/// Failed and abandoned quests end the run; the active quest is ignored.
pub fn consecutive_completions<I>(newest_first: I) -> u64
where
    I: IntoIterator<Item = QuestStatus>,
{
    newest_first
        .into_iter()
        .filter(|s| *s != QuestStatus::Active)
        .take_while(|s| *s == QuestStatus::Completed)
        .count() as u64
}
