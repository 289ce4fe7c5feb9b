// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Data models for the application.

pub mod achievement;
pub mod focus;
pub mod friend;
pub mod progress;
pub mod quest;
pub mod reward;
pub mod task;
pub mod user;

pub use achievement::{Achievement, AchievementTier, UserAchievement};
pub use focus::{ActiveSessionMarker, FocusSession, SessionMetrics, SessionType};
pub use friend::{Friendship, FriendshipStatus};
pub use progress::{DailyProgress, ProgressDelta};
pub use quest::{OverwhelmLevel, QuestStatus, QuestTaskSource, WeeklyQuest, WeeklyQuestTask};
pub use reward::{RewardHistory, RewardReason, StreakHistory};
pub use task::{Task, TaskStatus};
pub use user::{User, UsernameClaim};
