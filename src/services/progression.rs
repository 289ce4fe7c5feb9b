// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Progression service.
//!
//! Orchestrates every user action that moves points:
//! 1. Validate ownership and state inside a Firestore transaction
//! 2. Compute the reward with the pure calculators
//! 3. Credit points (increment transform + ledger entry), bump the daily
//!    progress row and advance the streak, all in the same commit
//! 4. After commit, evaluate achievements against fresh statistics
//!
//! A commit that loses to a concurrent writer is retried from step 1.

use crate::db::{FirestoreDb, UnitOfWork};
use crate::error::{AppError, Result};
use crate::models::{
    Achievement, ActiveSessionMarker, FocusSession, FriendshipStatus, OverwhelmLevel, ProgressDelta, QuestStatus,
    RewardHistory, RewardReason, SessionMetrics, SessionType, StreakHistory, Task, TaskStatus,
    User, UserAchievement, WeeklyQuest, WeeklyQuestTask,
};
use crate::services::achievements::{self, UserStatsSnapshot};
use crate::services::levels::{level_progress, LevelProgress};
use crate::services::quests::{self, QuestTaskDraft, MAX_QUEST_TASKS};
use crate::services::rewards::{self, TaskAttributes};
use crate::services::streak::{self, StreakUpdate};
use crate::time_utils::utc_day;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashSet;
use std::future::Future;

/// Attempts per action before contention is surfaced to the caller.
const MAX_ATTEMPTS: u32 = 3;

/// Streak fields returned after an action.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct StreakSummary {
    pub current_streak: u32,
    pub longest_streak: u32,
    /// Weekly milestone bonus paid by this action
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bonus_points: Option<u32>,
}

impl StreakSummary {
    fn from_update(update: &StreakUpdate) -> Self {
        Self {
            current_streak: update.state.current_streak,
            longest_streak: update.state.longest_streak,
            bonus_points: update.bonus_points,
        }
    }
}

/// Points, level and unlocks after an action.
#[derive(Debug, Clone, Serialize)]
pub struct ProgressSummary {
    pub points_earned: u64,
    pub new_total_points: u64,
    pub level: LevelProgress,
    pub streak: StreakSummary,
    pub new_achievements: Vec<Achievement>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskCompletion {
    pub task: Task,
    pub base_points: u32,
    pub bonus_points: u32,
    #[serde(flatten)]
    pub progress: ProgressSummary,
}

#[derive(Debug, Clone, Serialize)]
pub struct FocusCompletion {
    pub session: FocusSession,
    #[serde(flatten)]
    pub progress: ProgressSummary,
}

#[derive(Debug, Clone, Serialize)]
pub struct QuestTaskOutcome {
    pub quest_completed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bonus_xp: Option<u64>,
    pub completed_task_count: u32,
    pub target_task_count: u32,
    #[serde(flatten)]
    pub progress: ProgressSummary,
}

/// A quest with its tasks.
#[derive(Debug, Clone, Serialize)]
pub struct QuestView {
    pub quest: WeeklyQuest,
    pub tasks: Vec<WeeklyQuestTask>,
    pub days_remaining: u32,
}

/// Fields of a new task.
#[derive(Debug, Clone, Default)]
pub struct NewTask {
    pub title: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub tags: Vec<String>,
    pub priority: Option<u8>,
    pub energy_required: Option<u8>,
    pub difficulty_level: Option<u8>,
    pub estimated_duration: Option<u32>,
    pub due_date: Option<chrono::NaiveDate>,
    pub parent_task_id: Option<String>,
}

/// Fields of a new focus session.
#[derive(Debug, Clone, Default)]
pub struct NewFocusSession {
    pub task_id: Option<String>,
    pub session_type: SessionType,
    pub planned_duration: u32,
}

pub(crate) fn ensure_owner(owner: &str, user_id: &str, what: &str, id: &str) -> Result<()> {
    if owner != user_id {
        return Err(AppError::Forbidden(format!("{} {} belongs to another user", what, id)));
    }
    Ok(())
}

/// Run `action` until it succeeds, fails for a non-retryable reason, or
/// exhausts [`MAX_ATTEMPTS`].
pub(crate) async fn with_retry<T, F, Fut>(operation: &'static str, mut action: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 1;
    loop {
        match action().await {
            Err(e) if e.is_retryable() && attempt < MAX_ATTEMPTS => {
                tracing::warn!(operation, attempt, error = %e, "Transaction contention, retrying");
                attempt += 1;
            }
            result => return result,
        }
    }
}

/// Award points, streak progress and achievements for user actions.
#[derive(Clone)]
pub struct ProgressionService {
    db: FirestoreDb,
}

impl ProgressionService {
    pub fn new(db: FirestoreDb) -> Self {
        Self { db }
    }

    // ─── Shared Steps ─────────────────────────────────────────────

    /// Advance the streak for `now` and buffer the writes it implies.
    ///
    /// Returns the update; its bonus (if any) is already credited.
    fn apply_streak(
        uow: &mut UnitOfWork<'_>,
        user: &User,
        now: DateTime<Utc>,
    ) -> Result<StreakUpdate> {
        let update = streak::record_activity(user.streak_state(), utc_day(now));
        if update.is_noop() {
            return Ok(update);
        }

        let mut updated = user.clone();
        updated.current_streak = update.state.current_streak;
        updated.longest_streak = update.state.longest_streak;
        updated.last_active_date = update.state.last_active_date;
        updated.streak_start_date = update.state.streak_start_date;
        uow.put_streak(&updated)?;

        if let Some(broken) = update.broken {
            tracing::info!(
                user_id = %user.user_id,
                streak = broken.streak_count,
                missed_days = broken.missed_days,
                "Streak broken"
            );
            uow.archive_streak(&StreakHistory {
                user_id: user.user_id.clone(),
                streak_count: broken.streak_count,
                start_date: broken.start_date,
                end_date: broken.end_date,
                missed_days: broken.missed_days,
            })?;
        }

        if let Some(bonus) = update.bonus_points {
            tracing::info!(
                user_id = %user.user_id,
                streak = update.state.current_streak,
                points = bonus,
                "Streak milestone bonus"
            );
            uow.credit(&RewardHistory::new(
                &user.user_id,
                RewardReason::StreakBonus,
                u64::from(bonus),
                serde_json::json!({ "streak": update.state.current_streak }),
                now,
            ))?;
        }

        Ok(update)
    }

    /// Evaluate achievements and build the response summary.
    ///
    /// The action is already committed; failures here are logged and do not
    /// fail the request.
    async fn summarize(
        &self,
        user_id: &str,
        points_earned: u64,
        streak: StreakSummary,
        now: DateTime<Utc>,
    ) -> Result<ProgressSummary> {
        let new_achievements = match self.evaluate_achievements(user_id, now).await {
            Ok(awarded) => awarded,
            Err(e) => {
                tracing::warn!(user_id, error = %e, "Achievement evaluation failed");
                Vec::new()
            }
        };

        let user = self
            .db
            .get_user(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User {}", user_id)))?;

        Ok(ProgressSummary {
            points_earned,
            new_total_points: user.total_points,
            level: level_progress(user.total_points),
            streak,
            new_achievements,
        })
    }

    // ─── Tasks ───────────────────────────────────────────────────

    /// Create a task with its base reward fixed from its attributes.
    pub async fn create_task(&self, user_id: &str, new: NewTask, now: DateTime<Utc>) -> Result<Task> {
        if new.title.trim().is_empty() {
            return Err(AppError::Validation("Task title must not be empty".to_string()));
        }
        if let Some(parent_id) = &new.parent_task_id {
            let parent = self
                .db
                .get_task(parent_id)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("Parent task {}", parent_id)))?;
            ensure_owner(&parent.user_id, user_id, "Task", parent_id)?;
        }

        let attrs = TaskAttributes {
            difficulty: new.difficulty_level,
            energy_required: new.energy_required,
            estimated_duration: new.estimated_duration,
            priority: new.priority,
        };
        let task = Task {
            task_id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            title: new.title.trim().to_string(),
            description: new.description,
            category: new.category,
            tags: new.tags,
            priority: attrs.priority.unwrap_or(rewards::DEFAULT_PRIORITY),
            energy_required: attrs.energy_required.unwrap_or(rewards::DEFAULT_ENERGY),
            difficulty_level: attrs.difficulty.unwrap_or(rewards::DEFAULT_DIFFICULTY),
            estimated_duration: new.estimated_duration,
            actual_duration: None,
            due_date: new.due_date,
            parent_task_id: new.parent_task_id,
            status: TaskStatus::Pending,
            reward_points: rewards::task_base_points(&attrs),
            bonus_points: 0,
            created_at: now,
            started_at: None,
            completed_at: None,
        };

        let task_ref = &task;
        with_retry("create_task", || async move {
            let mut uow = self.db.begin().await?;
            uow.put_task(task_ref)?;
            uow.bump_progress(user_id, utc_day(now), &ProgressDelta::task_created())?;
            uow.commit().await
        })
        .await?;

        tracing::info!(user_id, task_id = %task.task_id, points = task.reward_points, "Task created");
        Ok(task)
    }

    /// Read, change and write back a task owned by `user_id` in one
    /// transaction, so a concurrent completion is never overwritten.
    ///
    /// `edit` may run more than once when the commit is retried.
    pub async fn edit_task<F>(&self, user_id: &str, task_id: &str, edit: F) -> Result<Task>
    where
        F: Fn(&mut Task) -> Result<()>,
    {
        let edit = &edit;
        with_retry("edit_task", || async move {
            let mut uow = self.db.begin().await?;
            let mut task = uow
                .get_task(task_id)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("Task {}", task_id)))?;
            ensure_owner(&task.user_id, user_id, "Task", task_id)?;
            edit(&mut task)?;
            uow.put_task(&task)?;
            uow.commit().await?;
            Ok(task)
        })
        .await
    }

    /// Move an open task to in progress.
    pub async fn start_task(&self, user_id: &str, task_id: &str, now: DateTime<Utc>) -> Result<Task> {
        let task = self
            .edit_task(user_id, task_id, |task| {
                if !task.status.is_open() {
                    return Err(AppError::Conflict(format!(
                        "Task {} is already {}",
                        task.task_id,
                        task.status.as_str()
                    )));
                }
                task.status = TaskStatus::InProgress;
                task.started_at = Some(now);
                Ok(())
            })
            .await?;

        tracing::info!(user_id, task_id, "Task started");
        Ok(task)
    }

    /// Complete an open task owned by `user_id`.
    ///
    /// `actual_duration` (minutes) overrides the time measured since start.
    pub async fn complete_task(
        &self,
        user_id: &str,
        task_id: &str,
        actual_duration: Option<u32>,
        now: DateTime<Utc>,
    ) -> Result<TaskCompletion> {
        if actual_duration == Some(0) {
            return Err(AppError::Validation(
                "Actual duration must be at least one minute".to_string(),
            ));
        }
        let (task, reward, update) = with_retry("complete_task", || {
            self.try_complete_task(user_id, task_id, actual_duration, now)
        })
        .await?;

        let points = u64::from(reward.total());
        tracing::info!(user_id, task_id, points, "Task completed");

        let progress = self
            .summarize(user_id, points, StreakSummary::from_update(&update), now)
            .await?;
        Ok(TaskCompletion {
            task,
            base_points: reward.base_points,
            bonus_points: reward.bonus_points,
            progress,
        })
    }

    async fn try_complete_task(
        &self,
        user_id: &str,
        task_id: &str,
        actual_duration: Option<u32>,
        now: DateTime<Utc>,
    ) -> Result<(Task, rewards::TaskReward, StreakUpdate)> {
        let mut uow = self.db.begin().await?;

        let mut task = uow
            .get_task(task_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Task {}", task_id)))?;
        ensure_owner(&task.user_id, user_id, "Task", task_id)?;
        if !task.status.is_open() {
            return Err(AppError::Conflict(format!(
                "Task {} is already {}",
                task_id,
                task.status.as_str()
            )));
        }
        let user = uow
            .get_user(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User {}", user_id)))?;

        let reward = rewards::task_completion_reward(task.reward_points, user.current_streak);
        let total = u64::from(reward.total());

        task.status = TaskStatus::Completed;
        task.bonus_points = reward.bonus_points;
        task.completed_at = Some(now);
        task.actual_duration = actual_duration.or(task.actual_duration).or_else(|| {
            task.started_at.map(|started| {
                u32::try_from((now - started).num_minutes().max(0)).unwrap_or(u32::MAX)
            })
        });
        uow.put_task(&task)?;

        uow.credit(&RewardHistory::new(
            user_id,
            RewardReason::TaskCompleted,
            total,
            serde_json::json!({
                "task_id": task_id,
                "base_points": reward.base_points,
                "bonus_points": reward.bonus_points,
            }),
            now,
        ))?;
        uow.increment_user(user_id, &[("tasks_completed", 1)])?;

        let update = Self::apply_streak(&mut uow, &user, now)?;
        let mut delta = ProgressDelta::task_completed(total);
        delta.points_earned += update.bonus_points.map(u64::from).unwrap_or(0);
        uow.bump_progress(user_id, utc_day(now), &delta)?;

        uow.commit().await?;
        Ok((task, reward, update))
    }

    // ─── Focus Sessions ──────────────────────────────────────────

    /// Open a focus session. A user has at most one open session.
    pub async fn start_focus_session(
        &self,
        user_id: &str,
        new: NewFocusSession,
        now: DateTime<Utc>,
    ) -> Result<FocusSession> {
        if new.planned_duration == 0 {
            return Err(AppError::Validation(
                "Planned duration must be at least one minute".to_string(),
            ));
        }
        if let Some(task_id) = &new.task_id {
            let task = self
                .db
                .get_task(task_id)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("Task {}", task_id)))?;
            ensure_owner(&task.user_id, user_id, "Task", task_id)?;
        }

        let session = FocusSession {
            session_id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            task_id: new.task_id,
            session_type: new.session_type,
            planned_duration: new.planned_duration,
            actual_duration: None,
            distraction_count: 0,
            focus_quality: None,
            completed_goal: false,
            points_earned: 0,
            started_at: now,
            ended_at: None,
        };
        let marker = ActiveSessionMarker::for_session(&session);
        let (session_ref, marker_ref) = (&session, &marker);
        let started = with_retry("start_focus_session", || async move {
            let mut uow = self.db.begin().await?;
            if let Some(open) = uow.get_active_session(user_id).await? {
                return Err(AppError::Conflict(format!(
                    "Focus session {} is still active",
                    open.session_id
                )));
            }
            uow.create_active_session(marker_ref)?;
            uow.put_session(session_ref)?;
            uow.commit_if_absent().await
        })
        .await?;
        if !started {
            return Err(AppError::Conflict(
                "Another focus session was started concurrently".to_string(),
            ));
        }

        tracing::info!(user_id, session_id = %session.session_id, "Focus session started");
        Ok(session)
    }

    /// Close an open session and pay its points.
    pub async fn end_focus_session(
        &self,
        user_id: &str,
        session_id: &str,
        metrics: SessionMetrics,
        now: DateTime<Utc>,
    ) -> Result<FocusCompletion> {
        if let Some(q) = metrics.focus_quality {
            if !(1..=5).contains(&q) {
                return Err(AppError::Validation(format!(
                    "Focus quality must be between 1 and 5, got {}",
                    q
                )));
            }
        }

        let metrics = &metrics;
        let (session, update) = with_retry("end_focus_session", || {
            self.try_end_focus_session(user_id, session_id, metrics, now)
        })
        .await?;

        let points = u64::from(session.points_earned);
        tracing::info!(user_id, session_id, points, "Focus session ended");

        let progress = self
            .summarize(user_id, points, StreakSummary::from_update(&update), now)
            .await?;
        Ok(FocusCompletion { session, progress })
    }

    async fn try_end_focus_session(
        &self,
        user_id: &str,
        session_id: &str,
        metrics: &SessionMetrics,
        now: DateTime<Utc>,
    ) -> Result<(FocusSession, StreakUpdate)> {
        let mut uow = self.db.begin().await?;

        let mut session = uow
            .get_session(session_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Focus session {}", session_id)))?;
        ensure_owner(&session.user_id, user_id, "Focus session", session_id)?;
        if !session.is_open() {
            return Err(AppError::Conflict(format!(
                "Focus session {} has already ended",
                session_id
            )));
        }
        let user = uow
            .get_user(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User {}", user_id)))?;
        let marker = uow.get_active_session(user_id).await?;

        let points = rewards::focus_session_points(metrics);
        session.actual_duration = Some(metrics.actual_duration);
        session.distraction_count = metrics.distraction_count;
        session.focus_quality = metrics.focus_quality;
        session.completed_goal = metrics.completed_goal;
        session.points_earned = points;
        session.ended_at = Some(now);
        uow.put_session(&session)?;
        if marker.is_some_and(|m| m.session_id == session_id) {
            uow.clear_active_session(user_id)?;
        }

        uow.credit(&RewardHistory::new(
            user_id,
            RewardReason::FocusSession,
            u64::from(points),
            serde_json::json!({
                "session_id": session_id,
                "duration": metrics.actual_duration,
            }),
            now,
        ))?;
        uow.increment_user(user_id, &[("focus_sessions_completed", 1)])?;

        let update = Self::apply_streak(&mut uow, &user, now)?;
        let bonus = update.bonus_points.map(u64::from).unwrap_or(0);
        uow.bump_progress(
            user_id,
            utc_day(now),
            &ProgressDelta::focus_session(
                metrics.actual_duration,
                metrics.focus_quality,
                u64::from(points) + bonus,
            ),
        )?;

        uow.commit().await?;
        Ok((session, update))
    }

    // ─── Daily Activity ──────────────────────────────────────────

    /// Record a qualifying action for today: upsert the progress row and
    /// advance the streak. Idempotent within a day.
    pub async fn record_daily_activity(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<StreakSummary> {
        let update = with_retry("record_daily_activity", || async move {
            let mut uow = self.db.begin().await?;
            let user = uow
                .get_user(user_id)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("User {}", user_id)))?;

            let update = Self::apply_streak(&mut uow, &user, now)?;
            let delta = ProgressDelta::points(update.bonus_points.map(u64::from).unwrap_or(0));
            uow.bump_progress(user_id, utc_day(now), &delta)?;
            uow.commit().await?;
            Ok(update)
        })
        .await?;

        tracing::debug!(user_id, streak = update.state.current_streak, "Daily activity recorded");
        Ok(StreakSummary::from_update(&update))
    }

    // ─── Achievements ────────────────────────────────────────────

    /// Statistics the achievement catalog is evaluated against.
    pub async fn stats_snapshot(&self, user: &User) -> Result<UserStatsSnapshot> {
        let friends = self
            .db
            .list_friendships(&user.user_id)
            .await?
            .into_iter()
            .filter(|f| f.status == FriendshipStatus::Accepted)
            .count() as u64;

        let quests = self.db.list_quests(&user.user_id).await?;
        let completed: Vec<&WeeklyQuest> = quests
            .iter()
            .filter(|q| q.status == QuestStatus::Completed)
            .collect();

        Ok(UserStatsSnapshot {
            tasks_completed: u64::from(user.tasks_completed),
            total_xp: user.total_points,
            streak: u64::from(user.current_streak),
            friends,
            quests_completed: completed.len() as u64,
            full_quests_completed: completed
                .iter()
                .filter(|q| q.overwhelm_level == OverwhelmLevel::Full)
                .count() as u64,
            consecutive_quests_completed: achievements::consecutive_completions(
                quests.iter().map(|q| q.status),
            ),
        })
    }

    /// Award every unearned achievement whose threshold is met.
    ///
    /// Each unlock row is committed together with its XP credit. Unlocks that
    /// another request recorded first are skipped silently and not paid
    /// again. XP from new unlocks can qualify further XP achievements, so
    /// evaluation repeats until nothing new is awarded.
    pub async fn evaluate_achievements(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<Achievement>> {
        let user = self
            .db
            .get_user(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User {}", user_id)))?;
        let mut stats = self.stats_snapshot(&user).await?;

        let mut catalog = self.db.list_achievements().await?;
        if catalog.is_empty() {
            catalog = achievements::default_catalog();
        }
        let mut earned: HashSet<String> = self
            .db
            .list_user_achievements(user_id)
            .await?
            .into_iter()
            .map(|u| u.achievement_key)
            .collect();

        let mut awarded = Vec::new();
        loop {
            let candidates: Vec<Achievement> = achievements::evaluate(&catalog, &earned, &stats)
                .into_iter()
                .cloned()
                .collect();
            if candidates.is_empty() {
                break;
            }

            for achievement in candidates {
                earned.insert(achievement.key.clone());

                if !self.unlock_achievement(user_id, &achievement, now).await? {
                    tracing::debug!(user_id, key = %achievement.key, "Achievement already unlocked");
                    continue;
                }
                stats.total_xp += achievement.xp_reward;
                tracing::info!(
                    user_id,
                    key = %achievement.key,
                    points = achievement.xp_reward,
                    "Achievement unlocked"
                );
                awarded.push(achievement);
            }
        }

        Ok(awarded)
    }

    /// Record the unlock and pay its XP in one commit.
    ///
    /// Returns `false`, with nothing written, when the user already holds it.
    async fn unlock_achievement(
        &self,
        user_id: &str,
        achievement: &Achievement,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let unlock = UserAchievement {
            user_id: user_id.to_string(),
            achievement_key: achievement.key.clone(),
            unlocked_at: now,
        };
        let entry = RewardHistory::new(
            user_id,
            RewardReason::AchievementUnlocked,
            achievement.xp_reward,
            serde_json::json!({ "achievement": achievement.key }),
            now,
        );
        let (unlock, entry) = (&unlock, &entry);
        with_retry("unlock_achievement", || async move {
            let mut uow = self.db.begin().await?;
            if uow
                .get_user_achievement(user_id, &unlock.achievement_key)
                .await?
                .is_some()
            {
                uow.rollback().await;
                return Ok(false);
            }
            uow.create_user_achievement(unlock)?;
            if entry.points > 0 {
                uow.credit(entry)?;
                uow.bump_progress(user_id, utc_day(now), &ProgressDelta::points(entry.points))?;
            }
            uow.commit_if_absent().await
        })
        .await
    }

    // ─── Weekly Quests ───────────────────────────────────────────

    /// Create the user's quest for the current week.
    ///
    /// An elapsed active quest is failed first; a live one is a conflict.
    pub async fn create_quest(
        &self,
        user_id: &str,
        level: OverwhelmLevel,
        drafts: Vec<QuestTaskDraft>,
        now: DateTime<Utc>,
    ) -> Result<QuestView> {
        for task_id in drafts.iter().filter_map(|d| d.task_id.as_deref()) {
            let task = self
                .db
                .get_task(task_id)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("Task {}", task_id)))?;
            ensure_owner(&task.user_id, user_id, "Task", task_id)?;
        }

        let (quest, tasks) = with_retry("create_quest", || {
            let drafts = drafts.clone();
            async move {
                let mut uow = self.db.begin().await?;
                let user = uow
                    .get_user(user_id)
                    .await?
                    .ok_or_else(|| AppError::NotFound(format!("User {}", user_id)))?;

                for mut active in uow.list_active_quests(user_id).await? {
                    if !quests::expire_if_elapsed(&mut active, now) {
                        return Err(AppError::Conflict(format!(
                            "Quest {} is still active",
                            active.quest_id
                        )));
                    }
                    uow.put_quest(&active)?;
                }

                let (quest, tasks) =
                    quests::plan_quest(user_id, level, user.quest_reset_day, drafts, now)?;
                uow.put_quest(&quest)?;
                for task in &tasks {
                    uow.put_quest_task(task)?;
                }
                uow.commit().await?;
                Ok((quest, tasks))
            }
        })
        .await?;

        tracing::info!(
            user_id,
            quest_id = %quest.quest_id,
            target = quest.target_task_count,
            tasks = tasks.len(),
            "Weekly quest created"
        );
        Ok(QuestView {
            days_remaining: quests::days_remaining(quest.week_end, utc_day(now)),
            quest,
            tasks,
        })
    }

    /// Fail every active quest of the user whose window has ended.
    ///
    /// Idempotent; returns the number of quests that changed.
    pub async fn reconcile_expired(&self, user_id: &str, now: DateTime<Utc>) -> Result<usize> {
        let stale: Vec<String> = self
            .db
            .list_quests(user_id)
            .await?
            .into_iter()
            .filter(|q| q.status == QuestStatus::Active && q.week_end < utc_day(now))
            .map(|q| q.quest_id)
            .collect();

        let mut changed = 0;
        for quest_id in &stale {
            let expired = with_retry("reconcile_quest", || async move {
                let mut uow = self.db.begin().await?;
                let Some(mut quest) = uow.get_quest(quest_id).await? else {
                    return Ok(false);
                };
                if !quests::expire_if_elapsed(&mut quest, now) {
                    uow.rollback().await;
                    return Ok(false);
                }
                uow.put_quest(&quest)?;
                uow.commit().await?;
                Ok(true)
            })
            .await?;
            if expired {
                tracing::info!(user_id, quest_id = %quest_id, "Weekly quest failed (window elapsed)");
                changed += 1;
            }
        }
        Ok(changed)
    }

    /// The user's active quest after reconciling expirations.
    pub async fn current_quest(&self, user_id: &str, now: DateTime<Utc>) -> Result<Option<QuestView>> {
        self.reconcile_expired(user_id, now).await?;

        let Some(quest) = self
            .db
            .list_quests(user_id)
            .await?
            .into_iter()
            .find(|q| q.status == QuestStatus::Active)
        else {
            return Ok(None);
        };
        let tasks = self.db.list_quest_tasks(&quest.quest_id).await?;
        Ok(Some(QuestView {
            days_remaining: quests::days_remaining(quest.week_end, utc_day(now)),
            quest,
            tasks,
        }))
    }

    /// Complete one quest task, paying its XP and, on the crossing edge,
    /// the quest bonus.
    pub async fn complete_quest_task(
        &self,
        user_id: &str,
        quest_task_id: &str,
        now: DateTime<Utc>,
    ) -> Result<QuestTaskOutcome> {
        let (completion, quest, update) = with_retry("complete_quest_task", || {
            self.try_complete_quest_task(user_id, quest_task_id, now)
        })
        .await?;

        let points = u64::from(completion.task_xp) + completion.bonus_xp.unwrap_or(0);
        if completion.quest_completed {
            tracing::info!(
                user_id,
                quest_id = %quest.quest_id,
                bonus = completion.bonus_xp.unwrap_or(0),
                "Weekly quest completed"
            );
        }

        let progress = self
            .summarize(user_id, points, StreakSummary::from_update(&update), now)
            .await?;
        Ok(QuestTaskOutcome {
            quest_completed: completion.quest_completed,
            bonus_xp: completion.bonus_xp,
            completed_task_count: completion.completed_task_count,
            target_task_count: quest.target_task_count,
            progress,
        })
    }

    async fn try_complete_quest_task(
        &self,
        user_id: &str,
        quest_task_id: &str,
        now: DateTime<Utc>,
    ) -> Result<(quests::QuestTaskCompletion, WeeklyQuest, StreakUpdate)> {
        let mut uow = self.db.begin().await?;

        let quest_task = uow
            .get_quest_task(quest_task_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Quest task {}", quest_task_id)))?;
        ensure_owner(&quest_task.user_id, user_id, "Quest task", quest_task_id)?;
        let mut quest = uow
            .get_quest(&quest_task.quest_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Quest {}", quest_task.quest_id)))?;

        if quests::expire_if_elapsed(&mut quest, now) {
            uow.put_quest(&quest)?;
            uow.commit().await?;
            return Err(AppError::Conflict(format!(
                "Quest {} has ended",
                quest.quest_id
            )));
        }

        let mut tasks = uow.list_quest_tasks(&quest.quest_id).await?;
        let completion = quests::complete_task(&mut quest, &mut tasks, quest_task_id, now)?;
        let user = uow
            .get_user(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User {}", user_id)))?;

        if let Some(task) = tasks.iter().find(|t| t.quest_task_id == quest_task_id) {
            uow.put_quest_task(task)?;
        }
        uow.put_quest(&quest)?;

        let meta = serde_json::json!({
            "quest_id": quest.quest_id,
            "quest_task_id": quest_task_id,
        });
        if completion.task_xp > 0 {
            uow.credit(&RewardHistory::new(
                user_id,
                RewardReason::QuestTask,
                u64::from(completion.task_xp),
                meta.clone(),
                now,
            ))?;
        }
        if let Some(bonus) = completion.bonus_xp.filter(|b| *b > 0) {
            uow.credit(&RewardHistory::new(
                user_id,
                RewardReason::QuestBonus,
                bonus,
                meta,
                now,
            ))?;
        }

        let update = Self::apply_streak(&mut uow, &user, now)?;
        let points = u64::from(completion.task_xp)
            + completion.bonus_xp.unwrap_or(0)
            + update.bonus_points.map(u64::from).unwrap_or(0);
        uow.bump_progress(user_id, utc_day(now), &ProgressDelta::points(points))?;

        uow.commit().await?;
        Ok((completion, quest, update))
    }

    /// Undo a quest task completion on an active quest.
    pub async fn uncomplete_quest_task(
        &self,
        user_id: &str,
        quest_task_id: &str,
        now: DateTime<Utc>,
    ) -> Result<WeeklyQuest> {
        with_retry("uncomplete_quest_task", || async move {
            let mut uow = self.db.begin().await?;
            let quest_task = uow
                .get_quest_task(quest_task_id)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("Quest task {}", quest_task_id)))?;
            ensure_owner(&quest_task.user_id, user_id, "Quest task", quest_task_id)?;
            let mut quest = uow
                .get_quest(&quest_task.quest_id)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("Quest {}", quest_task.quest_id)))?;

            let mut tasks = uow.list_quest_tasks(&quest.quest_id).await?;
            quests::uncomplete_task(&mut quest, &mut tasks, quest_task_id, now)?;

            if let Some(task) = tasks.iter().find(|t| t.quest_task_id == quest_task_id) {
                uow.put_quest_task(task)?;
            }
            uow.put_quest(&quest)?;
            uow.commit().await?;
            Ok(quest)
        })
        .await
    }

    /// Abandon an active quest owned by `user_id`.
    pub async fn abandon_quest(
        &self,
        user_id: &str,
        quest_id: &str,
        now: DateTime<Utc>,
    ) -> Result<WeeklyQuest> {
        let quest = with_retry("abandon_quest", || async move {
            let mut uow = self.db.begin().await?;
            let mut quest = uow
                .get_quest(quest_id)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("Quest {}", quest_id)))?;
            ensure_owner(&quest.user_id, user_id, "Quest", quest_id)?;
            quests::abandon(&mut quest, now)?;
            uow.put_quest(&quest)?;
            uow.commit().await?;
            Ok(quest)
        })
        .await?;

        tracing::info!(user_id, quest_id, "Weekly quest abandoned");
        Ok(quest)
    }

    /// Append a task to an active quest.
    pub async fn add_quest_task(
        &self,
        user_id: &str,
        quest_id: &str,
        draft: QuestTaskDraft,
        now: DateTime<Utc>,
    ) -> Result<WeeklyQuestTask> {
        if let Some(task_id) = &draft.task_id {
            let task = self
                .db
                .get_task(task_id)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("Task {}", task_id)))?;
            ensure_owner(&task.user_id, user_id, "Task", task_id)?;
        }

        with_retry("add_quest_task", || {
            let draft = draft.clone();
            async move {
                let mut uow = self.db.begin().await?;
                let mut quest = uow
                    .get_quest(quest_id)
                    .await?
                    .ok_or_else(|| AppError::NotFound(format!("Quest {}", quest_id)))?;
                ensure_owner(&quest.user_id, user_id, "Quest", quest_id)?;

                if quests::expire_if_elapsed(&mut quest, now) {
                    uow.put_quest(&quest)?;
                    uow.commit().await?;
                    return Err(AppError::Conflict(format!("Quest {} has ended", quest_id)));
                }
                if uow.list_quest_tasks(quest_id).await?.len() >= MAX_QUEST_TASKS {
                    return Err(AppError::Validation(format!(
                        "A quest can hold at most {} tasks",
                        MAX_QUEST_TASKS
                    )));
                }

                let task = quests::plan_added_task(&quest, draft)?;
                quest.updated_at = now;
                uow.put_quest_task(&task)?;
                uow.put_quest(&quest)?;
                uow.commit().await?;
                Ok(task)
            }
        })
        .await
    }

    /// Remove a task from an active quest, recounting completions.
    pub async fn delete_quest_task(
        &self,
        user_id: &str,
        quest_task_id: &str,
        now: DateTime<Utc>,
    ) -> Result<()> {
        with_retry("delete_quest_task", || async move {
            let mut uow = self.db.begin().await?;
            let quest_task = uow
                .get_quest_task(quest_task_id)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("Quest task {}", quest_task_id)))?;
            ensure_owner(&quest_task.user_id, user_id, "Quest task", quest_task_id)?;
            let mut quest = uow
                .get_quest(&quest_task.quest_id)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("Quest {}", quest_task.quest_id)))?;
            if quest.status.is_terminal() {
                return Err(AppError::Conflict(format!(
                    "Quest {} is no longer active",
                    quest.quest_id
                )));
            }

            let remaining = uow
                .list_quest_tasks(&quest.quest_id)
                .await?
                .into_iter()
                .filter(|t| t.quest_task_id != quest_task_id && t.completed)
                .count() as u32;
            quest.completed_task_count = remaining;
            quest.updated_at = now;

            uow.delete_quest_task(quest_task_id)?;
            uow.put_quest(&quest)?;
            uow.commit().await
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_ensure_owner() {
        assert!(ensure_owner("u1", "u1", "Task", "t1").is_ok());
        let err = ensure_owner("u1", "u2", "Task", "t1").unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }

    #[tokio::test]
    async fn test_retry_recovers_from_contention() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result = with_retry("test", || async move {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(AppError::Contention("aborted".to_string()))
            } else {
                Ok(7)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_retry_gives_up_and_skips_other_errors() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result: Result<()> = with_retry("test", || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(AppError::Contention("aborted".to_string()))
        })
        .await;
        assert!(matches!(result, Err(AppError::Contention(_))));
        assert_eq!(calls.load(Ordering::SeqCst), MAX_ATTEMPTS);

        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result: Result<()> = with_retry("test", || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(AppError::Conflict("done".to_string()))
        })
        .await;
        assert!(matches!(result, Err(AppError::Conflict(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_offline_store_fails_before_any_write() {
        let service = ProgressionService::new(FirestoreDb::new_mock());
        let err = service
            .complete_task("u1", "t1", None, Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Database(_)));

        let err = service
            .end_focus_session(
                "u1",
                "s1",
                SessionMetrics {
                    actual_duration: 25,
                    distraction_count: 0,
                    focus_quality: Some(9),
                    completed_goal: true,
                },
                Utc::now(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }
}
