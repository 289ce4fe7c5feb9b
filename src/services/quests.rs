// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Weekly quest engine.
//!
//! A quest commits the user to completing a number of tasks inside a 7-day
//! window anchored to their reset weekday. State machine:
//! `active -> completed | failed | abandoned`; terminal states are final.

use crate::error::{AppError, Result};
use crate::models::{
    OverwhelmLevel, QuestStatus, QuestTaskSource, WeeklyQuest, WeeklyQuestTask,
};
use crate::time_utils::utc_day;
use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};

pub const QUEST_XP_MULTIPLIER: f64 = 1.5;
pub const DEFAULT_QUEST_TASK_XP: u32 = 10;
pub const MAX_QUEST_TASKS: usize = 50;
const WEEK_DAYS: i64 = 7;

/// First and last day (inclusive) of the quest week containing `today`.
///
/// `reset_day` is 0 = Sunday .. 6 = Saturday.
pub fn week_boundaries(reset_day: u8, today: NaiveDate) -> (NaiveDate, NaiveDate) {
    let current = i64::from(today.weekday().num_days_from_sunday());
    let since_reset = (current - i64::from(reset_day % 7)).rem_euclid(WEEK_DAYS);
    let start = today - Duration::days(since_reset);
    (start, start + Duration::days(WEEK_DAYS - 1))
}

/// Whole days left in the quest window, counting today.
pub fn days_remaining(week_end: NaiveDate, today: NaiveDate) -> u32 {
    let days = week_end.signed_duration_since(today).num_days() + 1;
    u32::try_from(days.max(0)).unwrap_or(0)
}

/// Bonus paid when a quest reaches its target.
pub fn bonus_xp(completed_task_xp: u64, multiplier: f64) -> u64 {
    (completed_task_xp as f64 * (multiplier - 1.0)).floor().max(0.0) as u64
}

/// A task to bind into a new quest.
#[derive(Debug, Clone)]
pub struct QuestTaskDraft {
    pub task_id: Option<String>,
    pub title: String,
    pub description: Option<String>,
    pub xp: Option<u32>,
}

impl QuestTaskDraft {
    fn into_task(self, quest_id: &str, user_id: &str) -> WeeklyQuestTask {
        let source = if self.task_id.is_some() {
            QuestTaskSource::Existing
        } else {
            QuestTaskSource::New
        };
        WeeklyQuestTask {
            quest_task_id: uuid::Uuid::new_v4().to_string(),
            quest_id: quest_id.to_string(),
            user_id: user_id.to_string(),
            task_id: self.task_id,
            title: self.title.trim().to_string(),
            description: self.description,
            xp: self.xp.unwrap_or(DEFAULT_QUEST_TASK_XP),
            source,
            completed: false,
            completed_at: None,
            xp_awarded: false,
        }
    }
}

/// Build a new active quest and its tasks for the week containing `now`.
pub fn plan_quest(
    user_id: &str,
    level: OverwhelmLevel,
    reset_day: u8,
    drafts: Vec<QuestTaskDraft>,
    now: DateTime<Utc>,
) -> Result<(WeeklyQuest, Vec<WeeklyQuestTask>)> {
    if drafts.is_empty() {
        return Err(AppError::Validation(
            "A quest needs at least one task".to_string(),
        ));
    }
    if drafts.len() > MAX_QUEST_TASKS {
        return Err(AppError::Validation(format!(
            "A quest can hold at most {} tasks",
            MAX_QUEST_TASKS
        )));
    }
    if drafts.iter().any(|d| d.title.trim().is_empty()) {
        return Err(AppError::Validation(
            "Quest task titles must not be empty".to_string(),
        ));
    }

    let (week_start, week_end) = week_boundaries(reset_day, utc_day(now));
    let quest_id = uuid::Uuid::new_v4().to_string();

    let quest = WeeklyQuest {
        quest_id: quest_id.clone(),
        user_id: user_id.to_string(),
        overwhelm_level: level,
        week_start,
        week_end,
        target_task_count: level.target_task_count(),
        completed_task_count: 0,
        xp_multiplier: QUEST_XP_MULTIPLIER,
        bonus_xp_earned: 0,
        status: QuestStatus::Active,
        created_at: now,
        updated_at: now,
        completed_at: None,
    };

    let tasks = drafts
        .into_iter()
        .map(|d| d.into_task(&quest_id, user_id))
        .collect();

    Ok((quest, tasks))
}

/// Build a task to append to an existing quest.
pub fn plan_added_task(quest: &WeeklyQuest, draft: QuestTaskDraft) -> Result<WeeklyQuestTask> {
    if quest.status.is_terminal() {
        return Err(AppError::Conflict(format!(
            "Quest {} is no longer active",
            quest.quest_id
        )));
    }
    if draft.title.trim().is_empty() {
        return Err(AppError::Validation(
            "Quest task titles must not be empty".to_string(),
        ));
    }
    Ok(draft.into_task(&quest.quest_id, &quest.user_id))
}

/// Outcome of completing one quest task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuestTaskCompletion {
    /// XP of the task itself; 0 if it was already paid on an earlier completion
    pub task_xp: u32,
    /// True only on the call that moved the quest to `completed`
    pub quest_completed: bool,
    pub bonus_xp: Option<u64>,
    pub completed_task_count: u32,
}

fn completed_count(tasks: &[WeeklyQuestTask]) -> u32 {
    tasks.iter().filter(|t| t.completed).count() as u32
}

fn completed_xp(tasks: &[WeeklyQuestTask]) -> u64 {
    tasks
        .iter()
        .filter(|t| t.completed)
        .map(|t| u64::from(t.xp))
        .sum()
}

/// Mark `quest_task_id` completed and advance the quest.
///
/// `tasks` is the quest's full live child set and is updated in place. The
/// count is recomputed from it rather than incremented. The quest moves to
/// `completed` only on the edge where the count first reaches the target.
pub fn complete_task(
    quest: &mut WeeklyQuest,
    tasks: &mut [WeeklyQuestTask],
    quest_task_id: &str,
    now: DateTime<Utc>,
) -> Result<QuestTaskCompletion> {
    if matches!(quest.status, QuestStatus::Failed | QuestStatus::Abandoned) {
        return Err(AppError::Conflict(format!(
            "Quest {} has ended",
            quest.quest_id
        )));
    }

    let task = tasks
        .iter_mut()
        .find(|t| t.quest_task_id == quest_task_id)
        .ok_or_else(|| AppError::NotFound(format!("Quest task {} not found", quest_task_id)))?;
    if task.completed {
        return Err(AppError::Conflict(format!(
            "Quest task {} is already completed",
            quest_task_id
        )));
    }
    task.completed = true;
    task.completed_at = Some(now);
    let task_xp = if task.xp_awarded { 0 } else { task.xp };
    task.xp_awarded = true;

    quest.completed_task_count = completed_count(tasks);
    quest.updated_at = now;

    let crossed = quest.status == QuestStatus::Active
        && quest.completed_task_count >= quest.target_task_count;

    let bonus = if crossed {
        let bonus = bonus_xp(completed_xp(tasks), quest.xp_multiplier);
        quest.status = QuestStatus::Completed;
        quest.bonus_xp_earned = bonus;
        quest.completed_at = Some(now);
        Some(bonus)
    } else {
        None
    };

    Ok(QuestTaskCompletion {
        task_xp,
        quest_completed: crossed,
        bonus_xp: bonus,
        completed_task_count: quest.completed_task_count,
    })
}

/// Undo a task completion. Only allowed while the quest is active.
pub fn uncomplete_task(
    quest: &mut WeeklyQuest,
    tasks: &mut [WeeklyQuestTask],
    quest_task_id: &str,
    now: DateTime<Utc>,
) -> Result<u32> {
    if quest.status.is_terminal() {
        return Err(AppError::Conflict(format!(
            "Quest {} is no longer active",
            quest.quest_id
        )));
    }

    let task = tasks
        .iter_mut()
        .find(|t| t.quest_task_id == quest_task_id)
        .ok_or_else(|| AppError::NotFound(format!("Quest task {} not found", quest_task_id)))?;
    if !task.completed {
        return Err(AppError::Conflict(format!(
            "Quest task {} is not completed",
            quest_task_id
        )));
    }
    task.completed = false;
    task.completed_at = None;

    quest.completed_task_count = completed_count(tasks);
    quest.updated_at = now;
    Ok(quest.completed_task_count)
}

/// Move an active quest to `abandoned`, forgoing the bonus.
pub fn abandon(quest: &mut WeeklyQuest, now: DateTime<Utc>) -> Result<()> {
    if quest.status.is_terminal() {
        return Err(AppError::Conflict(format!(
            "Quest {} is no longer active",
            quest.quest_id
        )));
    }
    quest.status = QuestStatus::Abandoned;
    quest.updated_at = now;
    Ok(())
}

/// Fail an active quest whose window ended before `today`.
///
/// Returns true if the quest changed. Safe to call repeatedly.
pub fn expire_if_elapsed(quest: &mut WeeklyQuest, now: DateTime<Utc>) -> bool {
    if quest.status != QuestStatus::Active || quest.week_end >= utc_day(now) {
        return false;
    }
    quest.status = QuestStatus::Failed;
    quest.updated_at = now;
    true
}
