// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Task routes.
//!
//! Creation and completion go through the progression service because they
//! move points and daily counters; the rest is plain CRUD.

use crate::error::{AppError, Result};
use crate::middleware::auth::AuthUser;
use crate::models::{Task, TaskStatus};
use crate::routes::me::ensure_profile;
use crate::services::progression::{ensure_owner, NewTask, TaskCompletion};
use crate::services::rewards::{self, TaskAttributes};
use crate::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Extension, Json, Router,
};
use chrono::{Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::sync::Arc;
use validator::Validate;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/tasks", post(create_task).get(list_tasks))
        .route("/api/tasks/statistics", get(task_statistics))
        .route(
            "/api/tasks/{id}",
            get(get_task).patch(update_task).delete(delete_task),
        )
        .route("/api/tasks/{id}/start", post(start_task))
        .route("/api/tasks/{id}/complete", post(complete_task))
}

const STATISTICS_WINDOW_DAYS: i64 = 7;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateTaskRequest {
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    #[validate(length(max = 2000))]
    pub description: Option<String>,
    #[validate(length(max = 50))]
    pub category: Option<String>,
    #[serde(default)]
    #[validate(length(max = 20))]
    pub tags: Vec<String>,
    #[validate(range(min = 1, max = 5))]
    pub priority: Option<u8>,
    #[validate(range(min = 1, max = 5))]
    pub energy_required: Option<u8>,
    #[validate(range(min = 1, max = 5))]
    pub difficulty_level: Option<u8>,
    /// Minutes
    #[validate(range(min = 1, max = 1440))]
    pub estimated_duration: Option<u32>,
    pub due_date: Option<NaiveDate>,
    pub parent_task_id: Option<String>,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateTaskRequest {
    #[validate(length(min = 1, max = 200))]
    pub title: Option<String>,
    #[validate(length(max = 2000))]
    pub description: Option<String>,
    #[validate(length(max = 50))]
    pub category: Option<String>,
    #[validate(length(max = 20))]
    pub tags: Option<Vec<String>>,
    #[validate(range(min = 1, max = 5))]
    pub priority: Option<u8>,
    #[validate(range(min = 1, max = 5))]
    pub energy_required: Option<u8>,
    #[validate(range(min = 1, max = 5))]
    pub difficulty_level: Option<u8>,
    #[validate(range(min = 1, max = 1440))]
    pub estimated_duration: Option<u32>,
    pub due_date: Option<NaiveDate>,
    pub status: Option<TaskStatus>,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct CompleteTaskRequest {
    /// Minutes actually spent
    #[validate(range(min = 1))]
    pub actual_duration: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ListTasksQuery {
    status: Option<String>,
    category: Option<String>,
    priority: Option<u8>,
    #[serde(default = "default_include_subtasks")]
    include_subtasks: bool,
}

fn default_include_subtasks() -> bool {
    true
}

/// A task with its subtasks.
#[derive(Debug, Serialize)]
pub struct TaskResponse {
    #[serde(flatten)]
    pub task: Task,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub subtasks: Vec<Task>,
}

#[derive(Debug, Serialize)]
pub struct TaskStatistics {
    pub total: u32,
    pub pending: u32,
    pub in_progress: u32,
    pub completed: u32,
    /// Completed in the last 7 days as a share of tasks created in that window (0-100)
    pub weekly_completion_rate: f64,
}

/// Listing order: open work first, then higher priority, nearer due date,
/// newest.
fn listing_order(a: &Task, b: &Task) -> Ordering {
    a.status
        .rank()
        .cmp(&b.status.rank())
        .then_with(|| b.priority.cmp(&a.priority))
        .then_with(|| match (a.due_date, b.due_date) {
            (Some(x), Some(y)) => x.cmp(&y),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        })
        .then_with(|| b.created_at.cmp(&a.created_at))
}

async fn load_owned_task(state: &AppState, user_id: &str, task_id: &str) -> Result<Task> {
    let task = state
        .db
        .get_task(task_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Task {}", task_id)))?;
    ensure_owner(&task.user_id, user_id, "Task", task_id)?;
    Ok(task)
}

async fn create_task(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(req): Json<CreateTaskRequest>,
) -> Result<(StatusCode, Json<Task>)> {
    req.validate()?;
    if req.title.trim().is_empty() {
        return Err(AppError::Validation("Task title must not be empty".to_string()));
    }

    let now = Utc::now();
    ensure_profile(&state, &user, now).await?;

    let task = state
        .progression
        .create_task(
            &user.user_id,
            NewTask {
                title: req.title,
                description: req.description,
                category: req.category,
                tags: req.tags,
                priority: req.priority,
                energy_required: req.energy_required,
                difficulty_level: req.difficulty_level,
                estimated_duration: req.estimated_duration,
                due_date: req.due_date,
                parent_task_id: req.parent_task_id,
            },
            now,
        )
        .await?;

    Ok((StatusCode::CREATED, Json(task)))
}

async fn list_tasks(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Query(params): Query<ListTasksQuery>,
) -> Result<Json<Vec<TaskResponse>>> {
    let status = params
        .status
        .as_deref()
        .map(str::parse::<TaskStatus>)
        .transpose()
        .map_err(AppError::BadRequest)?;

    tracing::debug!(
        user_id = %user.user_id,
        status = ?status,
        category = ?params.category,
        priority = ?params.priority,
        "Listing tasks"
    );

    let all = state.db.list_tasks(&user.user_id, None).await?;
    let (mut top_level, subtasks): (Vec<Task>, Vec<Task>) =
        all.into_iter().partition(|t| t.parent_task_id.is_none());

    top_level.retain(|t| {
        status.map_or(true, |s| t.status == s)
            && params
                .category
                .as_deref()
                .map_or(true, |c| t.category.as_deref() == Some(c))
            && params.priority.map_or(true, |p| t.priority == p)
    });
    top_level.sort_by(listing_order);

    let tasks = top_level
        .into_iter()
        .map(|task| {
            let subtasks = if params.include_subtasks {
                let mut children: Vec<Task> = subtasks
                    .iter()
                    .filter(|s| s.parent_task_id.as_deref() == Some(task.task_id.as_str()))
                    .cloned()
                    .collect();
                children.sort_by(listing_order);
                children
            } else {
                Vec::new()
            };
            TaskResponse { task, subtasks }
        })
        .collect();

    Ok(Json(tasks))
}

async fn get_task(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(task_id): Path<String>,
) -> Result<Json<TaskResponse>> {
    let task = load_owned_task(&state, &user.user_id, &task_id).await?;
    let mut subtasks: Vec<Task> = state
        .db
        .list_tasks(&user.user_id, None)
        .await?
        .into_iter()
        .filter(|t| t.parent_task_id.as_deref() == Some(task_id.as_str()))
        .collect();
    subtasks.sort_by(listing_order);

    Ok(Json(TaskResponse { task, subtasks }))
}

/// Apply an update to a task in memory.
///
/// Reward points are recomputed when a reward attribute changes, unless the
/// task was already completed (its payout is final).
fn apply_update(task: &mut Task, req: &UpdateTaskRequest, now: chrono::DateTime<Utc>) -> Result<()> {
    if let Some(status) = req.status {
        match status {
            TaskStatus::Completed if task.status != TaskStatus::Completed => {
                return Err(AppError::BadRequest(
                    "Use the complete endpoint to complete a task".to_string(),
                ));
            }
            _ if task.status == TaskStatus::Completed && status != TaskStatus::Archived => {
                return Err(AppError::Conflict(format!(
                    "Task {} is completed",
                    task.task_id
                )));
            }
            TaskStatus::InProgress if task.started_at.is_none() => {
                task.started_at = Some(now);
            }
            _ => {}
        }
        task.status = status;
    }

    if let Some(title) = &req.title {
        let title = title.trim().to_string();
        if title.is_empty() {
            return Err(AppError::Validation("Task title must not be empty".to_string()));
        }
        task.title = title;
    }
    if req.description.is_some() {
        task.description = req.description.clone();
    }
    if req.category.is_some() {
        task.category = req.category.clone();
    }
    if let Some(tags) = &req.tags {
        task.tags = tags.clone();
    }
    if req.due_date.is_some() {
        task.due_date = req.due_date;
    }

    let before: TaskAttributes = task.attributes();
    if let Some(p) = req.priority {
        task.priority = p;
    }
    if let Some(e) = req.energy_required {
        task.energy_required = e;
    }
    if let Some(d) = req.difficulty_level {
        task.difficulty_level = d;
    }
    if req.estimated_duration.is_some() {
        task.estimated_duration = req.estimated_duration;
    }
    if task.status != TaskStatus::Completed && task.attributes() != before {
        task.reward_points = rewards::task_base_points(&task.attributes());
    }
    Ok(())
}

async fn update_task(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(task_id): Path<String>,
    Json(req): Json<UpdateTaskRequest>,
) -> Result<Json<Task>> {
    req.validate()?;

    let now = Utc::now();
    let task = state
        .progression
        .edit_task(&user.user_id, &task_id, |task| apply_update(task, &req, now))
        .await?;

    tracing::debug!(user_id = %user.user_id, task_id = %task_id, "Task updated");
    Ok(Json(task))
}

async fn start_task(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(task_id): Path<String>,
) -> Result<Json<Task>> {
    let task = state
        .progression
        .start_task(&user.user_id, &task_id, Utc::now())
        .await?;
    Ok(Json(task))
}

async fn complete_task(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(task_id): Path<String>,
    body: Option<Json<CompleteTaskRequest>>,
) -> Result<Json<TaskCompletion>> {
    let req = body.map(|Json(r)| r).unwrap_or_default();
    req.validate()?;

    let completion = state
        .progression
        .complete_task(&user.user_id, &task_id, req.actual_duration, Utc::now())
        .await?;
    Ok(Json(completion))
}

async fn delete_task(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(task_id): Path<String>,
) -> Result<StatusCode> {
    load_owned_task(&state, &user.user_id, &task_id).await?;
    let deleted = state.db.delete_task(&task_id).await?;

    tracing::info!(user_id = %user.user_id, task_id = %task_id, deleted, "Task deleted");
    Ok(StatusCode::NO_CONTENT)
}

async fn task_statistics(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<TaskStatistics>> {
    let tasks = state.db.list_tasks(&user.user_id, None).await?;
    Ok(Json(compute_statistics(&tasks, Utc::now())))
}

fn compute_statistics(tasks: &[Task], now: chrono::DateTime<Utc>) -> TaskStatistics {
    let count = |status: TaskStatus| tasks.iter().filter(|t| t.status == status).count() as u32;
    let since = now - Duration::days(STATISTICS_WINDOW_DAYS);

    let recent_total = tasks.iter().filter(|t| t.created_at >= since).count();
    let recent_completed = tasks
        .iter()
        .filter(|t| t.completed_at.is_some_and(|c| c >= since))
        .count();

    TaskStatistics {
        total: tasks.len() as u32,
        pending: count(TaskStatus::Pending),
        in_progress: count(TaskStatus::InProgress),
        completed: count(TaskStatus::Completed),
        weekly_completion_rate: if recent_total > 0 {
            recent_completed as f64 / recent_total as f64 * 100.0
        } else {
            0.0
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn task(id: &str, status: TaskStatus, priority: u8, due: Option<u32>, created_h: u32) -> Task {
        let attrs = TaskAttributes::default();
        Task {
            task_id: id.to_string(),
            user_id: "u1".to_string(),
            title: id.to_string(),
            description: None,
            category: None,
            tags: vec![],
            priority,
            energy_required: 3,
            difficulty_level: 3,
            estimated_duration: None,
            actual_duration: None,
            due_date: due.map(|d| NaiveDate::from_ymd_opt(2026, 10, d).unwrap()),
            parent_task_id: None,
            status,
            reward_points: rewards::task_base_points(&attrs),
            bonus_points: 0,
            created_at: Utc.with_ymd_and_hms(2026, 10, 1, created_h, 0, 0).unwrap(),
            started_at: None,
            completed_at: None,
        }
    }

    #[test]
    fn test_listing_order() {
        let mut tasks = vec![
            task("done", TaskStatus::Completed, 5, None, 1),
            task("low", TaskStatus::Pending, 1, None, 1),
            task("due-late", TaskStatus::Pending, 4, Some(20), 1),
            task("due-soon", TaskStatus::Pending, 4, Some(10), 1),
            task("active", TaskStatus::InProgress, 1, None, 1),
            task("no-due-new", TaskStatus::Pending, 4, None, 5),
            task("no-due-old", TaskStatus::Pending, 4, None, 2),
        ];
        tasks.sort_by(listing_order);
        let ids: Vec<&str> = tasks.iter().map(|t| t.task_id.as_str()).collect();
        assert_eq!(
            ids,
            vec!["active", "due-soon", "due-late", "no-due-new", "no-due-old", "low", "done"]
        );
    }

    #[test]
    fn test_update_recomputes_reward_for_open_tasks() {
        let mut t = task("t", TaskStatus::Pending, 2, None, 1);
        assert_eq!(t.reward_points, 18);

        apply_update(
            &mut t,
            &UpdateTaskRequest {
                difficulty_level: Some(5),
                ..Default::default()
            },
            Utc::now(),
        )
        .unwrap();
        assert_eq!(t.reward_points, 22);
    }

    #[test]
    fn test_update_keeps_reward_of_completed_tasks() {
        let mut t = task("t", TaskStatus::Completed, 2, None, 1);
        apply_update(
            &mut t,
            &UpdateTaskRequest {
                priority: Some(5),
                ..Default::default()
            },
            Utc::now(),
        )
        .unwrap();
        assert_eq!(t.priority, 5);
        assert_eq!(t.reward_points, 18);
    }

    #[test]
    fn test_update_cannot_complete_or_reopen() {
        let mut open = task("t", TaskStatus::Pending, 2, None, 1);
        let err = apply_update(
            &mut open,
            &UpdateTaskRequest {
                status: Some(TaskStatus::Completed),
                ..Default::default()
            },
            Utc::now(),
        )
        .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));

        let mut done = task("t", TaskStatus::Completed, 2, None, 1);
        let err = apply_update(
            &mut done,
            &UpdateTaskRequest {
                status: Some(TaskStatus::Pending),
                ..Default::default()
            },
            Utc::now(),
        )
        .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[test]
    fn test_statistics_weekly_rate() {
        let now = Utc.with_ymd_and_hms(2026, 10, 5, 12, 0, 0).unwrap();
        let mut done = task("a", TaskStatus::Completed, 2, None, 1);
        done.completed_at = Some(now);
        let tasks = vec![
            done,
            task("b", TaskStatus::Pending, 2, None, 1),
            task("c", TaskStatus::InProgress, 2, None, 1),
            task("d", TaskStatus::Pending, 2, None, 1),
        ];

        let stats = compute_statistics(&tasks, now);
        assert_eq!(stats.total, 4);
        assert_eq!(stats.pending, 2);
        assert_eq!(stats.in_progress, 1);
        assert_eq!(stats.completed, 1);
        assert!((stats.weekly_completion_rate - 25.0).abs() < f64::EPSILON);
    }
}
