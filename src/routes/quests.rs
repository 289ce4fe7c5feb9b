// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Weekly quest routes.

use crate::error::Result;
use crate::middleware::auth::AuthUser;
use crate::models::{OverwhelmLevel, QuestStatus, WeeklyQuest, WeeklyQuestTask};
use crate::routes::me::ensure_profile;
use crate::services::progression::{QuestTaskOutcome, QuestView};
use crate::services::quests::QuestTaskDraft;
use crate::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get, post},
    Extension, Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use validator::Validate;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/quests", get(current_quest).post(create_quest))
        .route("/api/quests/history", get(quest_history))
        .route("/api/quests/{id}/abandon", post(abandon_quest))
        .route("/api/quests/{id}/tasks", post(add_quest_task))
        .route("/api/quests/tasks/{id}/complete", post(complete_quest_task))
        .route(
            "/api/quests/tasks/{id}/uncomplete",
            post(uncomplete_quest_task),
        )
        .route("/api/quests/tasks/{id}", delete(delete_quest_task))
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct QuestTaskRequest {
    /// Existing task to bind; omitted for inline tasks
    pub task_id: Option<String>,
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    #[validate(length(max = 2000))]
    pub description: Option<String>,
    #[validate(range(min = 1, max = 1000))]
    pub xp: Option<u32>,
}

impl From<QuestTaskRequest> for QuestTaskDraft {
    fn from(req: QuestTaskRequest) -> Self {
        Self {
            task_id: req.task_id,
            title: req.title,
            description: req.description,
            xp: req.xp,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateQuestRequest {
    pub overwhelm_level: OverwhelmLevel,
    #[validate(length(min = 1, max = 50), nested)]
    pub tasks: Vec<QuestTaskRequest>,
}

#[derive(Serialize)]
pub struct CurrentQuestResponse {
    /// `None` when the user has no active quest this week
    pub quest: Option<QuestView>,
}

async fn current_quest(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<CurrentQuestResponse>> {
    let quest = state
        .progression
        .current_quest(&user.user_id, Utc::now())
        .await?;
    Ok(Json(CurrentQuestResponse { quest }))
}

async fn create_quest(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(req): Json<CreateQuestRequest>,
) -> Result<(StatusCode, Json<QuestView>)> {
    req.validate()?;

    let now = Utc::now();
    ensure_profile(&state, &user, now).await?;

    let drafts = req.tasks.into_iter().map(QuestTaskDraft::from).collect();
    let view = state
        .progression
        .create_quest(&user.user_id, req.overwhelm_level, drafts, now)
        .await?;
    Ok((StatusCode::CREATED, Json(view)))
}

/// Ended quests, newest first.
async fn quest_history(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<Vec<WeeklyQuest>>> {
    let now = Utc::now();
    state.progression.reconcile_expired(&user.user_id, now).await?;

    let quests = state
        .db
        .list_quests(&user.user_id)
        .await?
        .into_iter()
        .filter(|q| q.status != QuestStatus::Active)
        .collect();
    Ok(Json(quests))
}

async fn abandon_quest(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(quest_id): Path<String>,
) -> Result<Json<WeeklyQuest>> {
    let quest = state
        .progression
        .abandon_quest(&user.user_id, &quest_id, Utc::now())
        .await?;
    Ok(Json(quest))
}

async fn add_quest_task(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(quest_id): Path<String>,
    Json(req): Json<QuestTaskRequest>,
) -> Result<(StatusCode, Json<WeeklyQuestTask>)> {
    req.validate()?;

    let task = state
        .progression
        .add_quest_task(&user.user_id, &quest_id, req.into(), Utc::now())
        .await?;
    Ok((StatusCode::CREATED, Json(task)))
}

async fn complete_quest_task(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(quest_task_id): Path<String>,
) -> Result<Json<QuestTaskOutcome>> {
    let outcome = state
        .progression
        .complete_quest_task(&user.user_id, &quest_task_id, Utc::now())
        .await?;
    Ok(Json(outcome))
}

async fn uncomplete_quest_task(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(quest_task_id): Path<String>,
) -> Result<Json<WeeklyQuest>> {
    let quest = state
        .progression
        .uncomplete_quest_task(&user.user_id, &quest_task_id, Utc::now())
        .await?;
    Ok(Json(quest))
}

async fn delete_quest_task(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(quest_task_id): Path<String>,
) -> Result<StatusCode> {
    state
        .progression
        .delete_quest_task(&user.user_id, &quest_task_id, Utc::now())
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
