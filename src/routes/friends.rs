// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Friend and leaderboard routes.

use crate::error::{AppError, Result};
use crate::middleware::auth::AuthUser;
use crate::models::{Friendship, FriendshipStatus, User};
use crate::routes::me::ensure_profile;
use crate::services::levels::level_for;
use crate::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Extension, Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use validator::Validate;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/friends", get(list_friends))
        .route("/api/friends/requests", post(send_request))
        .route("/api/friends/requests/{id}/accept", post(accept_request))
        .route("/api/leaderboard", get(leaderboard))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestDirection {
    Incoming,
    Outgoing,
}

#[derive(Debug, Serialize)]
pub struct FriendEntry {
    pub friendship_id: String,
    pub user_id: String,
    pub username: String,
    pub display_name: Option<String>,
    pub status: FriendshipStatus,
    pub direction: RequestDirection,
    pub total_points: u64,
    pub level: u32,
}

#[derive(Debug, Deserialize, Validate)]
pub struct FriendRequest {
    #[validate(length(min = 3, max = 30))]
    pub username: String,
}

/// Friendships of the caller, accepted first.
async fn list_friends(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<Vec<FriendEntry>>> {
    let friendships = state.db.list_friendships(&user.user_id).await?;
    let other_ids: Vec<String> = friendships
        .iter()
        .map(|f| f.other(&user.user_id).to_string())
        .collect();
    let profiles: HashMap<String, User> = state
        .db
        .get_users(&other_ids)
        .await?
        .into_iter()
        .map(|u| (u.user_id.clone(), u))
        .collect();

    let mut entries: Vec<FriendEntry> = friendships
        .iter()
        .filter_map(|f| {
            let friend = profiles.get(f.other(&user.user_id))?;
            Some(FriendEntry {
                friendship_id: f.friendship_id.clone(),
                user_id: friend.user_id.clone(),
                username: friend.username.clone(),
                display_name: friend.display_name.clone(),
                status: f.status,
                direction: if f.requester_id == user.user_id {
                    RequestDirection::Outgoing
                } else {
                    RequestDirection::Incoming
                },
                total_points: friend.total_points,
                level: level_for(friend.total_points).level,
            })
        })
        .collect();
    entries.sort_by(|a, b| {
        (a.status != FriendshipStatus::Accepted)
            .cmp(&(b.status != FriendshipStatus::Accepted))
            .then_with(|| a.username.cmp(&b.username))
    });
    Ok(Json(entries))
}

/// Send a friend request by username.
async fn send_request(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(req): Json<FriendRequest>,
) -> Result<(StatusCode, Json<Friendship>)> {
    req.validate()?;

    let now = Utc::now();
    let me = ensure_profile(&state, &user, now).await?;
    let target = state
        .db
        .find_user_by_username(req.username.trim())
        .await?
        .ok_or_else(|| AppError::NotFound(format!("User '{}'", req.username.trim())))?;
    if target.user_id == me.user_id {
        return Err(AppError::Validation(
            "Cannot send a friend request to yourself".to_string(),
        ));
    }

    let friendship = Friendship::new_request(&me.user_id, &target.user_id, now);
    if !state.db.insert_friendship(&friendship).await? {
        return Err(AppError::Conflict(format!(
            "A friendship with '{}' already exists",
            target.username
        )));
    }

    tracing::info!(
        user_id = %me.user_id,
        friend_id = %target.user_id,
        "Friend request sent"
    );
    Ok((StatusCode::CREATED, Json(friendship)))
}

/// Accept a pending request addressed to the caller.
async fn accept_request(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(friendship_id): Path<String>,
) -> Result<Json<Friendship>> {
    let mut friendship = state
        .db
        .get_friendship(&friendship_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Friend request {}", friendship_id)))?;
    if friendship.addressee_id != user.user_id {
        return Err(AppError::Forbidden(format!(
            "Friend request {} is not addressed to you",
            friendship_id
        )));
    }
    if friendship.status == FriendshipStatus::Accepted {
        return Err(AppError::Conflict(format!(
            "Friend request {} was already accepted",
            friendship_id
        )));
    }

    friendship.status = FriendshipStatus::Accepted;
    state.db.set_friendship(&friendship).await?;
    tracing::info!(
        user_id = %user.user_id,
        friend_id = %friendship.requester_id,
        "Friend request accepted"
    );

    // Both sides gained a friend
    let now = Utc::now();
    for member in [&friendship.addressee_id, &friendship.requester_id] {
        if let Err(e) = state.progression.evaluate_achievements(member, now).await {
            tracing::warn!(user_id = %member, error = %e, "Achievement evaluation failed");
        }
    }

    Ok(Json(friendship))
}

#[derive(Debug, Serialize, PartialEq)]
pub struct LeaderboardEntry {
    pub rank: u32,
    pub user_id: String,
    pub username: String,
    pub total_points: u64,
    pub level: u32,
    pub current_streak: u32,
    pub is_self: bool,
}

fn rank_users(mut users: Vec<User>, caller: &str) -> Vec<LeaderboardEntry> {
    users.sort_by(|a, b| {
        b.total_points
            .cmp(&a.total_points)
            .then_with(|| a.username.cmp(&b.username))
    });
    users
        .into_iter()
        .enumerate()
        .map(|(i, u)| LeaderboardEntry {
            rank: i as u32 + 1,
            is_self: u.user_id == caller,
            level: level_for(u.total_points).level,
            user_id: u.user_id,
            username: u.username,
            total_points: u.total_points,
            current_streak: u.current_streak,
        })
        .collect()
}

/// The caller and accepted friends ordered by total points.
async fn leaderboard(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<Vec<LeaderboardEntry>>> {
    let me = ensure_profile(&state, &user, Utc::now()).await?;
    let friend_ids: Vec<String> = state
        .db
        .list_friendships(&me.user_id)
        .await?
        .iter()
        .filter(|f| f.status == FriendshipStatus::Accepted)
        .map(|f| f.other(&me.user_id).to_string())
        .collect();

    let mut users = state.db.get_users(&friend_ids).await?;
    users.push(me);
    Ok(Json(rank_users(users, &user.user_id)))
}
