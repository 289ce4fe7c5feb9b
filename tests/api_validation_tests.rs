// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! API input validation tests.
//!
//! The test app runs against an offline store, so any request that reaches
//! the database fails with 500. A 400 proves validation ran first.

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
};
use serde_json::{json, Value};
use tower::ServiceExt;

mod common;

async fn send(method: Method, uri: &str, body: Option<Value>) -> StatusCode {
    let (app, state) = common::create_test_app();
    let token = common::create_test_jwt("user-1", &state.config.jwt_signing_key);

    let mut request = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", token));
    let body = match body {
        Some(value) => {
            request = request.header(header::CONTENT_TYPE, "application/json");
            Body::from(value.to_string())
        }
        None => Body::empty(),
    };

    app.oneshot(request.body(body).unwrap())
        .await
        .unwrap()
        .status()
}

#[tokio::test]
async fn test_task_title_required() {
    let status = send(Method::POST, "/api/tasks", Some(json!({ "title": "" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let status = send(Method::POST, "/api/tasks", Some(json!({ "title": "   " }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_task_attribute_ranges() {
    for body in [
        json!({ "title": "Taxes", "difficulty_level": 6 }),
        json!({ "title": "Taxes", "priority": 0 }),
        json!({ "title": "Taxes", "estimated_duration": 0 }),
    ] {
        let status = send(Method::POST, "/api/tasks", Some(body.clone())).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{}", body);
    }
}

#[tokio::test]
async fn test_focus_session_bounds() {
    let status = send(
        Method::POST,
        "/api/focus/sessions",
        Some(json!({ "planned_duration": 0 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let status = send(
        Method::POST,
        "/api/focus/sessions/s1/end",
        Some(json!({ "actual_duration": 25, "focus_quality": 9 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_quest_task_count_bounds() {
    let status = send(
        Method::POST,
        "/api/quests",
        Some(json!({ "overwhelm_level": "light", "tasks": [] })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let tasks: Vec<Value> = (0..51).map(|i| json!({ "title": format!("t{}", i) })).collect();
    let status = send(
        Method::POST,
        "/api/quests",
        Some(json!({ "overwhelm_level": "full", "tasks": tasks })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_settings_reset_day_range() {
    let status = send(
        Method::PUT,
        "/api/me/settings",
        Some(json!({ "quest_reset_day": 7 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_username_rules() {
    let status = send(Method::PUT, "/api/me", Some(json!({ "username": "has space" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let status = send(
        Method::POST,
        "/api/friends/requests",
        Some(json!({ "username": "ab" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_reward_history_paging_params() {
    let status = send(Method::GET, "/api/rewards/history?limit=0", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let status = send(Method::GET, "/api/rewards/history?cursor=bm90LWEtY3Vyc29y", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
