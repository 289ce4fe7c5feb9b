// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use axum::http::StatusCode;
use axum::response::IntoResponse;
use focus_quest::error::AppError;

fn status_of(err: AppError) -> StatusCode {
    err.into_response().status()
}

#[test]
fn test_status_mapping() {
    assert_eq!(status_of(AppError::Unauthorized), StatusCode::UNAUTHORIZED);
    assert_eq!(status_of(AppError::InvalidToken), StatusCode::UNAUTHORIZED);
    assert_eq!(
        status_of(AppError::NotFound("task".to_string())),
        StatusCode::NOT_FOUND
    );
    assert_eq!(
        status_of(AppError::Forbidden("task".to_string())),
        StatusCode::FORBIDDEN
    );
    assert_eq!(
        status_of(AppError::Conflict("done".to_string())),
        StatusCode::CONFLICT
    );
    assert_eq!(
        status_of(AppError::Validation("title".to_string())),
        StatusCode::BAD_REQUEST
    );
    assert_eq!(
        status_of(AppError::Contention("aborted".to_string())),
        StatusCode::CONFLICT
    );
    assert_eq!(
        status_of(AppError::Database("offline".to_string())),
        StatusCode::INTERNAL_SERVER_ERROR
    );
    assert_eq!(
        status_of(AppError::Internal(anyhow::anyhow!("boom"))),
        StatusCode::INTERNAL_SERVER_ERROR
    );
}

#[test]
fn test_only_contention_is_retryable() {
    assert!(AppError::Contention("aborted".to_string()).is_retryable());
    assert!(!AppError::Conflict("done".to_string()).is_retryable());
    assert!(!AppError::Database("offline".to_string()).is_retryable());
}
