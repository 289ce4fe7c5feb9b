// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Focus Quest: task, focus and reward backend for ADHD-friendly productivity
//!
//! This crate provides the backend API: tasks and focus sessions earn
//! points, daily streaks and achievements reward consistency, and weekly
//! quests bundle a chosen amount of work into a bonus-paying commitment.

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod time_utils;

use config::Config;
use db::FirestoreDb;
use services::ProgressionService;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub db: FirestoreDb,
    pub progression: ProgressionService,
}

impl AppState {
    pub fn new(config: Config, db: FirestoreDb) -> Self {
        Self {
            progression: ProgressionService::new(db.clone()),
            config,
            db,
        }
    }
}
