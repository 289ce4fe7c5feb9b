// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - business logic layer.
//!
//! The calculators (`rewards`, `streak`, `achievements`, `quests`, `levels`)
//! are pure; `progression` applies them to the store.

pub mod achievements;
pub mod levels;
pub mod progression;
pub mod quests;
pub mod rewards;
pub mod streak;

pub use progression::ProgressionService;
