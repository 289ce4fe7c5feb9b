// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Level table.
//!
//! The single authoritative leveling scheme: a fixed, ordered list of named
//! tiers with XP cutoffs. Levels are always derived from lifetime points and
//! never stored.

use serde::Serialize;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// One row of the level table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LevelDefinition {
    pub level: u32,
    pub name: &'static str,
    pub xp_required: u64,
    pub icon: &'static str,
}

pub const LEVELS: &[LevelDefinition] = &[
    LevelDefinition { level: 1, name: "Novice", xp_required: 0, icon: "🌱" },
    LevelDefinition { level: 2, name: "Apprentice", xp_required: 200, icon: "🌿" },
    LevelDefinition { level: 3, name: "Journeyman", xp_required: 500, icon: "🌳" },
    LevelDefinition { level: 4, name: "Expert", xp_required: 1000, icon: "⚡" },
    LevelDefinition { level: 5, name: "Master", xp_required: 2000, icon: "🔥" },
    LevelDefinition { level: 6, name: "Grandmaster", xp_required: 4000, icon: "💎" },
    LevelDefinition { level: 7, name: "Legend", xp_required: 8000, icon: "👑" },
];

/// Highest level whose threshold is at or below `total_xp`.
pub fn level_for(total_xp: u64) -> &'static LevelDefinition {
    LEVELS
        .iter()
        .rev()
        .find(|l| total_xp >= l.xp_required)
        .unwrap_or(&LEVELS[0])
}

/// Level plus progress toward the next tier, as returned by the API.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct LevelProgress {
    pub level: u32,
    pub name: String,
    pub icon: String,
    /// XP earned since reaching the current level
    #[cfg_attr(feature = "binding-generation", ts(type = "number"))]
    pub xp_into_level: u64,
    /// XP span of the current level (0 at max level)
    #[cfg_attr(feature = "binding-generation", ts(type = "number"))]
    pub xp_for_next_level: u64,
    /// 0-100
    pub progress_percent: f64,
    pub next_level_name: Option<String>,
}

/// Compute level progress for a point total.
pub fn level_progress(total_xp: u64) -> LevelProgress {
    let current = level_for(total_xp);
    let next = LEVELS.iter().find(|l| l.level == current.level + 1);
    let xp_into_level = total_xp - current.xp_required;

    let (xp_for_next_level, progress_percent) = match next {
        Some(next) => {
            let span = next.xp_required - current.xp_required;
            (span, xp_into_level as f64 / span as f64 * 100.0)
        }
        None => (0, 100.0),
    };

    LevelProgress {
        level: current.level,
        name: current.name.to_string(),
        icon: current.icon.to_string(),
        xp_into_level,
        xp_for_next_level,
        progress_percent,
        next_level_name: next.map(|n| n.name.to_string()),
    }
}
