//! XP, level, and goal-progress derivation.
//!
//! All functions here are pure. Completion XP and level math must stay in
//! lockstep with what profiles already persisted — changing a constant
//! changes every historical reward, so the tables below are covered by
//! exact-value tests.

use chrono::{Local, NaiveDate};

use crate::error::ValidationError;
use crate::types::{Effort, GoalStatus, Priority, Task};

/// Base XP per effort tier.
const EFFORT_BASE_XP: [(Effort, i64); 3] = [
    (Effort::Low, 50),
    (Effort::Medium, 100),
    (Effort::High, 150),
];

/// XP multiplier per priority tier (in tenths to stay integral).
const PRIORITY_MULTIPLIER_TENTHS: [(Priority, i64); 3] = [
    (Priority::Low, 10),
    (Priority::Medium, 12),
    (Priority::High, 15),
];

/// Bonus for each explicitly-set urgency/importance flag.
const FLAG_BONUS_XP: i64 = 25;

/// XP earned per focus minute.
const XP_PER_FOCUS_MINUTE: i64 = 10;

/// Scaling constant for the level curve: level = floor(sqrt(xp / 500)).
const LEVEL_XP_UNIT: f64 = 500.0;

/// Goals with progress below this fraction and under a week to the target
/// date are flagged as behind.
const BEHIND_PROGRESS_THRESHOLD: i32 = 30;
const BEHIND_WINDOW_DAYS: i64 = 7;

/// XP reward for completing a task.
///
/// `base(effort, default medium) × multiplier(priority) + 25 per set flag`,
/// floored. Total over all inputs.
pub fn task_xp(task: &Task) -> i64 {
    let effort = task.effort.unwrap_or(Effort::Medium);
    let base = EFFORT_BASE_XP
        .iter()
        .find(|(e, _)| *e == effort)
        .map(|(_, xp)| *xp)
        .unwrap_or(100);
    let multiplier_tenths = PRIORITY_MULTIPLIER_TENTHS
        .iter()
        .find(|(p, _)| *p == task.priority)
        .map(|(_, m)| *m)
        .unwrap_or(10);

    let mut bonus = 0;
    if task.is_urgent == Some(true) {
        bonus += FLAG_BONUS_XP;
    }
    if task.is_important == Some(true) {
        bonus += FLAG_BONUS_XP;
    }

    // Integer floor of base × multiplier.
    base * multiplier_tenths / 10 + bonus
}

/// XP reward for a completed focus session.
pub fn focus_xp(minutes: i64) -> Result<i64, ValidationError> {
    if minutes < 0 {
        return Err(ValidationError::new("minutes", "must be non-negative"));
    }
    Ok(minutes * XP_PER_FOCUS_MINUTE)
}

/// Level reached at a cumulative XP total.
pub fn level_from_xp(xp: i64) -> Result<i32, ValidationError> {
    if xp < 0 {
        return Err(ValidationError::new("xp", "must be non-negative"));
    }
    Ok((xp as f64 / LEVEL_XP_UNIT).sqrt().floor() as i32)
}

/// Cumulative XP required to reach the next level.
pub fn xp_for_next_level(level: i32) -> Result<i64, ValidationError> {
    if level < 0 {
        return Err(ValidationError::new("level", "must be non-negative"));
    }
    let next = (level + 1) as i64;
    Ok(next * next * 500)
}

/// Goal completion percentage, rounded to the nearest integer.
/// Zero linked tasks means zero progress, not an error.
pub fn goal_progress(completed: u32, total: u32) -> Result<i32, ValidationError> {
    if completed > total {
        return Err(ValidationError::new(
            "completed",
            format!("completed ({completed}) exceeds total ({total})"),
        ));
    }
    if total == 0 {
        return Ok(0);
    }
    Ok((100.0 * completed as f64 / total as f64).round() as i32)
}

/// Derive goal status from progress and an optional target date.
///
/// Completion always wins over deadline checks. A goal is behind when the
/// target date has passed, or when progress is under 30% with less than a
/// week remaining.
pub fn goal_status_on(
    progress: i32,
    target_date: Option<NaiveDate>,
    today: NaiveDate,
) -> GoalStatus {
    if progress >= 100 {
        return GoalStatus::Completed;
    }

    if let Some(target) = target_date {
        let days_left = (target - today).num_days();
        if days_left < 0
            || (progress < BEHIND_PROGRESS_THRESHOLD && days_left < BEHIND_WINDOW_DAYS)
        {
            return GoalStatus::Behind;
        }
    }

    GoalStatus::OnTrack
}

/// Derive goal status against the local calendar date.
pub fn goal_status(progress: i32, target_date: Option<NaiveDate>) -> GoalStatus {
    goal_status_on(progress, target_date, Local::now().date_naive())
}
