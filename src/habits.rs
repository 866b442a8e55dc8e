//! Habit streak derivation.

use std::collections::HashSet;

use chrono::{Duration, Local, NaiveDate};

/// Current streak of consecutive completed days.
///
/// Anchors on `today` when today is logged, otherwise on yesterday (an
/// incomplete today does not break a streak that is still alive), then
/// walks backward one day at a time until the first gap. Duplicate dates
/// in the input are harmless.
pub fn streak_on(completed: &[NaiveDate], today: NaiveDate) -> u32 {
    let days: HashSet<NaiveDate> = completed.iter().copied().collect();

    let mut cursor = if days.contains(&today) {
        today
    } else {
        today - Duration::days(1)
    };

    let mut streak = 0;
    while days.contains(&cursor) {
        streak += 1;
        cursor = cursor - Duration::days(1);
    }
    streak
}

/// Current streak against the local calendar date.
pub fn streak(completed: &[NaiveDate]) -> u32 {
    streak_on(completed, Local::now().date_naive())
}
