//! Eisenhower-matrix classification for tasks.

use chrono::{Local, NaiveDate};

use crate::types::{Priority, Task};

/// Legacy records become urgent when the due date is within this many days.
const LEGACY_URGENT_WINDOW_DAYS: i64 = 3;

/// One cell of the urgency × importance matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Quadrant {
    /// Urgent and important.
    DoFirst,
    /// Important, not urgent.
    Schedule,
    /// Urgent, not important.
    Delegate,
    /// Neither urgent nor important.
    Eliminate,
}

impl Quadrant {
    pub fn from_flags(urgent: bool, important: bool) -> Self {
        match (urgent, important) {
            (true, true) => Quadrant::DoFirst,
            (false, true) => Quadrant::Schedule,
            (true, false) => Quadrant::Delegate,
            (false, false) => Quadrant::Eliminate,
        }
    }

    pub fn is_urgent(self) -> bool {
        matches!(self, Quadrant::DoFirst | Quadrant::Delegate)
    }

    pub fn is_important(self) -> bool {
        matches!(self, Quadrant::DoFirst | Quadrant::Schedule)
    }

    pub fn label(self) -> &'static str {
        match self {
            Quadrant::DoFirst => "Do First",
            Quadrant::Schedule => "Schedule",
            Quadrant::Delegate => "Delegate",
            Quadrant::Eliminate => "Eliminate",
        }
    }
}

/// Classify a task relative to an explicit reference date.
///
/// When both explicit flags are set they are authoritative, regardless of
/// priority or due date. Legacy records (flags absent) derive urgency from
/// high priority or a due date within [`LEGACY_URGENT_WINDOW_DAYS`] days
/// (overdue tasks are not urgent by this rule — they are past the window),
/// and importance from medium-or-higher priority.
pub fn classify_on(task: &Task, today: NaiveDate) -> Quadrant {
    if let (Some(urgent), Some(important)) = (task.is_urgent, task.is_important) {
        return Quadrant::from_flags(urgent, important);
    }

    let due_soon = task
        .due_date
        .map(|due| {
            let delta = (due - today).num_days();
            (0..=LEGACY_URGENT_WINDOW_DAYS).contains(&delta)
        })
        .unwrap_or(false);

    let urgent = task.priority == Priority::High || due_soon;
    let important = matches!(task.priority, Priority::Medium | Priority::High);

    Quadrant::from_flags(urgent, important)
}

/// Classify a task against the local calendar date.
pub fn classify(task: &Task) -> Quadrant {
    classify_on(task, Local::now().date_naive())
}
