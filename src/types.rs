//! Shared domain types: tasks, goals, profiles, calendar events, habits.
//!
//! Records carry RFC 3339 timestamp strings at the persistence boundary;
//! pure logic works on parsed `chrono` values. Partial updates use tagged
//! patch structs — `Option` for plain fields, [`Patch`] for nullable ones —
//! so "leave untouched" and "clear" are distinct, explicit states.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Task priority tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

impl Priority {
    pub fn as_str(self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "low" => Some(Priority::Low),
            "medium" => Some(Priority::Medium),
            "high" => Some(Priority::High),
            _ => None,
        }
    }
}

/// Estimated effort, used only for XP rewards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Effort {
    Low,
    Medium,
    High,
}

impl Effort {
    pub fn as_str(self) -> &'static str {
        match self {
            Effort::Low => "low",
            Effort::Medium => "medium",
            Effort::High => "high",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "low" => Some(Effort::Low),
            "medium" => Some(Effort::Medium),
            "high" => Some(Effort::High),
            _ => None,
        }
    }
}

/// A task row.
///
/// `is_urgent` / `is_important` are `None` on legacy records that predate
/// explicit Eisenhower flags; classification falls back to priority and
/// due date for those.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub title: String,
    pub priority: Priority,
    pub is_urgent: Option<bool>,
    pub is_important: Option<bool>,
    pub is_completed: bool,
    pub due_date: Option<NaiveDate>,
    pub goal_id: Option<String>,
    pub effort: Option<Effort>,
    pub owner_id: String,
    pub created_at: String,
    pub updated_at: String,
}

/// Input for creating a task. Missing fields get the service defaults
/// (medium priority, explicit `false` flags, no due date, no goal).
#[derive(Debug, Clone, Default)]
pub struct TaskDraft {
    pub title: String,
    pub priority: Option<Priority>,
    pub is_urgent: Option<bool>,
    pub is_important: Option<bool>,
    pub due_date: Option<NaiveDate>,
    pub goal_id: Option<String>,
    pub effort: Option<Effort>,
}

/// Tagged update for a nullable field: leave untouched, set, or clear.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Patch<T> {
    #[default]
    Keep,
    Set(T),
    Clear,
}

impl<T: Clone> Patch<T> {
    /// Apply this patch to a nullable target field.
    pub fn apply(&self, target: &mut Option<T>) {
        match self {
            Patch::Keep => {}
            Patch::Set(value) => *target = Some(value.clone()),
            Patch::Clear => *target = None,
        }
    }

    pub fn is_keep(&self) -> bool {
        matches!(self, Patch::Keep)
    }
}

/// Partial update for a task. `None` / `Patch::Keep` fields are untouched.
#[derive(Debug, Clone, Default)]
pub struct TaskPatch {
    pub title: Option<String>,
    pub priority: Option<Priority>,
    pub is_urgent: Option<bool>,
    pub is_important: Option<bool>,
    pub due_date: Patch<NaiveDate>,
    pub goal_id: Patch<String>,
    pub effort: Patch<Effort>,
}

impl TaskPatch {
    /// Apply the provided fields onto an existing record.
    /// Does not touch `updated_at`; the store stamps that on write.
    pub fn apply(&self, task: &mut Task) {
        if let Some(ref title) = self.title {
            task.title = title.clone();
        }
        if let Some(priority) = self.priority {
            task.priority = priority;
        }
        if let Some(urgent) = self.is_urgent {
            task.is_urgent = Some(urgent);
        }
        if let Some(important) = self.is_important {
            task.is_important = Some(important);
        }
        self.due_date.apply(&mut task.due_date);
        self.goal_id.apply(&mut task.goal_id);
        self.effort.apply(&mut task.effort);
    }
}

/// Goal status. Derived from progress and target date, never set directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GoalStatus {
    #[serde(rename = "on-track")]
    OnTrack,
    #[serde(rename = "behind")]
    Behind,
    #[serde(rename = "completed")]
    Completed,
}

impl GoalStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            GoalStatus::OnTrack => "on-track",
            GoalStatus::Behind => "behind",
            GoalStatus::Completed => "completed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "on-track" => Some(GoalStatus::OnTrack),
            "behind" => Some(GoalStatus::Behind),
            "completed" => Some(GoalStatus::Completed),
            _ => None,
        }
    }
}

/// A goal row.
///
/// `progress`, `total_tasks`, `completed_tasks`, and `status` are cached
/// projections over the linked-task set — recomputable at any time, never
/// independently authored.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Goal {
    pub id: String,
    pub title: String,
    pub category: String,
    pub status: GoalStatus,
    pub progress: i32,
    pub total_tasks: i32,
    pub completed_tasks: i32,
    pub target_date: Option<NaiveDate>,
    pub owner_id: String,
    pub created_at: String,
    pub updated_at: String,
}

/// Per-user gamification profile. Created lazily on first write,
/// never deleted. `xp` only ever increases; `level` is persisted for
/// display but recomputed from `xp` on every write.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: String,
    pub xp: i64,
    pub level: i32,
    pub focus_minutes: i64,
    pub streak: i32,
    pub tasks_completed: i64,
    pub achievements: Vec<String>,
    pub updated_at: String,
}

impl UserProfile {
    /// A fresh profile for an owner with no gamification history.
    pub fn new(owner_id: &str, now: &str) -> Self {
        Self {
            id: owner_id.to_string(),
            xp: 0,
            level: 0,
            focus_minutes: 0,
            streak: 0,
            tasks_completed: 0,
            achievements: Vec::new(),
            updated_at: now.to_string(),
        }
    }
}

/// A calendar event row.
///
/// `google_event_id` back-references the mirrored record in the external
/// calendar. It is present only after a successful mirror; absence means
/// "not mirrored", never an error.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarEvent {
    pub id: String,
    pub title: String,
    pub start_at: String,
    pub end_at: String,
    pub all_day: bool,
    pub description: Option<String>,
    pub status: Option<String>,
    pub color: Option<String>,
    pub text_color: Option<String>,
    pub owner_id: String,
    pub google_event_id: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Input for creating a calendar event.
#[derive(Debug, Clone, Default)]
pub struct EventDraft {
    pub title: String,
    pub start_at: String,
    pub end_at: String,
    pub all_day: bool,
    pub description: Option<String>,
    pub color: Option<String>,
    pub text_color: Option<String>,
}

/// Partial update for a calendar event.
#[derive(Debug, Clone, Default)]
pub struct EventPatch {
    pub title: Option<String>,
    pub start_at: Option<String>,
    pub end_at: Option<String>,
    pub all_day: Option<bool>,
    pub description: Patch<String>,
    pub status: Patch<String>,
    pub color: Patch<String>,
    pub text_color: Patch<String>,
}

impl EventPatch {
    pub fn apply(&self, event: &mut CalendarEvent) {
        if let Some(ref title) = self.title {
            event.title = title.clone();
        }
        if let Some(ref start) = self.start_at {
            event.start_at = start.clone();
        }
        if let Some(ref end) = self.end_at {
            event.end_at = end.clone();
        }
        if let Some(all_day) = self.all_day {
            event.all_day = all_day;
        }
        self.description.apply(&mut event.description);
        self.status.apply(&mut event.status);
        self.color.apply(&mut event.color);
        self.text_color.apply(&mut event.text_color);
    }
}

/// A habit row.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Habit {
    pub id: String,
    pub title: String,
    pub emoji: Option<String>,
    pub owner_id: String,
    pub created_at: String,
}

/// One completed day for a habit. Existence of the row is the completion;
/// the table is append/delete-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HabitLog {
    pub habit_id: String,
    pub date: NaiveDate,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_task() -> Task {
        Task {
            id: "task-1".to_string(),
            title: "Write report".to_string(),
            priority: Priority::Medium,
            is_urgent: Some(false),
            is_important: Some(true),
            is_completed: false,
            due_date: NaiveDate::from_ymd_opt(2026, 8, 10),
            goal_id: Some("goal-1".to_string()),
            effort: Some(Effort::High),
            owner_id: "user-1".to_string(),
            created_at: "2026-08-01T09:00:00+00:00".to_string(),
            updated_at: "2026-08-01T09:00:00+00:00".to_string(),
        }
    }

    #[test]
    fn test_patch_keep_leaves_fields_untouched() {
        let mut task = sample_task();
        let before = task.clone();
        TaskPatch::default().apply(&mut task);
        assert_eq!(task.title, before.title);
        assert_eq!(task.due_date, before.due_date);
        assert_eq!(task.goal_id, before.goal_id);
    }

    #[test]
    fn test_patch_clear_is_distinct_from_keep() {
        let mut task = sample_task();
        let patch = TaskPatch {
            due_date: Patch::Clear,
            goal_id: Patch::Clear,
            ..Default::default()
        };
        patch.apply(&mut task);
        assert!(task.due_date.is_none());
        assert!(task.goal_id.is_none());
        // Untouched fields survive
        assert_eq!(task.title, "Write report");
        assert_eq!(task.effort, Some(Effort::High));
    }

    #[test]
    fn test_patch_set_overwrites() {
        let mut task = sample_task();
        let patch = TaskPatch {
            title: Some("Ship report".to_string()),
            priority: Some(Priority::High),
            due_date: Patch::Set(NaiveDate::from_ymd_opt(2026, 8, 12).unwrap()),
            ..Default::default()
        };
        patch.apply(&mut task);
        assert_eq!(task.title, "Ship report");
        assert_eq!(task.priority, Priority::High);
        assert_eq!(task.due_date, NaiveDate::from_ymd_opt(2026, 8, 12));
    }

    #[test]
    fn test_priority_roundtrip() {
        for p in [Priority::Low, Priority::Medium, Priority::High] {
            assert_eq!(Priority::parse(p.as_str()), Some(p));
        }
        assert_eq!(Priority::parse("urgent"), None);
    }

    #[test]
    fn test_goal_status_serde_uses_kebab_case() {
        let json = serde_json::to_string(&GoalStatus::OnTrack).unwrap();
        assert_eq!(json, "\"on-track\"");
        let parsed: GoalStatus = serde_json::from_str("\"behind\"").unwrap();
        assert_eq!(parsed, GoalStatus::Behind);
    }

    #[test]
    fn test_task_serde_camel_case() {
        let task = sample_task();
        let json = serde_json::to_value(&task).unwrap();
        assert!(json.get("isUrgent").is_some());
        assert!(json.get("dueDate").is_some());
        assert!(json.get("goalId").is_some());
    }
}
