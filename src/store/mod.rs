//! Storage abstraction for the synchronization core.
//!
//! The synchronization service depends on these traits, never on a concrete
//! backend, so the primary store, the auth context, and the external mirror
//! are all swappable — SQLite for the durable store, the in-memory store for
//! unauthenticated fallback data and tests.

use async_trait::async_trait;
use chrono::NaiveDate;
use thiserror::Error;

use crate::types::{
    CalendarEvent, EventPatch, Goal, GoalStatus, Habit, Task, TaskPatch, UserProfile,
};

pub mod memory;
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Errors reported by a primary store, distinguishing "row not found" and
/// "constraint/schema mismatch" from generic backend failure.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Row not found")]
    NotFound,

    #[error("Constraint violation: {0}")]
    Constraint(String),

    #[error("Backend error: {0}")]
    Backend(String),
}

/// Current time as an RFC 3339 string, the timestamp format stored on rows.
pub(crate) fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Supplies the current owner identity, or none when signed out.
pub trait AuthProvider: Send + Sync {
    fn current_user(&self) -> Option<String>;
}

/// Fixed auth context. Used by single-user deployments (owner id from
/// config) and by tests.
pub struct StaticAuth(Option<String>);

impl StaticAuth {
    pub fn signed_in(owner_id: impl Into<String>) -> Self {
        Self(Some(owner_id.into()))
    }

    pub fn signed_out() -> Self {
        Self(None)
    }
}

impl AuthProvider for StaticAuth {
    fn current_user(&self) -> Option<String> {
        self.0.clone()
    }
}

/// The authoritative durable store for tasks, goals, events, profiles,
/// and habits. All rows are scoped by owner identity; implementations must
/// never return or touch another owner's rows.
#[async_trait]
pub trait PrimaryStore: Send + Sync {
    // -------------------------------------------------------------------------
    // Tasks
    // -------------------------------------------------------------------------

    async fn insert_task(&self, task: &Task) -> Result<Task, StoreError>;

    async fn get_task(&self, owner: &str, id: &str) -> Result<Option<Task>, StoreError>;

    /// Apply a partial update. Fails with [`StoreError::NotFound`] when no
    /// row matches id + owner.
    async fn update_task(&self, owner: &str, id: &str, patch: &TaskPatch)
        -> Result<Task, StoreError>;

    async fn set_task_completed(
        &self,
        owner: &str,
        id: &str,
        completed: bool,
    ) -> Result<Task, StoreError>;

    /// Returns true when a row was actually removed.
    async fn delete_task(&self, owner: &str, id: &str) -> Result<bool, StoreError>;

    /// All tasks for an owner, most recently created first.
    async fn list_tasks(&self, owner: &str) -> Result<Vec<Task>, StoreError>;

    /// `(completed, total)` counts over the tasks linked to a goal.
    async fn count_goal_tasks(&self, owner: &str, goal_id: &str)
        -> Result<(u32, u32), StoreError>;

    // -------------------------------------------------------------------------
    // Goals
    // -------------------------------------------------------------------------

    async fn insert_goal(&self, goal: &Goal) -> Result<Goal, StoreError>;

    async fn get_goal(&self, owner: &str, id: &str) -> Result<Option<Goal>, StoreError>;

    async fn list_goals(&self, owner: &str) -> Result<Vec<Goal>, StoreError>;

    /// Write back the cached projection fields for a goal.
    async fn save_goal_projection(
        &self,
        owner: &str,
        id: &str,
        progress: i32,
        completed_tasks: i32,
        total_tasks: i32,
        status: GoalStatus,
    ) -> Result<(), StoreError>;

    // -------------------------------------------------------------------------
    // Calendar events
    // -------------------------------------------------------------------------

    async fn insert_event(&self, event: &CalendarEvent) -> Result<CalendarEvent, StoreError>;

    async fn get_event(&self, owner: &str, id: &str)
        -> Result<Option<CalendarEvent>, StoreError>;

    async fn update_event(
        &self,
        owner: &str,
        id: &str,
        patch: &EventPatch,
    ) -> Result<CalendarEvent, StoreError>;

    /// Record (or clear) the external-calendar id on an event after a mirror.
    async fn set_event_external_id(
        &self,
        owner: &str,
        id: &str,
        external_id: Option<&str>,
    ) -> Result<(), StoreError>;

    async fn delete_event(&self, owner: &str, id: &str) -> Result<bool, StoreError>;

    /// All events for an owner, ordered by start time ascending.
    async fn list_events(&self, owner: &str) -> Result<Vec<CalendarEvent>, StoreError>;

    /// Events whose start falls within `[start, end)` (RFC 3339 bounds).
    async fn events_in_range(
        &self,
        owner: &str,
        start: &str,
        end: &str,
    ) -> Result<Vec<CalendarEvent>, StoreError>;

    /// Up to `limit` events starting at or after `after`, soonest first.
    async fn upcoming_events(
        &self,
        owner: &str,
        after: &str,
        limit: u32,
    ) -> Result<Vec<CalendarEvent>, StoreError>;

    // -------------------------------------------------------------------------
    // Profiles
    // -------------------------------------------------------------------------

    /// Fetch the profile, creating an empty one on first access.
    async fn get_or_create_profile(&self, owner: &str) -> Result<UserProfile, StoreError>;

    async fn save_profile(&self, profile: &UserProfile) -> Result<(), StoreError>;

    // -------------------------------------------------------------------------
    // Habits
    // -------------------------------------------------------------------------

    async fn insert_habit(&self, habit: &Habit) -> Result<Habit, StoreError>;

    async fn list_habits(&self, owner: &str) -> Result<Vec<Habit>, StoreError>;

    async fn delete_habit(&self, owner: &str, id: &str) -> Result<bool, StoreError>;

    /// Insert the log row when absent, delete it when present.
    /// Returns true when the day is now logged.
    async fn toggle_habit_log(
        &self,
        owner: &str,
        habit_id: &str,
        date: NaiveDate,
    ) -> Result<bool, StoreError>;

    /// All completed dates for a habit, unordered.
    async fn habit_log_dates(
        &self,
        owner: &str,
        habit_id: &str,
    ) -> Result<Vec<NaiveDate>, StoreError>;
}
