//! Task/event synchronization service.
//!
//! Keeps an in-memory ordered view of tasks and events consistent with the
//! primary store, and mirrors calendar events to an external calendar on a
//! best-effort basis. The discipline for every mutation:
//!
//! 1. require an authenticated owner,
//! 2. write the primary store (source of truth),
//! 3. reflect the store's returned record into the local view,
//! 4. events only: attempt the external mirror; failures are warnings.
//!
//! The local view is only ever updated from a successful store response, so
//! it can never run ahead of durable state. A mirror failure never rolls
//! back or fails the primary mutation.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate};
use parking_lot::RwLock;
use uuid::Uuid;

use crate::error::{SyncError, ValidationError};
use crate::mirror::{CalendarMirror, MirrorError};
use crate::progress;
use crate::store::{now_rfc3339, AuthProvider, PrimaryStore, StoreError};
use crate::types::{
    CalendarEvent, EventDraft, EventPatch, Habit, Task, TaskDraft, TaskPatch, UserProfile,
};

/// Lifecycle of a record in the local view.
///
/// `Pending → Persisted → Mirrored` (events only) `→ Gone`. Because the
/// store is written before the view, records enter the view already
/// `Persisted`; no record ever re-enters `Pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordState {
    Pending,
    Persisted,
    Mirrored,
    Gone,
}

/// Hook invoked after a task transitions to completed at the primary store.
///
/// The service only reports the event; what completion *means* (XP, goal
/// progress) is the observer's decision. Observers must not fail the
/// triggering operation — they log their own errors.
#[async_trait]
pub trait CompletionObserver: Send + Sync {
    async fn on_task_completed(&self, task: &Task);
}

fn store_err(id: &str, err: StoreError) -> SyncError {
    match err {
        StoreError::NotFound => SyncError::NotFound(id.to_string()),
        other => SyncError::Persistence(other.to_string()),
    }
}

fn persistence(err: StoreError) -> SyncError {
    SyncError::Persistence(err.to_string())
}

fn validate_title(title: &str) -> Result<String, ValidationError> {
    let trimmed = title.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::new("title", "must not be empty"));
    }
    Ok(trimmed.to_string())
}

fn validate_rfc3339(field: &'static str, value: &str) -> Result<(), ValidationError> {
    DateTime::parse_from_rfc3339(value)
        .map(|_| ())
        .map_err(|_| ValidationError::new(field, "not a valid RFC 3339 timestamp"))
}

/// RFC 3339 bounds of a local calendar day: `[midnight, next midnight)`.
///
/// Uses the local UTC offset rather than `Z` — at 8pm EST on a Sunday, UTC
/// midnight is already Monday, and day queries would target the wrong day.
pub(crate) fn local_day_bounds(date: NaiveDate) -> (String, String) {
    use chrono::Offset;

    let offset = chrono::Local::now().offset().fix();
    let offset_secs = offset.local_minus_utc();
    let offset_str = format!(
        "{:+03}:{:02}",
        offset_secs / 3600,
        (offset_secs.unsigned_abs() % 3600) / 60
    );
    (
        format!("{}T00:00:00{}", date, offset_str),
        format!("{}T00:00:00{}", date + chrono::Duration::days(1), offset_str),
    )
}

struct EventEntry {
    event: CalendarEvent,
    state: RecordState,
}

/// The synchronization service. All collaborators are explicit — no
/// module-level singletons — so every seam takes a test double.
pub struct SyncService {
    store: Arc<dyn PrimaryStore>,
    auth: Arc<dyn AuthProvider>,
    mirror: Arc<dyn CalendarMirror>,
    observer: Option<Arc<dyn CompletionObserver>>,
    tasks: RwLock<Vec<Task>>,
    events: RwLock<Vec<EventEntry>>,
}

impl SyncService {
    pub fn new(
        store: Arc<dyn PrimaryStore>,
        auth: Arc<dyn AuthProvider>,
        mirror: Arc<dyn CalendarMirror>,
    ) -> Self {
        Self {
            store,
            auth,
            mirror,
            observer: None,
            tasks: RwLock::new(Vec::new()),
            events: RwLock::new(Vec::new()),
        }
    }

    /// Attach a completion observer (e.g. [`GamificationObserver`]).
    pub fn with_observer(mut self, observer: Arc<dyn CompletionObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    fn require_owner(&self) -> Result<String, SyncError> {
        self.auth.current_user().ok_or(SyncError::Unauthenticated)
    }

    /// Populate the local view from the primary store.
    pub async fn refresh(&self) -> Result<(), SyncError> {
        let owner = self.require_owner()?;

        let tasks = self.store.list_tasks(&owner).await.map_err(persistence)?;
        let events = self.store.list_events(&owner).await.map_err(persistence)?;

        *self.tasks.write() = tasks;
        *self.events.write() = events
            .into_iter()
            .map(|event| {
                let state = if event.google_event_id.is_some() {
                    RecordState::Mirrored
                } else {
                    RecordState::Persisted
                };
                EventEntry { event, state }
            })
            .collect();
        Ok(())
    }

    /// Snapshot of the local task view, most recently created first.
    pub fn tasks(&self) -> Vec<Task> {
        self.tasks.read().clone()
    }

    /// Snapshot of the local event view.
    pub fn events(&self) -> Vec<CalendarEvent> {
        self.events.read().iter().map(|e| e.event.clone()).collect()
    }

    /// Lifecycle state of an event in the local view.
    pub fn event_state(&self, id: &str) -> Option<RecordState> {
        self.events
            .read()
            .iter()
            .find(|e| e.event.id == id)
            .map(|e| e.state)
    }

    // -------------------------------------------------------------------------
    // Tasks
    // -------------------------------------------------------------------------

    pub async fn create_task(&self, draft: TaskDraft) -> Result<Task, SyncError> {
        let owner = self.require_owner()?;
        let title = validate_title(&draft.title)?;

        let now = now_rfc3339();
        let task = Task {
            id: Uuid::new_v4().to_string(),
            title,
            priority: draft.priority.unwrap_or_default(),
            is_urgent: Some(draft.is_urgent.unwrap_or(false)),
            is_important: Some(draft.is_important.unwrap_or(false)),
            is_completed: false,
            due_date: draft.due_date,
            goal_id: draft.goal_id,
            effort: draft.effort,
            owner_id: owner,
            created_at: now.clone(),
            updated_at: now,
        };

        // Primary store first; the view is untouched on failure.
        let stored = self.store.insert_task(&task).await.map_err(persistence)?;
        self.tasks.write().insert(0, stored.clone());
        Ok(stored)
    }

    pub async fn update_task(&self, id: &str, patch: TaskPatch) -> Result<Task, SyncError> {
        let owner = self.require_owner()?;
        if let Some(ref title) = patch.title {
            validate_title(title)?;
        }

        let stored = self
            .store
            .update_task(&owner, id, &patch)
            .await
            .map_err(|e| store_err(id, e))?;
        self.replace_task_in_view(&stored);
        Ok(stored)
    }

    /// Set a task's completion flag. When the store acknowledges a
    /// false→true transition, the configured observer is notified — after
    /// the primary write, never before.
    pub async fn toggle_task(&self, id: &str, completed: bool) -> Result<Task, SyncError> {
        let owner = self.require_owner()?;

        let previous = self
            .store
            .get_task(&owner, id)
            .await
            .map_err(persistence)?
            .ok_or_else(|| SyncError::NotFound(id.to_string()))?;

        let stored = self
            .store
            .set_task_completed(&owner, id, completed)
            .await
            .map_err(|e| store_err(id, e))?;
        self.replace_task_in_view(&stored);

        if !previous.is_completed && stored.is_completed {
            if let Some(observer) = &self.observer {
                observer.on_task_completed(&stored).await;
            }
        }

        Ok(stored)
    }

    /// Delete a task. Idempotent: deleting an id that is already gone is a
    /// success, which keeps optimistic UI simple.
    pub async fn delete_task(&self, id: &str) -> Result<(), SyncError> {
        let owner = self.require_owner()?;
        self.store
            .delete_task(&owner, id)
            .await
            .map_err(persistence)?;
        self.tasks.write().retain(|t| t.id != id);
        Ok(())
    }

    fn replace_task_in_view(&self, stored: &Task) {
        let mut tasks = self.tasks.write();
        match tasks.iter_mut().find(|t| t.id == stored.id) {
            Some(slot) => *slot = stored.clone(),
            None => tasks.insert(0, stored.clone()),
        }
    }

    // -------------------------------------------------------------------------
    // Calendar events
    // -------------------------------------------------------------------------

    pub async fn create_event(&self, draft: EventDraft) -> Result<CalendarEvent, SyncError> {
        let owner = self.require_owner()?;
        let title = validate_title(&draft.title)?;
        validate_rfc3339("start", &draft.start_at)?;
        validate_rfc3339("end", &draft.end_at)?;

        let now = now_rfc3339();
        let event = CalendarEvent {
            id: Uuid::new_v4().to_string(),
            title,
            start_at: draft.start_at,
            end_at: draft.end_at,
            all_day: draft.all_day,
            description: draft.description,
            status: Some("confirmed".to_string()),
            color: draft.color,
            text_color: draft.text_color,
            owner_id: owner.clone(),
            google_event_id: None,
            created_at: now.clone(),
            updated_at: now,
        };

        let mut stored = self.store.insert_event(&event).await.map_err(persistence)?;
        let mut state = RecordState::Persisted;

        // Best-effort mirror. The primary write already succeeded; nothing
        // past this point can fail the operation.
        match self.mirror.create_event(&stored).await {
            Ok(external_id) => {
                match self
                    .store
                    .set_event_external_id(&owner, &stored.id, Some(&external_id))
                    .await
                {
                    Ok(()) => {
                        stored.google_event_id = Some(external_id);
                        state = RecordState::Mirrored;
                    }
                    Err(e) => {
                        log::warn!(
                            "event {} mirrored but external id not persisted: {}",
                            stored.id,
                            e
                        );
                    }
                }
            }
            Err(MirrorError::NotConnected) => {
                log::info!("external calendar not connected; event {} stays local", stored.id);
            }
            Err(e) => {
                log::warn!("calendar mirror create failed for event {}: {}", stored.id, e);
            }
        }

        self.events.write().insert(
            0,
            EventEntry {
                event: stored.clone(),
                state,
            },
        );
        Ok(stored)
    }

    pub async fn update_event(
        &self,
        id: &str,
        patch: EventPatch,
    ) -> Result<CalendarEvent, SyncError> {
        let owner = self.require_owner()?;
        if let Some(ref title) = patch.title {
            validate_title(title)?;
        }
        if let Some(ref start) = patch.start_at {
            validate_rfc3339("start", start)?;
        }
        if let Some(ref end) = patch.end_at {
            validate_rfc3339("end", end)?;
        }

        let stored = self
            .store
            .update_event(&owner, id, &patch)
            .await
            .map_err(|e| store_err(id, e))?;

        let mut state = if stored.google_event_id.is_some() {
            RecordState::Mirrored
        } else {
            RecordState::Persisted
        };

        if let Some(external_id) = stored.google_event_id.as_deref() {
            match self.mirror.update_event(external_id, &stored).await {
                Ok(()) => {}
                Err(MirrorError::NotConnected) => {
                    log::info!("external calendar not connected; event {} update stays local", id);
                    state = RecordState::Persisted;
                }
                Err(e) => {
                    log::warn!("calendar mirror update failed for event {}: {}", id, e);
                }
            }
        }

        self.replace_event_in_view(&stored, state);
        Ok(stored)
    }

    /// Delete an event, mirroring the delete when the record was mirrored.
    /// Idempotent like task deletion.
    pub async fn delete_event(&self, id: &str) -> Result<(), SyncError> {
        let owner = self.require_owner()?;

        // Look up the external id before the row disappears.
        let external_id = self
            .store
            .get_event(&owner, id)
            .await
            .map_err(persistence)?
            .and_then(|e| e.google_event_id);

        self.store
            .delete_event(&owner, id)
            .await
            .map_err(persistence)?;
        self.events.write().retain(|e| e.event.id != id);

        if let Some(external_id) = external_id {
            match self.mirror.delete_event(&external_id).await {
                Ok(()) | Err(MirrorError::NotConnected) => {}
                Err(e) => {
                    log::warn!("calendar mirror delete failed for event {}: {}", id, e);
                }
            }
        }

        Ok(())
    }

    /// Events whose start falls within the given local calendar day.
    pub async fn events_on(&self, date: NaiveDate) -> Result<Vec<CalendarEvent>, SyncError> {
        let owner = self.require_owner()?;
        let (start, end) = local_day_bounds(date);
        self.store
            .events_in_range(&owner, &start, &end)
            .await
            .map_err(persistence)
    }

    /// Up to `limit` events starting at or after now, soonest first.
    pub async fn upcoming_events(&self, limit: u32) -> Result<Vec<CalendarEvent>, SyncError> {
        let owner = self.require_owner()?;
        let now = chrono::Utc::now().to_rfc3339();
        self.store
            .upcoming_events(&owner, &now, limit)
            .await
            .map_err(persistence)
    }

    fn replace_event_in_view(&self, stored: &CalendarEvent, state: RecordState) {
        let mut events = self.events.write();
        match events.iter_mut().find(|e| e.event.id == stored.id) {
            Some(slot) => {
                slot.event = stored.clone();
                slot.state = state;
            }
            None => events.insert(
                0,
                EventEntry {
                    event: stored.clone(),
                    state,
                },
            ),
        }
    }

    // -------------------------------------------------------------------------
    // Focus sessions & habits
    // -------------------------------------------------------------------------

    /// Record a completed focus session, applying focus XP to the profile.
    pub async fn add_focus_session(&self, minutes: i64) -> Result<UserProfile, SyncError> {
        let owner = self.require_owner()?;
        let earned = progress::focus_xp(minutes)?;

        let mut profile = self
            .store
            .get_or_create_profile(&owner)
            .await
            .map_err(persistence)?;
        profile.xp += earned;
        profile.focus_minutes += minutes;
        profile.level = progress::level_from_xp(profile.xp)?;
        self.store
            .save_profile(&profile)
            .await
            .map_err(persistence)?;
        Ok(profile)
    }

    pub async fn create_habit(
        &self,
        title: &str,
        emoji: Option<String>,
    ) -> Result<Habit, SyncError> {
        let owner = self.require_owner()?;
        let title = validate_title(title)?;
        let habit = Habit {
            id: Uuid::new_v4().to_string(),
            title,
            emoji,
            owner_id: owner,
            created_at: now_rfc3339(),
        };
        self.store.insert_habit(&habit).await.map_err(persistence)
    }

    /// Toggle a habit's completion for a day. Returns true when the day is
    /// now logged.
    pub async fn toggle_habit_log(
        &self,
        habit_id: &str,
        date: NaiveDate,
    ) -> Result<bool, SyncError> {
        let owner = self.require_owner()?;
        self.store
            .toggle_habit_log(&owner, habit_id, date)
            .await
            .map_err(persistence)
    }

    /// Current streak for a habit, derived from its logged dates.
    pub async fn habit_streak_on(
        &self,
        habit_id: &str,
        today: NaiveDate,
    ) -> Result<u32, SyncError> {
        let owner = self.require_owner()?;
        let dates = self
            .store
            .habit_log_dates(&owner, habit_id)
            .await
            .map_err(persistence)?;
        Ok(crate::habits::streak_on(&dates, today))
    }
}

// =============================================================================
// Gamification observer
// =============================================================================

/// The stock reaction to task completion: award task XP to the profile and
/// refresh the linked goal's cached projection. Failures are logged, never
/// propagated into the toggle that triggered them.
pub struct GamificationObserver {
    store: Arc<dyn PrimaryStore>,
}

impl GamificationObserver {
    pub fn new(store: Arc<dyn PrimaryStore>) -> Self {
        Self { store }
    }

    async fn apply(&self, task: &Task) -> Result<(), SyncError> {
        let mut profile = self
            .store
            .get_or_create_profile(&task.owner_id)
            .await
            .map_err(persistence)?;
        profile.xp += progress::task_xp(task);
        profile.tasks_completed += 1;
        profile.level = progress::level_from_xp(profile.xp)?;
        self.store
            .save_profile(&profile)
            .await
            .map_err(persistence)?;

        if let Some(goal_id) = task.goal_id.as_deref() {
            self.recompute_goal(&task.owner_id, goal_id).await?;
        }
        Ok(())
    }

    /// Recompute a goal's cached projection from its current linked-task set.
    pub async fn recompute_goal(&self, owner: &str, goal_id: &str) -> Result<(), SyncError> {
        let Some(goal) = self
            .store
            .get_goal(owner, goal_id)
            .await
            .map_err(persistence)?
        else {
            log::warn!("task links to missing goal {}", goal_id);
            return Ok(());
        };

        let (completed, total) = self
            .store
            .count_goal_tasks(owner, goal_id)
            .await
            .map_err(persistence)?;
        let pct = progress::goal_progress(completed, total)?;
        let status = progress::goal_status(pct, goal.target_date);
        self.store
            .save_goal_projection(owner, goal_id, pct, completed as i32, total as i32, status)
            .await
            .map_err(persistence)
    }
}

#[async_trait]
impl CompletionObserver for GamificationObserver {
    async fn on_task_completed(&self, task: &Task) {
        if let Err(e) = self.apply(task).await {
            log::warn!("gamification update failed for task {}: {}", task.id, e);
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, StaticAuth};
    use crate::types::{Goal, GoalStatus, Patch, Priority};
    use std::sync::atomic::{AtomicBool, Ordering};

    /// Mirror double that acknowledges every call with a fixed external id.
    struct FixedMirror;

    #[async_trait]
    impl CalendarMirror for FixedMirror {
        async fn create_event(&self, _event: &CalendarEvent) -> Result<String, MirrorError> {
            Ok("gcal-fixed".to_string())
        }
        async fn update_event(
            &self,
            _external_id: &str,
            _event: &CalendarEvent,
        ) -> Result<(), MirrorError> {
            Ok(())
        }
        async fn delete_event(&self, _external_id: &str) -> Result<(), MirrorError> {
            Ok(())
        }
    }

    /// Mirror double that fails every call with an API error.
    struct BrokenMirror;

    #[async_trait]
    impl CalendarMirror for BrokenMirror {
        async fn create_event(&self, _event: &CalendarEvent) -> Result<String, MirrorError> {
            Err(MirrorError::Api {
                status: 503,
                message: "backend unavailable".to_string(),
            })
        }
        async fn update_event(
            &self,
            _external_id: &str,
            _event: &CalendarEvent,
        ) -> Result<(), MirrorError> {
            Err(MirrorError::Api {
                status: 503,
                message: "backend unavailable".to_string(),
            })
        }
        async fn delete_event(&self, _external_id: &str) -> Result<(), MirrorError> {
            Err(MirrorError::Api {
                status: 503,
                message: "backend unavailable".to_string(),
            })
        }
    }

    /// Store wrapper that can be switched to reject writes.
    struct FaultyStore {
        inner: MemoryStore,
        fail_writes: AtomicBool,
    }

    impl FaultyStore {
        fn new() -> Self {
            Self {
                inner: MemoryStore::new(),
                fail_writes: AtomicBool::new(false),
            }
        }

        fn fail_writes(&self, fail: bool) {
            self.fail_writes.store(fail, Ordering::SeqCst);
        }

        fn check(&self) -> Result<(), StoreError> {
            if self.fail_writes.load(Ordering::SeqCst) {
                Err(StoreError::Backend("injected write failure".to_string()))
            } else {
                Ok(())
            }
        }
    }

    #[async_trait]
    impl PrimaryStore for FaultyStore {
        async fn insert_task(&self, task: &Task) -> Result<Task, StoreError> {
            self.check()?;
            self.inner.insert_task(task).await
        }
        async fn get_task(&self, owner: &str, id: &str) -> Result<Option<Task>, StoreError> {
            self.inner.get_task(owner, id).await
        }
        async fn update_task(
            &self,
            owner: &str,
            id: &str,
            patch: &TaskPatch,
        ) -> Result<Task, StoreError> {
            self.check()?;
            self.inner.update_task(owner, id, patch).await
        }
        async fn set_task_completed(
            &self,
            owner: &str,
            id: &str,
            completed: bool,
        ) -> Result<Task, StoreError> {
            self.check()?;
            self.inner.set_task_completed(owner, id, completed).await
        }
        async fn delete_task(&self, owner: &str, id: &str) -> Result<bool, StoreError> {
            self.check()?;
            self.inner.delete_task(owner, id).await
        }
        async fn list_tasks(&self, owner: &str) -> Result<Vec<Task>, StoreError> {
            self.inner.list_tasks(owner).await
        }
        async fn count_goal_tasks(
            &self,
            owner: &str,
            goal_id: &str,
        ) -> Result<(u32, u32), StoreError> {
            self.inner.count_goal_tasks(owner, goal_id).await
        }
        async fn insert_goal(&self, goal: &Goal) -> Result<Goal, StoreError> {
            self.inner.insert_goal(goal).await
        }
        async fn get_goal(&self, owner: &str, id: &str) -> Result<Option<Goal>, StoreError> {
            self.inner.get_goal(owner, id).await
        }
        async fn list_goals(&self, owner: &str) -> Result<Vec<Goal>, StoreError> {
            self.inner.list_goals(owner).await
        }
        async fn save_goal_projection(
            &self,
            owner: &str,
            id: &str,
            progress: i32,
            completed_tasks: i32,
            total_tasks: i32,
            status: GoalStatus,
        ) -> Result<(), StoreError> {
            self.inner
                .save_goal_projection(owner, id, progress, completed_tasks, total_tasks, status)
                .await
        }
        async fn insert_event(&self, event: &CalendarEvent) -> Result<CalendarEvent, StoreError> {
            self.check()?;
            self.inner.insert_event(event).await
        }
        async fn get_event(
            &self,
            owner: &str,
            id: &str,
        ) -> Result<Option<CalendarEvent>, StoreError> {
            self.inner.get_event(owner, id).await
        }
        async fn update_event(
            &self,
            owner: &str,
            id: &str,
            patch: &EventPatch,
        ) -> Result<CalendarEvent, StoreError> {
            self.check()?;
            self.inner.update_event(owner, id, patch).await
        }
        async fn set_event_external_id(
            &self,
            owner: &str,
            id: &str,
            external_id: Option<&str>,
        ) -> Result<(), StoreError> {
            self.inner.set_event_external_id(owner, id, external_id).await
        }
        async fn delete_event(&self, owner: &str, id: &str) -> Result<bool, StoreError> {
            self.check()?;
            self.inner.delete_event(owner, id).await
        }
        async fn list_events(&self, owner: &str) -> Result<Vec<CalendarEvent>, StoreError> {
            self.inner.list_events(owner).await
        }
        async fn events_in_range(
            &self,
            owner: &str,
            start: &str,
            end: &str,
        ) -> Result<Vec<CalendarEvent>, StoreError> {
            self.inner.events_in_range(owner, start, end).await
        }
        async fn upcoming_events(
            &self,
            owner: &str,
            after: &str,
            limit: u32,
        ) -> Result<Vec<CalendarEvent>, StoreError> {
            self.inner.upcoming_events(owner, after, limit).await
        }
        async fn get_or_create_profile(&self, owner: &str) -> Result<UserProfile, StoreError> {
            self.inner.get_or_create_profile(owner).await
        }
        async fn save_profile(&self, profile: &UserProfile) -> Result<(), StoreError> {
            self.inner.save_profile(profile).await
        }
        async fn insert_habit(&self, habit: &Habit) -> Result<Habit, StoreError> {
            self.inner.insert_habit(habit).await
        }
        async fn list_habits(&self, owner: &str) -> Result<Vec<Habit>, StoreError> {
            self.inner.list_habits(owner).await
        }
        async fn delete_habit(&self, owner: &str, id: &str) -> Result<bool, StoreError> {
            self.inner.delete_habit(owner, id).await
        }
        async fn toggle_habit_log(
            &self,
            owner: &str,
            habit_id: &str,
            date: NaiveDate,
        ) -> Result<bool, StoreError> {
            self.inner.toggle_habit_log(owner, habit_id, date).await
        }
        async fn habit_log_dates(
            &self,
            owner: &str,
            habit_id: &str,
        ) -> Result<Vec<NaiveDate>, StoreError> {
            self.inner.habit_log_dates(owner, habit_id).await
        }
    }

    fn service_with(
        store: Arc<dyn PrimaryStore>,
        mirror: Arc<dyn CalendarMirror>,
    ) -> SyncService {
        let _ = env_logger::builder().is_test(true).try_init();
        SyncService::new(store, Arc::new(StaticAuth::signed_in("alice")), mirror)
    }

    fn event_draft(title: &str) -> EventDraft {
        EventDraft {
            title: title.to_string(),
            start_at: "2026-08-10T09:00:00+00:00".to_string(),
            end_at: "2026-08-10T10:00:00+00:00".to_string(),
            all_day: false,
            description: None,
            color: None,
            text_color: None,
        }
    }

    #[tokio::test]
    async fn test_unauthenticated_is_a_hard_failure() {
        let service = SyncService::new(
            Arc::new(MemoryStore::new()),
            Arc::new(StaticAuth::signed_out()),
            Arc::new(crate::mirror::NullMirror),
        );

        let err = service
            .create_task(TaskDraft {
                title: "anything".to_string(),
                ..Default::default()
            })
            .await
            .expect_err("signed out");
        assert!(matches!(err, SyncError::Unauthenticated));

        let err = service.delete_task("t1").await.expect_err("signed out");
        assert!(matches!(err, SyncError::Unauthenticated));
    }

    #[tokio::test]
    async fn test_create_task_applies_defaults_and_prepends() {
        let store = Arc::new(MemoryStore::new());
        let service = service_with(store.clone(), Arc::new(crate::mirror::NullMirror));

        let first = service
            .create_task(TaskDraft {
                title: "  First  ".to_string(),
                ..Default::default()
            })
            .await
            .expect("create");
        assert_eq!(first.title, "First");
        assert_eq!(first.priority, Priority::Medium);
        assert_eq!(first.is_urgent, Some(false));
        assert_eq!(first.is_important, Some(false));
        assert!(first.due_date.is_none());
        assert!(first.goal_id.is_none());
        assert!(!first.is_completed);

        let second = service
            .create_task(TaskDraft {
                title: "Second".to_string(),
                ..Default::default()
            })
            .await
            .expect("create");

        // Most-recent-first insertion order.
        let view = service.tasks();
        assert_eq!(view[0].id, second.id);
        assert_eq!(view[1].id, first.id);
    }

    #[tokio::test]
    async fn test_create_task_rejects_blank_title() {
        let service = service_with(
            Arc::new(MemoryStore::new()),
            Arc::new(crate::mirror::NullMirror),
        );
        let err = service
            .create_task(TaskDraft {
                title: "   ".to_string(),
                ..Default::default()
            })
            .await
            .expect_err("blank title");
        assert!(matches!(err, SyncError::Validation(_)));
    }

    #[tokio::test]
    async fn test_store_failure_leaves_view_untouched() {
        let store = Arc::new(FaultyStore::new());
        let service = service_with(store.clone(), Arc::new(crate::mirror::NullMirror));

        store.fail_writes(true);
        let err = service
            .create_task(TaskDraft {
                title: "Doomed".to_string(),
                ..Default::default()
            })
            .await
            .expect_err("store down");
        assert!(matches!(err, SyncError::Persistence(_)));
        assert!(err.to_string().contains("injected write failure"));
        assert!(service.tasks().is_empty(), "no local mutation on failure");
    }

    #[tokio::test]
    async fn test_update_task_patches_and_reconciles_view() {
        let service = service_with(
            Arc::new(MemoryStore::new()),
            Arc::new(crate::mirror::NullMirror),
        );
        let task = service
            .create_task(TaskDraft {
                title: "Original".to_string(),
                due_date: NaiveDate::from_ymd_opt(2026, 8, 20),
                ..Default::default()
            })
            .await
            .expect("create");

        let updated = service
            .update_task(
                &task.id,
                TaskPatch {
                    title: Some("Renamed".to_string()),
                    due_date: Patch::Clear,
                    ..Default::default()
                },
            )
            .await
            .expect("update");
        assert_eq!(updated.title, "Renamed");
        assert!(updated.due_date.is_none());

        // Read-your-writes: the view holds the store's returned record.
        let view = service.tasks();
        assert_eq!(view[0].title, "Renamed");
        assert!(view[0].due_date.is_none());
    }

    #[tokio::test]
    async fn test_update_missing_task_is_not_found() {
        let service = service_with(
            Arc::new(MemoryStore::new()),
            Arc::new(crate::mirror::NullMirror),
        );
        let err = service
            .update_task("ghost", TaskPatch::default())
            .await
            .expect_err("missing");
        assert!(matches!(err, SyncError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_delete_task_is_idempotent() {
        let service = service_with(
            Arc::new(MemoryStore::new()),
            Arc::new(crate::mirror::NullMirror),
        );
        let task = service
            .create_task(TaskDraft {
                title: "Doomed".to_string(),
                ..Default::default()
            })
            .await
            .expect("create");

        service.delete_task(&task.id).await.expect("first delete");
        service.delete_task(&task.id).await.expect("second delete is a no-op success");
        assert!(service.tasks().is_empty());
    }

    #[tokio::test]
    async fn test_completion_awards_xp_and_recomputes_goal() {
        let store = Arc::new(MemoryStore::new());
        let observer = Arc::new(GamificationObserver::new(store.clone()));
        let service = SyncService::new(
            store.clone(),
            Arc::new(StaticAuth::signed_in("alice")),
            Arc::new(crate::mirror::NullMirror),
        )
        .with_observer(observer);

        let now = now_rfc3339();
        store
            .insert_goal(&Goal {
                id: "g1".to_string(),
                title: "Learn Rust".to_string(),
                category: "learning".to_string(),
                status: GoalStatus::OnTrack,
                progress: 0,
                total_tasks: 0,
                completed_tasks: 0,
                target_date: None,
                owner_id: "alice".to_string(),
                created_at: now.clone(),
                updated_at: now,
            })
            .await
            .expect("seed goal");

        let t1 = service
            .create_task(TaskDraft {
                title: "Read the book".to_string(),
                goal_id: Some("g1".to_string()),
                ..Default::default()
            })
            .await
            .expect("create");
        service
            .create_task(TaskDraft {
                title: "Write a crate".to_string(),
                goal_id: Some("g1".to_string()),
                ..Default::default()
            })
            .await
            .expect("create");

        let toggled = service.toggle_task(&t1.id, true).await.expect("toggle");
        assert!(toggled.is_completed);

        // Default draft: medium effort default, medium priority, no flags set
        // → floor(100 × 1.2) = 120 XP.
        let profile = store.get_or_create_profile("alice").await.expect("profile");
        assert_eq!(profile.xp, 120);
        assert_eq!(profile.tasks_completed, 1);
        assert_eq!(profile.level, 0);

        let goal = store.get_goal("alice", "g1").await.expect("goal").unwrap();
        assert_eq!(goal.completed_tasks, 1);
        assert_eq!(goal.total_tasks, 2);
        assert_eq!(goal.progress, 50);
        assert_eq!(goal.status, GoalStatus::OnTrack);
    }

    #[tokio::test]
    async fn test_toggle_back_to_open_does_not_notify() {
        let store = Arc::new(MemoryStore::new());
        let observer = Arc::new(GamificationObserver::new(store.clone()));
        let service = SyncService::new(
            store.clone(),
            Arc::new(StaticAuth::signed_in("alice")),
            Arc::new(crate::mirror::NullMirror),
        )
        .with_observer(observer);

        let task = service
            .create_task(TaskDraft {
                title: "Once".to_string(),
                ..Default::default()
            })
            .await
            .expect("create");

        service.toggle_task(&task.id, true).await.expect("complete");
        service.toggle_task(&task.id, false).await.expect("reopen");
        service.toggle_task(&task.id, true).await.expect("complete again");

        // Two distinct false→true transitions, two awards. Reopening itself
        // never decrements — XP is monotonic.
        let profile = store.get_or_create_profile("alice").await.expect("profile");
        assert_eq!(profile.xp, 240);
        assert_eq!(profile.tasks_completed, 2);
    }

    #[tokio::test]
    async fn test_create_event_without_mirror_connection() {
        let store = Arc::new(MemoryStore::new());
        let service = service_with(store.clone(), Arc::new(crate::mirror::NullMirror));

        let event = service
            .create_event(event_draft("Dentist"))
            .await
            .expect("create succeeds without external calendar");
        assert!(event.google_event_id.is_none(), "not mirrored, not an error");
        assert_eq!(
            service.event_state(&event.id),
            Some(RecordState::Persisted)
        );

        let stored = store.get_event("alice", &event.id).await.expect("get");
        assert!(stored.unwrap().google_event_id.is_none());
    }

    #[tokio::test]
    async fn test_create_event_persists_external_id_on_mirror_success() {
        let store = Arc::new(MemoryStore::new());
        let service = service_with(store.clone(), Arc::new(FixedMirror));

        let event = service.create_event(event_draft("Standup")).await.expect("create");
        assert_eq!(event.google_event_id.as_deref(), Some("gcal-fixed"));
        assert_eq!(service.event_state(&event.id), Some(RecordState::Mirrored));

        // The external id reached the primary store, not just the view.
        let stored = store
            .get_event("alice", &event.id)
            .await
            .expect("get")
            .unwrap();
        assert_eq!(stored.google_event_id.as_deref(), Some("gcal-fixed"));
    }

    #[tokio::test]
    async fn test_mirror_failure_never_fails_the_operation() {
        let store = Arc::new(MemoryStore::new());
        let service = service_with(store.clone(), Arc::new(BrokenMirror));

        // Create: primary write wins, mirror failure is swallowed.
        let event = service.create_event(event_draft("Flaky")).await.expect("create");
        assert!(event.google_event_id.is_none());

        // Pretend a previous session mirrored it, then update with the mirror
        // broken: operation still succeeds, external id unchanged.
        store
            .set_event_external_id("alice", &event.id, Some("gcal-old"))
            .await
            .expect("seed external id");

        let updated = service
            .update_event(
                &event.id,
                EventPatch {
                    title: Some("Flaky (moved)".to_string()),
                    ..Default::default()
                },
            )
            .await
            .expect("update succeeds despite mirror failure");
        assert_eq!(updated.title, "Flaky (moved)");
        assert_eq!(updated.google_event_id.as_deref(), Some("gcal-old"));

        // Delete also survives a broken mirror.
        service.delete_event(&event.id).await.expect("delete");
        assert!(store
            .get_event("alice", &event.id)
            .await
            .expect("get")
            .is_none());
    }

    #[tokio::test]
    async fn test_update_event_skips_mirror_when_never_mirrored() {
        let store = Arc::new(MemoryStore::new());
        // BrokenMirror would fail loudly if called on update; an unmirrored
        // record must not reach it. Success here implies the skip.
        let service = service_with(store.clone(), Arc::new(crate::mirror::NullMirror));

        let event = service.create_event(event_draft("Local only")).await.expect("create");
        let updated = service
            .update_event(
                &event.id,
                EventPatch {
                    title: Some("Still local".to_string()),
                    ..Default::default()
                },
            )
            .await
            .expect("update");
        assert!(updated.google_event_id.is_none());
    }

    #[tokio::test]
    async fn test_concurrent_updates_last_write_wins() {
        let store = Arc::new(MemoryStore::new());
        let service = Arc::new(service_with(store.clone(), Arc::new(crate::mirror::NullMirror)));

        let task = service
            .create_task(TaskDraft {
                title: "Contended".to_string(),
                ..Default::default()
            })
            .await
            .expect("create");

        let a = {
            let service = service.clone();
            let id = task.id.clone();
            tokio::spawn(async move {
                service
                    .update_task(
                        &id,
                        TaskPatch {
                            title: Some("From A".to_string()),
                            ..Default::default()
                        },
                    )
                    .await
            })
        };
        let b = {
            let service = service.clone();
            let id = task.id.clone();
            tokio::spawn(async move {
                service
                    .update_task(
                        &id,
                        TaskPatch {
                            priority: Some(Priority::High),
                            ..Default::default()
                        },
                    )
                    .await
            })
        };

        a.await.expect("join").expect("update A");
        b.await.expect("join").expect("update B");

        // Either write may win; the view must match the store's current row,
        // not a merge of both in-flight updates.
        let stored = store
            .get_task("alice", &task.id)
            .await
            .expect("get")
            .unwrap();
        let viewed = service
            .tasks()
            .into_iter()
            .find(|t| t.id == task.id)
            .unwrap();
        assert_eq!(viewed.updated_at, stored.updated_at);
    }

    #[tokio::test]
    async fn test_refresh_rebuilds_view_and_states() {
        let store = Arc::new(MemoryStore::new());
        let service = service_with(store.clone(), Arc::new(FixedMirror));

        let mirrored = service.create_event(event_draft("Mirrored")).await.expect("create");

        let service2 = service_with(store.clone(), Arc::new(crate::mirror::NullMirror));
        service2.refresh().await.expect("refresh");
        assert_eq!(
            service2.event_state(&mirrored.id),
            Some(RecordState::Mirrored)
        );
    }

    #[tokio::test]
    async fn test_focus_session_rejects_negative_minutes() {
        let store = Arc::new(MemoryStore::new());
        let service = service_with(store.clone(), Arc::new(crate::mirror::NullMirror));

        assert!(matches!(
            service.add_focus_session(-5).await,
            Err(SyncError::Validation(_))
        ));

        let profile = service.add_focus_session(25).await.expect("session");
        assert_eq!(profile.xp, 250);
        assert_eq!(profile.focus_minutes, 25);
    }

    #[tokio::test]
    async fn test_habit_streak_through_service() {
        let store = Arc::new(MemoryStore::new());
        let service = service_with(store.clone(), Arc::new(crate::mirror::NullMirror));

        let habit = service
            .create_habit("Meditate", Some("🧘".to_string()))
            .await
            .expect("create habit");

        let today = NaiveDate::from_ymd_opt(2026, 8, 5).unwrap();
        for offset in 0..3 {
            service
                .toggle_habit_log(&habit.id, today - chrono::Duration::days(offset))
                .await
                .expect("log");
        }

        assert_eq!(
            service.habit_streak_on(&habit.id, today).await.expect("streak"),
            3
        );

        // Unlogging today drops the anchor back to yesterday.
        service
            .toggle_habit_log(&habit.id, today)
            .await
            .expect("unlog");
        assert_eq!(
            service.habit_streak_on(&habit.id, today).await.expect("streak"),
            2
        );
    }
}
