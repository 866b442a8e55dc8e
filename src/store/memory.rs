//! In-memory primary store.
//!
//! Second implementation of the same storage interface the synchronization
//! service depends on. Serves two roles: the fallback store for
//! unauthenticated local-only data, and the default test double. Semantics
//! mirror the SQLite store (owner scoping, patch application, timestamp
//! stamping) so either can sit behind the service.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::Mutex;

use super::{now_rfc3339, PrimaryStore, StoreError};
use crate::types::{
    CalendarEvent, EventPatch, Goal, GoalStatus, Habit, Task, TaskPatch, UserProfile,
};

#[derive(Default)]
struct Tables {
    tasks: HashMap<String, Task>,
    goals: HashMap<String, Goal>,
    events: HashMap<String, CalendarEvent>,
    profiles: HashMap<String, UserProfile>,
    habits: HashMap<String, Habit>,
    // (habit_id, date) — existence is completion
    habit_logs: Vec<(String, String, NaiveDate)>,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn parse_instant(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

#[async_trait]
impl PrimaryStore for MemoryStore {
    async fn insert_task(&self, task: &Task) -> Result<Task, StoreError> {
        let mut tables = self.tables.lock();
        tables.tasks.insert(task.id.clone(), task.clone());
        Ok(task.clone())
    }

    async fn get_task(&self, owner: &str, id: &str) -> Result<Option<Task>, StoreError> {
        let tables = self.tables.lock();
        Ok(tables
            .tasks
            .get(id)
            .filter(|t| t.owner_id == owner)
            .cloned())
    }

    async fn update_task(
        &self,
        owner: &str,
        id: &str,
        patch: &TaskPatch,
    ) -> Result<Task, StoreError> {
        let mut tables = self.tables.lock();
        let task = tables
            .tasks
            .get_mut(id)
            .filter(|t| t.owner_id == owner)
            .ok_or(StoreError::NotFound)?;
        patch.apply(task);
        task.updated_at = now_rfc3339();
        Ok(task.clone())
    }

    async fn set_task_completed(
        &self,
        owner: &str,
        id: &str,
        completed: bool,
    ) -> Result<Task, StoreError> {
        let mut tables = self.tables.lock();
        let task = tables
            .tasks
            .get_mut(id)
            .filter(|t| t.owner_id == owner)
            .ok_or(StoreError::NotFound)?;
        task.is_completed = completed;
        task.updated_at = now_rfc3339();
        Ok(task.clone())
    }

    async fn delete_task(&self, owner: &str, id: &str) -> Result<bool, StoreError> {
        let mut tables = self.tables.lock();
        let matches = tables
            .tasks
            .get(id)
            .map(|t| t.owner_id == owner)
            .unwrap_or(false);
        if matches {
            tables.tasks.remove(id);
        }
        Ok(matches)
    }

    async fn list_tasks(&self, owner: &str) -> Result<Vec<Task>, StoreError> {
        let tables = self.tables.lock();
        let mut tasks: Vec<Task> = tables
            .tasks
            .values()
            .filter(|t| t.owner_id == owner)
            .cloned()
            .collect();
        tasks.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        Ok(tasks)
    }

    async fn count_goal_tasks(
        &self,
        owner: &str,
        goal_id: &str,
    ) -> Result<(u32, u32), StoreError> {
        let tables = self.tables.lock();
        let linked: Vec<&Task> = tables
            .tasks
            .values()
            .filter(|t| t.owner_id == owner && t.goal_id.as_deref() == Some(goal_id))
            .collect();
        let completed = linked.iter().filter(|t| t.is_completed).count() as u32;
        Ok((completed, linked.len() as u32))
    }

    async fn insert_goal(&self, goal: &Goal) -> Result<Goal, StoreError> {
        let mut tables = self.tables.lock();
        tables.goals.insert(goal.id.clone(), goal.clone());
        Ok(goal.clone())
    }

    async fn get_goal(&self, owner: &str, id: &str) -> Result<Option<Goal>, StoreError> {
        let tables = self.tables.lock();
        Ok(tables
            .goals
            .get(id)
            .filter(|g| g.owner_id == owner)
            .cloned())
    }

    async fn list_goals(&self, owner: &str) -> Result<Vec<Goal>, StoreError> {
        let tables = self.tables.lock();
        let mut goals: Vec<Goal> = tables
            .goals
            .values()
            .filter(|g| g.owner_id == owner)
            .cloned()
            .collect();
        goals.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        Ok(goals)
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
        let mut tables = self.tables.lock();
        let goal = tables
            .goals
            .get_mut(id)
            .filter(|g| g.owner_id == owner)
            .ok_or(StoreError::NotFound)?;
        goal.progress = progress;
        goal.completed_tasks = completed_tasks;
        goal.total_tasks = total_tasks;
        goal.status = status;
        goal.updated_at = now_rfc3339();
        Ok(())
    }

    async fn insert_event(&self, event: &CalendarEvent) -> Result<CalendarEvent, StoreError> {
        let mut tables = self.tables.lock();
        tables.events.insert(event.id.clone(), event.clone());
        Ok(event.clone())
    }

    async fn get_event(
        &self,
        owner: &str,
        id: &str,
    ) -> Result<Option<CalendarEvent>, StoreError> {
        let tables = self.tables.lock();
        Ok(tables
            .events
            .get(id)
            .filter(|e| e.owner_id == owner)
            .cloned())
    }

    async fn update_event(
        &self,
        owner: &str,
        id: &str,
        patch: &EventPatch,
    ) -> Result<CalendarEvent, StoreError> {
        let mut tables = self.tables.lock();
        let event = tables
            .events
            .get_mut(id)
            .filter(|e| e.owner_id == owner)
            .ok_or(StoreError::NotFound)?;
        patch.apply(event);
        event.updated_at = now_rfc3339();
        Ok(event.clone())
    }

    async fn set_event_external_id(
        &self,
        owner: &str,
        id: &str,
        external_id: Option<&str>,
    ) -> Result<(), StoreError> {
        let mut tables = self.tables.lock();
        let event = tables
            .events
            .get_mut(id)
            .filter(|e| e.owner_id == owner)
            .ok_or(StoreError::NotFound)?;
        event.google_event_id = external_id.map(str::to_string);
        event.updated_at = now_rfc3339();
        Ok(())
    }

    async fn delete_event(&self, owner: &str, id: &str) -> Result<bool, StoreError> {
        let mut tables = self.tables.lock();
        let matches = tables
            .events
            .get(id)
            .map(|e| e.owner_id == owner)
            .unwrap_or(false);
        if matches {
            tables.events.remove(id);
        }
        Ok(matches)
    }

    async fn list_events(&self, owner: &str) -> Result<Vec<CalendarEvent>, StoreError> {
        let tables = self.tables.lock();
        let mut events: Vec<CalendarEvent> = tables
            .events
            .values()
            .filter(|e| e.owner_id == owner)
            .cloned()
            .collect();
        events.sort_by(|a, b| {
            parse_instant(&a.start_at)
                .cmp(&parse_instant(&b.start_at))
                .then(a.id.cmp(&b.id))
        });
        Ok(events)
    }

    async fn events_in_range(
        &self,
        owner: &str,
        start: &str,
        end: &str,
    ) -> Result<Vec<CalendarEvent>, StoreError> {
        let start = parse_instant(start)
            .ok_or_else(|| StoreError::Constraint(format!("Invalid range start: {start}")))?;
        let end = parse_instant(end)
            .ok_or_else(|| StoreError::Constraint(format!("Invalid range end: {end}")))?;

        let mut events: Vec<CalendarEvent> = self
            .list_events(owner)
            .await?
            .into_iter()
            .filter(|e| {
                parse_instant(&e.start_at)
                    .map(|at| at >= start && at < end)
                    .unwrap_or(false)
            })
            .collect();
        events.sort_by(|a, b| {
            parse_instant(&a.start_at)
                .cmp(&parse_instant(&b.start_at))
                .then(a.id.cmp(&b.id))
        });
        Ok(events)
    }

    async fn upcoming_events(
        &self,
        owner: &str,
        after: &str,
        limit: u32,
    ) -> Result<Vec<CalendarEvent>, StoreError> {
        let after = parse_instant(after)
            .ok_or_else(|| StoreError::Constraint(format!("Invalid cutoff: {after}")))?;

        let mut events: Vec<CalendarEvent> = self
            .list_events(owner)
            .await?
            .into_iter()
            .filter(|e| {
                parse_instant(&e.start_at)
                    .map(|at| at >= after)
                    .unwrap_or(false)
            })
            .collect();
        events.truncate(limit as usize);
        Ok(events)
    }

    async fn get_or_create_profile(&self, owner: &str) -> Result<UserProfile, StoreError> {
        let mut tables = self.tables.lock();
        let profile = tables
            .profiles
            .entry(owner.to_string())
            .or_insert_with(|| UserProfile::new(owner, &now_rfc3339()));
        Ok(profile.clone())
    }

    async fn save_profile(&self, profile: &UserProfile) -> Result<(), StoreError> {
        let mut tables = self.tables.lock();
        let mut stored = profile.clone();
        stored.updated_at = now_rfc3339();
        tables.profiles.insert(profile.id.clone(), stored);
        Ok(())
    }

    async fn insert_habit(&self, habit: &Habit) -> Result<Habit, StoreError> {
        let mut tables = self.tables.lock();
        tables.habits.insert(habit.id.clone(), habit.clone());
        Ok(habit.clone())
    }

    async fn list_habits(&self, owner: &str) -> Result<Vec<Habit>, StoreError> {
        let tables = self.tables.lock();
        let mut habits: Vec<Habit> = tables
            .habits
            .values()
            .filter(|h| h.owner_id == owner)
            .cloned()
            .collect();
        habits.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(habits)
    }

    async fn delete_habit(&self, owner: &str, id: &str) -> Result<bool, StoreError> {
        let mut tables = self.tables.lock();
        let matches = tables
            .habits
            .get(id)
            .map(|h| h.owner_id == owner)
            .unwrap_or(false);
        if matches {
            tables.habits.remove(id);
            tables
                .habit_logs
                .retain(|(habit_id, log_owner, _)| !(habit_id == id && log_owner == owner));
        }
        Ok(matches)
    }

    async fn toggle_habit_log(
        &self,
        owner: &str,
        habit_id: &str,
        date: NaiveDate,
    ) -> Result<bool, StoreError> {
        let mut tables = self.tables.lock();
        let before = tables.habit_logs.len();
        tables
            .habit_logs
            .retain(|(h, o, d)| !(h == habit_id && o == owner && *d == date));
        if tables.habit_logs.len() < before {
            return Ok(false);
        }
        tables
            .habit_logs
            .push((habit_id.to_string(), owner.to_string(), date));
        Ok(true)
    }

    async fn habit_log_dates(
        &self,
        owner: &str,
        habit_id: &str,
    ) -> Result<Vec<NaiveDate>, StoreError> {
        let tables = self.tables.lock();
        Ok(tables
            .habit_logs
            .iter()
            .filter(|(h, o, _)| h == habit_id && o == owner)
            .map(|(_, _, d)| *d)
            .collect())
    }
}
