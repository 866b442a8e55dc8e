//! SQLite-backed primary store.
//!
//! The database lives at `~/.lifeos/lifeos.db`. WAL mode is enabled for
//! concurrent read performance and schema changes run through the numbered
//! migration framework. The connection sits behind a mutex; statements are
//! short-lived and never held across an await point.

use std::path::PathBuf;

use async_trait::async_trait;
use chrono::NaiveDate;
use parking_lot::Mutex;
use rusqlite::{params, Connection};

use super::{now_rfc3339, PrimaryStore, StoreError};
use crate::types::{
    CalendarEvent, Effort, EventPatch, Goal, GoalStatus, Habit, Priority, Task, TaskPatch,
    UserProfile,
};

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        match err {
            rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
            rusqlite::Error::SqliteFailure(code, msg)
                if code.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                StoreError::Constraint(msg.unwrap_or_else(|| code.to_string()))
            }
            other => StoreError::Backend(other.to_string()),
        }
    }
}

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) the database at `~/.lifeos/lifeos.db` and apply the
    /// schema.
    pub fn open() -> Result<Self, StoreError> {
        Self::open_at(Self::db_path()?)
    }

    /// Open a database at an explicit path. Useful for testing.
    pub fn open_at(path: PathBuf) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| StoreError::Backend(format!("Failed to create db dir: {e}")))?;
            }
        }

        let conn = Connection::open(&path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        crate::migrations::run_migrations(&conn).map_err(StoreError::Backend)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn db_path() -> Result<PathBuf, StoreError> {
        let home = dirs::home_dir()
            .ok_or_else(|| StoreError::Backend("Home directory not found".to_string()))?;
        Ok(home.join(".lifeos").join("lifeos.db"))
    }

    // -------------------------------------------------------------------------
    // Row mappers
    // -------------------------------------------------------------------------

    const TASK_COLUMNS: &'static str = "id, owner_id, title, priority, is_urgent, is_important, \
         is_completed, due_date, goal_id, effort, created_at, updated_at";

    fn map_task_row(row: &rusqlite::Row) -> rusqlite::Result<Task> {
        let priority: String = row.get(3)?;
        let due_date: Option<String> = row.get(7)?;
        let effort: Option<String> = row.get(9)?;
        Ok(Task {
            id: row.get(0)?,
            owner_id: row.get(1)?,
            title: row.get(2)?,
            priority: Priority::parse(&priority).unwrap_or_default(),
            is_urgent: row.get::<_, Option<i64>>(4)?.map(|v| v != 0),
            is_important: row.get::<_, Option<i64>>(5)?.map(|v| v != 0),
            is_completed: row.get::<_, i64>(6)? != 0,
            due_date: due_date.and_then(|s| NaiveDate::parse_from_str(&s, "%Y-%m-%d").ok()),
            goal_id: row.get(8)?,
            effort: effort.and_then(|s| Effort::parse(&s)),
            created_at: row.get(10)?,
            updated_at: row.get(11)?,
        })
    }

    const EVENT_COLUMNS: &'static str = "id, owner_id, title, start_at, end_at, all_day, \
         description, status, color, text_color, google_event_id, created_at, updated_at";

    fn map_event_row(row: &rusqlite::Row) -> rusqlite::Result<CalendarEvent> {
        Ok(CalendarEvent {
            id: row.get(0)?,
            owner_id: row.get(1)?,
            title: row.get(2)?,
            start_at: row.get(3)?,
            end_at: row.get(4)?,
            all_day: row.get::<_, i64>(5)? != 0,
            description: row.get(6)?,
            status: row.get(7)?,
            color: row.get(8)?,
            text_color: row.get(9)?,
            google_event_id: row.get(10)?,
            created_at: row.get(11)?,
            updated_at: row.get(12)?,
        })
    }

    fn map_goal_row(row: &rusqlite::Row) -> rusqlite::Result<Goal> {
        let status: String = row.get(4)?;
        let target_date: Option<String> = row.get(8)?;
        Ok(Goal {
            id: row.get(0)?,
            owner_id: row.get(1)?,
            title: row.get(2)?,
            category: row.get(3)?,
            status: GoalStatus::parse(&status).unwrap_or(GoalStatus::OnTrack),
            progress: row.get(5)?,
            total_tasks: row.get(6)?,
            completed_tasks: row.get(7)?,
            target_date: target_date.and_then(|s| NaiveDate::parse_from_str(&s, "%Y-%m-%d").ok()),
            created_at: row.get(9)?,
            updated_at: row.get(10)?,
        })
    }

    fn upsert_task_row(conn: &Connection, task: &Task) -> Result<(), StoreError> {
        conn.execute(
            "INSERT OR REPLACE INTO tasks
             (id, owner_id, title, priority, is_urgent, is_important, is_completed,
              due_date, goal_id, effort, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                task.id,
                task.owner_id,
                task.title,
                task.priority.as_str(),
                task.is_urgent.map(i64::from),
                task.is_important.map(i64::from),
                task.is_completed as i64,
                task.due_date.map(|d| d.to_string()),
                task.goal_id,
                task.effort.map(Effort::as_str),
                task.created_at,
                task.updated_at,
            ],
        )?;
        Ok(())
    }

    fn upsert_event_row(conn: &Connection, event: &CalendarEvent) -> Result<(), StoreError> {
        conn.execute(
            "INSERT OR REPLACE INTO events
             (id, owner_id, title, start_at, end_at, all_day, description, status,
              color, text_color, google_event_id, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            params![
                event.id,
                event.owner_id,
                event.title,
                event.start_at,
                event.end_at,
                event.all_day as i64,
                event.description,
                event.status,
                event.color,
                event.text_color,
                event.google_event_id,
                event.created_at,
                event.updated_at,
            ],
        )?;
        Ok(())
    }

    fn get_task_row(
        conn: &Connection,
        owner: &str,
        id: &str,
    ) -> Result<Option<Task>, StoreError> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM tasks WHERE id = ?1 AND owner_id = ?2",
            Self::TASK_COLUMNS
        ))?;
        let mut rows = stmt.query_map(params![id, owner], Self::map_task_row)?;
        match rows.next() {
            Some(row) => Ok(Some(row?)),
            None => Ok(None),
        }
    }

    fn get_event_row(
        conn: &Connection,
        owner: &str,
        id: &str,
    ) -> Result<Option<CalendarEvent>, StoreError> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM events WHERE id = ?1 AND owner_id = ?2",
            Self::EVENT_COLUMNS
        ))?;
        let mut rows = stmt.query_map(params![id, owner], Self::map_event_row)?;
        match rows.next() {
            Some(row) => Ok(Some(row?)),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl PrimaryStore for SqliteStore {
    async fn insert_task(&self, task: &Task) -> Result<Task, StoreError> {
        let conn = self.conn.lock();
        Self::upsert_task_row(&conn, task)?;
        Self::get_task_row(&conn, &task.owner_id, &task.id)?.ok_or(StoreError::NotFound)
    }

    async fn get_task(&self, owner: &str, id: &str) -> Result<Option<Task>, StoreError> {
        let conn = self.conn.lock();
        Self::get_task_row(&conn, owner, id)
    }

    async fn update_task(
        &self,
        owner: &str,
        id: &str,
        patch: &TaskPatch,
    ) -> Result<Task, StoreError> {
        let conn = self.conn.lock();
        let mut task = Self::get_task_row(&conn, owner, id)?.ok_or(StoreError::NotFound)?;
        patch.apply(&mut task);
        task.updated_at = now_rfc3339();
        Self::upsert_task_row(&conn, &task)?;
        Ok(task)
    }

    async fn set_task_completed(
        &self,
        owner: &str,
        id: &str,
        completed: bool,
    ) -> Result<Task, StoreError> {
        let conn = self.conn.lock();
        let mut task = Self::get_task_row(&conn, owner, id)?.ok_or(StoreError::NotFound)?;
        task.is_completed = completed;
        task.updated_at = now_rfc3339();
        Self::upsert_task_row(&conn, &task)?;
        Ok(task)
    }

    async fn delete_task(&self, owner: &str, id: &str) -> Result<bool, StoreError> {
        let conn = self.conn.lock();
        let deleted = conn.execute(
            "DELETE FROM tasks WHERE id = ?1 AND owner_id = ?2",
            params![id, owner],
        )?;
        Ok(deleted > 0)
    }

    async fn list_tasks(&self, owner: &str) -> Result<Vec<Task>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM tasks WHERE owner_id = ?1 ORDER BY created_at DESC, id",
            Self::TASK_COLUMNS
        ))?;
        let rows = stmt.query_map(params![owner], Self::map_task_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    async fn count_goal_tasks(
        &self,
        owner: &str,
        goal_id: &str,
    ) -> Result<(u32, u32), StoreError> {
        let conn = self.conn.lock();
        let (completed, total): (u32, u32) = conn.query_row(
            "SELECT COALESCE(SUM(is_completed), 0), COUNT(*)
             FROM tasks WHERE owner_id = ?1 AND goal_id = ?2",
            params![owner, goal_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        Ok((completed, total))
    }

    async fn insert_goal(&self, goal: &Goal) -> Result<Goal, StoreError> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR REPLACE INTO goals
             (id, owner_id, title, category, status, progress, total_tasks,
              completed_tasks, target_date, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                goal.id,
                goal.owner_id,
                goal.title,
                goal.category,
                goal.status.as_str(),
                goal.progress,
                goal.total_tasks,
                goal.completed_tasks,
                goal.target_date.map(|d| d.to_string()),
                goal.created_at,
                goal.updated_at,
            ],
        )?;
        Ok(goal.clone())
    }

    async fn get_goal(&self, owner: &str, id: &str) -> Result<Option<Goal>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, owner_id, title, category, status, progress, total_tasks,
                    completed_tasks, target_date, created_at, updated_at
             FROM goals WHERE id = ?1 AND owner_id = ?2",
        )?;
        let mut rows = stmt.query_map(params![id, owner], Self::map_goal_row)?;
        match rows.next() {
            Some(row) => Ok(Some(row?)),
            None => Ok(None),
        }
    }

    async fn list_goals(&self, owner: &str) -> Result<Vec<Goal>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, owner_id, title, category, status, progress, total_tasks,
                    completed_tasks, target_date, created_at, updated_at
             FROM goals WHERE owner_id = ?1 ORDER BY created_at DESC, id",
        )?;
        let rows = stmt.query_map(params![owner], Self::map_goal_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
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
        let conn = self.conn.lock();
        let updated = conn.execute(
            "UPDATE goals
             SET progress = ?1, completed_tasks = ?2, total_tasks = ?3,
                 status = ?4, updated_at = ?5
             WHERE id = ?6 AND owner_id = ?7",
            params![
                progress,
                completed_tasks,
                total_tasks,
                status.as_str(),
                now_rfc3339(),
                id,
                owner
            ],
        )?;
        if updated == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn insert_event(&self, event: &CalendarEvent) -> Result<CalendarEvent, StoreError> {
        let conn = self.conn.lock();
        Self::upsert_event_row(&conn, event)?;
        Self::get_event_row(&conn, &event.owner_id, &event.id)?.ok_or(StoreError::NotFound)
    }

    async fn get_event(
        &self,
        owner: &str,
        id: &str,
    ) -> Result<Option<CalendarEvent>, StoreError> {
        let conn = self.conn.lock();
        Self::get_event_row(&conn, owner, id)
    }

    async fn update_event(
        &self,
        owner: &str,
        id: &str,
        patch: &EventPatch,
    ) -> Result<CalendarEvent, StoreError> {
        let conn = self.conn.lock();
        let mut event = Self::get_event_row(&conn, owner, id)?.ok_or(StoreError::NotFound)?;
        patch.apply(&mut event);
        event.updated_at = now_rfc3339();
        Self::upsert_event_row(&conn, &event)?;
        Ok(event)
    }

    async fn set_event_external_id(
        &self,
        owner: &str,
        id: &str,
        external_id: Option<&str>,
    ) -> Result<(), StoreError> {
        let conn = self.conn.lock();
        let updated = conn.execute(
            "UPDATE events SET google_event_id = ?1, updated_at = ?2
             WHERE id = ?3 AND owner_id = ?4",
            params![external_id, now_rfc3339(), id, owner],
        )?;
        if updated == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn delete_event(&self, owner: &str, id: &str) -> Result<bool, StoreError> {
        let conn = self.conn.lock();
        let deleted = conn.execute(
            "DELETE FROM events WHERE id = ?1 AND owner_id = ?2",
            params![id, owner],
        )?;
        Ok(deleted > 0)
    }

    async fn list_events(&self, owner: &str) -> Result<Vec<CalendarEvent>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM events WHERE owner_id = ?1 ORDER BY datetime(start_at), id",
            Self::EVENT_COLUMNS
        ))?;
        let rows = stmt.query_map(params![owner], Self::map_event_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    async fn events_in_range(
        &self,
        owner: &str,
        start: &str,
        end: &str,
    ) -> Result<Vec<CalendarEvent>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM events
             WHERE owner_id = ?1
               AND datetime(start_at) >= datetime(?2)
               AND datetime(start_at) < datetime(?3)
             ORDER BY datetime(start_at), id",
            Self::EVENT_COLUMNS
        ))?;
        let rows = stmt.query_map(params![owner, start, end], Self::map_event_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    async fn upcoming_events(
        &self,
        owner: &str,
        after: &str,
        limit: u32,
    ) -> Result<Vec<CalendarEvent>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM events
             WHERE owner_id = ?1 AND datetime(start_at) >= datetime(?2)
             ORDER BY datetime(start_at), id
             LIMIT ?3",
            Self::EVENT_COLUMNS
        ))?;
        let rows = stmt.query_map(params![owner, after, limit], Self::map_event_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    async fn get_or_create_profile(&self, owner: &str) -> Result<UserProfile, StoreError> {
        let conn = self.conn.lock();
        let existing = {
            let mut stmt = conn.prepare(
                "SELECT id, xp, level, focus_minutes, streak, tasks_completed,
                        achievements, updated_at
                 FROM profiles WHERE id = ?1",
            )?;
            let mut rows = stmt.query_map(params![owner], |row| {
                let achievements: String = row.get(6)?;
                Ok(UserProfile {
                    id: row.get(0)?,
                    xp: row.get(1)?,
                    level: row.get(2)?,
                    focus_minutes: row.get(3)?,
                    streak: row.get(4)?,
                    tasks_completed: row.get(5)?,
                    achievements: serde_json::from_str(&achievements).unwrap_or_default(),
                    updated_at: row.get(7)?,
                })
            })?;
            match rows.next() {
                Some(row) => Some(row?),
                None => None,
            }
        };

        if let Some(profile) = existing {
            return Ok(profile);
        }

        // First access for this owner — create the empty profile.
        let profile = UserProfile::new(owner, &now_rfc3339());
        conn.execute(
            "INSERT INTO profiles
             (id, xp, level, focus_minutes, streak, tasks_completed, achievements, updated_at)
             VALUES (?1, 0, 0, 0, 0, 0, '[]', ?2)",
            params![profile.id, profile.updated_at],
        )?;
        Ok(profile)
    }

    async fn save_profile(&self, profile: &UserProfile) -> Result<(), StoreError> {
        let conn = self.conn.lock();
        let achievements = serde_json::to_string(&profile.achievements)
            .map_err(|e| StoreError::Backend(format!("Serialize achievements: {e}")))?;
        conn.execute(
            "INSERT OR REPLACE INTO profiles
             (id, xp, level, focus_minutes, streak, tasks_completed, achievements, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                profile.id,
                profile.xp,
                profile.level,
                profile.focus_minutes,
                profile.streak,
                profile.tasks_completed,
                achievements,
                now_rfc3339(),
            ],
        )?;
        Ok(())
    }

    async fn insert_habit(&self, habit: &Habit) -> Result<Habit, StoreError> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR REPLACE INTO habits (id, owner_id, title, emoji, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                habit.id,
                habit.owner_id,
                habit.title,
                habit.emoji,
                habit.created_at
            ],
        )?;
        Ok(habit.clone())
    }

    async fn list_habits(&self, owner: &str) -> Result<Vec<Habit>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, owner_id, title, emoji, created_at
             FROM habits WHERE owner_id = ?1 ORDER BY created_at, id",
        )?;
        let rows = stmt.query_map(params![owner], |row| {
            Ok(Habit {
                id: row.get(0)?,
                owner_id: row.get(1)?,
                title: row.get(2)?,
                emoji: row.get(3)?,
                created_at: row.get(4)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    async fn delete_habit(&self, owner: &str, id: &str) -> Result<bool, StoreError> {
        let conn = self.conn.lock();
        conn.execute(
            "DELETE FROM habit_logs WHERE habit_id = ?1 AND owner_id = ?2",
            params![id, owner],
        )?;
        let deleted = conn.execute(
            "DELETE FROM habits WHERE id = ?1 AND owner_id = ?2",
            params![id, owner],
        )?;
        Ok(deleted > 0)
    }

    async fn toggle_habit_log(
        &self,
        owner: &str,
        habit_id: &str,
        date: NaiveDate,
    ) -> Result<bool, StoreError> {
        let conn = self.conn.lock();
        let date_str = date.to_string();
        let removed = conn.execute(
            "DELETE FROM habit_logs WHERE habit_id = ?1 AND owner_id = ?2 AND date = ?3",
            params![habit_id, owner, date_str],
        )?;
        if removed > 0 {
            return Ok(false);
        }
        conn.execute(
            "INSERT INTO habit_logs (habit_id, owner_id, date) VALUES (?1, ?2, ?3)",
            params![habit_id, owner, date_str],
        )?;
        Ok(true)
    }

    async fn habit_log_dates(
        &self,
        owner: &str,
        habit_id: &str,
    ) -> Result<Vec<NaiveDate>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT date FROM habit_logs WHERE habit_id = ?1 AND owner_id = ?2",
        )?;
        let rows = stmt.query_map(params![habit_id, owner], |row| row.get::<_, String>(0))?;
        let mut dates = Vec::new();
        for row in rows {
            if let Ok(date) = NaiveDate::parse_from_str(&row?, "%Y-%m-%d") {
                dates.push(date);
            }
        }
        Ok(dates)
    }
}

// =============================================================================
// Shared test utilities
// =============================================================================
