//! Tool surface exposed to the remote model.
//!
//! Every tool returns a plain string — the model consumes tool output as
//! text, so empty results and failures come back as human-readable
//! sentences, never as raised errors or empty structures.

use chrono::{DateTime, NaiveDate};
use serde_json::Value;

use super::ToolSpec;
use crate::error::SyncError;
use crate::sync::SyncService;
use crate::types::{CalendarEvent, EventDraft};

pub const GET_CALENDAR_EVENTS: &str = "getCalendarEvents";
pub const CREATE_CALENDAR_EVENT: &str = "createCalendarEvent";

/// How many upcoming events the calendar tool returns when no date is given.
const UPCOMING_LIMIT: u32 = 10;

const NO_EVENTS: &str = "No events found.";
const NOT_SIGNED_IN: &str = "You need to be signed in to access the calendar.";

/// Tool schemas forwarded to the completion service.
pub fn specs() -> Vec<ToolSpec> {
    vec![
        ToolSpec {
            name: GET_CALENDAR_EVENTS,
            description: "Get the user's calendar events. Pass a date (YYYY-MM-DD) to list \
                          that day's events, or omit it for the next upcoming events.",
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "date": {
                        "type": "string",
                        "description": "Calendar day in YYYY-MM-DD format (optional)"
                    }
                }
            }),
        },
        ToolSpec {
            name: CREATE_CALENDAR_EVENT,
            description: "Create a calendar event for the user.",
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "title": { "type": "string" },
                    "start": {
                        "type": "string",
                        "description": "Event start as an ISO 8601 timestamp"
                    },
                    "end": {
                        "type": "string",
                        "description": "Event end as an ISO 8601 timestamp"
                    },
                    "description": { "type": "string" }
                },
                "required": ["title", "start", "end"]
            }),
        },
    ]
}

/// Execute a tool call by name. Unknown tools report themselves as text.
pub async fn dispatch(service: &SyncService, name: &str, arguments: &str) -> String {
    let args: Value = match serde_json::from_str(arguments) {
        Ok(value) => value,
        Err(_) if arguments.trim().is_empty() => Value::Null,
        Err(e) => return format!("Could not parse tool arguments: {e}"),
    };

    match name {
        GET_CALENDAR_EVENTS => get_calendar_events(service, &args).await,
        CREATE_CALENDAR_EVENT => create_calendar_event(service, &args).await,
        other => format!("Unknown tool: {other}"),
    }
}

async fn get_calendar_events(service: &SyncService, args: &Value) -> String {
    let date = match args.get("date").and_then(Value::as_str) {
        Some(raw) => match parse_day(raw) {
            Ok(date) => Some(date),
            Err(msg) => return msg,
        },
        None => None,
    };

    let result = match date {
        Some(date) => service.events_on(date).await,
        None => service.upcoming_events(UPCOMING_LIMIT).await,
    };

    match result {
        Ok(events) if events.is_empty() => NO_EVENTS.to_string(),
        Ok(events) => render_events(&events),
        Err(SyncError::Unauthenticated) => NOT_SIGNED_IN.to_string(),
        Err(e) => format!("Could not load calendar events: {e}"),
    }
}

async fn create_calendar_event(service: &SyncService, args: &Value) -> String {
    let Some(title) = args.get("title").and_then(Value::as_str) else {
        return "Missing required field: title".to_string();
    };
    let Some(start) = args.get("start").and_then(Value::as_str) else {
        return "Missing required field: start".to_string();
    };
    let Some(end) = args.get("end").and_then(Value::as_str) else {
        return "Missing required field: end".to_string();
    };

    if DateTime::parse_from_rfc3339(start).is_err() {
        return format!("Invalid start timestamp: {start}");
    }
    if DateTime::parse_from_rfc3339(end).is_err() {
        return format!("Invalid end timestamp: {end}");
    }

    let draft = EventDraft {
        title: title.to_string(),
        start_at: start.to_string(),
        end_at: end.to_string(),
        all_day: false,
        description: args
            .get("description")
            .and_then(Value::as_str)
            .map(str::to_string),
        color: None,
        text_color: None,
    };

    match service.create_event(draft).await {
        Ok(event) => format!(
            "Created event \"{}\" from {} to {}.",
            event.title, event.start_at, event.end_at
        ),
        Err(SyncError::Unauthenticated) => NOT_SIGNED_IN.to_string(),
        Err(e) => format!("Could not create the event: {e}"),
    }
}

/// Accept a bare day or a full timestamp (the model sends both).
fn parse_day(raw: &str) -> Result<NaiveDate, String> {
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Ok(date);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.date_naive());
    }
    Err(format!("Invalid date: {raw} (expected YYYY-MM-DD)"))
}

fn render_events(events: &[CalendarEvent]) -> String {
    let mut out = String::new();
    for event in events {
        if !out.is_empty() {
            out.push('\n');
        }
        out.push_str(&format!(
            "- {} ({} to {})",
            event.title, event.start_at, event.end_at
        ));
        if let Some(description) = event.description.as_deref() {
            if !description.is_empty() {
                out.push_str(&format!(": {description}"));
            }
        }
    }
    out
}
