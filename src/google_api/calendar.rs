//! Google Calendar API v3 — event writes for mirroring.

use serde::{Deserialize, Serialize};

use super::{send_with_retry, GoogleApiError, RetryPolicy};
use crate::types::CalendarEvent;

const EVENTS_URL: &str = "https://www.googleapis.com/calendar/v3/calendars/primary/events";

// ============================================================================
// Request/response payloads
// ============================================================================

/// Start/end payload. Timed events use `dateTime`; all-day events use `date`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EventTime {
    #[serde(skip_serializing_if = "Option::is_none")]
    date_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    date: Option<String>,
}

impl EventTime {
    fn for_event(value: &str, all_day: bool) -> Self {
        if all_day {
            // Google expects a bare date for all-day events.
            let date = value.split('T').next().unwrap_or(value).to_string();
            Self {
                date_time: None,
                date: Some(date),
            }
        } else {
            Self {
                date_time: Some(value.to_string()),
                date: None,
            }
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EventPayload {
    summary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    start: EventTime,
    end: EventTime,
}

impl EventPayload {
    fn from_event(event: &CalendarEvent) -> Self {
        Self {
            summary: event.title.clone(),
            description: event.description.clone(),
            start: EventTime::for_event(&event.start_at, event.all_day),
            end: EventTime::for_event(&event.end_at, event.all_day),
        }
    }
}

#[derive(Debug, Deserialize)]
struct CreatedEvent {
    id: String,
}

// ============================================================================
// Calendar API
// ============================================================================

/// Create an event on the primary calendar. Returns the Google-assigned id.
pub async fn insert_event(
    access_token: &str,
    event: &CalendarEvent,
) -> Result<String, GoogleApiError> {
    let client = reqwest::Client::new();
    let resp = send_with_retry(
        client
            .post(EVENTS_URL)
            .bearer_auth(access_token)
            .json(&EventPayload::from_event(event)),
        &RetryPolicy::default(),
    )
    .await?;

    let status = resp.status();
    if status == reqwest::StatusCode::UNAUTHORIZED {
        return Err(GoogleApiError::AuthExpired);
    }
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(GoogleApiError::ApiError {
            status: status.as_u16(),
            message: body,
        });
    }

    let created: CreatedEvent = resp.json().await?;
    Ok(created.id)
}

/// Patch an existing event by its Google id.
pub async fn patch_event(
    access_token: &str,
    google_event_id: &str,
    event: &CalendarEvent,
) -> Result<(), GoogleApiError> {
    let client = reqwest::Client::new();
    let resp = send_with_retry(
        client
            .patch(format!("{EVENTS_URL}/{google_event_id}"))
            .bearer_auth(access_token)
            .json(&EventPayload::from_event(event)),
        &RetryPolicy::default(),
    )
    .await?;

    let status = resp.status();
    if status == reqwest::StatusCode::UNAUTHORIZED {
        return Err(GoogleApiError::AuthExpired);
    }
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(GoogleApiError::ApiError {
            status: status.as_u16(),
            message: body,
        });
    }
    Ok(())
}

/// Delete an event by its Google id.
///
/// 404/410 mean the event is already gone on the Google side; deletion is
/// idempotent, so both count as success.
pub async fn delete_event(
    access_token: &str,
    google_event_id: &str,
) -> Result<(), GoogleApiError> {
    let client = reqwest::Client::new();
    let resp = send_with_retry(
        client
            .delete(format!("{EVENTS_URL}/{google_event_id}"))
            .bearer_auth(access_token),
        &RetryPolicy::default(),
    )
    .await?;

    let status = resp.status();
    if status == reqwest::StatusCode::UNAUTHORIZED {
        return Err(GoogleApiError::AuthExpired);
    }
    if status == reqwest::StatusCode::NOT_FOUND || status == reqwest::StatusCode::GONE {
        return Ok(());
    }
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(GoogleApiError::ApiError {
            status: status.as_u16(),
            message: body,
        });
    }
    Ok(())
}
