//! Best-effort mirroring of calendar events to an external calendar.
//!
//! The mirror is strictly secondary: the primary store has already been
//! written by the time any of these methods run, and a mirror failure is
//! reported as a warning, never as an operation failure. "Not connected"
//! is an expected state, not an error the caller sees.

use async_trait::async_trait;
use thiserror::Error;

use crate::google_api::{self, GoogleApiError};
use crate::types::CalendarEvent;

#[derive(Debug, Error)]
pub enum MirrorError {
    #[error("External calendar not connected")]
    NotConnected,

    #[error("Calendar API error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Transport: {0}")]
    Transport(String),
}

/// External calendar collaborator. Create returns the external id used to
/// target later updates/deletes.
#[async_trait]
pub trait CalendarMirror: Send + Sync {
    async fn create_event(&self, event: &CalendarEvent) -> Result<String, MirrorError>;

    async fn update_event(
        &self,
        external_id: &str,
        event: &CalendarEvent,
    ) -> Result<(), MirrorError>;

    async fn delete_event(&self, external_id: &str) -> Result<(), MirrorError>;
}

/// Mirror for deployments without an external calendar connection.
/// Every call reports `NotConnected`, which callers treat as "skip".
#[derive(Default)]
pub struct NullMirror;

#[async_trait]
impl CalendarMirror for NullMirror {
    async fn create_event(&self, _event: &CalendarEvent) -> Result<String, MirrorError> {
        Err(MirrorError::NotConnected)
    }

    async fn update_event(
        &self,
        _external_id: &str,
        _event: &CalendarEvent,
    ) -> Result<(), MirrorError> {
        Err(MirrorError::NotConnected)
    }

    async fn delete_event(&self, _external_id: &str) -> Result<(), MirrorError> {
        Err(MirrorError::NotConnected)
    }
}

impl From<GoogleApiError> for MirrorError {
    fn from(err: GoogleApiError) -> Self {
        if err.is_not_connected() {
            return MirrorError::NotConnected;
        }
        match err {
            GoogleApiError::ApiError { status, message } => MirrorError::Api { status, message },
            other => MirrorError::Transport(other.to_string()),
        }
    }
}

/// Google Calendar mirror. Resolves a fresh access token per call (the
/// token layer refreshes and serializes as needed).
#[derive(Default)]
pub struct GoogleCalendarMirror;

impl GoogleCalendarMirror {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CalendarMirror for GoogleCalendarMirror {
    async fn create_event(&self, event: &CalendarEvent) -> Result<String, MirrorError> {
        let token = google_api::get_valid_access_token().await?;
        Ok(google_api::calendar::insert_event(&token, event).await?)
    }

    async fn update_event(
        &self,
        external_id: &str,
        event: &CalendarEvent,
    ) -> Result<(), MirrorError> {
        let token = google_api::get_valid_access_token().await?;
        Ok(google_api::calendar::patch_event(&token, external_id, event).await?)
    }

    async fn delete_event(&self, external_id: &str) -> Result<(), MirrorError> {
        let token = google_api::get_valid_access_token().await?;
        Ok(google_api::calendar::delete_event(&token, external_id).await?)
    }
}
