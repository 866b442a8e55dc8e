//! LifeOS core: derivation and synchronization for the personal
//! productivity app.
//!
//! Four pieces:
//! - Eisenhower classification ([`quadrant`]) and gamification math
//!   ([`progress`], [`habits`]) — pure functions over domain records.
//! - The synchronization service ([`sync`]) — CRUD for tasks and calendar
//!   events against a [`store::PrimaryStore`], with best-effort mirroring
//!   of events to an external calendar ([`mirror`]).
//! - The streaming chat proxy ([`chat`]) — a tool-calling bridge between a
//!   remote completion service and the synchronization service.
//!
//! Everything the core talks to — store, auth context, mirror, completion
//! service — is an explicit collaborator passed in at construction.

pub mod chat;
pub mod config;
pub mod error;
pub mod google_api;
pub mod habits;
mod migrations;
pub mod mirror;
pub mod progress;
pub mod quadrant;
pub mod store;
pub mod sync;
pub mod types;

pub use error::{SyncError, SyncFailure, ValidationError};
pub use quadrant::{classify, classify_on, Quadrant};
pub use sync::{GamificationObserver, RecordState, SyncService};
