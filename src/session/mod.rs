//! Clarification sessions.
//!
//! A session holds everything needed to resolve a follow-up utterance
//! without re-scraping: the catalog, the original request and the latest
//! resolution.  Sessions live in a [`SessionStore`] keyed by
//! [`SessionId`] and expire after a period of inactivity.

pub mod machine;
pub mod store;

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::order::{MenuCatalogEntry, ParsedOrder, ResolutionBucketSet};

pub use machine::{ClarificationMachine, TurnOutcome};
pub use store::{SessionStore, spawn_sweeper};

/// Opaque session identifier handed to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self(s.trim().to_string())
    }
}

impl From<String> for SessionId {
    fn from(s: String) -> Self {
        Self::from(s.as_str())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Where a dialogue stands after a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionState {
    New,
    AwaitingClarification,
    Resolved,
}

/// State carried between clarification turns.
#[derive(Debug, Clone)]
pub struct ClarificationSession {
    pub id: SessionId,
    pub created_at: DateTime<Utc>,
    pub restaurant: Option<String>,
    /// Shared with the turn that scraped it; never mutated.
    pub menu_catalog: Arc<Vec<MenuCatalogEntry>>,
    pub original_request: ParsedOrder,
    pub current_resolution: ResolutionBucketSet,
    /// Turns taken so far.  Monotonic, no upper bound.
    pub attempts: u32,
}

impl ClarificationSession {
    pub fn new(
        restaurant: Option<String>,
        menu_catalog: Arc<Vec<MenuCatalogEntry>>,
        original_request: ParsedOrder,
        resolution: ResolutionBucketSet,
    ) -> Self {
        Self {
            id: SessionId::generate(),
            created_at: Utc::now(),
            restaurant,
            menu_catalog,
            original_request,
            current_resolution: resolution,
            attempts: 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique_and_trimmed() {
        assert_ne!(SessionId::generate(), SessionId::generate());
        assert_eq!(SessionId::from("  abc \n").as_str(), "abc");
    }

    #[test]
    fn state_serializes_in_upper_snake_case() {
        assert_eq!(
            serde_json::to_string(&SessionState::AwaitingClarification).unwrap(),
            "\"AWAITING_CLARIFICATION\""
        );
    }

    #[test]
    fn new_session_starts_at_one_attempt() {
        let session = ClarificationSession::new(
            Some("McDonald's".into()),
            Arc::new(vec![]),
            ParsedOrder::empty(),
            ResolutionBucketSet::default(),
        );
        assert_eq!(session.attempts, 1);
        assert_eq!(serde_json::to_string(&session.id).unwrap().len(), 38);
    }
}
