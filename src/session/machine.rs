//! Clarification state machine.
//!
//! ```text
//! NEW ──resolve──► AWAITING_CLARIFICATION ──resolve──► AWAITING_CLARIFICATION
//!  │                        │
//!  └── all confident ───────┴── all confident ──► RESOLVED (session deleted)
//! ```

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info};

use crate::order::{MenuCatalogEntry, ParsedOrder, ResolutionBucketSet};
use crate::resolution::ResolutionEngine;
use crate::session::{ClarificationSession, SessionId, SessionState, SessionStore};

/// Result of one dialogue turn.
#[derive(Debug, Clone, Serialize)]
pub struct TurnOutcome {
    pub resolution: ResolutionBucketSet,
    /// Present only while the dialogue awaits clarification.
    pub session_id: Option<SessionId>,
    pub state: SessionState,
    pub attempts: u32,
    pub restaurant: Option<String>,
}

pub struct ClarificationMachine {
    store: Arc<SessionStore>,
    engine: Arc<ResolutionEngine>,
}

impl ClarificationMachine {
    pub fn new(store: Arc<SessionStore>, engine: Arc<ResolutionEngine>) -> Self {
        Self { store, engine }
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    /// First resolution of an order (state NEW).
    pub async fn start(
        &self,
        parsed: &ParsedOrder,
        restaurant: Option<String>,
        catalog: Arc<Vec<MenuCatalogEntry>>,
        utterance: &str,
    ) -> TurnOutcome {
        let resolution = self
            .engine
            .resolve(parsed, &catalog, None, Some(utterance))
            .await;

        if !resolution.needs_followup() {
            return TurnOutcome {
                resolution,
                session_id: None,
                state: SessionState::Resolved,
                attempts: 1,
                restaurant,
            };
        }

        let session = ClarificationSession::new(
            restaurant.clone(),
            catalog,
            parsed.clone(),
            resolution.clone(),
        );
        let id = self.store.insert(session);
        info!(session_id = %id, summary = ?resolution.summary(), "Awaiting clarification");
        TurnOutcome {
            resolution,
            session_id: Some(id),
            state: SessionState::AwaitingClarification,
            attempts: 1,
            restaurant,
        }
    }

    /// Apply a follow-up utterance to an open session.
    ///
    /// Returns `None` when `id` is unknown or expired; the caller then
    /// treats the utterance as a new order.  The session stays locked for
    /// the whole turn.
    pub async fn resume(
        &self,
        id: &SessionId,
        parsed: &ParsedOrder,
        utterance: &str,
    ) -> Option<TurnOutcome> {
        let handle = self.store.get(id)?;
        let mut session = handle.lock().await;
        // A concurrent turn may have resolved the session while we waited.
        if !self.store.contains(id) {
            debug!(session_id = %id, "Session closed while waiting for its lock");
            return None;
        }

        let resolution = self
            .engine
            .resolve(
                parsed,
                &session.menu_catalog,
                Some(&session.current_resolution),
                Some(utterance),
            )
            .await;
        session.attempts += 1;

        if resolution.needs_followup() {
            session.current_resolution = resolution.clone();
            self.store.touch(id);
            info!(
                session_id = %id,
                attempts = session.attempts,
                summary = ?resolution.summary(),
                "Still awaiting clarification"
            );
            return Some(TurnOutcome {
                resolution,
                session_id: Some(id.clone()),
                state: SessionState::AwaitingClarification,
                attempts: session.attempts,
                restaurant: session.restaurant.clone(),
            });
        }

        self.store.remove(id);
        info!(session_id = %id, attempts = session.attempts, "Order resolved");
        Some(TurnOutcome {
            resolution,
            session_id: None,
            state: SessionState::Resolved,
            attempts: session.attempts,
            restaurant: session.restaurant.clone(),
        })
    }
}
