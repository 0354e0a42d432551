//! TTL- and size-bounded session map.
//!
//! Each session sits behind its own async mutex, so a turn holds the
//! session for its whole read-modify-write while turns for other ids run
//! freely.  Idle sessions expire after `ttl`; when the map is full the
//! least recently used one is evicted.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::config::{SessionConfig, duration_or};
use crate::session::{ClarificationSession, SessionId};

struct SessionEntry {
    session: Arc<Mutex<ClarificationSession>>,
    last_activity: Instant,
}

pub struct SessionStore {
    sessions: DashMap<SessionId, SessionEntry>,
    ttl: Duration,
    max_sessions: usize,
}

impl SessionStore {
    pub fn new(ttl: Duration, max_sessions: usize) -> Self {
        Self {
            sessions: DashMap::new(),
            ttl,
            max_sessions: max_sessions.max(1),
        }
    }

    pub fn from_config(config: &SessionConfig) -> Self {
        Self::new(
            duration_or(&config.ttl, Duration::from_secs(15 * 60)),
            config.max_sessions,
        )
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Store a new session, evicting the least recently used one if full.
    pub fn insert(&self, session: ClarificationSession) -> SessionId {
        while self.sessions.len() >= self.max_sessions {
            match self.least_recently_used() {
                Some(oldest) => {
                    info!(session_id = %oldest, "Session store full, evicting idle session");
                    self.sessions.remove(&oldest);
                }
                None => break,
            }
        }
        let id = session.id.clone();
        self.sessions.insert(
            id.clone(),
            SessionEntry {
                session: Arc::new(Mutex::new(session)),
                last_activity: Instant::now(),
            },
        );
        id
    }

    /// Look up a live session and refresh its activity timestamp.
    ///
    /// Unknown and expired ids both yield `None`; an expired entry is
    /// dropped on the way.
    pub fn get(&self, id: &SessionId) -> Option<Arc<Mutex<ClarificationSession>>> {
        {
            let mut entry = self.sessions.get_mut(id)?;
            if entry.last_activity.elapsed() < self.ttl {
                entry.last_activity = Instant::now();
                return Some(entry.session.clone());
            }
        }
        debug!(session_id = %id, "Session expired");
        self.sessions.remove(id);
        None
    }

    pub fn contains(&self, id: &SessionId) -> bool {
        self.sessions.contains_key(id)
    }

    pub fn touch(&self, id: &SessionId) {
        if let Some(mut entry) = self.sessions.get_mut(id) {
            entry.last_activity = Instant::now();
        }
    }

    pub fn remove(&self, id: &SessionId) -> bool {
        self.sessions.remove(id).is_some()
    }

    /// Drop every expired session that no turn is currently holding.
    /// Returns how many were removed.
    pub fn sweep_expired(&self) -> usize {
        let before = self.sessions.len();
        let ttl = self.ttl;
        self.sessions.retain(|_, entry| {
            entry.last_activity.elapsed() < ttl || Arc::strong_count(&entry.session) > 1
        });
        before.saturating_sub(self.sessions.len())
    }

    fn least_recently_used(&self) -> Option<SessionId> {
        self.sessions
            .iter()
            .min_by_key(|entry| entry.last_activity)
            .map(|entry| entry.key().clone())
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

/// Periodically sweep expired sessions until the task is aborted.
pub fn spawn_sweeper(store: Arc<SessionStore>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let removed = store.sweep_expired();
            if removed > 0 {
                info!(removed, remaining = store.len(), "Swept expired sessions");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::order::{ParsedOrder, ResolutionBucketSet};
    use std::thread;

    fn session() -> ClarificationSession {
        ClarificationSession::new(
            None,
            Arc::new(vec![]),
            ParsedOrder::empty(),
            ResolutionBucketSet::default(),
        )
    }

    #[test]
    fn insert_and_get() {
        let store = SessionStore::new(Duration::from_secs(60), 10);
        let id = store.insert(session());
        assert!(store.get(&id).is_some());
        assert!(store.get(&SessionId::from("nope")).is_none());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn expired_session_is_not_found() {
        let store = SessionStore::new(Duration::from_millis(20), 10);
        let id = store.insert(session());
        thread::sleep(Duration::from_millis(40));
        assert!(store.get(&id).is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn full_store_evicts_least_recently_used() {
        let store = SessionStore::new(Duration::from_secs(60), 2);
        let first = store.insert(session());
        thread::sleep(Duration::from_millis(5));
        let second = store.insert(session());
        thread::sleep(Duration::from_millis(5));
        // Using the first one makes the second the oldest.
        store.touch(&first);
        let third = store.insert(session());

        assert_eq!(store.len(), 2);
        assert!(store.contains(&first));
        assert!(!store.contains(&second));
        assert!(store.contains(&third));
    }

    #[test]
    fn sweep_skips_sessions_in_use() {
        let store = SessionStore::new(Duration::from_millis(10), 10);
        let held = store.insert(session());
        let idle = store.insert(session());
        let handle = store.get(&held).unwrap();
        thread::sleep(Duration::from_millis(30));

        assert_eq!(store.sweep_expired(), 1);
        assert!(store.contains(&held));
        assert!(!store.contains(&idle));
        drop(handle);
        assert_eq!(store.sweep_expired(), 1);
    }

    #[tokio::test]
    async fn sweeper_task_removes_expired() {
        let store = Arc::new(SessionStore::new(Duration::from_millis(10), 10));
        store.insert(session());
        let task = spawn_sweeper(store.clone(), Duration::from_millis(20));
        tokio::time::sleep(Duration::from_millis(100)).await;
        task.abort();
        assert!(store.is_empty());
    }
}
