//! Session store - keep ingested tables between dashboard interactions.
//!
//! Each upload is ingested once and stored under a fresh UUID. Every later
//! interaction re-derives its report from the stored table. Nothing is
//! written to disk; sessions go away on delete, when they outlive the TTL, or
//! when the store is full (oldest first).
//!
//! The lock is held only to look up, insert or remove; the table itself is
//! shared behind an `Arc` so reports are built outside the lock.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

use crate::api::logs::log_info;
use crate::models::ViewSettings;
use crate::transform::IngestedTable;

pub const DEFAULT_MAX_SESSIONS: usize = 64;
pub const DEFAULT_SESSION_TTL_SECS: u64 = 3600;

/// Upper bound for the TTL, keeps the duration representable.
const MAX_TTL_SECS: u64 = 10 * 365 * 24 * 3600;

/// One uploaded file and the settings attached to it.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: String,
    pub file_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub ingested: Arc<IngestedTable>,
    pub view: ViewSettings,
}

/// Listing entry, without the table.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub id: String,
    pub file_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub rows: usize,
}

impl From<&Session> for SessionInfo {
    fn from(session: &Session) -> Self {
        Self {
            id: session.id.clone(),
            file_name: session.file_name.clone(),
            created_at: session.created_at,
            rows: session.ingested.table.len(),
        }
    }
}

/// Bounded in-memory session map.
#[derive(Debug)]
pub struct SessionStore {
    sessions: Mutex<HashMap<String, Session>>,
    max_sessions: usize,
    ttl: Duration,
}

impl SessionStore {
    pub fn new(max_sessions: usize, ttl_secs: u64) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            max_sessions: max_sessions.max(1),
            ttl: Duration::seconds(ttl_secs.min(MAX_TTL_SECS) as i64),
        }
    }

    /// A poisoned lock only means another request panicked mid-operation;
    /// the map itself is still consistent.
    fn lock(&self) -> MutexGuard<'_, HashMap<String, Session>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store a freshly ingested table and return its session.
    pub fn create(&self, ingested: IngestedTable, file_name: Option<String>) -> Session {
        self.create_at(ingested, file_name, Utc::now())
    }

    fn create_at(&self, ingested: IngestedTable, file_name: Option<String>, now: DateTime<Utc>) -> Session {
        let session = Session {
            id: Uuid::new_v4().to_string(),
            file_name,
            created_at: now,
            ingested: Arc::new(ingested),
            view: ViewSettings::default(),
        };

        let mut sessions = self.lock();
        self.purge_expired(&mut sessions, now);

        while sessions.len() >= self.max_sessions {
            let Some(oldest) = sessions
                .values()
                .min_by_key(|s| s.created_at)
                .map(|s| s.id.clone())
            else {
                break;
            };
            sessions.remove(&oldest);
            log_info(format!("Session {} evicted (store full)", oldest));
        }

        sessions.insert(session.id.clone(), session.clone());
        session
    }

    pub fn get(&self, id: &str) -> Option<Session> {
        self.get_at(id, Utc::now())
    }

    fn get_at(&self, id: &str, now: DateTime<Utc>) -> Option<Session> {
        let mut sessions = self.lock();
        self.purge_expired(&mut sessions, now);
        sessions.get(id).cloned()
    }

    /// Replace the view settings of a session, returning the stored value.
    pub fn update_view(&self, id: &str, view: ViewSettings) -> Option<ViewSettings> {
        let mut sessions = self.lock();
        self.purge_expired(&mut sessions, Utc::now());
        let session = sessions.get_mut(id)?;
        session.view = view;
        Some(session.view.clone())
    }

    /// Remove a session; `false` if it did not exist.
    pub fn remove(&self, id: &str) -> bool {
        self.lock().remove(id).is_some()
    }

    /// Live sessions, newest first.
    pub fn list(&self) -> Vec<SessionInfo> {
        let mut sessions = self.lock();
        self.purge_expired(&mut sessions, Utc::now());
        let mut infos: Vec<SessionInfo> = sessions.values().map(SessionInfo::from).collect();
        infos.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        infos
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn purge_expired(&self, sessions: &mut HashMap<String, Session>, now: DateTime<Utc>) {
        let before = sessions.len();
        sessions.retain(|_, s| now - s.created_at <= self.ttl);
        let expired = before - sessions.len();
        if expired > 0 {
            log_info(format!("{} expired session(s) removed", expired));
        }
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_SESSIONS, DEFAULT_SESSION_TTL_SECS)
    }
}
