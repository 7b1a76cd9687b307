// src/services/registry.rs
//! Active and passive session tables. Each table pairs its map with a
//! field index; per-session state (the session record, the debit stop
//! token, the terminator handle) lives behind its own locks inside the
//! shared `SessionEntry`, so table locks are never held across slow
//! operations.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::index::SessionIndex;
use super::terminator::TerminatorHandle;
use crate::models::Session;

/// A registered session plus its concurrency companions. The table
/// hands out `Arc`s; callers lock `session` themselves and must not
/// hold a table lock while doing so.
pub struct SessionEntry {
    pub session: RwLock<Session>,
    debit_stop: Mutex<Option<CancellationToken>>,
    terminator: Mutex<Option<TerminatorHandle>>,
}

impl SessionEntry {
    fn new(session: Session) -> Self {
        SessionEntry {
            session: RwLock::new(session),
            debit_stop: Mutex::new(None),
            terminator: Mutex::new(None),
        }
    }

    /// Installs the stop token for this session's debit loops,
    /// cancelling any previous one.
    pub async fn set_debit_stop(&self, token: CancellationToken) {
        let mut slot = self.debit_stop.lock().await;
        if let Some(old) = slot.replace(token) {
            old.cancel();
        }
    }

    pub async fn cancel_debit_loop(&self) {
        if let Some(token) = self.debit_stop.lock().await.take() {
            token.cancel();
        }
    }

    /// True while a debit loop is attached and not yet cancelled.
    pub async fn has_debit_loop(&self) -> bool {
        self.debit_stop.lock().await.is_some()
    }

    /// Installs a terminator handle, cancelling any previous task so a
    /// re-registered session never ends up with two terminators.
    pub async fn set_terminator(&self, handle: TerminatorHandle) {
        let mut slot = self.terminator.lock().await;
        if let Some(old) = slot.replace(handle) {
            old.cancel();
        }
    }

    /// Re-arms the live terminator; returns false when none is armed.
    pub async fn rearm_terminator(&self, schedule: super::terminator::TtlSchedule) -> bool {
        match self.terminator.lock().await.as_ref() {
            Some(handle) => {
                handle.rearm(schedule);
                true
            }
            None => false,
        }
    }

    pub async fn cancel_terminator(&self) {
        if let Some(handle) = self.terminator.lock().await.take() {
            handle.cancel();
        }
    }
}

pub struct SessionTable {
    sessions: RwLock<HashMap<String, Arc<SessionEntry>>>,
    pub index: SessionIndex,
}

impl SessionTable {
    fn new(index_keys: Vec<String>) -> Self {
        SessionTable {
            sessions: RwLock::new(HashMap::new()),
            index: SessionIndex::new(index_keys),
        }
    }

    pub async fn get(&self, session_id: &str) -> Option<Arc<SessionEntry>> {
        self.sessions.read().await.get(session_id).cloned()
    }

    pub async fn contains(&self, session_id: &str) -> bool {
        self.sessions.read().await.contains_key(session_id)
    }

    pub async fn ids(&self) -> Vec<String> {
        self.sessions.read().await.keys().cloned().collect()
    }

    pub async fn count(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn entries(&self) -> Vec<Arc<SessionEntry>> {
        self.sessions.read().await.values().cloned().collect()
    }
}

pub struct SessionRegistry {
    active: SessionTable,
    passive: SessionTable,
}

impl SessionRegistry {
    pub fn new(index_keys: Vec<String>) -> Self {
        SessionRegistry {
            active: SessionTable::new(index_keys.clone()),
            passive: SessionTable::new(index_keys),
        }
    }

    pub fn table(&self, passive: bool) -> &SessionTable {
        if passive {
            &self.passive
        } else {
            &self.active
        }
    }

    /// Registers (or replaces) a session. A replaced entry is fully
    /// unregistered first so its index entries and background tasks do
    /// not leak.
    pub async fn register(&self, mut session: Session, passive: bool) -> Arc<SessionEntry> {
        session.updated_at = chrono::Utc::now();
        let session_id = session.session_id.clone();
        if self.table(passive).contains(&session_id).await {
            self.unregister(&session_id, passive).await;
        }
        debug!(session_id = %session_id, passive, "registering session");

        let table = self.table(passive);
        table.index.index_session(&session).await;
        let entry = Arc::new(SessionEntry::new(session));
        table
            .sessions
            .write()
            .await
            .insert(session_id, entry.clone());
        entry
    }

    /// Removes the session from the table and index; for active
    /// sessions also stops the debit loop and the terminator. Returns
    /// the removed entry so the caller can still settle it.
    pub async fn unregister(&self, session_id: &str, passive: bool) -> Option<Arc<SessionEntry>> {
        let table = self.table(passive);
        let entry = table.sessions.write().await.remove(session_id)?;
        table.index.unindex_session(session_id).await;
        if !passive {
            entry.cancel_debit_loop().await;
            entry.cancel_terminator().await;
        }
        debug!(session_id = %session_id, passive, "unregistered session");
        Some(entry)
    }

    pub async fn get(&self, session_id: &str, passive: bool) -> Option<Arc<SessionEntry>> {
        self.table(passive).get(session_id).await
    }
}
