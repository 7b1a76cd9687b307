// src/services/replicator.rs
//! Active/passive replication towards configured peer nodes, as
//! further methods on `SessionEngine`.

use tracing::{debug, error, warn};

use super::engine::SessionEngine;
use crate::error::SessionError;
use crate::models::Session;

impl SessionEngine {
    /// Pushes a snapshot of the session to every peer. An id with no
    /// local copy becomes a removal order so peers drop stale state.
    /// Sessions with a live debit loop are skipped: their charging
    /// state changes every interval and only the settled terminal
    /// state is worth shipping.
    pub(super) async fn replicate_session(&self, session_id: &str, passive: bool) {
        if self.peers.is_empty() {
            return;
        }
        let Some(entry) = self.registry.get(session_id, passive).await else {
            self.push_to_peers(Session::removal_marker(session_id, &self.cfg.default_tenant))
                .await;
            return;
        };
        if !passive && entry.has_debit_loop().await {
            debug!(session_id = %session_id, "skipping replication of debit-loop session");
            return;
        }
        let snapshot = entry.session.read().await.clone();
        self.push_to_peers(snapshot).await;
    }

    /// Orders every peer to drop its passive copy of the session.
    pub(super) async fn replicate_removal(&self, session_id: &str, tenant: &str) {
        if self.peers.is_empty() {
            return;
        }
        self.push_to_peers(Session::removal_marker(session_id, tenant))
            .await;
    }

    /// Replicates a set of sessions on demand; `session_ids` empty
    /// means the whole table. Returns how many sessions were pushed.
    pub async fn replicate_sessions(
        &self,
        session_ids: &[String],
        passive: bool,
    ) -> Result<usize, SessionError> {
        if self.peers.is_empty() {
            return Err(SessionError::Replication(
                "no replication peers configured".to_string(),
            ));
        }
        let ids = if session_ids.is_empty() {
            self.registry.table(passive).ids().await
        } else {
            session_ids.to_vec()
        };
        let mut pushed = 0;
        for id in &ids {
            match self.registry.get(id, passive).await {
                Some(entry) => {
                    let snapshot = entry.session.read().await.clone();
                    self.push_to_peers(snapshot).await;
                }
                // unknown id: order the peers to drop their copy
                None => {
                    self.push_to_peers(Session::removal_marker(id, &self.cfg.default_tenant))
                        .await;
                }
            }
            pushed += 1;
        }
        Ok(pushed)
    }

    /// Synchronous peers are awaited so the caller knows the copy
    /// landed; asynchronous ones are fire-and-forget.
    async fn push_to_peers(&self, session: Session) {
        for peer in &self.peers {
            if peer.is_sync() {
                if let Err(e) = peer.set_passive_session(&session).await {
                    error!(peer = peer.peer_id(), session_id = %session.session_id,
                        error = %e, "sync replication failed");
                }
            } else {
                let peer = peer.clone();
                let session = session.clone();
                tokio::spawn(async move {
                    if let Err(e) = peer.set_passive_session(&session).await {
                        warn!(peer = peer.peer_id(), session_id = %session.session_id,
                            error = %e, "async replication failed");
                    }
                });
            }
        }
    }
}
