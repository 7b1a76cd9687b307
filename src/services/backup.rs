// src/services/backup.rs
//! Durable session backup: incremental marks flushed on an interval,
//! full on-demand stores and the restore-on-start path, as further
//! methods on `SessionEngine`.
//!
//! Records are keyed `(node_id, default_tenant, session_id)` no matter
//! which tenant a session carries, so restore never has to guess which
//! tenants the node served before it went down.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::engine::SessionEngine;
use super::registry::SessionEntry;
use crate::error::SessionError;

impl SessionEngine {
    fn backup_enabled(&self) -> bool {
        self.backup_store.is_some() && !self.cfg.backup_interval.is_zero()
    }

    /// Remembers the session for the next incremental backup run.
    pub(super) async fn mark_for_backup(&self, session_id: &str) {
        if !self.backup_enabled() {
            return;
        }
        let mut pending = self.backup_marks.pending.write().await;
        if !pending.iter().any(|id| id == session_id) {
            pending.push(session_id.to_string());
        }
    }

    pub(super) async fn mark_entry_for_backup(&self, entry: &Arc<SessionEntry>) {
        if !self.backup_enabled() {
            return;
        }
        let session_id = entry.session.read().await.session_id.clone();
        self.mark_for_backup(&session_id).await;
    }

    /// Remembers a terminated session so its stored record disappears
    /// on the next backup run.
    pub(super) async fn mark_for_removal(&self, session_id: &str) {
        if !self.backup_enabled() {
            return;
        }
        self.backup_marks
            .pending
            .write()
            .await
            .retain(|id| id != session_id);
        let mut to_remove = self.backup_marks.to_remove.write().await;
        if !to_remove.iter().any(|id| id == session_id) {
            to_remove.push(session_id.to_string());
        }
    }

    /// Flushes the marked sessions and removals to the store.
    pub(super) async fn store_marked_sessions(&self) -> Result<(), SessionError> {
        let Some(store) = self.backup_store.clone() else {
            return Ok(());
        };
        let pending = std::mem::take(&mut *self.backup_marks.pending.write().await);
        let to_remove = std::mem::take(&mut *self.backup_marks.to_remove.write().await);

        let mut sessions = Vec::new();
        for id in pending {
            if let Some(entry) = self.registry.get(&id, false).await {
                sessions.push(entry.session.read().await.clone());
            }
        }
        if !sessions.is_empty() {
            store
                .set_sessions(&self.cfg.node_id, &self.cfg.default_tenant, &sessions)
                .await?;
        }
        for id in to_remove {
            store
                .remove_sessions(&self.cfg.node_id, &self.cfg.default_tenant, Some(&id))
                .await?;
        }
        Ok(())
    }

    /// Stores every active session, replacing the node's stored set.
    /// Returns how many sessions were written.
    pub async fn backup_active_sessions(&self) -> Result<usize, SessionError> {
        let Some(store) = self.backup_store.clone() else {
            return Err(SessionError::Storage(
                "no backup store configured".to_string(),
            ));
        };
        let mut sessions = Vec::new();
        for entry in self.registry.table(false).entries().await {
            sessions.push(entry.session.read().await.clone());
        }
        // full backups replace the stored set, a drained table included
        store
            .remove_sessions(&self.cfg.node_id, &self.cfg.default_tenant, None)
            .await?;
        if !sessions.is_empty() {
            store
                .set_sessions(&self.cfg.node_id, &self.cfg.default_tenant, &sessions)
                .await?;
        }
        Ok(sessions.len())
    }

    /// Rehydrates the active table from the store. Every stored session
    /// comes back active with its terminator and debit loops re-armed;
    /// sessions whose TTL elapsed while the node was down are restored
    /// too and terminate through the normal terminator path.
    pub async fn restore_sessions(&self) -> Result<usize, SessionError> {
        let Some(store) = self.backup_store.clone() else {
            return Ok(0);
        };
        let sessions = store
            .load_sessions(&self.cfg.node_id, &self.cfg.default_tenant)
            .await?;
        let mut restored = 0;
        for session in sessions {
            let entry = self.registry.register(session.clone(), false).await;
            if session.wants_debit_loop() {
                self.start_debit_loops(&entry).await;
            }
            self.arm_terminator(&entry, &session).await;
            restored += 1;
        }
        if restored > 0 {
            info!(count = restored, "💾 restored sessions from backup");
        }
        Ok(restored)
    }

    /// Background loop flushing incremental marks every interval. On
    /// shutdown a final full backup is taken before returning.
    pub async fn run_backup_loop(self: Arc<Self>, stop: CancellationToken) {
        if !self.backup_enabled() {
            return;
        }
        info!(interval = ?self.cfg.backup_interval, "backup loop started");
        loop {
            tokio::select! {
                _ = stop.cancelled() => {
                    match self.backup_active_sessions().await {
                        Ok(count) => info!(count, "final backup stored on shutdown"),
                        Err(e) => error!(error = %e, "final backup failed"),
                    }
                    return;
                }
                _ = tokio::time::sleep(self.cfg.backup_interval) => {
                    if let Err(e) = self.store_marked_sessions().await {
                        warn!(error = %e, "incremental backup failed");
                    }
                }
            }
        }
    }
}
