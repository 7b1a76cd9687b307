// src/storage/backup_store.rs
//! Redis-backed durable session store. One JSON value per session,
//! keyed `sessions_backup:{node}:{tenant}:{session_id}`, plus a set of
//! ids per (node, tenant) so loading needs no SCAN.

use async_trait::async_trait;
use redis::{aio::ConnectionManager, AsyncCommands, Client};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::SessionError;
use crate::models::Session;
use crate::traits::BackupStore;

const KEY_PREFIX: &str = "sessions_backup";

#[derive(Clone)]
pub struct RedisBackupStore {
    manager: Arc<Mutex<ConnectionManager>>,
}

impl RedisBackupStore {
    pub async fn new(redis_url: &str) -> Result<Self, SessionError> {
        let client = Client::open(redis_url)?;
        let manager = ConnectionManager::new(client).await?;

        // Test connection
        let mut conn = manager.clone();
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;

        Ok(Self {
            manager: Arc::new(Mutex::new(manager)),
        })
    }

    async fn get_connection(&self) -> ConnectionManager {
        self.manager.lock().await.clone()
    }

    fn session_key(node_id: &str, tenant: &str, session_id: &str) -> String {
        format!("{}:{}:{}:{}", KEY_PREFIX, node_id, tenant, session_id)
    }

    fn index_key(node_id: &str, tenant: &str) -> String {
        format!("{}:{}:{}:ids", KEY_PREFIX, node_id, tenant)
    }
}

#[async_trait]
impl BackupStore for RedisBackupStore {
    async fn set_sessions(
        &self,
        node_id: &str,
        tenant: &str,
        sessions: &[Session],
    ) -> Result<(), SessionError> {
        let mut conn = self.get_connection().await;
        for session in sessions {
            let payload = serde_json::to_string(session)
                .map_err(|e| SessionError::Storage(e.to_string()))?;
            let key = Self::session_key(node_id, tenant, &session.session_id);
            debug!("Redis SET: {}", key);
            let _: () = conn.set(&key, payload).await?;
            let _: () = conn
                .sadd(Self::index_key(node_id, tenant), &session.session_id)
                .await?;
        }
        Ok(())
    }

    async fn remove_sessions(
        &self,
        node_id: &str,
        tenant: &str,
        session_id: Option<&str>,
    ) -> Result<(), SessionError> {
        let mut conn = self.get_connection().await;
        match session_id {
            Some(id) => {
                let _: () = conn.del(Self::session_key(node_id, tenant, id)).await?;
                let _: () = conn.srem(Self::index_key(node_id, tenant), id).await?;
            }
            None => {
                let ids: Vec<String> = conn.smembers(Self::index_key(node_id, tenant)).await?;
                for id in ids {
                    let _: () = conn.del(Self::session_key(node_id, tenant, &id)).await?;
                }
                let _: () = conn.del(Self::index_key(node_id, tenant)).await?;
            }
        }
        Ok(())
    }

    async fn load_sessions(
        &self,
        node_id: &str,
        tenant: &str,
    ) -> Result<Vec<Session>, SessionError> {
        let mut conn = self.get_connection().await;
        let ids: Vec<String> = conn.smembers(Self::index_key(node_id, tenant)).await?;

        let mut sessions = Vec::with_capacity(ids.len());
        for id in ids {
            let raw: Option<String> = conn.get(Self::session_key(node_id, tenant, &id)).await?;
            match raw {
                Some(raw) => match serde_json::from_str::<Session>(&raw) {
                    Ok(session) => sessions.push(session),
                    Err(e) => {
                        // corrupt record: skip it rather than refusing the
                        // whole restore
                        warn!(session_id = %id, error = %e,
                            "unreadable backup record skipped");
                    }
                },
                None => {
                    let _: () = conn.srem(Self::index_key(node_id, tenant), &id).await?;
                }
            }
        }
        Ok(sessions)
    }
}
