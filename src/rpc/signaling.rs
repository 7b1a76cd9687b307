// src/rpc/signaling.rs
//! SignalingApi towards the client owning a session. Clients register
//! their callback URL at startup (keyed by connection id); disconnect
//! and low-balance warnings are JSON-RPC calls against that URL.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::info;

use super::client::RpcClient;
use crate::error::SessionError;
use crate::models::Event;
use crate::traits::SignalingApi;

pub struct SignalingRegistry {
    clients: RwLock<HashMap<String, String>>,
    timeout: Duration,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct DisconnectArgs<'a> {
    event: &'a Event,
    reason: &'a str,
}

impl SignalingRegistry {
    pub fn new(timeout: Duration) -> Self {
        SignalingRegistry {
            clients: RwLock::new(HashMap::new()),
            timeout,
        }
    }

    pub async fn register_client(&self, conn_id: &str, url: &str) {
        info!(conn_id, url, "signaling client registered");
        self.clients
            .write()
            .await
            .insert(conn_id.to_string(), url.to_string());
    }

    pub async fn unregister_client(&self, conn_id: &str) -> bool {
        self.clients.write().await.remove(conn_id).is_some()
    }

    async fn client_for(&self, conn_id: &str) -> Result<RpcClient, SessionError> {
        let url = self
            .clients
            .read()
            .await
            .get(conn_id)
            .cloned()
            .ok_or_else(|| {
                SessionError::Internal(format!("no signaling client registered: {}", conn_id))
            })?;
        RpcClient::new(&url, self.timeout)
    }
}

#[async_trait]
impl SignalingApi for SignalingRegistry {
    async fn disconnect_session(
        &self,
        conn_id: &str,
        event: &Event,
        reason: &str,
    ) -> Result<(), SessionError> {
        let client = self.client_for(conn_id).await?;
        let _reply: String = client
            .call("SessionSv1.DisconnectSession", DisconnectArgs { event, reason })
            .await?;
        Ok(())
    }

    async fn warn_session(&self, conn_id: &str, event: &Event) -> Result<(), SessionError> {
        let client = self.client_for(conn_id).await?;
        let _reply: String = client
            .call(
                "SessionSv1.WarnDisconnect",
                DisconnectArgs {
                    event,
                    reason: "LOW_BALANCE",
                },
            )
            .await?;
        Ok(())
    }
}
