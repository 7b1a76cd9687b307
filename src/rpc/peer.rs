// src/rpc/peer.rs
//! PeerApi over JSON-RPC: pushes passive session copies to another
//! engine node.

use std::time::Duration;

use async_trait::async_trait;

use super::client::RpcClient;
use crate::config::ReplicationPeer;
use crate::error::SessionError;
use crate::models::Session;
use crate::traits::PeerApi;

pub struct PeerClient {
    client: RpcClient,
    synchronous: bool,
}

impl PeerClient {
    pub fn new(peer: &ReplicationPeer, timeout: Duration) -> Result<Self, SessionError> {
        Ok(PeerClient {
            client: RpcClient::new(&peer.url, timeout)?,
            synchronous: peer.synchronous,
        })
    }
}

#[async_trait]
impl PeerApi for PeerClient {
    fn peer_id(&self) -> &str {
        self.client.base_url()
    }

    fn is_sync(&self) -> bool {
        self.synchronous
    }

    async fn set_passive_session(&self, session: &Session) -> Result<(), SessionError> {
        let _reply: String = self
            .client
            .call("SessionSv1.SetPassiveSession", session)
            .await
            .map_err(|e| SessionError::Replication(e.to_string()))?;
        Ok(())
    }
}
