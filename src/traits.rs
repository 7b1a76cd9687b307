// src/traits.rs
//! Seams towards every remote collaborator of the engine. Production
//! implementations live under `rpc/` and `storage/`; tests plug in
//! programmable stubs.

use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::SessionError;
use crate::models::event::duration_ns;
use crate::models::{CallDescriptor, Event, Session};

/// One derived billing run as resolved by the charger service.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct BillingRun {
    #[serde(rename = "RunID")]
    pub run_id: String,
    pub event: Event,
}

/// Reply to a debit request: what was granted and at what cost.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DebitReply {
    #[serde(with = "duration_ns")]
    pub granted: Duration,
    pub cost: Decimal,
}

/// Rating engine and charger surface.
#[async_trait]
pub trait RaterApi: Send + Sync {
    /// Resolves the billing runs derived from a start event.
    async fn billing_runs(&self, tenant: &str, event: &Event)
        -> Result<Vec<BillingRun>, SessionError>;

    /// Maximum usage the account can afford for this descriptor.
    async fn max_session_time(&self, cd: &CallDescriptor) -> Result<Duration, SessionError>;

    /// Debit up to the descriptor window, granting possibly less.
    async fn max_debit(&self, cd: &CallDescriptor) -> Result<DebitReply, SessionError>;

    /// Debit exactly the descriptor window or fail.
    async fn debit(&self, cd: &CallDescriptor) -> Result<DebitReply, SessionError>;

    /// Return already-debited increments (over-charge settlement).
    async fn refund_increments(
        &self,
        cd: &CallDescriptor,
        refund: Duration,
    ) -> Result<Decimal, SessionError>;

    /// Return the rounding remainder of the final cost.
    async fn refund_rounding(&self, cd: &CallDescriptor) -> Result<(), SessionError>;
}

/// A replication peer accepting passive session pushes.
#[async_trait]
pub trait PeerApi: Send + Sync {
    fn peer_id(&self) -> &str;
    fn is_sync(&self) -> bool;
    async fn set_passive_session(&self, session: &Session) -> Result<(), SessionError>;
}

/// CDR server surface.
#[async_trait]
pub trait CdrApi: Send + Sync {
    async fn process_cdr(&self, tenant: &str, event: &Event) -> Result<(), SessionError>;
}

/// Resource allocator surface (release on terminate).
#[async_trait]
pub trait ResourceApi: Send + Sync {
    async fn release_resource(&self, tenant: &str, usage_id: &str) -> Result<(), SessionError>;
}

/// Callbacks towards the signaling client that owns a session.
#[async_trait]
pub trait SignalingApi: Send + Sync {
    /// Orders the client to tear the call down.
    async fn disconnect_session(
        &self,
        conn_id: &str,
        event: &Event,
        reason: &str,
    ) -> Result<(), SessionError>;

    /// Warns the client that the account balance is running out.
    async fn warn_session(&self, conn_id: &str, event: &Event) -> Result<(), SessionError>;
}

/// Durable backup store keyed by (node, tenant, session id).
#[async_trait]
pub trait BackupStore: Send + Sync {
    async fn set_sessions(
        &self,
        node_id: &str,
        tenant: &str,
        sessions: &[Session],
    ) -> Result<(), SessionError>;

    /// Removes one stored session, or every session of the tenant when
    /// `session_id` is `None`.
    async fn remove_sessions(
        &self,
        node_id: &str,
        tenant: &str,
        session_id: Option<&str>,
    ) -> Result<(), SessionError>;

    async fn load_sessions(
        &self,
        node_id: &str,
        tenant: &str,
    ) -> Result<Vec<Session>, SessionError>;
}
