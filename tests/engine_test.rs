// tests/engine_test.rs
//! Session lifecycle tests against in-process stub collaborators.
//!
//! Run with: cargo test --test engine_test

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tokio::sync::Mutex;

use apolo_session_engine::config::{Config, ReplicationPeer};
use apolo_session_engine::error::SessionError;
use apolo_session_engine::models::event::{fields, opts, request_types};
use apolo_session_engine::models::{CallDescriptor, Event, Session};
use apolo_session_engine::services::SessionEngine;
use apolo_session_engine::traits::{
    BackupStore, BillingRun, CdrApi, DebitReply, PeerApi, RaterApi, ResourceApi, SignalingApi,
};

// ============================================================================
// Stub collaborators
// ============================================================================

#[derive(Default)]
struct StubRater {
    fail_debits: AtomicBool,
    grant_cap: Mutex<Option<Duration>>,
    debits: Mutex<Vec<Duration>>,
    refunds: Mutex<Vec<Duration>>,
}

impl StubRater {
    fn window(cd: &CallDescriptor) -> Duration {
        (cd.time_end - cd.time_start).to_std().unwrap_or(Duration::ZERO)
    }
}

#[async_trait]
impl RaterApi for StubRater {
    async fn billing_runs(
        &self,
        _tenant: &str,
        event: &Event,
    ) -> Result<Vec<BillingRun>, SessionError> {
        Ok(vec![BillingRun {
            run_id: "*default".to_string(),
            event: event.clone(),
        }])
    }

    async fn max_session_time(&self, cd: &CallDescriptor) -> Result<Duration, SessionError> {
        Ok(self
            .grant_cap
            .lock()
            .await
            .unwrap_or_else(|| Self::window(cd)))
    }

    async fn max_debit(&self, cd: &CallDescriptor) -> Result<DebitReply, SessionError> {
        if self.fail_debits.load(Ordering::SeqCst) {
            return Err(SessionError::InsufficientBalance);
        }
        let requested = Self::window(cd);
        let granted = match *self.grant_cap.lock().await {
            Some(cap) => requested.min(cap),
            None => requested,
        };
        self.debits.lock().await.push(granted);
        Ok(DebitReply {
            granted,
            cost: Decimal::try_from(granted.as_secs_f64() * 0.01).unwrap_or_default(),
        })
    }

    async fn debit(&self, cd: &CallDescriptor) -> Result<DebitReply, SessionError> {
        if self.fail_debits.load(Ordering::SeqCst) {
            return Err(SessionError::InsufficientBalance);
        }
        let requested = Self::window(cd);
        self.debits.lock().await.push(requested);
        Ok(DebitReply {
            granted: requested,
            cost: Decimal::try_from(requested.as_secs_f64() * 0.01).unwrap_or_default(),
        })
    }

    async fn refund_increments(
        &self,
        _cd: &CallDescriptor,
        refund: Duration,
    ) -> Result<Decimal, SessionError> {
        self.refunds.lock().await.push(refund);
        Ok(dec!(0.01))
    }

    async fn refund_rounding(&self, _cd: &CallDescriptor) -> Result<(), SessionError> {
        Ok(())
    }
}

#[derive(Default)]
struct StubPeer {
    received: Mutex<Vec<Session>>,
}

#[async_trait]
impl PeerApi for StubPeer {
    fn peer_id(&self) -> &str {
        "stub-peer"
    }

    fn is_sync(&self) -> bool {
        true
    }

    async fn set_passive_session(&self, session: &Session) -> Result<(), SessionError> {
        self.received.lock().await.push(session.clone());
        Ok(())
    }
}

#[derive(Default)]
struct StubSignaling {
    disconnects: Mutex<Vec<(String, String)>>,
    warnings: AtomicUsize,
}

#[async_trait]
impl SignalingApi for StubSignaling {
    async fn disconnect_session(
        &self,
        conn_id: &str,
        _event: &Event,
        reason: &str,
    ) -> Result<(), SessionError> {
        self.disconnects
            .lock()
            .await
            .push((conn_id.to_string(), reason.to_string()));
        Ok(())
    }

    async fn warn_session(&self, _conn_id: &str, _event: &Event) -> Result<(), SessionError> {
        self.warnings.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Default)]
struct StubCdrs {
    cdrs: Mutex<Vec<Event>>,
    releases: Mutex<Vec<String>>,
}

#[async_trait]
impl CdrApi for StubCdrs {
    async fn process_cdr(&self, _tenant: &str, event: &Event) -> Result<(), SessionError> {
        self.cdrs.lock().await.push(event.clone());
        Ok(())
    }
}

#[async_trait]
impl ResourceApi for StubCdrs {
    async fn release_resource(&self, _tenant: &str, usage_id: &str) -> Result<(), SessionError> {
        self.releases.lock().await.push(usage_id.to_string());
        Ok(())
    }
}

#[derive(Default)]
struct MemoryBackupStore {
    records: Mutex<HashMap<(String, String, String), Session>>,
}

#[async_trait]
impl BackupStore for MemoryBackupStore {
    async fn set_sessions(
        &self,
        node_id: &str,
        tenant: &str,
        sessions: &[Session],
    ) -> Result<(), SessionError> {
        let mut records = self.records.lock().await;
        for session in sessions {
            records.insert(
                (
                    node_id.to_string(),
                    tenant.to_string(),
                    session.session_id.clone(),
                ),
                session.clone(),
            );
        }
        Ok(())
    }

    async fn remove_sessions(
        &self,
        node_id: &str,
        tenant: &str,
        session_id: Option<&str>,
    ) -> Result<(), SessionError> {
        let mut records = self.records.lock().await;
        match session_id {
            Some(id) => {
                records.remove(&(node_id.to_string(), tenant.to_string(), id.to_string()));
            }
            None => {
                records.retain(|(n, t, _), _| n != node_id || t != tenant);
            }
        }
        Ok(())
    }

    async fn load_sessions(
        &self,
        node_id: &str,
        tenant: &str,
    ) -> Result<Vec<Session>, SessionError> {
        Ok(self
            .records
            .lock()
            .await
            .iter()
            .filter(|((n, t, _), _)| n == node_id && t == tenant)
            .map(|(_, s)| s.clone())
            .collect())
    }
}

// ============================================================================
// Test harness
// ============================================================================

struct Harness {
    engine: Arc<SessionEngine>,
    rater: Arc<StubRater>,
    peer: Arc<StubPeer>,
    signaling: Arc<StubSignaling>,
    cdrs: Arc<StubCdrs>,
    store: Arc<MemoryBackupStore>,
}

fn test_config() -> Config {
    Config {
        environment: "test".to_string(),
        host: "127.0.0.1".to_string(),
        port: 0,
        node_id: "node-test".to_string(),
        default_tenant: "cgrates.org".to_string(),
        rater_url: String::new(),
        cdrs_url: String::new(),
        redis_url: None,
        replication_peers: vec![ReplicationPeer {
            url: "http://stub-peer".to_string(),
            synchronous: true,
        }],
        session_indexes: vec![fields::ACCOUNT.to_string(), fields::ORIGIN_ID.to_string()],
        session_ttl: None,
        session_ttl_max_delay: None,
        debit_interval: Duration::ZERO,
        min_dur_low_balance: Duration::from_secs(5),
        terminate_attempts: 1,
        backup_interval: Duration::from_secs(60),
        lock_timeout: Duration::from_secs(2),
        reply_timeout: Duration::from_secs(2),
        default_usage: Duration::from_secs(3 * 3600),
    }
}

fn harness() -> Harness {
    let rater = Arc::new(StubRater::default());
    let peer = Arc::new(StubPeer::default());
    let signaling = Arc::new(StubSignaling::default());
    let cdrs = Arc::new(StubCdrs::default());
    let store = Arc::new(MemoryBackupStore::default());
    let engine = SessionEngine::new(
        test_config(),
        rater.clone() as Arc<dyn RaterApi>,
        vec![peer.clone() as Arc<dyn PeerApi>],
        signaling.clone() as Arc<dyn SignalingApi>,
        cdrs.clone() as Arc<dyn CdrApi>,
        cdrs.clone() as Arc<dyn ResourceApi>,
        Some(store.clone() as Arc<dyn BackupStore>),
    );
    Harness {
        engine,
        rater,
        peer,
        signaling,
        cdrs,
        store,
    }
}

fn prepaid_event(origin_id: &str, usage: &str) -> Event {
    let mut event = Event::new();
    event.set_str(fields::TENANT, "cgrates.org");
    event.set_str(fields::ORIGIN_ID, origin_id);
    event.set_str(fields::ORIGIN_HOST, "sbc-test");
    event.set_str(fields::ACCOUNT, "1001");
    event.set_str(fields::DESTINATION, "+5114150707");
    event.set_str(fields::REQUEST_TYPE, request_types::PREPAID);
    event.set_str(fields::USAGE, usage);
    event
}

fn filters(key: &str, value: &str) -> HashMap<String, String> {
    let mut f = HashMap::new();
    f.insert(key.to_string(), value.to_string());
    f
}

// ============================================================================
// Lifecycle
// ============================================================================

#[tokio::test]
async fn test_full_lifecycle() {
    let h = harness();

    let granted = h
        .engine
        .initiate_session(prepaid_event("call-1", "2m"), Event::new())
        .await
        .unwrap();
    assert_eq!(granted, Duration::from_secs(120));
    assert_eq!(
        h.engine
            .session_count(&filters(fields::ACCOUNT, "1001"), false)
            .await,
        1
    );

    // call reports it used only 30s of the charged 2m, asks 1m more
    let mut update = prepaid_event("call-1", "1m");
    update.set_str(fields::LAST_USED, "30s");
    let granted = h.engine.update_session(update).await.unwrap();
    assert_eq!(granted, Duration::from_secs(60));
    // reservation covered the update, no second rater debit
    assert_eq!(h.rater.debits.lock().await.len(), 1);

    let terminate = prepaid_event("call-1", "90s");
    h.engine.terminate_session(terminate).await.unwrap();

    assert_eq!(h.engine.session_count(&HashMap::new(), false).await, 0);
    // refund of the 30s still reserved beyond the 90s actually used
    let sessions = h.engine.get_sessions(&HashMap::new(), false).await;
    assert!(sessions.is_empty());

    // the peer learned about the removal
    let received = h.peer.received.lock().await;
    assert!(received.last().unwrap().is_removal_marker());
}

#[tokio::test]
async fn test_duplicate_initiate_is_rejected() {
    let h = harness();
    h.engine
        .initiate_session(prepaid_event("call-1", "1m"), Event::new())
        .await
        .unwrap();
    let err = h
        .engine
        .initiate_session(prepaid_event("call-1", "1m"), Event::new())
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::Exists));
    // the duplicate left no second session behind
    assert_eq!(h.engine.session_count(&HashMap::new(), false).await, 1);
}

#[tokio::test]
async fn test_terminate_unknown_session() {
    let h = harness();
    let err = h
        .engine
        .terminate_session(prepaid_event("ghost", "1m"))
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::NotFound));
}

#[tokio::test]
async fn test_missing_origin_id_is_rejected() {
    let h = harness();
    let mut event = prepaid_event("x", "1m");
    event.remove(fields::ORIGIN_ID);
    let err = h
        .engine
        .initiate_session(event, Event::new())
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::MandatoryFieldMissing(_)));
}

#[tokio::test]
async fn test_authorize_does_not_register() {
    let h = harness();
    let granted = h
        .engine
        .authorize_event(prepaid_event("call-auth", "2m"), Event::new())
        .await
        .unwrap();
    assert_eq!(granted, Duration::from_secs(120));
    assert_eq!(h.engine.session_count(&HashMap::new(), false).await, 0);
}

#[tokio::test]
async fn test_authorize_caps_at_affordable_time() {
    let h = harness();
    *h.rater.grant_cap.lock().await = Some(Duration::from_secs(45));
    let granted = h
        .engine
        .authorize_event(prepaid_event("call-auth", "2m"), Event::new())
        .await
        .unwrap();
    assert_eq!(granted, Duration::from_secs(45));
}

#[tokio::test]
async fn test_process_message_is_one_shot() {
    let h = harness();
    let granted = h
        .engine
        .process_message(prepaid_event("msg-1", "30s"), Event::new())
        .await
        .unwrap();
    assert_eq!(granted, Duration::from_secs(30));
    assert_eq!(h.rater.debits.lock().await.len(), 1);
    assert_eq!(h.engine.session_count(&HashMap::new(), false).await, 0);
}

#[tokio::test]
async fn test_terminate_refunds_overcharge() {
    let h = harness();
    h.engine
        .initiate_session(prepaid_event("call-1", "2m"), Event::new())
        .await
        .unwrap();

    // only 1m was actually used of the 2m charged
    h.engine
        .terminate_session(prepaid_event("call-1", "1m"))
        .await
        .unwrap();

    let refunds = h.rater.refunds.lock().await;
    assert_eq!(refunds.as_slice(), &[Duration::from_secs(60)]);
}

#[tokio::test]
async fn test_terminate_debits_undercharge() {
    let h = harness();
    h.engine
        .initiate_session(prepaid_event("call-1", "1m"), Event::new())
        .await
        .unwrap();

    h.engine
        .terminate_session(prepaid_event("call-1", "90s"))
        .await
        .unwrap();

    let debits = h.rater.debits.lock().await;
    // initial 1m plus the missing 30s at the end
    assert_eq!(debits.as_slice(), &[Duration::from_secs(60), Duration::from_secs(30)]);
}

// ============================================================================
// Debit loop
// ============================================================================

#[tokio::test]
async fn test_debit_loop_charges_intervals() {
    let h = harness();
    let mut opts_map = Event::new();
    opts_map.set_str(opts::DEBIT_INTERVAL, "50ms");

    let granted = h
        .engine
        .initiate_session(prepaid_event("call-loop", "1m"), opts_map)
        .await
        .unwrap();
    assert_eq!(granted, Duration::from_millis(50));

    tokio::time::sleep(Duration::from_millis(140)).await;
    assert!(h.rater.debits.lock().await.len() >= 2);

    h.engine
        .terminate_session(prepaid_event("call-loop", "150ms"))
        .await
        .unwrap();
    // loop stopped with the session
    let after = h.rater.debits.lock().await.len();
    tokio::time::sleep(Duration::from_millis(120)).await;
    assert_eq!(h.rater.debits.lock().await.len(), after);
}

#[tokio::test]
async fn test_debit_failure_disconnects_and_terminates() {
    let h = harness();
    h.rater.fail_debits.store(true, Ordering::SeqCst);

    let mut opts_map = Event::new();
    opts_map.set_str(opts::DEBIT_INTERVAL, "30ms");
    opts_map.set_str(opts::CLIENT_CONN_ID, "conn-1");

    h.engine
        .initiate_session(prepaid_event("call-broke", "1m"), opts_map)
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(150)).await;

    assert_eq!(h.engine.session_count(&HashMap::new(), false).await, 0);
    let disconnects = h.signaling.disconnects.lock().await;
    assert!(!disconnects.is_empty());
    assert_eq!(disconnects[0].0, "conn-1");
    // the forced termination posted the CDR the client never will
    assert_eq!(h.cdrs.cdrs.lock().await.len(), 1);
}

#[tokio::test]
async fn test_exhausted_balance_disconnects_before_terminating() {
    let h = harness();
    *h.rater.grant_cap.lock().await = Some(Duration::from_millis(10));

    let mut opts_map = Event::new();
    opts_map.set_str(opts::DEBIT_INTERVAL, "40ms");
    opts_map.set_str(opts::CLIENT_CONN_ID, "conn-low");

    h.engine
        .initiate_session(prepaid_event("call-low", "1m"), opts_map)
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(200)).await;

    assert_eq!(h.engine.session_count(&HashMap::new(), false).await, 0);
    // the client was warned, then ordered to hang up before the
    // forced termination
    assert!(h.signaling.warnings.load(Ordering::SeqCst) >= 1);
    let disconnects = h.signaling.disconnects.lock().await;
    assert!(disconnects
        .iter()
        .any(|(conn, reason)| conn == "conn-low" && reason == "INSUFFICIENT_FUNDS"));
}

// ============================================================================
// TTL terminator
// ============================================================================

#[tokio::test]
async fn test_ttl_expiry_terminates_session() {
    let h = harness();
    let mut opts_map = Event::new();
    opts_map.set_str(opts::SESSION_TTL, "60ms");

    h.engine
        .initiate_session(prepaid_event("call-ttl", "1m"), opts_map)
        .await
        .unwrap();
    assert_eq!(h.engine.session_count(&HashMap::new(), false).await, 1);

    tokio::time::sleep(Duration::from_millis(150)).await;

    assert_eq!(h.engine.session_count(&HashMap::new(), false).await, 0);
    let cdrs = h.cdrs.cdrs.lock().await;
    assert_eq!(cdrs.len(), 1);
    assert_eq!(
        cdrs[0].get_str(fields::DISCONNECT_CAUSE).as_deref(),
        Some("SESSION_TTL_EXPIRED")
    );
}

#[tokio::test]
async fn test_update_rearms_ttl() {
    let h = harness();
    let mut opts_map = Event::new();
    opts_map.set_str(opts::SESSION_TTL, "80ms");

    h.engine
        .initiate_session(prepaid_event("call-ttl", "1m"), opts_map)
        .await
        .unwrap();

    // keep touching the session before the deadline
    for _ in 0..3 {
        tokio::time::sleep(Duration::from_millis(50)).await;
        h.engine
            .update_session(prepaid_event("call-ttl", "10s"))
            .await
            .unwrap();
    }
    assert_eq!(h.engine.session_count(&HashMap::new(), false).await, 1);

    tokio::time::sleep(Duration::from_millis(160)).await;
    assert_eq!(h.engine.session_count(&HashMap::new(), false).await, 0);
}

// ============================================================================
// Replication, promotion, relocation
// ============================================================================

#[tokio::test]
async fn test_passive_promotion_on_update() {
    let h = harness();

    // build a real session on a scratch engine, ship it over as passive
    let donor = harness();
    donor
        .engine
        .initiate_session(prepaid_event("call-ha", "2m"), Event::new())
        .await
        .unwrap();
    let snapshot = donor.peer.received.lock().await.last().unwrap().clone();

    h.engine.set_passive_session(snapshot).await.unwrap();
    assert_eq!(h.engine.session_count(&HashMap::new(), true).await, 1);
    assert_eq!(h.engine.session_count(&HashMap::new(), false).await, 0);

    // first touch promotes
    h.engine
        .update_session(prepaid_event("call-ha", "30s"))
        .await
        .unwrap();
    assert_eq!(h.engine.session_count(&HashMap::new(), true).await, 0);
    assert_eq!(h.engine.session_count(&HashMap::new(), false).await, 1);
}

#[tokio::test]
async fn test_passive_removal_marker() {
    let h = harness();
    let donor = harness();
    donor
        .engine
        .initiate_session(prepaid_event("call-ha", "1m"), Event::new())
        .await
        .unwrap();
    let snapshot = donor.peer.received.lock().await.last().unwrap().clone();
    let session_id = snapshot.session_id.clone();

    h.engine.set_passive_session(snapshot).await.unwrap();
    h.engine
        .set_passive_session(Session::removal_marker(&session_id, "cgrates.org"))
        .await
        .unwrap();
    assert_eq!(h.engine.session_count(&HashMap::new(), true).await, 0);

    // removing again reports not found
    let err = h
        .engine
        .set_passive_session(Session::removal_marker(&session_id, "cgrates.org"))
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::NotFound));
}

#[tokio::test]
async fn test_passive_upsert_clears_active_copy() {
    let h = harness();
    h.engine
        .initiate_session(prepaid_event("call-1", "1m"), Event::new())
        .await
        .unwrap();
    let active = h.engine.get_sessions(&HashMap::new(), false).await;
    let session_id = active[0].session_id.clone();

    let donor = harness();
    donor
        .engine
        .initiate_session(prepaid_event("call-1", "1m"), Event::new())
        .await
        .unwrap();
    let snapshot = donor.peer.received.lock().await.last().unwrap().clone();
    assert_eq!(snapshot.session_id, session_id);

    h.engine.set_passive_session(snapshot).await.unwrap();
    assert_eq!(h.engine.session_count(&HashMap::new(), false).await, 0);
    assert_eq!(h.engine.session_count(&HashMap::new(), true).await, 1);
}

#[tokio::test]
async fn test_replicate_unknown_id_pushes_removal() {
    let h = harness();
    let pushed = h
        .engine
        .replicate_sessions(&["ghost-id".to_string()], false)
        .await
        .unwrap();
    assert_eq!(pushed, 1);

    let received = h.peer.received.lock().await;
    assert_eq!(received.len(), 1);
    assert!(received[0].is_removal_marker());
    assert_eq!(received[0].session_id, "ghost-id");
}

#[tokio::test]
async fn test_relocation() {
    let h = harness();
    h.engine
        .initiate_session(prepaid_event("call-old", "2m"), Event::new())
        .await
        .unwrap();

    let mut update = prepaid_event("call-new", "30s");
    update.set_str(fields::INITIAL_ORIGIN_ID, "call-old");
    h.engine.update_session(update).await.unwrap();

    assert_eq!(h.engine.session_count(&HashMap::new(), false).await, 1);
    let (old, new) = (
        h.engine
            .session_count(&filters(fields::ORIGIN_ID, "call-old"), false)
            .await,
        h.engine
            .session_count(&filters(fields::ORIGIN_ID, "call-new"), false)
            .await,
    );
    assert_eq!(old, 0);
    assert_eq!(new, 1);

    // terminate through the new id settles the same session
    h.engine
        .terminate_session(prepaid_event("call-new", "1m"))
        .await
        .unwrap();
    assert_eq!(h.engine.session_count(&HashMap::new(), false).await, 0);
}

#[tokio::test]
async fn test_relocation_drops_old_copy_at_peers() {
    let h = harness();
    h.engine
        .initiate_session(prepaid_event("call-old", "2m"), Event::new())
        .await
        .unwrap();
    let old_id = h.peer.received.lock().await.last().unwrap().session_id.clone();

    let mut update = prepaid_event("call-new", "30s");
    update.set_str(fields::INITIAL_ORIGIN_ID, "call-old");
    h.engine.update_session(update).await.unwrap();

    let new_id = apolo_session_engine::models::session::session_id("sbc-test", "call-new");
    let received = h.peer.received.lock().await;
    // peers drop the stale copy of the old id and learn the new one
    assert!(received
        .iter()
        .any(|s| s.is_removal_marker() && s.session_id == old_id));
    assert!(received
        .iter()
        .any(|s| !s.is_removal_marker() && s.session_id == new_id));
}

// ============================================================================
// Backup and restore
// ============================================================================

#[tokio::test]
async fn test_backup_and_restore() {
    let h = harness();
    h.engine
        .initiate_session(prepaid_event("call-1", "1m"), Event::new())
        .await
        .unwrap();
    h.engine
        .initiate_session(prepaid_event("call-2", "1m"), Event::new())
        .await
        .unwrap();

    let stored = h.engine.backup_active_sessions().await.unwrap();
    assert_eq!(stored, 2);

    // a fresh node sharing the store picks the sessions back up
    let rater = Arc::new(StubRater::default());
    let signaling = Arc::new(StubSignaling::default());
    let cdrs = Arc::new(StubCdrs::default());
    let engine2 = SessionEngine::new(
        test_config(),
        rater as Arc<dyn RaterApi>,
        Vec::new(),
        signaling as Arc<dyn SignalingApi>,
        cdrs.clone() as Arc<dyn CdrApi>,
        cdrs as Arc<dyn ResourceApi>,
        Some(h.store.clone() as Arc<dyn BackupStore>),
    );
    let restored = engine2.restore_sessions().await.unwrap();
    assert_eq!(restored, 2);
    assert_eq!(engine2.session_count(&HashMap::new(), false).await, 2);
}

#[tokio::test]
async fn test_backup_restore_non_default_tenant() {
    let h = harness();
    let mut event = prepaid_event("call-t", "1m");
    event.set_str(fields::TENANT, "other.org");
    h.engine.initiate_session(event, Event::new()).await.unwrap();

    assert_eq!(h.engine.backup_active_sessions().await.unwrap(), 1);

    // a restarted node gets the foreign-tenant session back too
    let rater = Arc::new(StubRater::default());
    let signaling = Arc::new(StubSignaling::default());
    let cdrs = Arc::new(StubCdrs::default());
    let engine2 = SessionEngine::new(
        test_config(),
        rater as Arc<dyn RaterApi>,
        Vec::new(),
        signaling as Arc<dyn SignalingApi>,
        cdrs.clone() as Arc<dyn CdrApi>,
        cdrs as Arc<dyn ResourceApi>,
        Some(h.store.clone() as Arc<dyn BackupStore>),
    );
    assert_eq!(engine2.restore_sessions().await.unwrap(), 1);
    let sessions = engine2.get_sessions(&HashMap::new(), false).await;
    assert_eq!(sessions[0].tenant, "other.org");
}

#[tokio::test]
async fn test_terminate_removes_backup_record() {
    let h = harness();
    h.engine
        .initiate_session(prepaid_event("call-1", "1m"), Event::new())
        .await
        .unwrap();
    h.engine.backup_active_sessions().await.unwrap();
    assert_eq!(h.store.records.lock().await.len(), 1);

    h.engine
        .terminate_session(prepaid_event("call-1", "1m"))
        .await
        .unwrap();
    // removal is flushed with the next incremental backup run; force it
    // through the on-demand full backup of the (now empty) table
    h.engine.backup_active_sessions().await.unwrap();
    assert!(h.store.records.lock().await.is_empty());
}
