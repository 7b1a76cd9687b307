// src/services/engine.rs
//! SessionEngine: the orchestrator behind every session API. Builds
//! sessions from billing runs, owns the registry, and coordinates the
//! debit loops, terminators, replication and backup implemented in the
//! sibling modules.

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::RwLock;
use tracing::{error, info, instrument, warn};

use crate::config::Config;
use crate::error::SessionError;
use crate::models::event::{fields, opts, request_types};
use crate::models::{session, Event, ExternalSession, Session, SessionRun};
use crate::services::guardian::Guardian;
use crate::services::registry::{SessionEntry, SessionRegistry};
use crate::services::terminator::TtlSchedule;
use crate::traits::{BackupStore, CdrApi, PeerApi, RaterApi, ResourceApi, SignalingApi};

pub const DISCONNECT_FORCED: &str = "FORCED_DISCONNECT";
pub const DISCONNECT_TTL_EXPIRED: &str = "SESSION_TTL_EXPIRED";
pub const DISCONNECT_INSUFFICIENT_FUNDS: &str = "INSUFFICIENT_FUNDS";

/// Session ids pending incremental backup / removal. Backup records
/// are keyed under the node's default tenant, whatever tenant the
/// session itself carries.
#[derive(Default)]
pub(super) struct BackupMarks {
    pub(super) pending: RwLock<Vec<String>>,
    pub(super) to_remove: RwLock<Vec<String>>,
}

pub struct SessionEngine {
    /// Handle to the owning `Arc`, for tasks that outlive the caller.
    pub(super) me: Weak<SessionEngine>,
    pub(super) cfg: Config,
    pub(super) registry: SessionRegistry,
    pub(super) guardian: Guardian,
    pub(super) rater: Arc<dyn RaterApi>,
    pub(super) peers: Vec<Arc<dyn PeerApi>>,
    pub(super) signaling: Arc<dyn SignalingApi>,
    pub(super) cdrs: Arc<dyn CdrApi>,
    pub(super) resources: Arc<dyn ResourceApi>,
    pub(super) backup_store: Option<Arc<dyn BackupStore>>,
    pub(super) backup_marks: BackupMarks,
}

impl SessionEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        cfg: Config,
        rater: Arc<dyn RaterApi>,
        peers: Vec<Arc<dyn PeerApi>>,
        signaling: Arc<dyn SignalingApi>,
        cdrs: Arc<dyn CdrApi>,
        resources: Arc<dyn ResourceApi>,
        backup_store: Option<Arc<dyn BackupStore>>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|me| SessionEngine {
            me: me.clone(),
            registry: SessionRegistry::new(cfg.session_indexes.clone()),
            guardian: Guardian::new(cfg.lock_timeout),
            cfg,
            rater,
            peers,
            signaling,
            cdrs,
            resources,
            backup_store,
            backup_marks: BackupMarks::default(),
        })
    }

    pub fn node_id(&self) -> &str {
        &self.cfg.node_id
    }

    fn tenant_of(&self, event: &Event) -> String {
        event
            .tenant()
            .unwrap_or_else(|| self.cfg.default_tenant.clone())
    }

    fn origin_id_of(event: &Event) -> Result<String, SessionError> {
        event
            .origin_id()
            .filter(|id| !id.is_empty())
            .ok_or_else(|| SessionError::MandatoryFieldMissing(fields::ORIGIN_ID.to_string()))
    }

    fn session_id_of(event: &Event) -> Result<String, SessionError> {
        if let Some(id) = event.get_str(fields::SESSION_ID) {
            return Ok(id);
        }
        let origin_id = Self::origin_id_of(event)?;
        let origin_host = event.get_str(fields::ORIGIN_HOST).unwrap_or_default();
        Ok(session::session_id(&origin_host, &origin_id))
    }

    // ========================================================================
    // Session construction
    // ========================================================================

    /// Builds the session record from the charger-resolved billing runs.
    /// Nothing is registered here.
    async fn new_session(
        &self,
        tenant: &str,
        event: Event,
        opts_map: Event,
        forced_session_id: Option<String>,
    ) -> Result<Session, SessionError> {
        let origin_id = Self::origin_id_of(&event)?;
        let session_id = match forced_session_id {
            Some(id) => id,
            None => Self::session_id_of(&event)?,
        };

        let billing_runs = self.rater.billing_runs(tenant, &event).await?;
        if billing_runs.is_empty() {
            return Err(SessionError::Charger(format!(
                "no billing runs for {}",
                origin_id
            )));
        }

        let time_start = event
            .get_time(fields::ANSWER_TIME)
            .or_else(|| event.get_time(fields::SETUP_TIME))
            .unwrap_or_else(Utc::now);

        let mut runs = Vec::with_capacity(billing_runs.len());
        for br in billing_runs {
            let mut run_event = br.event;
            run_event.set_str(fields::RUN_ID, &br.run_id);
            let account = run_event.get_str(fields::ACCOUNT).unwrap_or_default();
            let cd = crate::models::CallDescriptor {
                run_id: br.run_id,
                tor: run_event.get_str(fields::TOR).unwrap_or_else(|| "*voice".to_string()),
                tenant: tenant.to_string(),
                category: run_event
                    .get_str(fields::CATEGORY)
                    .unwrap_or_else(|| "call".to_string()),
                subject: run_event
                    .get_str(fields::SUBJECT)
                    .unwrap_or_else(|| account.clone()),
                account,
                destination: run_event.get_str(fields::DESTINATION).unwrap_or_default(),
                time_start,
                time_end: time_start,
                duration_index: Duration::ZERO,
                loop_index: 0.0,
                max_cost_so_far: Default::default(),
            };
            runs.push(SessionRun {
                event: run_event,
                cd,
                ..Default::default()
            });
        }

        Ok(Session {
            session_id,
            tenant: tenant.to_string(),
            resource_id: opts_map.get_str(opts::RESOURCE_ID),
            client_conn_id: opts_map.get_str(opts::CLIENT_CONN_ID),
            debit_interval: opts_map
                .get_duration(opts::DEBIT_INTERVAL)
                .unwrap_or(self.cfg.debit_interval),
            chargeable: opts_map.get_bool(opts::CHARGEABLE).unwrap_or(true),
            ttl: opts_map
                .get_duration(opts::SESSION_TTL)
                .or(self.cfg.session_ttl),
            ttl_max_delay: opts_map
                .get_duration(opts::SESSION_TTL_MAX_DELAY)
                .or(self.cfg.session_ttl_max_delay),
            ttl_last_used: opts_map.get_duration(opts::SESSION_TTL_LAST_USED),
            ttl_usage: opts_map.get_duration(opts::SESSION_TTL_USAGE),
            ttl_last_usage: opts_map.get_duration(opts::SESSION_TTL_LAST_USAGE),
            runs,
            event_start: event,
            opts: opts_map,
            updated_at: Utc::now(),
        })
    }

    // ========================================================================
    // Lifecycle operations
    // ========================================================================

    /// Authorization never touches the registry: it just reports how
    /// long the account can afford the call described by the event.
    #[instrument(skip(self, event, opts_map))]
    pub async fn authorize_event(
        &self,
        event: Event,
        opts_map: Event,
    ) -> Result<Duration, SessionError> {
        let tenant = self.tenant_of(&event);
        let requested = event
            .get_duration(fields::USAGE)
            .unwrap_or(self.cfg.default_usage);
        let session = self.new_session(&tenant, event, opts_map, None).await?;

        let mut max_usage: Option<Duration> = None;
        for run in &session.runs {
            let granted = match run.event.request_type().as_str() {
                request_types::PREPAID | request_types::PSEUDO_PREPAID => {
                    let mut cd = run.cd.clone();
                    cd.time_end = cd.time_start
                        + chrono::Duration::from_std(requested)
                            .unwrap_or_else(|_| chrono::Duration::zero());
                    self.rater.max_session_time(&cd).await?.min(requested)
                }
                _ => requested,
            };
            max_usage = Some(match max_usage {
                Some(prev) => prev.min(granted),
                None => granted,
            });
        }
        Ok(max_usage.unwrap_or(requested))
    }

    /// Registers the session and starts its background companions.
    /// Guardian-locked by origin id so concurrent inits of the same call
    /// serialize; a duplicate id leaves no partial state behind.
    #[instrument(skip(self, event, opts_map), fields(origin_id))]
    pub async fn initiate_session(
        &self,
        event: Event,
        opts_map: Event,
    ) -> Result<Duration, SessionError> {
        let tenant = self.tenant_of(&event);
        let origin_id = Self::origin_id_of(&event)?;
        tracing::Span::current().record("origin_id", origin_id.as_str());
        let _guard = self.guardian.lock(&origin_id).await?;

        let session_id = Self::session_id_of(&event)?;
        if self.registry.get(&session_id, false).await.is_some()
            || self.registry.get(&session_id, true).await.is_some()
        {
            return Err(SessionError::Exists);
        }

        let requested = event
            .get_duration(fields::USAGE)
            .unwrap_or(self.cfg.default_usage);
        let mut session = self.new_session(&tenant, event, opts_map, None).await?;

        let wants_loop = session.wants_debit_loop();
        let mut max_usage: Option<Duration> = None;
        if wants_loop {
            max_usage = Some(session.debit_interval);
        } else {
            for idx in 0..session.runs.len() {
                let granted = match session.runs[idx].event.request_type().as_str() {
                    request_types::PREPAID => {
                        self.debit_run(&mut session, idx, requested, None).await?
                    }
                    _ => requested,
                };
                max_usage = Some(match max_usage {
                    Some(prev) => prev.min(granted),
                    None => granted,
                });
            }
        }

        let entry = self.registry.register(session.clone(), false).await;
        if wants_loop {
            self.start_debit_loops(&entry).await;
        }
        self.arm_terminator(&entry, &session).await;
        self.mark_for_backup(&session.session_id).await;
        if !wants_loop {
            self.replicate_session(&session.session_id, false).await;
        }

        info!(
            session_id = %session.session_id,
            tenant = %session.tenant,
            runs = session.runs.len(),
            debit_loop = wants_loop,
            "🚀 session initiated"
        );
        Ok(max_usage.unwrap_or(requested))
    }

    /// Interim update: merge the new event into the stored session,
    /// push the TTL deadline forward and charge the reported usage.
    #[instrument(skip(self, event), fields(origin_id))]
    pub async fn update_session(&self, event: Event) -> Result<Duration, SessionError> {
        let origin_id = Self::origin_id_of(&event)?;
        tracing::Span::current().record("origin_id", origin_id.as_str());
        let _guard = self.guardian.lock(&origin_id).await?;

        let entry = self.resolve_active_session(&event).await?;
        let requested = event.get_duration(fields::USAGE);
        let last_used = event.get_duration(fields::LAST_USED);

        let mut max_usage: Option<Duration> = None;
        let has_loop = entry.has_debit_loop().await;
        {
            let mut session = entry.session.write().await;
            session.event_start.merge(&event);
            for run in session.runs.iter_mut() {
                run.event.merge(&event);
            }
            session.updated_at = Utc::now();

            if let Some(requested) = requested {
                for idx in 0..session.runs.len() {
                    let granted = match session.runs[idx].event.request_type().as_str() {
                        request_types::PREPAID if !has_loop => {
                            self.debit_run(&mut session, idx, requested, last_used)
                                .await?
                        }
                        request_types::PSEUDO_PREPAID => {
                            let cd = session.runs[idx].cd.clone();
                            self.rater.max_session_time(&cd).await?.min(requested)
                        }
                        _ => requested,
                    };
                    max_usage = Some(match max_usage {
                        Some(prev) => prev.min(granted),
                        None => granted,
                    });
                }
            }

            let schedule = self.ttl_schedule(&session);
            let session_id = session.session_id.clone();
            drop(session);

            if let Some(schedule) = schedule {
                if !entry.rearm_terminator(schedule).await {
                    let snapshot = entry.session.read().await.clone();
                    self.arm_terminator(&entry, &snapshot).await;
                }
            }
            self.mark_for_backup(&session_id).await;
            if !has_loop {
                self.replicate_session(&session_id, false).await;
            }
        }

        Ok(max_usage
            .or(requested)
            .unwrap_or(self.cfg.default_usage))
    }

    /// Final settlement. The session leaves the active table before any
    /// remote call so a failing rater can never keep it alive.
    #[instrument(skip(self, event), fields(origin_id))]
    pub async fn terminate_session(&self, event: Event) -> Result<(), SessionError> {
        let origin_id = Self::origin_id_of(&event)?;
        tracing::Span::current().record("origin_id", origin_id.as_str());
        let _guard = self.guardian.lock(&origin_id).await?;

        let entry = self.resolve_active_session(&event).await?;
        let session_id = { entry.session.read().await.session_id.clone() };
        self.registry.unregister(&session_id, false).await;

        let mut session = entry.session.write().await;
        session.event_start.merge(&event);
        let total_usage = event
            .get_duration(fields::USAGE)
            .or_else(|| event.get_duration(fields::TOTAL_USAGE));
        let last_used = event.get_duration(fields::LAST_USED);

        let fully = self
            .end_session(&mut session, total_usage, last_used)
            .await?;

        info!(
            session_id = %session.session_id,
            tenant = %session.tenant,
            usage = ?session.total_usage(),
            "✅ session terminated"
        );
        if fully {
            Ok(())
        } else {
            Err(SessionError::PartiallyExecuted)
        }
    }

    /// Settles every run against what the call actually used, returns
    /// false when an optional step failed. Caller holds the session
    /// write lock and has already unregistered it.
    pub(super) async fn end_session(
        &self,
        session: &mut Session,
        total_usage: Option<Duration>,
        last_used: Option<Duration>,
    ) -> Result<bool, SessionError> {
        let mut fully = true;
        for idx in 0..session.runs.len() {
            let target = match (total_usage, last_used) {
                (Some(t), _) => t,
                (None, Some(lu)) => {
                    // replace the last reserved slice with what was used
                    session.runs[idx]
                        .total_usage
                        .saturating_sub(session.runs[idx].last_usage)
                        + lu
                }
                (None, None) => session.runs[idx].total_usage,
            };

            if session.runs[idx].event.request_type() == request_types::PREPAID
                && session.chargeable
            {
                // settle against what the rater actually charged, which
                // includes the still-reserved extra duration
                let charged = session.runs[idx]
                    .event_cost
                    .as_ref()
                    .map(|ec| ec.usage)
                    .unwrap_or(session.runs[idx].total_usage);
                if target > charged {
                    let missing = target - charged;
                    if let Err(e) = self.debit_run_exact(session, idx, missing).await {
                        error!(session_id = %session.session_id, error = %e,
                            "failed debiting terminal usage");
                        fully = false;
                    }
                } else if target < charged {
                    if let Err(e) = self.refund_run(session, idx, charged - target).await {
                        error!(session_id = %session.session_id, error = %e,
                            "failed refunding unused usage");
                        fully = false;
                    }
                }
                let cd = session.runs[idx].cd.clone();
                if let Err(e) = self.rater.refund_rounding(&cd).await {
                    warn!(session_id = %session.session_id, error = %e,
                        "rounding refund failed");
                    fully = false;
                }
            }
            session.runs[idx].total_usage = target;
            session.runs[idx].extra_duration = Duration::ZERO;
            session.runs[idx].event.set_duration(fields::USAGE, target);
        }
        session.updated_at = Utc::now();

        if let Some(resource_id) = session.resource_id.clone() {
            if let Err(e) = self
                .resources
                .release_resource(&session.tenant, &resource_id)
                .await
            {
                warn!(session_id = %session.session_id, error = %e,
                    "resource release failed");
                fully = false;
            }
        }

        self.replicate_removal(&session.session_id, &session.tenant)
            .await;
        self.mark_for_removal(&session.session_id).await;
        Ok(fully)
    }

    /// One-shot charge for events that never register a session.
    #[instrument(skip(self, event, opts_map))]
    pub async fn process_message(
        &self,
        event: Event,
        opts_map: Event,
    ) -> Result<Duration, SessionError> {
        let tenant = self.tenant_of(&event);
        let requested = event
            .get_duration(fields::USAGE)
            .unwrap_or(self.cfg.default_usage);
        let mut session = self.new_session(&tenant, event, opts_map, None).await?;

        let mut max_usage: Option<Duration> = None;
        for idx in 0..session.runs.len() {
            let granted = match session.runs[idx].event.request_type().as_str() {
                request_types::PREPAID => {
                    self.debit_run(&mut session, idx, requested, None).await?
                }
                _ => requested,
            };
            max_usage = Some(match max_usage {
                Some(prev) => prev.min(granted),
                None => granted,
            });
        }
        Ok(max_usage.unwrap_or(requested))
    }

    #[instrument(skip(self, event))]
    pub async fn process_cdr(&self, event: Event) -> Result<(), SessionError> {
        let tenant = self.tenant_of(&event);
        self.cdrs.process_cdr(&tenant, &event).await
    }

    // ========================================================================
    // Lookup, promotion, relocation
    // ========================================================================

    /// Finds the active session for an event: direct hit, passive
    /// promotion, or relocation from `InitialOriginID`.
    async fn resolve_active_session(
        &self,
        event: &Event,
    ) -> Result<Arc<SessionEntry>, SessionError> {
        let session_id = Self::session_id_of(event)?;
        if let Some(entry) = self.get_activate_session(&session_id).await {
            return Ok(entry);
        }

        if let Some(initial_origin) = event
            .get_str(fields::INITIAL_ORIGIN_ID)
            .filter(|s| !s.is_empty())
        {
            let origin_host = event.get_str(fields::ORIGIN_HOST).unwrap_or_default();
            let initial_id = session::session_id(&origin_host, &initial_origin);
            let origin_id = Self::origin_id_of(event)?;
            if let Some(entry) = self
                .relocate_session(&initial_id, &session_id, &origin_id)
                .await
            {
                return Ok(entry);
            }
        }
        Err(SessionError::NotFound)
    }

    /// Returns the active entry, promoting a passive copy on first
    /// touch: the passive record is unregistered, re-registered active,
    /// and its terminator and debit loops re-armed.
    pub(super) async fn get_activate_session(
        &self,
        session_id: &str,
    ) -> Option<Arc<SessionEntry>> {
        if let Some(entry) = self.registry.get(session_id, false).await {
            return Some(entry);
        }
        let passive = self.registry.unregister(session_id, true).await?;
        let session = passive.session.read().await.clone();
        info!(session_id = %session_id, "promoting passive session to active");

        let entry = self.registry.register(session.clone(), false).await;
        if session.wants_debit_loop() {
            self.start_debit_loops(&entry).await;
        }
        self.arm_terminator(&entry, &session).await;
        self.mark_for_backup(&session.session_id).await;
        Some(entry)
    }

    /// Re-keys a session to a new id/origin when the signaling layer
    /// reassigns the call id. No-op when the new id already exists in
    /// either table.
    pub(super) async fn relocate_session(
        &self,
        initial_id: &str,
        new_session_id: &str,
        new_origin_id: &str,
    ) -> Option<Arc<SessionEntry>> {
        if self.registry.get(new_session_id, false).await.is_some()
            || self.registry.get(new_session_id, true).await.is_some()
        {
            return None;
        }
        let old = self.get_activate_session(initial_id).await?;
        let mut session = old.session.read().await.clone();
        self.registry.unregister(initial_id, false).await;
        self.mark_for_removal(initial_id).await;
        self.replicate_removal(initial_id, &session.tenant).await;

        session.session_id = new_session_id.to_string();
        session
            .event_start
            .set_str(fields::ORIGIN_ID, new_origin_id);
        for run in session.runs.iter_mut() {
            run.event.set_str(fields::ORIGIN_ID, new_origin_id);
        }
        info!(from = %initial_id, to = %new_session_id, "relocated session");

        let entry = self.registry.register(session.clone(), false).await;
        if session.wants_debit_loop() {
            self.start_debit_loops(&entry).await;
        }
        self.arm_terminator(&entry, &session).await;
        self.mark_for_backup(new_session_id).await;
        if !session.wants_debit_loop() {
            self.replicate_session(new_session_id, false).await;
        }
        Some(entry)
    }

    // ========================================================================
    // Terminator wiring
    // ========================================================================

    pub(super) fn ttl_schedule(&self, session: &Session) -> Option<TtlSchedule> {
        let ttl = session.ttl.filter(|t| !t.is_zero())?;
        Some(TtlSchedule {
            ttl,
            max_delay: session.ttl_max_delay,
            last_used: session.ttl_last_used,
            usage: session.ttl_usage,
            last_usage: session.ttl_last_usage,
        })
    }

    pub(super) async fn arm_terminator(
        &self,
        entry: &Arc<SessionEntry>,
        session: &Session,
    ) {
        let Some(schedule) = self.ttl_schedule(session) else {
            return;
        };
        let Some(engine) = self.me.upgrade() else {
            return;
        };
        let session_id = session.session_id.clone();
        let handle = crate::services::terminator::spawn(
            session_id.clone(),
            schedule,
            move |fired| async move {
                engine.ttl_expired(&session_id, fired).await;
            },
        );
        entry.set_terminator(handle).await;
    }

    /// TTL deadline passed: charge the terminal overrides and force the
    /// session out. Failures are logged, never propagated.
    async fn ttl_expired(self: Arc<Self>, session_id: &str, schedule: TtlSchedule) {
        let extra_usage = schedule.usage.unwrap_or(schedule.ttl);
        self.force_terminate(
            session_id,
            extra_usage,
            schedule.last_used,
            schedule.last_usage,
            DISCONNECT_TTL_EXPIRED,
        )
        .await;
    }

    /// Forced termination path shared by the TTL terminator and the
    /// debit loop: best effort, every step logged on failure.
    pub(super) async fn force_terminate(
        &self,
        session_id: &str,
        extra_usage: Duration,
        last_used: Option<Duration>,
        last_usage: Option<Duration>,
        cause: &str,
    ) {
        let Some(entry) = self.registry.unregister(session_id, false).await else {
            return;
        };
        let mut session = entry.session.write().await;
        warn!(session_id = %session_id, cause, extra = ?extra_usage,
            "force-terminating session");

        if !extra_usage.is_zero() {
            for idx in 0..session.runs.len() {
                if session.runs[idx].event.request_type() != request_types::PREPAID {
                    continue;
                }
                let request = last_usage.unwrap_or(extra_usage);
                if let Err(e) = self.debit_run(&mut session, idx, request, last_used).await {
                    error!(session_id = %session_id, error = %e,
                        "failed debiting terminal usage on forced terminate");
                }
            }
        }

        session
            .event_start
            .set_str(fields::DISCONNECT_CAUSE, cause);
        if let Err(e) = self.end_session(&mut session, None, None).await {
            error!(session_id = %session_id, error = %e,
                "settlement failed on forced terminate");
        }

        // post one CDR per run; the client is gone and will not do it
        for run in &session.runs {
            let mut cdr_event = session.event_start.clone();
            cdr_event.merge(&run.event);
            cdr_event.set_str(fields::RUN_ID, &run.cd.run_id);
            cdr_event.set_duration(fields::USAGE, run.total_usage);
            cdr_event.set(
                fields::COST,
                serde_json::json!(run.cost().to_string()),
            );
            cdr_event.set_str(fields::DISCONNECT_CAUSE, cause);
            if let Err(e) = self.cdrs.process_cdr(&session.tenant, &cdr_event).await {
                error!(session_id = %session_id, run_id = %run.cd.run_id, error = %e,
                    "failed posting CDR on forced terminate");
            }
        }

        if let Some(conn_id) = session.client_conn_id.clone() {
            let event = session.event_start.clone();
            let signaling = self.signaling.clone();
            let cause = cause.to_string();
            let sid = session_id.to_string();
            tokio::spawn(async move {
                if let Err(e) = signaling.disconnect_session(&conn_id, &event, &cause).await {
                    warn!(session_id = %sid, error = %e,
                        "client disconnect failed on forced terminate");
                }
            });
        }
    }

    // ========================================================================
    // Replication receiver & queries
    // ========================================================================

    /// Replication receiver. An empty session is a removal order; a
    /// real one replaces the passive copy and clears any active one.
    #[instrument(skip(self, session), fields(session_id = %session.session_id))]
    pub async fn set_passive_session(
        &self,
        session: Session,
    ) -> Result<(), SessionError> {
        if session.is_removal_marker() {
            return self
                .registry
                .unregister(&session.session_id, true)
                .await
                .map(|_| ())
                .ok_or(SessionError::NotFound);
        }
        if self
            .registry
            .unregister(&session.session_id, false)
            .await
            .is_some()
        {
            warn!(session_id = %session.session_id,
                "passive upsert displaced a local active session");
        }
        self.registry.register(session, true).await;
        Ok(())
    }

    /// Sessions matching the filters, one entry per run. Index-resolved
    /// filters narrow the candidates; the rest compare directly.
    pub async fn get_sessions(
        &self,
        filters: &HashMap<String, String>,
        passive: bool,
    ) -> Vec<ExternalSession> {
        let table = self.registry.table(passive);
        let mut out = Vec::new();

        if filters.is_empty() {
            for entry in table.entries().await {
                let session = entry.session.read().await;
                for idx in 0..session.runs.len() {
                    out.push(session.as_external(idx, &self.cfg.node_id));
                }
            }
            return out;
        }

        let (matches, unresolved) = table.index.matching_ids(filters).await;
        for (session_id, run_ids) in matches {
            let Some(entry) = table.get(&session_id).await else {
                continue;
            };
            let session = entry.session.read().await;
            'runs: for idx in 0..session.runs.len() {
                let run = &session.runs[idx];
                if !run_ids.contains(&run.cd.run_id) {
                    continue;
                }
                for (key, value) in &unresolved {
                    if &run.event.index_value(key) != value {
                        continue 'runs;
                    }
                }
                out.push(session.as_external(idx, &self.cfg.node_id));
            }
        }
        out
    }

    pub async fn session_count(
        &self,
        filters: &HashMap<String, String>,
        passive: bool,
    ) -> usize {
        if filters.is_empty() {
            let mut count = 0;
            for entry in self.registry.table(passive).entries().await {
                count += entry.session.read().await.runs.len();
            }
            return count;
        }
        self.get_sessions(filters, passive).await.len()
    }
}
