// src/services/debit.rs
//! Charging arithmetic and the prepaid debit loop, as further methods
//! on `SessionEngine`.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rust_decimal::Decimal;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::engine::{SessionEngine, DISCONNECT_FORCED, DISCONNECT_INSUFFICIENT_FUNDS};
use super::registry::SessionEntry;
use crate::error::SessionError;
use crate::models::event::request_types;
use crate::models::{EventCost, Session};

impl SessionEngine {
    /// Debits `dur` for one run: consumes the reservation first, asks
    /// the rater only for the remainder. Returns the usage actually
    /// obtained, which is below `dur` when the balance ran out.
    pub(super) async fn debit_run(
        &self,
        session: &mut Session,
        idx: usize,
        dur: Duration,
        last_used: Option<Duration>,
    ) -> Result<Duration, SessionError> {
        if !session.chargeable {
            self.pause_run(session, idx, dur);
            return Ok(dur);
        }

        let rest = session.runs[idx].debit_reserve(dur, last_used);
        if rest.is_zero() {
            return Ok(dur);
        }

        let mut cd = session.runs[idx].cd.clone();
        cd.time_end = cd.time_start
            + chrono::Duration::from_std(rest).unwrap_or_else(|_| chrono::Duration::zero());
        let reply = match self.rater.max_debit(&cd).await {
            Ok(reply) => reply,
            Err(e) => {
                // hand the consumed reservation back before failing
                session.runs[idx].extra_duration += dur - rest;
                return Err(e);
            }
        };

        let granted = reply.granted.min(rest);
        let obtained = (dur - rest) + granted;

        let run = &mut session.runs[idx];
        run.book_usage(obtained);
        match run.event_cost.as_mut() {
            Some(ec) => ec.merge(&EventCost {
                usage: granted,
                cost: reply.cost,
            }),
            None => {
                run.event_cost = Some(EventCost {
                    usage: granted,
                    cost: reply.cost,
                })
            }
        }
        run.cd.max_cost_so_far += reply.cost;
        run.cd.loop_index += 1.0;
        run.cd.advance(granted);

        debug!(
            session_id = %session.session_id,
            run_id = %session.runs[idx].cd.run_id,
            requested = ?dur, granted = ?obtained, cost = %reply.cost,
            "debited session run"
        );
        Ok(obtained)
    }

    /// Exact terminal debit used when the call consumed more than was
    /// charged during its lifetime.
    pub(super) async fn debit_run_exact(
        &self,
        session: &mut Session,
        idx: usize,
        dur: Duration,
    ) -> Result<(), SessionError> {
        if !session.chargeable {
            self.pause_run(session, idx, dur);
            return Ok(());
        }
        let mut cd = session.runs[idx].cd.clone();
        cd.time_end = cd.time_start
            + chrono::Duration::from_std(dur).unwrap_or_else(|_| chrono::Duration::zero());
        let reply = self.rater.debit(&cd).await?;

        let run = &mut session.runs[idx];
        run.total_usage += dur;
        match run.event_cost.as_mut() {
            Some(ec) => ec.merge(&EventCost {
                usage: dur,
                cost: reply.cost,
            }),
            None => {
                run.event_cost = Some(EventCost {
                    usage: dur,
                    cost: reply.cost,
                })
            }
        }
        run.cd.advance(dur);
        Ok(())
    }

    /// Non-chargeable sessions get a free-cost ledger entry instead of
    /// a rater debit.
    pub(super) fn pause_run(&self, session: &mut Session, idx: usize, dur: Duration) {
        let run = &mut session.runs[idx];
        run.book_usage(dur);
        match run.event_cost.as_mut() {
            Some(ec) => ec.usage += dur,
            None => {
                run.event_cost = Some(EventCost {
                    usage: dur,
                    cost: Decimal::ZERO,
                })
            }
        }
        run.cd.advance(dur);
    }

    /// Returns `refund` of already-charged usage to the account and
    /// trims the run ledger accordingly.
    pub(super) async fn refund_run(
        &self,
        session: &mut Session,
        idx: usize,
        refund: Duration,
    ) -> Result<(), SessionError> {
        if refund.is_zero() || !session.chargeable {
            return Ok(());
        }
        let cd = session.runs[idx].cd.clone();
        let refunded = self.rater.refund_increments(&cd, refund).await?;

        let run = &mut session.runs[idx];
        if let Some(ec) = run.event_cost.as_mut() {
            ec.usage = ec.usage.saturating_sub(refund);
            ec.cost = (ec.cost - refunded).max(Decimal::ZERO);
        }
        debug!(
            session_id = %session.session_id,
            run_id = %session.runs[idx].cd.run_id,
            refund = ?refund, refunded = %refunded,
            "refunded unused usage"
        );
        Ok(())
    }

    /// Spawns one debit loop per prepaid run, all stopped by one token
    /// installed on the entry.
    pub(super) async fn start_debit_loops(&self, entry: &Arc<SessionEntry>) {
        let Some(me) = self.me.upgrade() else {
            return;
        };
        let stop = CancellationToken::new();
        entry.set_debit_stop(stop.clone()).await;

        let session = entry.session.read().await;
        for idx in 0..session.runs.len() {
            if session.runs[idx].event.request_type() != request_types::PREPAID {
                continue;
            }
            let engine = me.clone();
            let entry = entry.clone();
            let stop = stop.clone();
            tokio::spawn(async move {
                engine.debit_loop(entry, idx, stop).await;
            });
        }
    }

    /// Charges one debit interval ahead of time, forever, until the
    /// stop token fires or the balance runs out. A restored session
    /// honors its stamped `next_auto_debit` so the interval already
    /// paid for is not debited twice.
    async fn debit_loop(self: Arc<Self>, entry: Arc<SessionEntry>, idx: usize, stop: CancellationToken) {
        let (session_id, interval) = {
            let session = entry.session.read().await;
            (session.session_id.clone(), session.debit_interval)
        };
        debug!(session_id = %session_id, run = idx, interval = ?interval,
            "debit loop started");

        if let Some(next) = entry.session.read().await.runs.get(idx).and_then(|r| r.next_auto_debit)
        {
            let now = Utc::now();
            if next > now {
                let wait = (next - now).to_std().unwrap_or(Duration::ZERO);
                tokio::select! {
                    _ = stop.cancelled() => return,
                    _ = tokio::time::sleep(wait) => {}
                }
            }
        }

        loop {
            let granted = {
                let mut session = entry.session.write().await;
                let result = self.debit_run(&mut session, idx, interval, None).await;
                match result {
                    Ok(granted) => {
                        let sleep_for = granted.min(interval);
                        session.runs[idx].next_auto_debit = Some(
                            Utc::now()
                                + chrono::Duration::from_std(sleep_for)
                                    .unwrap_or_else(|_| chrono::Duration::zero()),
                        );
                        granted
                    }
                    Err(e) => {
                        error!(session_id = %session_id, run = idx, error = %e,
                            "debit failed, disconnecting session");
                        let conn_id = session.client_conn_id.clone();
                        let event = session.event_start.clone();
                        drop(session);
                        if let Some(conn_id) = conn_id {
                            self.disconnect_with_retries(
                                &conn_id,
                                &event,
                                DISCONNECT_FORCED,
                            )
                            .await;
                        }
                        self.force_terminate(&session_id, Duration::ZERO, None, None, DISCONNECT_FORCED)
                            .await;
                        return;
                    }
                }
            };
            self.mark_entry_for_backup(&entry).await;

            if granted < interval {
                let (conn_id, event) = {
                    let session = entry.session.read().await;
                    (session.client_conn_id.clone(), session.event_start.clone())
                };
                // balance nearly exhausted: warn the client, then let
                // the call run out exactly what was granted
                if granted < self.cfg.min_dur_low_balance {
                    if let Some(conn_id) = conn_id.as_deref() {
                        if let Err(e) = self.signaling.warn_session(conn_id, &event).await {
                            warn!(session_id = %session_id, error = %e,
                                "low balance warning failed");
                        }
                    }
                }
                info!(session_id = %session_id, granted = ?granted,
                    "⚠️ balance exhausted, terminating when grant runs out");
                tokio::select! {
                    _ = stop.cancelled() => return,
                    _ = tokio::time::sleep(granted) => {}
                }
                if let Some(conn_id) = conn_id.as_deref() {
                    self.disconnect_with_retries(conn_id, &event, DISCONNECT_INSUFFICIENT_FUNDS)
                        .await;
                }
                self.force_terminate(
                    &session_id,
                    Duration::ZERO,
                    None,
                    None,
                    DISCONNECT_INSUFFICIENT_FUNDS,
                )
                .await;
                return;
            }

            tokio::select! {
                _ = stop.cancelled() => {
                    debug!(session_id = %session_id, run = idx, "debit loop stopped");
                    return;
                }
                _ = tokio::time::sleep(interval) => {}
            }
        }
    }

    /// Repeats the disconnect order with Fibonacci backoff until the
    /// client acknowledges or the attempts are spent.
    pub(super) async fn disconnect_with_retries(
        &self,
        conn_id: &str,
        event: &crate::models::Event,
        cause: &str,
    ) {
        let (mut fib_a, mut fib_b) = (1u64, 1u64);
        for attempt in 1..=self.cfg.terminate_attempts {
            match self.signaling.disconnect_session(conn_id, event, cause).await {
                Ok(()) => return,
                Err(e) => {
                    warn!(conn_id, attempt, error = %e, "disconnect attempt failed");
                }
            }
            if attempt < self.cfg.terminate_attempts {
                tokio::time::sleep(Duration::from_secs(fib_a)).await;
                let next = fib_a + fib_b;
                fib_a = fib_b;
                fib_b = next;
            }
        }
        error!(conn_id, attempts = self.cfg.terminate_attempts,
            "client never acknowledged the disconnect");
    }
}
