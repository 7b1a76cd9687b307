// src/services/terminator.rs
//! TTL terminator: one task per active session with a non-zero TTL.
//! Arming again re-schedules the same task in place; exactly one of
//! fired / cancelled is ever observed.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio::sync::watch;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// What to do when the TTL fires: how much terminal usage to debit and
/// which usage figures to report on the forced termination.
#[derive(Debug, Clone)]
pub struct TtlSchedule {
    pub ttl: Duration,
    pub max_delay: Option<Duration>,
    pub last_used: Option<Duration>,
    pub usage: Option<Duration>,
    pub last_usage: Option<Duration>,
}

impl TtlSchedule {
    /// Deadline from now, with the optional random anti-thundering delay.
    fn deadline(&self) -> Instant {
        let mut ttl = self.ttl;
        if let Some(max_delay) = self.max_delay {
            if !max_delay.is_zero() {
                let jitter_ns = rand::thread_rng().gen_range(0..=max_delay.as_nanos() as u64);
                ttl += Duration::from_nanos(jitter_ns);
            }
        }
        Instant::now() + ttl
    }
}

pub struct TerminatorHandle {
    cancel: CancellationToken,
    schedule_tx: watch::Sender<TtlSchedule>,
}

impl TerminatorHandle {
    /// Postpones the deadline and replaces the terminal usage overrides.
    pub fn rearm(&self, schedule: TtlSchedule) {
        let _ = self.schedule_tx.send(schedule);
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }
}

/// Spawns the terminator task. `on_fire` runs at most once, with the
/// schedule that was live when the deadline expired.
pub fn spawn<F, Fut>(session_id: String, schedule: TtlSchedule, on_fire: F) -> TerminatorHandle
where
    F: FnOnce(TtlSchedule) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send,
{
    let cancel = CancellationToken::new();
    let (schedule_tx, mut schedule_rx) = watch::channel(schedule.clone());

    let task_cancel = cancel.clone();
    tokio::spawn(async move {
        let mut current = schedule;
        let mut deadline = current.deadline();
        loop {
            tokio::select! {
                _ = task_cancel.cancelled() => {
                    debug!(session_id = %session_id, "session terminator cancelled");
                    return;
                }
                changed = schedule_rx.changed() => {
                    if changed.is_err() {
                        return;
                    }
                    current = schedule_rx.borrow_and_update().clone();
                    deadline = current.deadline();
                }
                _ = tokio::time::sleep_until(deadline) => {
                    debug!(session_id = %session_id, ttl = ?current.ttl,
                        "session TTL expired, forcing termination");
                    on_fire(current).await;
                    return;
                }
            }
        }
    });

    TerminatorHandle {
        cancel,
        schedule_tx,
    }
}
