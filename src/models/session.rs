// src/models/session.rs
use std::time::Duration;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::event::{duration_ns, fields, opt_duration_ns, Event};

/// Namespace for content-derived session ids (v5 over origin host + id).
const SESSION_ID_NS: Uuid = Uuid::from_bytes([
    0x7a, 0x70, 0x6f, 0x6c, 0x6f, 0x2d, 0x73, 0x65, 0x73, 0x73, 0x69, 0x6f, 0x6e, 0x2d, 0x69,
    0x64,
]);

/// Derives the stable session id from the originating host and origin id.
/// The same call always maps to the same id, on every node.
pub fn session_id(origin_host: &str, origin_id: &str) -> String {
    let name = format!("{}/{}", origin_host, origin_id);
    Uuid::new_v5(&SESSION_ID_NS, name.as_bytes())
        .simple()
        .to_string()
}

/// Rater-facing charging parameters for one billing run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CallDescriptor {
    #[serde(rename = "RunID")]
    pub run_id: String,
    #[serde(rename = "ToR")]
    pub tor: String,
    pub tenant: String,
    pub category: String,
    pub account: String,
    pub subject: String,
    pub destination: String,
    pub time_start: DateTime<Utc>,
    pub time_end: DateTime<Utc>,
    #[serde(with = "duration_ns")]
    pub duration_index: Duration,
    pub loop_index: f64,
    pub max_cost_so_far: Decimal,
}

impl CallDescriptor {
    /// Advances the charging window by `dur` for the next debit.
    pub fn advance(&mut self, dur: Duration) {
        self.time_start = self.time_end;
        self.time_end += chrono::Duration::from_std(dur).unwrap_or_else(|_| chrono::Duration::zero());
        self.duration_index += dur;
    }
}

/// Accumulated charging ledger for one run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct EventCost {
    #[serde(with = "duration_ns")]
    pub usage: Duration,
    pub cost: Decimal,
}

impl EventCost {
    pub fn merge(&mut self, other: &EventCost) {
        self.usage += other.usage;
        self.cost += other.cost;
    }
}

/// One billing run of a session: the derived event plus its charging state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SessionRun {
    pub event: Event,
    #[serde(rename = "CD")]
    pub cd: CallDescriptor,
    pub event_cost: Option<EventCost>,
    #[serde(with = "duration_ns")]
    pub extra_duration: Duration,
    #[serde(with = "duration_ns")]
    pub last_usage: Duration,
    #[serde(with = "duration_ns")]
    pub total_usage: Duration,
    pub next_auto_debit: Option<DateTime<Utc>>,
}

impl SessionRun {
    /// Applies a last-used correction then consumes the reserved
    /// `extra_duration`. Returns the remainder still to be debited from
    /// the rater (zero when the reservation covers the whole request).
    pub fn debit_reserve(&mut self, dur: Duration, last_used: Option<Duration>) -> Duration {
        if let Some(lu) = last_used {
            if self.last_usage != lu {
                if lu <= self.last_usage {
                    // consumed less than reserved: return the difference
                    self.extra_duration += self.last_usage - lu;
                } else {
                    self.extra_duration = self.extra_duration.saturating_sub(lu - self.last_usage);
                }
                self.total_usage = self.total_usage.saturating_sub(self.last_usage) + lu;
                self.last_usage = lu;
            }
        }
        if self.extra_duration >= dur {
            self.extra_duration -= dur;
            self.last_usage = dur;
            self.total_usage += dur;
            return Duration::ZERO;
        }
        let remainder = dur - self.extra_duration;
        self.extra_duration = Duration::ZERO;
        remainder
    }

    /// Books `dur` as charged usage after a successful rater debit.
    pub fn book_usage(&mut self, dur: Duration) {
        self.last_usage = dur;
        self.total_usage += dur;
    }

    pub fn cost(&self) -> Decimal {
        self.event_cost
            .as_ref()
            .map(|ec| ec.cost)
            .unwrap_or_default()
    }
}

/// A charging session, active or passive. Concurrency state (debit stop
/// token, terminator handle) lives in the registry entry, never here, so
/// a session serializes cleanly for replication and backup.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Session {
    #[serde(rename = "CGRID")]
    pub session_id: String,
    pub tenant: String,
    pub event_start: Event,
    #[serde(default)]
    pub opts: Event,
    #[serde(rename = "ResourceID", default)]
    pub resource_id: Option<String>,
    #[serde(rename = "ClientConnID", default)]
    pub client_conn_id: Option<String>,
    #[serde(with = "duration_ns")]
    pub debit_interval: Duration,
    pub chargeable: bool,
    #[serde(with = "opt_duration_ns", default)]
    pub ttl: Option<Duration>,
    #[serde(with = "opt_duration_ns", default)]
    pub ttl_max_delay: Option<Duration>,
    #[serde(with = "opt_duration_ns", default)]
    pub ttl_last_used: Option<Duration>,
    #[serde(with = "opt_duration_ns", default)]
    pub ttl_usage: Option<Duration>,
    #[serde(with = "opt_duration_ns", default)]
    pub ttl_last_usage: Option<Duration>,
    pub runs: Vec<SessionRun>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    /// A session with no start event and no runs is a replication
    /// removal marker.
    pub fn is_removal_marker(&self) -> bool {
        self.event_start.is_empty() && self.runs.is_empty()
    }

    pub fn removal_marker(session_id: &str, tenant: &str) -> Self {
        Session {
            session_id: session_id.to_string(),
            tenant: tenant.to_string(),
            updated_at: Utc::now(),
            chargeable: true,
            ..Default::default()
        }
    }

    /// Total usage across runs: the maximum, since every run observes
    /// the same call.
    pub fn total_usage(&self) -> Duration {
        self.runs
            .iter()
            .map(|r| r.total_usage)
            .max()
            .unwrap_or(Duration::ZERO)
    }

    pub fn origin_id(&self) -> String {
        self.event_start
            .origin_id()
            .unwrap_or_default()
    }

    /// True when any run should run a prepaid debit loop.
    pub fn wants_debit_loop(&self) -> bool {
        self.debit_interval > Duration::ZERO
            && self.runs.iter().any(|r| {
                r.event.request_type() == super::event::request_types::PREPAID
            })
    }

    /// Projection of one run for the session-listing APIs.
    pub fn as_external(&self, run_idx: usize, node_id: &str) -> ExternalSession {
        let run = &self.runs[run_idx];
        ExternalSession {
            session_id: self.session_id.clone(),
            run_id: run.cd.run_id.clone(),
            tor: run.cd.tor.clone(),
            origin_id: self.origin_id(),
            origin_host: self
                .event_start
                .get_str(fields::ORIGIN_HOST)
                .unwrap_or_default(),
            source: format!("sessions_{}", node_id),
            request_type: run.event.request_type(),
            tenant: self.tenant.clone(),
            category: run.cd.category.clone(),
            account: run.cd.account.clone(),
            subject: run.cd.subject.clone(),
            destination: run.cd.destination.clone(),
            setup_time: run.event.get_time(fields::SETUP_TIME),
            answer_time: run.event.get_time(fields::ANSWER_TIME),
            usage: run.total_usage,
            extra_duration: run.extra_duration,
            next_auto_debit: run.next_auto_debit,
            node_id: node_id.to_string(),
            debit_interval: self.debit_interval,
        }
    }
}

/// Flattened per-run session view returned by the listing APIs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ExternalSession {
    #[serde(rename = "CGRID")]
    pub session_id: String,
    #[serde(rename = "RunID")]
    pub run_id: String,
    #[serde(rename = "ToR")]
    pub tor: String,
    #[serde(rename = "OriginID")]
    pub origin_id: String,
    pub origin_host: String,
    pub source: String,
    pub request_type: String,
    pub tenant: String,
    pub category: String,
    pub account: String,
    pub subject: String,
    pub destination: String,
    pub setup_time: Option<DateTime<Utc>>,
    pub answer_time: Option<DateTime<Utc>>,
    #[serde(with = "duration_ns")]
    pub usage: Duration,
    #[serde(with = "duration_ns")]
    pub extra_duration: Duration,
    pub next_auto_debit: Option<DateTime<Utc>>,
    #[serde(rename = "NodeID")]
    pub node_id: String,
    #[serde(with = "duration_ns")]
    pub debit_interval: Duration,
}
