// src/models/event.rs
use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Well-known event field names (CGRateS-compatible wire naming).
pub mod fields {
    pub const ACCOUNT: &str = "Account";
    pub const ANSWER_TIME: &str = "AnswerTime";
    pub const CATEGORY: &str = "Category";
    pub const COST: &str = "Cost";
    pub const COST_DETAILS: &str = "CostDetails";
    pub const COST_SOURCE: &str = "CostSource";
    pub const DESTINATION: &str = "Destination";
    pub const DISCONNECT_CAUSE: &str = "DisconnectCause";
    pub const INITIAL_ORIGIN_ID: &str = "InitialOriginID";
    pub const LAST_USED: &str = "LastUsed";
    pub const ORIGIN_HOST: &str = "OriginHost";
    pub const ORIGIN_ID: &str = "OriginID";
    pub const REQUEST_TYPE: &str = "RequestType";
    pub const RUN_ID: &str = "RunID";
    pub const SESSION_ID: &str = "CGRID";
    pub const SETUP_TIME: &str = "SetupTime";
    pub const SOURCE: &str = "Source";
    pub const SUBJECT: &str = "Subject";
    pub const TENANT: &str = "Tenant";
    pub const TOR: &str = "ToR";
    pub const TOTAL_USAGE: &str = "TotalUsage";
    pub const USAGE: &str = "Usage";
}

/// Per-session option names carried in the request `Opts` map.
pub mod opts {
    pub const CHARGEABLE: &str = "Chargeable";
    pub const CLIENT_CONN_ID: &str = "ClientConnID";
    pub const DEBIT_INTERVAL: &str = "DebitInterval";
    pub const RESOURCE_ID: &str = "ResourceID";
    pub const SESSION_TTL: &str = "SessionTTL";
    pub const SESSION_TTL_LAST_USAGE: &str = "SessionTTLLastUsage";
    pub const SESSION_TTL_LAST_USED: &str = "SessionTTLLastUsed";
    pub const SESSION_TTL_MAX_DELAY: &str = "SessionTTLMaxDelay";
    pub const SESSION_TTL_USAGE: &str = "SessionTTLUsage";
}

/// Request type values understood by the engine.
pub mod request_types {
    pub const PREPAID: &str = "*prepaid";
    pub const POSTPAID: &str = "*postpaid";
    pub const PSEUDO_PREPAID: &str = "*pseudoprepaid";
    pub const RATED: &str = "*rated";
    pub const NONE: &str = "*none";
}

/// Default run id used when a billing run carries none.
pub const DEFAULT_RUN_ID: &str = "*default";

/// Index sentinel for a field absent from the event.
pub const NOT_AVAILABLE: &str = "N/A";
/// Index sentinel for a field present but empty.
pub const EMPTY_VALUE: &str = "*empty";

/// Untyped event map carried through the whole session lifecycle.
///
/// Fields are JSON values keyed by their wire names; typed access goes
/// through the getters below so every caller agrees on coercion rules.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Event(pub HashMap<String, Value>);

impl Event {
    pub fn new() -> Self {
        Event(HashMap::new())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn set(&mut self, name: &str, value: Value) {
        self.0.insert(name.to_string(), value);
    }

    pub fn set_str(&mut self, name: &str, value: &str) {
        self.0.insert(name.to_string(), Value::String(value.to_string()));
    }

    pub fn set_duration(&mut self, name: &str, d: Duration) {
        self.0
            .insert(name.to_string(), Value::Number((d.as_nanos() as i64).into()));
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.0.remove(name)
    }

    /// String form of a field; numbers and booleans are stringified.
    pub fn get_str(&self, name: &str) -> Option<String> {
        match self.0.get(name)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    /// Field value rendered for index lookups: `N/A` when missing,
    /// `*empty` when present but blank.
    pub fn index_value(&self, name: &str) -> String {
        match self.get_str(name) {
            None => NOT_AVAILABLE.to_string(),
            Some(s) if s.is_empty() => EMPTY_VALUE.to_string(),
            Some(s) => s,
        }
    }

    pub fn get_bool(&self, name: &str) -> Option<bool> {
        match self.0.get(name)? {
            Value::Bool(b) => Some(*b),
            Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    /// Duration of a field: plain integers are nanoseconds, bare floats
    /// are seconds, strings accept `ns`/`ms`/`s`/`m`/`h` suffix notation
    /// like `"1m30s"` (no suffix means seconds).
    pub fn get_duration(&self, name: &str) -> Option<Duration> {
        match self.0.get(name)? {
            Value::Number(n) => {
                if let Some(ns) = n.as_i64() {
                    Some(Duration::from_nanos(ns.max(0) as u64))
                } else {
                    n.as_f64().map(Duration::from_secs_f64)
                }
            }
            Value::String(s) => parse_duration(s),
            _ => None,
        }
    }

    pub fn get_time(&self, name: &str) -> Option<DateTime<Utc>> {
        match self.0.get(name)? {
            Value::String(s) if !s.is_empty() => s.parse().ok(),
            _ => None,
        }
    }

    pub fn tenant(&self) -> Option<String> {
        self.get_str(fields::TENANT)
    }

    pub fn origin_id(&self) -> Option<String> {
        self.get_str(fields::ORIGIN_ID)
    }

    pub fn request_type(&self) -> String {
        self.get_str(fields::REQUEST_TYPE)
            .unwrap_or_else(|| request_types::RATED.to_string())
    }

    /// Overlay `other` onto this event, skipping the protected identity
    /// fields that must never change mid-session.
    pub fn merge(&mut self, other: &Event) {
        const PROTECTED: [&str; 3] = [fields::SESSION_ID, fields::ORIGIN_ID, fields::ORIGIN_HOST];
        for (k, v) in &other.0 {
            if PROTECTED.contains(&k.as_str()) {
                continue;
            }
            self.0.insert(k.clone(), v.clone());
        }
    }
}

/// Parses `"90s"`, `"1m30s"`, `"250ms"`, `"2h"`; a bare number is seconds.
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(secs) = s.parse::<f64>() {
        if secs < 0.0 {
            return None;
        }
        return Some(Duration::from_secs_f64(secs));
    }

    let mut total = Duration::ZERO;
    let mut num = String::new();
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        if c.is_ascii_digit() || c == '.' {
            num.push(c);
            continue;
        }
        let value: f64 = num.parse().ok()?;
        num.clear();
        let unit = match c {
            'n' if chars.peek() == Some(&'s') => {
                chars.next();
                total += Duration::from_nanos(value as u64);
                continue;
            }
            'm' if chars.peek() == Some(&'s') => {
                chars.next();
                total += Duration::from_secs_f64(value / 1000.0);
                continue;
            }
            'h' => 3600.0,
            'm' => 60.0,
            's' => 1.0,
            _ => return None,
        };
        total += Duration::from_secs_f64(value * unit);
    }
    if !num.is_empty() {
        // trailing bare number without unit
        return None;
    }
    Some(total)
}

/// Serde helpers for `Duration` carried as wire nanoseconds.
pub mod duration_ns {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_nanos() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let ns = u64::deserialize(d)?;
        Ok(Duration::from_nanos(ns))
    }
}

/// Same as [`duration_ns`] for optional durations.
pub mod opt_duration_ns {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match d {
            Some(d) => s.serialize_some(&(d.as_nanos() as u64)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        let ns = Option::<u64>::deserialize(d)?;
        Ok(ns.map(Duration::from_nanos))
    }
}
