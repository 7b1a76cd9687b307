// src/config.rs
use std::env;
use std::time::Duration;

use crate::models::fields;

#[derive(Debug, Clone)]
pub struct Config {
    pub environment: String,
    pub host: String,
    pub port: u16,
    pub node_id: String,
    pub default_tenant: String,
    pub rater_url: String,
    pub cdrs_url: String,
    pub redis_url: Option<String>,
    pub replication_peers: Vec<ReplicationPeer>,
    pub session_indexes: Vec<String>,
    pub session_ttl: Option<Duration>,
    pub session_ttl_max_delay: Option<Duration>,
    pub debit_interval: Duration,
    pub min_dur_low_balance: Duration,
    pub terminate_attempts: u32,
    pub backup_interval: Duration,
    pub lock_timeout: Duration,
    pub reply_timeout: Duration,
    pub default_usage: Duration,
}

#[derive(Debug, Clone)]
pub struct ReplicationPeer {
    pub url: String,
    pub synchronous: bool,
}

impl Config {
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        dotenv::dotenv().ok();

        let node_id = match env::var("NODE_ID") {
            Ok(id) => id,
            Err(_) => hostname::get()?.to_string_lossy().to_string(),
        };

        let replication_peers =
            Self::parse_replication_peers(&env::var("REPLICATION_PEERS").unwrap_or_default());
        let session_indexes =
            Self::parse_session_indexes(&env::var("SESSION_INDEXES").unwrap_or_default());

        Ok(Config {
            environment: env::var("ENVIRONMENT")
                .unwrap_or_else(|_| "production".to_string()),
            host: env::var("HOST")
                .unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "9010".to_string())
                .parse()?,
            node_id,
            default_tenant: env::var("DEFAULT_TENANT")
                .unwrap_or_else(|_| "cgrates.org".to_string()),
            rater_url: env::var("RATER_URL")?,
            cdrs_url: env::var("CDRS_URL")
                .or_else(|_| env::var("RATER_URL"))?,
            redis_url: env::var("REDIS_URL").ok(),
            replication_peers,
            session_indexes,
            session_ttl: parse_opt_duration("SESSION_TTL")?,
            session_ttl_max_delay: parse_opt_duration("SESSION_TTL_MAX_DELAY")?,
            debit_interval: parse_duration_or("DEBIT_INTERVAL", Duration::ZERO)?,
            min_dur_low_balance: parse_duration_or("MIN_DUR_LOW_BALANCE", Duration::from_secs(5))?,
            terminate_attempts: env::var("TERMINATE_ATTEMPTS")
                .unwrap_or_else(|_| "5".to_string())
                .parse()?,
            backup_interval: parse_duration_or("BACKUP_INTERVAL", Duration::ZERO)?,
            lock_timeout: parse_duration_or("LOCK_TIMEOUT", Duration::from_secs(5))?,
            reply_timeout: parse_duration_or("REPLY_TIMEOUT", Duration::from_secs(10))?,
            default_usage: parse_duration_or("DEFAULT_USAGE", Duration::from_secs(3 * 3600))?,
        })
    }

    /// `REPLICATION_PEERS=http://peer-a:9010;sync,http://peer-b:9010`
    fn parse_replication_peers(peers_str: &str) -> Vec<ReplicationPeer> {
        if peers_str.is_empty() {
            return Vec::new();
        }

        let mut peers = Vec::new();

        for peer_config in peers_str.split(',') {
            let mut parts = peer_config.trim().split(';');
            let Some(url) = parts.next().filter(|u| !u.is_empty()) else {
                continue;
            };
            peers.push(ReplicationPeer {
                url: url.to_string(),
                synchronous: parts.next() == Some("sync"),
            });
        }

        peers
    }

    /// Lookup index keys; `OriginID` is always present so session
    /// filtering by call id works without configuration.
    fn parse_session_indexes(indexes_str: &str) -> Vec<String> {
        let mut keys: Vec<String> = indexes_str
            .split(',')
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .collect();
        if !keys.iter().any(|k| k == fields::ORIGIN_ID) {
            keys.push(fields::ORIGIN_ID.to_string());
        }
        keys
    }

    pub fn backup_enabled(&self) -> bool {
        !self.backup_interval.is_zero() && self.redis_url.is_some()
    }
}

fn parse_duration_or(
    var: &str,
    default: Duration,
) -> Result<Duration, Box<dyn std::error::Error>> {
    match env::var(var) {
        Err(_) => Ok(default),
        Ok(raw) => crate::models::event::parse_duration(&raw)
            .ok_or_else(|| format!("invalid duration in {}: {}", var, raw).into()),
    }
}

fn parse_opt_duration(var: &str) -> Result<Option<Duration>, Box<dyn std::error::Error>> {
    match env::var(var) {
        Err(_) => Ok(None),
        Ok(raw) => crate::models::event::parse_duration(&raw)
            .map(Some)
            .ok_or_else(|| format!("invalid duration in {}: {}", var, raw).into()),
    }
}
