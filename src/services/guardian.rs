// src/services/guardian.rs
//! Named per-identifier locks serializing the lifecycle operations of a
//! single session (init/update/terminate by origin id). Lock entries are
//! created on demand and kept for the process lifetime; the id space is
//! bounded by concurrent calls.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::error::SessionError;

pub struct Guardian {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    timeout: Duration,
}

impl Guardian {
    pub fn new(timeout: Duration) -> Self {
        Guardian {
            locks: Mutex::new(HashMap::new()),
            timeout,
        }
    }

    /// Acquires the named lock, failing with `LockTimeout` when another
    /// holder does not release it within the configured window.
    pub async fn lock(&self, key: &str) -> Result<OwnedMutexGuard<()>, SessionError> {
        let entry = {
            let mut locks = self.locks.lock().await;
            locks
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        tokio::time::timeout(self.timeout, entry.lock_owned())
            .await
            .map_err(|_| SessionError::LockTimeout(key.to_string()))
    }
}
