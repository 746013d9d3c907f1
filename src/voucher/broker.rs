//! Staged authentication for the BinAuth handoff.
//!
//! Flow Overview:
//! 1) `/binauth-stage` validates a voucher and stages `duration * 60` seconds for the
//!    client's MAC.
//! 2) The gateway's BinAuth script calls `/binauth-check`, which consumes the entry.
//! 3) Entries nobody consumes are removed after [`STAGED_AUTH_TTL`].
//!
//! Consumption and expiry both take the map lock, so exactly one of them removes a
//! given entry. Each entry carries a generation number; the expiry task only removes
//! the entry it was scheduled for, never a later re-stage for the same MAC.

use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};
use tokio::{sync::Mutex, task::AbortHandle, time::sleep};
use tracing::debug;

/// How long a staged grant waits for the BinAuth check.
pub const STAGED_AUTH_TTL: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum BrokerError {
    #[error("no staged authentication for client")]
    NotFound,
}

#[derive(Debug)]
struct StagedEntry {
    duration_seconds: i64,
    generation: u64,
    expiry: AbortHandle,
}

type Entries = Arc<Mutex<HashMap<String, StagedEntry>>>;

/// MAC-keyed, read-once store of granted durations.
#[derive(Debug)]
pub struct StagedAuthBroker {
    ttl: Duration,
    entries: Entries,
    next_generation: AtomicU64,
}

impl Default for StagedAuthBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl StagedAuthBroker {
    #[must_use]
    pub fn new() -> Self {
        Self::with_ttl(STAGED_AUTH_TTL)
    }

    #[must_use]
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Arc::new(Mutex::new(HashMap::new())),
            next_generation: AtomicU64::new(0),
        }
    }

    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Stage `duration_minutes` for `mac`, replacing any grant already staged for it.
    ///
    /// Must be called from within a tokio runtime; the expiry runs as a spawned task.
    pub async fn stage(&self, mac: &str, duration_minutes: i64) {
        let duration_seconds = duration_minutes.saturating_mul(60);
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);

        let mut entries = self.entries.lock().await;
        let expiry = self.schedule_expiry(mac.to_string(), generation);
        let replaced = entries.insert(
            mac.to_string(),
            StagedEntry {
                duration_seconds,
                generation,
                expiry,
            },
        );
        if let Some(previous) = replaced {
            previous.expiry.abort();
        }

        debug!(mac = %mac, duration_seconds, "staged authentication");
    }

    /// Take the grant staged for `mac`. A grant can be taken only once.
    ///
    /// # Errors
    /// Returns `BrokerError::NotFound` if nothing is staged, or the grant was already
    /// consumed or has expired.
    pub async fn consume(&self, mac: &str) -> Result<i64, BrokerError> {
        let mut entries = self.entries.lock().await;
        let entry = entries.remove(mac).ok_or(BrokerError::NotFound)?;
        entry.expiry.abort();

        debug!(mac = %mac, duration_seconds = entry.duration_seconds, "consumed staged authentication");
        Ok(entry.duration_seconds)
    }

    /// Number of grants currently waiting to be consumed.
    pub async fn pending(&self) -> usize {
        self.entries.lock().await.len()
    }

    fn schedule_expiry(&self, mac: String, generation: u64) -> AbortHandle {
        let entries = Arc::clone(&self.entries);
        let ttl = self.ttl;
        tokio::spawn(async move {
            sleep(ttl).await;
            let mut entries = entries.lock().await;
            if entries
                .get(&mac)
                .is_some_and(|entry| entry.generation == generation)
            {
                entries.remove(&mac);
                debug!(mac = %mac, "staged authentication expired");
            }
        })
        .abort_handle()
    }
}
