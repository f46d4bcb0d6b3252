//! Periodic cleanup for the in-memory stores.
//!
//! The demo server keeps nonces and key-value entries in process memory.
//! Expired key-value entries are otherwise only dropped when read again and
//! nonce records never expire, so a sweeper trims both on a fixed interval.

use std::time::Duration;

use tokio::time;

use crate::store::{MemoryKeyValueStore, MemoryNonceStore};

pub struct StoreSweeper {
    nonces: MemoryNonceStore,
    kv: MemoryKeyValueStore,
    nonce_retention_ms: u64,
    interval: Duration,
}

impl StoreSweeper {
    pub fn new(
        nonces: MemoryNonceStore,
        kv: MemoryKeyValueStore,
        nonce_retention: Duration,
        interval: Duration,
    ) -> Self {
        Self {
            nonces,
            kv,
            nonce_retention_ms: u64::try_from(nonce_retention.as_millis()).unwrap_or(u64::MAX),
            interval,
        }
    }

    /// One cleanup pass. Returns `(nonces removed, entries removed)`.
    pub fn sweep(&self) -> (usize, usize) {
        let before = self.nonces.len();
        self.nonces.purge_older_than(self.nonce_retention_ms);
        let nonces = before.saturating_sub(self.nonces.len());
        let entries = self.kv.purge_expired();
        (nonces, entries)
    }

    pub async fn run(self) {
        tracing::info!(
            interval_secs = self.interval.as_secs(),
            nonce_retention_ms = self.nonce_retention_ms,
            "Store sweeper starting"
        );

        let mut ticker = time::interval(self.interval);
        loop {
            ticker.tick().await;
            let (nonces, entries) = self.sweep();
            if nonces > 0 || entries > 0 {
                tracing::debug!(nonces = nonces, entries = entries, "Purged stale store records");
            }
        }
    }
}
