use std::future::Future;

use crate::firestore::error::FirestoreResult;
use crate::firestore::local::ReadTimestampStoreArc;
use crate::firestore::model::Timestamp;
use crate::firestore::remote::Source;
use crate::util::ClockArc;

use super::ledger::MetadataLedger;

/// Where a read should be answered from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DataSource {
    Network,
    Cache,
}

impl DataSource {
    pub fn source(self) -> Source {
        match self {
            DataSource::Network => Source::Default,
            DataSource::Cache => Source::Cache,
        }
    }
}

/// The cache may serve a key only when this client read it after its last recorded change.
pub fn decide(last_read: Option<Timestamp>, last_update: Option<Timestamp>) -> DataSource {
    match (last_read, last_update) {
        (Some(last_read), Some(last_update)) if last_read.is_after(&last_update) => DataSource::Cache,
        _ => DataSource::Network,
    }
}

/// Chooses between cache and network for each read and maintains the read-timestamp table.
#[derive(Clone)]
pub struct CachePolicy {
    ledger: MetadataLedger,
    read_timestamps: ReadTimestampStoreArc,
    clock: ClockArc,
}

impl CachePolicy {
    pub fn new(ledger: MetadataLedger, read_timestamps: ReadTimestampStoreArc, clock: ClockArc) -> Self {
        Self {
            ledger,
            read_timestamps,
            clock,
        }
    }

    /// Compares the ledger entry `ledger_key` of `root_id` with the local read time of
    /// `read_key`. The two keys differ only for per-type reads, whose ledger entry is per root.
    pub async fn decide_source(&self, root_id: &str, ledger_key: &str, read_key: &str) -> DataSource {
        let last_update = match self.ledger.read(root_id).await {
            Ok(metadata) => metadata.and_then(|metadata| metadata.last_update_for(ledger_key)),
            Err(err) => {
                log::warn!(
                    "CACHE_POLICY: metadata for '{root_id}' unavailable, reading '{ledger_key}' from network: {err}"
                );
                return DataSource::Network;
            }
        };
        let last_read = match self.read_timestamps.get(read_key).await {
            Ok(last_read) => last_read,
            Err(err) => {
                log::warn!("CACHE_POLICY: read timestamp for '{read_key}' unavailable: {err}");
                return DataSource::Network;
            }
        };
        decide(last_read, last_update)
    }

    /// Runs `fetch` against the source picked for `ledger_key`.
    ///
    /// A cache decision that the local cache cannot satisfy falls back to the network. Every
    /// successful network fetch records the instant it was issued under `read_key`.
    pub async fn fetch<T, F, Fut>(&self, root_id: &str, ledger_key: &str, read_key: &str, fetch: F) -> FirestoreResult<T>
    where
        F: Fn(Source) -> Fut,
        Fut: Future<Output = FirestoreResult<T>>,
    {
        if self.decide_source(root_id, ledger_key, read_key).await == DataSource::Cache {
            match fetch(Source::Cache).await {
                Ok(value) => {
                    log::debug!("CACHE_POLICY: served '{read_key}' from cache");
                    return Ok(value);
                }
                Err(err) => {
                    log::debug!("CACHE_POLICY: cache miss for '{read_key}', falling back to network: {err}");
                }
            }
        }

        let issued_at = self.clock.now();
        let value = fetch(Source::Default).await?;
        self.record_read(read_key, issued_at).await;
        Ok(value)
    }

    pub async fn record_read(&self, key: &str, at: Timestamp) {
        if let Err(err) = self.read_timestamps.set(key, at).await {
            log::warn!("CACHE_POLICY: cannot record read timestamp for '{key}': {err}");
        }
    }

    pub async fn reset_last_read(&self, key: &str) -> bool {
        match self.read_timestamps.reset(key).await {
            Ok(()) => true,
            Err(err) => {
                log::warn!("CACHE_POLICY: cannot reset read timestamp for '{key}': {err}");
                false
            }
        }
    }

    pub async fn last_read(&self, key: &str) -> Option<Timestamp> {
        self.read_timestamps.get(key).await.ok().flatten()
    }
}
