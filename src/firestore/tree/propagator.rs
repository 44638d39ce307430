use crate::firestore::error::FirestoreResult;

use super::ledger::MetadataLedger;
use super::path::{parent_path, tokens, type_read_key};
use super::policy::CachePolicy;

/// Keeps the ledger in step with mutations that already succeeded at the store.
#[derive(Clone)]
pub struct MutationPropagator {
    ledger: MetadataLedger,
    policy: CachePolicy,
}

impl MutationPropagator {
    pub fn new(ledger: MetadataLedger, policy: CachePolicy) -> Self {
        Self { ledger, policy }
    }

    /// Stamps a written or updated node. Returns whether the ledger now reflects the change.
    pub async fn after_write(&self, path: &str, node_type: Option<&str>) -> FirestoreResult<bool> {
        let root = tokens(path)?[0];
        if self.ledger.stamp(root, path, node_type, false).await {
            return Ok(true);
        }
        self.forget_reads(root, path, node_type).await;
        Ok(false)
    }

    /// Removes a deleted node from the ledger; deleting a root drops its whole record.
    pub async fn after_delete(&self, path: &str, node_type: Option<&str>) -> FirestoreResult<bool> {
        let tokens = tokens(path)?;
        let root = tokens[0];
        let recorded = if tokens.len() == 1 {
            self.ledger.delete(root).await
        } else {
            self.ledger.stamp(root, path, node_type, true).await
        };
        if !recorded {
            self.forget_reads(root, path, node_type).await;
        }
        Ok(recorded)
    }

    // The ledger missed this change, so nothing read before it may be served from cache.
    async fn forget_reads(&self, root: &str, path: &str, node_type: Option<&str>) {
        log::warn!("UPDATE_METADATA: ledger not updated for '{path}', resetting local read timestamps");
        self.policy.reset_last_read(path).await;
        self.policy.reset_last_read(parent_path(path)).await;
        if let Some(node_type) = node_type {
            self.policy.reset_last_read(&type_read_key(root, node_type)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::firestore::api::CollectionReference;
    use crate::firestore::local::{InMemoryReadTimestampStore, ReadTimestampStore};
    use crate::firestore::model::Timestamp;
    use crate::firestore::remote::InMemoryRemoteStore;
    use crate::util::ManualClock;
    use std::sync::Arc;

    fn propagator(store: &InMemoryRemoteStore, timestamps: Arc<InMemoryReadTimestampStore>) -> (MetadataLedger, MutationPropagator) {
        let clock = Arc::new(ManualClock::from_millis(100));
        let ledger = MetadataLedger::new(
            Arc::new(store.clone()),
            CollectionReference::from_string("metadata").unwrap(),
            "metadata",
            clock.clone(),
        );
        let policy = CachePolicy::new(ledger.clone(), timestamps, clock);
        (ledger.clone(), MutationPropagator::new(ledger, policy))
    }

    #[tokio::test]
    async fn write_then_delete_of_a_child() {
        let store = InMemoryRemoteStore::new();
        let (ledger, propagator) = propagator(&store, Arc::new(InMemoryReadTimestampStore::new()));
        assert!(propagator.after_write("acct1/profile", Some("Profile")).await.unwrap());
        assert!(propagator.after_delete("acct1/profile", Some("Profile")).await.unwrap());

        let record = ledger.read("acct1").await.unwrap().unwrap();
        assert_eq!(record.last_update_for("acct1/profile"), None);
        assert!(record.last_update_for("acct1").is_some());
        assert!(record.last_update_for("allProfile").is_some());
    }

    #[tokio::test]
    async fn deleting_the_root_drops_the_record() {
        let store = InMemoryRemoteStore::new();
        let (ledger, propagator) = propagator(&store, Arc::new(InMemoryReadTimestampStore::new()));
        assert!(propagator.after_write("acct1/profile", Some("Profile")).await.unwrap());
        assert!(propagator.after_delete("acct1", None).await.unwrap());
        assert_eq!(ledger.read("acct1").await.unwrap(), None);
        assert!(store.server_document("metadata/acct1").is_none());
    }

    #[tokio::test]
    async fn ledger_failure_resets_read_timestamps() {
        let store = InMemoryRemoteStore::new();
        let timestamps = Arc::new(InMemoryReadTimestampStore::new());
        for key in ["acct1/profile", "acct1", "acct1//allProfile", "acct2//allProfile", "acct1/other"] {
            timestamps.set(key, Timestamp::from_millis(50)).await.unwrap();
        }
        let (_, propagator) = propagator(&store, timestamps.clone());
        store.fail_path("metadata/acct1");

        assert!(!propagator.after_write("acct1/profile", Some("Profile")).await.unwrap());
        assert_eq!(timestamps.get("acct1/profile").await.unwrap(), None);
        assert_eq!(timestamps.get("acct1").await.unwrap(), None);
        assert_eq!(timestamps.get("acct1//allProfile").await.unwrap(), None);
        assert!(timestamps.get("acct2//allProfile").await.unwrap().is_some());
        assert!(timestamps.get("acct1/other").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn malformed_paths_are_rejected() {
        let store = InMemoryRemoteStore::new();
        let (_, propagator) = propagator(&store, Arc::new(InMemoryReadTimestampStore::new()));
        assert!(propagator.after_write("acct1//x", None).await.is_err());
    }
}
