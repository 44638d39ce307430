//! The metadata ledger: one [`Metadata`] record per root, stored in the ledger collection.
//!
//! Reads are answered from an in-memory snapshot cache whenever possible. The cache is fed by
//! one live subscription per key and by this client's own successful writes. Keys that miss the
//! cache are fetched from the network, with concurrent misses for the same key sharing a single
//! in-flight request.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, Weak};

use futures::future::{BoxFuture, FutureExt, Shared};

use crate::firestore::api::{CollectionReference, DocumentReference, DocumentSnapshot};
use crate::firestore::error::{FirestoreError, FirestoreResult};
use crate::firestore::remote::{ListenerRegistration, RemoteStoreArc, Source};
use crate::firestore::value::FirestoreValue;
use crate::util::ClockArc;

use super::metadata::{Metadata, UPDATE_MAP_FIELD};
use super::node::TreeNode;

type MetadataFetch = Shared<BoxFuture<'static, Result<Option<Metadata>, FirestoreError>>>;

#[derive(Clone)]
pub struct MetadataLedger {
    inner: Arc<LedgerInner>,
}

struct LedgerInner {
    store: RemoteStoreArc,
    collection: CollectionReference,
    metadata_name: String,
    clock: ClockArc,
    snapshots: Mutex<HashMap<String, Option<Metadata>>>,
    // `None` while a subscription is being registered.
    subscriptions: Mutex<HashMap<String, Option<ListenerRegistration>>>,
    broken_subscriptions: Mutex<HashSet<String>>,
    in_flight: Mutex<HashMap<String, MetadataFetch>>,
    root_locks: Mutex<HashMap<String, Arc<async_lock::Mutex<()>>>>,
}

impl MetadataLedger {
    pub fn new(
        store: RemoteStoreArc,
        collection: CollectionReference,
        metadata_name: impl Into<String>,
        clock: ClockArc,
    ) -> Self {
        Self {
            inner: Arc::new(LedgerInner {
                store,
                collection,
                metadata_name: metadata_name.into(),
                clock,
                snapshots: Mutex::new(HashMap::new()),
                subscriptions: Mutex::new(HashMap::new()),
                broken_subscriptions: Mutex::new(HashSet::new()),
                in_flight: Mutex::new(HashMap::new()),
                root_locks: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn collection(&self) -> &CollectionReference {
        &self.inner.collection
    }

    /// Fresh record for `key` using the ledger defaults.
    pub fn new_record(&self, key: &str) -> Metadata {
        Metadata::builder(self.inner.clock.now())
            .id(key)
            .name(self.inner.metadata_name.clone())
            .path(self.inner.collection.path().canonical_string())
            .build()
    }

    /// Snapshot cache content for `key`, without touching the network.
    pub fn cached(&self, key: &str) -> Option<Option<Metadata>> {
        self.inner.snapshots.lock().unwrap().get(key).cloned()
    }

    pub fn has_live_subscription(&self, key: &str) -> bool {
        let registered = matches!(self.inner.subscriptions.lock().unwrap().get(key), Some(Some(_)));
        registered && !self.inner.broken_subscriptions.lock().unwrap().contains(key)
    }

    /// Current ledger record for `key`, `None` when the root has none.
    pub async fn read(&self, key: &str) -> FirestoreResult<Option<Metadata>> {
        if let Some(cached) = self.cached(key) {
            return Ok(cached);
        }

        let reference = self.reference(key).inspect_err(|err| {
            log::error!("READ_METADATA: invalid metadata key '{key}': {err}");
        })?;
        self.ensure_subscribed(key, &reference);
        if let Some(cached) = self.cached(key) {
            return Ok(cached);
        }

        let fetch = self.shared_fetch(key, reference);
        let result = fetch.clone().await;
        {
            let mut in_flight = self.inner.in_flight.lock().unwrap();
            if in_flight
                .get(key)
                .is_some_and(|current| Shared::ptr_eq(current, &fetch))
            {
                in_flight.remove(key);
            }
        }

        match result {
            Ok(metadata) => {
                log::debug!("READ_METADATA: read metadata '{key}' from the network");
                self.inner
                    .snapshots
                    .lock()
                    .unwrap()
                    .entry(key.to_string())
                    .or_insert_with(|| metadata.clone());
                Ok(metadata)
            }
            Err(err) => {
                log::error!("READ_METADATA: cannot read metadata '{key}': {err}");
                Err(err)
            }
        }
    }

    pub async fn write(&self, key: &str, metadata: &Metadata) -> bool {
        let result = async {
            let reference = self.reference(key)?;
            let data = metadata.to_map()?;
            self.inner.store.set_document(&reference, data).await
        }
        .await;
        match result {
            Ok(()) => {
                self.remember(key, Some(metadata.clone()));
                log::debug!("WRITE_METADATA: wrote metadata '{key}'");
                true
            }
            Err(err) => {
                log::error!("WRITE_METADATA: cannot write metadata '{key}': {err}");
                false
            }
        }
    }

    pub async fn update(&self, key: &str, field: &str, value: FirestoreValue) -> bool {
        let result = async {
            let reference = self.reference(key)?;
            self.inner
                .store
                .update_document(&reference, field, value.clone())
                .await
        }
        .await;
        match result {
            Ok(()) => {
                self.apply_local_update(key, field, value);
                log::debug!("UPDATE_METADATA: updated '{field}' of metadata '{key}'");
                true
            }
            Err(err) => {
                log::error!("UPDATE_METADATA: cannot update metadata '{key}': {err}");
                false
            }
        }
    }

    pub async fn delete(&self, key: &str) -> bool {
        let result = async {
            let reference = self.reference(key)?;
            self.inner.store.delete_document(&reference).await
        }
        .await;
        match result {
            Ok(()) => {
                self.remember(key, None);
                log::debug!("DELETE_METADATA: deleted metadata '{key}'");
                true
            }
            Err(err) => {
                log::error!("DELETE_METADATA: cannot delete metadata '{key}': {err}");
                false
            }
        }
    }

    /// Records one modification of `affected_path` in the record of `root`.
    ///
    /// The path (removed instead when `is_delete`), its parent and the `all<Type>` key all get
    /// the same timestamp and are persisted with a single store call. Stamps of one root are
    /// serialized. A root without a record gets one.
    ///
    /// The whole `updateMap` is written back from this ledger's copy, so the serialization only
    /// holds within this process: a concurrent stamp from another client can be overwritten.
    pub async fn stamp(&self, root: &str, affected_path: &str, node_type: Option<&str>, is_delete: bool) -> bool {
        let lock = self.root_lock(root);
        let _guard = lock.lock().await;

        let current = match self.read(root).await {
            Ok(current) => current,
            Err(err) => {
                log::error!("UPDATE_METADATA: cannot stamp '{affected_path}' under '{root}': {err}");
                return false;
            }
        };
        let now = self.inner.clock.now();
        match current {
            Some(mut metadata) => {
                metadata.apply_stamp(affected_path, node_type, is_delete, now);
                self.update(root, UPDATE_MAP_FIELD, metadata.update_map_value())
                    .await
            }
            None => {
                let mut metadata = self.new_record(root);
                metadata.apply_stamp(affected_path, node_type, is_delete, now);
                self.write(root, &metadata).await
            }
        }
    }

    fn reference(&self, key: &str) -> FirestoreResult<DocumentReference> {
        self.inner.collection.doc(Some(key))
    }

    fn root_lock(&self, root: &str) -> Arc<async_lock::Mutex<()>> {
        self.inner
            .root_locks
            .lock()
            .unwrap()
            .entry(root.to_string())
            .or_insert_with(|| Arc::new(async_lock::Mutex::new(())))
            .clone()
    }

    fn remember(&self, key: &str, metadata: Option<Metadata>) {
        self.inner
            .snapshots
            .lock()
            .unwrap()
            .insert(key.to_string(), metadata);
    }

    fn apply_local_update(&self, key: &str, field: &str, value: FirestoreValue) {
        let mut snapshots = self.inner.snapshots.lock().unwrap();
        let Some(Some(current)) = snapshots.get(key) else {
            return;
        };
        let updated = current.to_map().and_then(|mut map| {
            map.insert(field, value);
            Metadata::from_map(&map)
        });
        match updated {
            Ok(updated) => {
                snapshots.insert(key.to_string(), Some(updated));
            }
            Err(err) => {
                log::warn!("UPDATE_METADATA: dropping cached metadata '{key}': {err}");
                snapshots.remove(key);
            }
        }
    }

    fn shared_fetch(&self, key: &str, reference: DocumentReference) -> MetadataFetch {
        let mut in_flight = self.inner.in_flight.lock().unwrap();
        if let Some(existing) = in_flight.get(key) {
            return existing.clone();
        }
        let store = Arc::clone(&self.inner.store);
        let fetch = async move {
            let snapshot = store.get_document(&reference, Source::Default).await?;
            decode_snapshot(&snapshot)
        }
        .boxed()
        .shared();
        in_flight.insert(key.to_string(), fetch.clone());
        fetch
    }

    fn ensure_subscribed(&self, key: &str, reference: &DocumentReference) {
        {
            let mut subscriptions = self.inner.subscriptions.lock().unwrap();
            let broken = self.inner.broken_subscriptions.lock().unwrap().remove(key);
            if subscriptions.contains_key(key) && !broken {
                return;
            }
            subscriptions.insert(key.to_string(), None);
        }

        // The store may invoke the listener before `subscribe` returns, so no ledger lock may be
        // held here.
        let weak: Weak<LedgerInner> = Arc::downgrade(&self.inner);
        let listener_key = key.to_string();
        let registration = self.inner.store.subscribe(
            reference,
            Arc::new(move |result: FirestoreResult<DocumentSnapshot>| {
                if let Some(inner) = weak.upgrade() {
                    inner.on_snapshot(&listener_key, result);
                }
            }),
        );

        let previous = self
            .inner
            .subscriptions
            .lock()
            .unwrap()
            .insert(key.to_string(), Some(registration));
        drop(previous);
    }
}

impl LedgerInner {
    fn on_snapshot(&self, key: &str, result: FirestoreResult<DocumentSnapshot>) {
        match result.and_then(|snapshot| decode_snapshot(&snapshot)) {
            Ok(metadata) => {
                self.snapshots
                    .lock()
                    .unwrap()
                    .insert(key.to_string(), metadata);
            }
            Err(err) => {
                log::error!("READ_METADATA: live metadata subscription for '{key}' failed: {err}");
                self.snapshots.lock().unwrap().remove(key);
                self.broken_subscriptions
                    .lock()
                    .unwrap()
                    .insert(key.to_string());
            }
        }
    }
}

fn decode_snapshot(snapshot: &DocumentSnapshot) -> FirestoreResult<Option<Metadata>> {
    snapshot.map_value().map(Metadata::from_map).transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::firestore::model::Timestamp;
    use crate::firestore::remote::{InMemoryRemoteStore, RemoteStore};
    use crate::util::ManualClock;
    use std::time::Duration;

    fn ledger(store: &InMemoryRemoteStore, clock: &ManualClock) -> MetadataLedger {
        MetadataLedger::new(
            Arc::new(store.clone()),
            CollectionReference::from_string("metadata").unwrap(),
            "metadata",
            Arc::new(clock.clone()),
        )
    }

    #[tokio::test]
    async fn first_stamp_creates_the_record() {
        let store = InMemoryRemoteStore::new();
        let clock = ManualClock::from_millis(1_000);
        let ledger = ledger(&store, &clock);

        assert!(ledger.stamp("acct1", "acct1/profile", Some("Profile"), false).await);

        let record = ledger.read("acct1").await.unwrap().unwrap();
        let t0 = Timestamp::from_millis(1_000);
        assert_eq!(record.header.id.as_deref(), Some("acct1"));
        assert_eq!(record.last_update_for("acct1/profile"), Some(t0));
        assert_eq!(record.last_update_for("acct1"), Some(t0));
        assert_eq!(record.last_update_for("allProfile"), Some(t0));
        assert_eq!(record.update_map.len(), 3);

        let stored = Metadata::from_map(&store.server_document("metadata/acct1").unwrap()).unwrap();
        assert_eq!(stored, record);
    }

    #[tokio::test]
    async fn later_stamps_update_in_place() {
        let store = InMemoryRemoteStore::new();
        let clock = ManualClock::from_millis(1_000);
        let ledger = ledger(&store, &clock);
        assert!(ledger.stamp("acct1", "acct1/profile", Some("Profile"), false).await);

        clock.advance(Duration::from_millis(10));
        assert!(
            ledger
                .stamp("acct1", "acct1/profile/children/n1", Some("Note"), false)
                .await
        );
        clock.advance(Duration::from_millis(10));
        assert!(ledger.stamp("acct1", "acct1/profile/children/n1", None, true).await);

        let stored = Metadata::from_map(&store.server_document("metadata/acct1").unwrap()).unwrap();
        assert_eq!(stored.last_update_for("acct1/profile"), Some(Timestamp::from_millis(1_000)));
        assert_eq!(stored.last_update_for("acct1/profile/children/n1"), None);
        assert_eq!(
            stored.last_update_for("acct1/profile/children"),
            Some(Timestamp::from_millis(1_020))
        );
        assert_eq!(stored.last_update_for("allNote"), Some(Timestamp::from_millis(1_010)));
        assert_eq!(ledger.cached("acct1"), Some(Some(stored)));
    }

    #[tokio::test]
    async fn read_is_served_by_the_subscription() {
        let store = InMemoryRemoteStore::new();
        let clock = ManualClock::from_millis(0);
        let ledger = ledger(&store, &clock);

        assert_eq!(ledger.read("acct1").await.unwrap(), None);
        assert!(ledger.has_live_subscription("acct1"));
        assert_eq!(store.network_reads(), 0);

        let other = self::ledger(&store, &clock);
        assert!(other.stamp("acct1", "acct1/profile", Some("Profile"), false).await);
        let seen = ledger.read("acct1").await.unwrap().unwrap();
        assert!(seen.last_update_for("acct1/profile").is_some());
        assert_eq!(store.listener_count(), 2);
    }

    #[tokio::test]
    async fn subscription_error_does_not_fail_the_read() {
        let store = InMemoryRemoteStore::new();
        let clock = ManualClock::from_millis(0);
        let writer = ledger(&store, &clock);
        assert!(writer.stamp("acct1", "acct1/profile", Some("Profile"), false).await);

        store.fail_subscriptions(true);
        let reader = ledger(&store, &clock);
        let record = reader.read("acct1").await.unwrap().unwrap();
        assert!(record.last_update_for("allProfile").is_some());
        assert_eq!(store.network_reads_for("metadata/acct1"), 1);
        assert!(!reader.has_live_subscription("acct1"));

        store.clear_failures();
        store.evict_cache();
        reader.inner.snapshots.lock().unwrap().clear();
        reader.read("acct1").await.unwrap();
        assert!(reader.has_live_subscription("acct1"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn concurrent_misses_share_one_fetch() {
        let store = InMemoryRemoteStore::with_latency(Duration::from_millis(50));
        let clock = ManualClock::from_millis(0);
        let writer = ledger(&store, &clock);
        assert!(writer.stamp("acct1", "acct1/profile", Some("Profile"), false).await);

        store.fail_subscriptions(true);
        let reader = ledger(&store, &clock);
        let (a, b, c) = tokio::join!(reader.read("acct1"), reader.read("acct1"), reader.read("acct1"));
        assert_eq!(a.unwrap(), b.unwrap());
        assert!(c.unwrap().is_some());
        assert_eq!(store.network_reads_for("metadata/acct1"), 1);
    }

    #[tokio::test]
    async fn concurrent_stamps_of_one_root_keep_every_entry() {
        let store = InMemoryRemoteStore::with_latency(Duration::from_millis(5));
        let clock = ManualClock::from_millis(1_000);
        let ledger = ledger(&store, &clock);

        let paths: Vec<String> = (0..8).map(|index| format!("acct1/profile/children/n{index}")).collect();
        let (stamped, other_root) = tokio::join!(
            futures::future::join_all(
                paths
                    .iter()
                    .map(|path| ledger.stamp("acct1", path, Some("Note"), false))
            ),
            ledger.stamp("acct2", "acct2/profile", Some("Profile"), false),
        );
        assert!(stamped.into_iter().all(|ok| ok));
        assert!(other_root);

        let stored = Metadata::from_map(&store.server_document("metadata/acct1").unwrap()).unwrap();
        for path in &paths {
            assert!(stored.last_update_for(path).is_some(), "{path} lost");
        }
        assert!(stored.last_update_for("acct1/profile/children").is_some());
        assert!(stored.last_update_for("allNote").is_some());
        assert_eq!(stored.update_map.len(), paths.len() + 2);
        assert!(stored.last_update_for("acct2/profile").is_none());
    }

    #[tokio::test]
    async fn failures_are_reported_as_false() {
        let store = InMemoryRemoteStore::new();
        let clock = ManualClock::from_millis(0);
        let ledger = ledger(&store, &clock);
        store.fail_path("metadata/acct1");
        assert!(!ledger.stamp("acct1", "acct1/profile", Some("Profile"), false).await);
        assert!(!ledger.delete("acct1").await);
        assert!(!ledger.update("acct1", "name", FirestoreValue::from("x")).await);
        assert!(!ledger.write("bad/key", &ledger.new_record("bad")).await);
    }

    #[tokio::test]
    async fn delete_is_written_through() {
        let store = InMemoryRemoteStore::new();
        let clock = ManualClock::from_millis(0);
        let ledger = ledger(&store, &clock);
        assert!(ledger.stamp("acct1", "acct1/profile", None, false).await);
        assert!(ledger.delete("acct1").await);
        assert_eq!(ledger.cached("acct1"), Some(None));
        let snapshot = store
            .get_document(&DocumentReference::from_string("metadata/acct1").unwrap(), Source::Default)
            .await
            .unwrap();
        assert!(!snapshot.exists());
    }
}
