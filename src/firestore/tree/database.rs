//! Path-addressed tree storage with ledger-driven cache reads.
//!
//! Every operation absorbs failures: reads return `None` or an empty list, mutations return
//! `false`, and the cause is logged under the operation's tag.

use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};

use crate::firestore::api::{generate_auto_id, CollectionReference, DocumentSnapshot, FilterOperator, Query};
use crate::firestore::error::{internal_error, invalid_argument, FirestoreResult};
use crate::firestore::local::{InMemoryReadTimestampStore, ReadTimestampStoreArc};
use crate::firestore::remote::RemoteStoreArc;
use crate::firestore::value::{FirestoreValue, MapValue};
use crate::util::{ClockArc, SystemClock};

use super::fanout::{complete_with, join_all};
use super::ledger::MetadataLedger;
use super::node::{NodeRegistry, TreeNode, FIELD_LAST_UPDATE, FIELD_PATH, FIELD_TYPE};
use super::path::{all_type_key, next_alphabetic_string, parent_path, tokens, type_read_key, PathResolver};
use super::policy::CachePolicy;
use super::propagator::MutationPropagator;
use super::settings::TreeDatabaseSettings;

/// Composes a [`TreeDatabase`] from its collaborators.
pub struct TreeDatabaseBuilder<N: TreeNode> {
    store: RemoteStoreArc,
    registry: NodeRegistry<N>,
    read_timestamps: Option<ReadTimestampStoreArc>,
    clock: Option<ClockArc>,
    settings: TreeDatabaseSettings,
}

impl<N: TreeNode> TreeDatabaseBuilder<N> {
    /// Durable read-timestamp table. Defaults to a process-local one.
    pub fn with_read_timestamps(mut self, read_timestamps: ReadTimestampStoreArc) -> Self {
        self.read_timestamps = Some(read_timestamps);
        self
    }

    /// Defaults to [`SystemClock`].
    pub fn with_clock(mut self, clock: ClockArc) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn with_settings(mut self, settings: TreeDatabaseSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn build(self) -> FirestoreResult<TreeDatabase<N>> {
        self.settings.validate()?;
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let read_timestamps = self
            .read_timestamps
            .unwrap_or_else(|| Arc::new(InMemoryReadTimestampStore::new()));
        let ledger = MetadataLedger::new(
            Arc::clone(&self.store),
            CollectionReference::from_string(self.settings.ledger_collection())?,
            self.settings.default_metadata_name(),
            Arc::clone(&clock),
        );
        let policy = CachePolicy::new(ledger.clone(), read_timestamps, Arc::clone(&clock));
        let propagator = MutationPropagator::new(ledger.clone(), policy.clone());
        let resolver = PathResolver::new(
            self.settings.ledger_collection(),
            self.settings.children_collection(),
        );
        Ok(TreeDatabase {
            inner: Arc::new(TreeInner {
                store: self.store,
                registry: self.registry,
                resolver,
                ledger,
                policy,
                propagator,
                clock,
                settings: self.settings,
            }),
        })
    }
}

/// Tree of typed nodes stored in a [`RemoteStore`](crate::firestore::remote::RemoteStore).
///
/// Cloning is cheap and clones share the ledger state.
pub struct TreeDatabase<N: TreeNode> {
    inner: Arc<TreeInner<N>>,
}

struct TreeInner<N: TreeNode> {
    store: RemoteStoreArc,
    registry: NodeRegistry<N>,
    resolver: PathResolver,
    ledger: MetadataLedger,
    policy: CachePolicy,
    propagator: MutationPropagator,
    clock: ClockArc,
    settings: TreeDatabaseSettings,
}

impl<N: TreeNode> Clone for TreeDatabase<N> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<N: TreeNode> TreeDatabase<N> {
    pub fn builder(store: RemoteStoreArc, registry: NodeRegistry<N>) -> TreeDatabaseBuilder<N> {
        TreeDatabaseBuilder {
            store,
            registry,
            read_timestamps: None,
            clock: None,
            settings: TreeDatabaseSettings::default(),
        }
    }

    pub fn settings(&self) -> &TreeDatabaseSettings {
        &self.inner.settings
    }

    pub fn ledger(&self) -> &MetadataLedger {
        &self.inner.ledger
    }

    pub fn policy(&self) -> &CachePolicy {
        &self.inner.policy
    }

    pub fn resolver(&self) -> &PathResolver {
        &self.inner.resolver
    }

    pub async fn read_tree_data(&self, path: &str) -> Option<N> {
        let snapshot = match self.read_snapshot(path).await {
            Ok(snapshot) => snapshot,
            Err(err) => {
                log::error!("READ_TREE_DATA: cannot read tree data at '{path}': {err}");
                return None;
            }
        };
        match self.inner.registry.decode(&snapshot) {
            Ok(Some(node)) => {
                log::debug!("READ_TREE_DATA: read tree data at '{path}'");
                Some(node)
            }
            Ok(None) => {
                log::debug!("READ_TREE_DATA: no tree data at '{path}'");
                None
            }
            Err(err) => {
                log::error!("READ_TREE_DATA: cannot decode tree data at '{path}': {err}");
                None
            }
        }
    }

    pub async fn read_tree_data_children(&self, path: &str) -> Vec<N> {
        match self.read_children_snapshots(path).await {
            Ok(snapshots) => {
                log::debug!("READ_TREE_DATA_CHILDREN: read {} children of '{path}'", snapshots.len());
                self.decode_all("READ_TREE_DATA_CHILDREN", &snapshots)
            }
            Err(err) => {
                log::error!("READ_TREE_DATA_CHILDREN: cannot read children of '{path}': {err}");
                Vec::new()
            }
        }
    }

    /// Every node of `node_type` anywhere under `root_id`.
    pub async fn read_all_type(&self, root_id: &str, node_type: &str) -> Vec<N> {
        if let Err(err) = self.inner.resolver.validate_root(root_id) {
            log::error!("READ_ALL_TYPE: {err}");
            return Vec::new();
        }
        let query = Query::all_documents()
            .where_field(FIELD_PATH, FilterOperator::GreaterThanOrEqual, root_id)
            .where_field(FIELD_PATH, FilterOperator::LessThan, next_alphabetic_string(root_id))
            .where_field(FIELD_TYPE, FilterOperator::Equal, node_type);
        let store = Arc::clone(&self.inner.store);
        let result = self
            .inner
            .policy
            .fetch(root_id, &all_type_key(node_type), &type_read_key(root_id, node_type), |source| {
                let store = Arc::clone(&store);
                let query = query.clone();
                async move { store.run_query(&query, source).await }
            })
            .await;
        match result {
            Ok(snapshots) => {
                // The range also matches sibling roots sharing the prefix, e.g. `acct10`.
                let subtree_prefix = format!("{root_id}/");
                let in_subtree: Vec<DocumentSnapshot> = snapshots
                    .into_iter()
                    .filter(|snapshot| {
                        snapshot
                            .get(FIELD_PATH)
                            .and_then(|value| value.as_str())
                            .is_some_and(|path| path == root_id || path.starts_with(&subtree_prefix))
                    })
                    .collect();
                log::debug!(
                    "READ_ALL_TYPE: read {} '{node_type}' nodes under '{root_id}'",
                    in_subtree.len()
                );
                self.decode_all("READ_ALL_TYPE", &in_subtree)
            }
            Err(err) => {
                log::error!("READ_ALL_TYPE: cannot read '{node_type}' nodes under '{root_id}': {err}");
                Vec::new()
            }
        }
    }

    /// Stores `node` at `path`, which must equal the node's `path/id`.
    ///
    /// A node without `id` or `path` takes them from `path`. `creationDate` is set when missing
    /// and `lastUpdate` always.
    pub async fn write_tree_data(&self, path: &str, node: N) -> bool {
        match self.try_write(path, node).await {
            Ok(()) => {
                log::debug!("WRITE_TREE_DATA: wrote tree data at '{path}'");
                true
            }
            Err(err) => {
                log::error!("WRITE_TREE_DATA: cannot write tree data at '{path}': {err}");
                false
            }
        }
    }

    /// Writes each child under the children collection of `path`, generating missing ids.
    pub async fn write_tree_data_children(&self, path: &str, children: Vec<N>) -> bool {
        let children_path = match self.inner.resolver.children_path(path) {
            Ok(children_path) => children_path,
            Err(err) => {
                log::error!("WRITE_TREE_DATA_CHILDREN: {err}");
                return false;
            }
        };
        let writes = children
            .into_iter()
            .map(|mut child| {
                let header = child.header_mut();
                header.path = Some(children_path.clone());
                let id = header.id.get_or_insert_with(generate_auto_id).clone();
                let complete_path = format!("{children_path}/{id}");
                let database = self.clone();
                async move { database.write_tree_data(&complete_path, child).await }.boxed()
            })
            .collect();
        self.joined("WRITE_TREE_DATA_CHILDREN", path, writes).await
    }

    /// Sets one field of the node at `path` and refreshes its `lastUpdate` in the same write.
    pub async fn update_tree_data(&self, path: &str, field: &str, value: FirestoreValue) -> bool {
        match self.try_update(path, field, value).await {
            Ok(()) => {
                log::debug!("UPDATE_TREE_DATA: updated '{field}' at '{path}'");
                true
            }
            Err(err) => {
                log::error!("UPDATE_TREE_DATA: cannot update tree data at '{path}': {err}");
                false
            }
        }
    }

    pub async fn update_tree_data_children(&self, path: &str, field: &str, value: FirestoreValue) -> bool {
        let children = match self.read_children_snapshots(path).await {
            Ok(children) => children,
            Err(err) => {
                log::error!("UPDATE_TREE_DATA_CHILDREN: cannot read children of '{path}': {err}");
                return false;
            }
        };
        let updates = children
            .iter()
            .map(|child| {
                let database = self.clone();
                let child_path = child.document_key().path().canonical_string();
                let field = field.to_string();
                let value = value.clone();
                async move { database.update_tree_data(&child_path, &field, value).await }.boxed()
            })
            .collect();
        self.joined("UPDATE_TREE_DATA_CHILDREN", path, updates).await
    }

    /// Deletes the node at `path` after all of its descendants.
    ///
    /// A bare root id deletes every node of that root and then its ledger record.
    pub fn delete_tree_data(&self, path: &str) -> BoxFuture<'static, bool> {
        let database = self.clone();
        let path = path.to_string();
        Box::pin(async move {
            match database.try_delete(&path).await {
                Ok(()) => {
                    log::debug!("DELETE_TREE_DATA: deleted tree data at '{path}'");
                    true
                }
                Err(err) => {
                    log::error!("DELETE_TREE_DATA: cannot delete tree data at '{path}': {err}");
                    false
                }
            }
        })
    }

    pub fn delete_tree_data_children(&self, path: &str) -> BoxFuture<'static, bool> {
        let database = self.clone();
        let path = path.to_string();
        Box::pin(async move {
            let children = match database.read_children_snapshots(&path).await {
                Ok(children) => children,
                Err(err) => {
                    log::error!("DELETE_TREE_DATA_CHILDREN: cannot read children of '{path}': {err}");
                    return false;
                }
            };
            let deletes = children
                .iter()
                .map(|child| database.delete_tree_data(&child.document_key().path().canonical_string()))
                .collect();
            database.joined("DELETE_TREE_DATA_CHILDREN", &path, deletes).await
        })
    }

    /// Forgets when `key` was last read, so its next read goes to the network.
    pub async fn reset_last_read(&self, key: &str) -> bool {
        self.inner.policy.reset_last_read(key).await
    }

    pub fn read_tree_data_with<C>(&self, path: &str, callback: C)
    where
        C: FnOnce(Option<N>) + Send + 'static,
    {
        let database = self.clone();
        let path = path.to_string();
        complete_with(async move { database.read_tree_data(&path).await }, callback);
    }

    pub fn read_tree_data_children_with<C>(&self, path: &str, callback: C)
    where
        C: FnOnce(Vec<N>) + Send + 'static,
    {
        let database = self.clone();
        let path = path.to_string();
        complete_with(async move { database.read_tree_data_children(&path).await }, callback);
    }

    pub fn read_all_type_with<C>(&self, root_id: &str, node_type: &str, callback: C)
    where
        C: FnOnce(Vec<N>) + Send + 'static,
    {
        let database = self.clone();
        let root_id = root_id.to_string();
        let node_type = node_type.to_string();
        complete_with(
            async move { database.read_all_type(&root_id, &node_type).await },
            callback,
        );
    }

    pub fn write_tree_data_with<C>(&self, path: &str, node: N, callback: C)
    where
        C: FnOnce(bool) + Send + 'static,
    {
        let database = self.clone();
        let path = path.to_string();
        complete_with(async move { database.write_tree_data(&path, node).await }, callback);
    }

    pub fn write_tree_data_children_with<C>(&self, path: &str, children: Vec<N>, callback: C)
    where
        C: FnOnce(bool) + Send + 'static,
    {
        let database = self.clone();
        let path = path.to_string();
        complete_with(
            async move { database.write_tree_data_children(&path, children).await },
            callback,
        );
    }

    pub fn update_tree_data_with<C>(&self, path: &str, field: &str, value: FirestoreValue, callback: C)
    where
        C: FnOnce(bool) + Send + 'static,
    {
        let database = self.clone();
        let path = path.to_string();
        let field = field.to_string();
        complete_with(
            async move { database.update_tree_data(&path, &field, value).await },
            callback,
        );
    }

    pub fn update_tree_data_children_with<C>(&self, path: &str, field: &str, value: FirestoreValue, callback: C)
    where
        C: FnOnce(bool) + Send + 'static,
    {
        let database = self.clone();
        let path = path.to_string();
        let field = field.to_string();
        complete_with(
            async move { database.update_tree_data_children(&path, &field, value).await },
            callback,
        );
    }

    pub fn delete_tree_data_with<C>(&self, path: &str, callback: C)
    where
        C: FnOnce(bool) + Send + 'static,
    {
        complete_with(self.delete_tree_data(path), callback);
    }

    pub fn delete_tree_data_children_with<C>(&self, path: &str, callback: C)
    where
        C: FnOnce(bool) + Send + 'static,
    {
        complete_with(self.delete_tree_data_children(path), callback);
    }

    async fn read_snapshot(&self, path: &str) -> FirestoreResult<DocumentSnapshot> {
        let root = self.inner.resolver.root_of(path)?;
        let reference = self.inner.resolver.resolve_document(path)?;
        let store = Arc::clone(&self.inner.store);
        self.inner
            .policy
            .fetch(root, path, path, |source| {
                let store = Arc::clone(&store);
                let reference = reference.clone();
                async move { store.get_document(&reference, source).await }
            })
            .await
    }

    async fn read_children_snapshots(&self, path: &str) -> FirestoreResult<Vec<DocumentSnapshot>> {
        let root = self.inner.resolver.root_of(path)?;
        let children_path = self.inner.resolver.children_path(path)?;
        let collection = self.inner.resolver.resolve_collection(&children_path)?;
        let store = Arc::clone(&self.inner.store);
        self.inner
            .policy
            .fetch(root, &children_path, &children_path, |source| {
                let store = Arc::clone(&store);
                let collection = collection.clone();
                async move { store.get_collection(&collection, source).await }
            })
            .await
    }

    async fn read_node_type(&self, path: &str) -> Option<String> {
        match self.read_snapshot(path).await {
            Ok(snapshot) => snapshot
                .get(FIELD_TYPE)
                .and_then(|value| value.as_str())
                .map(str::to_string),
            Err(err) => {
                log::debug!("READ_TREE_DATA: type of '{path}' unknown: {err}");
                None
            }
        }
    }

    fn decode_all(&self, tag: &str, snapshots: &[DocumentSnapshot]) -> Vec<N> {
        snapshots
            .iter()
            .filter_map(|snapshot| match self.inner.registry.decode(snapshot) {
                Ok(node) => node,
                Err(err) => {
                    log::error!(
                        "{tag}: skipping '{}': {err}",
                        snapshot.document_key().path().canonical_string()
                    );
                    None
                }
            })
            .collect()
    }

    async fn joined(&self, tag: &str, path: &str, children: Vec<BoxFuture<'static, bool>>) -> bool {
        let count = children.len();
        if join_all(children).await {
            log::debug!("{tag}: {count} children of '{path}' done");
            true
        } else {
            log::error!("{tag}: a child operation under '{path}' failed");
            false
        }
    }

    async fn try_write(&self, path: &str, mut node: N) -> FirestoreResult<()> {
        let reference = self.inner.resolver.resolve_document(path)?;
        let header = node.header_mut();
        if header.id.is_none() {
            header.id = Some(reference.id().to_string());
        }
        if header.path.is_none() {
            header.path = Some(parent_path(path).to_string());
        }
        if header.complete_path().as_deref() != Some(path) {
            return Err(invalid_argument(format!(
                "Node path '{}' does not match '{path}'",
                header.complete_path().unwrap_or_default()
            )));
        }
        let now = self.inner.clock.now();
        header.creation_date.get_or_insert(now);
        header.last_update = Some(now);
        let node_type = header.node_type.clone();

        self.inner.store.set_document(&reference, node.to_map()?).await?;
        self.inner
            .propagator
            .after_write(path, node_type.as_deref())
            .await?;
        Ok(())
    }

    async fn try_update(&self, path: &str, field: &str, value: FirestoreValue) -> FirestoreResult<()> {
        let reference = self.inner.resolver.resolve_document(path)?;
        let node_type = self.read_node_type(path).await;
        let mut fields = MapValue::default();
        fields.insert(FIELD_LAST_UPDATE, FirestoreValue::from(self.inner.clock.now()));
        fields.insert(field, value);
        self.inner.store.update_fields(&reference, fields).await?;
        self.inner
            .propagator
            .after_write(path, node_type.as_deref())
            .await?;
        Ok(())
    }

    async fn try_delete(&self, path: &str) -> FirestoreResult<()> {
        let is_root = tokens(path)?.len() == 1;
        if is_root {
            self.inner.resolver.validate_root(path)?;
        } else {
            self.inner.resolver.resolve_document(path)?;
        }

        if !self.delete_tree_data_children(path).await {
            return Err(internal_error(format!(
                "Children of '{path}' were not all deleted"
            )));
        }

        if is_root {
            self.inner.propagator.after_delete(path, None).await?;
            return Ok(());
        }

        let reference = self.inner.resolver.resolve_document(path)?;
        let node_type = self.read_node_type(path).await;
        self.inner.store.delete_document(&reference).await?;
        self.inner
            .propagator
            .after_delete(path, node_type.as_deref())
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::firestore::model::Timestamp;
    use crate::firestore::remote::InMemoryRemoteStore;
    use crate::firestore::tree::node::RawNode;
    use crate::util::ManualClock;
    use std::time::Duration;

    fn database(store: &InMemoryRemoteStore, clock: &ManualClock) -> TreeDatabase<RawNode> {
        TreeDatabase::builder(Arc::new(store.clone()), NodeRegistry::raw(["Profile", "Note"]))
            .with_clock(Arc::new(clock.clone()))
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn write_fills_in_header() {
        let store = InMemoryRemoteStore::new();
        let clock = ManualClock::from_millis(1_000);
        let db = database(&store, &clock);

        assert!(db.write_tree_data("acct1/profile", RawNode::new("Profile")).await);
        let stored = store.server_document("acct1/profile").unwrap();
        assert_eq!(stored.get("id").and_then(|v| v.as_str()), Some("profile"));
        assert_eq!(stored.get("path").and_then(|v| v.as_str()), Some("acct1"));
        assert_eq!(
            stored.get("creationDate").and_then(|v| v.as_timestamp()),
            Some(Timestamp::from_millis(1_000))
        );
    }

    #[tokio::test]
    async fn write_rejects_mismatched_path() {
        let store = InMemoryRemoteStore::new();
        let clock = ManualClock::from_millis(0);
        let db = database(&store, &clock);
        let node = RawNode::new("Profile").with_id("other");
        assert!(!db.write_tree_data("acct1/profile", node).await);
        assert!(!db.write_tree_data("acct1", RawNode::new("Profile")).await);
        assert!(!db.write_tree_data("metadata/acct1", RawNode::new("Profile")).await);
        assert!(store.server_document("acct1/profile").is_none());
    }

    #[tokio::test]
    async fn children_get_paths_and_ids() {
        let store = InMemoryRemoteStore::new();
        let clock = ManualClock::from_millis(0);
        let db = database(&store, &clock);
        assert!(db.write_tree_data("acct1/profile", RawNode::new("Profile")).await);

        let children = vec![
            RawNode::new("Note").with_id("n1"),
            RawNode::new("Note"),
        ];
        assert!(db.write_tree_data_children("acct1/profile", children).await);

        clock.advance(Duration::from_millis(1));
        let read = db.read_tree_data_children("acct1/profile").await;
        assert_eq!(read.len(), 2);
        for node in &read {
            assert_eq!(node.header.path.as_deref(), Some("acct1/profile/children"));
        }
        assert!(read.iter().any(|node| node.header.id.as_deref() == Some("n1")));
    }

    #[tokio::test]
    async fn update_refreshes_last_update() {
        let store = InMemoryRemoteStore::new();
        let clock = ManualClock::from_millis(0);
        let db = database(&store, &clock);
        assert!(db.write_tree_data("acct1/profile", RawNode::new("Profile")).await);

        clock.advance(Duration::from_millis(10));
        assert!(db.update_tree_data("acct1/profile", "email", FirestoreValue::from("a@b.c")).await);
        let stored = store.server_document("acct1/profile").unwrap();
        assert_eq!(stored.get("email").and_then(|v| v.as_str()), Some("a@b.c"));
        assert_eq!(
            stored.get("lastUpdate").and_then(|v| v.as_timestamp()),
            Some(Timestamp::from_millis(10))
        );

        assert!(!db.update_tree_data("acct1/missing", "email", FirestoreValue::from("x")).await);
    }

    #[tokio::test]
    async fn update_and_last_update_land_in_one_write() {
        use crate::firestore::api::DocumentReference;
        use crate::firestore::remote::RemoteStore;
        use std::sync::Mutex;

        let store = InMemoryRemoteStore::new();
        let clock = ManualClock::from_millis(0);
        let db = database(&store, &clock);
        assert!(db.write_tree_data("acct1/profile", RawNode::new("Profile")).await);

        let seen: Arc<Mutex<Vec<(Option<FirestoreValue>, Option<FirestoreValue>)>>> = Arc::default();
        let captured = seen.clone();
        let _registration = store.subscribe(
            &DocumentReference::from_string("acct1/profile").unwrap(),
            Arc::new(move |result: FirestoreResult<DocumentSnapshot>| {
                let snapshot = result.unwrap();
                captured.lock().unwrap().push((
                    snapshot.get("email").cloned(),
                    snapshot.get("lastUpdate").cloned(),
                ));
            }),
        );

        clock.advance(Duration::from_millis(10));
        assert!(db.update_tree_data("acct1/profile", "email", FirestoreValue::from("a@b.c")).await);
        let seen = seen.lock().unwrap().clone();
        assert_eq!(seen.len(), 2);
        assert_eq!(
            seen[1],
            (
                Some(FirestoreValue::from("a@b.c")),
                Some(FirestoreValue::from(Timestamp::from_millis(10)))
            )
        );

        let explicit = Timestamp::from_millis(3);
        assert!(db.update_tree_data("acct1/profile", "lastUpdate", FirestoreValue::from(explicit)).await);
        let stored = store.server_document("acct1/profile").unwrap();
        assert_eq!(stored.get("lastUpdate").and_then(|v| v.as_timestamp()), Some(explicit));
    }

    #[tokio::test]
    async fn unknown_types_read_as_absent() {
        let store = InMemoryRemoteStore::new();
        let clock = ManualClock::from_millis(0);
        let db = database(&store, &clock);
        assert!(db.write_tree_data("acct1/invoice", RawNode::new("Invoice")).await);
        assert!(db.read_tree_data("acct1/invoice").await.is_none());
        assert!(db.read_tree_data_children("acct1").await.is_empty());
    }

    #[tokio::test]
    async fn recursive_delete_removes_descendants() {
        let store = InMemoryRemoteStore::new();
        let clock = ManualClock::from_millis(0);
        let db = database(&store, &clock);
        assert!(db.write_tree_data("acct1/profile", RawNode::new("Profile")).await);
        assert!(
            db.write_tree_data_children("acct1/profile", vec![RawNode::new("Note").with_id("n1")])
                .await
        );
        assert!(
            db.write_tree_data_children(
                "acct1/profile/children/n1",
                vec![RawNode::new("Note").with_id("n2")]
            )
            .await
        );

        assert!(db.delete_tree_data("acct1/profile").await);
        assert!(store.server_document("acct1/profile").is_none());
        assert!(store.server_document("acct1/profile/children/n1").is_none());
        assert!(store.server_document("acct1/profile/children/n1/children/n2").is_none());

        let record = db.ledger().read("acct1").await.unwrap().unwrap();
        assert_eq!(record.last_update_for("acct1/profile"), None);
        assert!(record.last_update_for("acct1").is_some());
    }

    #[tokio::test]
    async fn deleting_a_root_drops_everything() {
        let store = InMemoryRemoteStore::new();
        let clock = ManualClock::from_millis(0);
        let db = database(&store, &clock);
        assert!(db.write_tree_data("acct1/profile", RawNode::new("Profile")).await);
        assert!(db.write_tree_data("acct1/settings", RawNode::new("Profile")).await);

        assert!(db.delete_tree_data("acct1").await);
        assert!(store.server_document("acct1/profile").is_none());
        assert!(store.server_document("acct1/settings").is_none());
        assert!(store.server_document("metadata/acct1").is_none());
    }

    #[tokio::test]
    async fn callback_adapters_deliver_results() {
        let store = InMemoryRemoteStore::new();
        let clock = ManualClock::from_millis(0);
        let db = database(&store, &clock);

        let (tx, rx) = tokio::sync::oneshot::channel();
        db.write_tree_data_with("acct1/profile", RawNode::new("Profile"), move |wrote| {
            let _ = tx.send(wrote);
        });
        assert!(rx.await.unwrap());

        let (tx, rx) = tokio::sync::oneshot::channel();
        db.read_tree_data_with("acct1/profile", move |node| {
            let _ = tx.send(node);
        });
        assert_eq!(rx.await.unwrap().unwrap().header.id.as_deref(), Some("profile"));

        let (tx, rx) = tokio::sync::oneshot::channel();
        db.delete_tree_data_children_with("acct1/profile", move |deleted| {
            let _ = tx.send(deleted);
        });
        assert!(rx.await.unwrap());
    }
}
