use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use async_trait::async_trait;

use crate::firestore::api::{
    DocumentReference, DocumentSnapshot, FieldFilter, FilterOperator, Query, QueryScope,
    SnapshotMetadata,
};
use crate::firestore::error::{not_found, unavailable, FirestoreError, FirestoreResult};
use crate::firestore::model::DocumentKey;
use crate::firestore::value::{FirestoreValue, MapValue, ValueKind};
use crate::platform::runtime::sleep;

use super::{ListenerRegistration, RemoteStore, SnapshotListener, Source};

/// Key used by [`InMemoryRemoteStore::network_reads_for`] for queries over all documents.
pub const ALL_DOCUMENTS_SCOPE: &str = "*";

/// In-process store that behaves like a server plus the client's local cache.
///
/// Reads with [`Source::Default`] hit the "server" map and refresh the cache; reads with
/// [`Source::Cache`] only see what earlier reads or local writes put into the cache. Writes
/// go to both and notify listeners synchronously. Tests can add latency, inject failures and
/// count network reads.
#[derive(Clone, Default)]
pub struct InMemoryRemoteStore {
    inner: Arc<StoreInner>,
}

#[derive(Default)]
struct StoreInner {
    state: Mutex<StoreState>,
    listeners: Mutex<ListenerTable>,
    latency: Duration,
}

#[derive(Default)]
struct StoreState {
    server: BTreeMap<String, MapValue>,
    cache: BTreeMap<String, Option<MapValue>>,
    failing_paths: HashSet<String>,
    fail_subscriptions: bool,
    network_reads: HashMap<String, usize>,
    total_network_reads: usize,
    cache_reads: usize,
}

#[derive(Default)]
struct ListenerTable {
    next_id: u64,
    entries: HashMap<u64, (String, SnapshotListener)>,
}

impl InMemoryRemoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delays every network round-trip by `latency`. Cache reads stay immediate.
    pub fn with_latency(latency: Duration) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                latency,
                ..Default::default()
            }),
        }
    }

    /// Makes every network operation on `path` (document or query collection) fail with
    /// `firestore/unavailable` until [`clear_failures`](Self::clear_failures) is called.
    pub fn fail_path(&self, path: &str) {
        self.inner.state.lock().unwrap().failing_paths.insert(path.to_string());
    }

    pub fn clear_failures(&self) {
        let mut state = self.inner.state.lock().unwrap();
        state.failing_paths.clear();
        state.fail_subscriptions = false;
    }

    /// New subscriptions report an error instead of snapshots.
    pub fn fail_subscriptions(&self, fail: bool) {
        self.inner.state.lock().unwrap().fail_subscriptions = fail;
    }

    pub fn network_reads(&self) -> usize {
        self.inner.state.lock().unwrap().total_network_reads
    }

    /// Network reads of one document path, collection path, or [`ALL_DOCUMENTS_SCOPE`].
    pub fn network_reads_for(&self, path: &str) -> usize {
        self.inner
            .state
            .lock()
            .unwrap()
            .network_reads
            .get(path)
            .copied()
            .unwrap_or(0)
    }

    pub fn cache_reads(&self) -> usize {
        self.inner.state.lock().unwrap().cache_reads
    }

    /// Drops the local cache, as if the client had restarted with a cleared cache.
    pub fn evict_cache(&self) {
        self.inner.state.lock().unwrap().cache.clear();
    }

    /// Current server-side content of a document.
    pub fn server_document(&self, path: &str) -> Option<MapValue> {
        self.inner.state.lock().unwrap().server.get(path).cloned()
    }

    /// Writes `data` on the server only, as another client would. Listeners are notified but the
    /// local cache keeps its previous content.
    pub fn apply_remote_set(&self, path: &str, data: MapValue) -> FirestoreResult<()> {
        let key = DocumentKey::from_string(path)?;
        let canonical = key.path().canonical_string();
        self.inner
            .state
            .lock()
            .unwrap()
            .server
            .insert(canonical.clone(), data.clone());
        self.notify(&key, Some(data));
        Ok(())
    }

    /// Deletes a document on the server only, as another client would.
    pub fn apply_remote_delete(&self, path: &str) -> FirestoreResult<()> {
        let key = DocumentKey::from_string(path)?;
        self.inner
            .state
            .lock()
            .unwrap()
            .server
            .remove(&key.path().canonical_string());
        self.notify(&key, None);
        Ok(())
    }

    pub fn listener_count(&self) -> usize {
        self.inner.listeners.lock().unwrap().entries.len()
    }

    fn check_fault(&self, path: &str) -> FirestoreResult<()> {
        let state = self.inner.state.lock().unwrap();
        if state.failing_paths.contains(path) {
            return Err(unavailable(format!("Injected failure for '{path}'")));
        }
        Ok(())
    }

    async fn round_trip(&self, path: &str) -> FirestoreResult<()> {
        self.check_fault(path)?;
        sleep(self.inner.latency).await;
        // Faults injected while the request was in flight still apply.
        self.check_fault(path)
    }

    fn notify(&self, key: &DocumentKey, data: Option<MapValue>) {
        let canonical = key.path().canonical_string();
        let listeners: Vec<SnapshotListener> = self
            .inner
            .listeners
            .lock()
            .unwrap()
            .entries
            .values()
            .filter(|(path, _)| path == &canonical)
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        for listener in listeners {
            let snapshot = DocumentSnapshot::new(key.clone(), data.clone(), SnapshotMetadata::new(false));
            listener(Ok(snapshot));
        }
    }

    fn scope_label(query: &Query) -> String {
        match query.scope() {
            QueryScope::Collection(collection) => collection.path().canonical_string(),
            QueryScope::AllDocuments => ALL_DOCUMENTS_SCOPE.to_string(),
        }
    }
}

#[async_trait]
impl RemoteStore for InMemoryRemoteStore {
    async fn get_document(
        &self,
        reference: &DocumentReference,
        source: Source,
    ) -> FirestoreResult<DocumentSnapshot> {
        let key = reference.key().clone();
        let canonical = key.path().canonical_string();
        match source {
            Source::Cache => {
                let mut state = self.inner.state.lock().unwrap();
                state.cache_reads += 1;
                match state.cache.get(&canonical) {
                    Some(data) => Ok(DocumentSnapshot::new(key, data.clone(), SnapshotMetadata::new(true))),
                    None => Err(unavailable(format!(
                        "Failed to get document '{canonical}' from cache"
                    ))),
                }
            }
            Source::Default => {
                self.round_trip(&canonical).await?;
                let mut state = self.inner.state.lock().unwrap();
                let data = state.server.get(&canonical).cloned();
                state.cache.insert(canonical.clone(), data.clone());
                state.total_network_reads += 1;
                *state.network_reads.entry(canonical).or_insert(0) += 1;
                Ok(DocumentSnapshot::new(key, data, SnapshotMetadata::new(false)))
            }
        }
    }

    async fn run_query(&self, query: &Query, source: Source) -> FirestoreResult<Vec<DocumentSnapshot>> {
        let label = Self::scope_label(query);
        match source {
            Source::Cache => {
                let mut state = self.inner.state.lock().unwrap();
                state.cache_reads += 1;
                let mut documents = Vec::new();
                for (path, data) in state.cache.iter() {
                    let Some(data) = data else { continue };
                    let key = DocumentKey::from_string(path)?;
                    if query.matches_scope(&key) && document_satisfies_filters(data, query.filters()) {
                        documents.push(DocumentSnapshot::new(key, Some(data.clone()), SnapshotMetadata::new(true)));
                    }
                }
                Ok(documents)
            }
            Source::Default => {
                self.round_trip(&label).await?;
                let mut state = self.inner.state.lock().unwrap();
                let mut matched = Vec::new();
                for (path, data) in state.server.iter() {
                    let key = DocumentKey::from_string(path)?;
                    if query.matches_scope(&key) && document_satisfies_filters(data, query.filters()) {
                        matched.push((key, data.clone()));
                    }
                }

                if query.filters().is_empty() {
                    // An unfiltered collection read is authoritative for that collection.
                    let stale: Vec<String> = state
                        .cache
                        .keys()
                        .filter(|path| {
                            DocumentKey::from_string(path)
                                .map(|key| query.matches_scope(&key))
                                .unwrap_or(false)
                        })
                        .cloned()
                        .collect();
                    for path in stale {
                        state.cache.insert(path, None);
                    }
                }

                let mut documents = Vec::with_capacity(matched.len());
                for (key, data) in matched {
                    state
                        .cache
                        .insert(key.path().canonical_string(), Some(data.clone()));
                    documents.push(DocumentSnapshot::new(key, Some(data), SnapshotMetadata::new(false)));
                }
                state.total_network_reads += 1;
                *state.network_reads.entry(label).or_insert(0) += 1;
                Ok(documents)
            }
        }
    }

    async fn set_document(&self, reference: &DocumentReference, data: MapValue) -> FirestoreResult<()> {
        let canonical = reference.path().canonical_string();
        self.round_trip(&canonical).await?;
        {
            let mut state = self.inner.state.lock().unwrap();
            state.server.insert(canonical.clone(), data.clone());
            state.cache.insert(canonical, Some(data.clone()));
        }
        self.notify(reference.key(), Some(data));
        Ok(())
    }

    async fn update_fields(&self, reference: &DocumentReference, fields: MapValue) -> FirestoreResult<()> {
        let canonical = reference.path().canonical_string();
        self.round_trip(&canonical).await?;
        let updated = {
            let mut state = self.inner.state.lock().unwrap();
            let mut current = state
                .server
                .get(&canonical)
                .cloned()
                .ok_or_else(|| not_found(format!("Document {canonical} does not exist")))?;
            for (field, value) in fields.into_fields() {
                current.insert(field, value);
            }
            state.server.insert(canonical.clone(), current.clone());
            state.cache.insert(canonical, Some(current.clone()));
            current
        };
        self.notify(reference.key(), Some(updated));
        Ok(())
    }

    async fn delete_document(&self, reference: &DocumentReference) -> FirestoreResult<()> {
        let canonical = reference.path().canonical_string();
        self.round_trip(&canonical).await?;
        {
            let mut state = self.inner.state.lock().unwrap();
            state.server.remove(&canonical);
            state.cache.insert(canonical, None);
        }
        self.notify(reference.key(), None);
        Ok(())
    }

    fn subscribe(&self, reference: &DocumentReference, listener: SnapshotListener) -> ListenerRegistration {
        let canonical = reference.path().canonical_string();
        let id = {
            let mut table = self.inner.listeners.lock().unwrap();
            let id = table.next_id;
            table.next_id += 1;
            table
                .entries
                .insert(id, (canonical.clone(), Arc::clone(&listener)));
            id
        };

        let (fail, current) = {
            let state = self.inner.state.lock().unwrap();
            (state.fail_subscriptions, state.server.get(&canonical).cloned())
        };
        if fail {
            listener(Err(subscription_error(&canonical)));
        } else {
            let snapshot = DocumentSnapshot::new(reference.key().clone(), current, SnapshotMetadata::new(false));
            listener(Ok(snapshot));
        }

        let weak: Weak<StoreInner> = Arc::downgrade(&self.inner);
        ListenerRegistration::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.listeners.lock().unwrap().entries.remove(&id);
            }
        })
    }
}

fn subscription_error(path: &str) -> FirestoreError {
    unavailable(format!("Listen stream for '{path}' failed"))
}

fn document_satisfies_filters(data: &MapValue, filters: &[FieldFilter]) -> bool {
    filters.iter().all(|filter| match data.get(filter.field()) {
        Some(value) => evaluate_filter(filter, value),
        None => filter.operator() == FilterOperator::NotEqual,
    })
}

fn evaluate_filter(filter: &FieldFilter, value: &FirestoreValue) -> bool {
    use std::cmp::Ordering;

    match filter.operator() {
        FilterOperator::Equal => value == filter.value(),
        FilterOperator::NotEqual => value != filter.value(),
        FilterOperator::LessThan => value.compare(filter.value()) == Some(Ordering::Less),
        FilterOperator::LessThanOrEqual => matches!(
            value.compare(filter.value()),
            Some(Ordering::Less) | Some(Ordering::Equal)
        ),
        FilterOperator::GreaterThan => value.compare(filter.value()) == Some(Ordering::Greater),
        FilterOperator::GreaterThanOrEqual => matches!(
            value.compare(filter.value()),
            Some(Ordering::Greater) | Some(Ordering::Equal)
        ),
        FilterOperator::ArrayContains => match value.kind() {
            ValueKind::Array(array) => array.contains(filter.value()),
            _ => false,
        },
        FilterOperator::In => match filter.value().kind() {
            ValueKind::Array(values) => values.contains(value),
            _ => false,
        },
    }
}
