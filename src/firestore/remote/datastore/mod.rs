use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::firestore::api::{CollectionReference, DocumentReference, DocumentSnapshot, Query};
use crate::firestore::error::FirestoreResult;
use crate::firestore::value::{FirestoreValue, MapValue};

pub mod in_memory;

/// Where a read may be answered from.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Source {
    /// Let the store pick server or cache according to its own policy (server when reachable).
    #[default]
    Default,
    /// Answer from the local cache only; fails when the data was never cached.
    Cache,
}

/// Callback fed by [`RemoteStore::subscribe`]. Receives the new state of the document (which may
/// not exist) or the error that interrupted the subscription.
pub type SnapshotListener = Arc<dyn Fn(FirestoreResult<DocumentSnapshot>) + Send + Sync + 'static>;

/// Handle for a live subscription; dropping it detaches the listener.
pub struct ListenerRegistration {
    detach: Option<Box<dyn FnOnce() + Send + 'static>>,
}

impl ListenerRegistration {
    pub fn new<F>(detach: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            detach: Some(Box::new(detach)),
        }
    }

    pub fn detach(mut self) {
        if let Some(detach) = self.detach.take() {
            detach();
        }
    }
}

impl Drop for ListenerRegistration {
    fn drop(&mut self) {
        if let Some(detach) = self.detach.take() {
            detach();
        }
    }
}

impl fmt::Debug for ListenerRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerRegistration")
            .field("attached", &self.detach.is_some())
            .finish()
    }
}

/// The remote document database the cache sits in front of.
///
/// Implementations own transport, their own local cache and the listener machinery. Every
/// method is one network round-trip (or one local cache lookup for [`Source::Cache`]).
#[async_trait]
pub trait RemoteStore: Send + Sync + 'static {
    async fn get_document(
        &self,
        reference: &DocumentReference,
        source: Source,
    ) -> FirestoreResult<DocumentSnapshot>;

    async fn get_collection(
        &self,
        reference: &CollectionReference,
        source: Source,
    ) -> FirestoreResult<Vec<DocumentSnapshot>> {
        self.run_query(&reference.query(), source).await
    }

    async fn run_query(&self, query: &Query, source: Source)
        -> FirestoreResult<Vec<DocumentSnapshot>>;

    async fn set_document(&self, reference: &DocumentReference, data: MapValue) -> FirestoreResult<()>;

    /// Replaces the given top-level fields in one write; fails with `not-found` if the document
    /// is missing.
    async fn update_fields(&self, reference: &DocumentReference, fields: MapValue) -> FirestoreResult<()>;

    async fn update_document(
        &self,
        reference: &DocumentReference,
        field: &str,
        value: FirestoreValue,
    ) -> FirestoreResult<()> {
        let mut fields = MapValue::default();
        fields.insert(field, value);
        self.update_fields(reference, fields).await
    }

    async fn delete_document(&self, reference: &DocumentReference) -> FirestoreResult<()>;

    /// Registers a live listener on one document. The listener stays attached for as long as the
    /// returned registration is alive.
    fn subscribe(&self, reference: &DocumentReference, listener: SnapshotListener) -> ListenerRegistration;
}

pub type RemoteStoreArc = Arc<dyn RemoteStore>;

pub use in_memory::InMemoryRemoteStore;
