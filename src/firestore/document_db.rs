//! Flat document access: callers address documents directly and every read goes through the
//! store's default source. Only `lastUpdate` bookkeeping is kept.

use std::sync::Arc;

use crate::firestore::api::{CollectionReference, DocumentReference, Query};
use crate::firestore::error::FirestoreResult;
use crate::firestore::remote::{RemoteStoreArc, Source};
use crate::firestore::tree::{NodeRegistry, TreeNode, FIELD_LAST_UPDATE};
use crate::firestore::value::{FirestoreValue, MapValue};
use crate::util::{ClockArc, SystemClock};

pub struct DocumentDatabase<N: TreeNode> {
    store: RemoteStoreArc,
    registry: NodeRegistry<N>,
    clock: ClockArc,
}

impl<N: TreeNode> Clone for DocumentDatabase<N> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            registry: self.registry.clone(),
            clock: Arc::clone(&self.clock),
        }
    }
}

impl<N: TreeNode> DocumentDatabase<N> {
    pub fn new(store: RemoteStoreArc, registry: NodeRegistry<N>) -> Self {
        Self::with_clock(store, registry, Arc::new(SystemClock))
    }

    pub fn with_clock(store: RemoteStoreArc, registry: NodeRegistry<N>, clock: ClockArc) -> Self {
        Self { store, registry, clock }
    }

    pub async fn read_document(&self, reference: &DocumentReference) -> Option<N> {
        let result = async {
            let snapshot = self.store.get_document(reference, Source::Default).await?;
            self.registry.decode(&snapshot)
        }
        .await;
        match result {
            Ok(document) => {
                log::debug!("READ_DOCUMENT: read {reference}");
                document
            }
            Err(err) => {
                log::error!("READ_DOCUMENT: cannot read {reference}: {err}");
                None
            }
        }
    }

    pub async fn read_collection(&self, reference: &CollectionReference) -> Vec<N> {
        self.read_query(&reference.query()).await
    }

    /// Documents matching `query`; documents of unknown type are skipped.
    pub async fn read_query(&self, query: &Query) -> Vec<N> {
        match self.store.run_query(query, Source::Default).await {
            Ok(snapshots) => {
                log::debug!("READ_COLLECTION: read {} documents", snapshots.len());
                snapshots
                    .iter()
                    .filter_map(|snapshot| match self.registry.decode(snapshot) {
                        Ok(document) => document,
                        Err(err) => {
                            log::error!("READ_COLLECTION: skipping {}: {err}", snapshot.document_key().path());
                            None
                        }
                    })
                    .collect()
            }
            Err(err) => {
                log::error!("READ_COLLECTION: cannot run query: {err}");
                Vec::new()
            }
        }
    }

    /// Stores `document`, stamping its `lastUpdate`.
    pub async fn write_document(&self, reference: &DocumentReference, mut document: N) -> bool {
        document.header_mut().last_update = Some(self.clock.now());
        let result = async {
            let data = document.to_map()?;
            self.store.set_document(reference, data).await
        }
        .await;
        report("WRITE_DOCUMENT", reference, result)
    }

    /// Sets `field` and, unless that field is `lastUpdate` itself, refreshes `lastUpdate`.
    pub async fn update_document(&self, reference: &DocumentReference, field: &str, value: FirestoreValue) -> bool {
        let result = async {
            let mut fields = MapValue::default();
            fields.insert(FIELD_LAST_UPDATE, FirestoreValue::from(self.clock.now()));
            fields.insert(field, value);
            self.store.update_fields(reference, fields).await
        }
        .await;
        report("UPDATE_DOCUMENT", reference, result)
    }

    pub async fn delete_document(&self, reference: &DocumentReference) -> bool {
        let result = self.store.delete_document(reference).await;
        report("DELETE_DOCUMENT", reference, result)
    }
}

fn report(tag: &str, reference: &DocumentReference, result: FirestoreResult<()>) -> bool {
    match result {
        Ok(()) => {
            log::debug!("{tag}: {reference} done");
            true
        }
        Err(err) => {
            log::error!("{tag}: {reference} failed: {err}");
            false
        }
    }
}
