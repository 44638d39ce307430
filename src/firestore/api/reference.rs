use rand::distributions::Alphanumeric;
use rand::{thread_rng, Rng};
use std::fmt::{Display, Formatter};

use crate::firestore::error::{invalid_argument, FirestoreResult};
use crate::firestore::model::{DocumentKey, ResourcePath};

use super::query::Query;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CollectionReference {
    path: ResourcePath,
}

impl CollectionReference {
    pub fn new(path: ResourcePath) -> FirestoreResult<Self> {
        if path.len() % 2 == 0 {
            return Err(invalid_argument(format!(
                "Collection references must point to a collection (odd number of segments), got '{path}'"
            )));
        }
        Ok(Self { path })
    }

    pub fn from_string(path: &str) -> FirestoreResult<Self> {
        Self::new(ResourcePath::from_string(path)?)
    }

    /// The full resource path of the collection (e.g. `acct1/profile/children`).
    pub fn path(&self) -> &ResourcePath {
        &self.path
    }

    /// The last segment of the collection path.
    pub fn id(&self) -> &str {
        self.path.last_segment().unwrap_or_default()
    }

    /// Returns the document that logically contains this collection, if any.
    pub fn parent(&self) -> Option<DocumentReference> {
        let parent_path = self.path.without_last();
        if parent_path.is_empty() {
            return None;
        }
        DocumentReference::new(parent_path).ok()
    }

    /// Returns a reference to the document identified by `document_id`.
    ///
    /// When `document_id` is `None`, an auto-ID is generated.
    pub fn doc(&self, document_id: Option<&str>) -> FirestoreResult<DocumentReference> {
        let id = document_id
            .map(|id| id.to_string())
            .unwrap_or_else(generate_auto_id);
        if id.is_empty() || id.contains('/') {
            return Err(invalid_argument(format!("Invalid document ID '{id}'")));
        }
        DocumentReference::new(self.path.child([id]))
    }

    /// Creates a query that targets this collection.
    pub fn query(&self) -> Query {
        Query::collection(self.clone())
    }
}

impl Display for CollectionReference {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "CollectionReference({})", self.path.canonical_string())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct DocumentReference {
    key: DocumentKey,
}

impl DocumentReference {
    pub fn new(path: ResourcePath) -> FirestoreResult<Self> {
        let key = DocumentKey::from_path(path)?;
        Ok(Self { key })
    }

    pub fn from_string(path: &str) -> FirestoreResult<Self> {
        Self::new(ResourcePath::from_string(path)?)
    }

    /// The document identifier (the last segment of its path).
    pub fn id(&self) -> &str {
        self.key.id()
    }

    /// The full resource path to the document.
    pub fn path(&self) -> &ResourcePath {
        self.key.path()
    }

    pub fn key(&self) -> &DocumentKey {
        &self.key
    }

    /// The parent collection containing this document.
    pub fn parent(&self) -> FirestoreResult<CollectionReference> {
        CollectionReference::new(self.key.collection_path())
    }

    /// Returns a reference to a subcollection rooted at this document.
    pub fn collection(&self, collection_id: &str) -> FirestoreResult<CollectionReference> {
        let sub_path = ResourcePath::from_string(collection_id)?;
        let full_path = self.key.path().child(sub_path.iter().cloned());
        CollectionReference::new(full_path)
    }
}

impl Display for DocumentReference {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "DocumentReference({})", self.key.path().canonical_string())
    }
}

/// Random 20 character identifier used for documents created without an explicit id.
pub fn generate_auto_id() -> String {
    thread_rng()
        .sample_iter(&Alphanumeric)
        .map(char::from)
        .take(20)
        .collect()
}
