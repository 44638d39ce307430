pub mod api;
pub mod document_db;
pub mod error;
pub mod local;
pub mod model;
pub mod remote;
pub mod tree;
pub mod value;

pub use api::{CollectionReference, DocumentReference, DocumentSnapshot, FilterOperator, Query};
pub use document_db::DocumentDatabase;
pub use error::{FirestoreError, FirestoreErrorCode, FirestoreResult};
pub use local::{FileReadTimestampStore, InMemoryReadTimestampStore, ReadTimestampStore};
pub use remote::{InMemoryRemoteStore, RemoteStore, Source};
pub use tree::{NodeHeader, NodeRegistry, RawNode, TreeDatabase, TreeDatabaseSettings, TreeNode};
