mod query;
mod reference;
mod snapshot;

pub use query::{FieldFilter, FilterOperator, Query, QueryScope};
pub use reference::{generate_auto_id, CollectionReference, DocumentReference};
pub use snapshot::{DocumentSnapshot, SnapshotMetadata};
