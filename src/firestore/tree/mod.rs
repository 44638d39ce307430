//! Path-addressed tree storage fronted by the ledger-driven read cache.

mod database;
mod fanout;
mod ledger;
mod metadata;
mod node;
mod path;
mod policy;
mod propagator;
mod settings;

pub use database::{TreeDatabase, TreeDatabaseBuilder};
pub use fanout::{complete_with, join_all};
pub use ledger::MetadataLedger;
pub use metadata::{
    Metadata, MetadataBuilder, DEFAULT_LEDGER_COLLECTION, DEFAULT_METADATA_NAME, METADATA_TYPE,
    UPDATE_MAP_FIELD,
};
pub use node::{
    NodeDecoder, NodeHeader, NodeRegistry, RawNode, TreeNode, FIELD_CREATION_DATE, FIELD_ID,
    FIELD_LAST_UPDATE, FIELD_NAME, FIELD_PATH, FIELD_TYPE,
};
pub use path::{
    all_type_key, is_document_path, next_alphabetic_string, parent_path, root_id, tokens, type_read_key,
    PathResolver,
};
pub use policy::{decide, CachePolicy, DataSource};
pub use propagator::MutationPropagator;
pub use settings::{TreeDatabaseSettings, DEFAULT_CHILDREN_COLLECTION};
