//! Client-local state that survives independently of the remote store.

mod read_timestamps;

pub use read_timestamps::{
    FileReadTimestampStore, InMemoryReadTimestampStore, ReadTimestampStore, ReadTimestampStoreArc,
};
