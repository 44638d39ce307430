pub mod datastore;

pub use datastore::{
    InMemoryRemoteStore, ListenerRegistration, RemoteStore, RemoteStoreArc, SnapshotListener, Source,
};
