//! Staleness-aware read-through cache for a remote document store.
//!
//! [`firestore::tree::TreeDatabase`] stores typed nodes under slash-separated logical paths and
//! keeps one metadata ledger record per root, mapping each modified path to the time it last
//! changed. Reads compare that ledger with a local table of when each path was last fetched
//! from the network and are answered from the store's local cache when nothing changed since.

pub mod firestore;
pub mod platform;
pub mod util;
