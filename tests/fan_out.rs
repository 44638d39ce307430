#![cfg(not(target_arch = "wasm32"))]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use firestore_tree_cache::firestore::remote::InMemoryRemoteStore;
use firestore_tree_cache::firestore::tree::{NodeRegistry, RawNode, TreeDatabase};
use firestore_tree_cache::firestore::value::FirestoreValue;
use firestore_tree_cache::util::ManualClock;

#[derive(Default)]
struct Outcomes {
    successes: AtomicUsize,
    failures: AtomicUsize,
}

impl Outcomes {
    fn record(&self, succeeded: bool) {
        if succeeded {
            self.successes.fetch_add(1, Ordering::SeqCst);
        } else {
            self.failures.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn counts(&self) -> (usize, usize) {
        (
            self.successes.load(Ordering::SeqCst),
            self.failures.load(Ordering::SeqCst),
        )
    }
}

fn database(store: &InMemoryRemoteStore) -> TreeDatabase<RawNode> {
    TreeDatabase::builder(Arc::new(store.clone()), NodeRegistry::raw(["Profile", "Note"]))
        .with_clock(Arc::new(ManualClock::from_millis(1_000)))
        .build()
        .unwrap()
}

fn notes(count: usize) -> Vec<RawNode> {
    (0..count)
        .map(|index| RawNode::new("Note").with_id(format!("n{index}")))
        .collect()
}

async fn write_children_with_callback(
    db: &TreeDatabase<RawNode>,
    children: Vec<RawNode>,
) -> Arc<Outcomes> {
    let outcomes = Arc::new(Outcomes::default());
    let (tx, rx) = tokio::sync::oneshot::channel();
    let captured = outcomes.clone();
    db.write_tree_data_children_with("acct1/profile", children, move |succeeded| {
        captured.record(succeeded);
        let _ = tx.send(());
    });
    rx.await.unwrap();
    // Leave room for a second invocation, which must never come.
    tokio::time::sleep(Duration::from_millis(50)).await;
    outcomes
}

#[tokio::test(flavor = "multi_thread")]
async fn aggregate_callback_fires_once_for_all_successes() {
    for count in [0, 1, 3] {
        let store = InMemoryRemoteStore::new();
        let db = database(&store);
        assert!(db.write_tree_data("acct1/profile", RawNode::new("Profile")).await);

        let outcomes = write_children_with_callback(&db, notes(count)).await;
        assert_eq!(outcomes.counts(), (1, 0), "{count} children");
        assert_eq!(db.read_tree_data_children("acct1/profile").await.len(), count);
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn aggregate_callback_fires_once_on_failure() {
    let store = InMemoryRemoteStore::new();
    let db = database(&store);
    assert!(db.write_tree_data("acct1/profile", RawNode::new("Profile")).await);
    store.fail_path("acct1/profile/children/n1");

    let outcomes = write_children_with_callback(&db, notes(3)).await;
    assert_eq!(outcomes.counts(), (0, 1));

    // The other children are not rolled back.
    assert!(store.server_document("acct1/profile/children/n0").is_some());
    assert!(store.server_document("acct1/profile/children/n2").is_some());
    assert!(store.server_document("acct1/profile/children/n1").is_none());
}

#[tokio::test(flavor = "multi_thread")]
async fn failure_is_reported_without_waiting_for_slow_children() {
    let store = InMemoryRemoteStore::with_latency(Duration::from_millis(300));
    let db = database(&store);
    store.fail_path("acct1/profile/children/n0");

    let started = std::time::Instant::now();
    assert!(!db.write_tree_data_children("acct1/profile", notes(3)).await);
    assert!(started.elapsed() < Duration::from_millis(300));
}

#[tokio::test(flavor = "multi_thread")]
async fn bulk_update_and_delete_join_their_children() {
    let store = InMemoryRemoteStore::new();
    let db = database(&store);
    assert!(db.write_tree_data("acct1/profile", RawNode::new("Profile")).await);
    assert!(db.write_tree_data_children("acct1/profile", notes(3)).await);

    assert!(
        db.update_tree_data_children("acct1/profile", "done", FirestoreValue::from(true))
            .await
    );
    for index in 0..3 {
        let stored = store
            .server_document(&format!("acct1/profile/children/n{index}"))
            .unwrap();
        assert_eq!(stored.get("done"), Some(&FirestoreValue::from(true)));
    }

    store.fail_path("acct1/profile/children/n2");
    assert!(!db.delete_tree_data_children("acct1/profile").await);
    assert!(!db.delete_tree_data("acct1/profile").await);
    assert!(store.server_document("acct1/profile").is_some());

    store.clear_failures();
    assert!(db.delete_tree_data("acct1/profile").await);
    assert!(db.read_tree_data_children("acct1/profile").await.is_empty());
    assert!(store.server_document("acct1/profile").is_none());

    assert!(db.update_tree_data_children("acct1/profile", "done", FirestoreValue::from(false)).await);
}
