use std::error::Error;
use std::sync::Arc;

use firestore_tree_cache::firestore::remote::InMemoryRemoteStore;
use firestore_tree_cache::firestore::tree::{NodeRegistry, RawNode, TreeDatabase, TreeNode};
use firestore_tree_cache::firestore::value::FirestoreValue;

fn main() -> Result<(), Box<dyn Error>> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(run())
}

async fn run() -> Result<(), Box<dyn Error>> {
    // Use the in-memory store so the demo stays self-contained.
    let store = InMemoryRemoteStore::new();
    let db = TreeDatabase::builder(Arc::new(store.clone()), NodeRegistry::raw(["Account", "Task"])).build()?;

    let account = RawNode::new("Account").with_name("Ada").with_field("plan", "pro");
    if !db.write_tree_data("acct1/account", account).await {
        return Err("cannot write the account node".into());
    }
    let tasks = vec![
        RawNode::new("Task").with_name("Write report").with_field("done", false),
        RawNode::new("Task").with_name("Review budget").with_field("done", false),
    ];
    if !db.write_tree_data_children("acct1/account", tasks).await {
        return Err("cannot write the task nodes".into());
    }

    // The first read goes to the network, the next one can be answered locally.
    for _ in 0..2 {
        let account = db.read_tree_data("acct1/account").await;
        println!(
            "account: {:?} (network reads so far: {})",
            account.and_then(|node| node.header().name.clone()),
            store.network_reads()
        );
    }

    db.update_tree_data_children("acct1/account", "done", FirestoreValue::from(true))
        .await;
    for task in db.read_all_type("acct1", "Task").await {
        println!(
            "{} -> done = {:?}",
            task.complete_path().unwrap_or_default(),
            task.get("done")
        );
    }

    db.delete_tree_data("acct1").await;
    println!("remaining tasks: {}", db.read_all_type("acct1", "Task").await.len());
    Ok(())
}
