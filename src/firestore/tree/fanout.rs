//! Joining the per-child operations of bulk tree calls.

use std::future::Future;

use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};

use crate::platform::runtime::spawn_detached;

/// Drives every child concurrently and reports whether all of them succeeded.
///
/// Resolves to `false` as soon as one child reports failure; the children still pending keep
/// running to completion in the background. No children means success.
pub async fn join_all(children: Vec<BoxFuture<'static, bool>>) -> bool {
    let mut pending: FuturesUnordered<BoxFuture<'static, bool>> = children.into_iter().collect();
    while let Some(succeeded) = pending.next().await {
        if !succeeded {
            if !pending.is_empty() {
                spawn_detached(async move { while pending.next().await.is_some() {} });
            }
            return false;
        }
    }
    true
}

/// Runs `future` in the background and hands its output to `callback` exactly once.
pub fn complete_with<T, Fut, C>(future: Fut, callback: C)
where
    T: Send + 'static,
    Fut: Future<Output = T> + Send + 'static,
    C: FnOnce(T) + Send + 'static,
{
    spawn_detached(async move {
        let output = future.await;
        callback(output);
    });
}
