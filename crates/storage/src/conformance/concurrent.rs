use std::future::Future;
use std::sync::Arc;

use playcoach_core::UserId;

use super::{make_analysis, recv_event, TestResult};
use crate::traits::ChangeEvent;
use crate::ResultStore;

/// Number of concurrent writers in each test.
const N: usize = 10;

pub(super) async fn run_concurrent_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: ResultStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    vec![
        TestResult::from_result(
            "concurrent",
            "concurrent_appends_all_land",
            concurrent_appends_all_land(factory).await,
        ),
        TestResult::from_result(
            "concurrent",
            "concurrent_appends_reach_watcher",
            concurrent_appends_reach_watcher(factory).await,
        ),
    ]
}

/// N tasks append at once. Every record must be listed, with distinct ids
/// and distinct timestamps.
async fn concurrent_appends_all_land<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: ResultStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let store = Arc::new(factory().await);
    let owner = UserId::new("u1");

    let mut handles = Vec::new();
    for i in 0..N {
        let s = store.clone();
        let o = owner.clone();
        handles.push(tokio::spawn(async move {
            s.append(&o, make_analysis(&format!("writer {i}"))).await
        }));
    }
    for (i, handle) in handles.into_iter().enumerate() {
        handle
            .await
            .map_err(|e| format!("task {i} panicked: {e}"))?
            .map_err(|e| format!("append {i}: {e}"))?;
    }

    let mut listed = store.list(&owner).await.map_err(|e| format!("list: {e}"))?;
    if listed.len() != N {
        return Err(format!("listed {} records, expected {N}", listed.len()));
    }
    listed.sort_by(|a, b| a.created_at.cmp(&b.created_at));
    if listed.windows(2).any(|w| w[0].created_at == w[1].created_at) {
        return Err("two concurrent appends share a timestamp".to_string());
    }
    let mut ids: Vec<_> = listed.iter().map(|r| r.id.as_str()).collect();
    ids.sort_unstable();
    ids.dedup();
    if ids.len() != N {
        return Err("two concurrent appends share an id".to_string());
    }
    Ok(())
}

/// A watcher opened before N racing appends sees each one exactly once.
async fn concurrent_appends_reach_watcher<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: ResultStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let store = Arc::new(factory().await);
    let owner = UserId::new("u1");
    let mut feed = store.watch(&owner).await.map_err(|e| format!("watch: {e}"))?;
    recv_event(&mut feed).await?;

    let mut handles = Vec::new();
    for i in 0..N {
        let s = store.clone();
        let o = owner.clone();
        handles.push(tokio::spawn(async move {
            s.append(&o, make_analysis(&format!("writer {i}"))).await
        }));
    }
    let mut written = Vec::new();
    for (i, handle) in handles.into_iter().enumerate() {
        let record = handle
            .await
            .map_err(|e| format!("task {i} panicked: {e}"))?
            .map_err(|e| format!("append {i}: {e}"))?;
        written.push(record.id);
    }

    let mut seen = Vec::new();
    while seen.len() < N {
        match recv_event(&mut feed).await? {
            ChangeEvent::Inserted(record) => seen.push(record.id),
            other => return Err(format!("expected Inserted, got {other:?}")),
        }
    }
    written.sort();
    seen.sort();
    if written != seen {
        return Err(format!("feed delivered {seen:?}, appends returned {written:?}"));
    }
    Ok(())
}
