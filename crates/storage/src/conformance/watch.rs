use std::future::Future;

use playcoach_core::UserId;

use super::{expect_silence, make_analysis, recv_event, TestResult};
use crate::traits::ChangeEvent;
use crate::ResultStore;

pub(super) async fn run_watch_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: ResultStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    vec![
        TestResult::from_result(
            "watch",
            "first_event_is_full_snapshot",
            first_event_is_full_snapshot(factory).await,
        ),
        TestResult::from_result(
            "watch",
            "inserts_are_pushed_once",
            inserts_are_pushed_once(factory).await,
        ),
        TestResult::from_result(
            "watch",
            "feed_is_scoped_to_owner",
            feed_is_scoped_to_owner(factory).await,
        ),
        TestResult::from_result(
            "watch",
            "new_watch_sees_earlier_inserts_in_snapshot",
            new_watch_sees_earlier_inserts_in_snapshot(factory).await,
        ),
    ]
}

async fn first_event_is_full_snapshot<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: ResultStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let store = factory().await;
    let owner = UserId::new("u1");
    let a = store
        .append(&owner, make_analysis("a"))
        .await
        .map_err(|e| format!("append a: {e}"))?;
    let b = store
        .append(&owner, make_analysis("b"))
        .await
        .map_err(|e| format!("append b: {e}"))?;

    let mut feed = store.watch(&owner).await.map_err(|e| format!("watch: {e}"))?;
    match recv_event(&mut feed).await? {
        ChangeEvent::Snapshot(records) => {
            if records.len() != 2 || !records.contains(&a) || !records.contains(&b) {
                return Err(format!("snapshot {records:?} should hold exactly a and b"));
            }
        }
        other => return Err(format!("expected Snapshot first, got {other:?}")),
    }
    expect_silence(&mut feed).await
}

async fn inserts_are_pushed_once<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: ResultStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let store = factory().await;
    let owner = UserId::new("u1");
    let mut feed = store.watch(&owner).await.map_err(|e| format!("watch: {e}"))?;

    match recv_event(&mut feed).await? {
        ChangeEvent::Snapshot(records) if records.is_empty() => {}
        other => return Err(format!("expected empty Snapshot, got {other:?}")),
    }

    let written = store
        .append(&owner, make_analysis("pushed"))
        .await
        .map_err(|e| format!("append: {e}"))?;
    match recv_event(&mut feed).await? {
        ChangeEvent::Inserted(record) if record == written => {}
        other => return Err(format!("expected Inserted({written:?}), got {other:?}")),
    }
    expect_silence(&mut feed).await
}

async fn feed_is_scoped_to_owner<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: ResultStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let store = factory().await;
    let alice = UserId::new("alice");
    let bob = UserId::new("bob");
    let mut feed = store.watch(&alice).await.map_err(|e| format!("watch: {e}"))?;
    recv_event(&mut feed).await?;

    store
        .append(&bob, make_analysis("not yours"))
        .await
        .map_err(|e| format!("append: {e}"))?;
    expect_silence(&mut feed).await
}

async fn new_watch_sees_earlier_inserts_in_snapshot<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: ResultStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let store = factory().await;
    let owner = UserId::new("u1");

    let first_feed = store.watch(&owner).await.map_err(|e| format!("watch: {e}"))?;
    drop(first_feed);

    let written = store
        .append(&owner, make_analysis("missed"))
        .await
        .map_err(|e| format!("append: {e}"))?;

    let mut feed = store.watch(&owner).await.map_err(|e| format!("rewatch: {e}"))?;
    match recv_event(&mut feed).await? {
        ChangeEvent::Snapshot(records) if records == vec![written.clone()] => Ok(()),
        other => Err(format!("expected Snapshot([{written:?}]), got {other:?}")),
    }
}
