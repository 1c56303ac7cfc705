use std::future::Future;

use playcoach_core::UserId;

use super::{make_analysis, TestResult};
use crate::record::NewGameplayLog;
use crate::ResultStore;

pub(super) async fn run_append_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: ResultStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    vec![
        TestResult::from_result(
            "append",
            "append_assigns_unique_ids",
            append_assigns_unique_ids(factory).await,
        ),
        TestResult::from_result(
            "append",
            "timestamps_strictly_increase",
            timestamps_strictly_increase(factory).await,
        ),
        TestResult::from_result(
            "append",
            "record_round_trips_through_list",
            record_round_trips_through_list(factory).await,
        ),
        TestResult::from_result(
            "append",
            "upload_record_round_trips",
            upload_record_round_trips(factory).await,
        ),
        TestResult::from_result(
            "append",
            "list_is_scoped_to_owner",
            list_is_scoped_to_owner(factory).await,
        ),
        TestResult::from_result(
            "append",
            "list_unknown_owner_is_empty",
            list_unknown_owner_is_empty(factory).await,
        ),
    ]
}

async fn append_assigns_unique_ids<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: ResultStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let store = factory().await;
    let owner = UserId::new("u1");

    let mut ids = std::collections::HashSet::new();
    for i in 0..20 {
        let record = store
            .append(&owner, make_analysis(&format!("match {i}")))
            .await
            .map_err(|e| format!("append {i}: {e}"))?;
        if record.id.is_empty() {
            return Err(format!("append {i} returned an empty id"));
        }
        if !ids.insert(record.id.clone()) {
            return Err(format!("duplicate id {}", record.id));
        }
    }
    Ok(())
}

async fn timestamps_strictly_increase<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: ResultStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let store = factory().await;
    let alice = UserId::new("alice");
    let bob = UserId::new("bob");

    let mut last = None;
    for i in 0..20 {
        let owner = if i % 2 == 0 { &alice } else { &bob };
        let record = store
            .append(owner, make_analysis("tick"))
            .await
            .map_err(|e| format!("append {i}: {e}"))?;
        if let Some(prev) = last {
            if record.created_at <= prev {
                return Err(format!(
                    "append {i}: created_at {} not after {}",
                    record.created_at, prev
                ));
            }
        }
        last = Some(record.created_at);
    }
    Ok(())
}

async fn record_round_trips_through_list<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: ResultStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let store = factory().await;
    let owner = UserId::new("u1");

    let written = store
        .append(&owner, make_analysis("round trip"))
        .await
        .map_err(|e| format!("append: {e}"))?;

    if written.owner_id != owner {
        return Err(format!("owner_id {} != {}", written.owner_id, owner));
    }
    if written.source_text.as_deref() != Some("round trip") {
        return Err(format!("source_text {:?}", written.source_text));
    }

    let listed = store.list(&owner).await.map_err(|e| format!("list: {e}"))?;
    if listed != vec![written.clone()] {
        return Err(format!("list returned {listed:?}, expected [{written:?}]"));
    }
    Ok(())
}

async fn upload_record_round_trips<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: ResultStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let store = factory().await;
    let owner = UserId::new("u1");

    let written = store
        .append(
            &owner,
            NewGameplayLog::upload(
                "http://files.test/gameplay-files/u1/1_match.log",
                "match.log",
                "text/plain",
            ),
        )
        .await
        .map_err(|e| format!("append: {e}"))?;

    if written.result.is_some() || written.source_text.is_some() {
        return Err("upload record should carry no analysis".to_string());
    }

    let listed = store.list(&owner).await.map_err(|e| format!("list: {e}"))?;
    match listed.as_slice() {
        [only] if *only == written => Ok(()),
        other => Err(format!("list returned {other:?}")),
    }
}

async fn list_is_scoped_to_owner<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: ResultStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let store = factory().await;
    let alice = UserId::new("alice");
    let bob = UserId::new("bob");

    store
        .append(&alice, make_analysis("a1"))
        .await
        .map_err(|e| format!("append a1: {e}"))?;
    store
        .append(&bob, make_analysis("b1"))
        .await
        .map_err(|e| format!("append b1: {e}"))?;
    store
        .append(&alice, make_analysis("a2"))
        .await
        .map_err(|e| format!("append a2: {e}"))?;

    let listed = store.list(&alice).await.map_err(|e| format!("list: {e}"))?;
    if listed.len() != 2 {
        return Err(format!("alice has {} records, expected 2", listed.len()));
    }
    if let Some(foreign) = listed.iter().find(|r| r.owner_id != alice) {
        return Err(format!("alice's listing contains {foreign:?}"));
    }
    Ok(())
}

async fn list_unknown_owner_is_empty<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: ResultStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let store = factory().await;
    let listed = store
        .list(&UserId::new("ghost"))
        .await
        .map_err(|e| format!("list: {e}"))?;
    if !listed.is_empty() {
        return Err(format!("expected no records, got {}", listed.len()));
    }
    Ok(())
}
